// =============================================================================
// Shared types used across the kline viewer
// =============================================================================

use std::str::FromStr;

use anyhow::bail;
use serde::{Deserialize, Serialize};

/// Trading pairs the viewer can stream.
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq, Serialize, Deserialize)]
pub enum Symbol {
    #[serde(rename = "ETHUSDT")]
    EthUsdt,
    #[serde(rename = "BNBUSDT")]
    BnbUsdt,
    #[serde(rename = "DOTUSDT")]
    DotUsdt,
}

impl Symbol {
    pub const ALL: [Symbol; 3] = [Symbol::EthUsdt, Symbol::BnbUsdt, Symbol::DotUsdt];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::EthUsdt => "ETHUSDT",
            Self::BnbUsdt => "BNBUSDT",
            Self::DotUsdt => "DOTUSDT",
        }
    }
}

impl Default for Symbol {
    fn default() -> Self {
        Self::EthUsdt
    }
}

impl std::fmt::Display for Symbol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Symbol {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        let upper = s.trim().to_uppercase();
        match Self::ALL.iter().find(|sym| sym.as_str() == upper) {
            Some(sym) => Ok(*sym),
            None => bail!("unsupported symbol: {s}"),
        }
    }
}

/// Kline intervals offered to the user.
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq, Serialize, Deserialize)]
pub enum Interval {
    #[serde(rename = "1m")]
    OneMinute,
    #[serde(rename = "3m")]
    ThreeMinutes,
    #[serde(rename = "5m")]
    FiveMinutes,
    #[serde(rename = "15m")]
    FifteenMinutes,
    #[serde(rename = "30m")]
    ThirtyMinutes,
    #[serde(rename = "1h")]
    OneHour,
    #[serde(rename = "4h")]
    FourHours,
    #[serde(rename = "1d")]
    OneDay,
}

impl Interval {
    pub const ALL: [Interval; 8] = [
        Interval::OneMinute,
        Interval::ThreeMinutes,
        Interval::FiveMinutes,
        Interval::FifteenMinutes,
        Interval::ThirtyMinutes,
        Interval::OneHour,
        Interval::FourHours,
        Interval::OneDay,
    ];

    /// Exchange spelling, used verbatim in the stream name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OneMinute => "1m",
            Self::ThreeMinutes => "3m",
            Self::FiveMinutes => "5m",
            Self::FifteenMinutes => "15m",
            Self::ThirtyMinutes => "30m",
            Self::OneHour => "1h",
            Self::FourHours => "4h",
            Self::OneDay => "1d",
        }
    }
}

impl Default for Interval {
    fn default() -> Self {
        Self::OneMinute
    }
}

impl std::fmt::Display for Interval {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Interval {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        let trimmed = s.trim();
        match Self::ALL.iter().find(|iv| iv.as_str() == trimmed) {
            Some(iv) => Ok(*iv),
            None => bail!("unsupported interval: {s}"),
        }
    }
}

/// The (symbol, interval) pair identifying one logical kline stream.
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct SubscriptionKey {
    pub symbol: Symbol,
    pub interval: Interval,
}

impl SubscriptionKey {
    pub fn new(symbol: Symbol, interval: Interval) -> Self {
        Self { symbol, interval }
    }

    /// Stream name as the exchange expects it, e.g. `ethusdt@kline_1m`.
    pub fn stream_name(&self) -> String {
        format!(
            "{}@kline_{}",
            self.symbol.as_str().to_lowercase(),
            self.interval.as_str()
        )
    }
}

impl std::fmt::Display for SubscriptionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", self.symbol, self.interval)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn symbol_parse_is_case_insensitive() {
        assert_eq!("ethusdt".parse::<Symbol>().unwrap(), Symbol::EthUsdt);
        assert_eq!(" BNBUSDT ".parse::<Symbol>().unwrap(), Symbol::BnbUsdt);
        assert!("BTCUSDT".parse::<Symbol>().is_err());
    }

    #[test]
    fn interval_parse_accepts_only_enumerated_values() {
        for iv in Interval::ALL {
            assert_eq!(iv.as_str().parse::<Interval>().unwrap(), iv);
        }
        assert!("2m".parse::<Interval>().is_err());
        assert!("1M".parse::<Interval>().is_err());
    }

    #[test]
    fn stream_name_lowercases_symbol() {
        let key = SubscriptionKey::new(Symbol::DotUsdt, Interval::FourHours);
        assert_eq!(key.stream_name(), "dotusdt@kline_4h");
        assert_eq!(key.to_string(), "DOTUSDT@4h");
    }

    #[test]
    fn key_serialises_with_exchange_spelling() {
        let key = SubscriptionKey::new(Symbol::BnbUsdt, Interval::FiveMinutes);
        let json = serde_json::to_string(&key).unwrap();
        assert_eq!(json, r#"{"symbol":"BNBUSDT","interval":"5m"}"#);
        let back: SubscriptionKey = serde_json::from_str(&json).unwrap();
        assert_eq!(back, key);
    }
}
