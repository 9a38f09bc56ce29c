use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Data types
// ---------------------------------------------------------------------------

/// A single OHLC candle from the kline stream.
///
/// `time` is the bucket start in seconds and is the candle's identity: the
/// exchange streams the same open bucket repeatedly until it closes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub time: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
}

/// Default number of candles retained per subscription key.
pub const DEFAULT_SERIES_CAP: usize = 100;

// ---------------------------------------------------------------------------
// CandleSeries -- bounded, time-ordered candles for one subscription key
// ---------------------------------------------------------------------------

/// Bounded ring of candles ordered by arrival of distinct bucket times.
///
/// An update for a bucket already present replaces it in place; a new bucket
/// is appended. Once the ring grows past `cap` the oldest buckets are evicted.
#[derive(Debug, Clone)]
pub struct CandleSeries {
    candles: VecDeque<Candle>,
    cap: usize,
}

impl CandleSeries {
    pub fn new(cap: usize) -> Self {
        let cap = cap.max(1);
        Self {
            candles: VecDeque::with_capacity(cap + 1),
            cap,
        }
    }

    /// Merge one candle update into the series.
    ///
    /// The matching bucket is searched explicitly (newest first, since live
    /// updates almost always hit the last entry) rather than assumed to be the
    /// tail.
    pub fn merge(&mut self, candle: Candle) {
        match self.candles.iter().rposition(|c| c.time == candle.time) {
            Some(idx) => self.candles[idx] = candle,
            None => self.candles.push_back(candle),
        }

        while self.candles.len() > self.cap {
            self.candles.pop_front();
        }
    }

    pub fn len(&self) -> usize {
        self.candles.len()
    }

    /// Copy of the series in order, oldest first.
    pub fn to_vec(&self) -> Vec<Candle> {
        self.candles.iter().copied().collect()
    }
}

impl Default for CandleSeries {
    fn default() -> Self {
        Self::new(DEFAULT_SERIES_CAP)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
