pub mod candle_series;
pub mod kline_message;

pub use candle_series::{Candle, CandleSeries, DEFAULT_SERIES_CAP};
pub use kline_message::{kline_stream_url, parse_kline_message, ping_message};
