//! Candle model and closed-bar normalization
//!
//! Providers hand back rows in arbitrary order with the newest bar still
//! forming. [`normalize`] turns that into a strictly ascending series that
//! ends on a closed bar.

use serde::{Deserialize, Serialize};

use crate::{OHLCExt, Result, SignalError, OHLC};

/// One price bar. `timestamp` is the bar open time in Unix milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub timestamp: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
}

impl Candle {
    pub fn new(timestamp: i64, open: f64, high: f64, low: f64, close: f64) -> Self {
        Self {
            timestamp,
            open,
            high,
            low,
            close,
        }
    }
}

impl OHLC for Candle {
    fn open(&self) -> f64 {
        self.open
    }

    fn high(&self) -> f64 {
        self.high
    }

    fn low(&self) -> f64 {
        self.low
    }

    fn close(&self) -> f64 {
        self.close
    }

    fn timestamp(&self) -> Option<i64> {
        Some(self.timestamp)
    }
}

/// Sort ascending, collapse repeated timestamps (the later-supplied row wins)
/// and drop the still-forming last bar.
///
/// Fewer than two distinct bars means there is no usable closed bar, so the
/// result is empty.
pub fn normalize(mut raw: Vec<Candle>) -> Vec<Candle> {
    // stable: rows sharing a timestamp keep provider order
    raw.sort_by_key(|c| c.timestamp);

    let mut series: Vec<Candle> = Vec::with_capacity(raw.len());
    for candle in raw {
        match series.last_mut() {
            Some(last) if last.timestamp == candle.timestamp => *last = candle,
            _ => series.push(candle),
        }
    }

    if series.len() < 2 {
        return Vec::new();
    }
    series.pop();
    series
}

/// Require at least `need` closed bars.
pub fn ensure_history(series: &[Candle], need: usize) -> Result<()> {
    if series.len() < need {
        return Err(SignalError::InsufficientData {
            need,
            got: series.len(),
        });
    }
    Ok(())
}

/// Check every bar for NaN/infinite prices and inverted ranges.
pub fn validate_bars<T: OHLC>(bars: &[T]) -> Result<()> {
    for (i, bar) in bars.iter().enumerate() {
        bar.validate().map_err(|e| match e {
            SignalError::InvalidCandle { reason, .. } => {
                SignalError::InvalidCandle { index: i, reason }
            }
            other => other,
        })?;
    }
    Ok(())
}
