//! Zone classification and cross-timeframe correlation

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::{Direction, Ratio, Result, SignalError};

/// Oscillator zone. Derived per evaluation, never stored on its own.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub enum Zone {
    Overbought,
    Oversold,
    Neutral,
}

impl Zone {
    #[inline]
    pub fn is_neutral(self) -> bool {
        matches!(self, Zone::Neutral)
    }

    /// Direction a reversal out of this zone would take.
    #[inline]
    pub fn reversal_direction(self) -> Direction {
        match self {
            Zone::Overbought => Direction::Bearish,
            Zone::Oversold => Direction::Bullish,
            Zone::Neutral => Direction::Neutral,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Zone::Overbought => "overbought",
            Zone::Oversold => "oversold",
            Zone::Neutral => "neutral",
        }
    }
}

impl fmt::Display for Zone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Zone {
    type Err = SignalError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "overbought" => Ok(Zone::Overbought),
            "oversold" => Ok(Zone::Oversold),
            "neutral" => Ok(Zone::Neutral),
            _ => Err(SignalError::InvalidValue("unknown zone")),
        }
    }
}

/// Overbought/oversold boundaries for one timeframe
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ZoneThresholds {
    pub overbought: Ratio,
    pub oversold: Ratio,
}

impl ZoneThresholds {
    /// Fast timeframe default
    pub const FAST: Self = Self {
        overbought: Ratio::new_const(0.70),
        oversold: Ratio::new_const(0.30),
    };

    /// Slow timeframe default
    pub const SLOW: Self = Self {
        overbought: Ratio::new_const(0.71),
        oversold: Ratio::new_const(0.29),
    };

    pub fn new(overbought: f64, oversold: f64) -> Result<Self> {
        let thresholds = Self {
            overbought: Ratio::new(overbought)?,
            oversold: Ratio::new(oversold)?,
        };
        thresholds.validate()?;
        Ok(thresholds)
    }

    pub fn validate(&self) -> Result<()> {
        if self.oversold.get() >= self.overbought.get() {
            return Err(SignalError::InvalidConfig(format!(
                "oversold threshold {} must be below overbought threshold {}",
                self.oversold.get(),
                self.overbought.get()
            )));
        }
        Ok(())
    }
}

/// Classify an oscillator reading. An undefined reading is Neutral.
pub fn zone_of(value: Option<f64>, thresholds: &ZoneThresholds) -> Zone {
    match value {
        Some(v) if v >= thresholds.overbought.get() => Zone::Overbought,
        Some(v) if v <= thresholds.oversold.get() => Zone::Oversold,
        _ => Zone::Neutral,
    }
}

/// Shared zone when both timeframes agree on a non-neutral zone.
pub fn correlate(fast: Zone, slow: Zone) -> Option<Zone> {
    (fast == slow && !fast.is_neutral()).then_some(fast)
}
