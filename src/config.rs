//! Engine configuration
//!
//! Plain serde structs with defaults for every field, so a JSON file only
//! needs to name what it changes. [`EngineConfig::validate`] runs after every
//! load and before an engine is built.

use std::{collections::BTreeMap, fs, path::Path};

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::{
    detectors::ENGULFING_MIN_PRIOR_RUN, oscillator::DEFAULT_PERIOD, params::StrengthTier,
    signal::Scope, zone::ZoneThresholds, Period, Ratio, Result, SignalError,
};

/// Bars fetched beyond the oscillator period
pub const FETCH_HEADROOM: usize = 50;

/// One week
pub const DEFAULT_DEDUP_RETENTION_SECS: u64 = 7 * 24 * 60 * 60;

// ============================================================
// TIMEFRAME
// ============================================================

/// A provider timeframe id with its zone thresholds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeframeConfig {
    pub id: String,
    pub overbought: Ratio,
    pub oversold: Ratio,
}

impl TimeframeConfig {
    pub fn new(id: impl Into<String>, overbought: f64, oversold: f64) -> Result<Self> {
        let thresholds = ZoneThresholds::new(overbought, oversold)?;
        Ok(Self {
            id: id.into(),
            overbought: thresholds.overbought,
            oversold: thresholds.oversold,
        })
    }

    /// 4h bars, 0.70 / 0.30
    pub fn fast_default() -> Self {
        Self::with_thresholds("240", ZoneThresholds::FAST)
    }

    /// Daily bars, 0.71 / 0.29
    pub fn slow_default() -> Self {
        Self::with_thresholds("D", ZoneThresholds::SLOW)
    }

    fn with_thresholds(id: &str, thresholds: ZoneThresholds) -> Self {
        Self {
            id: id.to_string(),
            overbought: thresholds.overbought,
            oversold: thresholds.oversold,
        }
    }

    pub fn thresholds(&self) -> ZoneThresholds {
        ZoneThresholds {
            overbought: self.overbought,
            oversold: self.oversold,
        }
    }

    fn validate(&self, role: &str) -> Result<()> {
        if self.id.trim().is_empty() {
            return Err(SignalError::InvalidConfig(format!("{role} timeframe id is empty")));
        }
        if self.id == Scope::CROSS || self.id.contains('|') {
            return Err(SignalError::InvalidConfig(format!(
                "{role} timeframe id {:?} is reserved or contains '|'",
                self.id
            )));
        }
        self.thresholds().validate()
    }
}

// ============================================================
// ENGINE
// ============================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Oscillator lookback
    pub period: Period,
    pub fast: TimeframeConfig,
    pub slow: TimeframeConfig,
    pub strength_tier: StrengthTier,
    /// Same-coloured candles the engulfing detector wants before the covered one
    pub min_prior_run_length: usize,
    pub dedup_retention_secs: u64,
    /// Bars requested per timeframe, `period + 50` when unset
    pub fetch_limit: Option<usize>,
    /// Detector name -> parameter name -> value
    pub pattern_overrides: BTreeMap<String, BTreeMap<String, f64>>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            period: DEFAULT_PERIOD,
            fast: TimeframeConfig::fast_default(),
            slow: TimeframeConfig::slow_default(),
            strength_tier: StrengthTier::default(),
            min_prior_run_length: ENGULFING_MIN_PRIOR_RUN,
            dedup_retention_secs: DEFAULT_DEDUP_RETENTION_SECS,
            fetch_limit: None,
            pattern_overrides: BTreeMap::new(),
        }
    }
}

impl EngineConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let config = Self::from_json_str(&fs::read_to_string(path)?)?;
        info!(
            path = %path.display(),
            period = config.period.get(),
            fast = %config.fast.id,
            slow = %config.slow.id,
            tier = config.strength_tier.as_str(),
            "configuration loaded"
        );
        Ok(config)
    }

    /// Closed bars each timeframe needs before it can be evaluated
    pub fn min_history(&self) -> usize {
        self.period.get() + 1
    }

    pub fn fetch_limit(&self) -> usize {
        self.fetch_limit.unwrap_or(self.period.get() + FETCH_HEADROOM)
    }

    pub fn validate(&self) -> Result<()> {
        self.fast.validate("fast")?;
        self.slow.validate("slow")?;
        if self.fast.id == self.slow.id {
            return Err(SignalError::InvalidConfig(format!(
                "fast and slow timeframes are both {:?}",
                self.fast.id
            )));
        }
        if self.dedup_retention_secs == 0 {
            return Err(SignalError::InvalidConfig("dedup_retention_secs must be positive".into()));
        }
        // one extra raw row is the still-forming bar
        if self.fetch_limit() < self.min_history() + 1 {
            return Err(SignalError::InvalidConfig(format!(
                "fetch_limit {} cannot cover {} closed bars",
                self.fetch_limit(),
                self.min_history()
            )));
        }
        Ok(())
    }
}
