//! Candlestick pattern detectors
//!
//! Every detector asks one question about the newest closed candle and its
//! predecessors: does it look like a reversal out of the current zone?
//!
//! # Pattern Families
//!
//! - **Single-bar**: pin bar, doji family, hammer / shooting star / pyramidal
//! - **Two-bar**: engulfing after a same-coloured run, colour flip
//!
//! [`PatternSet`] bundles the detectors a [`StrengthTier`] enables and runs
//! them together.

pub mod helpers;

/// Generate `with_defaults()` -> `Self::default()` for multiple detector types.
macro_rules! impl_with_defaults {
  ($($detector:ty),* $(,)?) => {
    $(impl $detector {
      pub fn with_defaults() -> Self { Self::default() }
    })*
  };
}

pub mod single_bar;
pub mod two_bar;

use std::collections::{BTreeMap, HashMap};

pub use helpers::*;
pub use single_bar::*;
pub use two_bar::*;

use crate::{
    params::StrengthTier, zone::Zone, BuiltinDetector, PatternMatch, Result, SignalError, OHLC,
};

/// Names accepted as override keys
pub const DETECTOR_NAMES: &[&str] = &["pin_bar", "engulfing", "doji", "hammer", "color_flip"];

// ============================================================
// PATTERN SET
// ============================================================

/// Ordered collection of detectors evaluated together
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PatternSet {
    detectors: Vec<BuiltinDetector>,
}

impl PatternSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Detectors enabled by `tier`, with the engulfing run set to `min_prior_run`
    pub fn for_tier(tier: StrengthTier, min_prior_run: usize) -> Self {
        let engulfing = BuiltinDetector::Engulfing(EngulfingDetector::new(min_prior_run));
        let detectors = match tier {
            StrengthTier::Minimal => vec![BuiltinDetector::PinBar(PinBarDetector::standard())],
            StrengthTier::Standard => vec![
                BuiltinDetector::PinBar(PinBarDetector::standard()),
                engulfing,
                BuiltinDetector::Doji(DojiDetector::standard()),
                BuiltinDetector::Hammer(HammerDetector::standard()),
                BuiltinDetector::ColorFlip(ColorFlipDetector),
            ],
            StrengthTier::Strong => vec![
                BuiltinDetector::PinBar(PinBarDetector::strong()),
                engulfing,
                BuiltinDetector::Hammer(HammerDetector::strong()),
            ],
        };
        Self { detectors }
    }

    /// `for_tier` with the default engulfing run
    pub fn preset(tier: StrengthTier) -> Self {
        Self::for_tier(tier, ENGULFING_MIN_PRIOR_RUN)
    }

    pub fn add(mut self, detector: BuiltinDetector) -> Self {
        self.detectors.push(detector);
        self
    }

    /// Overlay per-detector parameter overrides, keyed by detector name.
    ///
    /// Overrides for a known detector that this set does not run are
    /// accepted and ignored; unknown detector names are rejected.
    pub fn with_overrides(self, overrides: &BTreeMap<String, BTreeMap<String, f64>>) -> Result<Self> {
        if let Some(unknown) = overrides.keys().find(|k| !DETECTOR_NAMES.contains(&k.as_str())) {
            return Err(SignalError::InvalidConfig(format!("unknown detector {unknown:?}")));
        }

        let mut detectors = Vec::with_capacity(self.detectors.len());
        for detector in self.detectors {
            match overrides.get(detector.name()) {
                Some(values) => {
                    let params: HashMap<&str, f64> =
                        values.iter().map(|(k, v)| (k.as_str(), *v)).collect();
                    let name = detector.name();
                    let tuned = detector.apply_params(&params).map_err(|e| {
                        SignalError::InvalidConfig(format!("detector {name}: {e}"))
                    })?;
                    detectors.push(tuned);
                }
                None => detectors.push(detector),
            }
        }

        let set = Self { detectors };
        set.validate()?;
        Ok(set)
    }

    pub fn validate(&self) -> Result<()> {
        self.detectors.iter().try_for_each(BuiltinDetector::validate_config)
    }

    /// All matches on the newest bar of `bars`, in detector order.
    /// Detectors without enough history are skipped.
    pub fn scan<T: OHLC>(&self, bars: &[T], zone: Zone) -> Vec<PatternMatch> {
        if zone.is_neutral() {
            return Vec::new();
        }
        self.detectors
            .iter()
            .filter(|d| bars.len() >= d.min_bars())
            .filter_map(|d| d.detect(bars, zone))
            .collect()
    }

    pub fn has_pattern<T: OHLC>(&self, bars: &[T], zone: Zone) -> bool {
        !zone.is_neutral()
            && self
                .detectors
                .iter()
                .any(|d| bars.len() >= d.min_bars() && d.detect(bars, zone).is_some())
    }

    /// Longest history any detector looks at
    pub fn max_lookback(&self) -> usize {
        self.detectors.iter().map(BuiltinDetector::min_bars).max().unwrap_or(0)
    }

    pub fn detectors(&self) -> &[BuiltinDetector] {
        &self.detectors
    }

    pub fn len(&self) -> usize {
        self.detectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.detectors.is_empty()
    }
}

/// OR over the detectors `tier` enables, at default thresholds.
pub fn has_pattern<T: OHLC>(bars: &[T], zone: Zone, tier: StrengthTier) -> bool {
    PatternSet::preset(tier).has_pattern(bars, zone)
}
