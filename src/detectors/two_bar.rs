//! Two-bar reversal detectors: engulfing with a prior run, colour flip

#![allow(clippy::default_constructed_unit_structs)]

use std::collections::HashMap;

use super::helpers::{self, has_color};
use crate::{
    params::{get_count, validate_values, ParamMeta, ParameterizedDetector},
    zone::Zone,
    OHLCExt, PatternDetector, PatternKind, PatternMatch, Result, OHLC,
};

impl_with_defaults!(EngulfingDetector, ColorFlipDetector);

// ============================================================
// ENGULFING
// ============================================================

/// Engulfing reversal after a same-coloured run.
///
/// Overbought: a red candle whose body covers the previous green body, with
/// `min_prior_run` green candles before that. Oversold mirrors it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngulfingDetector {
    /// Same-coloured candles required before the covered one
    pub min_prior_run: usize,
}

impl EngulfingDetector {
    pub const fn new(min_prior_run: usize) -> Self {
        Self { min_prior_run }
    }
}

impl Default for EngulfingDetector {
    fn default() -> Self {
        Self::new(helpers::ENGULFING_MIN_PRIOR_RUN)
    }
}

impl PatternDetector for EngulfingDetector {
    fn name(&self) -> &'static str {
        "engulfing"
    }

    fn min_bars(&self) -> usize {
        self.min_prior_run + 2
    }

    fn detect<T: OHLC>(&self, bars: &[T], zone: Zone) -> Option<PatternMatch> {
        if zone.is_neutral() || bars.len() < self.min_bars() {
            return None;
        }

        let n = bars.len();
        let current = &bars[n - 1];
        let covered = &bars[n - 2];
        let direction = zone.reversal_direction();
        let run_color = direction.opposite();

        if !has_color(current, direction) || !has_color(covered, run_color) {
            return None;
        }
        if current.body_top() < covered.body_top() || current.body_bottom() > covered.body_bottom() {
            return None;
        }

        let run = &bars[n - 2 - self.min_prior_run..n - 2];
        if !run.iter().all(|bar| has_color(bar, run_color)) {
            return None;
        }

        Some(PatternMatch {
            kind: PatternKind::Engulfing,
            direction,
        })
    }

    fn validate_config(&self) -> Result<()> {
        ENGULFING_PARAMS[0].validate(self.min_prior_run as f64)
    }
}

// ============================================================
// COLOUR FLIP
// ============================================================

/// Previous candle's colour flips against the zone: red then green in
/// Oversold, green then red in Overbought.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ColorFlipDetector;

impl PatternDetector for ColorFlipDetector {
    fn name(&self) -> &'static str {
        "color_flip"
    }

    fn min_bars(&self) -> usize {
        2
    }

    fn detect<T: OHLC>(&self, bars: &[T], zone: Zone) -> Option<PatternMatch> {
        if zone.is_neutral() || bars.len() < 2 {
            return None;
        }
        let direction = zone.reversal_direction();
        let n = bars.len();

        (has_color(&bars[n - 2], direction.opposite()) && has_color(&bars[n - 1], direction))
            .then_some(PatternMatch {
                kind: PatternKind::ColorFlip,
                direction,
            })
    }
}

// ============================================================
// PARAMETER METADATA
// ============================================================

const ENGULFING_PARAMS: &[ParamMeta] = &[ParamMeta::count(
    "min_prior_run",
    helpers::ENGULFING_MIN_PRIOR_RUN as f64,
    (0.0, helpers::ENGULFING_MAX_PRIOR_RUN as f64),
    "Same-coloured candles before the covered one",
)];

impl ParameterizedDetector for EngulfingDetector {
    fn param_meta() -> &'static [ParamMeta] {
        ENGULFING_PARAMS
    }

    fn apply_params(self, params: &HashMap<&str, f64>) -> Result<Self> {
        Self::check_keys(params)?;
        validate_values(ENGULFING_PARAMS, params)?;
        Ok(Self {
            min_prior_run: get_count(params, "min_prior_run", self.min_prior_run)?,
        })
    }
}

impl ParameterizedDetector for ColorFlipDetector {
    fn param_meta() -> &'static [ParamMeta] {
        &[]
    }

    fn apply_params(self, params: &HashMap<&str, f64>) -> Result<Self> {
        Self::check_keys(params)?;
        Ok(self)
    }
}
