//! Single-bar reversal detectors: pin bar, doji family, hammer family
//!
//! Each detector looks at the last closed candle only and fires when its
//! geometry points out of the current zone: long upper wicks in Overbought,
//! long lower wicks in Oversold.

use std::collections::HashMap;

use super::helpers::{
    self, has_range, is_small_body, opposite_wick, wick_dominates, zone_wick,
};
use crate::{
    params::{
        get_factor, get_ratio, validate_values, ParamMeta, ParameterizedDetector,
    },
    zone::Zone,
    Direction, OHLCExt, PatternDetector, PatternKind, PatternMatch, Ratio, Result, SignalError,
    OHLC,
};

impl_with_defaults!(PinBarDetector, DojiDetector, HammerDetector);

// ============================================================
// PIN BAR
// ============================================================

/// Pin bar: small body with a long wick on the zone's side
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PinBarDetector {
    /// Zone-side wick must be at least this multiple of the body
    pub wick_to_body_ratio: f64,
    /// Body must be at most this fraction of the range
    pub max_body_ratio: Ratio,
}

impl PinBarDetector {
    pub const fn standard() -> Self {
        Self {
            wick_to_body_ratio: helpers::PIN_WICK_TO_BODY,
            max_body_ratio: Ratio::new_const(helpers::PIN_MAX_BODY_RATIO),
        }
    }

    pub const fn strong() -> Self {
        Self {
            wick_to_body_ratio: helpers::PIN_WICK_TO_BODY_STRONG,
            max_body_ratio: Ratio::new_const(helpers::PIN_MAX_BODY_RATIO_STRONG),
        }
    }
}

impl Default for PinBarDetector {
    fn default() -> Self {
        Self::standard()
    }
}

impl PatternDetector for PinBarDetector {
    fn name(&self) -> &'static str {
        "pin_bar"
    }

    fn min_bars(&self) -> usize {
        1
    }

    fn detect<T: OHLC>(&self, bars: &[T], zone: Zone) -> Option<PatternMatch> {
        let bar = bars.last()?;
        let wick = zone_wick(bar, zone)?;
        let body = bar.body();

        if !is_small_body(body, bar.guarded_range(), self.max_body_ratio.get()) {
            return None;
        }
        if !wick_dominates(wick, body, self.wick_to_body_ratio) {
            return None;
        }

        Some(PatternMatch {
            kind: PatternKind::PinBar,
            direction: zone.reversal_direction(),
        })
    }

    fn validate_config(&self) -> Result<()> {
        PIN_BAR_PARAMS[0].validate(self.wick_to_body_ratio)
    }
}

// ============================================================
// DOJI FAMILY
// ============================================================

/// Doji sub-classification by wick asymmetry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DojiKind {
    /// Long lower wick, negligible upper
    Dragonfly,
    /// Long upper wick, negligible lower
    Gravestone,
    /// Both wicks substantial
    LongLegged,
    Plain,
}

impl DojiKind {
    pub fn pattern_kind(self) -> PatternKind {
        match self {
            DojiKind::Dragonfly => PatternKind::DragonflyDoji,
            DojiKind::Gravestone => PatternKind::GravestoneDoji,
            DojiKind::LongLegged => PatternKind::LongLeggedDoji,
            DojiKind::Plain => PatternKind::Doji,
        }
    }

    /// Zone this doji may fire in. Dragonfly and gravestone are one-sided.
    fn fits(self, zone: Zone) -> bool {
        match self {
            DojiKind::Dragonfly => zone == Zone::Oversold,
            DojiKind::Gravestone => zone == Zone::Overbought,
            DojiKind::LongLegged | DojiKind::Plain => !zone.is_neutral(),
        }
    }
}

/// Doji: body negligible against the range
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DojiDetector {
    pub max_body_ratio: Ratio,
    pub negligible_wick_ratio: Ratio,
    pub long_wick_ratio: Ratio,
    pub substantial_wick_ratio: Ratio,
}

impl DojiDetector {
    pub const fn standard() -> Self {
        Self {
            max_body_ratio: Ratio::new_const(helpers::DOJI_BODY_RATIO),
            negligible_wick_ratio: Ratio::new_const(helpers::DOJI_NEGLIGIBLE_WICK_RATIO),
            long_wick_ratio: Ratio::new_const(helpers::DOJI_LONG_WICK_RATIO),
            substantial_wick_ratio: Ratio::new_const(helpers::DOJI_SUBSTANTIAL_WICK_RATIO),
        }
    }

    /// Classify a bar, `None` when it is not a doji at all.
    pub fn classify<T: OHLC>(&self, bar: &T) -> Option<DojiKind> {
        if !has_range(bar) || bar.body_ratio() > self.max_body_ratio.get() {
            return None;
        }

        let upper = bar.upper_wick_ratio();
        let lower = bar.lower_wick_ratio();
        let negligible = self.negligible_wick_ratio.get();
        let long = self.long_wick_ratio.get();
        let substantial = self.substantial_wick_ratio.get();

        let kind = if lower >= long && upper <= negligible {
            DojiKind::Dragonfly
        } else if upper >= long && lower <= negligible {
            DojiKind::Gravestone
        } else if upper >= substantial && lower >= substantial {
            DojiKind::LongLegged
        } else {
            DojiKind::Plain
        };
        Some(kind)
    }
}

impl Default for DojiDetector {
    fn default() -> Self {
        Self::standard()
    }
}

impl PatternDetector for DojiDetector {
    fn name(&self) -> &'static str {
        "doji"
    }

    fn min_bars(&self) -> usize {
        1
    }

    fn detect<T: OHLC>(&self, bars: &[T], zone: Zone) -> Option<PatternMatch> {
        let kind = self.classify(bars.last()?)?;
        if !kind.fits(zone) {
            return None;
        }

        let pattern = kind.pattern_kind();
        Some(PatternMatch {
            kind: pattern,
            direction: pattern.typical_direction().unwrap_or(Direction::Neutral),
        })
    }

    fn validate_config(&self) -> Result<()> {
        if self.negligible_wick_ratio.get() >= self.long_wick_ratio.get() {
            return Err(SignalError::InvalidConfig(
                "doji negligible_wick_ratio must be below long_wick_ratio".into(),
            ));
        }
        Ok(())
    }
}

// ============================================================
// HAMMER FAMILY
// ============================================================

/// Hammer (Oversold, dominant lower wick) and shooting star (Overbought,
/// dominant upper wick). The zone-side wick must be strictly longer than the
/// opposite wick. Matches whose wick reaches
/// [`helpers::PYRAMIDAL_WICK_RATIO`] of the range report as pyramidal.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HammerDetector {
    pub max_body_ratio: Ratio,
    /// Zone-side wick as a fraction of the range
    pub min_wick_ratio: Ratio,
    pub max_opposite_wick_ratio: Ratio,
}

impl HammerDetector {
    pub const fn standard() -> Self {
        Self {
            max_body_ratio: Ratio::new_const(helpers::HAMMER_MAX_BODY_RATIO),
            min_wick_ratio: Ratio::new_const(helpers::HAMMER_MIN_WICK_RATIO),
            max_opposite_wick_ratio: Ratio::new_const(helpers::HAMMER_MAX_OPPOSITE_WICK_RATIO),
        }
    }

    /// Pyramidal geometry
    pub const fn strong() -> Self {
        Self {
            max_body_ratio: Ratio::new_const(helpers::PYRAMIDAL_MAX_BODY_RATIO),
            min_wick_ratio: Ratio::new_const(helpers::PYRAMIDAL_WICK_RATIO),
            max_opposite_wick_ratio: Ratio::new_const(helpers::PYRAMIDAL_MAX_OPPOSITE_WICK_RATIO),
        }
    }
}

impl Default for HammerDetector {
    fn default() -> Self {
        Self::standard()
    }
}

impl PatternDetector for HammerDetector {
    fn name(&self) -> &'static str {
        "hammer"
    }

    fn min_bars(&self) -> usize {
        1
    }

    fn detect<T: OHLC>(&self, bars: &[T], zone: Zone) -> Option<PatternMatch> {
        let bar = bars.last()?;
        if !has_range(bar) {
            return None;
        }
        let range = bar.range();
        let wick = zone_wick(bar, zone)? / range;
        let opposite = opposite_wick(bar, zone)? / range;

        if bar.body_ratio() > self.max_body_ratio.get() {
            return None;
        }
        if wick < self.min_wick_ratio.get() || opposite > self.max_opposite_wick_ratio.get() {
            return None;
        }
        if wick <= opposite {
            return None;
        }

        let kind = if wick >= helpers::PYRAMIDAL_WICK_RATIO {
            PatternKind::Pyramidal
        } else if zone == Zone::Oversold {
            PatternKind::Hammer
        } else {
            PatternKind::ShootingStar
        };

        Some(PatternMatch {
            kind,
            direction: zone.reversal_direction(),
        })
    }
}

// ============================================================
// PARAMETER METADATA
// ============================================================

const PIN_BAR_PARAMS: &[ParamMeta] = &[
    ParamMeta::factor(
        "wick_to_body_ratio",
        helpers::PIN_WICK_TO_BODY,
        (0.5, 10.0),
        "Zone-side wick as a multiple of the body",
    ),
    ParamMeta::ratio(
        "max_body_ratio",
        helpers::PIN_MAX_BODY_RATIO,
        (0.0, 1.0),
        "Largest body as a fraction of the range",
    ),
];

const DOJI_PARAMS: &[ParamMeta] = &[
    ParamMeta::ratio(
        "max_body_ratio",
        helpers::DOJI_BODY_RATIO,
        (0.0, 0.3),
        "Largest body as a fraction of the range",
    ),
    ParamMeta::ratio(
        "negligible_wick_ratio",
        helpers::DOJI_NEGLIGIBLE_WICK_RATIO,
        (0.0, 0.3),
        "Wick at or below this fraction counts as absent",
    ),
    ParamMeta::ratio(
        "long_wick_ratio",
        helpers::DOJI_LONG_WICK_RATIO,
        (0.3, 1.0),
        "Dominant wick of a dragonfly or gravestone",
    ),
    ParamMeta::ratio(
        "substantial_wick_ratio",
        helpers::DOJI_SUBSTANTIAL_WICK_RATIO,
        (0.1, 0.5),
        "Both wicks of a long-legged doji",
    ),
];

const HAMMER_PARAMS: &[ParamMeta] = &[
    ParamMeta::ratio(
        "max_body_ratio",
        helpers::HAMMER_MAX_BODY_RATIO,
        (0.0, 0.6),
        "Largest body as a fraction of the range",
    ),
    ParamMeta::ratio(
        "min_wick_ratio",
        helpers::HAMMER_MIN_WICK_RATIO,
        (0.1, 1.0),
        "Zone-side wick as a fraction of the range",
    ),
    ParamMeta::ratio(
        "max_opposite_wick_ratio",
        helpers::HAMMER_MAX_OPPOSITE_WICK_RATIO,
        (0.0, 0.5),
        "Largest opposite wick as a fraction of the range",
    ),
];

// ============================================================
// PARAMETERIZED DETECTOR IMPLEMENTATIONS
// ============================================================

impl ParameterizedDetector for PinBarDetector {
    fn param_meta() -> &'static [ParamMeta] {
        PIN_BAR_PARAMS
    }

    fn apply_params(self, params: &HashMap<&str, f64>) -> Result<Self> {
        Self::check_keys(params)?;
        validate_values(PIN_BAR_PARAMS, params)?;
        Ok(Self {
            wick_to_body_ratio: get_factor(params, "wick_to_body_ratio", self.wick_to_body_ratio)?,
            max_body_ratio: get_ratio(params, "max_body_ratio", self.max_body_ratio)?,
        })
    }
}

impl ParameterizedDetector for DojiDetector {
    fn param_meta() -> &'static [ParamMeta] {
        DOJI_PARAMS
    }

    fn apply_params(self, params: &HashMap<&str, f64>) -> Result<Self> {
        Self::check_keys(params)?;
        validate_values(DOJI_PARAMS, params)?;
        Ok(Self {
            max_body_ratio: get_ratio(params, "max_body_ratio", self.max_body_ratio)?,
            negligible_wick_ratio: get_ratio(
                params,
                "negligible_wick_ratio",
                self.negligible_wick_ratio,
            )?,
            long_wick_ratio: get_ratio(params, "long_wick_ratio", self.long_wick_ratio)?,
            substantial_wick_ratio: get_ratio(
                params,
                "substantial_wick_ratio",
                self.substantial_wick_ratio,
            )?,
        })
    }
}

impl ParameterizedDetector for HammerDetector {
    fn param_meta() -> &'static [ParamMeta] {
        HAMMER_PARAMS
    }

    fn apply_params(self, params: &HashMap<&str, f64>) -> Result<Self> {
        Self::check_keys(params)?;
        validate_values(HAMMER_PARAMS, params)?;
        Ok(Self {
            max_body_ratio: get_ratio(params, "max_body_ratio", self.max_body_ratio)?,
            min_wick_ratio: get_ratio(params, "min_wick_ratio", self.min_wick_ratio)?,
            max_opposite_wick_ratio: get_ratio(
                params,
                "max_opposite_wick_ratio",
                self.max_opposite_wick_ratio,
            )?,
        })
    }
}
