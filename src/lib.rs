//! # zonewatch - DeMarker zone and candlestick signal engine
//!
//! Evaluates closed-bar price series per symbol on a fast and a slow
//! timeframe, classifies each into an oscillator zone, runs a family of
//! candlestick detectors against that zone, and turns the combination into at
//! most one deduplicated alert per symbol and closed bar.
//!
//! ## Quick Start
//!
//! ```rust
//! use zonewatch::prelude::*;
//!
//! let engine = EngineBuilder::new()
//!     .period(28)
//!     .unwrap()
//!     .strength_tier(StrengthTier::Standard)
//!     .build()
//!     .unwrap();
//!
//! // Raw rows straight from a provider: any order, newest bar still forming.
//! let fast: Vec<Candle> = vec![];
//! let slow: Vec<Candle> = vec![];
//!
//! // Too little history is a skip, not a failure of the whole sweep.
//! let outcome = engine.evaluate("BTCUSDT", fast, slow);
//! assert!(matches!(outcome, Err(SignalError::InsufficientData { .. })));
//!
//! assert_eq!(correlate(Zone::Overbought, Zone::Overbought), Some(Zone::Overbought));
//! ```

pub mod config;
pub mod dedup;
pub mod detectors;
pub mod engine;
pub mod oscillator;
pub mod params;
pub mod series;
pub mod signal;
pub mod zone;

pub mod prelude {
    pub use crate::{
        // Configuration
        config::{EngineConfig, TimeframeConfig},
        // Dedup
        dedup::{unix_now, DedupKey, DedupStore},
        // Detectors
        detectors::*,
        // Engine
        engine::{
            evaluate_parallel, AlertNotifier, CandleProvider, EngineBuilder, EvaluationError,
            EvaluationResult, Instrument, SignalEngine, SweepReport,
        },
        oscillator::DeMarker,
        // Parameters
        params::{ParamMeta, ParamType, ParameterizedDetector, StrengthTier},
        series::{normalize, Candle},
        signal::{classify, Scope, Signal, SignalKind, TimeframeReading},
        zone::{correlate, zone_of, Zone, ZoneThresholds},
        // Core traits
        BuiltinDetector,
        Direction,
        OHLCExt,
        PatternDetector,
        PatternKind,
        PatternMatch,
        Period,
        Ratio,
        Result,
        // Errors
        SignalError,
        OHLC,
    };
}

use zone::Zone;

// ============================================================
// ERRORS
// ============================================================

pub type Result<T> = std::result::Result<T, SignalError>;

/// Errors produced while configuring the engine or evaluating a symbol
#[derive(Debug, thiserror::Error)]
pub enum SignalError {
    #[error("Invalid value: {0}")]
    InvalidValue(&'static str),

    #[error("{field} = {value} out of range [{min}, {max}]")]
    OutOfRange {
        field: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },

    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    #[error("Insufficient data: need {need} closed bars, got {got}")]
    InsufficientData { need: usize, got: usize },

    #[error("Invalid candle at index {index}: {reason}")]
    InvalidCandle { index: usize, reason: &'static str },

    #[error("Candle provider failed: {0}")]
    Provider(String),

    #[error("Alert delivery failed: {0}")]
    Delivery(String),

    #[error("Invalid dedup key {0:?}")]
    InvalidKey(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl SignalError {
    /// True for conditions that mean "no usable data this cycle": the symbol
    /// is skipped quietly instead of being reported as a failure.
    pub fn is_data_unavailable(&self) -> bool {
        matches!(
            self,
            SignalError::InsufficientData { .. } | SignalError::Provider(_)
        )
    }
}

// ============================================================
// VALIDATED TYPES
// ============================================================

/// Normalized value in range 0.0..=1.0
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct Ratio(f64);

impl Ratio {
    /// Create a new Ratio, validating the value is in [0.0, 1.0]
    pub fn new(value: f64) -> Result<Self> {
        if value.is_nan() || value.is_infinite() {
            return Err(SignalError::InvalidValue(
                "Ratio cannot be NaN or infinite",
            ));
        }
        if !(0.0..=1.0).contains(&value) {
            return Err(SignalError::OutOfRange {
                field: "Ratio",
                value,
                min: 0.0,
                max: 1.0,
            });
        }
        Ok(Self(value))
    }

    /// Create a Ratio from a compile-time constant (library internal use)
    #[doc(hidden)]
    pub const fn new_const(value: f64) -> Self {
        Self(value)
    }

    #[inline]
    pub fn get(self) -> f64 {
        self.0
    }
}

impl serde::Serialize for Ratio {
    fn serialize<S: serde::Serializer>(&self, s: S) -> std::result::Result<S::Ok, S::Error> {
        self.0.serialize(s)
    }
}

impl<'de> serde::Deserialize<'de> for Ratio {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> std::result::Result<Self, D::Error> {
        let value = f64::deserialize(d)?;
        Ratio::new(value).map_err(serde::de::Error::custom)
    }
}

/// Period (must be > 0)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Period(usize);

impl Period {
    /// Create a new Period, validating value is > 0
    pub fn new(value: usize) -> Result<Self> {
        if value == 0 {
            return Err(SignalError::InvalidValue("Period must be > 0"));
        }
        Ok(Self(value))
    }

    #[doc(hidden)]
    pub const fn new_const(value: usize) -> Self {
        Self(value)
    }

    #[inline]
    pub fn get(self) -> usize {
        self.0
    }
}

impl serde::Serialize for Period {
    fn serialize<S: serde::Serializer>(&self, s: S) -> std::result::Result<S::Ok, S::Error> {
        self.0.serialize(s)
    }
}

impl<'de> serde::Deserialize<'de> for Period {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> std::result::Result<Self, D::Error> {
        let value = usize::deserialize(d)?;
        Period::new(value).map_err(serde::de::Error::custom)
    }
}

// ============================================================
// OHLC TRAITS
// ============================================================

/// Smallest range treated as non-degenerate when dividing by `high - low`.
pub const RANGE_EPSILON: f64 = 1e-12;

/// Core price bar trait
pub trait OHLC {
    fn open(&self) -> f64;
    fn high(&self) -> f64;
    fn low(&self) -> f64;
    fn close(&self) -> f64;

    fn timestamp(&self) -> Option<i64> {
        None
    }
}

/// Extension trait with computed candle geometry
pub trait OHLCExt: OHLC {
    #[inline]
    fn body(&self) -> f64 {
        (self.close() - self.open()).abs()
    }

    #[inline]
    fn range(&self) -> f64 {
        self.high() - self.low()
    }

    /// Range floored at [`RANGE_EPSILON`], safe as a divisor
    #[inline]
    fn guarded_range(&self) -> f64 {
        self.range().max(RANGE_EPSILON)
    }

    #[inline]
    fn upper_wick(&self) -> f64 {
        self.high() - self.open().max(self.close())
    }

    #[inline]
    fn lower_wick(&self) -> f64 {
        self.open().min(self.close()) - self.low()
    }

    #[inline]
    fn body_top(&self) -> f64 {
        self.open().max(self.close())
    }

    #[inline]
    fn body_bottom(&self) -> f64 {
        self.open().min(self.close())
    }

    /// Green candle
    #[inline]
    fn is_bullish(&self) -> bool {
        self.close() > self.open()
    }

    /// Red candle
    #[inline]
    fn is_bearish(&self) -> bool {
        self.close() < self.open()
    }

    /// Candle colour as a direction. Flat candles have no colour.
    #[inline]
    fn color(&self) -> Option<Direction> {
        if self.is_bullish() {
            Some(Direction::Bullish)
        } else if self.is_bearish() {
            Some(Direction::Bearish)
        } else {
            None
        }
    }

    /// Body as ratio of the guarded range
    #[inline]
    fn body_ratio(&self) -> f64 {
        self.body() / self.guarded_range()
    }

    #[inline]
    fn upper_wick_ratio(&self) -> f64 {
        self.upper_wick() / self.guarded_range()
    }

    #[inline]
    fn lower_wick_ratio(&self) -> f64 {
        self.lower_wick() / self.guarded_range()
    }

    /// Validate bar consistency
    fn validate(&self) -> Result<()> {
        if self.open().is_nan()
            || self.high().is_nan()
            || self.low().is_nan()
            || self.close().is_nan()
        {
            return Err(SignalError::InvalidCandle {
                index: 0,
                reason: "NaN in OHLC",
            });
        }
        if self.open().is_infinite()
            || self.high().is_infinite()
            || self.low().is_infinite()
            || self.close().is_infinite()
        {
            return Err(SignalError::InvalidCandle {
                index: 0,
                reason: "Infinite value in OHLC",
            });
        }
        if self.high() < self.low() {
            return Err(SignalError::InvalidCandle {
                index: 0,
                reason: "high < low",
            });
        }
        Ok(())
    }
}

impl<T: OHLC> OHLCExt for T {}

// ============================================================
// PATTERN MATCH - result of detection (Copy, no allocations)
// ============================================================

/// Direction/bias of a pattern or candle
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum Direction {
    Bullish,
    Neutral,
    Bearish,
}

impl Direction {
    #[inline]
    pub fn is_bullish(self) -> bool {
        matches!(self, Direction::Bullish)
    }

    #[inline]
    pub fn is_bearish(self) -> bool {
        matches!(self, Direction::Bearish)
    }

    #[inline]
    pub fn opposite(self) -> Self {
        match self {
            Direction::Bullish => Direction::Bearish,
            Direction::Bearish => Direction::Bullish,
            Direction::Neutral => Direction::Neutral,
        }
    }
}

/// Kind of candlestick pattern reported by a detector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum PatternKind {
    PinBar,
    Engulfing,
    Doji,
    DragonflyDoji,
    GravestoneDoji,
    LongLeggedDoji,
    Hammer,
    ShootingStar,
    Pyramidal,
    ColorFlip,
}

impl PatternKind {
    /// Returns the string identifier
    pub fn as_str(&self) -> &'static str {
        match self {
            PatternKind::PinBar => "PIN_BAR",
            PatternKind::Engulfing => "ENGULFING",
            PatternKind::Doji => "DOJI",
            PatternKind::DragonflyDoji => "DRAGONFLY_DOJI",
            PatternKind::GravestoneDoji => "GRAVESTONE_DOJI",
            PatternKind::LongLeggedDoji => "LONG_LEGGED_DOJI",
            PatternKind::Hammer => "HAMMER",
            PatternKind::ShootingStar => "SHOOTING_STAR",
            PatternKind::Pyramidal => "PYRAMIDAL",
            PatternKind::ColorFlip => "COLOR_FLIP",
        }
    }

    /// Returns the typical/expected direction of this pattern.
    ///
    /// - `Some(Direction::Bullish)` - pattern only appears as a bullish reversal
    /// - `Some(Direction::Bearish)` - pattern only appears as a bearish reversal
    /// - `Some(Direction::Neutral)` - pattern has no directional bias
    /// - `None` - pattern is bidirectional (direction follows the zone)
    pub fn typical_direction(&self) -> Option<Direction> {
        match self {
            PatternKind::Hammer | PatternKind::DragonflyDoji => Some(Direction::Bullish),
            PatternKind::ShootingStar | PatternKind::GravestoneDoji => Some(Direction::Bearish),
            PatternKind::Doji | PatternKind::LongLeggedDoji => Some(Direction::Neutral),
            PatternKind::PinBar
            | PatternKind::Engulfing
            | PatternKind::Pyramidal
            | PatternKind::ColorFlip => None,
        }
    }

    /// Patterns that only count toward a single-timeframe signal and never
    /// upgrade a cross-timeframe one.
    pub fn single_timeframe_only(&self) -> bool {
        matches!(self, PatternKind::ColorFlip)
    }
}

impl std::fmt::Display for PatternKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of pattern detection - Copy, no allocations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PatternMatch {
    pub kind: PatternKind,
    pub direction: Direction,
}

// ============================================================
// PATTERN DETECTOR TRAIT
// ============================================================

/// Pattern detector over the most recent closed candles.
///
/// `bars` is a closed-bar series in ascending order; the last element is the
/// candle under test and up to `min_bars() - 1` predecessors give context.
pub trait PatternDetector: Send + Sync {
    /// Stable detector name, also the key for parameter overrides
    fn name(&self) -> &'static str;
    fn min_bars(&self) -> usize;
    fn detect<T: OHLC>(&self, bars: &[T], zone: Zone) -> Option<PatternMatch>;

    fn validate_config(&self) -> Result<()> {
        Ok(())
    }
}

// ============================================================
// BUILTIN DETECTORS - generated via macro
// ============================================================

use std::collections::HashMap;

use detectors::*;
use params::ParameterizedDetector;

/// Macro to generate BuiltinDetector enum without boilerplate
macro_rules! define_builtin_detectors {
    (
        $(
            $variant:ident($detector:ty)
        ),* $(,)?
    ) => {
        /// All builtin detectors - fast path via enum dispatch
        #[derive(Debug, Clone, PartialEq)]
        pub enum BuiltinDetector {
            $($variant($detector)),*
        }

        impl BuiltinDetector {
            #[inline]
            pub fn detect<T: OHLC>(&self, bars: &[T], zone: Zone) -> Option<PatternMatch> {
                match self {
                    $(Self::$variant(d) => PatternDetector::detect(d, bars, zone)),*
                }
            }

            #[inline]
            pub fn name(&self) -> &'static str {
                match self {
                    $(Self::$variant(d) => PatternDetector::name(d)),*
                }
            }

            #[inline]
            pub fn min_bars(&self) -> usize {
                match self {
                    $(Self::$variant(d) => PatternDetector::min_bars(d)),*
                }
            }

            pub fn validate_config(&self) -> Result<()> {
                match self {
                    $(Self::$variant(d) => PatternDetector::validate_config(d)),*
                }
            }

            /// Overlay named parameter values onto this detector's thresholds
            pub fn apply_params(self, params: &HashMap<&str, f64>) -> Result<Self> {
                match self {
                    $(Self::$variant(d) => Ok(Self::$variant(d.apply_params(params)?))),*
                }
            }
        }
    };
}

define_builtin_detectors! {
    // Single bar
    PinBar(PinBarDetector),
    Doji(DojiDetector),
    Hammer(HammerDetector),

    // Two bar and longer
    Engulfing(EngulfingDetector),
    ColorFlip(ColorFlipDetector),
}

// ============================================================
// TESTS
// ============================================================

#[cfg(test)]
mod tests {
    use super::*;

    /// Test OHLC bar
    #[derive(Debug, Clone)]
    struct Bar {
        o: f64,
        h: f64,
        l: f64,
        c: f64,
    }

    impl Bar {
        fn new(o: f64, h: f64, l: f64, c: f64) -> Self {
            Self { o, h, l, c }
        }
    }

    impl OHLC for Bar {
        fn open(&self) -> f64 {
            self.o
        }

        fn high(&self) -> f64 {
            self.h
        }

        fn low(&self) -> f64 {
            self.l
        }

        fn close(&self) -> f64 {
            self.c
        }
    }

    #[test]
    fn test_ratio_validation() {
        assert!(Ratio::new(0.0).is_ok());
        assert!(Ratio::new(1.0).is_ok());
        assert!(Ratio::new(0.5).is_ok());
        assert!(Ratio::new(-0.1).is_err());
        assert!(Ratio::new(1.1).is_err());
        assert!(Ratio::new(f64::NAN).is_err());
        assert!(Ratio::new(f64::INFINITY).is_err());
    }

    #[test]
    fn test_period_validation() {
        assert!(Period::new(1).is_ok());
        assert!(Period::new(28).is_ok());
        assert!(Period::new(0).is_err());
    }

    #[test]
    fn test_ratio_deserialize_rejects_out_of_range() {
        assert!(serde_json::from_str::<Ratio>("0.7").is_ok());
        assert!(serde_json::from_str::<Ratio>("1.7").is_err());
        assert!(serde_json::from_str::<Period>("0").is_err());
    }

    #[test]
    fn test_ohlc_ext_geometry() {
        let bar = Bar::new(100.0, 110.0, 90.0, 105.0);
        assert_eq!(bar.body(), 5.0);
        assert_eq!(bar.range(), 20.0);
        assert_eq!(bar.upper_wick(), 5.0);
        assert_eq!(bar.lower_wick(), 10.0);
        assert!(bar.is_bullish());
        assert!(!bar.is_bearish());
        assert_eq!(bar.color(), Some(Direction::Bullish));
        assert!((bar.body_ratio() - 0.25).abs() < 1e-12);
    }

    #[test]
    fn test_flat_bar_is_guarded() {
        let bar = Bar::new(100.0, 100.0, 100.0, 100.0);
        assert_eq!(bar.color(), None);
        assert_eq!(bar.body_ratio(), 0.0);
        assert!(bar.guarded_range() > 0.0);
    }

    #[test]
    fn test_validate_rejects_inverted_bar() {
        assert!(Bar::new(100.0, 90.0, 110.0, 100.0).validate().is_err());
        assert!(Bar::new(f64::NAN, 110.0, 90.0, 100.0).validate().is_err());
        assert!(Bar::new(100.0, 110.0, 90.0, 100.0).validate().is_ok());
    }

    #[test]
    fn test_single_timeframe_only_kinds() {
        assert!(PatternKind::ColorFlip.single_timeframe_only());
        assert!(!PatternKind::PinBar.single_timeframe_only());
        assert!(PatternKind::Engulfing.typical_direction().is_none());
        assert_eq!(
            PatternKind::Hammer.typical_direction(),
            Some(Direction::Bullish)
        );
    }

    #[test]
    fn test_builtin_dispatch() {
        let detector = BuiltinDetector::PinBar(PinBarDetector::with_defaults());
        assert_eq!(detector.name(), "pin_bar");
        assert_eq!(detector.min_bars(), 1);
        assert!(detector.validate_config().is_ok());

        // Long lower wick, tiny body
        let bars = vec![Bar::new(100.0, 100.5, 90.0, 100.2)];
        let hit = detector.detect(&bars, Zone::Oversold);
        assert_eq!(hit.map(|m| m.kind), Some(PatternKind::PinBar));
        assert!(detector.detect(&bars, Zone::Overbought).is_none());
    }

    #[test]
    fn test_data_unavailable_classification() {
        assert!(SignalError::InsufficientData { need: 29, got: 3 }.is_data_unavailable());
        assert!(SignalError::Provider("timeout".into()).is_data_unavailable());
        assert!(!SignalError::Delivery("429".into()).is_data_unavailable());
    }
}
