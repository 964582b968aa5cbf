//! Common helper functions for candlestick pattern detection
//!
//! Preset thresholds shared across detector modules and the small geometric
//! comparisons they are built from. All ratios are fractions of the candle's
//! guarded range unless noted otherwise.

use crate::{zone::Zone, Direction, OHLCExt};

// ============================================================
// PRESET THRESHOLDS
// ============================================================

/// Pin bar: dominant wick must be at least this multiple of the body
pub const PIN_WICK_TO_BODY: f64 = 2.0;
pub const PIN_WICK_TO_BODY_STRONG: f64 = 3.0;
/// Pin bar: body must be at most this fraction of the range
pub const PIN_MAX_BODY_RATIO: f64 = 0.33;
pub const PIN_MAX_BODY_RATIO_STRONG: f64 = 0.25;

/// Doji: body at most this fraction of the range
pub const DOJI_BODY_RATIO: f64 = 0.10;
/// Doji: a wick at or below this fraction is negligible
pub const DOJI_NEGLIGIBLE_WICK_RATIO: f64 = 0.10;
/// Doji: dominant wick of a dragonfly/gravestone
pub const DOJI_LONG_WICK_RATIO: f64 = 0.50;
/// Doji: both wicks of a long-legged doji
pub const DOJI_SUBSTANTIAL_WICK_RATIO: f64 = 0.30;

/// Hammer / shooting star, standard geometry. The dominant wick must also be
/// strictly longer than the opposite one.
pub const HAMMER_MAX_BODY_RATIO: f64 = 0.50;
pub const HAMMER_MIN_WICK_RATIO: f64 = 0.25;
pub const HAMMER_MAX_OPPOSITE_WICK_RATIO: f64 = 0.25;

/// Pyramidal geometry: one wick covers almost the whole range
pub const PYRAMIDAL_MAX_BODY_RATIO: f64 = 0.10;
pub const PYRAMIDAL_WICK_RATIO: f64 = 0.85;
pub const PYRAMIDAL_MAX_OPPOSITE_WICK_RATIO: f64 = 0.05;

/// Engulfing: same-coloured candles required before the covered one
pub const ENGULFING_MIN_PRIOR_RUN: usize = 2;
/// Longest prior run a config may ask for
pub const ENGULFING_MAX_PRIOR_RUN: usize = 8;

// ============================================================
// HELPER FUNCTIONS
// ============================================================

/// Wick on the side a reversal out of `zone` leaves behind: the upper wick
/// in Overbought, the lower wick in Oversold. `None` for Neutral.
#[inline]
pub fn zone_wick<T: OHLCExt>(bar: &T, zone: Zone) -> Option<f64> {
    match zone {
        Zone::Overbought => Some(bar.upper_wick()),
        Zone::Oversold => Some(bar.lower_wick()),
        Zone::Neutral => None,
    }
}

/// Wick on the opposite side of [`zone_wick`].
#[inline]
pub fn opposite_wick<T: OHLCExt>(bar: &T, zone: Zone) -> Option<f64> {
    match zone {
        Zone::Overbought => Some(bar.lower_wick()),
        Zone::Oversold => Some(bar.upper_wick()),
        Zone::Neutral => None,
    }
}

/// Body is small: body / range <= max_ratio
#[inline]
pub fn is_small_body(body: f64, range: f64, max_ratio: f64) -> bool {
    range > 0.0 && body / range <= max_ratio
}

/// Wick dominates the body: wick >= body * factor, and the wick exists
#[inline]
pub fn wick_dominates(wick: f64, body: f64, factor: f64) -> bool {
    wick > 0.0 && wick >= body * factor
}

/// True when the bar has a real range worth measuring fractions against
#[inline]
pub fn has_range<T: OHLCExt>(bar: &T) -> bool {
    bar.range() > crate::RANGE_EPSILON
}

/// True when `bar` has colour `color`
#[inline]
pub fn has_color<T: OHLCExt>(bar: &T, color: Direction) -> bool {
    bar.color() == Some(color)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::series::Candle;

    #[test]
    fn test_zone_wick_sides() {
        // upper 3, lower 1
        let bar = Candle::new(0, 10.0, 14.0, 9.0, 11.0);
        assert_eq!(zone_wick(&bar, Zone::Overbought), Some(3.0));
        assert_eq!(zone_wick(&bar, Zone::Oversold), Some(1.0));
        assert_eq!(opposite_wick(&bar, Zone::Overbought), Some(1.0));
        assert_eq!(zone_wick(&bar, Zone::Neutral), None);
    }

    #[test]
    fn test_wick_dominates_needs_a_wick() {
        assert!(wick_dominates(2.0, 1.0, 2.0));
        assert!(!wick_dominates(1.9, 1.0, 2.0));
        // zero body, zero wick
        assert!(!wick_dominates(0.0, 0.0, 2.0));
        assert!(wick_dominates(0.1, 0.0, 2.0));
    }

    #[test]
    fn test_small_body() {
        assert!(is_small_body(1.0, 10.0, 0.10));
        assert!(!is_small_body(1.1, 10.0, 0.10));
        assert!(!is_small_body(0.0, 0.0, 0.10));
    }
}
