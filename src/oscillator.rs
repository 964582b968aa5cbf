//! DeMarker oscillator
//!
//! Compares upward high excursions against downward low excursions over a
//! rolling window. Readings live in the closed interval [0, 1]; index `i` is
//! defined once a full window of `period` deltas ends at `i`.

use crate::{Period, OHLC};

/// Reading used when neither side moved across the whole window.
pub const NEUTRAL_READING: f64 = 0.5;

/// Default lookback
pub const DEFAULT_PERIOD: Period = Period::new_const(28);

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DeMarker {
    period: Period,
}

impl Default for DeMarker {
    fn default() -> Self {
        Self::new(DEFAULT_PERIOD)
    }
}

impl DeMarker {
    pub fn new(period: Period) -> Self {
        Self { period }
    }

    pub fn period(&self) -> Period {
        self.period
    }

    /// Name for logs, e.g. `DeM(28)`
    pub fn name(&self) -> String {
        format!("DeM({})", self.period.get())
    }

    /// Closed bars required before the last index carries a reading.
    pub fn min_bars(&self) -> usize {
        self.period.get() + 1
    }

    /// Full oscillator series aligned index-for-index with `bars`.
    pub fn calculate<T: OHLC>(&self, bars: &[T]) -> Vec<Option<f64>> {
        let period = self.period.get();
        let len = bars.len();
        let mut results = vec![None; len];
        if len <= period {
            return results;
        }

        let mut up = vec![0.0; len];
        let mut down = vec![0.0; len];
        for i in 1..len {
            (up[i], down[i]) = deltas(&bars[i - 1], &bars[i]);
        }

        let mut window = Window::default();
        for i in 1..len {
            window.push(up[i], down[i]);
            // delta 0 is always zero, so evicting it at i == period is harmless
            if i >= period {
                window.evict(up[i - period], down[i - period]);
                results[i] = Some(window.reading());
            }
        }
        results
    }

    /// Reading at the last closed bar, `None` when history is too short.
    /// Sums only the final window.
    pub fn last<T: OHLC>(&self, bars: &[T]) -> Option<f64> {
        let period = self.period.get();
        let len = bars.len();
        if len <= period {
            return None;
        }

        let mut window = Window::default();
        for i in len - period..len {
            let (up, down) = deltas(&bars[i - 1], &bars[i]);
            window.push(up, down);
        }
        Some(window.reading())
    }
}

#[inline]
fn deltas<T: OHLC>(prev: &T, cur: &T) -> (f64, f64) {
    (
        (cur.high() - prev.high()).max(0.0),
        (prev.low() - cur.low()).max(0.0),
    )
}

/// Running up/down sums over the current window.
///
/// The counts of non-zero deltas let a window that has gone fully flat read
/// exactly zero, instead of the rounding residue left by subtraction.
#[derive(Debug, Default)]
struct Window {
    sum_up: f64,
    sum_down: f64,
    live_up: usize,
    live_down: usize,
}

impl Window {
    fn push(&mut self, up: f64, down: f64) {
        self.sum_up += up;
        self.sum_down += down;
        self.live_up += usize::from(up > 0.0);
        self.live_down += usize::from(down > 0.0);
    }

    fn evict(&mut self, up: f64, down: f64) {
        if up > 0.0 {
            self.live_up -= 1;
            self.sum_up = if self.live_up == 0 { 0.0 } else { (self.sum_up - up).max(0.0) };
        }
        if down > 0.0 {
            self.live_down -= 1;
            self.sum_down = if self.live_down == 0 { 0.0 } else { (self.sum_down - down).max(0.0) };
        }
    }

    /// `sum_up / (sum_up + sum_down)`, or the neutral reading when nothing moved
    fn reading(&self) -> f64 {
        let denom = self.sum_up + self.sum_down;
        if denom > 0.0 {
            (self.sum_up / denom).clamp(0.0, 1.0)
        } else {
            NEUTRAL_READING
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::series::Candle;

    fn hl(i: i64, high: f64, low: f64) -> Candle {
        let mid = (high + low) / 2.0;
        Candle::new(i, mid, high, low, mid)
    }

    fn dem(period: usize) -> DeMarker {
        DeMarker::new(Period::new(period).unwrap())
    }

    #[test]
    fn test_defined_from_period_onwards() {
        let bars: Vec<Candle> = (0..10).map(|i| hl(i, 10.0 + i as f64, 5.0)).collect();
        let results = dem(4).calculate(&bars);
        assert_eq!(results.len(), bars.len());
        for (i, value) in results.iter().enumerate() {
            assert_eq!(value.is_some(), i >= 4, "index {i}");
        }
    }

    #[test]
    fn test_insufficient_data() {
        let bars: Vec<Candle> = (0..4).map(|i| hl(i, 10.0, 5.0)).collect();
        assert_eq!(dem(4).calculate(&bars), vec![None; 4]);
        assert_eq!(dem(4).last(&bars), None);
        assert!(dem(4).calculate::<Candle>(&[]).is_empty());
    }

    #[test]
    fn test_pure_upward_pressure_is_one() {
        // rising highs, flat lows
        let bars: Vec<Candle> = (0..12).map(|i| hl(i, 10.0 + i as f64, 5.0)).collect();
        for value in dem(5).calculate(&bars).into_iter().flatten() {
            assert_eq!(value, 1.0);
        }
    }

    #[test]
    fn test_pure_downward_pressure_is_zero() {
        let bars: Vec<Candle> = (0..12).map(|i| hl(i, 20.0, 10.0 - i as f64)).collect();
        for value in dem(5).calculate(&bars).into_iter().flatten() {
            assert_eq!(value, 0.0);
        }
    }

    #[test]
    fn test_flat_market_falls_back_to_neutral() {
        let bars: Vec<Candle> = (0..8).map(|i| hl(i, 10.0, 9.0)).collect();
        assert_eq!(dem(3).last(&bars), Some(NEUTRAL_READING));
    }

    #[test]
    fn test_window_includes_anchor_delta() {
        // deltas: +1 up, +1 up, then the anchor bar drops its low by 2
        let bars = vec![
            hl(0, 10.0, 5.0),
            hl(1, 11.0, 5.0),
            hl(2, 12.0, 5.0),
            hl(3, 12.0, 3.0),
        ];
        // window of 2 ending at index 3: up = 1 + 0, down = 0 + 2
        let value = dem(2).last(&bars).unwrap();
        assert!((value - 1.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_tiny_movement_is_not_neutral() {
        // highs creep up by 1e-14 per bar, lows flat
        let bars: Vec<Candle> = (0..6).map(|i| hl(i, 1.0 + i as f64 * 1e-14, 0.5)).collect();
        assert_eq!(dem(3).last(&bars), Some(1.0));
        assert_eq!(dem(3).calculate(&bars)[5], Some(1.0));
    }

    #[test]
    fn test_window_goes_flat_after_movement() {
        // irregular moves, then a flat stretch longer than the window
        let mut bars = vec![hl(0, 10.0, 5.0), hl(1, 10.1, 5.0), hl(2, 10.3, 4.7), hl(3, 10.3, 4.6)];
        for i in 4..10 {
            bars.push(hl(i, 10.3, 4.6));
        }
        assert_eq!(dem(3).calculate(&bars)[9], Some(NEUTRAL_READING));
    }

    #[test]
    fn test_running_sums_match_last() {
        let bars: Vec<Candle> = (0..60)
            .map(|i| {
                let wave = ((i * 7 + 3) % 11) as f64 * 0.37;
                hl(i, 100.0 + wave, 95.0 + wave * 0.5)
            })
            .collect();
        let d = dem(14);
        let series = d.calculate(&bars);
        for end in 15..=bars.len() {
            let expected = d.last(&bars[..end]).unwrap();
            let got = series[end - 1].unwrap();
            assert!((expected - got).abs() < 1e-9, "index {}", end - 1);
        }
    }

    #[test]
    fn test_default_period_is_28() {
        let d = DeMarker::default();
        assert_eq!(d.period().get(), 28);
        assert_eq!(d.min_bars(), 29);
        assert_eq!(d.name(), "DeM(28)");
    }
}
