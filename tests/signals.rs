//! End-to-end tests: raw provider rows through evaluation, delivery and dedup.

use std::{
    cell::{Cell, RefCell},
    collections::HashMap,
    fs,
};

use zonewatch::prelude::*;

const T0: i64 = 1_700_000_000_000;
const FOUR_HOURS: i64 = 4 * 60 * 60 * 1000;
const ONE_DAY: i64 = 24 * 60 * 60 * 1000;
const NOW: i64 = 1_700_500_000;

// ============================================================
// SERIES BUILDERS
// ============================================================

/// Closed bars whose lows and highs move by `moves` (positive: both up,
/// negative: both down), followed by one still-forming bar.
///
/// Every closed bar is the same green shape: range 2, body 1, wicks 0.5, which
/// none of the detectors react to.
fn series(moves: &[f64], step: i64) -> Vec<Candle> {
    let mut low = 100.0;
    let mut bars = vec![shape(T0, low)];
    for (i, m) in moves.iter().enumerate() {
        low += m;
        bars.push(shape(T0 + (i as i64 + 1) * step, low));
    }
    // forming bar: a crash that must not count
    let forming_ts = T0 + (moves.len() as i64 + 1) * step;
    bars.push(Candle::new(forming_ts, low, low + 0.1, low - 40.0, low - 39.0));
    bars
}

fn shape(ts: i64, low: f64) -> Candle {
    Candle::new(ts, low + 0.5, low + 2.0, low, low + 1.5)
}

/// `ups` unit rises followed by `downs` falls of `down_size`
fn moves(ups: usize, downs: usize, down_size: f64) -> Vec<f64> {
    let mut m = vec![1.0; ups];
    m.extend(vec![-down_size; downs]);
    m
}

/// Oscillator 0.75 at period 28
fn fast_overbought() -> Vec<Candle> {
    series(&moves(21, 7, 1.0), FOUR_HOURS)
}

/// Oscillator 0.80 at period 28
fn slow_overbought() -> Vec<Candle> {
    series(&moves(24, 4, 1.5), ONE_DAY)
}

/// Oscillator 0.25 at period 28
fn fast_oversold() -> Vec<Candle> {
    series(&moves(7, 21, 1.0), FOUR_HOURS)
}

fn neutral(step: i64) -> Vec<Candle> {
    series(&moves(14, 14, 1.0), step)
}

/// Reshape the last closed bar into a pin bar without moving its high or low
fn with_pin_bar(mut raw: Vec<Candle>) -> Vec<Candle> {
    let n = raw.len();
    let last = &mut raw[n - 2];
    last.open = last.low + 1.8;
    last.close = last.low + 1.9;
    raw
}

fn last_closed_ts(raw: &[Candle]) -> i64 {
    raw[raw.len() - 2].timestamp
}

fn engine() -> SignalEngine {
    EngineBuilder::new().period(28).unwrap().build().unwrap()
}

// ============================================================
// MOCKS
// ============================================================

#[derive(Default)]
struct MockProvider {
    data: HashMap<(String, String), Vec<Candle>>,
    limits: RefCell<Vec<usize>>,
}

impl MockProvider {
    fn with(mut self, symbol: &str, fast: Vec<Candle>, slow: Vec<Candle>) -> Self {
        self.data.insert((symbol.into(), "240".into()), fast);
        self.data.insert((symbol.into(), "D".into()), slow);
        self
    }
}

impl CandleProvider for MockProvider {
    fn fetch(&self, symbol: &str, timeframe: &str, limit: usize) -> zonewatch::Result<Vec<Candle>> {
        self.limits.borrow_mut().push(limit);
        self.data
            .get(&(symbol.to_string(), timeframe.to_string()))
            // newest first, like a typical exchange API
            .map(|rows| rows.iter().rev().copied().collect())
            .ok_or_else(|| SignalError::Provider(format!("no data for {symbol} {timeframe}")))
    }
}

#[derive(Default)]
struct MockNotifier {
    sent: RefCell<Vec<Signal>>,
    fail: Cell<bool>,
}

impl AlertNotifier for MockNotifier {
    fn notify(&self, signal: &Signal) -> zonewatch::Result<()> {
        if self.fail.get() {
            return Err(SignalError::Delivery("chat unreachable".into()));
        }
        self.sent.borrow_mut().push(signal.clone());
        Ok(())
    }
}

// ============================================================
// EVALUATION
// ============================================================

#[test]
fn test_oscillator_fixtures() {
    let dem = DeMarker::default();
    let read = |raw: Vec<Candle>| dem.last(&normalize(raw)).unwrap();
    assert!((read(fast_overbought()) - 0.75).abs() < 1e-12);
    assert!((read(slow_overbought()) - 0.80).abs() < 1e-12);
    assert!((read(fast_oversold()) - 0.25).abs() < 1e-12);
    assert!((read(neutral(ONE_DAY)) - 0.5).abs() < 1e-12);
}

#[test]
fn test_cross_timeframe_without_pattern() {
    let fast = fast_overbought();
    let anchor = last_closed_ts(&fast);
    let signal = engine()
        .evaluate("BTCUSDT", fast, slow_overbought())
        .unwrap()
        .expect("one signal");

    assert_eq!(signal.kind, SignalKind::CrossTimeframe);
    assert_eq!(signal.zone, Zone::Overbought);
    assert_eq!(signal.scope, Scope::Cross);
    assert_eq!(signal.bar_identity, anchor);
}

#[test]
fn test_zone_with_pattern_on_fast() {
    let fast = with_pin_bar(fast_oversold());
    let anchor = last_closed_ts(&fast);
    let signal = engine()
        .evaluate("ETHUSDT", fast, neutral(ONE_DAY))
        .unwrap()
        .expect("one signal");

    assert_eq!(signal.kind, SignalKind::ZoneWithPattern);
    assert_eq!(signal.scope, Scope::Timeframe("240".into()));
    assert_eq!(signal.zone, Zone::Oversold);
    assert_eq!(signal.bar_identity, anchor);
}

#[test]
fn test_oversold_without_pattern_is_silent() {
    assert_eq!(engine().evaluate("ETHUSDT", fast_oversold(), neutral(ONE_DAY)).unwrap(), None);
}

#[test]
fn test_both_neutral_is_silent() {
    let fast = with_pin_bar(neutral(FOUR_HOURS));
    assert_eq!(engine().evaluate("SOLUSDT", fast, neutral(ONE_DAY)).unwrap(), None);
}

#[test]
fn test_raw_row_order_does_not_matter() {
    let mut shuffled = fast_overbought();
    shuffled.reverse();
    shuffled.swap(3, 17);
    let a = engine().evaluate("X", shuffled, slow_overbought()).unwrap();
    let b = engine().evaluate("X", fast_overbought(), slow_overbought()).unwrap();
    assert_eq!(a, b);
}

#[test]
fn test_evaluate_parallel_splits_results() {
    let instruments = vec![
        Instrument {
            symbol: "BTCUSDT".into(),
            fast: fast_overbought(),
            slow: slow_overbought(),
        },
        Instrument {
            symbol: "ETHUSDT".into(),
            fast: neutral(FOUR_HOURS),
            slow: neutral(ONE_DAY),
        },
        Instrument {
            symbol: "NEWCOIN".into(),
            fast: fast_overbought(),
            slow: vec![],
        },
    ];

    let engine = engine();
    let (results, errors) = evaluate_parallel(&engine, instruments);
    assert_eq!(results.len(), 2);
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].symbol, "NEWCOIN");
    assert!(errors[0].error.is_data_unavailable());

    let signals: Vec<Signal> = results.into_iter().filter_map(|r| r.signal).collect();
    assert_eq!(signals.len(), 1);
    assert_eq!(signals[0].symbol, "BTCUSDT");

    // delivery stays a single sequential pass
    let notifier = MockNotifier::default();
    let mut store = DedupStore::in_memory();
    let mut report = SweepReport::default();
    engine.deliver_all(signals, &notifier, &mut store, NOW, &mut report);
    assert_eq!(report.emitted, 1);
    assert_eq!(notifier.sent.borrow().len(), 1);
}

// ============================================================
// SWEEP, DELIVERY AND DEDUP
// ============================================================

#[test]
fn test_sweep_notifies_once_per_bar() {
    let provider = MockProvider::default().with("BTCUSDT", fast_overbought(), slow_overbought());
    let notifier = MockNotifier::default();
    let mut store = DedupStore::in_memory();
    let engine = engine();

    let first = engine.run_sweep(&["BTCUSDT"], &provider, &notifier, &mut store, NOW);
    assert_eq!(first.evaluated, 1);
    assert_eq!(first.emitted, 1);
    assert_eq!(first.signals.len(), 1);

    let second = engine.run_sweep(&["BTCUSDT"], &provider, &notifier, &mut store, NOW + 60);
    assert_eq!(second.emitted, 0);
    assert_eq!(second.suppressed, 1);
    assert_eq!(notifier.sent.borrow().len(), 1);

    // period + 50 rows per timeframe
    assert!(provider.limits.borrow().iter().all(|&limit| limit == 78));
}

#[test]
fn test_new_closed_bar_alerts_again() {
    let notifier = MockNotifier::default();
    let mut store = DedupStore::in_memory();
    let engine = engine();

    let provider = MockProvider::default().with("BTCUSDT", fast_overbought(), slow_overbought());
    engine.run_sweep(&["BTCUSDT"], &provider, &notifier, &mut store, NOW);

    let mut later = moves(21, 7, 1.0);
    later.push(1.0);
    let provider = MockProvider::default().with("BTCUSDT", series(&later, FOUR_HOURS), slow_overbought());
    let report = engine.run_sweep(&["BTCUSDT"], &provider, &notifier, &mut store, NOW + 14_400);

    assert_eq!(report.emitted, 1);
    let sent = notifier.sent.borrow();
    assert_eq!(sent.len(), 2);
    assert_eq!(sent[1].bar_identity - sent[0].bar_identity, FOUR_HOURS);
}

#[test]
fn test_failed_delivery_is_retried() {
    let provider = MockProvider::default().with("BTCUSDT", fast_overbought(), slow_overbought());
    let notifier = MockNotifier::default();
    notifier.fail.set(true);
    let mut store = DedupStore::in_memory();
    let engine = engine();

    let report = engine.run_sweep(&["BTCUSDT"], &provider, &notifier, &mut store, NOW);
    assert_eq!(report.failed_deliveries, 1);
    assert_eq!(report.emitted, 0);
    assert!(store.is_empty());

    notifier.fail.set(false);
    let report = engine.run_sweep(&["BTCUSDT"], &provider, &notifier, &mut store, NOW + 60);
    assert_eq!(report.emitted, 1);
    assert_eq!(store.len(), 1);
}

#[test]
fn test_unavailable_data_is_skipped_and_bad_data_reported() {
    let mut broken = fast_overbought();
    broken[5].low = broken[5].high + 1.0;
    let provider = MockProvider::default()
        .with("BTCUSDT", fast_overbought(), slow_overbought())
        .with("BROKEN", broken, slow_overbought())
        .with("YOUNG", fast_overbought(), series(&moves(3, 0, 1.0), ONE_DAY));
    let notifier = MockNotifier::default();
    let mut store = DedupStore::in_memory();

    let report = engine().run_sweep(
        &["MISSING", "BROKEN", "YOUNG", "BTCUSDT"],
        &provider,
        &notifier,
        &mut store,
        NOW,
    );
    assert_eq!(report.evaluated, 4);
    assert_eq!(report.skipped, 2);
    assert_eq!(report.errors.len(), 1);
    assert_eq!(report.errors[0].symbol, "BROKEN");
    assert!(matches!(report.errors[0].error, SignalError::InvalidCandle { .. }));
    assert_eq!(report.emitted, 1);
}

#[test]
fn test_state_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("dedup.json");
    let provider = MockProvider::default().with("BTCUSDT", fast_overbought(), slow_overbought());
    let notifier = MockNotifier::default();
    let engine = engine();

    let mut store = DedupStore::open(&path);
    let report = engine.run_sweep(&["BTCUSDT"], &provider, &notifier, &mut store, NOW);
    assert!(report.persisted);
    assert!(path.exists());
    assert!(!dir.path().join("dedup.json.tmp").exists());

    let mut reloaded = DedupStore::load(&path).unwrap();
    assert_eq!(reloaded.len(), 1);
    let report = engine.run_sweep(&["BTCUSDT"], &provider, &notifier, &mut reloaded, NOW + 60);
    assert_eq!(report.suppressed, 1);
    assert_eq!(notifier.sent.borrow().len(), 1);
}

#[test]
fn test_persistence_failure_keeps_sweeping() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("no_such_dir").join("dedup.json");
    let provider = MockProvider::default().with("BTCUSDT", fast_overbought(), slow_overbought());
    let notifier = MockNotifier::default();
    let engine = engine();
    let mut store = DedupStore::new(&path);

    let report = engine.run_sweep(&["BTCUSDT"], &provider, &notifier, &mut store, NOW);
    assert_eq!(report.emitted, 1);
    assert!(!report.persisted);
    assert!(store.is_dirty());

    // in-memory state still suppresses the repeat
    let report = engine.run_sweep(&["BTCUSDT"], &provider, &notifier, &mut store, NOW + 60);
    assert_eq!(report.suppressed, 1);
    assert!(!report.persisted);
}

#[test]
fn test_gc_never_reopens_an_old_bar() {
    let provider = MockProvider::default().with("BTCUSDT", fast_overbought(), slow_overbought());
    let notifier = MockNotifier::default();
    let mut store = DedupStore::in_memory();
    let engine = EngineBuilder::new().dedup_retention_secs(3_600).build().unwrap();

    engine.run_sweep(&["BTCUSDT"], &provider, &notifier, &mut store, NOW);
    assert_eq!(store.len(), 1);

    // entry expires at the end of this sweep
    engine.run_sweep(&["BTCUSDT"], &provider, &notifier, &mut store, NOW + 7_200);
    assert!(store.is_empty());

    let report = engine.run_sweep(&["BTCUSDT"], &provider, &notifier, &mut store, NOW + 10_800);
    assert_eq!(report.suppressed, 1);
    assert_eq!(notifier.sent.borrow().len(), 1);
}

#[test]
fn test_legacy_and_corrupt_state_files() {
    let dir = tempfile::tempdir().unwrap();
    let engine = engine();
    let signal = engine
        .evaluate("BTCUSDT", fast_overbought(), slow_overbought())
        .unwrap()
        .unwrap();

    let legacy = dir.path().join("legacy.json");
    let body = format!(r#"{{"{}": {}, "garbage": 1}}"#, signal.dedup_key(), NOW);
    fs::write(&legacy, body).unwrap();
    let store = DedupStore::load(&legacy).unwrap();
    assert_eq!(store.len(), 1);
    assert!(!store.should_emit(&signal.dedup_key()));

    let corrupt = dir.path().join("corrupt.json");
    fs::write(&corrupt, "{not json").unwrap();
    assert!(DedupStore::load(&corrupt).is_err());
    let store = DedupStore::open(&corrupt);
    assert!(store.is_empty());
    assert_eq!(store.path(), Some(corrupt.as_path()));

    let missing = DedupStore::load(dir.path().join("missing.json")).unwrap();
    assert!(missing.is_empty());
}
