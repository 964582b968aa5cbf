//! Evaluation engine and alert sweep
//!
//! [`SignalEngine::evaluate`] is the pure core: two raw candle series in, at
//! most one [`Signal`] out. [`SignalEngine::run_sweep`] wraps it with the
//! outside world: it fetches from a [`CandleProvider`], delivers through an
//! [`AlertNotifier`] and dedups against a [`DedupStore`].

use std::collections::BTreeMap;

use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::{
    config::{EngineConfig, TimeframeConfig},
    dedup::DedupStore,
    detectors::PatternSet,
    oscillator::DeMarker,
    params::StrengthTier,
    series::{ensure_history, normalize, validate_bars, Candle},
    signal::{classify, Signal, TimeframeReading},
    zone::zone_of,
    Period, Result, SignalError,
};

// ============================================================
// EXTERNAL INTERFACES
// ============================================================

/// Source of raw candles, oldest or newest first, including the bar still forming
pub trait CandleProvider {
    fn fetch(&self, symbol: &str, timeframe: &str, limit: usize) -> Result<Vec<Candle>>;
}

/// Alert sink. An `Err` means the alert was not delivered.
pub trait AlertNotifier {
    fn notify(&self, signal: &Signal) -> Result<()>;
}

// ============================================================
// ENGINE
// ============================================================

#[derive(Debug, Clone)]
pub struct SignalEngine {
    config: EngineConfig,
    oscillator: DeMarker,
    patterns: PatternSet,
}

impl SignalEngine {
    pub fn new(config: EngineConfig) -> Result<Self> {
        config.validate()?;
        let patterns = PatternSet::for_tier(config.strength_tier, config.min_prior_run_length)
            .with_overrides(&config.pattern_overrides)?;
        Ok(Self {
            oscillator: DeMarker::new(config.period),
            patterns,
            config,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn oscillator(&self) -> &DeMarker {
        &self.oscillator
    }

    pub fn patterns(&self) -> &PatternSet {
        &self.patterns
    }

    /// Normalize raw rows to closed bars and check they are usable.
    pub fn prepare(&self, raw: Vec<Candle>) -> Result<Vec<Candle>> {
        let closed = normalize(raw);
        validate_bars(&closed)?;
        ensure_history(&closed, self.config.min_history())?;
        Ok(closed)
    }

    /// Oscillator, zone and patterns at the last bar of a prepared series.
    pub fn read_timeframe(&self, timeframe: &TimeframeConfig, closed: &[Candle]) -> Result<TimeframeReading> {
        ensure_history(closed, self.config.min_history())?;
        let last = closed.last().ok_or(SignalError::InsufficientData {
            need: self.config.min_history(),
            got: 0,
        })?;

        let oscillator = self.oscillator.last(closed);
        let zone = zone_of(oscillator, &timeframe.thresholds());
        let patterns = self.patterns.scan(closed, zone);

        Ok(TimeframeReading {
            timeframe: timeframe.id.clone(),
            zone,
            oscillator,
            patterns,
            bar_identity: last.timestamp,
        })
    }

    /// Evaluate one symbol from raw provider rows.
    ///
    /// Both series are normalized and checked before either is read, so a
    /// short slow series skips the symbol even when the fast one is fine.
    pub fn evaluate(&self, symbol: &str, fast_raw: Vec<Candle>, slow_raw: Vec<Candle>) -> Result<Option<Signal>> {
        let fast_closed = self.prepare(fast_raw)?;
        let slow_closed = self.prepare(slow_raw)?;

        let fast = self.read_timeframe(&self.config.fast, &fast_closed)?;
        let slow = self.read_timeframe(&self.config.slow, &slow_closed)?;
        debug!(
            symbol,
            fast_zone = %fast.zone,
            fast_dem = ?fast.oscillator,
            fast_patterns = fast.patterns.len(),
            slow_zone = %slow.zone,
            slow_dem = ?slow.oscillator,
            slow_patterns = slow.patterns.len(),
            "evaluated"
        );

        Ok(classify(symbol, &fast, &slow))
    }

    /// Fetch both timeframes for `symbol` and evaluate.
    /// Any fetch failure surfaces as [`SignalError::Provider`].
    pub fn evaluate_symbol<P: CandleProvider + ?Sized>(&self, provider: &P, symbol: &str) -> Result<Option<Signal>> {
        let limit = self.config.fetch_limit();
        let fast = fetch(provider, symbol, &self.config.fast.id, limit)?;
        let slow = fetch(provider, symbol, &self.config.slow.id, limit)?;
        self.evaluate(symbol, fast, slow)
    }

    /// One pass over `symbols`: evaluate each, deliver new signals, then
    /// expire old dedup entries and persist the store.
    ///
    /// Nothing here is fatal; per-symbol errors and persistence failures
    /// land in the returned report.
    pub fn run_sweep<S, P, N>(
        &self,
        symbols: &[S],
        provider: &P,
        notifier: &N,
        store: &mut DedupStore,
        now: i64,
    ) -> SweepReport
    where
        S: AsRef<str>,
        P: CandleProvider + ?Sized,
        N: AlertNotifier + ?Sized,
    {
        let mut report = SweepReport::default();
        let mut signals = Vec::new();

        for symbol in symbols {
            let symbol = symbol.as_ref();
            report.evaluated += 1;
            match self.evaluate_symbol(provider, symbol) {
                Ok(Some(signal)) => signals.push(signal),
                Ok(None) => {}
                Err(error) if error.is_data_unavailable() => {
                    debug!(symbol, %error, "skipped");
                    report.skipped += 1;
                }
                Err(error) => {
                    warn!(symbol, %error, "evaluation failed");
                    report.errors.push(EvaluationError {
                        symbol: symbol.to_string(),
                        error,
                    });
                }
            }
        }

        self.deliver_all(signals, notifier, store, now, &mut report);
        self.persist(store, now, &mut report);

        info!(
            evaluated = report.evaluated,
            skipped = report.skipped,
            emitted = report.emitted,
            suppressed = report.suppressed,
            failed_deliveries = report.failed_deliveries,
            errors = report.errors.len(),
            persisted = report.persisted,
            "sweep finished"
        );
        report
    }

    /// Deliver signals in order, sequentially. A signal is recorded only
    /// after its notification succeeds.
    pub fn deliver_all<I, N>(
        &self,
        signals: I,
        notifier: &N,
        store: &mut DedupStore,
        now: i64,
        report: &mut SweepReport,
    ) where
        I: IntoIterator<Item = Signal>,
        N: AlertNotifier + ?Sized,
    {
        for signal in signals {
            let key = signal.dedup_key();
            if !store.should_emit(&key) {
                debug!(key = %key, "already alerted");
                report.suppressed += 1;
                continue;
            }
            match notifier.notify(&signal) {
                Ok(()) => {
                    info!(key = %key, "alert sent");
                    store.record(key, now);
                    report.emitted += 1;
                    report.signals.push(signal);
                }
                Err(error) => {
                    warn!(key = %key, %error, "alert delivery failed, will retry");
                    report.failed_deliveries += 1;
                }
            }
        }
    }

    /// Expire entries past the retention window and save if anything changed.
    pub fn persist(&self, store: &mut DedupStore, now: i64, report: &mut SweepReport) {
        store.gc(self.config.dedup_retention_secs, now);
        if !store.is_dirty() {
            report.persisted = true;
            return;
        }
        match store.save() {
            Ok(()) => report.persisted = true,
            Err(error) => {
                warn!(%error, "could not persist dedup state, keeping it in memory");
                report.persisted = false;
            }
        }
    }
}

fn fetch<P: CandleProvider + ?Sized>(provider: &P, symbol: &str, timeframe: &str, limit: usize) -> Result<Vec<Candle>> {
    provider.fetch(symbol, timeframe, limit).map_err(|e| match e {
        SignalError::Provider(_) => e,
        other => SignalError::Provider(format!("{symbol} {timeframe}: {other}")),
    })
}

// ============================================================
// SWEEP REPORT
// ============================================================

/// Counters and failures of one sweep
#[derive(Debug, Default)]
pub struct SweepReport {
    /// Symbols attempted
    pub evaluated: usize,
    /// Symbols without usable data this cycle
    pub skipped: usize,
    pub emitted: usize,
    /// Signals already alerted for their bar
    pub suppressed: usize,
    pub failed_deliveries: usize,
    pub errors: Vec<EvaluationError>,
    /// Signals delivered during this sweep
    pub signals: Vec<Signal>,
    /// False when the dedup store could not be saved
    pub persisted: bool,
}

// ============================================================
// BUILDER
// ============================================================

/// Builder for creating SignalEngine instances
#[derive(Debug, Clone, Default)]
pub struct EngineBuilder {
    config: EngineConfig,
}

impl EngineBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from a loaded configuration
    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn period(mut self, period: usize) -> Result<Self> {
        self.config.period = Period::new(period)?;
        Ok(self)
    }

    pub fn fast_timeframe(mut self, id: impl Into<String>, overbought: f64, oversold: f64) -> Result<Self> {
        self.config.fast = TimeframeConfig::new(id, overbought, oversold)?;
        Ok(self)
    }

    pub fn slow_timeframe(mut self, id: impl Into<String>, overbought: f64, oversold: f64) -> Result<Self> {
        self.config.slow = TimeframeConfig::new(id, overbought, oversold)?;
        Ok(self)
    }

    pub fn strength_tier(mut self, tier: StrengthTier) -> Self {
        self.config.strength_tier = tier;
        self
    }

    pub fn min_prior_run_length(mut self, run: usize) -> Self {
        self.config.min_prior_run_length = run;
        self
    }

    pub fn dedup_retention_secs(mut self, secs: u64) -> Self {
        self.config.dedup_retention_secs = secs;
        self
    }

    pub fn fetch_limit(mut self, limit: usize) -> Self {
        self.config.fetch_limit = Some(limit);
        self
    }

    /// Parameter overrides for one detector, by detector name
    pub fn pattern_overrides(mut self, detector: &str, params: BTreeMap<String, f64>) -> Self {
        self.config.pattern_overrides.insert(detector.to_string(), params);
        self
    }

    pub fn build(self) -> Result<SignalEngine> {
        SignalEngine::new(self.config)
    }
}

// ============================================================
// PARALLEL EVALUATION
// ============================================================

/// Pre-fetched raw rows for one symbol
#[derive(Debug, Clone)]
pub struct Instrument {
    pub symbol: String,
    pub fast: Vec<Candle>,
    pub slow: Vec<Candle>,
}

/// Result of evaluating a single instrument
#[derive(Debug)]
pub struct EvaluationResult {
    pub symbol: String,
    pub signal: Option<Signal>,
}

/// Error from evaluating a single instrument
#[derive(Debug)]
pub struct EvaluationError {
    pub symbol: String,
    pub error: SignalError,
}

/// Evaluate instruments in parallel. Only computes signals; deliver them
/// afterwards with [`SignalEngine::deliver_all`] from a single thread.
pub fn evaluate_parallel(
    engine: &SignalEngine,
    instruments: Vec<Instrument>,
) -> (Vec<EvaluationResult>, Vec<EvaluationError>) {
    let results: Vec<_> = instruments
        .into_par_iter()
        .map(|instrument| {
            let Instrument { symbol, fast, slow } = instrument;
            match engine.evaluate(&symbol, fast, slow) {
                Ok(signal) => Ok(EvaluationResult { symbol, signal }),
                Err(error) => Err(EvaluationError { symbol, error }),
            }
        })
        .collect();

    let mut successes = Vec::new();
    let mut errors = Vec::new();
    for result in results {
        match result {
            Ok(r) => successes.push(r),
            Err(e) => errors.push(e),
        }
    }
    (successes, errors)
}
