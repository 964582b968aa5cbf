//! Signal classification
//!
//! Turns the per-timeframe readings of one evaluation into at most one
//! [`Signal`].

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::{
    dedup::DedupKey,
    zone::{correlate, Zone},
    PatternMatch, Result, SignalError,
};

/// Where a signal originates: a single timeframe or both together
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scope {
    Timeframe(String),
    Cross,
}

impl Scope {
    pub const CROSS: &'static str = "cross";

    pub fn as_str(&self) -> &str {
        match self {
            Scope::Timeframe(id) => id,
            Scope::Cross => Self::CROSS,
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Scope {
    type Err = SignalError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "" => Err(SignalError::InvalidValue("empty scope")),
            Self::CROSS => Ok(Scope::Cross),
            id => Ok(Scope::Timeframe(id.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SignalKind {
    /// Both timeframes share a zone
    CrossTimeframe,
    /// Both timeframes share a zone and a cross-eligible pattern fired
    CrossTimeframeWithPattern,
    /// One timeframe in a zone with a pattern on that timeframe
    ZoneWithPattern,
}

impl SignalKind {
    pub fn as_str(self) -> &'static str {
        match self {
            SignalKind::CrossTimeframe => "cross_timeframe",
            SignalKind::CrossTimeframeWithPattern => "cross_timeframe_with_pattern",
            SignalKind::ZoneWithPattern => "zone_with_pattern",
        }
    }
}

impl fmt::Display for SignalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SignalKind {
    type Err = SignalError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "cross_timeframe" => Ok(SignalKind::CrossTimeframe),
            "cross_timeframe_with_pattern" => Ok(SignalKind::CrossTimeframeWithPattern),
            "zone_with_pattern" => Ok(SignalKind::ZoneWithPattern),
            _ => Err(SignalError::InvalidValue("unknown signal kind")),
        }
    }
}

/// Alert candidate for one symbol and closed bar
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signal {
    pub symbol: String,
    pub scope: Scope,
    pub kind: SignalKind,
    pub zone: Zone,
    /// Open timestamp (ms) of the anchoring closed bar
    pub bar_identity: i64,
}

impl Signal {
    pub fn dedup_key(&self) -> DedupKey {
        DedupKey {
            symbol: self.symbol.clone(),
            scope: self.scope.clone(),
            kind: self.kind,
            zone: self.zone,
            bar_identity: self.bar_identity,
        }
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {} on {} (bar {})",
            self.symbol, self.kind, self.zone, self.scope, self.bar_identity
        )
    }
}

/// What one timeframe looked like at its last closed bar
#[derive(Debug, Clone, PartialEq)]
pub struct TimeframeReading {
    pub timeframe: String,
    pub zone: Zone,
    pub oscillator: Option<f64>,
    pub patterns: Vec<PatternMatch>,
    pub bar_identity: i64,
}

impl TimeframeReading {
    pub fn has_pattern(&self) -> bool {
        !self.patterns.is_empty()
    }

    /// Any pattern allowed to upgrade a cross-timeframe signal
    pub fn has_cross_pattern(&self) -> bool {
        self.patterns.iter().any(|p| !p.kind.single_timeframe_only())
    }
}

/// Decide the single signal, if any, for one evaluation.
pub fn classify(symbol: &str, fast: &TimeframeReading, slow: &TimeframeReading) -> Option<Signal> {
    if let Some(zone) = correlate(fast.zone, slow.zone) {
        let kind = if fast.has_cross_pattern() || slow.has_cross_pattern() {
            SignalKind::CrossTimeframeWithPattern
        } else {
            SignalKind::CrossTimeframe
        };
        return Some(Signal {
            symbol: symbol.to_string(),
            scope: Scope::Cross,
            kind,
            zone,
            bar_identity: fast.bar_identity,
        });
    }

    let active = match (fast.zone.is_neutral(), slow.zone.is_neutral()) {
        (false, true) => fast,
        (true, false) => slow,
        _ => return None,
    };
    active.has_pattern().then(|| Signal {
        symbol: symbol.to_string(),
        scope: Scope::Timeframe(active.timeframe.clone()),
        kind: SignalKind::ZoneWithPattern,
        zone: active.zone,
        bar_identity: active.bar_identity,
    })
}
