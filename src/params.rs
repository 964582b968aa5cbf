//! Detector parameters and strength presets
//!
//! Every detector threshold is a named parameter. This module provides:
//! - [`StrengthTier`], the named presets selecting which detectors run and
//!   with which thresholds
//! - parameter metadata used to validate and document overrides
//! - [`ParameterizedDetector`], overlaying named values onto a preset
//!
//! # Example
//!
//! ```rust
//! use std::collections::HashMap;
//! use zonewatch::params::ParameterizedDetector;
//! use zonewatch::prelude::*;
//!
//! for param in PinBarDetector::param_meta() {
//!     println!("{}: {:?} (default: {})", param.name, param.param_type, param.default);
//! }
//!
//! let mut params = HashMap::new();
//! params.insert("wick_to_body_ratio", 3.0);
//! let strict = PinBarDetector::standard().apply_params(&params).unwrap();
//! assert_eq!(strict.wick_to_body_ratio, 3.0);
//! ```

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::{Ratio, Result, SignalError};

// ============================================================
// STRENGTH TIERS
// ============================================================

/// Named detector preset
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrengthTier {
  /// Pin bar only
  Minimal,
  /// Pin bar, engulfing, doji family, hammer/shooting star, colour flip
  #[default]
  Standard,
  /// Pin bar, engulfing and pyramidal hammer with tight thresholds
  Strong,
}

impl StrengthTier {
  pub fn as_str(self) -> &'static str {
    match self {
      StrengthTier::Minimal => "minimal",
      StrengthTier::Standard => "standard",
      StrengthTier::Strong => "strong",
    }
  }
}

// ============================================================
// PARAMETER TYPES
// ============================================================

/// Type of parameter value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamType {
  /// Fraction of the candle range (0.0..=1.0)
  Ratio,
  /// Multiplier against another length, may exceed 1.0 (e.g. wick_to_body_ratio)
  Factor,
  /// Candle count
  Count,
}

/// Metadata for a single detector parameter
#[derive(Debug, Clone)]
pub struct ParamMeta {
  /// Parameter name (e.g., "wick_to_body_ratio")
  pub name: &'static str,
  /// Parameter type
  pub param_type: ParamType,
  /// Default value (standard preset)
  pub default: f64,
  /// Accepted range: (min, max)
  pub range: (f64, f64),
  /// Human-readable description
  pub description: &'static str,
}

impl ParamMeta {
  pub const fn ratio(
    name: &'static str,
    default: f64,
    range: (f64, f64),
    description: &'static str,
  ) -> Self {
    Self { name, param_type: ParamType::Ratio, default, range, description }
  }

  pub const fn factor(
    name: &'static str,
    default: f64,
    range: (f64, f64),
    description: &'static str,
  ) -> Self {
    Self { name, param_type: ParamType::Factor, default, range, description }
  }

  pub const fn count(
    name: &'static str,
    default: f64,
    range: (f64, f64),
    description: &'static str,
  ) -> Self {
    Self { name, param_type: ParamType::Count, default, range, description }
  }

  /// Validate a value for this parameter
  pub fn validate(&self, value: f64) -> Result<()> {
    if value.is_nan() || value.is_infinite() {
      return Err(SignalError::InvalidValue("parameter cannot be NaN or infinite"));
    }
    let (min, max) = self.range;
    if value < min || value > max {
      return Err(SignalError::OutOfRange { field: self.name, value, min, max });
    }
    if self.param_type == ParamType::Count && value.fract() != 0.0 {
      return Err(SignalError::InvalidValue("count parameter must be a whole number"));
    }
    Ok(())
  }
}

// ============================================================
// PARAMETERIZED DETECTOR TRAIT
// ============================================================

/// Trait for detectors whose thresholds can be overridden by name
pub trait ParameterizedDetector: Sized {
  /// Returns metadata for all configurable parameters
  fn param_meta() -> &'static [ParamMeta];

  /// Overlays the given values; parameters not present keep their current value.
  fn apply_params(self, params: &HashMap<&str, f64>) -> Result<Self>;

  /// Creates a detector from the standard preset plus `params`
  fn with_params(params: &HashMap<&str, f64>) -> Result<Self>
  where
    Self: Default,
  {
    Self::default().apply_params(params)
  }

  /// Rejects keys that are not parameters of this detector
  fn check_keys(params: &HashMap<&str, f64>) -> Result<()> {
    let meta = Self::param_meta();
    match params.keys().find(|k| !meta.iter().any(|m| m.name == **k)) {
      Some(unknown) => Err(SignalError::InvalidConfig(format!("unknown parameter {unknown:?}"))),
      None => Ok(()),
    }
  }
}

// ============================================================
// PARAMETER VALUE HELPERS
// ============================================================

fn lookup(params: &HashMap<&str, f64>, key: &str, current: f64) -> f64 {
  params.get(key).copied().unwrap_or(current)
}

/// Helper to get a Ratio from params, keeping `current` when absent
pub fn get_ratio(params: &HashMap<&str, f64>, key: &str, current: Ratio) -> Result<Ratio> {
  Ratio::new(lookup(params, key, current.get()))
}

/// Helper to get a positive factor from params, keeping `current` when absent
pub fn get_factor(params: &HashMap<&str, f64>, key: &str, current: f64) -> Result<f64> {
  let value = lookup(params, key, current);
  if value.is_nan() || value.is_infinite() || value < 0.0 {
    return Err(SignalError::InvalidValue("factor must be a finite non-negative number"));
  }
  Ok(value)
}

/// Helper to get a candle count from params, keeping `current` when absent
pub fn get_count(params: &HashMap<&str, f64>, key: &str, current: usize) -> Result<usize> {
  let value = lookup(params, key, current as f64);
  if value < 0.0 || value.fract() != 0.0 {
    return Err(SignalError::InvalidValue("count must be a non-negative whole number"));
  }
  Ok(value as usize)
}

/// Validate every supplied value against its metadata
pub fn validate_values(meta: &[ParamMeta], params: &HashMap<&str, f64>) -> Result<()> {
  for m in meta {
    if let Some(value) = params.get(m.name) {
      m.validate(*value)?;
    }
  }
  Ok(())
}

// ============================================================
// TESTS
// ============================================================
