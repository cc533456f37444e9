use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::IdentificationError;

/// Versioned scoring constants.
///
/// Every threshold used by the matcher, aggregator and ranker is read from
/// here so a stored ruleset fully determines a scoring run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScoringRuleset {
    pub ruleset_version: u32,
    /// Relative deviation (and bound expansion) that still counts as a partial match.
    pub numeric_tolerance: f64,
    /// Floor for the deviation denominator when the stored value is near zero.
    pub relative_epsilon: f64,
    pub match_points: u32,
    pub partial_match_points: u32,
    /// Number of scored tests at which the completeness term reaches 1.0.
    pub completeness_saturation: u32,
    pub confidence_precision: u32,
    pub default_limit: usize,
    pub max_limit: usize,
}

impl ScoringRuleset {
    #[must_use]
    pub fn v1() -> Self {
        Self {
            ruleset_version: 1,
            numeric_tolerance: 0.15,
            relative_epsilon: 1e-9,
            match_points: 100,
            partial_match_points: 85,
            completeness_saturation: 10,
            confidence_precision: 3,
            default_limit: 20,
            max_limit: 100,
        }
    }

    /// Validates numeric bounds and limit invariants.
    ///
    /// # Errors
    /// Returns [`IdentificationError::Configuration`] when one or more
    /// ruleset fields are outside allowed bounds.
    pub fn validate(&self) -> Result<(), IdentificationError> {
        if self.ruleset_version == 0 {
            return Err(IdentificationError::Configuration(
                "ruleset_version MUST be >= 1".to_string(),
            ));
        }

        if !(0.0..=1.0).contains(&self.numeric_tolerance) {
            return Err(IdentificationError::Configuration(
                "numeric_tolerance MUST be in [0.0, 1.0]".to_string(),
            ));
        }

        if !(self.relative_epsilon.is_finite() && self.relative_epsilon > 0.0) {
            return Err(IdentificationError::Configuration(
                "relative_epsilon MUST be a positive finite number".to_string(),
            ));
        }

        if self.match_points == 0 {
            return Err(IdentificationError::Configuration(
                "match_points MUST be >= 1".to_string(),
            ));
        }

        if self.partial_match_points > self.match_points {
            return Err(IdentificationError::Configuration(
                "partial_match_points MUST be <= match_points".to_string(),
            ));
        }

        if self.completeness_saturation == 0 {
            return Err(IdentificationError::Configuration(
                "completeness_saturation MUST be >= 1".to_string(),
            ));
        }

        if self.confidence_precision > 9 {
            return Err(IdentificationError::Configuration(
                "confidence_precision MUST be <= 9".to_string(),
            ));
        }

        if self.max_limit == 0 {
            return Err(IdentificationError::Configuration(
                "max_limit MUST be >= 1".to_string(),
            ));
        }

        if self.default_limit == 0 || self.default_limit > self.max_limit {
            return Err(IdentificationError::Configuration(
                "default_limit MUST be in [1, max_limit]".to_string(),
            ));
        }

        Ok(())
    }

    /// Decodes and validates a ruleset from JSON.
    ///
    /// # Errors
    /// Returns [`IdentificationError::Configuration`] when JSON decoding fails
    /// or decoded values violate ruleset constraints.
    pub fn from_json(value: &Value) -> Result<Self, IdentificationError> {
        let ruleset: Self = serde_json::from_value(value.clone()).map_err(|err| {
            IdentificationError::Configuration(format!("invalid ruleset JSON payload: {err}"))
        })?;
        ruleset.validate()?;
        Ok(ruleset)
    }

    /// Fraction of a full match awarded to a partial match.
    #[must_use]
    pub fn partial_weight(&self) -> f64 {
        f64::from(self.partial_match_points) / f64::from(self.match_points)
    }
}
