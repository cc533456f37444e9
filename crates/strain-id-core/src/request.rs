//! Wire shapes for identification requests.
//!
//! These mirror the JSON the submission form sends: one entry per test with an
//! optional payload per test type. [`crate::normalize`] turns them into
//! [`crate::Observation`]s.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{IdentificationError, ScoringRuleset, TestCatalog, TestId, TestType};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BooleanValueInput {
    pub value: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct RangeInput {
    pub min: f64,
    pub max: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NumericValueInput {
    pub mode: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exact: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub range: Option<RangeInput>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TestValueInput {
    pub test_id: TestId,
    #[serde(default)]
    pub test_code: String,
    pub test_type: TestType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub boolean_value: Option<BooleanValueInput>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub numeric_value: Option<NumericValueInput>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text_value: Option<String>,
}

impl TestValueInput {
    fn empty(test_id: TestId, test_code: &str, test_type: TestType) -> Self {
        Self {
            test_id,
            test_code: test_code.to_string(),
            test_type,
            boolean_value: None,
            numeric_value: None,
            text_value: None,
        }
    }

    #[must_use]
    pub fn boolean(test_id: TestId, test_code: &str, value: &str) -> Self {
        Self {
            boolean_value: Some(BooleanValueInput {
                value: value.to_string(),
            }),
            ..Self::empty(test_id, test_code, TestType::Boolean)
        }
    }

    #[must_use]
    pub fn exact(test_id: TestId, test_code: &str, value: f64) -> Self {
        Self {
            numeric_value: Some(NumericValueInput {
                mode: "exact".to_string(),
                exact: Some(value),
                range: None,
            }),
            ..Self::empty(test_id, test_code, TestType::Numeric)
        }
    }

    #[must_use]
    pub fn range(test_id: TestId, test_code: &str, min: f64, max: f64) -> Self {
        Self {
            numeric_value: Some(NumericValueInput {
                mode: "range".to_string(),
                exact: None,
                range: Some(RangeInput { min, max }),
            }),
            ..Self::empty(test_id, test_code, TestType::Numeric)
        }
    }

    #[must_use]
    pub fn text(test_id: TestId, test_code: &str, value: &str) -> Self {
        Self {
            text_value: Some(value.to_string()),
            ..Self::empty(test_id, test_code, TestType::Text)
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IdentificationRequest {
    pub test_values: Vec<TestValueInput>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_confidence: Option<f64>,
}

impl IdentificationRequest {
    #[must_use]
    pub fn new(test_values: Vec<TestValueInput>) -> Self {
        Self {
            test_values,
            limit: None,
            min_confidence: None,
        }
    }

    /// Resolves the result limit against the ruleset default and ceiling.
    ///
    /// # Errors
    /// Returns [`IdentificationError::Validation`] when the limit is outside
    /// `1..=max_limit`.
    pub fn effective_limit(&self, ruleset: &ScoringRuleset) -> Result<usize, IdentificationError> {
        let limit = self.limit.unwrap_or(ruleset.default_limit);
        if limit == 0 || limit > ruleset.max_limit {
            return Err(IdentificationError::Validation(format!(
                "limit MUST be in [1, {}]",
                ruleset.max_limit
            )));
        }
        Ok(limit)
    }

    /// # Errors
    /// Returns [`IdentificationError::Validation`] when `min_confidence` is not in `[0.0, 1.0]`.
    pub fn effective_min_confidence(&self) -> Result<f64, IdentificationError> {
        let value = self.min_confidence.unwrap_or(0.0);
        if !(0.0..=1.0).contains(&value) {
            return Err(IdentificationError::Validation(
                "min_confidence MUST be in [0.0, 1.0]".to_string(),
            ));
        }
        Ok(value)
    }
}

/// Older request shape: a bare `test_id -> value` map typed by the catalog.
///
/// Keys stay strings on the wire; untagged decoding cannot produce integer map keys.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LegacyIdentificationRequest {
    pub test_results: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_confidence: Option<f64>,
}

impl LegacyIdentificationRequest {
    /// Converts to the current shape using each test's catalog type.
    ///
    /// # Errors
    /// Returns [`IdentificationError::Validation`] for a key that is not an
    /// integer, [`IdentificationError::UnknownTest`] for ids missing from the
    /// catalog and [`IdentificationError::InvalidObservation`] when a numeric
    /// value does not parse.
    pub fn into_request(
        self,
        catalog: &TestCatalog,
    ) -> Result<IdentificationRequest, IdentificationError> {
        let mut test_values = Vec::with_capacity(self.test_results.len());

        for (key, raw) in self.test_results {
            let test_id: TestId = key.trim().parse().map_err(|_| {
                IdentificationError::Validation(format!("test_results key {key:?} is not a test id"))
            })?;
            let test = catalog
                .get(test_id)
                .ok_or(IdentificationError::UnknownTest { test_id })?;

            let value = match test.test_type {
                TestType::Boolean => TestValueInput::boolean(test_id, &test.test_code, &raw),
                TestType::Numeric => {
                    let parsed: f64 = raw.trim().parse().map_err(|_| {
                        IdentificationError::invalid(
                            test_id,
                            format!("numeric value {raw:?} is not a number"),
                        )
                    })?;
                    TestValueInput::exact(test_id, &test.test_code, parsed)
                }
                TestType::Text => TestValueInput::text(test_id, &test.test_code, &raw),
            };
            test_values.push(value);
        }

        test_values.sort_by_key(|value| value.test_id);
        Ok(IdentificationRequest {
            test_values,
            limit: self.limit,
            min_confidence: self.min_confidence,
        })
    }
}

/// Either accepted request shape, as decoded from an untrusted JSON body.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum IdentificationPayload {
    Current(IdentificationRequest),
    Legacy(LegacyIdentificationRequest),
}

impl IdentificationPayload {
    /// # Errors
    /// Propagates legacy conversion failures.
    pub fn into_request(
        self,
        catalog: &TestCatalog,
    ) -> Result<IdentificationRequest, IdentificationError> {
        match self {
            Self::Current(request) => Ok(request),
            Self::Legacy(legacy) => legacy.into_request(catalog),
        }
    }
}
