//! Canonicalizes client observations before scoring.
//!
//! This is the only stage of the pipeline that can reject a request. Once a
//! [`NormalizedQuery`] exists, matching, aggregation and ranking are total.

use std::collections::BTreeSet;

use crate::{
    BooleanCode, IdentificationError, IdentificationRequest, NumericValue, Observation,
    QuerySummary, TestCatalog, TestDefinition, TestId, TestType, TestValueInput,
};

#[derive(Debug, Clone, PartialEq)]
pub struct QueryObservation {
    pub test: TestDefinition,
    pub observation: Observation,
}

/// Validated query observations, in request order, at most one per test.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedQuery {
    pub observations: Vec<QueryObservation>,
}

impl NormalizedQuery {
    #[must_use]
    pub fn test_ids(&self) -> Vec<TestId> {
        self.observations
            .iter()
            .map(|item| item.test.test_id)
            .collect()
    }

    #[must_use]
    pub fn summary(&self) -> QuerySummary {
        let mut summary = QuerySummary {
            total_test_values: self.observations.len(),
            ..QuerySummary::default()
        };
        for item in &self.observations {
            match item.observation.test_type() {
                TestType::Boolean => summary.boolean_tests += 1,
                TestType::Numeric => summary.numeric_tests += 1,
                TestType::Text => summary.text_tests += 1,
            }
        }
        summary
    }
}

/// Validates a request against the active catalog and normalizes every value.
///
/// # Errors
/// - [`IdentificationError::EmptyQuery`] when no usable observation remains.
/// - [`IdentificationError::UnknownTest`] for a `test_id` outside the catalog.
/// - [`IdentificationError::InvalidObservation`] for duplicate tests, a type
///   that disagrees with the catalog, or a malformed value.
pub fn normalize_request(
    request: &IdentificationRequest,
    catalog: &TestCatalog,
) -> Result<NormalizedQuery, IdentificationError> {
    if request.test_values.is_empty() {
        return Err(IdentificationError::EmptyQuery);
    }

    let mut seen = BTreeSet::new();
    let mut observations = Vec::with_capacity(request.test_values.len());

    for input in &request.test_values {
        if !seen.insert(input.test_id) {
            return Err(IdentificationError::invalid(
                input.test_id,
                "test submitted more than once",
            ));
        }

        let test = catalog
            .get(input.test_id)
            .ok_or(IdentificationError::UnknownTest {
                test_id: input.test_id,
            })?;

        if input.test_type != test.test_type {
            return Err(IdentificationError::invalid(
                input.test_id,
                format!(
                    "declared test_type {} but catalog defines {}",
                    input.test_type.as_str(),
                    test.test_type.as_str()
                ),
            ));
        }

        if let Some(observation) = normalize_test_value(input)? {
            observations.push(QueryObservation {
                test: test.clone(),
                observation,
            });
        }
    }

    if observations.is_empty() {
        return Err(IdentificationError::EmptyQuery);
    }

    Ok(NormalizedQuery { observations })
}

/// Normalizes one submitted value. `Ok(None)` means "no opinion".
///
/// # Errors
/// Returns [`IdentificationError::InvalidObservation`] when the payload for
/// the declared type is missing or malformed.
pub fn normalize_test_value(
    input: &TestValueInput,
) -> Result<Option<Observation>, IdentificationError> {
    let test_id = input.test_id;
    match input.test_type {
        TestType::Boolean => {
            let raw = input
                .boolean_value
                .as_ref()
                .ok_or_else(|| {
                    IdentificationError::invalid(test_id, "boolean_value is required")
                })?;
            let code = BooleanCode::parse(&raw.value).ok_or_else(|| {
                IdentificationError::invalid(
                    test_id,
                    format!("unrecognized boolean code {:?}", raw.value),
                )
            })?;
            Ok(Some(Observation::Boolean(code)))
        }
        TestType::Numeric => {
            let raw = input
                .numeric_value
                .as_ref()
                .ok_or_else(|| {
                    IdentificationError::invalid(test_id, "numeric_value is required")
                })?;
            let value = match raw.mode.as_str() {
                "exact" => {
                    let exact = raw.exact.ok_or_else(|| {
                        IdentificationError::invalid(test_id, "mode exact requires `exact`")
                    })?;
                    NumericValue::exact(exact)
                }
                "range" => {
                    let range = raw.range.ok_or_else(|| {
                        IdentificationError::invalid(test_id, "mode range requires `range`")
                    })?;
                    NumericValue::range(range.min, range.max)
                }
                other => {
                    return Err(IdentificationError::invalid(
                        test_id,
                        format!("unknown numeric mode {other:?}"),
                    ))
                }
            }
            .map_err(|reason| IdentificationError::invalid(test_id, reason))?;
            Ok(Some(Observation::Numeric(value)))
        }
        TestType::Text => Ok(input
            .text_value
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(|value| Observation::Text(value.to_string()))),
    }
}
