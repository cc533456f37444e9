//! Identification scoring engine for bacterial strain lookup.
//!
//! A query is a set of laboratory test observations. Each candidate strain's
//! stored observations are compared test by test ([`matcher`]), folded into a
//! per-strain score ([`aggregate`]), and ordered best-first ([`rank`]). Client
//! input is canonicalized by [`normalize`] before any scoring happens, so the
//! whole error surface of an identification request lives there.
//!
//! The engine performs no I/O. Hosts load the active [`TestCatalog`] and the
//! candidate [`StrainRecord`]s and call [`identify`].

use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

pub mod aggregate;
pub mod matcher;
pub mod normalize;
pub mod rank;
pub mod request;
pub mod ruleset;

pub use aggregate::{aggregate_details, score_strain};
pub use matcher::{classify, compare};
pub use normalize::{normalize_request, normalize_test_value, NormalizedQuery, QueryObservation};
pub use rank::{
    compare_results, identify, identify_prepared, prepare_request, rank_results, PreparedRequest,
    RankedResults,
};
pub use request::{
    BooleanValueInput, IdentificationPayload, IdentificationRequest, LegacyIdentificationRequest,
    NumericValueInput, RangeInput, TestValueInput,
};
pub use ruleset::ScoringRuleset;

pub type TestId = i64;
pub type StrainId = i64;

#[derive(Debug, Clone, thiserror::Error, Eq, PartialEq)]
pub enum IdentificationError {
    #[error("select at least one test before running identification")]
    EmptyQuery,
    #[error("invalid observation for test_id {test_id}: {message}")]
    InvalidObservation { test_id: TestId, message: String },
    #[error("unknown test_id {test_id}: not present in the active test catalog")]
    UnknownTest { test_id: TestId },
    #[error("validation error: {0}")]
    Validation(String),
    #[error("configuration error: {0}")]
    Configuration(String),
}

impl IdentificationError {
    pub(crate) fn invalid(test_id: TestId, message: impl Into<String>) -> Self {
        Self::InvalidObservation {
            test_id,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TestType {
    Boolean,
    Numeric,
    Text,
}

impl TestType {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Boolean => "boolean",
            Self::Numeric => "numeric",
            Self::Text => "text",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "boolean" => Some(Self::Boolean),
            "numeric" => Some(Self::Numeric),
            "text" => Some(Self::Text),
            _ => None,
        }
    }
}

/// Four-valued laboratory reading for boolean tests.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum BooleanCode {
    #[serde(rename = "+")]
    Positive,
    #[serde(rename = "-")]
    Negative,
    #[serde(rename = "+/-")]
    Variable,
    #[serde(rename = "n.d.")]
    NotDetermined,
}

impl BooleanCode {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Positive => "+",
            Self::Negative => "-",
            Self::Variable => "+/-",
            Self::NotDetermined => "n.d.",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "+" => Some(Self::Positive),
            "-" => Some(Self::Negative),
            "+/-" => Some(Self::Variable),
            "n.d." => Some(Self::NotDetermined),
            _ => None,
        }
    }
}

/// A numeric reading: a single scalar or a closed interval.
///
/// Build through [`NumericValue::exact`] and [`NumericValue::range`] so the
/// finiteness and ordering invariants hold. A range whose bounds coincide is
/// stored as an exact value.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum NumericValue {
    Exact(f64),
    Range { min: f64, max: f64 },
}

impl NumericValue {
    /// # Errors
    /// Returns a static reason when `value` is NaN or infinite.
    pub fn exact(value: f64) -> Result<Self, &'static str> {
        if !value.is_finite() {
            return Err("numeric value MUST be finite");
        }
        Ok(Self::Exact(value))
    }

    /// # Errors
    /// Returns a static reason when a bound is non-finite or `min > max`.
    #[allow(clippy::float_cmp)]
    pub fn range(min: f64, max: f64) -> Result<Self, &'static str> {
        if !min.is_finite() || !max.is_finite() {
            return Err("range bounds MUST be finite");
        }
        if min > max {
            return Err("range min MUST be <= max");
        }
        if min == max {
            return Ok(Self::Exact(min));
        }
        Ok(Self::Range { min, max })
    }

    #[must_use]
    pub fn bounds(self) -> (f64, f64) {
        match self {
            Self::Exact(value) => (value, value),
            Self::Range { min, max } => (min, max),
        }
    }
}

impl Display for NumericValue {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Exact(value) => write!(f, "{value}"),
            Self::Range { min, max } => write!(f, "{min}-{max}"),
        }
    }
}

/// A normalized observation for one test, shared by queries and stored strain data.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum Observation {
    Boolean(BooleanCode),
    Numeric(NumericValue),
    Text(String),
}

impl Observation {
    #[must_use]
    pub fn test_type(&self) -> TestType {
        match self {
            Self::Boolean(_) => TestType::Boolean,
            Self::Numeric(_) => TestType::Numeric,
            Self::Text(_) => TestType::Text,
        }
    }

    /// Wire label used in match details; ranges are reported apart from scalars.
    #[must_use]
    pub fn query_type(&self) -> &'static str {
        match self {
            Self::Boolean(_) => "boolean",
            Self::Numeric(NumericValue::Exact(_)) => "numeric",
            Self::Numeric(NumericValue::Range { .. }) => "numeric_range",
            Self::Text(_) => "text",
        }
    }
}

impl Display for Observation {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Boolean(code) => f.write_str(code.as_str()),
            Self::Numeric(value) => write!(f, "{value}"),
            Self::Text(value) => f.write_str(value),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TestDefinition {
    pub test_id: TestId,
    pub test_code: String,
    pub test_name: String,
    pub test_type: TestType,
    pub measurement_unit: Option<String>,
    pub category_id: Option<i64>,
}

/// Read-only view of the active tests, keyed by `test_id`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TestCatalog {
    tests: BTreeMap<TestId, TestDefinition>,
}

impl TestCatalog {
    #[must_use]
    pub fn new(tests: impl IntoIterator<Item = TestDefinition>) -> Self {
        Self {
            tests: tests
                .into_iter()
                .map(|test| (test.test_id, test))
                .collect(),
        }
    }

    #[must_use]
    pub fn get(&self, test_id: TestId) -> Option<&TestDefinition> {
        self.tests.get(&test_id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.tests.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tests.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &TestDefinition> {
        self.tests.values()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StrainSummary {
    pub strain_id: StrainId,
    pub strain_identifier: String,
    pub scientific_name: Option<String>,
    pub common_name: Option<String>,
    pub isolation_source: Option<String>,
}

/// A candidate strain with whatever observations are recorded for it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StrainRecord {
    pub strain: StrainSummary,
    pub observations: BTreeMap<TestId, Observation>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[serde(rename_all = "snake_case")]
pub enum MatchStatus {
    Match,
    PartialMatch,
    Mismatch,
    NotFound,
}

impl MatchStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Match => "match",
            Self::PartialMatch => "partial_match",
            Self::Mismatch => "mismatch",
            Self::NotFound => "not_found",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "match" => Some(Self::Match),
            "partial_match" => Some(Self::PartialMatch),
            "mismatch" => Some(Self::Mismatch),
            "not_found" => Some(Self::NotFound),
            _ => None,
        }
    }

    /// `not_found` carries no evidence either way and is never scored.
    #[must_use]
    pub fn is_scorable(self) -> bool {
        !matches!(self, Self::NotFound)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MatchDetail {
    pub test_id: TestId,
    pub test_name: String,
    pub query_result: String,
    pub query_type: String,
    pub strain_result: Option<String>,
    pub match_status: MatchStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IdentificationResult {
    pub strain_id: StrainId,
    pub strain_identifier: String,
    pub scientific_name: Option<String>,
    pub common_name: Option<String>,
    pub isolation_source: Option<String>,
    pub match_percentage: u8,
    pub matching_tests: usize,
    pub partial_matching_tests: usize,
    pub conflicting_tests: usize,
    pub total_tests: usize,
    pub confidence_score: f64,
    pub details: Vec<MatchDetail>,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct QuerySummary {
    pub total_test_values: usize,
    pub boolean_tests: usize,
    pub numeric_tests: usize,
    pub text_tests: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IdentificationResponse {
    pub results: Vec<IdentificationResult>,
    pub total_results: usize,
    pub query_summary: QuerySummary,
    pub execution_time_ms: f64,
}
