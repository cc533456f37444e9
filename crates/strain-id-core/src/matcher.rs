//! Per-test comparison of a query observation against a stored strain observation.

use crate::{
    BooleanCode, MatchDetail, MatchStatus, NumericValue, Observation, QueryObservation,
    ScoringRuleset,
};

/// Classifies one query observation against the strain's stored observation.
///
/// Absent stored data, `n.d.` readings and variant mismatches are all
/// `not_found`; none of them is evidence against the strain.
#[must_use]
pub fn classify(
    query: &Observation,
    stored: Option<&Observation>,
    ruleset: &ScoringRuleset,
) -> MatchStatus {
    let Some(stored) = stored else {
        return MatchStatus::NotFound;
    };

    match (query, stored) {
        (Observation::Boolean(query), Observation::Boolean(stored)) => {
            classify_boolean(*query, *stored)
        }
        (Observation::Numeric(query), Observation::Numeric(stored)) => {
            classify_numeric(*query, *stored, ruleset)
        }
        (Observation::Text(query), Observation::Text(stored)) => classify_text(query, stored),
        _ => MatchStatus::NotFound,
    }
}

/// Builds the display detail for one test of one strain.
#[must_use]
pub fn compare(
    query: &QueryObservation,
    stored: Option<&Observation>,
    ruleset: &ScoringRuleset,
) -> MatchDetail {
    MatchDetail {
        test_id: query.test.test_id,
        test_name: query.test.test_name.clone(),
        query_result: query.observation.to_string(),
        query_type: query.observation.query_type().to_string(),
        strain_result: stored.map(ToString::to_string),
        match_status: classify(&query.observation, stored, ruleset),
    }
}

fn classify_boolean(query: BooleanCode, stored: BooleanCode) -> MatchStatus {
    if query == BooleanCode::NotDetermined || stored == BooleanCode::NotDetermined {
        return MatchStatus::NotFound;
    }
    if query == stored {
        MatchStatus::Match
    } else {
        MatchStatus::Mismatch
    }
}

#[allow(clippy::float_cmp)]
fn classify_numeric(
    query: NumericValue,
    stored: NumericValue,
    ruleset: &ScoringRuleset,
) -> MatchStatus {
    match (query, stored) {
        (NumericValue::Exact(query), NumericValue::Exact(stored)) => {
            if query == stored {
                return MatchStatus::Match;
            }
            let deviation = (query - stored).abs() / stored.abs().max(ruleset.relative_epsilon);
            if deviation <= ruleset.numeric_tolerance {
                MatchStatus::PartialMatch
            } else {
                MatchStatus::Mismatch
            }
        }
        (NumericValue::Exact(value), NumericValue::Range { min, max })
        | (NumericValue::Range { min, max }, NumericValue::Exact(value)) => {
            if (min..=max).contains(&value) {
                return MatchStatus::Match;
            }
            let expanded_min = min - min.abs() * ruleset.numeric_tolerance;
            let expanded_max = max + max.abs() * ruleset.numeric_tolerance;
            if (expanded_min..=expanded_max).contains(&value) {
                MatchStatus::PartialMatch
            } else {
                MatchStatus::Mismatch
            }
        }
        (
            NumericValue::Range {
                min: query_min,
                max: query_max,
            },
            NumericValue::Range {
                min: stored_min,
                max: stored_max,
            },
        ) => {
            if query_min == stored_min && query_max == stored_max {
                MatchStatus::Match
            } else if query_min <= stored_max && stored_min <= query_max {
                MatchStatus::PartialMatch
            } else {
                MatchStatus::Mismatch
            }
        }
    }
}

fn classify_text(query: &str, stored: &str) -> MatchStatus {
    if query.trim().to_lowercase() == stored.trim().to_lowercase() {
        MatchStatus::Match
    } else {
        MatchStatus::Mismatch
    }
}
