//! Folds per-test match details into one scored result per strain.

use crate::{
    compare, IdentificationResult, MatchDetail, MatchStatus, NormalizedQuery, ScoringRuleset,
    StrainRecord, StrainSummary,
};

/// Scores a strain against a normalized query.
///
/// Returns `None` when none of the queried tests has comparable data for the
/// strain; such strains are left out of the results instead of carrying an
/// undefined score.
#[must_use]
pub fn score_strain(
    query: &NormalizedQuery,
    record: &StrainRecord,
    ruleset: &ScoringRuleset,
) -> Option<IdentificationResult> {
    let details: Vec<MatchDetail> = query
        .observations
        .iter()
        .map(|item| compare(item, record.observations.get(&item.test.test_id), ruleset))
        .collect();

    if !details.iter().any(|detail| detail.match_status.is_scorable()) {
        return None;
    }

    Some(aggregate_details(&record.strain, details, ruleset))
}

/// Computes counts, match percentage and confidence for one strain.
///
/// `not_found` details are kept for display but never enter any count or score.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn aggregate_details(
    strain: &StrainSummary,
    details: Vec<MatchDetail>,
    ruleset: &ScoringRuleset,
) -> IdentificationResult {
    let count = |status: MatchStatus| {
        details
            .iter()
            .filter(|detail| detail.match_status == status)
            .count()
    };
    let matching_tests = count(MatchStatus::Match);
    let partial_matching_tests = count(MatchStatus::PartialMatch);
    let conflicting_tests = count(MatchStatus::Mismatch);
    let total_tests = matching_tests + partial_matching_tests + conflicting_tests;

    let (match_percentage, confidence_score) = if total_tests == 0 {
        (0, 0.0)
    } else {
        let total = total_tests as f64;
        let points = matching_tests as f64 * f64::from(ruleset.match_points)
            + partial_matching_tests as f64 * f64::from(ruleset.partial_match_points);
        let full_points = total * f64::from(ruleset.match_points);
        let score_fraction = points / full_points;
        let conflict_ratio = conflicting_tests as f64 / total;
        let completeness = (total / f64::from(ruleset.completeness_saturation)).min(1.0);

        (
            percentage(points * 100.0 / full_points),
            round_to(
                clamp(score_fraction * (1.0 - conflict_ratio) * completeness, 0.0, 1.0),
                ruleset.confidence_precision,
            ),
        )
    };

    IdentificationResult {
        strain_id: strain.strain_id,
        strain_identifier: strain.strain_identifier.clone(),
        scientific_name: strain.scientific_name.clone(),
        common_name: strain.common_name.clone(),
        isolation_source: strain.isolation_source.clone(),
        match_percentage,
        matching_tests,
        partial_matching_tests,
        conflicting_tests,
        total_tests,
        confidence_score,
        details,
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn percentage(raw: f64) -> u8 {
    clamp(raw.round(), 0.0, 100.0) as u8
}

fn round_to(value: f64, decimals: u32) -> f64 {
    let scale = 10_f64.powi(i32::try_from(decimals).unwrap_or(9));
    (value * scale).round() / scale
}

fn clamp(value: f64, min: f64, max: f64) -> f64 {
    value.min(max).max(min)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{exact, must_some, range, strain_summary, test_definition};
    use crate::{BooleanCode, Observation, QueryObservation, TestType};
    use proptest::prelude::*;
    use std::collections::BTreeMap;

    fn detail(test_id: i64, match_status: MatchStatus) -> MatchDetail {
        MatchDetail {
            test_id,
            test_name: format!("Test {test_id}"),
            query_result: "+".to_string(),
            query_type: "boolean".to_string(),
            strain_result: Some("+".to_string()),
            match_status,
        }
    }

    fn details(matches: usize, partials: usize, mismatches: usize, missing: usize) -> Vec<MatchDetail> {
        let statuses = std::iter::repeat(MatchStatus::Match)
            .take(matches)
            .chain(std::iter::repeat(MatchStatus::PartialMatch).take(partials))
            .chain(std::iter::repeat(MatchStatus::Mismatch).take(mismatches))
            .chain(std::iter::repeat(MatchStatus::NotFound).take(missing));
        statuses
            .enumerate()
            .map(|(index, status)| detail(i64::try_from(index).unwrap_or(i64::MAX), status))
            .collect()
    }

    fn aggregate(
        matches: usize,
        partials: usize,
        mismatches: usize,
        missing: usize,
    ) -> IdentificationResult {
        aggregate_details(
            &strain_summary(1),
            details(matches, partials, mismatches, missing),
            &ScoringRuleset::v1(),
        )
    }

    #[test]
    fn partial_matches_earn_eighty_five_points() {
        let result = aggregate(1, 1, 0, 0);
        assert_eq!(result.match_percentage, 93);
        assert_eq!(result.total_tests, 2);
    }

    #[test]
    fn not_found_does_not_dilute_the_score() {
        let with_missing = aggregate(3, 0, 1, 6);
        let without_missing = aggregate(3, 0, 1, 0);
        assert_eq!(with_missing.total_tests, 4);
        assert_eq!(with_missing.match_percentage, 75);
        assert_eq!(with_missing.match_percentage, without_missing.match_percentage);
        assert!((with_missing.confidence_score - without_missing.confidence_score).abs() < 1e-12);
        assert_eq!(with_missing.details.len(), 10);
    }

    #[test]
    fn completeness_separates_equal_percentages() {
        let broad = aggregate(20, 0, 0, 0);
        let narrow = aggregate(3, 0, 0, 0);
        assert_eq!(broad.match_percentage, 100);
        assert_eq!(narrow.match_percentage, 100);
        assert!((broad.confidence_score - 1.0).abs() < 1e-12);
        assert!((narrow.confidence_score - 0.3).abs() < 1e-12);
    }

    #[test]
    fn all_mismatches_score_zero() {
        let result = aggregate(0, 0, 5, 0);
        assert_eq!(result.match_percentage, 0);
        assert!(result.confidence_score.abs() < 1e-12);
        assert_eq!(result.conflicting_tests, 5);
    }

    #[test]
    fn score_strain_excludes_strains_without_comparable_data() {
        let query = NormalizedQuery {
            observations: vec![
                QueryObservation {
                    test: test_definition(1, TestType::Boolean),
                    observation: Observation::Boolean(BooleanCode::Positive),
                },
                QueryObservation {
                    test: test_definition(2, TestType::Numeric),
                    observation: exact(37.0),
                },
            ],
        };
        let empty = StrainRecord {
            strain: strain_summary(7),
            observations: BTreeMap::from([(
                1,
                Observation::Boolean(BooleanCode::NotDetermined),
            )]),
        };
        assert!(score_strain(&query, &empty, &ScoringRuleset::v1()).is_none());

        let partial = StrainRecord {
            strain: strain_summary(8),
            observations: BTreeMap::from([(2, range(30.0, 40.0))]),
        };
        let result = must_some(score_strain(&query, &partial, &ScoringRuleset::v1()));
        assert_eq!(result.total_tests, 1);
        assert_eq!(result.matching_tests, 1);
        assert_eq!(result.details.len(), 2);
        assert_eq!(result.details[0].match_status, MatchStatus::NotFound);
    }

    proptest! {
        #[test]
        fn prop_counts_sum_to_total_and_scores_stay_in_bounds(
            matches in 0usize..40,
            partials in 0usize..40,
            mismatches in 0usize..40,
            missing in 0usize..10,
        ) {
            let result = aggregate(matches, partials, mismatches, missing);
            prop_assert_eq!(
                result.matching_tests + result.partial_matching_tests + result.conflicting_tests,
                result.total_tests
            );
            prop_assert!(result.match_percentage <= 100);
            prop_assert!((0.0..=1.0).contains(&result.confidence_score));
        }

        #[test]
        fn prop_additional_conflict_never_raises_confidence(
            matches in 0usize..40,
            partials in 0usize..40,
            mismatches in 0usize..40,
        ) {
            let before = aggregate(matches, partials, mismatches, 0);
            let after = aggregate(matches, partials, mismatches + 1, 0);
            prop_assert!(after.confidence_score <= before.confidence_score);
            prop_assert!(after.match_percentage <= before.match_percentage);
        }

        #[test]
        fn prop_higher_percentage_never_lowers_confidence(
            matches in 1usize..30,
            partials in 0usize..30,
        ) {
            let upgraded = aggregate(matches + 1, partials, 0, 0);
            let downgraded = aggregate(matches, partials + 1, 0, 0);
            prop_assert!(upgraded.match_percentage >= downgraded.match_percentage);
            prop_assert!(upgraded.confidence_score >= downgraded.confidence_score);
        }
    }
}
