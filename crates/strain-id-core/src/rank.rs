//! Ordering of scored strains and the end-to-end identification pipeline.

use std::cmp::Ordering;
use std::time::{Duration, Instant};

use crate::{
    normalize_request, score_strain, IdentificationError, IdentificationRequest,
    IdentificationResponse, IdentificationResult, NormalizedQuery, ScoringRuleset, StrainRecord,
    TestCatalog,
};

#[derive(Debug, Clone, PartialEq)]
pub struct RankedResults {
    pub results: Vec<IdentificationResult>,
    /// Number of results that survived filtering, before truncation.
    pub total_results: usize,
}

/// Best match first: percentage, then confidence, then lowest `strain_id`.
#[must_use]
pub fn compare_results(lhs: &IdentificationResult, rhs: &IdentificationResult) -> Ordering {
    rhs.match_percentage
        .cmp(&lhs.match_percentage)
        .then_with(|| rhs.confidence_score.total_cmp(&lhs.confidence_score))
        .then_with(|| lhs.strain_id.cmp(&rhs.strain_id))
}

#[must_use]
pub fn rank_results(
    mut results: Vec<IdentificationResult>,
    limit: usize,
    min_confidence: f64,
) -> RankedResults {
    results.retain(|result| result.confidence_score >= min_confidence);
    results.sort_by(compare_results);
    let total_results = results.len();
    results.truncate(limit);
    RankedResults {
        results,
        total_results,
    }
}

/// A request whose options are validated and whose observations are normalized.
///
/// Callers that fetch candidates themselves prepare once, load strains for
/// [`NormalizedQuery::test_ids`], then hand both to [`identify_prepared`].
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedRequest {
    pub query: NormalizedQuery,
    pub limit: usize,
    pub min_confidence: f64,
    prepare_elapsed: Duration,
}

/// Validates the ruleset and request options, then normalizes the observations.
///
/// Option errors are reported before normalization errors.
///
/// # Errors
/// Returns [`IdentificationError`] when the ruleset or request options are
/// invalid or the request fails normalization.
pub fn prepare_request(
    request: &IdentificationRequest,
    catalog: &TestCatalog,
    ruleset: &ScoringRuleset,
) -> Result<PreparedRequest, IdentificationError> {
    let started = Instant::now();

    ruleset.validate()?;
    let limit = request.effective_limit(ruleset)?;
    let min_confidence = request.effective_min_confidence()?;
    let query = normalize_request(request, catalog)?;

    Ok(PreparedRequest {
        query,
        limit,
        min_confidence,
        prepare_elapsed: started.elapsed(),
    })
}

/// Scores and ranks `candidates` for an already prepared request.
///
/// `execution_time_ms` covers preparation plus scoring, not candidate loading.
#[must_use]
pub fn identify_prepared(
    prepared: &PreparedRequest,
    candidates: &[StrainRecord],
    ruleset: &ScoringRuleset,
) -> IdentificationResponse {
    let started = Instant::now();
    let query = &prepared.query;

    let scored: Vec<IdentificationResult> = candidates
        .iter()
        .filter_map(|record| score_strain(query, record, ruleset))
        .collect();
    let scored_count = scored.len();
    let ranked = rank_results(scored, prepared.limit, prepared.min_confidence);

    let elapsed = prepared.prepare_elapsed + started.elapsed();
    let execution_time_ms = (elapsed.as_secs_f64() * 100_000.0).round() / 100.0;
    tracing::debug!(
        observations = query.observations.len(),
        candidates = candidates.len(),
        scored = scored_count,
        returned = ranked.results.len(),
        execution_time_ms,
        "identification scored"
    );

    IdentificationResponse {
        results: ranked.results,
        total_results: ranked.total_results,
        query_summary: query.summary(),
        execution_time_ms,
    }
}

/// Runs normalize, match, aggregate and rank for one request.
///
/// `execution_time_ms` covers exactly those stages and is informational only.
///
/// # Errors
/// Returns [`IdentificationError`] when the ruleset or request options are
/// invalid or the request fails normalization. No strain is scored in that case.
pub fn identify(
    request: &IdentificationRequest,
    catalog: &TestCatalog,
    candidates: &[StrainRecord],
    ruleset: &ScoringRuleset,
) -> Result<IdentificationResponse, IdentificationError> {
    let prepared = prepare_request(request, catalog, ruleset)?;
    Ok(identify_prepared(&prepared, candidates, ruleset))
}
