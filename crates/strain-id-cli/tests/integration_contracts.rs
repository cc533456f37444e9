#![allow(clippy::let_and_return)]

use std::fs;
use std::path::{Path, PathBuf};

use jsonschema::JSONSchema;
use serde_json::Value;
use strain_id_core::{IdentificationPayload, IdentificationResponse, MatchStatus};
use strain_id_store_sqlite::{
    CatalogImport, IdentificationStats, SqliteStrainStore, StrainFilter, StrainInput,
};

fn contract_dir() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("../../contracts/identification/v1")
        .canonicalize()
        .unwrap_or_else(|err| panic!("failed to canonicalize contract dir: {err}"))
}

fn read_json(path: &Path) -> Value {
    let body = fs::read_to_string(path)
        .unwrap_or_else(|err| panic!("failed to read {}: {err}", path.display()));
    serde_json::from_str(&body)
        .unwrap_or_else(|err| panic!("failed to parse {}: {err}", path.display()))
}

fn fixture(name: &str) -> Value {
    read_json(&contract_dir().join("fixtures").join(name))
}

fn schema_errors(schema_name: &str, value: &Value) -> Vec<String> {
    let schema_path = contract_dir().join("schemas").join(schema_name);
    let schema = read_json(&schema_path);
    let compiled = JSONSchema::compile(&schema)
        .unwrap_or_else(|err| panic!("failed to compile {}: {err}", schema_path.display()));
    let errors = match compiled.validate(value) {
        Ok(()) => Vec::new(),
        Err(iter) => iter.map(|err| err.to_string()).collect::<Vec<_>>(),
    };
    errors
}

fn assert_schema(schema_name: &str, value: &Value) {
    let errors = schema_errors(schema_name, value);
    assert!(
        errors.is_empty(),
        "schema validation failed for {schema_name}:\n{}",
        errors.join("\n")
    );
}

fn decode<T: serde::de::DeserializeOwned>(value: Value) -> T {
    serde_json::from_value(value).unwrap_or_else(|err| panic!("fixture failed to decode: {err}"))
}

fn fixture_store() -> SqliteStrainStore {
    let mut store = SqliteStrainStore::open(Path::new(":memory:"))
        .unwrap_or_else(|err| panic!("failed to open store: {err:#}"));
    store
        .migrate()
        .unwrap_or_else(|err| panic!("failed to migrate store: {err:#}"));

    let catalog: CatalogImport = decode(fixture("catalog-import.sample.json"));
    store
        .import_catalog(&catalog)
        .unwrap_or_else(|err| panic!("failed to import catalog fixture: {err:#}"));

    let mut strains_file = fixture("strains-import.sample.json");
    let strains: Vec<StrainInput> = decode(strains_file["strains"].take());
    store
        .import_strains(&strains)
        .unwrap_or_else(|err| panic!("failed to import strain fixture: {err:#}"));
    store
}

#[test]
fn fixtures_validate_against_their_schemas() {
    assert_schema(
        "identification-request.schema.json",
        &fixture("identification-request.sample.json"),
    );
    assert_schema(
        "legacy-identification-request.schema.json",
        &fixture("legacy-identification-request.sample.json"),
    );
    assert_schema(
        "identification-response.schema.json",
        &fixture("identification-response.sample.json"),
    );
    assert_schema(
        "identification-stats.schema.json",
        &fixture("identification-stats.sample.json"),
    );
    assert_schema(
        "catalog-import.schema.json",
        &fixture("catalog-import.sample.json"),
    );
    for (schema, sample) in [
        ("strain-listing.schema.json", "strain-listing.sample.json"),
        ("species-listing.schema.json", "species-listing.sample.json"),
        ("category-listing.schema.json", "category-listing.sample.json"),
        ("test-options.schema.json", "test-options.sample.json"),
    ] {
        assert_schema(schema, &fixture(sample));
    }
}

#[test]
fn fixtures_decode_into_wire_types() {
    let current: IdentificationPayload = decode(fixture("identification-request.sample.json"));
    assert!(matches!(current, IdentificationPayload::Current(_)));

    let legacy: IdentificationPayload =
        decode(fixture("legacy-identification-request.sample.json"));
    assert!(matches!(legacy, IdentificationPayload::Legacy(_)));

    let response: IdentificationResponse = decode(fixture("identification-response.sample.json"));
    for result in &response.results {
        let count = |status: MatchStatus| {
            result
                .details
                .iter()
                .filter(|detail| detail.match_status == status)
                .count()
        };
        assert_eq!(result.matching_tests, count(MatchStatus::Match));
        assert_eq!(result.partial_matching_tests, count(MatchStatus::PartialMatch));
        assert_eq!(result.conflicting_tests, count(MatchStatus::Mismatch));
        assert_eq!(
            result.total_tests,
            result.matching_tests + result.partial_matching_tests + result.conflicting_tests
        );
    }
}

#[test]
fn schema_rejects_unknown_match_status_and_boolean_code() {
    let mut response = fixture("identification-response.sample.json");
    response["results"][0]["details"][0]["match_status"] = Value::String("maybe".to_string());
    assert!(!schema_errors("identification-response.schema.json", &response).is_empty());

    let mut request = fixture("identification-request.sample.json");
    request["test_values"][0]["boolean_value"]["value"] = Value::String("weak".to_string());
    assert!(!schema_errors("identification-request.schema.json", &request).is_empty());
}

#[test]
fn live_identification_output_matches_response_contract() {
    let store = fixture_store();

    for name in [
        "identification-request.sample.json",
        "legacy-identification-request.sample.json",
    ] {
        let payload: IdentificationPayload = decode(fixture(name));
        let request = store
            .resolve_payload(payload)
            .unwrap_or_else(|err| panic!("failed to resolve {name}: {err:#}"));
        let response = store
            .identify(&request, 1)
            .unwrap_or_else(|err| panic!("identification failed for {name}: {err:#}"));
        assert!(response.total_results > 0);

        let value = serde_json::to_value(&response)
            .unwrap_or_else(|err| panic!("failed to serialize response: {err}"));
        assert_schema("identification-response.schema.json", &value);
    }
}

#[test]
fn live_stats_match_the_stats_fixture() {
    let store = fixture_store();
    let stats = store
        .identification_stats()
        .unwrap_or_else(|err| panic!("failed to compute stats: {err:#}"));

    let value = serde_json::to_value(&stats)
        .unwrap_or_else(|err| panic!("failed to serialize stats: {err}"));
    assert_schema("identification-stats.schema.json", &value);

    let expected: IdentificationStats = decode(fixture("identification-stats.sample.json"));
    assert_eq!(stats, expected);
}

fn to_value<T: serde::Serialize>(value: &T) -> Value {
    serde_json::to_value(value).unwrap_or_else(|err| panic!("failed to serialize output: {err}"))
}

#[test]
fn live_browse_output_matches_listing_fixtures() {
    let store = fixture_store();

    let filter = StrainFilter {
        search: Some("dsm".to_string()),
        ..StrainFilter::default()
    };
    let strains = store
        .list_strains(&filter, 0, Some(2))
        .unwrap_or_else(|err| panic!("failed to list strains: {err:#}"));
    let strains = to_value(&strains);
    assert_schema("strain-listing.schema.json", &strains);
    assert_eq!(strains, fixture("strain-listing.sample.json"));

    let species = store
        .list_species(true)
        .unwrap_or_else(|err| panic!("failed to list species: {err:#}"));
    let species = to_value(&species);
    assert_schema("species-listing.schema.json", &species);
    assert_eq!(species, fixture("species-listing.sample.json"));

    let categories = store
        .list_categories()
        .unwrap_or_else(|err| panic!("failed to list categories: {err:#}"));
    let categories = to_value(&categories);
    assert_schema("category-listing.schema.json", &categories);
    assert_eq!(categories, fixture("category-listing.sample.json"));

    let options = store
        .test_options(5)
        .unwrap_or_else(|err| panic!("failed to list test options: {err:#}"));
    let options = to_value(&options);
    assert_schema("test-options.schema.json", &options);
    assert_eq!(options, fixture("test-options.sample.json"));
}

#[test]
fn listing_schema_rejects_out_of_range_page_limit() {
    let mut listing = fixture("strain-listing.sample.json");
    listing["pagination"]["limit"] = Value::Number(0_u64.into());
    assert!(!schema_errors("strain-listing.schema.json", &listing).is_empty());

    let mut options = fixture("test-options.sample.json");
    options["test_type"] = Value::String("ordinal".to_string());
    assert!(!schema_errors("test-options.schema.json", &options).is_empty());
}
