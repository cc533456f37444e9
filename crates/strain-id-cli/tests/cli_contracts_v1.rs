#![allow(clippy::single_match_else, clippy::uninlined_format_args)]

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};

use rusqlite::Connection;
use serde_json::Value;
use ulid::Ulid;

fn strain_id_binary_path() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_strain-id"))
}

fn fixture_path(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("../../contracts/identification/v1/fixtures")
        .join(name)
}

fn fixture_arg(name: &str) -> String {
    fixture_path(name).to_string_lossy().into_owned()
}

fn temp_db(prefix: &str) -> PathBuf {
    std::env::temp_dir().join(format!("{prefix}-{}.sqlite3", Ulid::new()))
}

fn remove_db(db_path: &Path) {
    for suffix in ["", "-wal", "-shm"] {
        let _ = std::fs::remove_file(format!("{}{suffix}", db_path.display()));
    }
}

fn run_output(db_path: &Path, args: &[&str]) -> Output {
    let mut command = Command::new(strain_id_binary_path());
    command.arg("--db").arg(db_path);
    for arg in args {
        command.arg(arg);
    }

    match command.output() {
        Ok(output) => output,
        Err(err) => panic!("failed to run strain-id command {:?}: {err}", args),
    }
}

fn run_with_stdin(db_path: &Path, args: &[&str], stdin: &str) -> Output {
    let mut command = Command::new(strain_id_binary_path());
    command
        .arg("--db")
        .arg(db_path)
        .args(args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    let mut child = match command.spawn() {
        Ok(child) => child,
        Err(err) => panic!("failed to spawn strain-id command {:?}: {err}", args),
    };
    match child.stdin.take() {
        Some(mut pipe) => {
            if let Err(err) = pipe.write_all(stdin.as_bytes()) {
                panic!("failed to write request to stdin: {err}");
            }
        }
        None => panic!("stdin pipe was not captured"),
    }
    match child.wait_with_output() {
        Ok(output) => output,
        Err(err) => panic!("failed waiting for strain-id command {:?}: {err}", args),
    }
}

fn stdout_json(output: &Output) -> Value {
    match serde_json::from_slice::<Value>(&output.stdout) {
        Ok(value) => value,
        Err(err) => panic!(
            "failed to parse stdout as JSON: {err}\nstdout={}\nstderr={}",
            String::from_utf8_lossy(&output.stdout),
            String::from_utf8_lossy(&output.stderr)
        ),
    }
}

fn assert_success(output: &Output, what: &str) {
    assert!(
        output.status.success(),
        "{what} failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
}

fn seeded_db(prefix: &str) -> PathBuf {
    let db_path = temp_db(prefix);
    let catalog = fixture_arg("catalog-import.sample.json");
    let strains = fixture_arg("strains-import.sample.json");

    let output = run_output(&db_path, &["catalog", "import", "--file", &catalog]);
    assert_success(&output, "catalog import");
    let output = run_output(&db_path, &["strain", "import", "--file", &strains]);
    assert_success(&output, "strain import");
    db_path
}

#[test]
fn help_contract_lists_expected_subcommands() {
    let output = match Command::new(strain_id_binary_path()).arg("--help").output() {
        Ok(value) => value,
        Err(err) => panic!("failed to run help command: {err}"),
    };

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    for required in [
        "catalog",
        "strain",
        "species",
        "identify",
        "stats",
        "ruleset",
        "benchmark",
    ] {
        assert!(
            stdout.contains(required),
            "expected help output to contain subcommand {required}; output={stdout}"
        );
    }
}

#[test]
fn identify_ranks_fixture_strains_by_match_then_confidence() {
    let db_path = seeded_db("strain-id-contract-identify");
    let request = fixture_arg("identification-request.sample.json");

    let output = run_output(&db_path, &["identify", "--request", &request]);
    assert_success(&output, "identify");

    let payload = stdout_json(&output);
    assert_eq!(payload["total_results"], Value::Number(4_u64.into()));
    assert_eq!(
        payload["query_summary"]["total_test_values"],
        Value::Number(5_u64.into())
    );

    let results = match payload["results"].as_array() {
        Some(results) => results,
        None => panic!("results must be an array: {payload}"),
    };
    let order: Vec<&str> = results
        .iter()
        .filter_map(|result| result["strain_identifier"].as_str())
        .collect();
    assert_eq!(order, vec!["DSM 2043", "DSM 23406", "DSM 6980", "ATCC 29355"]);
    assert_eq!(results[0]["match_percentage"], Value::Number(100_u64.into()));
    assert_eq!(results[1]["match_percentage"], Value::Number(100_u64.into()));

    remove_db(&db_path);
}

#[test]
fn identify_reads_legacy_payload_from_stdin_and_honours_limit_override() {
    let db_path = seeded_db("strain-id-contract-legacy");
    let body = match std::fs::read_to_string(fixture_path(
        "legacy-identification-request.sample.json",
    )) {
        Ok(value) => value,
        Err(err) => panic!("failed reading legacy fixture: {err}"),
    };

    let output = run_with_stdin(
        &db_path,
        &["identify", "--request", "-", "--limit", "2"],
        &body,
    );
    assert_success(&output, "identify from stdin");

    let payload = stdout_json(&output);
    assert_eq!(payload["total_results"], Value::Number(4_u64.into()));
    assert_eq!(payload["results"].as_array().map(Vec::len), Some(2));
    assert_eq!(
        payload["query_summary"]["total_test_values"],
        Value::Number(4_u64.into())
    );

    remove_db(&db_path);
}

#[test]
fn error_shape_for_unknown_test_is_stable() {
    let db_path = seeded_db("strain-id-contract-unknown-test");
    let request = r#"{"test_values":[{"test_id":999,"test_code":"GHOST","test_type":"boolean","boolean_value":{"value":"+"}}]}"#;

    let output = run_with_stdin(&db_path, &["identify", "--request", "-"], request);
    assert!(!output.status.success());

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(
        stderr.contains("unknown test_id 999"),
        "expected stable error shape, got stderr={stderr}"
    );
    assert!(output.stdout.is_empty());

    remove_db(&db_path);
}

#[test]
fn rejected_strain_import_leaves_no_rows_behind() {
    let db_path = seeded_db("strain-id-contract-import-rollback");
    let bad_file =
        std::env::temp_dir().join(format!("strain-id-bad-strains-{}.json", Ulid::new()));
    let body = r#"{"strains":[
        {"strain_identifier":"DSM 99901","observations":[{"test_id":1,"test_type":"boolean","boolean_value":{"value":"+"}}]},
        {"strain_identifier":"DSM 99902","observations":[{"test_id":404,"test_type":"boolean","boolean_value":{"value":"+"}}]}
    ]}"#;
    if let Err(err) = std::fs::write(&bad_file, body) {
        panic!("failed to write bad strain file: {err}");
    }

    let output = run_output(
        &db_path,
        &["strain", "import", "--file", bad_file.to_str().unwrap_or("")],
    );
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(
        stderr.contains("unknown test_id 404"),
        "expected stable error shape, got stderr={stderr}"
    );

    let conn = match Connection::open(&db_path) {
        Ok(value) => value,
        Err(err) => panic!("failed to open db for inspection: {err}"),
    };
    let strains: i64 = match conn.query_row("SELECT COUNT(*) FROM strains", [], |row| row.get(0)) {
        Ok(value) => value,
        Err(err) => panic!("failed to count strains: {err}"),
    };
    assert_eq!(strains, 4, "the rejected batch must roll back entirely");

    drop(conn);
    let _ = std::fs::remove_file(&bad_file);
    remove_db(&db_path);
}

#[test]
fn stats_contract_reports_fixture_totals() {
    let db_path = seeded_db("strain-id-contract-stats");

    let output = run_output(&db_path, &["stats"]);
    assert_success(&output, "stats");

    let payload = stdout_json(&output);
    assert_eq!(payload["total_strains"], Value::Number(4_u64.into()));
    assert_eq!(payload["total_tests"], Value::Number(9_u64.into()));
    assert_eq!(
        payload["system_status"],
        Value::String("operational".to_string())
    );

    remove_db(&db_path);
}

#[test]
fn debug_logging_goes_to_stderr_and_keeps_stdout_parseable() {
    let db_path = seeded_db("strain-id-contract-logging");
    let request = fixture_arg("identification-request.sample.json");

    let output = match Command::new(strain_id_binary_path())
        .env("STRAIN_ID_LOG", "debug")
        .arg("--db")
        .arg(&db_path)
        .args(["identify", "--request", &request])
        .output()
    {
        Ok(value) => value,
        Err(err) => panic!("failed to run identify with logging: {err}"),
    };
    assert_success(&output, "identify with logging");

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(
        stderr.contains("identification completed"),
        "expected identification log line on stderr, got stderr={stderr}"
    );
    let payload = stdout_json(&output);
    assert!(payload["results"].is_array());

    remove_db(&db_path);
}

#[test]
fn benchmark_command_emits_contract_json_and_report_artifact() {
    let db_path = temp_db("strain-id-contract-bench");
    let report_path =
        std::env::temp_dir().join(format!("strain-id-bench-report-{}.json", Ulid::new()));

    let output = run_output(
        &db_path,
        &[
            "benchmark",
            "run",
            "--volume",
            "10",
            "--volume",
            "20",
            "--repetitions",
            "2",
            "--identify-p95-max-ms",
            "60000",
            "--output",
            report_path.to_str().unwrap_or(""),
            "--json",
        ],
    );
    assert_success(&output, "benchmark command");

    let payload = stdout_json(&output);
    assert_eq!(
        payload["contract_version"],
        Value::String("benchmark_report.v1".to_string())
    );
    assert_eq!(payload["repetitions"], Value::Number(2_u64.into()));
    assert!(payload["volumes"].is_array());

    let file_text = match std::fs::read_to_string(&report_path) {
        Ok(value) => value,
        Err(err) => panic!("failed reading benchmark report artifact: {err}"),
    };
    let file_json: Value = match serde_json::from_str(&file_text) {
        Ok(value) => value,
        Err(err) => panic!("failed parsing benchmark report artifact json: {err}"),
    };
    assert_eq!(
        file_json["contract_version"],
        Value::String("benchmark_report.v1".to_string())
    );
    assert!(
        !db_path.exists(),
        "benchmark must not create the --db database"
    );

    let _ = std::fs::remove_file(&report_path);
}

#[test]
fn benchmark_command_exits_non_zero_on_threshold_violation() {
    let db_path = temp_db("strain-id-contract-bench-violation");

    let output = run_output(
        &db_path,
        &[
            "benchmark",
            "run",
            "--volume",
            "25",
            "--repetitions",
            "1",
            "--identify-p95-max-ms",
            "0",
            "--json",
        ],
    );
    assert!(
        !output.status.success(),
        "expected non-zero exit on threshold violation"
    );

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(
        stderr.contains("benchmark thresholds violated"),
        "expected stable violation error shape, got stderr={stderr}"
    );

    remove_db(&db_path);
}
