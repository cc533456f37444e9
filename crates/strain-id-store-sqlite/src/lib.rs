#![allow(clippy::missing_errors_doc)]
#![allow(clippy::uninlined_format_args)]

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::time::Instant;

use anyhow::{anyhow, Context, Result};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use strain_id_core::{
    identify_prepared, normalize_test_value, prepare_request, BooleanCode, IdentificationPayload,
    IdentificationRequest, IdentificationResponse, NumericValue, Observation, ScoringRuleset,
    StrainId, StrainRecord, StrainSummary, TestCatalog, TestDefinition, TestId, TestType,
    TestValueInput,
};
use time::{OffsetDateTime, UtcOffset};
use tracing::{debug, info, info_span, warn};
use ulid::Ulid;

const STRAIN_ID_MIGRATION_VERSION: i64 = 1;
const DEFAULT_PAGE_SIZE: usize = 20;
const MAX_PAGE_SIZE: usize = 100;

const SCHEMA_STRAIN_ID_V1: &str = r"
CREATE TABLE IF NOT EXISTS scoring_rulesets (
  ruleset_version INTEGER PRIMARY KEY,
  ruleset_json TEXT NOT NULL,
  created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS test_categories (
  category_id INTEGER PRIMARY KEY,
  category_name TEXT NOT NULL,
  description TEXT,
  sort_order INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS tests (
  test_id INTEGER PRIMARY KEY,
  category_id INTEGER REFERENCES test_categories(category_id),
  test_code TEXT NOT NULL UNIQUE,
  test_name TEXT NOT NULL,
  test_type TEXT NOT NULL CHECK (test_type IN ('boolean', 'numeric', 'text')),
  measurement_unit TEXT,
  is_active INTEGER NOT NULL DEFAULT 1 CHECK (is_active IN (0, 1)),
  sort_order INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS strains (
  strain_id INTEGER PRIMARY KEY AUTOINCREMENT,
  strain_identifier TEXT NOT NULL UNIQUE,
  scientific_name TEXT,
  common_name TEXT,
  isolation_source TEXT,
  is_active INTEGER NOT NULL DEFAULT 1 CHECK (is_active IN (0, 1)),
  created_at TEXT NOT NULL,
  updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS strain_results_boolean (
  strain_id INTEGER NOT NULL REFERENCES strains(strain_id) ON DELETE CASCADE,
  test_id INTEGER NOT NULL REFERENCES tests(test_id),
  value_code TEXT NOT NULL CHECK (value_code IN ('+', '-', '+/-', 'n.d.')),
  PRIMARY KEY (strain_id, test_id)
);

CREATE TABLE IF NOT EXISTS strain_results_numeric (
  strain_id INTEGER NOT NULL REFERENCES strains(strain_id) ON DELETE CASCADE,
  test_id INTEGER NOT NULL REFERENCES tests(test_id),
  value_type TEXT NOT NULL CHECK (value_type IN ('single', 'minimum', 'maximum', 'optimal')),
  numeric_value REAL NOT NULL,
  PRIMARY KEY (strain_id, test_id, value_type)
);

CREATE TABLE IF NOT EXISTS strain_results_text (
  strain_id INTEGER NOT NULL REFERENCES strains(strain_id) ON DELETE CASCADE,
  test_id INTEGER NOT NULL REFERENCES tests(test_id),
  text_value TEXT NOT NULL CHECK (length(trim(text_value)) > 0),
  PRIMARY KEY (strain_id, test_id)
);

CREATE INDEX IF NOT EXISTS idx_strains_active
  ON strains(is_active, strain_id);
CREATE INDEX IF NOT EXISTS idx_strain_results_boolean_test
  ON strain_results_boolean(test_id, strain_id);
CREATE INDEX IF NOT EXISTS idx_strain_results_numeric_test
  ON strain_results_numeric(test_id, strain_id);
CREATE INDEX IF NOT EXISTS idx_strain_results_text_test
  ON strain_results_text(test_id, strain_id);
";

pub struct SqliteStrainStore {
    conn: Connection,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TestCategory {
    pub category_id: i64,
    pub category_name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub sort_order: i64,
}

/// A catalog row: the scoring-relevant definition plus its catalog state.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CatalogTest {
    #[serde(flatten)]
    pub definition: TestDefinition,
    #[serde(default = "default_active")]
    pub is_active: bool,
    #[serde(default)]
    pub sort_order: i64,
}

fn default_active() -> bool {
    true
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CatalogImport {
    #[serde(default)]
    pub categories: Vec<TestCategory>,
    #[serde(default)]
    pub tests: Vec<CatalogTest>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct CatalogImportReport {
    pub categories: usize,
    pub tests: usize,
}

/// A strain as submitted for import. Observations use the request wire shape.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StrainInput {
    pub strain_identifier: String,
    #[serde(default)]
    pub scientific_name: Option<String>,
    #[serde(default)]
    pub common_name: Option<String>,
    #[serde(default)]
    pub isolation_source: Option<String>,
    #[serde(default)]
    pub observations: Vec<TestValueInput>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StrainImportReport {
    pub inserted: usize,
    pub strain_ids: Vec<StrainId>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StoredStrain {
    #[serde(flatten)]
    pub record: StrainRecord,
    pub is_active: bool,
    pub created_at: String,
    pub updated_at: String,
}

/// How a stored numeric reading was reported for a strain.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum NumericValueType {
    Single,
    Minimum,
    Maximum,
    Optimal,
}

impl NumericValueType {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Single => "single",
            Self::Minimum => "minimum",
            Self::Maximum => "maximum",
            Self::Optimal => "optimal",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "single" => Some(Self::Single),
            "minimum" => Some(Self::Minimum),
            "maximum" => Some(Self::Maximum),
            "optimal" => Some(Self::Optimal),
            _ => None,
        }
    }
}

/// Browsing filter for [`SqliteStrainStore::list_strains`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StrainFilter {
    /// Case-insensitive substring over identifier, scientific and common name.
    #[serde(default)]
    pub search: Option<String>,
    /// Exact scientific name.
    #[serde(default)]
    pub scientific_name: Option<String>,
    #[serde(default = "default_active")]
    pub active_only: bool,
}

impl Default for StrainFilter {
    fn default() -> Self {
        Self {
            search: None,
            scientific_name: None,
            active_only: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StrainListItem {
    #[serde(flatten)]
    pub strain: StrainSummary,
    pub is_active: bool,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Pagination {
    pub total: usize,
    pub skip: usize,
    pub limit: usize,
    pub has_next: bool,
    pub has_previous: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StrainListing {
    pub strains: Vec<StrainListItem>,
    pub pagination: Pagination,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SpeciesCount {
    pub scientific_name: Option<String>,
    pub strain_count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SpeciesListing {
    pub species: Vec<SpeciesCount>,
    pub total: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CategorySummary {
    #[serde(flatten)]
    pub category: TestCategory,
    /// Active tests filed under the category.
    pub test_count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CategoryListing {
    pub categories: Vec<CategorySummary>,
    pub total_categories: usize,
}

/// Values a test can take: the boolean codes, or the distinct stored values.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TestOptions {
    pub test_id: TestId,
    pub test_type: TestType,
    pub options: Vec<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct TestResultCounts {
    pub boolean: usize,
    pub numeric: usize,
    pub text: usize,
    pub total: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IdentificationStats {
    pub total_strains: usize,
    pub total_tests: usize,
    pub test_results: TestResultCounts,
    pub system_status: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BenchmarkThresholds {
    pub identify_p95_ms_max: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BenchmarkConfig {
    /// Number of seeded strains per run.
    pub volumes: Vec<usize>,
    pub repetitions: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BenchmarkVolumeResult {
    pub strain_count: usize,
    pub seed_p50_ms: f64,
    pub seed_p95_ms: f64,
    pub identify_p50_ms: f64,
    pub identify_p95_ms: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BenchmarkReport {
    pub contract_version: String,
    pub generated_at: String,
    pub repetitions: usize,
    pub volumes: Vec<BenchmarkVolumeResult>,
    pub thresholds: Option<BenchmarkThresholds>,
    pub within_thresholds: bool,
    pub violations: Vec<String>,
}

impl SqliteStrainStore {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("failed to open sqlite database at {}", path.display()))?;

        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA foreign_keys = ON;
             PRAGMA busy_timeout = 5000;",
        )
        .context("failed to configure sqlite pragmas")?;

        Ok(Self { conn })
    }

    pub fn migrate(&self) -> Result<()> {
        self.conn
            .execute_batch(
                "CREATE TABLE IF NOT EXISTS schema_migrations (
                    version INTEGER PRIMARY KEY,
                    applied_at TEXT NOT NULL
                );",
            )
            .context("failed to ensure schema_migrations exists")?;

        self.conn
            .execute_batch(SCHEMA_STRAIN_ID_V1)
            .context("failed to apply strain identification schema")?;

        let now = format_rfc3339(now_utc())?;
        let registered = self
            .conn
            .execute(
                "INSERT OR IGNORE INTO schema_migrations(version, applied_at) VALUES (?1, ?2)",
                params![STRAIN_ID_MIGRATION_VERSION, now],
            )
            .context("failed to register strain identification schema migration")?;

        // Seed only; an operator-edited v1 must survive re-migration.
        let builtin = ScoringRuleset::v1();
        let payload = serde_json::to_string(&builtin).context("failed to serialize ruleset")?;
        self.conn
            .execute(
                "INSERT OR IGNORE INTO scoring_rulesets(ruleset_version, ruleset_json, created_at)
                 VALUES (?1, ?2, ?3)",
                params![i64::from(builtin.ruleset_version), payload, now],
            )
            .context("failed to seed built-in scoring ruleset")?;

        if registered > 0 {
            info!(
                version = STRAIN_ID_MIGRATION_VERSION,
                "applied schema migration"
            );
        }
        Ok(())
    }

    pub fn upsert_ruleset(&self, ruleset: &ScoringRuleset) -> Result<()> {
        ruleset
            .validate()
            .map_err(|err| anyhow!("invalid ruleset configuration: {err}"))?;

        let payload = serde_json::to_string(ruleset).context("failed to serialize ruleset")?;
        let now = format_rfc3339(now_utc())?;

        self.conn
            .execute(
                "INSERT INTO scoring_rulesets(ruleset_version, ruleset_json, created_at)
                 VALUES (?1, ?2, ?3)
                 ON CONFLICT(ruleset_version) DO UPDATE SET
                   ruleset_json = excluded.ruleset_json,
                   created_at = excluded.created_at",
                params![i64::from(ruleset.ruleset_version), payload, now],
            )
            .context("failed to upsert ruleset")?;

        info!(
            ruleset_version = ruleset.ruleset_version,
            "scoring ruleset stored"
        );
        Ok(())
    }

    pub fn get_rulesets(&self) -> Result<BTreeMap<u32, ScoringRuleset>> {
        let mut stmt = self.conn.prepare(
            "SELECT ruleset_version, ruleset_json FROM scoring_rulesets ORDER BY ruleset_version ASC",
        )?;

        let mut rows = stmt.query([])?;
        let mut map = BTreeMap::new();

        while let Some(row) = rows.next()? {
            let version_i64: i64 = row.get(0)?;
            let json: String = row.get(1)?;
            let ruleset = decode_ruleset(version_i64, &json)?;
            map.insert(ruleset.ruleset_version, ruleset);
        }

        Ok(map)
    }

    pub fn get_ruleset(&self, ruleset_version: u32) -> Result<ScoringRuleset> {
        let json: Option<String> = self
            .conn
            .query_row(
                "SELECT ruleset_json FROM scoring_rulesets WHERE ruleset_version = ?1",
                params![i64::from(ruleset_version)],
                |row| row.get(0),
            )
            .optional()
            .context("failed to query scoring_rulesets")?;

        let json = json.ok_or_else(|| {
            anyhow!("missing ruleset_version {ruleset_version} in scoring_rulesets")
        })?;
        decode_ruleset(i64::from(ruleset_version), &json)
    }

    pub fn upsert_category(&self, category: &TestCategory) -> Result<()> {
        upsert_category_in(&self.conn, category)
    }

    pub fn upsert_test(&self, test: &CatalogTest) -> Result<()> {
        upsert_test_in(&self.conn, test)
    }

    /// Imports categories then tests in one transaction.
    pub fn import_catalog(&mut self, catalog: &CatalogImport) -> Result<CatalogImportReport> {
        let tx = self
            .conn
            .transaction()
            .context("failed to start catalog import transaction")?;

        for category in &catalog.categories {
            upsert_category_in(&tx, category)?;
        }
        for test in &catalog.tests {
            upsert_test_in(&tx, test)?;
        }

        tx.commit()
            .context("failed to commit catalog import transaction")?;

        let report = CatalogImportReport {
            categories: catalog.categories.len(),
            tests: catalog.tests.len(),
        };
        info!(
            categories = report.categories,
            tests = report.tests,
            "catalog imported"
        );
        Ok(report)
    }

    pub fn list_tests(&self, include_inactive: bool) -> Result<Vec<CatalogTest>> {
        read_tests(&self.conn, include_inactive)
    }

    /// Active tests only; this is the catalog requests are validated against.
    pub fn load_catalog(&self) -> Result<TestCatalog> {
        let tests = read_tests(&self.conn, false)?;
        Ok(TestCatalog::new(tests.into_iter().map(|test| test.definition)))
    }

    pub fn insert_strain(&mut self, input: &StrainInput) -> Result<StrainSummary> {
        let tests = TestCatalog::new(
            read_tests(&self.conn, true)?
                .into_iter()
                .map(|test| test.definition),
        );
        let now = format_rfc3339(now_utc())?;

        let tx = self
            .conn
            .transaction()
            .context("failed to start strain transaction")?;
        let summary = insert_strain_in(&tx, &tests, input, &now)?;
        tx.commit().context("failed to commit strain transaction")?;

        debug!(
            strain_id = summary.strain_id,
            strain_identifier = %summary.strain_identifier,
            "strain inserted"
        );
        Ok(summary)
    }

    /// All-or-nothing: one invalid strain rolls the whole batch back.
    pub fn import_strains(&mut self, inputs: &[StrainInput]) -> Result<StrainImportReport> {
        let tests = TestCatalog::new(
            read_tests(&self.conn, true)?
                .into_iter()
                .map(|test| test.definition),
        );
        let now = format_rfc3339(now_utc())?;

        let tx = self
            .conn
            .transaction()
            .context("failed to start strain import transaction")?;
        let mut strain_ids = Vec::with_capacity(inputs.len());
        for input in inputs {
            strain_ids.push(insert_strain_in(&tx, &tests, input, &now)?.strain_id);
        }
        tx.commit()
            .context("failed to commit strain import transaction")?;

        info!(inserted = strain_ids.len(), "strains imported");
        Ok(StrainImportReport {
            inserted: strain_ids.len(),
            strain_ids,
        })
    }

    /// Writes one typed numeric reading, replacing any reading of the same type.
    ///
    /// A `minimum` or `maximum` that would leave the stored minimum above the
    /// stored maximum is rejected and nothing is written.
    pub fn record_numeric_reading(
        &mut self,
        strain_id: StrainId,
        test_id: TestId,
        value_type: NumericValueType,
        value: f64,
    ) -> Result<()> {
        if !value.is_finite() {
            return Err(anyhow!(
                "numeric reading for strain {strain_id} test {test_id} MUST be finite"
            ));
        }

        let tx = self
            .conn
            .transaction()
            .context("failed to start numeric reading transaction")?;

        let test_type: Option<String> = tx
            .query_row(
                "SELECT test_type FROM tests WHERE test_id = ?1",
                params![test_id],
                |row| row.get(0),
            )
            .optional()
            .context("failed to query tests")?;
        match test_type.as_deref() {
            Some("numeric") => {}
            Some(other) => {
                return Err(anyhow!(
                    "test {test_id} is a {other} test, not a numeric test"
                ))
            }
            None => return Err(anyhow!("unknown test_id {test_id}")),
        }

        let sibling = match value_type {
            NumericValueType::Minimum => Some(NumericValueType::Maximum),
            NumericValueType::Maximum => Some(NumericValueType::Minimum),
            NumericValueType::Single | NumericValueType::Optimal => None,
        };
        if let Some(sibling) = sibling {
            let other: Option<f64> = tx
                .query_row(
                    "SELECT numeric_value FROM strain_results_numeric
                     WHERE strain_id = ?1 AND test_id = ?2 AND value_type = ?3",
                    params![strain_id, test_id, sibling.as_str()],
                    |row| row.get(0),
                )
                .optional()
                .context("failed to query numeric readings")?;
            if let Some(other) = other {
                let (min, max) = if value_type == NumericValueType::Minimum {
                    (value, other)
                } else {
                    (other, value)
                };
                if min > max {
                    return Err(anyhow!(
                        "numeric reading for strain {strain_id} test {test_id} would leave minimum {min} above maximum {max}"
                    ));
                }
            }
        }

        tx.execute(
            "INSERT INTO strain_results_numeric(strain_id, test_id, value_type, numeric_value)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(strain_id, test_id, value_type) DO UPDATE SET
               numeric_value = excluded.numeric_value",
            params![strain_id, test_id, value_type.as_str(), value],
        )
        .with_context(|| {
            format!("failed to record numeric reading for strain {strain_id} test {test_id}")
        })?;
        tx.commit()
            .context("failed to commit numeric reading transaction")?;
        Ok(())
    }

    pub fn deactivate_strain(&self, strain_id: StrainId) -> Result<()> {
        let now = format_rfc3339(now_utc())?;
        let changed = self
            .conn
            .execute(
                "UPDATE strains SET is_active = 0, updated_at = ?2 WHERE strain_id = ?1",
                params![strain_id, now],
            )
            .context("failed to deactivate strain")?;

        if changed == 0 {
            return Err(anyhow!("strain {strain_id} not found"));
        }
        info!(strain_id, "strain deactivated");
        Ok(())
    }

    pub fn get_strain(&self, strain_id: StrainId) -> Result<Option<StoredStrain>> {
        let row = self
            .conn
            .query_row(
                "SELECT strain_id, strain_identifier, scientific_name, common_name,
                        isolation_source, is_active, created_at, updated_at
                 FROM strains
                 WHERE strain_id = ?1",
                params![strain_id],
                |row| {
                    Ok((
                        strain_summary_from_row(row)?,
                        row.get::<_, bool>(5)?,
                        row.get::<_, String>(6)?,
                        row.get::<_, String>(7)?,
                    ))
                },
            )
            .optional()
            .context("failed to query strain")?;

        let Some((strain, is_active, created_at, updated_at)) = row else {
            return Ok(None);
        };

        let mut observations = self.load_observations("r.strain_id = ?1", &[strain_id])?;
        Ok(Some(StoredStrain {
            record: StrainRecord {
                strain,
                observations: observations.remove(&strain_id).unwrap_or_default(),
            },
            is_active,
            created_at,
            updated_at,
        }))
    }

    /// One page of strains ordered by `strain_identifier`, plus the filtered total.
    pub fn list_strains(
        &self,
        filter: &StrainFilter,
        skip: usize,
        limit: Option<usize>,
    ) -> Result<StrainListing> {
        let limit = limit.unwrap_or(DEFAULT_PAGE_SIZE);
        if limit == 0 || limit > MAX_PAGE_SIZE {
            return Err(anyhow!("page limit {limit} MUST be within 1..={MAX_PAGE_SIZE}"));
        }

        let search = non_blank(filter.search.as_deref())
            .map(|term| format!("%{}%", escape_like(&term)));
        let scientific_name = non_blank(filter.scientific_name.as_deref());
        let where_clause = "(?1 = 0 OR is_active = 1)
             AND (?2 IS NULL OR scientific_name = ?2)
             AND (?3 IS NULL
                  OR strain_identifier LIKE ?3 ESCAPE '\\'
                  OR scientific_name LIKE ?3 ESCAPE '\\'
                  OR common_name LIKE ?3 ESCAPE '\\')";

        let total: i64 = self
            .conn
            .query_row(
                &format!("SELECT COUNT(*) FROM strains WHERE {where_clause}"),
                params![filter.active_only, scientific_name, search],
                |row| row.get(0),
            )
            .context("failed to count strains")?;
        let total = usize::try_from(total).with_context(|| format!("invalid row count {total}"))?;

        let page_limit = i64::try_from(limit).context("page limit out of range")?;
        let offset = i64::try_from(skip).context("page offset out of range")?;
        let mut stmt = self.conn.prepare(&format!(
            "SELECT strain_id, strain_identifier, scientific_name, common_name,
                    isolation_source, is_active
             FROM strains
             WHERE {where_clause}
             ORDER BY strain_identifier ASC, strain_id ASC
             LIMIT ?4 OFFSET ?5"
        ))?;
        let rows = stmt.query_map(
            params![filter.active_only, scientific_name, search, page_limit, offset],
            |row| {
                Ok(StrainListItem {
                    strain: strain_summary_from_row(row)?,
                    is_active: row.get(5)?,
                })
            },
        )?;
        let strains = collect_rows(rows)?;

        Ok(StrainListing {
            strains,
            pagination: Pagination {
                total,
                skip,
                limit,
                has_next: skip.saturating_add(limit) < total,
                has_previous: skip > 0,
            },
        })
    }

    /// Distinct scientific names with their strain counts, ordered by name.
    pub fn list_species(&self, active_only: bool) -> Result<SpeciesListing> {
        let mut stmt = self.conn.prepare(
            "SELECT scientific_name, COUNT(*)
             FROM strains
             WHERE ?1 = 0 OR is_active = 1
             GROUP BY scientific_name
             ORDER BY scientific_name ASC",
        )?;
        let rows = stmt.query_map(params![active_only], |row| {
            let count: i64 = row.get(1)?;
            Ok(SpeciesCount {
                scientific_name: row.get(0)?,
                strain_count: usize::try_from(count)
                    .map_err(|_| to_sql_error(format!("invalid strain count {count}")))?,
            })
        })?;
        let species = collect_rows(rows)?;
        Ok(SpeciesListing {
            total: species.len(),
            species,
        })
    }

    pub fn list_categories(&self) -> Result<CategoryListing> {
        let mut stmt = self.conn.prepare(
            "SELECT c.category_id, c.category_name, c.description, c.sort_order,
                    COUNT(t.test_id)
             FROM test_categories c
             LEFT JOIN tests t ON t.category_id = c.category_id AND t.is_active = 1
             GROUP BY c.category_id
             ORDER BY c.sort_order ASC, c.category_name ASC",
        )?;
        let rows = stmt.query_map([], |row| {
            let count: i64 = row.get(4)?;
            Ok(CategorySummary {
                category: TestCategory {
                    category_id: row.get(0)?,
                    category_name: row.get(1)?,
                    description: row.get(2)?,
                    sort_order: row.get(3)?,
                },
                test_count: usize::try_from(count)
                    .map_err(|_| to_sql_error(format!("invalid test count {count}")))?,
            })
        })?;
        let categories = collect_rows(rows)?;
        Ok(CategoryListing {
            total_categories: categories.len(),
            categories,
        })
    }

    pub fn test_options(&self, test_id: TestId) -> Result<TestOptions> {
        let test_type = read_tests(&self.conn, true)?
            .into_iter()
            .find(|test| test.definition.test_id == test_id)
            .map(|test| test.definition.test_type)
            .ok_or_else(|| anyhow!("unknown test_id {test_id}"))?;

        let options = match test_type {
            TestType::Boolean => [
                BooleanCode::Positive,
                BooleanCode::Negative,
                BooleanCode::Variable,
                BooleanCode::NotDetermined,
            ]
            .iter()
            .map(|code| code.as_str().to_string())
            .collect(),
            TestType::Numeric => {
                let mut stmt = self.conn.prepare(
                    "SELECT DISTINCT numeric_value FROM strain_results_numeric
                     WHERE test_id = ?1
                     ORDER BY numeric_value ASC",
                )?;
                let rows = stmt.query_map(params![test_id], |row| row.get::<_, f64>(0))?;
                collect_rows(rows)?
                    .into_iter()
                    .map(|value| value.to_string())
                    .collect()
            }
            TestType::Text => {
                let mut stmt = self.conn.prepare(
                    "SELECT DISTINCT text_value FROM strain_results_text
                     WHERE test_id = ?1
                     ORDER BY text_value ASC",
                )?;
                let rows = stmt.query_map(params![test_id], |row| row.get::<_, String>(0))?;
                collect_rows(rows)?
            }
        };

        Ok(TestOptions {
            test_id,
            test_type,
            options,
        })
    }

    /// Active strains with their observations for `test_ids`, ordered by `strain_id`.
    ///
    /// Strains with no stored observation for any of the tests are omitted.
    pub fn load_candidates(&self, test_ids: &[TestId]) -> Result<Vec<StrainRecord>> {
        if test_ids.is_empty() {
            return Ok(Vec::new());
        }

        let placeholders = (1..=test_ids.len())
            .map(|index| format!("?{index}"))
            .collect::<Vec<_>>()
            .join(", ");
        let mut observations = self.load_observations(
            &format!("s.is_active = 1 AND r.test_id IN ({placeholders})"),
            test_ids,
        )?;

        let mut stmt = self.conn.prepare(
            "SELECT strain_id, strain_identifier, scientific_name, common_name, isolation_source
             FROM strains
             WHERE is_active = 1
             ORDER BY strain_id ASC",
        )?;
        let rows = stmt.query_map([], strain_summary_from_row)?;

        let mut candidates = Vec::new();
        for strain in collect_rows(rows)? {
            if let Some(stored) = observations.remove(&strain.strain_id) {
                candidates.push(StrainRecord {
                    strain,
                    observations: stored,
                });
            }
        }
        Ok(candidates)
    }

    /// Resolves either accepted payload shape against the active catalog.
    pub fn resolve_payload(&self, payload: IdentificationPayload) -> Result<IdentificationRequest> {
        let catalog = self.load_catalog()?;
        payload
            .into_request(&catalog)
            .context("identification request rejected")
    }

    pub fn identify(
        &self,
        request: &IdentificationRequest,
        ruleset_version: u32,
    ) -> Result<IdentificationResponse> {
        let request_id = Ulid::new();
        let span = info_span!("identify", %request_id, ruleset_version);
        let _entered = span.enter();

        let ruleset = self.get_ruleset(ruleset_version)?;
        let catalog = self.load_catalog()?;
        let prepared = prepare_request(request, &catalog, &ruleset)
            .context("identification request rejected")?;
        let candidates = self.load_candidates(&prepared.query.test_ids())?;

        let response = identify_prepared(&prepared, &candidates, &ruleset);

        info!(
            observations = prepared.query.observations.len(),
            candidates = candidates.len(),
            total_results = response.total_results,
            execution_time_ms = response.execution_time_ms,
            "identification completed"
        );
        Ok(response)
    }

    pub fn identification_stats(&self) -> Result<IdentificationStats> {
        let total_strains = count_rows(
            &self.conn,
            "SELECT COUNT(*) FROM strains WHERE is_active = 1",
        )?;
        let total_tests = count_rows(&self.conn, "SELECT COUNT(*) FROM tests WHERE is_active = 1")?;
        let boolean = count_rows(&self.conn, "SELECT COUNT(*) FROM strain_results_boolean")?;
        let numeric = count_rows(
            &self.conn,
            "SELECT COUNT(*) FROM (SELECT DISTINCT strain_id, test_id FROM strain_results_numeric)",
        )?;
        let text = count_rows(&self.conn, "SELECT COUNT(*) FROM strain_results_text")?;

        let system_status = if total_strains > 0 && total_tests > 0 {
            "operational"
        } else {
            "empty"
        };

        Ok(IdentificationStats {
            total_strains,
            total_tests,
            test_results: TestResultCounts {
                boolean,
                numeric,
                text,
                total: boolean + numeric + text,
            },
            system_status: system_status.to_string(),
        })
    }

    pub fn run_benchmark(
        &self,
        config: &BenchmarkConfig,
        thresholds: Option<BenchmarkThresholds>,
    ) -> Result<BenchmarkReport> {
        if config.volumes.is_empty() {
            return Err(anyhow!(
                "benchmark config must include at least one volume value"
            ));
        }
        if config.repetitions == 0 {
            return Err(anyhow!("benchmark repetitions must be >= 1"));
        }

        let request = benchmark_request();
        let mut volume_results = Vec::new();

        for &strain_count in &config.volumes {
            let mut seed_samples_ms = Vec::new();
            let mut identify_samples_ms = Vec::new();

            for repetition in 0..config.repetitions {
                let db_path = std::env::temp_dir().join(format!(
                    "strain-id-bench-{}-{}-{}.sqlite3",
                    strain_count,
                    repetition,
                    Ulid::new()
                ));

                let mut store = SqliteStrainStore::open(&db_path)?;
                store.migrate()?;
                store.import_catalog(&benchmark_catalog())?;

                let strains: Vec<StrainInput> = (0..strain_count).map(benchmark_strain).collect();
                let seed_start = Instant::now();
                store.import_strains(&strains)?;
                seed_samples_ms.push(seed_start.elapsed().as_secs_f64() * 1_000.0);

                let identify_start = Instant::now();
                let _ = store.identify(&request, 1)?;
                identify_samples_ms.push(identify_start.elapsed().as_secs_f64() * 1_000.0);

                drop(store);
                remove_database_files(&db_path);
            }

            volume_results.push(BenchmarkVolumeResult {
                strain_count,
                seed_p50_ms: percentile(&seed_samples_ms, 0.50),
                seed_p95_ms: percentile(&seed_samples_ms, 0.95),
                identify_p50_ms: percentile(&identify_samples_ms, 0.50),
                identify_p95_ms: percentile(&identify_samples_ms, 0.95),
            });
        }

        let mut violations = Vec::new();
        if let Some(limit) = &thresholds {
            for volume in &volume_results {
                if volume.identify_p95_ms > limit.identify_p95_ms_max {
                    violations.push(format!(
                        "volume={} identify_p95_ms={} exceeds max={}",
                        volume.strain_count, volume.identify_p95_ms, limit.identify_p95_ms_max
                    ));
                }
            }
        }

        Ok(BenchmarkReport {
            contract_version: "benchmark_report.v1".to_string(),
            generated_at: format_rfc3339(now_utc())?,
            repetitions: config.repetitions,
            volumes: volume_results,
            thresholds,
            within_thresholds: violations.is_empty(),
            violations,
        })
    }

    /// Observations grouped by strain for rows matching `clause`.
    ///
    /// `clause` may reference `r` (the result table) and `s` (strains) and
    /// binds `bindings` positionally.
    fn load_observations(
        &self,
        clause: &str,
        bindings: &[i64],
    ) -> Result<BTreeMap<StrainId, BTreeMap<TestId, Observation>>> {
        let mut grouped: BTreeMap<StrainId, BTreeMap<TestId, Observation>> = BTreeMap::new();

        let mut stmt = self.conn.prepare(&format!(
            "SELECT r.strain_id, r.test_id, r.value_code
             FROM strain_results_boolean r
             JOIN strains s ON s.strain_id = r.strain_id
             WHERE {clause}"
        ))?;
        let rows = stmt.query_map(params_from_iter(bindings), |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, i64>(1)?,
                row.get::<_, String>(2)?,
            ))
        })?;
        for (strain_id, test_id, raw) in collect_rows(rows)? {
            let code = BooleanCode::parse(&raw).ok_or_else(|| {
                anyhow!("invalid stored boolean code {raw:?} for strain {strain_id} test {test_id}")
            })?;
            grouped
                .entry(strain_id)
                .or_default()
                .insert(test_id, Observation::Boolean(code));
        }

        let mut stmt = self.conn.prepare(&format!(
            "SELECT r.strain_id, r.test_id, r.value_type, r.numeric_value
             FROM strain_results_numeric r
             JOIN strains s ON s.strain_id = r.strain_id
             WHERE {clause}"
        ))?;
        let rows = stmt.query_map(params_from_iter(bindings), |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, i64>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, f64>(3)?,
            ))
        })?;
        let mut readings: BTreeMap<(StrainId, TestId), NumericReadings> = BTreeMap::new();
        for (strain_id, test_id, raw_type, value) in collect_rows(rows)? {
            let value_type = NumericValueType::parse(&raw_type).ok_or_else(|| {
                anyhow!("invalid stored value_type {raw_type:?} for strain {strain_id} test {test_id}")
            })?;
            readings
                .entry((strain_id, test_id))
                .or_default()
                .set(value_type, value);
        }
        for ((strain_id, test_id), reading) in readings {
            // A bad row counts as no observation; it must not fail other strains.
            let assembled = match reading.assemble() {
                Ok(assembled) => assembled,
                Err(reason) => {
                    warn!(
                        strain_id,
                        test_id, %reason, "skipping invalid stored numeric data"
                    );
                    None
                }
            };
            if let Some(value) = assembled {
                grouped
                    .entry(strain_id)
                    .or_default()
                    .insert(test_id, Observation::Numeric(value));
            }
        }

        let mut stmt = self.conn.prepare(&format!(
            "SELECT r.strain_id, r.test_id, r.text_value
             FROM strain_results_text r
             JOIN strains s ON s.strain_id = r.strain_id
             WHERE {clause}"
        ))?;
        let rows = stmt.query_map(params_from_iter(bindings), |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, i64>(1)?,
                row.get::<_, String>(2)?,
            ))
        })?;
        for (strain_id, test_id, value) in collect_rows(rows)? {
            let value = value.trim();
            if !value.is_empty() {
                grouped
                    .entry(strain_id)
                    .or_default()
                    .insert(test_id, Observation::Text(value.to_string()));
            }
        }

        Ok(grouped)
    }

    #[cfg(test)]
    fn connection(&self) -> &Connection {
        &self.conn
    }
}

/// Typed numeric readings stored for one strain and test.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct NumericReadings {
    single: Option<f64>,
    minimum: Option<f64>,
    maximum: Option<f64>,
    optimal: Option<f64>,
}

impl NumericReadings {
    fn set(&mut self, value_type: NumericValueType, value: f64) {
        let slot = match value_type {
            NumericValueType::Single => &mut self.single,
            NumericValueType::Minimum => &mut self.minimum,
            NumericValueType::Maximum => &mut self.maximum,
            NumericValueType::Optimal => &mut self.optimal,
        };
        *slot = Some(value);
    }

    /// minimum+maximum form a range; otherwise single, then optimal, then a
    /// lone bound is taken as the exact value.
    fn assemble(self) -> Result<Option<NumericValue>, &'static str> {
        if let (Some(min), Some(max)) = (self.minimum, self.maximum) {
            return NumericValue::range(min, max).map(Some);
        }
        self.single
            .or(self.optimal)
            .or(self.minimum)
            .or(self.maximum)
            .map(NumericValue::exact)
            .transpose()
    }
}

fn decode_ruleset(version_i64: i64, json: &str) -> Result<ScoringRuleset> {
    let version = u32::try_from(version_i64)
        .with_context(|| format!("invalid ruleset_version: {version_i64}"))?;
    let value: Value = serde_json::from_str(json).context("invalid stored ruleset JSON")?;
    let ruleset = ScoringRuleset::from_json(&value)
        .map_err(|err| anyhow!("failed to parse ruleset {version}: {err}"))?;
    if ruleset.ruleset_version != version {
        return Err(anyhow!(
            "stored ruleset {version} declares ruleset_version {}",
            ruleset.ruleset_version
        ));
    }
    Ok(ruleset)
}

fn upsert_category_in(conn: &Connection, category: &TestCategory) -> Result<()> {
    if category.category_name.trim().is_empty() {
        return Err(anyhow!(
            "category {} MUST have a non-empty category_name",
            category.category_id
        ));
    }

    conn.execute(
        "INSERT INTO test_categories(category_id, category_name, description, sort_order)
         VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT(category_id) DO UPDATE SET
           category_name = excluded.category_name,
           description = excluded.description,
           sort_order = excluded.sort_order",
        params![
            category.category_id,
            category.category_name.trim(),
            category.description,
            category.sort_order
        ],
    )
    .with_context(|| format!("failed to upsert category {}", category.category_id))?;
    Ok(())
}

fn upsert_test_in(conn: &Connection, test: &CatalogTest) -> Result<()> {
    let definition = &test.definition;
    if definition.test_code.trim().is_empty() || definition.test_name.trim().is_empty() {
        return Err(anyhow!(
            "test {} MUST have a non-empty test_code and test_name",
            definition.test_id
        ));
    }

    let existing_type: Option<String> = conn
        .query_row(
            "SELECT test_type FROM tests WHERE test_id = ?1",
            params![definition.test_id],
            |row| row.get(0),
        )
        .optional()
        .context("failed to query tests")?;
    if let Some(existing) = existing_type {
        if existing != definition.test_type.as_str() {
            return Err(anyhow!(
                "test {} is already defined as {existing}; test_type cannot change to {}",
                definition.test_id,
                definition.test_type.as_str()
            ));
        }
    }

    conn.execute(
        "INSERT INTO tests(
            test_id, category_id, test_code, test_name, test_type,
            measurement_unit, is_active, sort_order
         ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
         ON CONFLICT(test_id) DO UPDATE SET
           category_id = excluded.category_id,
           test_code = excluded.test_code,
           test_name = excluded.test_name,
           measurement_unit = excluded.measurement_unit,
           is_active = excluded.is_active,
           sort_order = excluded.sort_order",
        params![
            definition.test_id,
            definition.category_id,
            definition.test_code.trim(),
            definition.test_name.trim(),
            definition.test_type.as_str(),
            definition.measurement_unit,
            test.is_active,
            test.sort_order
        ],
    )
    .with_context(|| format!("failed to upsert test {}", definition.test_id))?;
    Ok(())
}

fn read_tests(conn: &Connection, include_inactive: bool) -> Result<Vec<CatalogTest>> {
    let mut stmt = conn.prepare(
        "SELECT test_id, test_code, test_name, test_type, measurement_unit, category_id,
                is_active, sort_order
         FROM tests
         WHERE is_active = 1 OR ?1
         ORDER BY sort_order ASC, test_id ASC",
    )?;

    let rows = stmt.query_map(params![include_inactive], |row| {
        let raw_type: String = row.get(3)?;
        let test_type = TestType::parse(&raw_type).ok_or_else(|| {
            to_sql_error(format!("invalid stored test_type {raw_type:?}"))
        })?;
        Ok(CatalogTest {
            definition: TestDefinition {
                test_id: row.get(0)?,
                test_code: row.get(1)?,
                test_name: row.get(2)?,
                test_type,
                measurement_unit: row.get(4)?,
                category_id: row.get(5)?,
            },
            is_active: row.get(6)?,
            sort_order: row.get(7)?,
        })
    })?;

    collect_rows(rows)
}

fn insert_strain_in(
    conn: &Connection,
    tests: &TestCatalog,
    input: &StrainInput,
    now: &str,
) -> Result<StrainSummary> {
    let identifier = input.strain_identifier.trim();
    if identifier.is_empty() {
        return Err(anyhow!("strain_identifier MUST be non-empty"));
    }

    let mut seen = BTreeSet::new();
    let mut observations = Vec::with_capacity(input.observations.len());
    for value in &input.observations {
        if !seen.insert(value.test_id) {
            return Err(anyhow!(
                "strain {identifier}: test_id {} recorded more than once",
                value.test_id
            ));
        }
        let test = tests
            .get(value.test_id)
            .ok_or_else(|| anyhow!("strain {identifier}: unknown test_id {}", value.test_id))?;
        if test.test_type != value.test_type {
            return Err(anyhow!(
                "strain {identifier}: test_id {} is a {} test, got {}",
                value.test_id,
                test.test_type.as_str(),
                value.test_type.as_str()
            ));
        }
        let observation =
            normalize_test_value(value).map_err(|err| anyhow!("strain {identifier}: {err}"))?;
        if let Some(observation) = observation {
            observations.push((value.test_id, observation));
        }
    }

    let scientific_name = non_blank(input.scientific_name.as_deref());
    let common_name = non_blank(input.common_name.as_deref());
    let isolation_source = non_blank(input.isolation_source.as_deref());

    conn.execute(
        "INSERT INTO strains(
            strain_identifier, scientific_name, common_name, isolation_source,
            is_active, created_at, updated_at
         ) VALUES (?1, ?2, ?3, ?4, 1, ?5, ?5)",
        params![
            identifier,
            scientific_name,
            common_name,
            isolation_source,
            now
        ],
    )
    .with_context(|| format!("failed to insert strain {identifier}"))?;
    let strain_id = conn.last_insert_rowid();

    for (test_id, observation) in &observations {
        write_observation(conn, strain_id, *test_id, observation)
            .with_context(|| format!("failed to store test {test_id} for strain {identifier}"))?;
    }

    Ok(StrainSummary {
        strain_id,
        strain_identifier: identifier.to_string(),
        scientific_name,
        common_name,
        isolation_source,
    })
}

fn write_observation(
    conn: &Connection,
    strain_id: StrainId,
    test_id: TestId,
    observation: &Observation,
) -> rusqlite::Result<()> {
    match observation {
        Observation::Boolean(code) => {
            conn.execute(
                "INSERT INTO strain_results_boolean(strain_id, test_id, value_code) VALUES (?1, ?2, ?3)",
                params![strain_id, test_id, code.as_str()],
            )?;
        }
        Observation::Numeric(NumericValue::Exact(value)) => {
            write_numeric(conn, strain_id, test_id, NumericValueType::Single, *value)?;
        }
        Observation::Numeric(NumericValue::Range { min, max }) => {
            write_numeric(conn, strain_id, test_id, NumericValueType::Minimum, *min)?;
            write_numeric(conn, strain_id, test_id, NumericValueType::Maximum, *max)?;
        }
        Observation::Text(value) => {
            conn.execute(
                "INSERT INTO strain_results_text(strain_id, test_id, text_value) VALUES (?1, ?2, ?3)",
                params![strain_id, test_id, value],
            )?;
        }
    }
    Ok(())
}

fn write_numeric(
    conn: &Connection,
    strain_id: StrainId,
    test_id: TestId,
    value_type: NumericValueType,
    value: f64,
) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO strain_results_numeric(strain_id, test_id, value_type, numeric_value)
         VALUES (?1, ?2, ?3, ?4)",
        params![strain_id, test_id, value_type.as_str(), value],
    )?;
    Ok(())
}

fn strain_summary_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<StrainSummary> {
    Ok(StrainSummary {
        strain_id: row.get(0)?,
        strain_identifier: row.get(1)?,
        scientific_name: row.get(2)?,
        common_name: row.get(3)?,
        isolation_source: row.get(4)?,
    })
}

fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

fn escape_like(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len());
    for ch in term.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}

fn count_rows(conn: &Connection, sql: &str) -> Result<usize> {
    let count: i64 = conn
        .query_row(sql, [], |row| row.get(0))
        .with_context(|| format!("failed to run count query: {sql}"))?;
    usize::try_from(count).with_context(|| format!("invalid row count {count}"))
}

fn now_utc() -> OffsetDateTime {
    OffsetDateTime::now_utc().to_offset(UtcOffset::UTC)
}

fn format_rfc3339(value: OffsetDateTime) -> Result<String> {
    value
        .to_offset(UtcOffset::UTC)
        .format(&time::format_description::well_known::Rfc3339)
        .context("failed to format RFC3339 timestamp")
}

fn remove_database_files(db_path: &Path) {
    let _ = std::fs::remove_file(db_path);
    for suffix in ["-wal", "-shm"] {
        let mut sidecar = db_path.as_os_str().to_owned();
        sidecar.push(suffix);
        let _ = std::fs::remove_file(sidecar);
    }
}

const BENCHMARK_BOOLEAN_TESTS: i64 = 20;
const BENCHMARK_NUMERIC_TEST: i64 = 21;
const BENCHMARK_TEXT_TEST: i64 = 22;
const BENCHMARK_SHAPES: [&str; 3] = ["rod", "coccus", "filament"];

fn benchmark_catalog() -> CatalogImport {
    let definition = |test_id: TestId, test_type: TestType| CatalogTest {
        definition: TestDefinition {
            test_id,
            test_code: format!("BENCH{test_id:02}"),
            test_name: format!("Benchmark test {test_id}"),
            test_type,
            measurement_unit: None,
            category_id: None,
        },
        is_active: true,
        sort_order: test_id,
    };

    let mut tests: Vec<CatalogTest> = (1..=BENCHMARK_BOOLEAN_TESTS)
        .map(|test_id| definition(test_id, TestType::Boolean))
        .collect();
    tests.push(definition(BENCHMARK_NUMERIC_TEST, TestType::Numeric));
    tests.push(definition(BENCHMARK_TEXT_TEST, TestType::Text));

    CatalogImport {
        categories: Vec::new(),
        tests,
    }
}

#[allow(clippy::cast_precision_loss)]
fn benchmark_strain(index: usize) -> StrainInput {
    let mut observations: Vec<TestValueInput> = (1..=BENCHMARK_BOOLEAN_TESTS)
        .map(|test_id| {
            let selector = (index + usize::try_from(test_id).unwrap_or(0) * 3) % 5;
            let code = match selector {
                0 | 1 => "+",
                2 | 3 => "-",
                _ => "+/-",
            };
            TestValueInput::boolean(test_id, &format!("BENCH{test_id:02}"), code)
        })
        .collect();

    let low = 20.0 + (index % 10) as f64;
    observations.push(TestValueInput::range(
        BENCHMARK_NUMERIC_TEST,
        "BENCH21",
        low,
        low + 5.0 + (index % 7) as f64,
    ));
    observations.push(TestValueInput::text(
        BENCHMARK_TEXT_TEST,
        "BENCH22",
        BENCHMARK_SHAPES[index % BENCHMARK_SHAPES.len()],
    ));

    StrainInput {
        strain_identifier: format!("BENCH-{index:06}"),
        scientific_name: Some("Benchmark organism".to_string()),
        common_name: None,
        isolation_source: None,
        observations,
    }
}

fn benchmark_request() -> IdentificationRequest {
    let mut test_values: Vec<TestValueInput> = (1..=BENCHMARK_BOOLEAN_TESTS)
        .map(|test_id| TestValueInput::boolean(test_id, &format!("BENCH{test_id:02}"), "+"))
        .collect();
    test_values.push(TestValueInput::exact(BENCHMARK_NUMERIC_TEST, "BENCH21", 28.0));
    test_values.push(TestValueInput::text(BENCHMARK_TEXT_TEST, "BENCH22", "rod"));
    IdentificationRequest::new(test_values)
}

#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
fn percentile(values: &[f64], percentile_rank: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }

    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);

    let position = (percentile_rank * sorted.len() as f64).ceil() as usize;
    let index = position.saturating_sub(1).min(sorted.len() - 1);
    sorted[index]
}

fn to_sql_error(message: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        0,
        rusqlite::types::Type::Text,
        Box::new(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            message,
        )),
    )
}

fn collect_rows<T>(
    rows: rusqlite::MappedRows<'_, impl FnMut(&rusqlite::Row<'_>) -> rusqlite::Result<T>>,
) -> Result<Vec<T>> {
    let mut values = Vec::new();
    for row in rows {
        values.push(row?);
    }
    Ok(values)
}
