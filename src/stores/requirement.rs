//! Per-spec requirement and test sub-stores.
//!
//! Each spec directory carries `requirements.jsonl` and `tests.jsonl`:
//! one JSON record per line, rewritten whole on every mutation so a crash
//! never leaves a half-written line. Ids are `REQ-NNNN` / `TEST-NNNN`,
//! monotonic within the spec. Mutations also refresh the matching
//! summary array in the spec's `index.json`.

use crate::core::error::OapsError;
use crate::core::fsio;
use crate::core::time;
use crate::stores::spec::SpecIndex;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::fs;
use std::path::{Path, PathBuf};

/// Kind of requirement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequirementType {
    Functional,
    Quality,
    Security,
    Interface,
    Constraint,
}

impl RequirementType {
    pub fn as_str(self) -> &'static str {
        match self {
            RequirementType::Functional => "functional",
            RequirementType::Quality => "quality",
            RequirementType::Security => "security",
            RequirementType::Interface => "interface",
            RequirementType::Constraint => "constraint",
        }
    }
}

/// Lifecycle status of a requirement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequirementStatus {
    Proposed,
    Approved,
    Implementing,
    Implemented,
    Verified,
}

impl RequirementStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            RequirementStatus::Proposed => "proposed",
            RequirementStatus::Approved => "approved",
            RequirementStatus::Implementing => "implementing",
            RequirementStatus::Implemented => "implemented",
            RequirementStatus::Verified => "verified",
        }
    }
}

/// A single addressable requirement within a spec.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Requirement {
    pub id: String,
    pub req_type: RequirementType,
    pub title: String,
    pub description: String,
    pub status: RequirementStatus,
    #[serde(with = "time::iso")]
    pub created: DateTime<Utc>,
    #[serde(
        default,
        with = "time::iso_opt",
        skip_serializing_if = "Option::is_none"
    )]
    pub updated: Option<DateTime<Utc>>,
    pub author: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rationale: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub acceptance_criteria: Vec<String>,
    /// Test ids that verified this requirement.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub verified_by: Vec<String>,
    /// Other requirement ids this one depends on.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
}

/// Verification method of a test record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestMethod {
    Unit,
    Integration,
    E2e,
    Property,
    Manual,
}

impl TestMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            TestMethod::Unit => "unit",
            TestMethod::Integration => "integration",
            TestMethod::E2e => "e2e",
            TestMethod::Property => "property",
            TestMethod::Manual => "manual",
        }
    }
}

/// Implementation status of a test record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestStatus {
    Proposed,
    Implemented,
    Obsolete,
}

/// Outcome of the most recent run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestResult {
    Pass,
    Fail,
    Skip,
    Unknown,
}

/// A verification record pointing at zero or more requirements.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TestRecord {
    pub id: String,
    pub title: String,
    pub method: TestMethod,
    pub status: TestStatus,
    pub last_result: TestResult,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tests_requirements: Vec<String>,
}

/// Parameters for `RequirementStore::create`.
#[derive(Debug, Clone)]
pub struct CreateRequirement<'a> {
    pub req_type: RequirementType,
    pub title: &'a str,
    pub description: &'a str,
    pub author: &'a str,
    pub rationale: Option<&'a str>,
    pub acceptance_criteria: Vec<String>,
    pub depends_on: Vec<String>,
    pub tags: Vec<String>,
}

impl<'a> CreateRequirement<'a> {
    pub fn new(
        req_type: RequirementType,
        title: &'a str,
        description: &'a str,
        author: &'a str,
    ) -> Self {
        Self {
            req_type,
            title,
            description,
            author,
            rationale: None,
            acceptance_criteria: Vec::new(),
            depends_on: Vec::new(),
            tags: Vec::new(),
        }
    }
}

/// Field patch for `RequirementStore::update`.
#[derive(Debug, Clone, Default)]
pub struct UpdateRequirement<'a> {
    pub title: Option<&'a str>,
    pub description: Option<&'a str>,
    pub status: Option<RequirementStatus>,
    pub rationale: Option<&'a str>,
    pub acceptance_criteria: Option<Vec<String>>,
    pub verified_by: Option<Vec<String>>,
    pub depends_on: Option<Vec<String>>,
    pub tags: Option<Vec<String>>,
}

/// Parameters for `TestStore::create`.
#[derive(Debug, Clone)]
pub struct CreateTest<'a> {
    pub title: &'a str,
    pub method: TestMethod,
    pub tests_requirements: Vec<String>,
    pub file: Option<&'a str>,
    pub function: Option<&'a str>,
}

impl<'a> CreateTest<'a> {
    pub fn new(title: &'a str, method: TestMethod) -> Self {
        Self {
            title,
            method,
            tests_requirements: Vec::new(),
            file: None,
            function: None,
        }
    }
}

/// Field patch for `TestStore::update`.
#[derive(Debug, Clone, Default)]
pub struct UpdateTest<'a> {
    pub title: Option<&'a str>,
    pub method: Option<TestMethod>,
    pub status: Option<TestStatus>,
    pub last_result: Option<TestResult>,
    pub file: Option<&'a str>,
    pub function: Option<&'a str>,
    pub tests_requirements: Option<Vec<String>>,
}

fn read_jsonl<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<Vec<T>, OapsError> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let raw = fs::read_to_string(path)?;
    let mut records = Vec::new();
    for line in raw.lines() {
        if line.trim().is_empty() {
            continue;
        }
        records.push(
            serde_json::from_str(line)
                .map_err(|e| OapsError::Format(format!("malformed record in {}: {e}", path.display())))?,
        );
    }
    Ok(records)
}

fn write_jsonl<T: Serialize>(path: &Path, records: &[T]) -> Result<(), OapsError> {
    let mut out = String::new();
    for record in records {
        out.push_str(&serde_json::to_string(record)?);
        out.push('\n');
    }
    fsio::write_atomic(path, &out)
}

fn next_number(ids: impl Iterator<Item = String>) -> u64 {
    ids.filter_map(|id| id.rsplit('-').next().and_then(|n| n.parse::<u64>().ok()))
        .max()
        .unwrap_or(0)
        + 1
}

fn patch_spec_index(
    spec_dir: &Path,
    apply: impl FnOnce(&mut SpecIndex),
) -> Result<(), OapsError> {
    let path = spec_dir.join("index.json");
    let mut index: SpecIndex = if path.exists() {
        let raw = fs::read_to_string(&path)?;
        serde_json::from_str(&raw)
            .map_err(|e| OapsError::Format(format!("malformed spec index: {e}")))?
    } else {
        SpecIndex::default()
    };
    apply(&mut index);
    index.updated = time::now_iso();
    fsio::write_atomic(&path, &serde_json::to_string_pretty(&index)?)
}

/// Requirements of one spec, stored in `requirements.jsonl`.
pub struct RequirementStore {
    spec_dir: PathBuf,
}

impl RequirementStore {
    pub fn new(spec_dir: impl Into<PathBuf>) -> Self {
        Self {
            spec_dir: spec_dir.into(),
        }
    }

    pub fn records_path(&self) -> PathBuf {
        self.spec_dir.join("requirements.jsonl")
    }

    pub fn list(&self) -> Result<Vec<Requirement>, OapsError> {
        read_jsonl(&self.records_path())
    }

    pub fn get(&self, req_id: &str) -> Result<Requirement, OapsError> {
        self.list()?
            .into_iter()
            .find(|r| r.id == req_id)
            .ok_or_else(|| OapsError::not_found("requirement", req_id))
    }

    pub fn exists(&self, req_id: &str) -> Result<bool, OapsError> {
        Ok(self.list()?.iter().any(|r| r.id == req_id))
    }

    pub fn create(&self, params: CreateRequirement<'_>) -> Result<Requirement, OapsError> {
        if params.title.trim().is_empty() {
            return Err(OapsError::Validation("title cannot be empty".to_string()));
        }
        let mut records = self.list()?;
        let number = next_number(records.iter().map(|r| r.id.clone()));
        let requirement = Requirement {
            id: format!("REQ-{number:04}"),
            req_type: params.req_type,
            title: params.title.to_string(),
            description: params.description.to_string(),
            status: RequirementStatus::Proposed,
            created: time::now_utc(),
            updated: None,
            author: params.author.to_string(),
            rationale: params.rationale.map(str::to_string),
            acceptance_criteria: params.acceptance_criteria,
            verified_by: Vec::new(),
            depends_on: params.depends_on,
            tags: params.tags,
        };
        records.push(requirement.clone());
        write_jsonl(&self.records_path(), &records)?;
        self.refresh_index(&records)?;
        Ok(requirement)
    }

    pub fn update(
        &self,
        req_id: &str,
        patch: UpdateRequirement<'_>,
    ) -> Result<Requirement, OapsError> {
        let mut records = self.list()?;
        let record = records
            .iter_mut()
            .find(|r| r.id == req_id)
            .ok_or_else(|| OapsError::not_found("requirement", req_id))?;

        if let Some(title) = patch.title {
            record.title = title.to_string();
        }
        if let Some(description) = patch.description {
            record.description = description.to_string();
        }
        if let Some(status) = patch.status {
            record.status = status;
        }
        if let Some(rationale) = patch.rationale {
            record.rationale = Some(rationale.to_string());
        }
        if let Some(criteria) = patch.acceptance_criteria {
            record.acceptance_criteria = criteria;
        }
        if let Some(verified_by) = patch.verified_by {
            record.verified_by = verified_by;
        }
        if let Some(depends_on) = patch.depends_on {
            record.depends_on = depends_on;
        }
        if let Some(tags) = patch.tags {
            record.tags = tags;
        }
        record.updated = Some(time::now_utc());

        let updated = record.clone();
        write_jsonl(&self.records_path(), &records)?;
        self.refresh_index(&records)?;
        Ok(updated)
    }

    pub fn delete(&self, req_id: &str) -> Result<(), OapsError> {
        let records = self.list()?;
        if !records.iter().any(|r| r.id == req_id) {
            return Err(OapsError::not_found("requirement", req_id));
        }
        let remaining: Vec<Requirement> =
            records.into_iter().filter(|r| r.id != req_id).collect();
        write_jsonl(&self.records_path(), &remaining)?;
        self.refresh_index(&remaining)?;
        Ok(())
    }

    fn refresh_index(&self, records: &[Requirement]) -> Result<(), OapsError> {
        let summaries: Vec<serde_json::Value> = records
            .iter()
            .map(|r| {
                json!({
                    "id": r.id,
                    "title": r.title,
                    "req_type": r.req_type,
                    "status": r.status,
                })
            })
            .collect();
        patch_spec_index(&self.spec_dir, |index| index.requirements = summaries)
    }
}

/// Test records of one spec, stored in `tests.jsonl`.
pub struct TestStore {
    spec_dir: PathBuf,
}

impl TestStore {
    pub fn new(spec_dir: impl Into<PathBuf>) -> Self {
        Self {
            spec_dir: spec_dir.into(),
        }
    }

    pub fn records_path(&self) -> PathBuf {
        self.spec_dir.join("tests.jsonl")
    }

    pub fn list(&self) -> Result<Vec<TestRecord>, OapsError> {
        read_jsonl(&self.records_path())
    }

    pub fn get(&self, test_id: &str) -> Result<TestRecord, OapsError> {
        self.list()?
            .into_iter()
            .find(|t| t.id == test_id)
            .ok_or_else(|| OapsError::not_found("test", test_id))
    }

    pub fn exists(&self, test_id: &str) -> Result<bool, OapsError> {
        Ok(self.list()?.iter().any(|t| t.id == test_id))
    }

    pub fn create(&self, params: CreateTest<'_>) -> Result<TestRecord, OapsError> {
        if params.title.trim().is_empty() {
            return Err(OapsError::Validation("title cannot be empty".to_string()));
        }
        let mut records = self.list()?;
        let number = next_number(records.iter().map(|t| t.id.clone()));
        let test = TestRecord {
            id: format!("TEST-{number:04}"),
            title: params.title.to_string(),
            method: params.method,
            status: TestStatus::Proposed,
            last_result: TestResult::Unknown,
            file: params.file.map(str::to_string),
            function: params.function.map(str::to_string),
            tests_requirements: params.tests_requirements,
        };
        records.push(test.clone());
        write_jsonl(&self.records_path(), &records)?;
        self.refresh_index(&records)?;
        Ok(test)
    }

    pub fn update(&self, test_id: &str, patch: UpdateTest<'_>) -> Result<TestRecord, OapsError> {
        let mut records = self.list()?;
        let record = records
            .iter_mut()
            .find(|t| t.id == test_id)
            .ok_or_else(|| OapsError::not_found("test", test_id))?;

        if let Some(title) = patch.title {
            record.title = title.to_string();
        }
        if let Some(method) = patch.method {
            record.method = method;
        }
        if let Some(status) = patch.status {
            record.status = status;
        }
        if let Some(last_result) = patch.last_result {
            record.last_result = last_result;
        }
        if let Some(file) = patch.file {
            record.file = Some(file.to_string());
        }
        if let Some(function) = patch.function {
            record.function = Some(function.to_string());
        }
        if let Some(reqs) = patch.tests_requirements {
            record.tests_requirements = reqs;
        }

        let updated = record.clone();
        write_jsonl(&self.records_path(), &records)?;
        self.refresh_index(&records)?;
        Ok(updated)
    }

    pub fn delete(&self, test_id: &str) -> Result<(), OapsError> {
        let records = self.list()?;
        if !records.iter().any(|t| t.id == test_id) {
            return Err(OapsError::not_found("test", test_id));
        }
        let remaining: Vec<TestRecord> = records.into_iter().filter(|t| t.id != test_id).collect();
        write_jsonl(&self.records_path(), &remaining)?;
        self.refresh_index(&remaining)?;
        Ok(())
    }

    fn refresh_index(&self, records: &[TestRecord]) -> Result<(), OapsError> {
        let summaries: Vec<serde_json::Value> = records
            .iter()
            .map(|t| {
                json!({
                    "id": t.id,
                    "title": t.title,
                    "method": t.method,
                    "status": t.status,
                    "last_result": t.last_result,
                })
            })
            .collect();
        patch_spec_index(&self.spec_dir, |index| index.tests = summaries)
    }
}
