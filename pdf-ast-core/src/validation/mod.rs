//! Schema validation
//!
//! A schema is an ordered, named and versioned list of independent
//! [`Check`]s. Running a schema moves a [`ValidationRun`] through
//! `Loaded -> Running -> Completed`. Checks execute on scoped worker
//! threads; their results are put back into check order and statistics are
//! aggregated only once every check has finished. A check that returns a
//! [`CheckFault`] or panics contributes a single critical `CHECK_FAULT`
//! issue and counts as failed, the remaining checks are unaffected.

pub mod checks;
pub mod schemas;

pub use schemas::{available_schemas, register_schema, Schema, SchemaRegistry};

use crate::ast::Document;
use crate::diagnostics::{Severity, SeverityCounts, ValidationIssue};
use crate::error::{PdfAstError, Result};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::{Duration, Instant};

/// A single validation check
pub trait Check: Send + Sync {
    /// Stable identifier, e.g. `fonts_embedded`
    fn id(&self) -> &str;

    fn description(&self) -> &str {
        ""
    }

    fn run(&self, document: &Document) -> std::result::Result<CheckOutcome, CheckFault>;
}

/// What a check found
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CheckOutcome {
    pub issues: Vec<ValidationIssue>,
    pub passed: bool,
}

impl CheckOutcome {
    pub fn pass() -> Self {
        Self {
            issues: Vec::new(),
            passed: true,
        }
    }

    /// Passed unless one of `issues` is an error or worse
    pub fn from_issues(issues: Vec<ValidationIssue>) -> Self {
        let passed = !issues.iter().any(|i| i.severity.is_failure());
        Self { issues, passed }
    }
}

/// A check that could not do its job
#[derive(Debug, Clone, thiserror::Error)]
pub enum CheckFault {
    #[error("{0}")]
    Internal(String),

    #[error("check panicked: {0}")]
    Panicked(String),
}

/// Knobs for a validation run
#[derive(Debug, Clone)]
pub struct ValidationOptions {
    /// Upper bound on worker threads
    pub max_parallel_checks: usize,
}

impl Default for ValidationOptions {
    fn default() -> Self {
        Self {
            max_parallel_checks: num_cpus::get(),
        }
    }
}

impl ValidationOptions {
    pub fn with_max_parallel_checks(mut self, max: usize) -> Self {
        self.max_parallel_checks = max.max(1);
        self
    }
}

/// Per-check summary inside a report
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CheckResult {
    pub check_id: String,
    pub passed: bool,
    pub issue_count: usize,
    pub faulted: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ValidationStatistics {
    pub total_checks: usize,
    pub passed_checks: usize,
    pub failed_checks: usize,
    pub issues: SeverityCounts,
}

/// Result of validating a document against one schema
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ValidationReport {
    pub schema_name: String,
    pub schema_version: String,
    pub issues: Vec<ValidationIssue>,
    pub checks: Vec<CheckResult>,
    pub statistics: ValidationStatistics,
    pub is_valid: bool,
    pub elapsed: Duration,
}

impl ValidationReport {
    pub fn issues_with_severity(&self, severity: Severity) -> impl Iterator<Item = &ValidationIssue> {
        self.issues.iter().filter(move |i| i.severity == severity)
    }

    pub fn has_issue(&self, code: &str) -> bool {
        self.issues.iter().any(|i| i.code == code)
    }

    #[cfg(feature = "serde")]
    pub fn to_json(&self) -> std::result::Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

/// Validation run state machine
pub enum ValidationRun {
    Loaded { schema: Arc<Schema> },
    Running { schema: Arc<Schema>, remaining: usize },
    Completed(ValidationReport),
}

impl ValidationRun {
    pub fn load(schema: Arc<Schema>) -> Self {
        ValidationRun::Loaded { schema }
    }

    pub fn state(&self) -> &'static str {
        match self {
            ValidationRun::Loaded { .. } => "loaded",
            ValidationRun::Running { .. } => "running",
            ValidationRun::Completed(_) => "completed",
        }
    }

    /// Advance by one state; `Completed` stays put
    pub fn step(self, document: &Document, options: &ValidationOptions) -> Self {
        match self {
            ValidationRun::Loaded { schema } => {
                let remaining = schema.checks().len();
                ValidationRun::Running { schema, remaining }
            }
            ValidationRun::Running { schema, .. } => {
                ValidationRun::Completed(execute_schema(&schema, document, options))
            }
            done @ ValidationRun::Completed(_) => done,
        }
    }

    /// Drive the run until it completes
    pub fn run_to_completion(mut self, document: &Document, options: &ValidationOptions) -> ValidationReport {
        loop {
            self = match self {
                ValidationRun::Completed(report) => return report,
                other => other.step(document, options),
            };
        }
    }

    pub fn report(&self) -> Option<&ValidationReport> {
        match self {
            ValidationRun::Completed(report) => Some(report),
            _ => None,
        }
    }
}

/// Validate `document` against the registered schema `schema_name`
#[tracing::instrument(level = "debug", skip(document, options))]
pub fn validate(document: &Document, schema_name: &str, options: &ValidationOptions) -> Result<ValidationReport> {
    let schema = SchemaRegistry::global()
        .get(schema_name)
        .ok_or_else(|| PdfAstError::SchemaNotFound(schema_name.to_string()))?;
    Ok(ValidationRun::load(schema).run_to_completion(document, options))
}

type CheckRun = std::result::Result<CheckOutcome, CheckFault>;

fn run_check(check: &dyn Check, document: &Document) -> CheckRun {
    match catch_unwind(AssertUnwindSafe(|| check.run(document))) {
        Ok(result) => result,
        Err(payload) => {
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            Err(CheckFault::Panicked(message))
        }
    }
}

/// Run every check of `schema` and aggregate the results
pub fn execute_schema(schema: &Schema, document: &Document, options: &ValidationOptions) -> ValidationReport {
    let start = Instant::now();
    let checks = schema.checks();
    let workers = options.max_parallel_checks.clamp(1, checks.len().max(1));
    let next = AtomicUsize::new(0);
    let (sender, receiver) = mpsc::channel::<(usize, CheckRun)>();

    thread::scope(|scope| {
        for _ in 0..workers {
            let sender = sender.clone();
            let next = &next;
            scope.spawn(move || loop {
                let index = next.fetch_add(1, Ordering::SeqCst);
                let Some(check) = checks.get(index) else {
                    break;
                };
                let _ = sender.send((index, run_check(check.as_ref(), document)));
            });
        }
    });
    drop(sender);

    let mut results: Vec<Option<CheckRun>> = (0..checks.len()).map(|_| None).collect();
    for (index, result) in receiver {
        results[index] = Some(result);
    }

    let mut issues = Vec::new();
    let mut check_results = Vec::with_capacity(checks.len());
    for (check, result) in checks.iter().zip(results) {
        let result = result.unwrap_or_else(|| Err(CheckFault::Internal("check did not report".to_string())));
        match result {
            Ok(outcome) => {
                check_results.push(CheckResult {
                    check_id: check.id().to_string(),
                    passed: outcome.passed,
                    issue_count: outcome.issues.len(),
                    faulted: false,
                });
                issues.extend(outcome.issues);
            }
            Err(fault) => {
                tracing::error!(check = check.id(), %fault, "validation check faulted");
                check_results.push(CheckResult {
                    check_id: check.id().to_string(),
                    passed: false,
                    issue_count: 1,
                    faulted: true,
                });
                issues.push(
                    ValidationIssue::critical(
                        "CHECK_FAULT",
                        format!("Check '{}' failed to run: {fault}", check.id()),
                    )
                    .with_location(format!("check {}", check.id())),
                );
            }
        }
    }

    let passed_checks = check_results.iter().filter(|c| c.passed).count();
    let statistics = ValidationStatistics {
        total_checks: check_results.len(),
        passed_checks,
        failed_checks: check_results.len() - passed_checks,
        issues: SeverityCounts::from_issues(&issues),
    };
    let is_valid = !issues.iter().any(|i| i.severity.is_failure());

    tracing::debug!(
        schema = schema.name(),
        checks = statistics.total_checks,
        failed = statistics.failed_checks,
        "validation finished"
    );

    ValidationReport {
        schema_name: schema.name().to_string(),
        schema_version: schema.version().to_string(),
        issues,
        checks: check_results,
        statistics,
        is_valid,
        elapsed: start.elapsed(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse_document;
    use crate::parser::test_helpers::PdfFixture;

    struct Fixed(&'static str, Severity);

    impl Check for Fixed {
        fn id(&self) -> &str {
            self.0
        }

        fn run(&self, _: &Document) -> std::result::Result<CheckOutcome, CheckFault> {
            Ok(CheckOutcome::from_issues(vec![ValidationIssue::new(self.1, self.0, "found")]))
        }
    }

    struct Panics;

    impl Check for Panics {
        fn id(&self) -> &str {
            "panics"
        }

        fn run(&self, _: &Document) -> std::result::Result<CheckOutcome, CheckFault> {
            panic!("boom")
        }
    }

    struct Faults;

    impl Check for Faults {
        fn id(&self) -> &str {
            "faults"
        }

        fn run(&self, _: &Document) -> std::result::Result<CheckOutcome, CheckFault> {
            Err(CheckFault::Internal("no data".to_string()))
        }
    }

    fn document() -> Document {
        parse_document(&PdfFixture::minimal().build()).unwrap()
    }

    #[test]
    fn test_state_machine() {
        let schema = Arc::new(Schema::new("t", "1", vec![Box::new(Fixed("a", Severity::Info))]));
        let doc = document();
        let options = ValidationOptions::default();
        let run = ValidationRun::load(schema);
        assert_eq!(run.state(), "loaded");
        let run = run.step(&doc, &options);
        assert!(matches!(run, ValidationRun::Running { remaining: 1, .. }));
        let run = run.step(&doc, &options);
        assert_eq!(run.state(), "completed");
        assert!(run.report().unwrap().is_valid);
    }

    #[test]
    fn test_faulting_checks_are_isolated() {
        let schema = Schema::new(
            "t",
            "1",
            vec![
                Box::new(Fixed("a", Severity::Warning)),
                Box::new(Panics),
                Box::new(Fixed("b", Severity::Error)),
                Box::new(Faults),
            ],
        );
        let report = execute_schema(&schema, &document(), &ValidationOptions::default().with_max_parallel_checks(2));
        assert_eq!(report.statistics.total_checks, 4);
        assert_eq!(report.statistics.failed_checks, 3);
        assert_eq!(report.statistics.passed_checks, 1);
        assert_eq!(report.statistics.issues.critical, 2);
        assert!(!report.is_valid);
        let ids: Vec<&str> = report.checks.iter().map(|c| c.check_id.as_str()).collect();
        assert_eq!(ids, ["a", "panics", "b", "faults"]);
        assert!(report.checks[1].faulted);
        assert!(report.has_issue("a"));
        assert!(report.has_issue("b"));
    }

    #[test]
    fn test_unknown_schema() {
        let err = validate(&document(), "no-such-schema", &ValidationOptions::default()).unwrap_err();
        assert!(matches!(err, PdfAstError::SchemaNotFound(name) if name == "no-such-schema"));
    }

    #[test]
    fn test_empty_schema() {
        let report = execute_schema(&Schema::new("e", "0", Vec::new()), &document(), &ValidationOptions::default());
        assert_eq!(report.statistics.total_checks, 0);
        assert!(report.is_valid);
    }
}
