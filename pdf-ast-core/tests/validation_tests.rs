//! Schema validation against parsed documents

use pdf_ast::parser::test_helpers::{signed_form, PdfFixture};
use pdf_ast::validation::{register_schema, Check, CheckFault, CheckOutcome, Schema, ValidationOptions};
use pdf_ast::{available_schemas, parse_document, Document, PdfAstError, Severity, ValidationIssue};

struct Passes(&'static str);

impl Check for Passes {
    fn id(&self) -> &str {
        self.0
    }

    fn run(&self, _: &Document) -> Result<CheckOutcome, CheckFault> {
        Ok(CheckOutcome::pass())
    }
}

struct Warns;

impl Check for Warns {
    fn id(&self) -> &str {
        "warns"
    }

    fn run(&self, _: &Document) -> Result<CheckOutcome, CheckFault> {
        Ok(CheckOutcome::from_issues(vec![ValidationIssue::warning("SOMETHING_ODD", "odd")]))
    }
}

struct Explodes;

impl Check for Explodes {
    fn id(&self) -> &str {
        "explodes"
    }

    fn run(&self, _: &Document) -> Result<CheckOutcome, CheckFault> {
        panic!("index out of range in check")
    }
}

fn one_page() -> Document {
    parse_document(&PdfFixture::single_page().build()).unwrap()
}

#[test]
fn test_unknown_schema_is_an_error() {
    let err = one_page().validate("nonexistent-schema").unwrap_err();
    assert!(matches!(err, PdfAstError::SchemaNotFound(name) if name == "nonexistent-schema"));
}

#[test]
fn test_builtin_schemas_are_available() {
    let names = available_schemas();
    for expected in ["PDF-2.0", "PDF/A-1b", "PDF/A-2b", "PDF/A-3b", "PDF/UA-1", "PDF/X-4"] {
        assert!(names.iter().any(|n| n == expected), "{expected} missing");
    }
}

#[test]
fn test_faulting_check_is_isolated() {
    register_schema(Schema::new(
        "integration/faulting",
        "1",
        vec![
            Box::new(Passes("first")),
            Box::new(Explodes),
            Box::new(Warns),
            Box::new(Passes("last")),
        ],
    ))
    .unwrap();

    let report = one_page().validate("integration/faulting").unwrap();
    assert_eq!(report.statistics.total_checks, 4);
    assert_eq!(report.statistics.failed_checks, 1);
    assert_eq!(report.statistics.passed_checks, 3);
    assert_eq!(report.checks.len(), 4);
    assert_eq!(report.checks[1].check_id, "explodes");
    assert!(report.checks[1].faulted);

    let critical: Vec<_> = report.issues_with_severity(Severity::Critical).collect();
    assert_eq!(critical.len(), 1);
    assert_eq!(critical[0].code, "CHECK_FAULT");
    assert!(critical[0].message.contains("explodes"));
    assert!(report.has_issue("SOMETHING_ODD"));
    assert!(!report.is_valid);
}

#[test]
fn test_duplicate_schema_registration_fails() {
    register_schema(Schema::new("integration/dup", "1", Vec::new())).unwrap();
    assert!(matches!(
        register_schema(Schema::new("integration/dup", "2", Vec::new())),
        Err(PdfAstError::DuplicateSchema(_))
    ));
}

#[test]
fn test_clean_document_passes_base_schema() {
    let report = one_page().validate("PDF-2.0").unwrap();
    assert!(report.is_valid, "{:#?}", report.issues);
    assert_eq!(report.statistics.failed_checks, 0);
    assert_eq!(report.schema_name, "PDF-2.0");
}

#[test]
fn test_pdfa_flags_javascript_and_unembedded_fonts() {
    let pdf = PdfFixture::single_page()
        .object(
            1,
            "<< /Type /Catalog /Pages 2 0 R /OpenAction << /S /JavaScript /JS (app.alert('hi')) >> >>",
        )
        .build();
    let report = parse_document(&pdf).unwrap().validate("PDF/A-1b").unwrap();
    assert!(!report.is_valid);
    assert!(report.has_issue("JAVASCRIPT_PRESENT"));
    assert!(report.has_issue("FONT_NOT_EMBEDDED"));
    assert!(report.has_issue("XMP_METADATA_MISSING"));
}

#[test]
fn test_pdfa1_rejects_newer_versions() {
    let pdf = PdfFixture::single_page().with_version("1.7");
    let report = parse_document(&pdf.build()).unwrap().validate("PDF/A-1b").unwrap();
    assert!(report.has_issue("VERSION_NOT_ALLOWED"));
}

#[test]
fn test_serial_and_parallel_runs_agree() {
    let doc = one_page();
    let serial = doc
        .validate_with_options("PDF/A-2b", &ValidationOptions::default().with_max_parallel_checks(1))
        .unwrap();
    let parallel = doc
        .validate_with_options("PDF/A-2b", &ValidationOptions::default().with_max_parallel_checks(8))
        .unwrap();
    assert_eq!(serial.checks, parallel.checks);
    assert_eq!(serial.issues, parallel.issues);
    assert_eq!(serial.statistics, parallel.statistics);
}

#[test]
fn test_signature_coverage_is_reported_by_every_schema() {
    let intact = parse_document(&signed_form(false)).unwrap();
    let updated = parse_document(&signed_form(true)).unwrap();
    for schema in ["PDF-2.0", "PDF/A-2b", "PDF/UA-1"] {
        let report = intact.validate(schema).unwrap();
        assert!(report.checks.iter().any(|c| c.check_id == "signatures"), "{schema}");
        assert!(!report.has_issue("SIGNATURE_PARTIAL_COVERAGE"), "{schema}");

        let report = updated.validate(schema).unwrap();
        assert!(report.has_issue("SIGNATURE_PARTIAL_COVERAGE"), "{schema}");
        assert!(!report.has_issue("SIGNATURE_BYTE_RANGE_INVALID"), "{schema}");
    }
}
