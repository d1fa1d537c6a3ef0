//! Built-in validation checks
//!
//! Checks only read the document model. They look at node types and the
//! rendered dictionary properties; none of them re-parses the source.

use super::{Check, CheckFault, CheckOutcome};
use crate::ast::{AstNode, Document, NodeType};
use crate::diagnostics::{Severity, ValidationIssue};
use crate::parser::PdfVersion;
use std::collections::HashSet;

type CheckResult = Result<CheckOutcome, CheckFault>;

fn issue_for(node: &AstNode, severity: Severity, code: &str, message: String) -> ValidationIssue {
    let issue = ValidationIssue::new(severity, code, message).with_node(node.id);
    match node.object_id() {
        Some(id) => issue.with_location(format!("object {id}")),
        None => issue,
    }
}

fn is_true(node: &AstNode, key: &str) -> bool {
    node.property(key) == Some("true")
}

/// Catalog is present and points at a page tree
pub struct CatalogCheck;

impl Check for CatalogCheck {
    fn id(&self) -> &str {
        "catalog"
    }

    fn description(&self) -> &str {
        "Document catalog is well formed"
    }

    fn run(&self, document: &Document) -> CheckResult {
        let root = document.root();
        let mut issues = Vec::new();
        if root.property_name("Type") != Some("Catalog") {
            issues.push(issue_for(
                root,
                Severity::Error,
                "CATALOG_TYPE_MISSING",
                "Catalog dictionary lacks /Type /Catalog".to_string(),
            ));
        }
        match document.referenced(root, "Pages") {
            None => issues.push(
                issue_for(
                    root,
                    Severity::Error,
                    "CATALOG_PAGES_MISSING",
                    "Catalog has no resolvable /Pages entry".to_string(),
                )
                .with_suggestion("The catalog must reference the root of the page tree"),
            ),
            Some(pages) if pages.node_type != NodeType::Pages => issues.push(issue_for(
                pages,
                Severity::Error,
                "PAGE_TREE_INVALID",
                format!("Catalog /Pages points at a {} node", pages.node_type),
            )),
            Some(_) => {}
        }
        Ok(CheckOutcome::from_issues(issues))
    }
}

/// The tree has pages and every page hangs off a page tree node
pub struct DocumentStructureCheck;

impl Check for DocumentStructureCheck {
    fn id(&self) -> &str {
        "document_structure"
    }

    fn description(&self) -> &str {
        "Document contains pages reachable from the catalog"
    }

    fn run(&self, document: &Document) -> CheckResult {
        let pages = document.nodes_by_type(NodeType::Page);
        let mut issues = Vec::new();
        if pages.is_empty() {
            issues.push(ValidationIssue::warning("NO_PAGES", "Document contains no pages"));
        }
        for page in pages {
            let under_tree = document
                .parents(page.id)
                .iter()
                .any(|p| p.node_type == NodeType::Pages);
            if !under_tree {
                issues.push(issue_for(
                    page,
                    Severity::Warning,
                    "ORPHAN_PAGE",
                    "Page is not reached through a /Kids array".to_string(),
                ));
            }
        }
        Ok(CheckOutcome::from_issues(issues))
    }
}

/// `/Count` matches the leaves and every page has a media box
pub struct PageTreeCheck;

impl PageTreeCheck {
    fn has_media_box(document: &Document, page: &AstNode) -> bool {
        let mut seen = HashSet::new();
        let mut current = Some(page);
        while let Some(node) = current {
            if !seen.insert(node.id) {
                return false;
            }
            if node.has_property("MediaBox") {
                return true;
            }
            current = document
                .parents(node.id)
                .into_iter()
                .find(|p| p.node_type == NodeType::Pages);
        }
        false
    }
}

impl Check for PageTreeCheck {
    fn id(&self) -> &str {
        "page_tree"
    }

    fn description(&self) -> &str {
        "Page counts and inherited media boxes are consistent"
    }

    fn run(&self, document: &Document) -> CheckResult {
        let mut issues = Vec::new();
        for pages in document.nodes_by_type(NodeType::Pages) {
            let Some(declared) = pages.property("Count").and_then(|c| c.parse::<usize>().ok()) else {
                issues.push(issue_for(
                    pages,
                    Severity::Error,
                    "PAGE_COUNT_MISSING",
                    "Page tree node has no integer /Count".to_string(),
                ));
                continue;
            };
            let actual = document
                .descendants(pages.id)
                .iter()
                .filter(|n| n.node_type == NodeType::Page)
                .count();
            if declared != actual {
                issues.push(issue_for(
                    pages,
                    Severity::Warning,
                    "PAGE_COUNT_MISMATCH",
                    format!("/Count is {declared} but {actual} pages were found"),
                ));
            }
        }
        for page in document.nodes_by_type(NodeType::Page) {
            if !Self::has_media_box(document, page) {
                issues.push(issue_for(
                    page,
                    Severity::Error,
                    "PAGE_MEDIABOX_MISSING",
                    "Page has no /MediaBox, neither direct nor inherited".to_string(),
                ));
            }
        }
        Ok(CheckOutcome::from_issues(issues))
    }
}

/// Flags a rebuilt index and dangling references
pub struct XRefIntegrityCheck {
    pub severity: Severity,
}

impl Check for XRefIntegrityCheck {
    fn id(&self) -> &str {
        "xref_integrity"
    }

    fn description(&self) -> &str {
        "Cross-reference information is intact"
    }

    fn run(&self, document: &Document) -> CheckResult {
        let mut issues = Vec::new();
        if document.statistics().xref_rebuilt {
            issues.push(
                ValidationIssue::new(
                    self.severity,
                    "XREF_INDEX_REBUILT",
                    "Cross-reference index had to be reconstructed by scanning the file",
                )
                .with_suggestion("Re-save the document to write a valid cross-reference table"),
            );
        }
        let dangling = document
            .diagnostics()
            .iter()
            .filter(|d| d.code == "REFERENCE_UNRESOLVED")
            .count();
        if dangling > 0 {
            issues.push(ValidationIssue::new(
                self.severity,
                "DANGLING_REFERENCES",
                format!("{dangling} references point at missing objects"),
            ));
        }
        Ok(CheckOutcome::from_issues(issues))
    }
}

/// Surfaces the parser's diagnostics in the report
pub struct ParseDiagnosticsCheck;

impl Check for ParseDiagnosticsCheck {
    fn id(&self) -> &str {
        "parse_diagnostics"
    }

    fn description(&self) -> &str {
        "Problems recorded while parsing"
    }

    fn run(&self, document: &Document) -> CheckResult {
        Ok(CheckOutcome::from_issues(document.diagnostics().to_vec()))
    }
}

/// Allowed range of the effective PDF version
pub struct VersionCheck {
    pub min: PdfVersion,
    pub max: PdfVersion,
}

impl Check for VersionCheck {
    fn id(&self) -> &str {
        "version"
    }

    fn description(&self) -> &str {
        "PDF version is allowed by the schema"
    }

    fn run(&self, document: &Document) -> CheckResult {
        let version = document.version();
        let mut issues = Vec::new();
        if !version.is_known() {
            issues.push(ValidationIssue::warning(
                "VERSION_UNKNOWN",
                format!("PDF version {version} is not a published version"),
            ));
        }
        if version < self.min || version > self.max {
            issues.push(
                ValidationIssue::error(
                    "VERSION_NOT_ALLOWED",
                    format!(
                        "PDF version {version} is outside the allowed range {} to {}",
                        self.min, self.max
                    ),
                )
                .with_location("header"),
            );
        }
        Ok(CheckOutcome::from_issues(issues))
    }
}

/// Font programs are embedded
pub struct FontEmbeddingCheck;

impl FontEmbeddingCheck {
    const FONT_FILE_KEYS: [&'static str; 3] = ["FontFile", "FontFile2", "FontFile3"];

    fn is_embedded(document: &Document, font: &AstNode) -> bool {
        if let Some(descriptor) = document.referenced(font, "FontDescriptor") {
            return Self::FONT_FILE_KEYS.iter().any(|k| descriptor.has_property(k));
        }
        font.property("FontDescriptor")
            .is_some_and(|inline| inline.contains("/FontFile"))
    }
}

impl Check for FontEmbeddingCheck {
    fn id(&self) -> &str {
        "fonts_embedded"
    }

    fn description(&self) -> &str {
        "All fonts used in the document are embedded"
    }

    fn run(&self, document: &Document) -> CheckResult {
        let mut issues = Vec::new();
        for font in document.fonts() {
            // Composite fonts are checked through their descendants, Type 3 glyphs live in the file
            if matches!(font.property_name("Subtype"), Some("Type0") | Some("Type3")) {
                continue;
            }
            if !Self::is_embedded(document, font) {
                let name = font.property_name("BaseFont").unwrap_or("unnamed");
                issues.push(
                    issue_for(
                        font,
                        Severity::Error,
                        "FONT_NOT_EMBEDDED",
                        format!("Font {name} is not embedded"),
                    )
                    .with_suggestion("Embed the font program (FontFile, FontFile2 or FontFile3)"),
                );
            }
        }
        Ok(CheckOutcome::from_issues(issues))
    }
}

/// Reports every node of the given types
pub struct ForbiddenNodesCheck {
    pub id: &'static str,
    pub node_types: &'static [NodeType],
    pub code: &'static str,
    pub severity: Severity,
    pub what: &'static str,
}

impl ForbiddenNodesCheck {
    pub fn javascript(severity: Severity) -> Self {
        Self {
            id: "no_javascript",
            node_types: &[NodeType::JavaScript],
            code: "JAVASCRIPT_PRESENT",
            severity,
            what: "JavaScript",
        }
    }

    pub fn multimedia(severity: Severity) -> Self {
        Self {
            id: "no_multimedia",
            node_types: &[NodeType::Multimedia],
            code: "MULTIMEDIA_PRESENT",
            severity,
            what: "Multimedia content",
        }
    }
}

impl Check for ForbiddenNodesCheck {
    fn id(&self) -> &str {
        self.id
    }

    fn run(&self, document: &Document) -> CheckResult {
        let issues = self
            .node_types
            .iter()
            .flat_map(|&t| document.nodes_by_type(t))
            .map(|node| {
                issue_for(
                    node,
                    self.severity,
                    self.code,
                    format!("{} is not permitted", self.what),
                )
            })
            .collect();
        Ok(CheckOutcome::from_issues(issues))
    }
}

/// The document must not be encrypted
pub struct EncryptionCheck;

impl Check for EncryptionCheck {
    fn id(&self) -> &str {
        "no_encryption"
    }

    fn description(&self) -> &str {
        "Document is not encrypted"
    }

    fn run(&self, document: &Document) -> CheckResult {
        let mut issues: Vec<ValidationIssue> = document
            .nodes_by_type(NodeType::Encryption)
            .into_iter()
            .map(|node| {
                let permissions = node.property("permissions").unwrap_or("unknown");
                issue_for(
                    node,
                    Severity::Error,
                    "ENCRYPTION_PRESENT",
                    format!("Document is encrypted (permissions: {permissions})"),
                )
            })
            .collect();
        if issues.is_empty() && document.encryption().is_encrypted() {
            issues.push(ValidationIssue::error("ENCRYPTION_PRESENT", "Document is encrypted"));
        }
        Ok(CheckOutcome::from_issues(issues))
    }
}

/// Signature dictionaries carry a digest and a byte range that covers the file
pub struct SignatureCheck;

impl Check for SignatureCheck {
    fn id(&self) -> &str {
        "signatures"
    }

    fn description(&self) -> &str {
        "Signatures are complete and cover the whole file"
    }

    fn run(&self, document: &Document) -> CheckResult {
        let mut issues = Vec::new();
        for sig in document.nodes_by_type(NodeType::Signature) {
            if !sig.has_property("Contents") {
                issues.push(issue_for(
                    sig,
                    Severity::Error,
                    "SIGNATURE_CONTENTS_MISSING",
                    "Signature has no /Contents".to_string(),
                ));
            }
            if !sig.has_property("Filter") {
                issues.push(issue_for(
                    sig,
                    Severity::Warning,
                    "SIGNATURE_FILTER_MISSING",
                    "Signature does not name a signature handler".to_string(),
                ));
            }
            match sig.property("byteRangeStatus") {
                Some("missing") => issues.push(issue_for(
                    sig,
                    Severity::Error,
                    "SIGNATURE_BYTE_RANGE_MISSING",
                    "Signature has no /ByteRange".to_string(),
                )),
                Some("malformed") => issues.push(issue_for(
                    sig,
                    Severity::Error,
                    "SIGNATURE_BYTE_RANGE_INVALID",
                    format!(
                        "Signature /ByteRange is unusable: {}",
                        sig.property("byteRangeProblem").unwrap_or("unknown problem")
                    ),
                )),
                Some("valid") if !is_true(sig, "coversWholeFile") => issues.push(
                    issue_for(
                        sig,
                        Severity::Info,
                        "SIGNATURE_PARTIAL_COVERAGE",
                        format!(
                            "Signature covers {} bytes, not the whole file",
                            sig.property("signedBytes").unwrap_or("0")
                        ),
                    )
                    .with_suggestion("The file was changed after signing, e.g. by an incremental update"),
                ),
                _ => {}
            }
        }
        Ok(CheckOutcome::from_issues(issues))
    }
}

/// How embedded files are treated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbeddedFilePolicy {
    Forbidden,
    /// Allowed, but conformance of the attachment cannot be verified
    Discouraged,
    /// Allowed when the file specification declares `/AFRelationship`
    RequireRelationship,
}

pub struct EmbeddedFilesCheck {
    pub policy: EmbeddedFilePolicy,
}

impl Check for EmbeddedFilesCheck {
    fn id(&self) -> &str {
        "embedded_files"
    }

    fn description(&self) -> &str {
        "Embedded files follow the schema's attachment rules"
    }

    fn run(&self, document: &Document) -> CheckResult {
        let mut issues = Vec::new();
        for node in document.nodes_by_type(NodeType::EmbeddedFile) {
            // File specifications carry /EF, the streams themselves are covered through them
            let is_filespec = node.has_property("EF");
            match self.policy {
                EmbeddedFilePolicy::Forbidden => issues.push(issue_for(
                    node,
                    Severity::Error,
                    "EMBEDDED_FILE_FORBIDDEN",
                    "Embedded files are not permitted".to_string(),
                )),
                EmbeddedFilePolicy::Discouraged if is_filespec => issues.push(issue_for(
                    node,
                    Severity::Warning,
                    "EMBEDDED_FILE_UNVERIFIED",
                    "Embedded file must itself conform; this cannot be verified".to_string(),
                )),
                EmbeddedFilePolicy::RequireRelationship if is_filespec && !node.has_property("AFRelationship") => {
                    issues.push(
                        issue_for(
                            node,
                            Severity::Error,
                            "EMBEDDED_FILE_RELATIONSHIP_MISSING",
                            "File specification lacks /AFRelationship".to_string(),
                        )
                        .with_suggestion("Declare the relationship, e.g. /AFRelationship /Source"),
                    )
                }
                _ => {}
            }
        }
        Ok(CheckOutcome::from_issues(issues))
    }
}

/// The catalog references an XMP metadata stream
pub struct XmpMetadataCheck;

impl Check for XmpMetadataCheck {
    fn id(&self) -> &str {
        "xmp_metadata"
    }

    fn description(&self) -> &str {
        "Catalog carries an XMP metadata stream"
    }

    fn run(&self, document: &Document) -> CheckResult {
        let root = document.root();
        let mut issues = Vec::new();
        match document.referenced(root, "Metadata") {
            None => issues.push(
                issue_for(
                    root,
                    Severity::Error,
                    "XMP_METADATA_MISSING",
                    "Catalog has no /Metadata stream".to_string(),
                )
                .with_suggestion("Add an XMP packet declaring the conformance level"),
            ),
            Some(metadata) if metadata.property_name("Subtype") != Some("XML") => {
                issues.push(issue_for(
                    metadata,
                    Severity::Warning,
                    "XMP_METADATA_SUBTYPE",
                    "Metadata stream is not /Subtype /XML".to_string(),
                ))
            }
            Some(_) => {}
        }
        Ok(CheckOutcome::from_issues(issues))
    }
}

/// An output intent with the expected `/S` subtype exists
pub struct OutputIntentCheck {
    pub subtype: &'static str,
}

impl Check for OutputIntentCheck {
    fn id(&self) -> &str {
        "output_intents"
    }

    fn description(&self) -> &str {
        "Output intent is declared"
    }

    fn run(&self, document: &Document) -> CheckResult {
        let root = document.root();
        let needle = format!("/{}", self.subtype);
        let found = root.property("OutputIntents").is_some_and(|rendered| {
            rendered.contains(&needle)
                || root
                    .property_references("OutputIntents")
                    .into_iter()
                    .filter_map(|id| document.node_for_object(id))
                    .any(|intent| intent.property_name("S") == Some(self.subtype))
        });
        let issues = if found {
            Vec::new()
        } else {
            vec![issue_for(
                root,
                Severity::Error,
                "OUTPUT_INTENT_MISSING",
                format!("No output intent with /S /{} found", self.subtype),
            )]
        };
        Ok(CheckOutcome::from_issues(issues))
    }
}

/// No transparency groups, soft masks or constant alpha below one
pub struct TransparencyCheck;

impl Check for TransparencyCheck {
    fn id(&self) -> &str {
        "no_transparency"
    }

    fn description(&self) -> &str {
        "Document does not use transparency"
    }

    fn run(&self, document: &Document) -> CheckResult {
        let mut issues = Vec::new();
        for node in document.all_nodes() {
            let soft_mask = node.property("SMask").is_some_and(|m| m != "/None");
            let group = node
                .property("Group")
                .is_some_and(|g| g.contains("/Transparency"))
                || (node.property_name("Type") == Some("Group")
                    && node.property_name("S") == Some("Transparency"));
            let alpha = ["CA", "ca"].iter().any(|k| {
                node.property(k)
                    .and_then(|v| v.parse::<f64>().ok())
                    .is_some_and(|a| a < 1.0)
            });
            let inline = node
                .property("Resources")
                .is_some_and(|r| r.contains("/SMask") && !r.contains("/SMask /None"));
            if soft_mask || group || alpha || inline {
                issues.push(issue_for(
                    node,
                    Severity::Error,
                    "TRANSPARENCY_FORBIDDEN",
                    format!("{} node uses transparency", node.node_type),
                ));
            }
        }
        Ok(CheckOutcome::from_issues(issues))
    }
}

/// Annotations are printable and visible
pub struct AnnotationCheck {
    pub require_appearance: bool,
}

impl AnnotationCheck {
    const INVISIBLE: i64 = 1;
    const HIDDEN: i64 = 1 << 1;
    const PRINT: i64 = 1 << 2;
    const NO_VIEW: i64 = 1 << 5;
}

impl Check for AnnotationCheck {
    fn id(&self) -> &str {
        "annotations"
    }

    fn description(&self) -> &str {
        "Annotations are printable and have appearances"
    }

    fn run(&self, document: &Document) -> CheckResult {
        let mut issues = Vec::new();
        for annot in document.nodes_by_type(NodeType::Annotation) {
            let subtype = annot.property_name("Subtype").unwrap_or("");
            if subtype == "Popup" {
                continue;
            }
            let flags = annot.property("F").and_then(|f| f.parse::<i64>().ok()).unwrap_or(0);
            if flags & Self::PRINT == 0 || flags & (Self::INVISIBLE | Self::HIDDEN | Self::NO_VIEW) != 0 {
                issues.push(
                    issue_for(
                        annot,
                        Severity::Error,
                        "ANNOTATION_NOT_PRINTABLE",
                        format!("{subtype} annotation has flags {flags}"),
                    )
                    .with_suggestion("Set the Print flag and clear Hidden, Invisible and NoView"),
                );
            }
            if self.require_appearance && subtype != "Link" && !annot.has_property("AP") {
                issues.push(issue_for(
                    annot,
                    Severity::Error,
                    "ANNOTATION_APPEARANCE_MISSING",
                    format!("{subtype} annotation has no appearance stream"),
                ));
            }
        }
        Ok(CheckOutcome::from_issues(issues))
    }
}

/// Tagged structure, language and title for accessibility
pub struct StructureTreeCheck;

impl Check for StructureTreeCheck {
    fn id(&self) -> &str {
        "structure_tree"
    }

    fn description(&self) -> &str {
        "Document is tagged and declares its language and title"
    }

    fn run(&self, document: &Document) -> CheckResult {
        let root = document.root();
        let mut issues = Vec::new();
        if !root.has_property("StructTreeRoot") {
            issues.push(issue_for(
                root,
                Severity::Error,
                "STRUCT_TREE_MISSING",
                "Catalog has no /StructTreeRoot".to_string(),
            ));
        }
        let marked = root
            .property("MarkInfo")
            .is_some_and(|m| m.contains("/Marked true"))
            || document
                .referenced(root, "MarkInfo")
                .is_some_and(|m| is_true(m, "Marked"));
        if !marked {
            issues.push(issue_for(
                root,
                Severity::Error,
                "MARKED_CONTENT_MISSING",
                "Catalog /MarkInfo does not declare /Marked true".to_string(),
            ));
        }
        if !root.has_property("Lang") {
            issues.push(
                issue_for(
                    root,
                    Severity::Error,
                    "LANGUAGE_MISSING",
                    "Catalog declares no natural language".to_string(),
                )
                .with_suggestion("Add /Lang, e.g. (en-US)"),
            );
        }
        let titled = document
            .nodes_by_type(NodeType::Metadata)
            .iter()
            .any(|m| m.property_text("Title").is_some_and(|t| !t.trim().is_empty()));
        if !titled {
            issues.push(ValidationIssue::warning("TITLE_MISSING", "Document information has no title"));
        }
        let shows_title = root
            .property("ViewerPreferences")
            .is_some_and(|v| v.contains("/DisplayDocTitle true"))
            || document
                .referenced(root, "ViewerPreferences")
                .is_some_and(|v| is_true(v, "DisplayDocTitle"));
        if !shows_title {
            issues.push(issue_for(
                root,
                Severity::Warning,
                "DISPLAY_DOC_TITLE_MISSING",
                "/ViewerPreferences does not set /DisplayDocTitle true".to_string(),
            ));
        }
        Ok(CheckOutcome::from_issues(issues))
    }
}

/// Actions that leave the document or change it
pub struct ExternalActionsCheck {
    pub severity: Severity,
    /// Also reject additional-actions dictionaries
    pub forbid_additional_actions: bool,
}

impl ExternalActionsCheck {
    const EXTERNAL: [&'static str; 6] = ["Launch", "ImportData", "SubmitForm", "ResetForm", "GoToR", "GoToE"];
    const ALLOWED_NAMED: [&'static str; 4] = ["NextPage", "PrevPage", "FirstPage", "LastPage"];
}

impl Check for ExternalActionsCheck {
    fn id(&self) -> &str {
        "external_actions"
    }

    fn description(&self) -> &str {
        "No actions that launch applications or exchange data"
    }

    fn run(&self, document: &Document) -> CheckResult {
        let mut issues = Vec::new();
        for action in document.nodes_by_type(NodeType::Action) {
            let kind = action.property_name("S").unwrap_or("");
            let named = action.property_name("N").unwrap_or("");
            if Self::EXTERNAL.contains(&kind) || (kind == "Named" && !Self::ALLOWED_NAMED.contains(&named)) {
                issues.push(issue_for(
                    action,
                    self.severity,
                    "ACTION_FORBIDDEN",
                    format!("{kind} action is not permitted"),
                ));
            }
        }
        if self.forbid_additional_actions {
            for node in document.all_nodes() {
                if node.has_property("AA") && node.node_type != NodeType::Form {
                    issues.push(issue_for(
                        node,
                        self.severity,
                        "ADDITIONAL_ACTIONS_FORBIDDEN",
                        format!("{} node defines /AA additional actions", node.node_type),
                    ));
                }
            }
        }
        Ok(CheckOutcome::from_issues(issues))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse_document;
    use crate::parser::test_helpers::{signed_form, PdfFixture};

    fn codes(check: &dyn Check, pdf: &[u8]) -> Vec<String> {
        let doc = parse_document(pdf).unwrap();
        check
            .run(&doc)
            .unwrap()
            .issues
            .into_iter()
            .map(|i| i.code)
            .collect()
    }

    #[test]
    fn test_catalog_check() {
        let good = PdfFixture::single_page().build();
        assert!(codes(&CatalogCheck, &good).is_empty());

        let bad = PdfFixture::minimal()
            .object(1, "<< /Type /Catalog /Pages 3 0 R >>")
            .object(3, "<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica >>")
            .build();
        assert_eq!(codes(&CatalogCheck, &bad), ["PAGE_TREE_INVALID"]);
    }

    #[test]
    fn test_page_tree_check() {
        assert!(codes(&PageTreeCheck, &PdfFixture::single_page().build()).is_empty());
        let wrong_count = PdfFixture::single_page()
            .object(2, "<< /Type /Pages /Kids [3 0 R] /Count 4 >>")
            .build();
        assert_eq!(codes(&PageTreeCheck, &wrong_count), ["PAGE_COUNT_MISMATCH"]);
    }

    #[test]
    fn test_inherited_media_box() {
        let pdf = PdfFixture::single_page()
            .object(2, "<< /Type /Pages /Kids [3 0 R] /Count 1 /MediaBox [0 0 10 10] >>")
            .object(3, "<< /Type /Page /Parent 2 0 R /Contents 4 0 R >>")
            .build();
        assert!(codes(&PageTreeCheck, &pdf).is_empty());
    }

    #[test]
    fn test_font_embedding() {
        let plain = PdfFixture::single_page().build();
        assert_eq!(codes(&FontEmbeddingCheck, &plain), ["FONT_NOT_EMBEDDED"]);

        let embedded = PdfFixture::single_page()
            .object(
                5,
                "<< /Type /Font /Subtype /TrueType /BaseFont /Arial /FontDescriptor 6 0 R >>",
            )
            .object(6, "<< /Type /FontDescriptor /FontName /Arial /FontFile2 7 0 R >>")
            .stream_object(7, "", b"fontdata")
            .build();
        assert!(codes(&FontEmbeddingCheck, &embedded).is_empty());
    }

    #[test]
    fn test_forbidden_javascript() {
        let pdf = PdfFixture::minimal()
            .object(
                1,
                "<< /Type /Catalog /Pages 2 0 R /OpenAction << /S /JavaScript /JS (x) >> >>",
            )
            .build();
        let check = ForbiddenNodesCheck::javascript(Severity::Error);
        assert_eq!(codes(&check, &pdf), ["JAVASCRIPT_PRESENT"]);
    }

    #[test]
    fn test_version_range() {
        let check = VersionCheck {
            min: PdfVersion::new(1, 0),
            max: PdfVersion::new(1, 4),
        };
        let old = PdfFixture::minimal().with_version("1.4").build();
        assert!(codes(&check, &old).is_empty());
        let new = PdfFixture::minimal().with_version("1.7").build();
        assert_eq!(codes(&check, &new), ["VERSION_NOT_ALLOWED"]);
    }

    #[test]
    fn test_annotation_flags() {
        let pdf = PdfFixture::single_page()
            .object(
                3,
                "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 1 1] /Annots [6 0 R 7 0 R] >>",
            )
            .object(6, "<< /Type /Annot /Subtype /Text /Rect [0 0 1 1] /F 4 /AP << >> >>")
            .object(7, "<< /Type /Annot /Subtype /Text /Rect [0 0 1 1] /F 2 /AP << >> >>")
            .build();
        let check = AnnotationCheck { require_appearance: true };
        assert_eq!(codes(&check, &pdf), ["ANNOTATION_NOT_PRINTABLE"]);
    }

    #[test]
    fn test_external_actions() {
        let pdf = PdfFixture::minimal()
            .object(
                1,
                "<< /Type /Catalog /Pages 2 0 R /OpenAction << /S /Launch /F (calc.exe) >> >>",
            )
            .build();
        let check = ExternalActionsCheck {
            severity: Severity::Error,
            forbid_additional_actions: true,
        };
        assert_eq!(codes(&check, &pdf), ["ACTION_FORBIDDEN"]);
    }

    #[test]
    fn test_structure_tree_requirements() {
        let untagged = PdfFixture::minimal().build();
        let found = codes(&StructureTreeCheck, &untagged);
        assert!(found.contains(&"STRUCT_TREE_MISSING".to_string()));
        assert!(found.contains(&"LANGUAGE_MISSING".to_string()));

        let tagged = PdfFixture::minimal()
            .object(
                1,
                "<< /Type /Catalog /Pages 2 0 R /StructTreeRoot 3 0 R /MarkInfo << /Marked true >> \
                 /Lang (en) /ViewerPreferences << /DisplayDocTitle true >> >>",
            )
            .object(3, "<< /Type /StructTreeRoot >>")
            .object(4, "<< /Title (Tagged) >>")
            .trailer_entry("Info", "4 0 R")
            .build();
        assert!(codes(&StructureTreeCheck, &tagged).is_empty());
    }

    #[test]
    fn test_signatures() {
        assert!(codes(&SignatureCheck, &signed_form(false)).is_empty());
        assert_eq!(codes(&SignatureCheck, &signed_form(true)), ["SIGNATURE_PARTIAL_COVERAGE"]);

        let bare = PdfFixture::minimal()
            .object(
                1,
                "<< /Type /Catalog /Pages 2 0 R /AcroForm << /Fields [3 0 R] >> >>",
            )
            .object(3, "<< /FT /Sig /T (s1) /V 4 0 R >>")
            .object(4, "<< /Type /Sig /ByteRange [0 10 5 5] >>")
            .build();
        assert_eq!(
            codes(&SignatureCheck, &bare),
            [
                "SIGNATURE_CONTENTS_MISSING",
                "SIGNATURE_FILTER_MISSING",
                "SIGNATURE_BYTE_RANGE_INVALID"
            ]
        );
    }
}
