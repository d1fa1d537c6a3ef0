//! Plugins shipped with the engine

use super::{AnalysisPlugin, PluginContext, PluginError, PluginMetadata};
use crate::ast::{AstNode, Document, NodeType};
use crate::parser::reader::EncryptionState;
use chrono::{DateTime, FixedOffset, NaiveDate, TimeZone};
use std::fmt::Write;

/// Summarises node counts, depth and page structure
pub struct StructureAnalyzer {
    metadata: PluginMetadata,
}

impl StructureAnalyzer {
    pub fn new() -> Self {
        Self {
            metadata: PluginMetadata::new("structure_analyzer", crate::VERSION)
                .with_description("Node counts, tree depth and page structure")
                .with_tags(&["structure"]),
        }
    }
}

impl Default for StructureAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

impl AnalysisPlugin for StructureAnalyzer {
    fn metadata(&self) -> &PluginMetadata {
        &self.metadata
    }

    fn run(&self, document: &Document, ctx: &PluginContext) -> Result<String, PluginError> {
        let stats = document.statistics();
        let mut out = String::new();
        let _ = writeln!(out, "version: {}", stats.version);
        let _ = writeln!(out, "nodes: {}", stats.total_nodes);
        let _ = writeln!(out, "max_depth: {}", stats.max_depth);
        let _ = writeln!(out, "pages: {}", stats.count(NodeType::Page));
        for (node_type, count) in &stats.nodes_by_type {
            ctx.checkpoint()?;
            let _ = writeln!(out, "  {}: {}", node_type.name(), count);
        }
        let shared = document
            .all_nodes()
            .iter()
            .filter(|n| document.parent_ids(n.id).len() > 1)
            .count();
        let _ = writeln!(out, "shared_nodes: {shared}");
        if stats.xref_rebuilt {
            out.push_str("xref: rebuilt\n");
        }
        if let Some(info) = document.linearization() {
            let _ = writeln!(out, "linearized: {} pages, first page object {}", info.page_count, info.first_page_object);
        }
        Ok(out)
    }
}

/// Flags content with security implications
pub struct SecurityScanner {
    metadata: PluginMetadata,
}

impl SecurityScanner {
    pub fn new() -> Self {
        Self {
            metadata: PluginMetadata::new("security_scanner", crate::VERSION)
                .with_description("JavaScript, launch actions, embedded files, signatures and encryption")
                .with_tags(&["security"]),
        }
    }

    fn findings(document: &Document) -> Vec<String> {
        let mut findings = Vec::new();
        match document.encryption() {
            EncryptionState::Unencrypted => {}
            EncryptionState::Unlocked { revision, method, .. } => {
                findings.push(format!("encrypted: revision {revision}, {method:?}"));
            }
            EncryptionState::Locked { reason } => findings.push(format!("encrypted and locked: {reason}")),
        }
        let js = document.nodes_by_type(NodeType::JavaScript).len();
        if js > 0 {
            findings.push(format!("javascript: {js}"));
        }
        let launches: Vec<&AstNode> = document
            .nodes_by_type(NodeType::Action)
            .into_iter()
            .filter(|n| n.property_name("S") == Some("Launch"))
            .collect();
        if !launches.is_empty() {
            findings.push(format!("launch actions: {}", launches.len()));
        }
        let files = document.nodes_by_type(NodeType::EmbeddedFile).len();
        if files > 0 {
            findings.push(format!("embedded files: {files}"));
        }
        let signatures = document.nodes_by_type(NodeType::Signature);
        if !signatures.is_empty() {
            let partial = signatures
                .iter()
                .filter(|s| s.property("coversWholeFile") != Some("true"))
                .count();
            findings.push(format!("signatures: {}, {partial} not covering the whole file", signatures.len()));
        }
        findings
    }
}

impl Default for SecurityScanner {
    fn default() -> Self {
        Self::new()
    }
}

impl AnalysisPlugin for SecurityScanner {
    fn metadata(&self) -> &PluginMetadata {
        &self.metadata
    }

    fn run(&self, document: &Document, _ctx: &PluginContext) -> Result<String, PluginError> {
        let findings = Self::findings(document);
        if findings.is_empty() {
            return Ok("no findings\n".to_string());
        }
        Ok(findings.into_iter().map(|f| f + "\n").collect())
    }
}

/// Reports the document information dictionary
pub struct MetadataExtractor {
    metadata: PluginMetadata,
}

const INFO_KEYS: [&str; 8] = [
    "Title",
    "Author",
    "Subject",
    "Keywords",
    "Creator",
    "Producer",
    "CreationDate",
    "ModDate",
];

impl MetadataExtractor {
    pub fn new() -> Self {
        Self {
            metadata: PluginMetadata::new("metadata_extractor", crate::VERSION)
                .with_description("Document information dictionary entries")
                .with_tags(&["metadata"]),
        }
    }
}

impl Default for MetadataExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl AnalysisPlugin for MetadataExtractor {
    fn metadata(&self) -> &PluginMetadata {
        &self.metadata
    }

    fn run(&self, document: &Document, _ctx: &PluginContext) -> Result<String, PluginError> {
        let info = document
            .nodes_by_type(NodeType::Metadata)
            .into_iter()
            .find(|n| INFO_KEYS.iter().any(|k| n.has_property(k)));
        let Some(info) = info else {
            return Ok("no document information\n".to_string());
        };

        let mut out = String::new();
        for key in INFO_KEYS {
            let Some(text) = info.property_text(key) else {
                continue;
            };
            let value = if key.ends_with("Date") {
                parse_pdf_date(&text).map_or(text, |d| d.to_rfc3339())
            } else {
                text
            };
            let _ = writeln!(out, "{key}: {value}");
        }
        Ok(out)
    }
}

/// Parse a PDF date string `D:YYYYMMDDHHmmSSOHH'mm'`
///
/// Every field after the year is optional. A missing offset means UTC.
pub fn parse_pdf_date(text: &str) -> Option<DateTime<FixedOffset>> {
    let s = text.trim();
    let s = s.strip_prefix("D:").unwrap_or(s);
    let digits_end = s.find(|c: char| !c.is_ascii_digit()).unwrap_or(s.len());
    let (digits, zone) = s.split_at(digits_end);
    if digits.len() < 4 || digits.len() % 2 != 0 {
        return None;
    }

    let field = |start: usize, default: u32| -> Option<u32> {
        match digits.get(start..start + 2) {
            Some(d) => d.parse().ok(),
            None => Some(default),
        }
    };
    let year: i32 = digits[..4].parse().ok()?;
    let date = NaiveDate::from_ymd_opt(year, field(4, 1)?, field(6, 1)?)?;
    let time = date.and_hms_opt(field(8, 0)?, field(10, 0)?, field(12, 0)?)?;

    let offset = parse_offset(zone)?;
    offset.from_local_datetime(&time).single()
}

fn parse_offset(zone: &str) -> Option<FixedOffset> {
    let mut chars = zone.chars();
    let sign = match chars.next() {
        None | Some('Z') => return FixedOffset::east_opt(0),
        Some('+') => 1,
        Some('-') => -1,
        Some(_) => return None,
    };
    let rest: String = chars.filter(|c| c.is_ascii_digit()).collect();
    let hours: i32 = rest.get(..2)?.parse().ok()?;
    let minutes: i32 = rest.get(2..4).map_or(Some(0), |m| m.parse().ok())?;
    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse_document;
    use crate::parser::test_helpers::{linearized_single_page, signed_form, PdfFixture};
    use crate::plugins::PluginManager;
    use chrono::{Datelike, Timelike};

    #[test]
    fn test_parse_pdf_date() {
        let date = parse_pdf_date("D:20230415103000+02'00'").unwrap();
        assert_eq!((date.year(), date.month(), date.day()), (2023, 4, 15));
        assert_eq!((date.hour(), date.minute()), (10, 30));
        assert_eq!(date.offset().local_minus_utc(), 7200);

        let date = parse_pdf_date("D:1999").unwrap();
        assert_eq!((date.year(), date.month(), date.day()), (1999, 1, 1));
        assert_eq!(date.offset().local_minus_utc(), 0);

        assert!(parse_pdf_date("yesterday").is_none());
        assert!(parse_pdf_date("D:20231345").is_none());
    }

    #[test]
    fn test_metadata_extractor() {
        let pdf = PdfFixture::minimal()
            .object(3, "<< /Title (Annual Report) /CreationDate (D:20200101120000Z) >>")
            .trailer_entry("Info", "3 0 R")
            .build();
        let doc = parse_document(&pdf).unwrap();
        let out = MetadataExtractor::new()
            .run(&doc, &PluginContext::new(std::time::Duration::from_secs(1)))
            .unwrap();
        assert!(out.contains("Title: Annual Report"));
        assert!(out.contains("CreationDate: 2020-01-01T12:00:00+00:00"));
    }

    #[test]
    fn test_security_scanner_flags_javascript() {
        let pdf = PdfFixture::empty()
            .object(
                1,
                "<< /Type /Catalog /Pages 2 0 R /OpenAction << /S /JavaScript /JS (app.alert(1)) >> >>",
            )
            .object(2, "<< /Type /Pages /Kids [] /Count 0 >>")
            .build();
        let doc = parse_document(&pdf).unwrap();
        let out = SecurityScanner::new()
            .run(&doc, &PluginContext::new(std::time::Duration::from_secs(1)))
            .unwrap();
        assert!(out.contains("javascript: 1"), "{out}");
    }

    #[test]
    fn test_builtins_run_clean() {
        let doc = parse_document(&PdfFixture::single_page().build()).unwrap();
        let manager = PluginManager::with_builtins();
        let names: Vec<String> = manager.list_plugins().into_iter().map(|m| m.name).collect();
        assert_eq!(names, ["structure_analyzer", "security_scanner", "metadata_extractor"]);

        let result = manager.execute_plugins(&doc);
        assert_eq!(result.successful_plugins, 3);
        assert!(result.results["structure_analyzer"].contains("pages: 1"));
        assert_eq!(result.results["security_scanner"], "no findings\n");
        assert_eq!(result.results["metadata_extractor"], "no document information\n");
    }

    #[test]
    fn test_security_scanner_reports_signature_coverage() {
        let ctx = PluginContext::new(std::time::Duration::from_secs(1));
        let intact = parse_document(&signed_form(false)).unwrap();
        let out = SecurityScanner::new().run(&intact, &ctx).unwrap();
        assert_eq!(out, "signatures: 1, 0 not covering the whole file\n");

        let updated = parse_document(&signed_form(true)).unwrap();
        let out = SecurityScanner::new().run(&updated, &ctx).unwrap();
        assert_eq!(out, "signatures: 1, 1 not covering the whole file\n");
    }

    #[test]
    fn test_structure_analyzer_reports_linearization() {
        let doc = parse_document(&linearized_single_page(true)).unwrap();
        let out = StructureAnalyzer::new()
            .run(&doc, &PluginContext::new(std::time::Duration::from_secs(1)))
            .unwrap();
        assert!(out.contains("linearized: 1 pages, first page object 3"), "{out}");
    }
}
