//! Schema definitions and the global schema registry

use super::checks::*;
use super::Check;
use crate::diagnostics::Severity;
use crate::error::{PdfAstError, Result};
use crate::parser::PdfVersion;
use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

/// A named, versioned, ordered set of checks
pub struct Schema {
    name: String,
    version: String,
    description: String,
    checks: Vec<Box<dyn Check>>,
}

impl Schema {
    pub fn new(name: impl Into<String>, version: impl Into<String>, checks: Vec<Box<dyn Check>>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            description: String::new(),
            checks,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn checks(&self) -> &[Box<dyn Check>] {
        &self.checks
    }

    pub fn check_ids(&self) -> Vec<&str> {
        self.checks.iter().map(|c| c.id()).collect()
    }
}

impl std::fmt::Debug for Schema {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Schema")
            .field("name", &self.name)
            .field("version", &self.version)
            .field("checks", &self.check_ids())
            .finish()
    }
}

/// Name to schema lookup
pub struct SchemaRegistry {
    schemas: RwLock<BTreeMap<String, Arc<Schema>>>,
}

lazy_static::lazy_static! {
    static ref GLOBAL_REGISTRY: SchemaRegistry = SchemaRegistry::with_builtins();
}

impl SchemaRegistry {
    /// An empty registry
    pub fn new() -> Self {
        Self {
            schemas: RwLock::new(BTreeMap::new()),
        }
    }

    /// A registry holding the built-in schemas
    pub fn with_builtins() -> Self {
        let registry = Self::new();
        for schema in builtin_schemas() {
            // Built-in names are distinct
            let _ = registry.register(schema);
        }
        registry
    }

    /// The process-wide registry used by `Document::validate`
    pub fn global() -> &'static SchemaRegistry {
        &GLOBAL_REGISTRY
    }

    pub fn register(&self, schema: Schema) -> Result<()> {
        let mut schemas = self
            .schemas
            .write()
            .map_err(|_| PdfAstError::InvalidConfiguration("schema registry poisoned".to_string()))?;
        if schemas.contains_key(schema.name()) {
            return Err(PdfAstError::DuplicateSchema(schema.name().to_string()));
        }
        tracing::debug!(schema = schema.name(), checks = schema.checks().len(), "registered schema");
        schemas.insert(schema.name().to_string(), Arc::new(schema));
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<Arc<Schema>> {
        self.schemas.read().ok()?.get(name).cloned()
    }

    /// Registered schema names, sorted
    pub fn names(&self) -> Vec<String> {
        self.schemas
            .read()
            .map(|s| s.keys().cloned().collect())
            .unwrap_or_default()
    }
}

impl Default for SchemaRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Names of all schemas in the global registry
pub fn available_schemas() -> Vec<String> {
    SchemaRegistry::global().names()
}

/// Add a custom schema to the global registry
pub fn register_schema(schema: Schema) -> Result<()> {
    SchemaRegistry::global().register(schema)
}

fn base_checks(xref_severity: Severity, action_severity: Severity) -> Vec<Box<dyn Check>> {
    vec![
        Box::new(DocumentStructureCheck),
        Box::new(CatalogCheck),
        Box::new(PageTreeCheck),
        Box::new(XRefIntegrityCheck {
            severity: xref_severity,
        }),
        Box::new(ParseDiagnosticsCheck),
        Box::new(SignatureCheck),
        Box::new(ExternalActionsCheck {
            severity: action_severity,
            forbid_additional_actions: action_severity.is_failure(),
        }),
    ]
}

fn version_range(min: (u8, u8), max: (u8, u8)) -> Box<dyn Check> {
    Box::new(VersionCheck {
        min: PdfVersion::new(min.0, min.1),
        max: PdfVersion::new(max.0, max.1),
    })
}

fn pdfa(part: u8, max_version: (u8, u8), files: EmbeddedFilePolicy, transparency: bool) -> Schema {
    let mut checks = base_checks(Severity::Error, Severity::Error);
    checks.extend([
        version_range((1, 0), max_version),
        Box::new(FontEmbeddingCheck) as Box<dyn Check>,
        Box::new(ForbiddenNodesCheck::javascript(Severity::Error)),
        Box::new(ForbiddenNodesCheck::multimedia(Severity::Error)),
        Box::new(EncryptionCheck),
        Box::new(EmbeddedFilesCheck { policy: files }),
        Box::new(XmpMetadataCheck),
        Box::new(OutputIntentCheck { subtype: "GTS_PDFA1" }),
        Box::new(AnnotationCheck {
            require_appearance: part > 1,
        }),
    ]);
    if !transparency {
        checks.push(Box::new(TransparencyCheck));
    }
    Schema::new(format!("PDF/A-{part}b"), format!("ISO 19005-{part}"), checks)
        .with_description(format!("PDF/A-{part} level B (visual appearance) archival conformance"))
}

/// The schemas every registry starts with
pub fn builtin_schemas() -> Vec<Schema> {
    let mut base = base_checks(Severity::Warning, Severity::Warning);
    base.push(version_range((1, 0), (2, 0)));
    let pdf20 = Schema::new("PDF-2.0", "ISO 32000-2:2020", base)
        .with_description("Structural soundness of any PDF up to 2.0");

    let mut ua = base_checks(Severity::Warning, Severity::Warning);
    ua.extend([
        Box::new(StructureTreeCheck) as Box<dyn Check>,
        Box::new(FontEmbeddingCheck),
        Box::new(XmpMetadataCheck),
    ]);
    let ua = Schema::new("PDF/UA-1", "ISO 14289-1", ua).with_description("Universal accessibility");

    let mut x4 = base_checks(Severity::Error, Severity::Error);
    x4.extend([
        version_range((1, 3), (1, 6)),
        Box::new(FontEmbeddingCheck) as Box<dyn Check>,
        Box::new(EncryptionCheck),
        Box::new(ForbiddenNodesCheck::javascript(Severity::Error)),
        Box::new(ForbiddenNodesCheck::multimedia(Severity::Error)),
        Box::new(XmpMetadataCheck),
        Box::new(OutputIntentCheck { subtype: "GTS_PDFX" }),
    ]);
    let x4 = Schema::new("PDF/X-4", "ISO 15930-7", x4).with_description("Print exchange with transparency");

    vec![
        pdf20,
        pdfa(1, (1, 4), EmbeddedFilePolicy::Forbidden, false),
        pdfa(2, (1, 7), EmbeddedFilePolicy::Discouraged, true),
        pdfa(3, (1, 7), EmbeddedFilePolicy::RequireRelationship, true),
        ua,
        x4,
    ]
}
