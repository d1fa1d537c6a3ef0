//! # pdf-ast
//!
//! A tolerant PDF parser that turns a PDF file into a typed, navigable
//! document tree, validates it against conformance schemas and runs
//! analysis plugins over it.
//!
//! ## Features
//!
//! - **Tolerant parsing**: malformed syntax, bad stream lengths and broken
//!   cross-reference chains become diagnostics instead of hard failures
//! - **Cross-reference recovery**: tables, streams, hybrid files and
//!   incremental updates, with a full-file rebuild when the chain is damaged
//! - **Typed AST**: every node carries its semantic type, source span and
//!   rendered properties; shared objects appear once with several parents
//! - **Standard security handler**: RC4 and AES (revisions 2 to 6)
//! - **Schema validation**: PDF-2.0, PDF/A-1b/2b/3b, PDF/UA-1 and PDF/X-4
//! - **Plugins**: isolated analysis passes with per-plugin deadlines
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use pdf_ast::{parse_file, NodeType};
//!
//! # fn main() -> pdf_ast::Result<()> {
//! let document = parse_file("document.pdf")?;
//!
//! let stats = document.statistics();
//! println!("PDF {} with {} nodes", stats.version, stats.total_nodes);
//! for page in document.nodes_by_type(NodeType::Page) {
//!     println!("page object {:?}", page.object_id());
//! }
//!
//! let report = document.validate("PDF/A-1b")?;
//! for issue in &report.issues {
//!     println!("{issue}");
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! - [`parser`] - lexer, object parser, cross-reference loading, filters
//! - [`recovery`] - cross-reference chain checks and full-file rebuild
//! - [`encryption`] - standard security handler
//! - [`ast`] - document tree, node classification and queries
//! - [`validation`] - checks, schemas and the validation run
//! - [`plugins`] - analysis plugins and their manager

pub mod ast;
pub mod config;
pub mod diagnostics;
pub mod encryption;
pub mod error;
pub mod parser;
pub mod plugins;
pub mod recovery;
pub mod validation;

pub use ast::{AstNode, Document, DocumentStatistics, NodeId, NodeType};
pub use config::{EngineInfo, AUTHOR, ENGINE_INFO, VERSION};
pub use diagnostics::{Severity, ValidationIssue};
pub use error::{PdfAstError, Result};
pub use parser::{ParseError, ParseOptions, PdfReader};
pub use plugins::{AnalysisPlugin, PluginManager};
pub use validation::{available_schemas, register_schema, ValidationReport};

use std::path::Path;

/// Parse a PDF held in memory with tolerant default options
pub fn parse_document(data: &[u8]) -> Result<Document> {
    parse_document_with_options(data, &ParseOptions::default())
}

/// Parse a PDF held in memory
pub fn parse_document_with_options(data: &[u8], options: &ParseOptions) -> Result<Document> {
    let reader = PdfReader::with_options(data, options)?;
    let document = ast::builder::build_document(reader, options)?;
    Ok(document)
}

/// Read and parse a PDF file with tolerant default options
#[tracing::instrument(level = "debug", skip_all, fields(path = %path.as_ref().display()))]
pub fn parse_file<P: AsRef<Path>>(path: P) -> Result<Document> {
    let data = std::fs::read(path.as_ref())?;
    tracing::debug!(bytes = data.len(), "read input file");
    parse_document(&data)
}
