//! Cross-reference recovery
//!
//! Obtaining the object index is an explicit decision ladder:
//!
//! 1. **Authoritative**: walk the declared `startxref` / `/Prev` chain
//!    ([`crate::parser::xref::walk_chain`]).
//! 2. **Detect inconsistency**: a broken chain, or a complete chain whose
//!    `/Root` does not point at an object header ([`check_consistency`]).
//! 3. **Reconstruct**: scan the file for object headers and rebuild the
//!    index ([`scanner::rebuild_index`]), recording an `XREF_REBUILT`
//!    diagnostic.
//!
//! Each rung is a plain function so the fallback paths can be exercised on
//! their own.

pub mod scanner;

pub use scanner::{rebuild_index, scan_objects, ScanResult, ScannedObject, TrailerSource};

use crate::diagnostics::ValidationIssue;
use crate::parser::lexer::{Lexer, Token};
use crate::parser::xref::{walk_chain, ChainDefect, ChainOutcome, XRefEntry, XRefTable};
use crate::parser::{ParseError, ParseOptions, ParseResult};

/// The object index a document is built from
#[derive(Debug, Clone)]
pub struct RecoveredIndex {
    pub table: XRefTable,
    /// Why the declared chain was rejected, when it was
    pub defect: Option<ChainDefect>,
    pub diagnostics: Vec<ValidationIssue>,
}

/// Obtain the cross-reference index, rebuilding it when the chain is unusable
#[tracing::instrument(level = "debug", skip_all, fields(len = data.len()))]
pub fn load_index(data: &[u8], options: &ParseOptions) -> ParseResult<RecoveredIndex> {
    let (partial, defect) = match walk_chain(data, options.tolerant) {
        ChainOutcome::Complete(table) => match check_consistency(data, &table) {
            Ok(()) => {
                return Ok(RecoveredIndex {
                    table,
                    defect: None,
                    diagnostics: Vec::new(),
                })
            }
            Err(defect) => (table, defect),
        },
        ChainOutcome::Broken { partial, defect } => (partial, defect),
    };

    if !options.tolerant {
        return Err(ParseError::InvalidXRef {
            offset: partial.sections().first().copied().unwrap_or(0),
            message: defect.to_string(),
        });
    }

    tracing::warn!(%defect, "cross-reference chain unusable, rebuilding index");
    let (table, scan, mut diagnostics) = rebuild_index(data, partial.trailer());
    if scan.headers_found == 0 {
        return Err(ParseError::NoObjects);
    }

    diagnostics.insert(
        0,
        ValidationIssue::warning(
            "XREF_REBUILT",
            format!(
                "Cross-reference index rebuilt from {} object headers: {defect}",
                scan.headers_found
            ),
        )
        .with_suggestion("Re-save the file with a conforming writer to restore its cross-reference table"),
    );
    Ok(RecoveredIndex {
        table,
        defect: Some(defect),
        diagnostics,
    })
}

/// Check that the catalog named by the trailer is where the index says
pub fn check_consistency(data: &[u8], table: &XRefTable) -> Result<(), ChainDefect> {
    let root = table.root().ok_or(ChainDefect::MissingRoot)?;
    match table.get(root.number) {
        Some(XRefEntry::InUse { offset, .. }) => {
            let mut lexer = Lexer::at(data, *offset);
            match lexer.next_token() {
                Ok(Token::Integer(n)) if n == i64::from(root.number) => Ok(()),
                _ => Err(ChainDefect::DanglingRoot { root }),
            }
        }
        Some(XRefEntry::Compressed { .. }) => Ok(()),
        _ => Err(ChainDefect::DanglingRoot { root }),
    }
}
