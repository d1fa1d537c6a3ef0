//! High-level PDF Reader API
//!
//! Ties header detection, cross-reference loading (with recovery), the
//! security handler and the resolver together. The result is a read-only
//! view over the source buffer that the AST builder walks.

use super::header::{PdfHeader, PdfVersion};
use super::linearization::{self, LinearizationInfo};
use super::objects::{ObjectId, PdfDictionary, PdfObject};
use super::resolver::Resolver;
use super::xref::XRefTable;
use super::{ParseError, ParseOptions, ParseResult};
use crate::diagnostics::ValidationIssue;
use crate::encryption::{CryptMethod, EncryptionError, PasswordKind, Permissions, SecurityHandler};
use crate::recovery::load_index;

/// Outcome of inspecting the trailer's `/Encrypt` entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EncryptionState {
    Unencrypted,
    /// Strings and streams are decrypted transparently
    Unlocked {
        revision: i64,
        method: CryptMethod,
        permissions: Permissions,
        opened_with: PasswordKind,
    },
    /// Content is read as raw ciphertext
    Locked { reason: String },
}

impl EncryptionState {
    pub fn is_encrypted(&self) -> bool {
        !matches!(self, EncryptionState::Unencrypted)
    }
}

/// High-level PDF reader over an in-memory buffer
pub struct PdfReader<'a> {
    header: Option<PdfHeader>,
    version: PdfVersion,
    resolver: Resolver<'a>,
    encryption: EncryptionState,
    encrypt_ref: Option<ObjectId>,
    linearization: Option<LinearizationInfo>,
    diagnostics: Vec<ValidationIssue>,
}

impl<'a> PdfReader<'a> {
    /// Open `data` with tolerant defaults
    pub fn new(data: &'a [u8]) -> ParseResult<Self> {
        Self::with_options(data, &ParseOptions::default())
    }

    /// Open `data`; fails only when no object graph can be established
    #[tracing::instrument(level = "debug", skip_all, fields(len = data.len(), tolerant = options.tolerant))]
    pub fn with_options(data: &'a [u8], options: &ParseOptions) -> ParseResult<Self> {
        if data.iter().all(|b| b.is_ascii_whitespace()) {
            return Err(ParseError::EmptyFile);
        }

        let mut diagnostics = Vec::new();
        let header = PdfHeader::find(data);
        match &header {
            Some(h) if h.offset > 0 => diagnostics.push(
                ValidationIssue::info(
                    "HEADER_OFFSET",
                    format!("{} bytes precede the %PDF- header", h.offset),
                )
                .at_offset(0),
            ),
            Some(_) => {}
            None if !options.tolerant => return Err(ParseError::InvalidHeader),
            None => diagnostics.push(
                ValidationIssue::warning(
                    "HEADER_MISSING",
                    format!("No %PDF- header found, assuming version {}", PdfVersion::FALLBACK),
                )
                .at_offset(0),
            ),
        }

        let linearization = linearization::detect(data);
        if let Some(info) = &linearization {
            let problems = info.problems(data.len());
            tracing::debug!(pages = info.page_count, intact = problems.is_empty(), "linearized file");
            if !problems.is_empty() {
                diagnostics.push(
                    ValidationIssue::info(
                        "LINEARIZATION_INVALID",
                        format!("Linearization parameters no longer hold: {}", problems.join("; ")),
                    )
                    .with_location(format!("object {}", info.object_id)),
                );
            }
        }

        let index = match load_index(data, options) {
            Ok(index) => index,
            Err(ParseError::NoObjects) if header.is_none() => return Err(ParseError::InvalidHeader),
            Err(e) => return Err(e),
        };
        diagnostics.extend(index.diagnostics);

        let mut resolver = Resolver::new(data, index.table, options);
        let (encryption, encrypt_ref) = match unlock(&resolver, options) {
            Ok(None) => (EncryptionState::Unencrypted, None),
            Ok(Some((handler, encrypt_ref))) => {
                let info = handler.info();
                let state = EncryptionState::Unlocked {
                    revision: info.revision,
                    method: info.stream_method,
                    permissions: handler.permissions(),
                    opened_with: handler.opened_with(),
                };
                resolver = resolver.with_security(handler);
                (state, encrypt_ref)
            }
            Err((error, encrypt_ref)) => {
                let code = match error {
                    EncryptionError::PasswordRequired => "ENCRYPTION_PASSWORD_REQUIRED",
                    _ => "ENCRYPTION_UNSUPPORTED",
                };
                tracing::warn!(%error, "document content stays encrypted");
                diagnostics.push(
                    ValidationIssue::warning(code, format!("Encrypted content cannot be decrypted: {error}"))
                        .with_location("trailer /Encrypt")
                        .with_suggestion("Supply the document's user password in ParseOptions"),
                );
                (EncryptionState::Locked { reason: error.to_string() }, encrypt_ref)
            }
        };

        let mut reader = Self {
            version: header.as_ref().map_or(PdfVersion::FALLBACK, |h| h.version),
            header,
            resolver,
            encryption,
            encrypt_ref,
            linearization,
            diagnostics,
        };
        reader.apply_catalog_version();

        tracing::debug!(
            version = %reader.version,
            objects = reader.xref().in_use_count(),
            rebuilt = reader.xref().is_rebuilt(),
            "opened document"
        );
        Ok(reader)
    }

    /// The catalog `/Version` wins over the header when it is newer
    fn apply_catalog_version(&mut self) {
        let Some(root) = self.root_id() else {
            return;
        };
        let Ok(catalog) = self.resolver.resolve(root) else {
            return;
        };
        let declared = catalog
            .object
            .as_dict()
            .and_then(|d| d.get_name("Version"))
            .and_then(|v| v.parse::<PdfVersion>().ok());
        if let Some(declared) = declared {
            if declared > self.version {
                tracing::debug!(header = %self.version, catalog = %declared, "catalog overrides version");
                self.version = declared;
            }
        }
    }

    pub fn header(&self) -> Option<&PdfHeader> {
        self.header.as_ref()
    }

    /// Effective version: header, or catalog `/Version` when newer
    pub fn version(&self) -> PdfVersion {
        self.version
    }

    pub fn resolver(&self) -> &Resolver<'a> {
        &self.resolver
    }

    pub fn xref(&self) -> &XRefTable {
        self.resolver.xref()
    }

    pub fn trailer(&self) -> &PdfDictionary {
        self.xref().trailer()
    }

    pub fn root_id(&self) -> Option<ObjectId> {
        self.xref().root()
    }

    pub fn encryption(&self) -> &EncryptionState {
        &self.encryption
    }

    /// Object number of an indirect `/Encrypt` dictionary
    pub fn encrypt_ref(&self) -> Option<ObjectId> {
        self.encrypt_ref
    }

    /// Linearization parameters, when the file opens with them
    pub fn linearization(&self) -> Option<&LinearizationInfo> {
        self.linearization.as_ref()
    }

    pub fn diagnostics(&self) -> &[ValidationIssue] {
        &self.diagnostics
    }

    /// Hand the diagnostics gathered so far to the caller
    pub fn take_diagnostics(&mut self) -> Vec<ValidationIssue> {
        std::mem::take(&mut self.diagnostics)
    }
}

type Unlocked = Option<(SecurityHandler, Option<ObjectId>)>;

/// Authenticate the standard security handler if the trailer asks for one
fn unlock(resolver: &Resolver<'_>, options: &ParseOptions) -> Result<Unlocked, (EncryptionError, Option<ObjectId>)> {
    let trailer = resolver.xref().trailer();
    let Some(entry) = trailer.get("Encrypt") else {
        return Ok(None);
    };
    let encrypt_ref = entry.as_reference();
    let dict = match resolver.follow(entry) {
        Some(PdfObject::Dictionary(dict)) => dict,
        _ => return Err((EncryptionError::InvalidEntry("Encrypt"), encrypt_ref)),
    };

    let file_id = trailer
        .get("ID")
        .and_then(|id| id.as_array())
        .and_then(|ids| ids.get(0))
        .and_then(|first| first.as_string())
        .map(|s| s.as_bytes().to_vec())
        .unwrap_or_default();

    SecurityHandler::authenticate(&dict, encrypt_ref, &file_id, &options.password)
        .map(|handler| Some((handler, encrypt_ref)))
        .map_err(|e| (e, encrypt_ref))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::test_helpers::PdfFixture;

    #[test]
    fn test_open_minimal() {
        let pdf = PdfFixture::minimal().with_version("1.7").build();
        let reader = PdfReader::new(&pdf).unwrap();
        assert_eq!(reader.version(), PdfVersion::new(1, 7));
        assert_eq!(reader.root_id(), Some(ObjectId::new(1, 0)));
        assert_eq!(reader.encryption(), &EncryptionState::Unencrypted);
        assert!(reader.diagnostics().is_empty());
    }

    #[test]
    fn test_empty_input() {
        assert!(matches!(PdfReader::new(b""), Err(ParseError::EmptyFile)));
        assert!(matches!(PdfReader::new(b"  \n"), Err(ParseError::EmptyFile)));
    }

    #[test]
    fn test_not_a_pdf() {
        assert!(matches!(
            PdfReader::new(b"hello, this is plain text"),
            Err(ParseError::InvalidHeader)
        ));
    }

    #[test]
    fn test_missing_header_is_tolerated() {
        let pdf = PdfFixture::minimal().without_header().build();
        let reader = PdfReader::new(&pdf).unwrap();
        assert_eq!(reader.version(), PdfVersion::FALLBACK);
        assert!(reader.diagnostics().iter().any(|d| d.code == "HEADER_MISSING"));
        assert!(matches!(
            PdfReader::with_options(&pdf, &ParseOptions::strict()),
            Err(ParseError::InvalidHeader)
        ));
    }

    #[test]
    fn test_catalog_version_overrides_older_header() {
        let pdf = PdfFixture::minimal()
            .with_version("1.4")
            .object(1, "<< /Type /Catalog /Pages 2 0 R /Version /2.0 >>")
            .build();
        let reader = PdfReader::new(&pdf).unwrap();
        assert_eq!(reader.version(), PdfVersion::new(2, 0));
    }

    #[test]
    fn test_unsupported_handler_keeps_parsing() {
        let pdf = PdfFixture::minimal()
            .object(9, "<< /Filter /Adobe.PubSec /V 4 /R 4 >>")
            .trailer_entry("Encrypt", "9 0 R")
            .build();
        let reader = PdfReader::new(&pdf).unwrap();
        assert!(matches!(reader.encryption(), EncryptionState::Locked { .. }));
        assert_eq!(reader.encrypt_ref(), Some(ObjectId::new(9, 0)));
        assert!(reader
            .diagnostics()
            .iter()
            .any(|d| d.code == "ENCRYPTION_UNSUPPORTED"));
    }
}
