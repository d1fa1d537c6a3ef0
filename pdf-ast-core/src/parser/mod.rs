//! PDF Parser Module
//!
//! Turns a raw byte buffer into a cross-referenced graph of typed PDF objects
//! according to ISO 32000-2. The parser is tolerant by default: malformed
//! tokens, bad stream lengths and broken cross-reference chains are recorded
//! as diagnostics and recovered from instead of aborting the parse.

pub mod filters;
pub mod header;
pub mod lexer;
pub mod linearization;
pub mod object_parser;
pub mod object_stream;
pub mod objects;
pub mod reader;
pub mod resolver;
pub mod xref;
pub mod xref_stream;

#[cfg(any(test, feature = "test-helpers"))]
pub mod test_helpers;

pub use self::header::PdfVersion;
pub use self::lexer::{Lexer, SpannedToken, Token};
pub use self::linearization::LinearizationInfo;
pub use self::object_parser::{IndirectObject, ObjectParser};
pub use self::reader::{EncryptionState, PdfReader};
pub use self::objects::{ObjectId, PdfArray, PdfDictionary, PdfName, PdfObject, PdfStream, PdfString};
pub use self::resolver::{Resolved, Resolver};
pub use self::xref::{ChainOutcome, XRefEntry, XRefTable};

/// Result type for parser operations
pub type ParseResult<T> = Result<T, ParseError>;

/// PDF Parser errors
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Input is empty")]
    EmptyFile,

    #[error("Invalid PDF header")]
    InvalidHeader,

    #[error("No PDF objects could be located in the input")]
    NoObjects,

    #[error("Syntax error at position {position}: {message}")]
    SyntaxError { position: usize, message: String },

    #[error("Unexpected token: expected {expected}, found {found}")]
    UnexpectedToken { expected: String, found: String },

    #[error("Invalid object reference: {0} {1} R")]
    InvalidReference(u32, u16),

    #[error("Missing required key: {0}")]
    MissingKey(String),

    #[error("Invalid xref section at offset {offset}: {message}")]
    InvalidXRef { offset: usize, message: String },

    #[error("Invalid trailer")]
    InvalidTrailer,

    #[error("Circular reference detected")]
    CircularReference,

    #[error("Stream decode error: {0}")]
    StreamDecodeError(String),

    #[error("Encryption not supported: {0}")]
    EncryptionNotSupported(String),
}

impl ParseError {
    /// Whether the error means the input as a whole is unusable
    pub fn is_fatal_input(&self) -> bool {
        matches!(
            self,
            ParseError::EmptyFile | ParseError::InvalidHeader | ParseError::NoObjects
        )
    }
}

/// Options controlling how strictly the input is parsed
#[derive(Debug, Clone)]
pub struct ParseOptions {
    /// Recover from malformed syntax instead of failing
    pub tolerant: bool,
    /// Maximum traversal depth below the catalog
    pub max_depth: usize,
    /// Maximum number of AST nodes built for one document
    pub max_nodes: usize,
    /// Maximum rendered length of a node value or property
    pub max_value_len: usize,
    /// Maximum nesting of arrays and dictionaries inside a single object
    pub max_object_nesting: usize,
    /// User password for encrypted documents (empty password is always tried)
    pub password: Vec<u8>,
    /// Decode stream filter chains while building the AST
    pub decode_streams: bool,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self::tolerant()
    }
}

impl ParseOptions {
    /// Tolerant parsing suitable for real-world producer output
    pub fn tolerant() -> Self {
        Self {
            tolerant: true,
            max_depth: 64,
            max_nodes: 200_000,
            max_value_len: 256,
            max_object_nesting: 256,
            password: Vec::new(),
            decode_streams: true,
        }
    }

    /// Strict parsing: lexical and structural defects are hard errors
    pub fn strict() -> Self {
        Self {
            tolerant: false,
            ..Self::tolerant()
        }
    }

    /// Set the traversal depth limit
    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_depth = depth;
        self
    }

    /// Set the node budget
    pub fn with_max_nodes(mut self, nodes: usize) -> Self {
        self.max_nodes = nodes;
        self
    }

    /// Set the maximum rendered value length
    pub fn with_max_value_len(mut self, len: usize) -> Self {
        self.max_value_len = len;
        self
    }

    /// Set the user password used for the standard security handler
    pub fn with_password(mut self, password: impl Into<Vec<u8>>) -> Self {
        self.password = password.into();
        self
    }

    /// Enable or disable stream decoding
    pub fn with_stream_decoding(mut self, decode: bool) -> Self {
        self.decode_streams = decode;
        self
    }
}

/// Check whether a byte is PDF whitespace (ISO 32000-2 Table 1)
#[inline]
pub(crate) fn is_whitespace(b: u8) -> bool {
    matches!(b, b' ' | b'\t' | b'\r' | b'\n' | b'\x0C' | b'\0')
}

/// Check whether a byte is a PDF delimiter (ISO 32000-2 Table 2)
#[inline]
pub(crate) fn is_delimiter(b: u8) -> bool {
    matches!(
        b,
        b'(' | b')' | b'<' | b'>' | b'[' | b']' | b'{' | b'}' | b'/' | b'%'
    )
}

/// Find the first occurrence of `needle` in `haystack` starting at `from`
pub(crate) fn find_bytes(haystack: &[u8], needle: &[u8], from: usize) -> Option<usize> {
    if needle.is_empty() || from >= haystack.len() {
        return None;
    }
    haystack[from..]
        .windows(needle.len())
        .position(|w| w == needle)
        .map(|p| p + from)
}

/// Find the last occurrence of `needle` in `haystack`
pub(crate) fn rfind_bytes(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || needle.len() > haystack.len() {
        return None;
    }
    haystack.windows(needle.len()).rposition(|w| w == needle)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_error_display() {
        let err = ParseError::SyntaxError {
            position: 12,
            message: "bad".to_string(),
        };
        assert_eq!(err.to_string(), "Syntax error at position 12: bad");
        assert_eq!(
            ParseError::InvalidReference(4, 0).to_string(),
            "Invalid object reference: 4 0 R"
        );
    }

    #[test]
    fn test_fatal_input_classification() {
        assert!(ParseError::EmptyFile.is_fatal_input());
        assert!(ParseError::NoObjects.is_fatal_input());
        assert!(!ParseError::CircularReference.is_fatal_input());
    }

    #[test]
    fn test_options_presets() {
        let tolerant = ParseOptions::default();
        assert!(tolerant.tolerant);
        assert_eq!(tolerant.max_depth, 64);

        let strict = ParseOptions::strict().with_max_depth(8).with_max_nodes(10);
        assert!(!strict.tolerant);
        assert_eq!(strict.max_depth, 8);
        assert_eq!(strict.max_nodes, 10);
    }

    #[test]
    fn test_byte_search_helpers() {
        let data = b"abc startxref 12 startxref 34";
        assert_eq!(find_bytes(data, b"startxref", 0), Some(4));
        assert_eq!(find_bytes(data, b"startxref", 5), Some(17));
        assert_eq!(rfind_bytes(data, b"startxref"), Some(17));
        assert_eq!(rfind_bytes(data, b"missing"), None);
        assert!(is_whitespace(b'\0'));
        assert!(is_delimiter(b'%'));
        assert!(!is_delimiter(b'a'));
    }
}
