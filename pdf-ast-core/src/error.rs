use crate::parser::ParseError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PdfAstError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    #[error("Schema not found: {0}")]
    SchemaNotFound(String),

    #[error("Schema already registered: {0}")]
    DuplicateSchema(String),

    #[error("Plugin already registered: {0}")]
    DuplicatePlugin(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),
}

impl PdfAstError {
    /// The parser error behind this error, if any
    pub fn as_parse_error(&self) -> Option<&ParseError> {
        match self {
            PdfAstError::Parse(e) => Some(e),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, PdfAstError>;
