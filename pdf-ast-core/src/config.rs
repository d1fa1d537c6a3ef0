//! Engine identification

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Crate authors
pub const AUTHOR: &str = env!("CARGO_PKG_AUTHORS");

/// Immutable, process-wide engine information
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct EngineInfo {
    pub name: &'static str,
    pub version: &'static str,
    pub author: &'static str,
    /// Highest PDF version the parser knows about
    pub max_pdf_version: &'static str,
    pub compression: bool,
}

lazy_static::lazy_static! {
    pub static ref ENGINE_INFO: EngineInfo = EngineInfo {
        name: env!("CARGO_PKG_NAME"),
        version: VERSION,
        author: AUTHOR,
        max_pdf_version: "2.0",
        compression: cfg!(feature = "compression"),
    };
}
