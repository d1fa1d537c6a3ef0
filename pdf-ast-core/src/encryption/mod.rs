//! PDF decryption according to ISO 32000-2 Section 7.6
//!
//! Only the Standard security handler is supported: RC4 40 to 128 bit
//! (revisions 2 to 4), AES-128 (AESV2) and AES-256 (AESV3, revisions 5
//! and 6). Public-key handlers are reported as unsupported.

mod permissions;
mod rc4;
mod standard_security;

pub use permissions::Permissions;
pub use rc4::Rc4;
pub use standard_security::{CryptMethod, EncryptionInfo, PasswordKind, SecurityHandler};

/// Security handler errors
#[derive(Debug, thiserror::Error)]
pub enum EncryptionError {
    #[error("Unsupported security handler: {0}")]
    UnsupportedHandler(String),

    #[error("Unsupported encryption revision {revision} (V {version})")]
    UnsupportedRevision { version: i64, revision: i64 },

    #[error("Missing or invalid /{0} in encryption dictionary")]
    InvalidEntry(&'static str),

    #[error("The supplied password does not open the document")]
    PasswordRequired,

    #[error("Cipher error: {0}")]
    Cipher(String),
}
