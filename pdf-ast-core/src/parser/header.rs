//! PDF Header Parser
//!
//! Parses PDF header and version according to ISO 32000-2 Section 7.5.2

use super::find_bytes;
use std::str::FromStr;

/// How far into the file the `%PDF-` marker may appear
const HEADER_SEARCH_WINDOW: usize = 1024;

/// PDF Version information
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PdfVersion {
    pub major: u8,
    pub minor: u8,
}

impl PdfVersion {
    /// Create a new PDF version
    pub const fn new(major: u8, minor: u8) -> Self {
        Self { major, minor }
    }

    /// Version assumed when the header is missing or unreadable
    pub const FALLBACK: PdfVersion = PdfVersion::new(1, 4);

    /// Check if this version is a known published version (1.0 through 2.0)
    pub fn is_known(&self) -> bool {
        matches!((self.major, self.minor), (1, 0..=7) | (2, 0))
    }
}

impl Default for PdfVersion {
    fn default() -> Self {
        Self::FALLBACK
    }
}

impl std::fmt::Display for PdfVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

impl FromStr for PdfVersion {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (major, minor) = s.trim().split_once('.').ok_or(())?;
        let minor: String = minor.chars().take_while(|c| c.is_ascii_digit()).collect();
        Ok(PdfVersion::new(
            major.parse().map_err(|_| ())?,
            minor.parse().map_err(|_| ())?,
        ))
    }
}

/// PDF Header information
#[derive(Debug, Clone, PartialEq)]
pub struct PdfHeader {
    pub version: PdfVersion,
    /// Offset of the `%PDF-` marker; bytes before it are junk some producers prepend
    pub offset: usize,
    pub has_binary_marker: bool,
}

impl PdfHeader {
    /// Locate and parse the header within the first kilobyte
    pub fn find(data: &[u8]) -> Option<Self> {
        let window = &data[..data.len().min(HEADER_SEARCH_WINDOW)];
        let offset = find_bytes(window, b"%PDF-", 0)?;
        let rest = &data[offset + 5..];
        let line_end = rest
            .iter()
            .position(|&b| b == b'\r' || b == b'\n')
            .unwrap_or(rest.len().min(16));
        let line = String::from_utf8_lossy(&rest[..line_end]);
        let version = line.parse::<PdfVersion>().ok()?;

        Some(Self {
            version,
            offset,
            has_binary_marker: Self::check_binary_marker(&rest[line_end..]),
        })
    }

    /// A comment line with at least four bytes >= 128 right after the header
    fn check_binary_marker(after_header: &[u8]) -> bool {
        let start = after_header
            .iter()
            .position(|&b| b != b'\r' && b != b'\n')
            .unwrap_or(after_header.len());
        let line = &after_header[start..];
        if line.first() != Some(&b'%') {
            return false;
        }
        line[1..]
            .iter()
            .take_while(|&&b| b != b'\r' && b != b'\n')
            .filter(|&&b| b >= 128)
            .count()
            >= 4
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_standard_header() {
        let header = PdfHeader::find(b"%PDF-1.7\n%\xE2\xE3\xCF\xD3\n1 0 obj").unwrap();
        assert_eq!(header.version, PdfVersion::new(1, 7));
        assert_eq!(header.offset, 0);
        assert!(header.has_binary_marker);
    }

    #[test]
    fn test_header_after_junk() {
        let header = PdfHeader::find(b"garbage bytes\r\n%PDF-2.0\r\n").unwrap();
        assert_eq!(header.version, PdfVersion::new(2, 0));
        assert_eq!(header.offset, 15);
        assert!(!header.has_binary_marker);
    }

    #[test]
    fn test_missing_or_bad_header() {
        assert!(PdfHeader::find(b"1 0 obj << >> endobj").is_none());
        assert!(PdfHeader::find(b"%PDF-x.y\n").is_none());
        assert!(PdfHeader::find(b"").is_none());
    }

    #[test]
    fn test_version_ordering_and_parse() {
        assert!(PdfVersion::new(1, 4) < PdfVersion::new(1, 7));
        assert!(PdfVersion::new(1, 7) < PdfVersion::new(2, 0));
        assert_eq!("1.5".parse::<PdfVersion>(), Ok(PdfVersion::new(1, 5)));
        assert_eq!("1.6 junk".parse::<PdfVersion>(), Ok(PdfVersion::new(1, 6)));
        assert!(PdfVersion::new(2, 0).is_known());
        assert!(!PdfVersion::new(3, 1).is_known());
        assert_eq!(PdfVersion::default().to_string(), "1.4");
    }
}
