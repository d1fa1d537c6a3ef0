//! Document permissions according to ISO 32000-2 Table 22

use bitflags::bitflags;

bitflags! {
    /// User access permissions from the `/P` entry of the encryption dictionary
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Permissions: u32 {
        /// Print the document (bit 3)
        const PRINT = 1 << 2;
        /// Modify the contents (bit 4)
        const MODIFY = 1 << 3;
        /// Copy or extract text and graphics (bit 5)
        const COPY = 1 << 4;
        /// Add or modify annotations and fill forms (bit 6)
        const ANNOTATE = 1 << 5;
        /// Fill in existing form fields (bit 9)
        const FILL_FORMS = 1 << 8;
        /// Extract for accessibility (bit 10)
        const EXTRACT_ACCESSIBILITY = 1 << 9;
        /// Assemble: insert, rotate or delete pages (bit 11)
        const ASSEMBLE = 1 << 10;
        /// Print at full quality (bit 12)
        const PRINT_HIGH_QUALITY = 1 << 11;
    }
}

impl Permissions {
    /// Interpret the signed 32-bit `/P` value
    pub fn from_p(p: i64) -> Self {
        Self::from_bits_truncate(p as i32 as u32)
    }

    /// Names of the granted permissions
    pub fn names(&self) -> Vec<&'static str> {
        self.iter_names().map(|(name, _)| name).collect()
    }

    /// Comma-separated granted permissions, or `none`
    pub fn describe(&self) -> String {
        if self.is_empty() {
            "none".to_string()
        } else {
            self.names()
                .iter()
                .map(|n| n.to_ascii_lowercase())
                .collect::<Vec<_>>()
                .join(",")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_p() {
        // -3904 = 0xFFFFF0C0: every permission bit cleared
        assert!(Permissions::from_p(-3904).is_empty());
        // -4 = all bits set except 1 and 2
        assert_eq!(Permissions::from_p(-4), Permissions::all());
        let p = Permissions::from_p(-3904 | 0b100 | 0b1_0000);
        assert_eq!(p, Permissions::PRINT | Permissions::COPY);
    }

    #[test]
    fn test_describe() {
        assert_eq!(Permissions::empty().describe(), "none");
        assert_eq!((Permissions::PRINT | Permissions::COPY).describe(), "print,copy");
        assert_eq!(Permissions::all().names().len(), 8);
    }
}
