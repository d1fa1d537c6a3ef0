//! Signature byte ranges
//!
//! A signature dictionary's `/ByteRange` lists `offset length` pairs of the
//! bytes covered by the digest. A sound range starts at 0, leaves exactly one
//! gap for `/Contents`, and ends at the end of the file. Anything appended
//! later (an incremental update) falls outside it.

use crate::parser::PdfDictionary;
use std::collections::BTreeMap;

/// What the `/ByteRange` of one signature covers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ByteRangeCoverage {
    pub ranges: Vec<(u64, u64)>,
    pub signed_bytes: u64,
    pub covers_whole_file: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ByteRangeStatus {
    Missing,
    Malformed(String),
    Valid(ByteRangeCoverage),
}

impl ByteRangeStatus {
    pub fn label(&self) -> &'static str {
        match self {
            ByteRangeStatus::Missing => "missing",
            ByteRangeStatus::Malformed(_) => "malformed",
            ByteRangeStatus::Valid(_) => "valid",
        }
    }
}

/// Check the `/ByteRange` of `dict` against a file of `file_len` bytes
pub fn inspect_byte_range(dict: &PdfDictionary, file_len: usize) -> ByteRangeStatus {
    let Some(entry) = dict.get("ByteRange") else {
        return ByteRangeStatus::Missing;
    };
    let Some(values) = entry.as_array() else {
        return ByteRangeStatus::Malformed("/ByteRange is not an array".to_string());
    };
    if values.len() < 4 || values.len() % 2 != 0 {
        return ByteRangeStatus::Malformed(format!(
            "/ByteRange holds {} values, expected offset/length pairs",
            values.len()
        ));
    }

    let mut numbers = Vec::with_capacity(values.len());
    for value in values.iter() {
        match value.as_integer().map(u64::try_from) {
            Some(Ok(n)) => numbers.push(n),
            _ => return ByteRangeStatus::Malformed("/ByteRange values must be non-negative integers".to_string()),
        }
    }

    let file_len = file_len as u64;
    let mut ranges = Vec::with_capacity(numbers.len() / 2);
    let mut previous_end = 0u64;
    for pair in numbers.chunks(2) {
        let (start, length) = (pair[0], pair[1]);
        let Some(end) = start.checked_add(length) else {
            return ByteRangeStatus::Malformed(format!("range {start} {length} overflows"));
        };
        if !ranges.is_empty() && start < previous_end {
            return ByteRangeStatus::Malformed(format!("range at {start} overlaps the previous one ending at {previous_end}"));
        }
        if end > file_len {
            return ByteRangeStatus::Malformed(format!("range {start} {length} ends past the {file_len} byte file"));
        }
        ranges.push((start, length));
        previous_end = end;
    }

    let signed_bytes = ranges.iter().map(|(_, length)| length).sum();
    let gaps = ranges
        .windows(2)
        .filter(|w| w[0].0 + w[0].1 < w[1].0)
        .count();
    let covers_whole_file = ranges[0].0 == 0 && previous_end == file_len && gaps == 1;

    ByteRangeStatus::Valid(ByteRangeCoverage {
        ranges,
        signed_bytes,
        covers_whole_file,
    })
}

/// Node properties describing a signature's byte range
pub(crate) fn signature_properties(dict: &PdfDictionary, file_len: usize) -> BTreeMap<String, String> {
    let status = inspect_byte_range(dict, file_len);
    let mut properties = BTreeMap::new();
    properties.insert("byteRangeStatus".to_string(), status.label().to_string());
    match status {
        ByteRangeStatus::Missing => {}
        ByteRangeStatus::Malformed(problem) => {
            properties.insert("byteRangeProblem".to_string(), problem);
        }
        ByteRangeStatus::Valid(coverage) => {
            properties.insert("signedBytes".to_string(), coverage.signed_bytes.to_string());
            properties.insert("coversWholeFile".to_string(), coverage.covers_whole_file.to_string());
        }
    }
    properties
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::ObjectParser;

    fn dict(text: &str) -> PdfDictionary {
        ObjectParser::new(text.as_bytes())
            .parse_object()
            .unwrap()
            .as_dict()
            .unwrap()
            .clone()
    }

    #[test]
    fn test_whole_file_coverage() {
        let status = inspect_byte_range(&dict("<< /ByteRange [0 100 150 50] >>"), 200);
        let ByteRangeStatus::Valid(coverage) = status else {
            panic!("expected a valid range, got {status:?}");
        };
        assert_eq!(coverage.signed_bytes, 150);
        assert!(coverage.covers_whole_file);
    }

    #[test]
    fn test_appended_bytes_are_partial_coverage() {
        let status = inspect_byte_range(&dict("<< /ByteRange [0 100 150 50] >>"), 260);
        assert!(matches!(status, ByteRangeStatus::Valid(ref c) if !c.covers_whole_file));
    }

    #[test]
    fn test_malformed_ranges() {
        for text in [
            "<< /ByteRange 5 >>",
            "<< /ByteRange [0 100 150] >>",
            "<< /ByteRange [0 -1 150 50] >>",
            "<< /ByteRange [0 100 50 50] >>",
            "<< /ByteRange [0 100 150 500] >>",
        ] {
            let status = inspect_byte_range(&dict(text), 200);
            assert!(matches!(status, ByteRangeStatus::Malformed(_)), "{text}: {status:?}");
        }
        assert_eq!(inspect_byte_range(&dict("<< /Contents <00> >>"), 200), ByteRangeStatus::Missing);
    }

    #[test]
    fn test_properties() {
        let props = signature_properties(&dict("<< /ByteRange [0 10 20 5] >>"), 25);
        assert_eq!(props["byteRangeStatus"], "valid");
        assert_eq!(props["signedBytes"], "15");
        assert_eq!(props["coversWholeFile"], "true");

        let props = signature_properties(&dict("<< /ByteRange [0 10 5 5] >>"), 25);
        assert_eq!(props["byteRangeStatus"], "malformed");
        assert!(props.contains_key("byteRangeProblem"));
    }
}
