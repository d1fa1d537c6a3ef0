//! Linearization parameter dictionary (ISO 32000-2 Annex F)
//!
//! A linearized file opens with a dictionary carrying `/Linearized` as its
//! first indirect object. Only the parameters are read; hint streams are not
//! interpreted.

use super::object_parser::ObjectParser;
use super::objects::{ObjectId, PdfDictionary};
use crate::recovery::scan_objects;

/// The linearization dictionary must start within this many bytes
const LINEARIZATION_WINDOW: usize = 1024;

/// Parameters of a linearized file
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct LinearizationInfo {
    pub object_id: ObjectId,
    pub version: f64,
    /// `/L`: file length at the time of linearization
    pub file_length: u64,
    /// `/H`: offset and length of the primary hint stream
    pub hint_stream: Option<(u64, u64)>,
    /// `/O`: object number of the first page
    pub first_page_object: u32,
    /// `/E`: end of the first page section
    pub first_page_end: u64,
    /// `/N`
    pub page_count: u32,
    /// `/T`: offset of the first entry of the main cross-reference table
    pub main_xref_offset: u64,
}

impl LinearizationInfo {
    pub fn from_dict(object_id: ObjectId, dict: &PdfDictionary) -> Option<Self> {
        let version = dict.get("Linearized")?.as_real()?;
        let unsigned = |key: &str| {
            dict.get_integer(key)
                .and_then(|n| u64::try_from(n).ok())
                .unwrap_or(0)
        };
        let number = |key: &str| {
            dict.get_integer(key)
                .and_then(|n| u32::try_from(n).ok())
                .unwrap_or(0)
        };
        let hint_stream = dict.get("H").and_then(|h| h.as_array()).and_then(|h| {
            let offset = u64::try_from(h.get(0)?.as_integer()?).ok()?;
            let length = u64::try_from(h.get(1)?.as_integer()?).ok()?;
            Some((offset, length))
        });

        Some(Self {
            object_id,
            version,
            file_length: unsigned("L"),
            hint_stream,
            first_page_object: number("O"),
            first_page_end: unsigned("E"),
            page_count: number("N"),
            main_xref_offset: unsigned("T"),
        })
    }

    /// Parameters that contradict a file of `file_len` bytes
    pub fn problems(&self, file_len: usize) -> Vec<String> {
        let file_len = file_len as u64;
        let mut problems = Vec::new();
        if self.version < 1.0 {
            problems.push(format!("unsupported linearization version {}", self.version));
        }
        if self.file_length != file_len {
            problems.push(format!(
                "/L {} does not match the file length {file_len}, the file was changed after linearization",
                self.file_length
            ));
        }
        match self.hint_stream {
            None => problems.push("no /H hint stream".to_string()),
            Some((offset, _)) if offset >= file_len => {
                problems.push(format!("hint stream offset {offset} lies past the end of the file"))
            }
            Some(_) => {}
        }
        if self.page_count == 0 {
            problems.push("/N gives no pages".to_string());
        }
        if self.first_page_end > file_len {
            problems.push(format!(
                "first page section ends at {}, past the end of the file",
                self.first_page_end
            ));
        }
        problems
    }

    pub fn is_intact(&self, file_len: usize) -> bool {
        self.problems(file_len).is_empty()
    }
}

/// Read the linearization dictionary when it is the first object in the file
pub fn detect(data: &[u8]) -> Option<LinearizationInfo> {
    let window = &data[..data.len().min(LINEARIZATION_WINDOW)];
    let first = scan_objects(window).into_iter().next()?;
    let indirect = ObjectParser::new(data)
        .parse_indirect_at(first.offset, None)
        .ok()?;
    let dict = indirect.object.as_dict()?;
    if !dict.contains_key("Linearized") {
        return None;
    }
    LinearizationInfo::from_dict(indirect.id, dict)
}
