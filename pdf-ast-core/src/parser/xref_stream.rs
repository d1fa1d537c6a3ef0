//! Cross-reference stream support for PDF 1.5+
//!
//! Implements cross-reference streams according to ISO 32000-2 Section 7.5.8.
//! A cross-reference stream is an indirect stream object whose dictionary
//! doubles as the trailer and whose decoded data is a packed table of
//! fixed-width binary entries.

use super::filters::decode_stream;
use super::objects::{PdfDictionary, PdfStream};
use super::xref::XRefEntry;
use super::{ParseError, ParseResult};

/// A decoded cross-reference stream
#[derive(Debug, Clone)]
pub struct XRefStream {
    /// Stream dictionary (also the trailer for this section)
    pub dict: PdfDictionary,
    /// Decoded stream data
    pub data: Vec<u8>,
    /// Field widths from W array
    pub widths: [usize; 3],
    /// Index array (pairs of [first_object_number, count])
    pub index: Vec<(u32, u32)>,
}

impl XRefStream {
    /// Parse a cross-reference stream object
    pub fn parse(stream: &PdfStream) -> ParseResult<Self> {
        let dict = &stream.dict;

        if dict.get_type() != Some("XRef") {
            return Err(ParseError::SyntaxError {
                position: 0,
                message: "Stream is not of /Type /XRef".to_string(),
            });
        }

        // Get the W (widths) array
        let widths_array = dict
            .get("W")
            .and_then(|obj| obj.as_array())
            .ok_or_else(|| ParseError::MissingKey("W array in xref stream".to_string()))?;
        let widths = widths_array
            .iter()
            .map(|obj| {
                obj.as_integer()
                    .filter(|&n| (0..=8).contains(&n))
                    .map(|n| n as usize)
                    .ok_or_else(|| ParseError::SyntaxError {
                        position: 0,
                        message: "Invalid width in W array".to_string(),
                    })
            })
            .collect::<ParseResult<Vec<_>>>()?;

        let widths: [usize; 3] = widths.try_into().map_err(|w: Vec<usize>| ParseError::SyntaxError {
            position: 0,
            message: format!("W array must have 3 elements, found {}", w.len()),
        })?;

        let size = dict.get_integer("Size");

        // Get the Index array if present, default is [0 Size]
        let index = match dict.get("Index").and_then(|obj| obj.as_array()) {
            Some(index_array) => {
                let numbers: Vec<i64> = index_array.iter().filter_map(|o| o.as_integer()).collect();
                numbers
                    .chunks_exact(2)
                    .filter(|pair| pair[0] >= 0 && pair[1] >= 0)
                    .map(|pair| (pair[0] as u32, pair[1] as u32))
                    .collect()
            }
            None => {
                let size = size
                    .filter(|&s| s >= 0)
                    .ok_or_else(|| ParseError::MissingKey("Size in xref stream".to_string()))?;
                vec![(0, size as u32)]
            }
        };

        let data = decode_stream(&stream.data, dict)?;

        Ok(XRefStream {
            dict: dict.clone(),
            data,
            widths,
            index,
        })
    }

    /// Convert the cross-reference stream to XRefTable entries.
    ///
    /// A truncated table yields the entries that are complete.
    pub fn entries(&self) -> ParseResult<Vec<(u32, XRefEntry)>> {
        let entry_size: usize = self.widths.iter().sum();
        if entry_size == 0 {
            return Err(ParseError::SyntaxError {
                position: 0,
                message: "Invalid entry size (0) in xref stream".to_string(),
            });
        }

        let mut entries = Vec::new();
        let mut records = self.data.chunks_exact(entry_size);

        for &(first_obj, count) in &self.index {
            for i in 0..count {
                let Some(record) = records.next() else {
                    tracing::debug!(
                        expected = count,
                        "xref stream data truncated, keeping complete entries"
                    );
                    return Ok(entries);
                };

                let [w0, w1, _] = self.widths;
                // Type field defaults to 1 when its width is zero
                let entry_type = if w0 == 0 { 1 } else { read_field(&record[..w0]) };
                let field2 = read_field(&record[w0..w0 + w1]);
                let field3 = read_field(&record[w0 + w1..]);

                let entry = match entry_type {
                    0 => XRefEntry::Free {
                        next: field2 as u32,
                        generation: field3 as u16,
                    },
                    1 => XRefEntry::InUse {
                        offset: field2 as usize,
                        generation: field3 as u16,
                    },
                    2 => XRefEntry::Compressed {
                        stream: field2 as u32,
                        index: field3 as u32,
                    },
                    // Unknown types are to be treated as references to the null object
                    _ => continue,
                };

                entries.push((first_obj.saturating_add(i), entry));
            }
        }

        Ok(entries)
    }

    /// Get the trailer dictionary from the xref stream
    pub fn trailer_dict(&self) -> &PdfDictionary {
        &self.dict
    }
}

/// Read a big-endian field of up to 8 bytes
fn read_field(bytes: &[u8]) -> u64 {
    bytes.iter().fold(0u64, |acc, &b| (acc << 8) | u64::from(b))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::objects::{PdfArray, PdfName, PdfObject};

    fn xref_stream(widths: [i64; 3], index: Option<Vec<i64>>, data: Vec<u8>) -> PdfStream {
        let mut dict = PdfDictionary::new();
        dict.insert("Type", PdfObject::Name(PdfName::new("XRef")));
        dict.insert(
            "W",
            PdfObject::Array(PdfArray(widths.iter().map(|&w| PdfObject::Integer(w)).collect())),
        );
        dict.insert("Size", PdfObject::Integer(3));
        if let Some(index) = index {
            dict.insert(
                "Index",
                PdfObject::Array(PdfArray(index.into_iter().map(PdfObject::Integer).collect())),
            );
        }
        PdfStream { dict, data }
    }

    #[test]
    fn test_read_field() {
        assert_eq!(read_field(&[]), 0);
        assert_eq!(read_field(&[0x01]), 1);
        assert_eq!(read_field(&[0x01, 0x00]), 256);
        assert_eq!(read_field(&[0x12, 0x34, 0x56]), 0x123456);
    }

    #[test]
    fn test_entries_all_types() {
        let data = vec![
            0, 0, 0, 0xFF, // free, next 0, gen 255
            1, 0, 0x0F, 0, // in use at 15
            2, 0, 0x05, 1, // compressed in stream 5, index 1
        ];
        let xref = XRefStream::parse(&xref_stream([1, 2, 1], None, data)).unwrap();
        let entries = xref.entries().unwrap();
        assert_eq!(
            entries,
            vec![
                (0, XRefEntry::Free { next: 0, generation: 255 }),
                (1, XRefEntry::InUse { offset: 15, generation: 0 }),
                (2, XRefEntry::Compressed { stream: 5, index: 1 }),
            ]
        );
    }

    #[test]
    fn test_index_subsections() {
        let data = vec![1, 0, 10, 1, 0, 20];
        let xref =
            XRefStream::parse(&xref_stream([1, 2, 0], Some(vec![7, 1, 12, 1]), data)).unwrap();
        let entries = xref.entries().unwrap();
        assert_eq!(entries[0].0, 7);
        assert_eq!(entries[1], (12, XRefEntry::InUse { offset: 20, generation: 0 }));
    }

    #[test]
    fn test_zero_width_type_defaults_to_in_use() {
        let xref = XRefStream::parse(&xref_stream([0, 1, 0], Some(vec![3, 1]), vec![42])).unwrap();
        assert_eq!(
            xref.entries().unwrap(),
            vec![(3, XRefEntry::InUse { offset: 42, generation: 0 })]
        );
    }

    #[test]
    fn test_truncated_data_keeps_complete_entries() {
        let xref = XRefStream::parse(&xref_stream([1, 1, 1], None, vec![1, 9, 0, 1])).unwrap();
        assert_eq!(xref.entries().unwrap().len(), 1);
    }

    #[test]
    fn test_rejects_bad_dictionaries() {
        let mut stream = xref_stream([1, 2, 1], None, vec![]);
        stream.dict.insert("W", PdfObject::Array(PdfArray(vec![PdfObject::Integer(1)])));
        assert!(XRefStream::parse(&stream).is_err());

        let mut stream = xref_stream([1, 2, 1], None, vec![]);
        stream.dict.insert("Type", PdfObject::Name(PdfName::new("ObjStm")));
        assert!(XRefStream::parse(&stream).is_err());
    }
}
