//! PDF Object Stream Parser
//!
//! Handles compressed objects stored in object streams (PDF 1.5+,
//! ISO 32000-2 Section 7.5.7). The decoded stream starts with `N` pairs of
//! `object-number offset`, followed by the objects themselves at `First +
//! offset`.

use super::lexer::{Lexer, Token};
use super::object_parser::ObjectParser;
use super::objects::{ObjectId, PdfObject, PdfStream};
use super::{ParseError, ParseResult};
use crate::diagnostics::ValidationIssue;

/// A decoded object stream
#[derive(Debug, Clone)]
pub struct ObjectStream {
    /// Object number of the stream itself
    pub number: u32,
    /// Contained objects in stream order
    objects: Vec<(u32, PdfObject)>,
    /// Object stream this one extends, if any
    pub extends: Option<ObjectId>,
    /// Problems found while reading the contained objects
    pub warnings: Vec<ValidationIssue>,
}

impl ObjectStream {
    /// Decode and parse an object stream
    pub fn parse(number: u32, stream: &PdfStream, tolerant: bool) -> ParseResult<Self> {
        let dict = &stream.dict;
        if dict.get_type() != Some("ObjStm") {
            return Err(ParseError::SyntaxError {
                position: 0,
                message: format!("Object {number} is not of /Type /ObjStm"),
            });
        }

        let n = dict
            .get_integer("N")
            .and_then(|n| usize::try_from(n).ok())
            .ok_or_else(|| ParseError::MissingKey("N".to_string()))?;
        let first = dict
            .get_integer("First")
            .and_then(|n| usize::try_from(n).ok())
            .ok_or_else(|| ParseError::MissingKey("First".to_string()))?;
        let extends = dict.get("Extends").and_then(|e| e.as_reference());

        let data = stream.decode()?;
        let mut warnings = Vec::new();

        let mut lexer = Lexer::new(&data).with_tolerance(tolerant);
        let mut offsets = Vec::with_capacity(n.min(data.len() / 2));
        for i in 0..n {
            match (lexer.next_token()?, lexer.next_token()?) {
                (Token::Integer(num), Token::Integer(off)) if num >= 0 && off >= 0 => {
                    offsets.push((num as u32, off as usize));
                }
                _ if tolerant => {
                    warnings.push(ValidationIssue::warning(
                        "OBJSTM_TRUNCATED_HEADER",
                        format!("Object stream {number} lists {i} of {n} declared objects"),
                    ));
                    break;
                }
                (a, b) => {
                    return Err(ParseError::SyntaxError {
                        position: lexer.position(),
                        message: format!(
                            "Expected object number and offset in object stream, found {} {}",
                            a.describe(),
                            b.describe()
                        ),
                    })
                }
            }
        }
        warnings.extend(lexer.take_warnings());

        let mut objects = Vec::with_capacity(offsets.len());
        for (obj_num, offset) in offsets {
            let mut parser = ObjectParser::at(&data, first.saturating_add(offset)).with_tolerance(tolerant);
            match parser.parse_object() {
                Ok(object) => objects.push((obj_num, object)),
                Err(e) if tolerant => warnings.push(ValidationIssue::warning(
                    "OBJSTM_OBJECT_UNREADABLE",
                    format!("Object {obj_num} in object stream {number}: {e}"),
                )),
                Err(e) => return Err(e),
            }
            warnings.extend(parser.take_warnings());
        }

        Ok(Self {
            number,
            objects,
            extends,
            warnings,
        })
    }

    /// Get an object by its object number
    pub fn get(&self, number: u32) -> Option<&PdfObject> {
        self.objects.iter().find(|(n, _)| *n == number).map(|(_, o)| o)
    }

    /// Get the object at `index`, checking that it carries the expected number
    pub fn get_at(&self, index: u32, number: u32) -> Option<&PdfObject> {
        match self.objects.get(index as usize) {
            Some((n, object)) if *n == number => Some(object),
            _ => self.get(number),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (u32, &PdfObject)> {
        self.objects.iter().map(|(n, o)| (*n, o))
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::objects::{PdfDictionary, PdfName};

    fn objstm(n: i64, header: &str, body: &str) -> PdfStream {
        let mut dict = PdfDictionary::new();
        dict.insert("Type", PdfObject::Name(PdfName::new("ObjStm")));
        dict.insert("N", PdfObject::Integer(n));
        dict.insert("First", PdfObject::Integer(header.len() as i64));
        PdfStream {
            dict,
            data: format!("{header}{body}").into_bytes(),
        }
    }

    #[test]
    fn test_parse_object_stream() {
        let stream = objstm(2, "10 0 11 18 ", "<< /A 1 >>        [1 2 3]");
        let objstm = ObjectStream::parse(20, &stream, true).unwrap();
        assert_eq!(objstm.len(), 2);
        assert_eq!(
            objstm.get(10).and_then(|o| o.as_dict()).and_then(|d| d.get_integer("A")),
            Some(1)
        );
        assert_eq!(objstm.get_at(1, 11).and_then(|o| o.as_array()).map(|a| a.len()), Some(3));
        assert!(objstm.get(12).is_none());
        assert!(objstm.warnings.is_empty());
    }

    #[test]
    fn test_index_mismatch_falls_back_to_lookup() {
        let stream = objstm(2, "10 0 11 5 ", "true false");
        let objstm = ObjectStream::parse(20, &stream, true).unwrap();
        assert_eq!(objstm.get_at(0, 11), Some(&PdfObject::Boolean(false)));
    }

    #[test]
    fn test_truncated_header() {
        let stream = objstm(3, "10 0 ", "42");
        let objstm = ObjectStream::parse(20, &stream, true).unwrap();
        assert_eq!(objstm.len(), 1);
        assert!(objstm.warnings.iter().any(|w| w.code == "OBJSTM_TRUNCATED_HEADER"));
        assert!(ObjectStream::parse(20, &stream, false).is_err());
    }

    #[test]
    fn test_missing_keys() {
        let mut stream = objstm(1, "10 0 ", "1");
        stream.dict.0.remove(&PdfName::new("First"));
        assert!(matches!(
            ObjectStream::parse(20, &stream, true),
            Err(ParseError::MissingKey(_))
        ));
    }
}
