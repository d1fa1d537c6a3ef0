//! Indirect object parser
//!
//! Parses `n g obj ... endobj` at a byte offset into a [`PdfObject`] and
//! records the byte range it occupies (ISO 32000-2 Section 7.3.10).
//!
//! Stream data is taken from the declared `/Length` when it is consistent.
//! An absent, out of range or wrong length falls back to scanning for the
//! `endstream` keyword, which is a common producer defect.

use super::lexer::{Lexer, SpannedToken, Token};
use super::objects::{ObjectId, PdfArray, PdfDictionary, PdfName, PdfObject, PdfStream, PdfString};
use super::{find_bytes, is_whitespace, ParseError, ParseResult};
use crate::diagnostics::ValidationIssue;

/// Callback resolving an indirect `/Length` value
pub type LengthLookup<'l> = dyn Fn(ObjectId) -> Option<i64> + 'l;

/// An indirect object together with its provenance
#[derive(Debug, Clone, PartialEq)]
pub struct IndirectObject {
    /// Object number and generation as written in the object header
    pub id: ObjectId,
    pub object: PdfObject,
    /// Offset of the object number
    pub offset: usize,
    /// Offset just past `endobj` (or past the value if `endobj` is missing)
    pub end: usize,
    /// Recoverable problems found while parsing this object
    pub warnings: Vec<ValidationIssue>,
}

impl IndirectObject {
    pub fn byte_length(&self) -> usize {
        self.end.saturating_sub(self.offset)
    }
}

/// Parser for objects inside a byte buffer
pub struct ObjectParser<'a, 'l> {
    lexer: Lexer<'a>,
    max_nesting: usize,
    length_lookup: Option<&'l LengthLookup<'l>>,
    warnings: Vec<ValidationIssue>,
}

impl<'a, 'l> ObjectParser<'a, 'l> {
    /// Create a tolerant parser over `data`
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            lexer: Lexer::new(data),
            max_nesting: 256,
            length_lookup: None,
            warnings: Vec::new(),
        }
    }

    /// Create a parser positioned at `offset`
    pub fn at(data: &'a [u8], offset: usize) -> Self {
        let mut parser = Self::new(data);
        parser.lexer.seek(offset);
        parser
    }

    pub fn with_tolerance(mut self, tolerant: bool) -> Self {
        self.lexer = self.lexer.with_tolerance(tolerant);
        self
    }

    pub fn with_max_nesting(mut self, max_nesting: usize) -> Self {
        self.max_nesting = max_nesting;
        self
    }

    /// Resolve indirect `/Length` entries through `lookup`
    pub fn with_length_lookup(mut self, lookup: &'l LengthLookup<'l>) -> Self {
        self.length_lookup = Some(lookup);
        self
    }

    pub fn position(&self) -> usize {
        self.lexer.position()
    }

    pub fn seek(&mut self, offset: usize) {
        self.lexer.seek(offset);
    }

    /// Direct access to the underlying lexer
    pub fn lexer_mut(&mut self) -> &mut Lexer<'a> {
        &mut self.lexer
    }

    /// Warnings recorded since the last call, lexical ones included
    pub fn take_warnings(&mut self) -> Vec<ValidationIssue> {
        let mut warnings = self.lexer.take_warnings();
        warnings.append(&mut self.warnings);
        warnings
    }

    fn anomaly(&mut self, code: &str, position: usize, message: impl Into<String>) -> ParseResult<()> {
        let message = message.into();
        if self.lexer.is_tolerant() {
            self.warnings
                .push(ValidationIssue::warning(code, message).at_offset(position));
            Ok(())
        } else {
            Err(ParseError::SyntaxError { position, message })
        }
    }

    /// Parse the indirect object starting at `offset`.
    ///
    /// `expected` is the identifier the cross-reference index associates with
    /// this offset; a different header is reported but not fatal.
    pub fn parse_indirect_at(
        &mut self,
        offset: usize,
        expected: Option<ObjectId>,
    ) -> ParseResult<IndirectObject> {
        self.lexer.seek(offset);
        let (id, start) = self.parse_object_header()?;

        if let Some(expected) = expected {
            if expected != id {
                self.warnings.push(
                    ValidationIssue::warning(
                        "OBJECT_ID_MISMATCH",
                        format!("Expected object {expected} at offset {start}, found {id}"),
                    )
                    .at_offset(start),
                );
            }
        }

        let object = self.parse_object()?;
        let data = self.lexer.data();
        let mut value_end = self.lexer.position();
        while value_end > start && is_whitespace(data[value_end - 1]) {
            value_end -= 1;
        }

        let next = self.lexer.next_spanned()?;
        let end = match next.token {
            Token::EndObj => next.end,
            _ => {
                self.anomaly(
                    "MISSING_ENDOBJ",
                    next.start,
                    format!("Object {id} is not terminated by endobj"),
                )?;
                value_end
            }
        };

        Ok(IndirectObject {
            id,
            object,
            offset: start,
            end,
            warnings: self.take_warnings(),
        })
    }

    /// Parse `n g obj`, returning the id and the offset of `n`
    fn parse_object_header(&mut self) -> ParseResult<(ObjectId, usize)> {
        let first = self.lexer.next_spanned()?;
        let second = self.lexer.next_spanned()?;
        let third = self.lexer.next_spanned()?;

        match (&first.token, &second.token, &third.token) {
            (Token::Integer(n), Token::Integer(g), Token::Obj)
                if (0..=i64::from(u32::MAX)).contains(n) && (0..=i64::from(u16::MAX)).contains(g) =>
            {
                Ok((ObjectId::new(*n as u32, *g as u16), first.start))
            }
            _ => Err(ParseError::SyntaxError {
                position: first.start,
                message: format!(
                    "Expected object header 'n g obj', found {} {} {}",
                    first.token.describe(),
                    second.token.describe(),
                    third.token.describe()
                ),
            }),
        }
    }

    /// Parse one direct object at the current position
    pub fn parse_object(&mut self) -> ParseResult<PdfObject> {
        let token = self.lexer.next_spanned()?;
        self.parse_from_token(token, 0)
    }

    fn parse_from_token(&mut self, token: SpannedToken, depth: usize) -> ParseResult<PdfObject> {
        if depth > self.max_nesting {
            return Err(ParseError::SyntaxError {
                position: token.start,
                message: format!("Object nesting deeper than {}", self.max_nesting),
            });
        }

        match token.token {
            Token::Null => Ok(PdfObject::Null),
            Token::Boolean(b) => Ok(PdfObject::Boolean(b)),
            Token::Real(r) => Ok(PdfObject::Real(r)),
            Token::String(s) | Token::HexString(s) => Ok(PdfObject::String(PdfString(s))),
            Token::Name(n) => Ok(PdfObject::Name(PdfName(n))),
            Token::Integer(n) => self.parse_integer_or_reference(n),
            Token::ArrayStart => self.parse_array(depth),
            Token::DictStart => self.parse_dictionary_or_stream(token.start, depth),
            Token::Keyword(_) | Token::Ref => {
                self.anomaly(
                    "OBJ_UNEXPECTED_TOKEN",
                    token.start,
                    format!("Unexpected {} in object, read as null", token.token.describe()),
                )?;
                Ok(PdfObject::Null)
            }
            _ => {
                // Structural token where a value was expected: leave it for the caller
                self.anomaly(
                    "OBJ_MISSING_VALUE",
                    token.start,
                    format!("Expected a value, found {}", token.token.describe()),
                )?;
                self.lexer.push_token(token);
                Ok(PdfObject::Null)
            }
        }
    }

    /// `n` alone is an integer, `n g R` is a reference
    fn parse_integer_or_reference(&mut self, n: i64) -> ParseResult<PdfObject> {
        if n < 0 || n > i64::from(u32::MAX) {
            return Ok(PdfObject::Integer(n));
        }
        let checkpoint = self.lexer.checkpoint();
        if let Token::Integer(g) = self.lexer.next_token()? {
            if (0..=i64::from(u16::MAX)).contains(&g) && self.lexer.next_token()? == Token::Ref {
                return Ok(PdfObject::Reference(ObjectId::new(n as u32, g as u16)));
            }
        }
        self.lexer.restore(checkpoint);
        Ok(PdfObject::Integer(n))
    }

    /// Parse a PDF array
    fn parse_array(&mut self, depth: usize) -> ParseResult<PdfObject> {
        let mut elements = Vec::new();

        loop {
            let token = self.lexer.next_spanned()?;
            match token.token {
                Token::ArrayEnd => break,
                Token::Eof | Token::EndObj | Token::Stream | Token::EndStream | Token::DictEnd => {
                    self.anomaly(
                        "OBJ_UNTERMINATED_ARRAY",
                        token.start,
                        format!("Array closed by {}", token.token.describe()),
                    )?;
                    if token.token != Token::DictEnd {
                        self.lexer.push_token(token);
                    }
                    break;
                }
                _ => elements.push(self.parse_from_token(token, depth + 1)?),
            }
        }

        Ok(PdfObject::Array(PdfArray(elements)))
    }

    /// Parse a PDF dictionary and check if it's followed by a stream
    fn parse_dictionary_or_stream(&mut self, start: usize, depth: usize) -> ParseResult<PdfObject> {
        let dict = self.parse_dictionary_inner(depth)?;

        let next = self.lexer.next_spanned()?;
        if next.token == Token::Stream {
            let data = self.parse_stream_data(&dict, start)?;
            return Ok(PdfObject::Stream(PdfStream { dict, data }));
        }
        self.lexer.push_token(next);
        Ok(PdfObject::Dictionary(dict))
    }

    /// Parse the inner dictionary
    fn parse_dictionary_inner(&mut self, depth: usize) -> ParseResult<PdfDictionary> {
        let mut dict = PdfDictionary::new();

        loop {
            let token = self.lexer.next_spanned()?;
            match token.token {
                Token::DictEnd => break,
                Token::Name(key) => {
                    let value_token = self.lexer.next_spanned()?;
                    let value = self.parse_from_token(value_token, depth + 1)?;
                    // A null value is equivalent to an absent key
                    if !value.is_null() {
                        dict.insert(key, value);
                    }
                }
                Token::Eof | Token::EndObj | Token::Stream | Token::EndStream => {
                    self.anomaly(
                        "OBJ_UNTERMINATED_DICTIONARY",
                        token.start,
                        format!("Dictionary closed by {}", token.token.describe()),
                    )?;
                    self.lexer.push_token(token);
                    break;
                }
                other => {
                    self.anomaly(
                        "OBJ_INVALID_DICTIONARY_KEY",
                        token.start,
                        format!("Expected dictionary key, found {}", other.describe()),
                    )?;
                }
            }
        }

        Ok(dict)
    }

    /// Capture the raw bytes between `stream` and `endstream`
    fn parse_stream_data(&mut self, dict: &PdfDictionary, dict_start: usize) -> ParseResult<Vec<u8>> {
        self.lexer.skip_stream_eol();
        let data = self.lexer.data();
        let data_start = self.lexer.position();

        let declared = match dict.get("Length") {
            Some(PdfObject::Integer(len)) => Some(*len),
            Some(PdfObject::Reference(id)) => self.length_lookup.and_then(|lookup| lookup(*id)),
            _ => None,
        };

        if let Some(len) = declared.and_then(|l| usize::try_from(l).ok()) {
            if let Some(end) = data_start.checked_add(len).filter(|&e| e <= data.len()) {
                let mut lookahead = Lexer::at(data, end);
                let after = lookahead.next_spanned()?;
                if after.token == Token::EndStream {
                    self.lexer.seek(after.end);
                    return Ok(data[data_start..end].to_vec());
                }
            }
        }

        let (code, message) = match declared {
            Some(len) => (
                "STREAM_LENGTH_MISMATCH",
                format!("Declared /Length {len} does not end at endstream"),
            ),
            None => (
                "STREAM_LENGTH_MISSING",
                "Stream /Length missing or unresolvable".to_string(),
            ),
        };
        self.anomaly(code, dict_start, message)?;

        match find_bytes(data, b"endstream", data_start) {
            Some(keyword) => {
                let mut end = keyword;
                // The EOL before endstream is not part of the data
                if end > data_start && data[end - 1] == b'\n' {
                    end -= 1;
                }
                if end > data_start && data[end - 1] == b'\r' {
                    end -= 1;
                }
                self.lexer.seek(keyword + b"endstream".len());
                Ok(data[data_start..end].to_vec())
            }
            None => {
                let end = find_bytes(data, b"endobj", data_start).unwrap_or(data.len());
                self.anomaly(
                    "STREAM_UNTERMINATED",
                    data_start,
                    "Stream has no endstream keyword",
                )?;
                self.lexer.seek(end);
                Ok(data[data_start..end].to_vec())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(input: &[u8]) -> IndirectObject {
        ObjectParser::new(input).parse_indirect_at(0, None).unwrap()
    }

    fn codes(obj: &IndirectObject) -> Vec<&str> {
        obj.warnings.iter().map(|w| w.code.as_str()).collect()
    }

    #[test]
    fn test_simple_indirect_object() {
        let input = b"12 0 obj\n<< /Type /Page /Parent 3 0 R /Rotate 90 >>\nendobj\n";
        let obj = parse(input);
        assert_eq!(obj.id, ObjectId::new(12, 0));
        assert_eq!(obj.offset, 0);
        assert_eq!(&input[obj.offset..obj.end], &input[..input.len() - 1]);
        let dict = obj.object.as_dict().unwrap();
        assert_eq!(dict.get_type(), Some("Page"));
        assert_eq!(
            dict.get("Parent").and_then(|p| p.as_reference()),
            Some(ObjectId::new(3, 0))
        );
        assert!(obj.warnings.is_empty());
    }

    #[test]
    fn test_offset_skips_leading_whitespace() {
        let input = b"\n\n  7 1 obj 42 endobj";
        let obj = parse(input);
        assert_eq!(obj.offset, 4);
        assert_eq!(obj.id, ObjectId::new(7, 1));
        assert_eq!(obj.object, PdfObject::Integer(42));
        assert_eq!(&input[obj.offset..obj.end], b"7 1 obj 42 endobj");
    }

    #[test]
    fn test_integers_are_not_references() {
        let obj = parse(b"1 0 obj [1 2 3 0 R 4] endobj");
        let array = obj.object.as_array().unwrap();
        assert_eq!(array.len(), 4);
        assert_eq!(array.get(2), Some(&PdfObject::Reference(ObjectId::new(3, 0))));
        assert_eq!(array.get(3), Some(&PdfObject::Integer(4)));
    }

    #[test]
    fn test_stream_with_correct_length() {
        let obj = parse(b"4 0 obj\n<< /Length 5 >>\nstream\nHello\nendstream\nendobj");
        let stream = obj.object.as_stream().unwrap();
        assert_eq!(stream.data, b"Hello");
        assert!(obj.warnings.is_empty());
    }

    #[test]
    fn test_stream_with_wrong_length_falls_back_to_scan() {
        let obj = parse(b"4 0 obj\n<< /Length 500 >>\nstream\r\nHello\r\nendstream\nendobj");
        let stream = obj.object.as_stream().unwrap();
        assert_eq!(stream.data, b"Hello");
        assert_eq!(codes(&obj), vec!["STREAM_LENGTH_MISMATCH"]);
    }

    #[test]
    fn test_stream_without_length() {
        let obj = parse(b"4 0 obj\n<< /Filter /FlateDecode >>\nstream\nabc\nendstream\nendobj");
        assert_eq!(obj.object.as_stream().unwrap().data, b"abc");
        assert_eq!(codes(&obj), vec!["STREAM_LENGTH_MISSING"]);
    }

    #[test]
    fn test_indirect_length_lookup() {
        let lookup = |id: ObjectId| (id == ObjectId::new(9, 0)).then_some(3i64);
        let input = b"4 0 obj << /Length 9 0 R >> stream\nxyz\nendstream endobj";
        let obj = ObjectParser::new(input)
            .with_length_lookup(&lookup)
            .parse_indirect_at(0, None)
            .unwrap();
        assert_eq!(obj.object.as_stream().unwrap().data, b"xyz");
        assert!(obj.warnings.is_empty());
    }

    #[test]
    fn test_unterminated_stream() {
        let obj = parse(b"4 0 obj << /Length 100 >> stream\nabc");
        assert_eq!(obj.object.as_stream().unwrap().data, b"abc");
        assert!(codes(&obj).contains(&"STREAM_UNTERMINATED"));
    }

    #[test]
    fn test_missing_endobj_is_warning() {
        let input = b"1 0 obj << /A 1 >>\n2 0 obj << /B 2 >> endobj";
        let obj = parse(input);
        assert_eq!(obj.object.as_dict().unwrap().get_integer("A"), Some(1));
        assert_eq!(codes(&obj), vec!["MISSING_ENDOBJ"]);
        assert_eq!(obj.end, 18);
    }

    #[test]
    fn test_id_mismatch_reported() {
        let obj = ObjectParser::new(b"5 0 obj null endobj")
            .parse_indirect_at(0, Some(ObjectId::new(6, 0)))
            .unwrap();
        assert_eq!(obj.id, ObjectId::new(5, 0));
        assert_eq!(codes(&obj), vec!["OBJECT_ID_MISMATCH"]);
    }

    #[test]
    fn test_bad_header_is_error() {
        let result = ObjectParser::new(b"<< /A 1 >>").parse_indirect_at(0, None);
        assert!(matches!(result, Err(ParseError::SyntaxError { position: 0, .. })));
    }

    #[test]
    fn test_malformed_dictionary_recovers() {
        let obj = parse(b"1 0 obj << /A 1 (junk) /B garbage /C >> endobj");
        let dict = obj.object.as_dict().unwrap();
        assert_eq!(dict.get_integer("A"), Some(1));
        assert!(!dict.contains_key("B"));
        assert!(!dict.contains_key("C"));
        assert_eq!(
            codes(&obj),
            vec!["OBJ_INVALID_DICTIONARY_KEY", "OBJ_UNEXPECTED_TOKEN", "OBJ_MISSING_VALUE"]
        );
    }

    #[test]
    fn test_strict_mode_fails_on_defects() {
        let result = ObjectParser::new(b"1 0 obj << /A 1 (junk) >> endobj")
            .with_tolerance(false)
            .parse_indirect_at(0, None);
        assert!(result.is_err());
    }

    #[test]
    fn test_nesting_limit() {
        let mut input = b"1 0 obj ".to_vec();
        input.extend(std::iter::repeat(b'[').take(20));
        input.extend(std::iter::repeat(b']').take(20));
        input.extend_from_slice(b" endobj");
        let result = ObjectParser::new(&input)
            .with_max_nesting(10)
            .parse_indirect_at(0, None);
        assert!(result.is_err());
    }
}
