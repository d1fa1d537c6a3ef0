//! PDF Lexer
//!
//! Tokenizes PDF syntax according to ISO 32000-2 Section 7.2. The lexer works
//! directly on the source buffer: every token carries the byte range it was
//! read from, and lexing can start at any offset.
//!
//! In tolerant mode, unrecognized bytes are reported as `LEX_*` warnings and
//! skipped by resynchronizing at the next whitespace or delimiter.

use super::{is_delimiter, is_whitespace, ParseError, ParseResult};
use crate::diagnostics::ValidationIssue;

/// PDF Token types
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    /// Boolean: true or false
    Boolean(bool),

    /// Integer number
    Integer(i64),

    /// Real number
    Real(f64),

    /// Literal string `( ... )`, escapes already decoded
    String(Vec<u8>),

    /// Hexadecimal string `< ... >`, already decoded
    HexString(Vec<u8>),

    /// Name object without the leading slash, `#xx` escapes decoded
    Name(String),

    /// Left square bracket [
    ArrayStart,

    /// Right square bracket ]
    ArrayEnd,

    /// Dictionary start <<
    DictStart,

    /// Dictionary end >>
    DictEnd,

    /// Stream keyword
    Stream,

    /// Endstream keyword
    EndStream,

    /// Obj keyword
    Obj,

    /// Endobj keyword
    EndObj,

    /// Xref keyword
    XRef,

    /// Trailer keyword
    Trailer,

    /// StartXRef keyword
    StartXRef,

    /// Reference operator `R`
    Ref,

    /// Null object
    Null,

    /// Any other bare word
    Keyword(String),

    /// End of input
    Eof,
}

impl Token {
    /// Short human readable description used in error messages
    pub fn describe(&self) -> String {
        match self {
            Token::Boolean(b) => format!("boolean {b}"),
            Token::Integer(i) => format!("integer {i}"),
            Token::Real(r) => format!("real {r}"),
            Token::String(_) => "literal string".to_string(),
            Token::HexString(_) => "hex string".to_string(),
            Token::Name(n) => format!("name /{n}"),
            Token::ArrayStart => "'['".to_string(),
            Token::ArrayEnd => "']'".to_string(),
            Token::DictStart => "'<<'".to_string(),
            Token::DictEnd => "'>>'".to_string(),
            Token::Stream => "'stream'".to_string(),
            Token::EndStream => "'endstream'".to_string(),
            Token::Obj => "'obj'".to_string(),
            Token::EndObj => "'endobj'".to_string(),
            Token::XRef => "'xref'".to_string(),
            Token::Trailer => "'trailer'".to_string(),
            Token::StartXRef => "'startxref'".to_string(),
            Token::Ref => "'R'".to_string(),
            Token::Null => "null".to_string(),
            Token::Keyword(k) => format!("keyword '{k}'"),
            Token::Eof => "end of input".to_string(),
        }
    }
}

/// A token together with the byte range `[start, end)` it was read from
#[derive(Debug, Clone, PartialEq)]
pub struct SpannedToken {
    pub token: Token,
    pub start: usize,
    pub end: usize,
}

/// PDF Lexer over an in-memory buffer
pub struct Lexer<'a> {
    data: &'a [u8],
    position: usize,
    tolerant: bool,
    pending: Option<SpannedToken>,
    warnings: Vec<ValidationIssue>,
}

impl<'a> Lexer<'a> {
    /// Create a tolerant lexer positioned at the start of `data`
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            position: 0,
            tolerant: true,
            pending: None,
            warnings: Vec::new(),
        }
    }

    /// Create a lexer positioned at `offset`
    pub fn at(data: &'a [u8], offset: usize) -> Self {
        let mut lexer = Self::new(data);
        lexer.seek(offset);
        lexer
    }

    /// Switch between tolerant and strict mode
    pub fn with_tolerance(mut self, tolerant: bool) -> Self {
        self.tolerant = tolerant;
        self
    }

    pub fn is_tolerant(&self) -> bool {
        self.tolerant
    }

    /// The whole source buffer
    pub fn data(&self) -> &'a [u8] {
        self.data
    }

    /// Get current position
    pub fn position(&self) -> usize {
        self.position
    }

    /// Move to an absolute offset, discarding any pushed-back token
    pub fn seek(&mut self, offset: usize) {
        self.pending = None;
        self.position = offset.min(self.data.len());
    }

    /// Warnings recorded since the last call
    pub fn take_warnings(&mut self) -> Vec<ValidationIssue> {
        std::mem::take(&mut self.warnings)
    }

    /// Position and warning count, for speculative lookahead
    pub(crate) fn checkpoint(&self) -> (usize, usize) {
        (self.position, self.warnings.len())
    }

    /// Undo everything lexed since `checkpoint`
    pub(crate) fn restore(&mut self, checkpoint: (usize, usize)) {
        self.seek(checkpoint.0);
        self.warnings.truncate(checkpoint.1);
    }

    /// Record a warning, or fail in strict mode
    pub(crate) fn anomaly(
        &mut self,
        code: &str,
        position: usize,
        message: impl Into<String>,
    ) -> ParseResult<()> {
        let message = message.into();
        if self.tolerant {
            tracing::trace!(code, position, %message, "lexical anomaly");
            self.warnings
                .push(ValidationIssue::warning(code, message).at_offset(position));
            Ok(())
        } else {
            Err(ParseError::SyntaxError { position, message })
        }
    }

    /// Lex the token starting at `offset`, returning it with the offset right after it
    pub fn token_at(&mut self, offset: usize) -> ParseResult<(Token, usize)> {
        self.seek(offset);
        let spanned = self.next_spanned()?;
        Ok((spanned.token, spanned.end))
    }

    /// Get the next token
    pub fn next_token(&mut self) -> ParseResult<Token> {
        self.next_spanned().map(|t| t.token)
    }

    /// Peek the next token without consuming it
    pub fn peek_token(&mut self) -> ParseResult<Token> {
        let spanned = self.next_spanned()?;
        let token = spanned.token.clone();
        self.push_token(spanned);
        Ok(token)
    }

    /// Push back a token to be returned by the next call to next_token
    pub fn push_token(&mut self, token: SpannedToken) {
        self.position = token.start;
        self.pending = Some(token);
    }

    /// Get the next token with its byte range
    pub fn next_spanned(&mut self) -> ParseResult<SpannedToken> {
        if let Some(token) = self.pending.take() {
            if token.start == self.position {
                self.position = token.end;
                return Ok(token);
            }
        }

        loop {
            self.skip_whitespace_and_comments();
            let start = self.position;
            let Some(&ch) = self.data.get(start) else {
                return Ok(SpannedToken {
                    token: Token::Eof,
                    start,
                    end: start,
                });
            };

            let token = match ch {
                b'/' => Some(self.read_name()?),
                b'(' => Some(self.read_literal_string()?),
                b'<' => Some(self.read_angle_bracket()?),
                b'>' => {
                    if self.data.get(start + 1) == Some(&b'>') {
                        self.position += 2;
                        Some(Token::DictEnd)
                    } else {
                        None
                    }
                }
                b'[' => {
                    self.position += 1;
                    Some(Token::ArrayStart)
                }
                b']' => {
                    self.position += 1;
                    Some(Token::ArrayEnd)
                }
                b'+' | b'-' | b'0'..=b'9' | b'.' => Some(self.read_number()?),
                b')' | b'{' | b'}' => None,
                _ => Some(self.read_keyword()),
            };

            match token {
                Some(token) => {
                    return Ok(SpannedToken {
                        token,
                        start,
                        end: self.position,
                    })
                }
                None => {
                    self.anomaly(
                        "LEX_UNEXPECTED_BYTE",
                        start,
                        format!("Unexpected character: {:?}", ch as char),
                    )?;
                    self.resync();
                }
            }
        }
    }

    /// Skip the offending byte and everything up to the next whitespace or delimiter
    fn resync(&mut self) {
        self.position += 1;
        while let Some(&b) = self.data.get(self.position) {
            if is_whitespace(b) || is_delimiter(b) {
                break;
            }
            self.position += 1;
        }
    }

    /// Skip whitespace and comments
    pub fn skip_whitespace_and_comments(&mut self) {
        while let Some(&b) = self.data.get(self.position) {
            if is_whitespace(b) {
                self.position += 1;
            } else if b == b'%' {
                while let Some(&c) = self.data.get(self.position) {
                    if c == b'\r' || c == b'\n' {
                        break;
                    }
                    self.position += 1;
                }
            } else {
                break;
            }
        }
    }

    /// Skip the end-of-line marker that follows the `stream` keyword
    pub fn skip_stream_eol(&mut self) {
        match self.data.get(self.position) {
            Some(b'\r') => {
                self.position += 1;
                if self.data.get(self.position) == Some(&b'\n') {
                    self.position += 1;
                }
            }
            Some(b'\n') => self.position += 1,
            // Some producers put spaces before the newline
            Some(b' ') | Some(b'\t') => {
                let mut p = self.position;
                while matches!(self.data.get(p), Some(b' ') | Some(b'\t')) {
                    p += 1;
                }
                if matches!(self.data.get(p), Some(b'\r') | Some(b'\n')) {
                    self.position = p;
                    self.skip_stream_eol();
                }
            }
            _ => {}
        }
    }

    /// Read a name object (e.g., /Type)
    fn read_name(&mut self) -> ParseResult<Token> {
        self.position += 1; // consume '/'
        let mut name = String::new();

        while let Some(&ch) = self.data.get(self.position) {
            if is_whitespace(ch) || is_delimiter(ch) {
                break;
            }
            self.position += 1;

            // Handle hex codes in names (e.g., /A#20B means /A B)
            if ch == b'#' {
                let hex = self
                    .data
                    .get(self.position..self.position + 2)
                    .and_then(|h| std::str::from_utf8(h).ok())
                    .and_then(|h| u8::from_str_radix(h, 16).ok());
                match hex {
                    Some(value) => {
                        self.position += 2;
                        name.push(value as char);
                    }
                    None => {
                        self.anomaly(
                            "LEX_INVALID_NAME_ESCAPE",
                            self.position - 1,
                            "Invalid hex code in name",
                        )?;
                        name.push('#');
                    }
                }
            } else {
                name.push(ch as char);
            }
        }

        Ok(Token::Name(name))
    }

    /// Read a literal string (parentheses)
    fn read_literal_string(&mut self) -> ParseResult<Token> {
        let start = self.position;
        self.position += 1; // consume '('
        let mut string = Vec::new();
        let mut paren_depth = 1usize;

        loop {
            let Some(&ch) = self.data.get(self.position) else {
                self.anomaly("LEX_UNTERMINATED_STRING", start, "Unterminated string")?;
                break;
            };
            self.position += 1;

            match ch {
                b'\\' => {
                    let Some(&next) = self.data.get(self.position) else {
                        continue;
                    };
                    self.position += 1;
                    match next {
                        b'n' => string.push(b'\n'),
                        b'r' => string.push(b'\r'),
                        b't' => string.push(b'\t'),
                        b'b' => string.push(b'\x08'),
                        b'f' => string.push(b'\x0C'),
                        b'(' | b')' | b'\\' => string.push(next),
                        b'0'..=b'7' => {
                            // Octal escape sequence, up to three digits
                            let mut value = u32::from(next - b'0');
                            for _ in 0..2 {
                                match self.data.get(self.position) {
                                    Some(&d @ b'0'..=b'7') => {
                                        self.position += 1;
                                        value = value * 8 + u32::from(d - b'0');
                                    }
                                    _ => break,
                                }
                            }
                            string.push((value & 0xFF) as u8);
                        }
                        // Line continuation
                        b'\r' => {
                            if self.data.get(self.position) == Some(&b'\n') {
                                self.position += 1;
                            }
                        }
                        b'\n' => {}
                        // Unknown escape: the backslash is ignored
                        other => string.push(other),
                    }
                }
                b'(' => {
                    paren_depth += 1;
                    string.push(ch);
                }
                b')' => {
                    paren_depth -= 1;
                    if paren_depth == 0 {
                        break;
                    }
                    string.push(ch);
                }
                // End-of-line markers inside strings read as a single LF
                b'\r' => {
                    if self.data.get(self.position) == Some(&b'\n') {
                        self.position += 1;
                    }
                    string.push(b'\n');
                }
                _ => string.push(ch),
            }
        }

        Ok(Token::String(string))
    }

    /// Read angle bracket tokens (hex strings or dict markers)
    fn read_angle_bracket(&mut self) -> ParseResult<Token> {
        let start = self.position;
        self.position += 1; // consume '<'

        if self.data.get(self.position) == Some(&b'<') {
            self.position += 1;
            return Ok(Token::DictStart);
        }

        let mut nibbles = Vec::new();
        let mut found_end = false;

        while let Some(&ch) = self.data.get(self.position) {
            self.position += 1;
            if ch == b'>' {
                found_end = true;
                break;
            }
            match ch {
                b'0'..=b'9' => nibbles.push(ch - b'0'),
                b'a'..=b'f' => nibbles.push(ch - b'a' + 10),
                b'A'..=b'F' => nibbles.push(ch - b'A' + 10),
                _ if is_whitespace(ch) => {}
                _ => self.anomaly(
                    "LEX_INVALID_HEX_STRING",
                    self.position - 1,
                    format!("Invalid character in hex string: {:?}", ch as char),
                )?,
            }
        }

        if !found_end {
            self.anomaly("LEX_UNTERMINATED_STRING", start, "Unterminated hex string")?;
        }

        // Pad with 0 if odd number of digits
        if nibbles.len() % 2 != 0 {
            nibbles.push(0);
        }

        let bytes = nibbles.chunks(2).map(|pair| (pair[0] << 4) | pair[1]).collect();
        Ok(Token::HexString(bytes))
    }

    /// Read a number (integer or real), accepting the malformed variants
    /// real producers emit: repeated signs, lone signs, doubled decimal points.
    fn read_number(&mut self) -> ParseResult<Token> {
        let start = self.position;
        let mut negative = false;
        let mut sign_count = 0;

        while let Some(&ch) = self.data.get(self.position) {
            match ch {
                b'+' => negative = false,
                b'-' => negative = true,
                _ => break,
            }
            sign_count += 1;
            self.position += 1;
        }
        if sign_count > 1 {
            self.anomaly(
                "LEX_MALFORMED_NUMBER",
                start,
                "Repeated sign in number",
            )?;
        }

        let mut int_digits = String::new();
        let mut frac_digits = String::new();
        let mut has_dot = false;
        let mut extra_dot = false;

        while let Some(&ch) = self.data.get(self.position) {
            match ch {
                b'0'..=b'9' if !extra_dot => {
                    if has_dot {
                        frac_digits.push(ch as char);
                    } else {
                        int_digits.push(ch as char);
                    }
                }
                b'.' if !has_dot => has_dot = true,
                b'.' | b'0'..=b'9' => extra_dot = true,
                _ => break,
            }
            self.position += 1;
        }
        if extra_dot {
            self.anomaly(
                "LEX_MALFORMED_NUMBER",
                start,
                "Second decimal point in number, trailing digits ignored",
            )?;
        }

        // Scientific notation is not PDF syntax, but some producers emit it
        let mut exponent = String::new();
        if matches!(self.data.get(self.position), Some(b'e') | Some(b'E')) {
            let mut p = self.position + 1;
            let mut exp = String::new();
            if let Some(&s @ (b'+' | b'-')) = self.data.get(p) {
                exp.push(s as char);
                p += 1;
            }
            let digits_start = p;
            while let Some(&d @ b'0'..=b'9') = self.data.get(p) {
                exp.push(d as char);
                p += 1;
            }
            if p > digits_start {
                exponent = exp;
                self.position = p;
            }
        }

        if int_digits.is_empty() && frac_digits.is_empty() {
            self.anomaly(
                "LEX_MALFORMED_NUMBER",
                start,
                "Number without digits, read as 0",
            )?;
            return Ok(Token::Integer(0));
        }

        let sign = if negative { "-" } else { "" };
        if has_dot || !exponent.is_empty() {
            let int_part = if int_digits.is_empty() { "0" } else { &int_digits };
            let frac_part = if frac_digits.is_empty() { "0" } else { &frac_digits };
            let text = if exponent.is_empty() {
                format!("{sign}{int_part}.{frac_part}")
            } else {
                format!("{sign}{int_part}.{frac_part}e{exponent}")
            };
            let value = text.parse::<f64>().map_err(|_| ParseError::SyntaxError {
                position: start,
                message: format!("Invalid real number: '{text}'"),
            })?;
            return Ok(Token::Real(value));
        }

        let text = format!("{sign}{int_digits}");
        match text.parse::<i64>() {
            Ok(value) => Ok(Token::Integer(value)),
            // Out of i64 range: keep the magnitude as a real
            Err(_) => {
                let value = text.parse::<f64>().map_err(|_| ParseError::SyntaxError {
                    position: start,
                    message: format!("Invalid integer: '{text}'"),
                })?;
                Ok(Token::Real(value))
            }
        }
    }

    /// Read a keyword
    fn read_keyword(&mut self) -> Token {
        let word = self.read_word();
        match word {
            b"true" => Token::Boolean(true),
            b"false" => Token::Boolean(false),
            b"null" => Token::Null,
            b"obj" => Token::Obj,
            b"endobj" => Token::EndObj,
            b"stream" => Token::Stream,
            b"endstream" => Token::EndStream,
            b"xref" => Token::XRef,
            b"trailer" => Token::Trailer,
            b"startxref" => Token::StartXRef,
            b"R" => Token::Ref,
            other => Token::Keyword(String::from_utf8_lossy(other).into_owned()),
        }
    }

    /// Read a word (sequence of non-delimiter characters)
    fn read_word(&mut self) -> &'a [u8] {
        let start = self.position;
        while let Some(&ch) = self.data.get(self.position) {
            if is_whitespace(ch) || is_delimiter(ch) {
                break;
            }
            self.position += 1;
        }
        &self.data[start..self.position]
    }
}
