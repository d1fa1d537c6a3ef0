//! PDF object model
//!
//! Value types for the object graph (ISO 32000-2 Section 7.3). A
//! [`PdfObject::Reference`] never embeds the value it points to; resolution
//! always goes through the [`Resolver`](super::Resolver).

use super::ParseResult;
use std::collections::BTreeMap;
use std::fmt;

/// Identifier of an indirect object: object number and generation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ObjectId {
    pub number: u32,
    pub generation: u16,
}

impl ObjectId {
    pub fn new(number: u32, generation: u16) -> Self {
        Self { number, generation }
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.number, self.generation)
    }
}

/// PDF Name object
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PdfName(pub String);

impl PdfName {
    pub fn new(name: impl Into<String>) -> Self {
        PdfName(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// PDF String object
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PdfString(pub Vec<u8>);

impl PdfString {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Decode as a PDF text string: UTF-16BE or UTF-8 when a byte order mark
    /// is present, otherwise byte-per-character (PDFDocEncoding's ASCII range).
    pub fn to_text(&self) -> String {
        let bytes = &self.0;
        if bytes.len() >= 2 && bytes[0] == 0xFE && bytes[1] == 0xFF {
            let units: Vec<u16> = bytes[2..]
                .chunks(2)
                .map(|c| u16::from_be_bytes([c[0], *c.get(1).unwrap_or(&0)]))
                .collect();
            return String::from_utf16_lossy(&units);
        }
        if bytes.len() >= 3 && bytes[..3] == [0xEF, 0xBB, 0xBF] {
            return String::from_utf8_lossy(&bytes[3..]).into_owned();
        }
        bytes.iter().map(|&b| b as char).collect()
    }

    /// Whether the string reads as printable text
    pub fn is_text(&self) -> bool {
        let text = self.to_text();
        !text.chars().any(|c| c.is_control() && !matches!(c, '\n' | '\r' | '\t'))
    }
}

/// PDF Array object
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PdfArray(pub Vec<PdfObject>);

impl PdfArray {
    /// Create a new empty array
    pub fn new() -> Self {
        PdfArray(Vec::new())
    }

    /// Get array length
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Check if array is empty
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Get element at index
    pub fn get(&self, index: usize) -> Option<&PdfObject> {
        self.0.get(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, PdfObject> {
        self.0.iter()
    }
}

/// PDF Dictionary object, keys kept in sorted order
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PdfDictionary(pub BTreeMap<PdfName, PdfObject>);

impl PdfDictionary {
    /// Create a new empty dictionary
    pub fn new() -> Self {
        PdfDictionary(BTreeMap::new())
    }

    /// Get a value by key
    pub fn get(&self, key: &str) -> Option<&PdfObject> {
        self.0.get(&PdfName(key.to_string()))
    }

    /// Insert a key-value pair
    pub fn insert(&mut self, key: impl Into<String>, value: PdfObject) {
        self.0.insert(PdfName(key.into()), value);
    }

    /// Check if dictionary contains a key
    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Get the dictionary type (value of /Type key)
    pub fn get_type(&self) -> Option<&str> {
        self.get_name("Type")
    }

    /// Get the dictionary subtype (value of /Subtype key, or /S for actions)
    pub fn get_subtype(&self) -> Option<&str> {
        self.get_name("Subtype")
    }

    /// Get a name value by key
    pub fn get_name(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(|obj| obj.as_name()).map(|n| n.as_str())
    }

    /// Get an integer value by key
    pub fn get_integer(&self, key: &str) -> Option<i64> {
        self.get(key).and_then(|obj| obj.as_integer())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &PdfObject)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }
}

/// PDF Stream object: dictionary plus raw, undecoded bytes
#[derive(Debug, Clone, PartialEq)]
pub struct PdfStream {
    pub dict: PdfDictionary,
    pub data: Vec<u8>,
}

impl PdfStream {
    /// Get the decoded stream data
    pub fn decode(&self) -> ParseResult<Vec<u8>> {
        super::filters::decode_stream(&self.data, &self.dict)
    }

    /// Get the raw (possibly compressed) stream data
    pub fn raw_data(&self) -> &[u8] {
        &self.data
    }

    /// Names of the declared filter chain, in decode order
    pub fn filter_names(&self) -> Vec<String> {
        match self.dict.get("Filter") {
            Some(PdfObject::Name(name)) => vec![name.0.clone()],
            Some(PdfObject::Array(array)) => array
                .iter()
                .filter_map(|f| f.as_name().map(|n| n.0.clone()))
                .collect(),
            _ => Vec::new(),
        }
    }
}

/// PDF Object types
#[derive(Debug, Clone, PartialEq)]
pub enum PdfObject {
    Null,
    Boolean(bool),
    Integer(i64),
    Real(f64),
    String(PdfString),
    Name(PdfName),
    Array(PdfArray),
    Dictionary(PdfDictionary),
    Stream(PdfStream),
    Reference(ObjectId),
}

impl PdfObject {
    /// Check if this object is null
    pub fn is_null(&self) -> bool {
        matches!(self, PdfObject::Null)
    }

    /// Get as boolean
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            PdfObject::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    /// Get as integer
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            PdfObject::Integer(i) => Some(*i),
            _ => None,
        }
    }

    /// Get as real number
    pub fn as_real(&self) -> Option<f64> {
        match self {
            PdfObject::Real(r) => Some(*r),
            PdfObject::Integer(i) => Some(*i as f64),
            _ => None,
        }
    }

    /// Get as string
    pub fn as_string(&self) -> Option<&PdfString> {
        match self {
            PdfObject::String(s) => Some(s),
            _ => None,
        }
    }

    /// Get as name
    pub fn as_name(&self) -> Option<&PdfName> {
        match self {
            PdfObject::Name(n) => Some(n),
            _ => None,
        }
    }

    /// Get as array
    pub fn as_array(&self) -> Option<&PdfArray> {
        match self {
            PdfObject::Array(a) => Some(a),
            _ => None,
        }
    }

    /// Get as dictionary (a stream's dictionary counts)
    pub fn as_dict(&self) -> Option<&PdfDictionary> {
        match self {
            PdfObject::Dictionary(d) => Some(d),
            PdfObject::Stream(s) => Some(&s.dict),
            _ => None,
        }
    }

    /// Get as stream
    pub fn as_stream(&self) -> Option<&PdfStream> {
        match self {
            PdfObject::Stream(s) => Some(s),
            _ => None,
        }
    }

    /// Get as reference
    pub fn as_reference(&self) -> Option<ObjectId> {
        match self {
            PdfObject::Reference(id) => Some(*id),
            _ => None,
        }
    }

    /// Name of the variant, e.g. for error messages
    pub fn kind(&self) -> &'static str {
        match self {
            PdfObject::Null => "null",
            PdfObject::Boolean(_) => "boolean",
            PdfObject::Integer(_) => "integer",
            PdfObject::Real(_) => "real",
            PdfObject::String(_) => "string",
            PdfObject::Name(_) => "name",
            PdfObject::Array(_) => "array",
            PdfObject::Dictionary(_) => "dictionary",
            PdfObject::Stream(_) => "stream",
            PdfObject::Reference(_) => "reference",
        }
    }

    /// Render in PDF syntax, truncated to at most `max_len` characters
    pub fn render(&self, max_len: usize) -> String {
        let mut out = String::new();
        write_object(self, &mut out, max_len);
        if out.len() > max_len {
            let mut cut = max_len.saturating_sub(3);
            while !out.is_char_boundary(cut) {
                cut -= 1;
            }
            out.truncate(cut);
            out.push_str("...");
        }
        out
    }
}

impl fmt::Display for PdfObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut out = String::new();
        write_object(self, &mut out, usize::MAX);
        f.write_str(&out)
    }
}

fn write_real(value: f64, out: &mut String) {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        out.push_str(&format!("{value:.1}"));
    } else {
        out.push_str(&value.to_string());
    }
}

fn write_name(name: &str, out: &mut String) {
    out.push('/');
    for c in name.chars() {
        let b = c as u32;
        if (0x21..0x7F).contains(&b) && !"()<>[]{}/%#".contains(c) {
            out.push(c);
        } else {
            out.push_str(&format!("#{:02X}", b & 0xFF));
        }
    }
}

fn write_string(s: &PdfString, out: &mut String) {
    if s.is_text() {
        out.push('(');
        for c in s.to_text().chars() {
            match c {
                '(' | ')' | '\\' => {
                    out.push('\\');
                    out.push(c);
                }
                '\n' => out.push_str("\\n"),
                '\r' => out.push_str("\\r"),
                '\t' => out.push_str("\\t"),
                _ => out.push(c),
            }
        }
        out.push(')');
    } else {
        out.push('<');
        for b in &s.0 {
            out.push_str(&format!("{b:02X}"));
        }
        out.push('>');
    }
}

/// Stops descending once `budget` characters have been produced
fn write_object(obj: &PdfObject, out: &mut String, budget: usize) {
    if out.len() > budget {
        return;
    }
    match obj {
        PdfObject::Null => out.push_str("null"),
        PdfObject::Boolean(b) => out.push_str(if *b { "true" } else { "false" }),
        PdfObject::Integer(i) => out.push_str(&i.to_string()),
        PdfObject::Real(r) => write_real(*r, out),
        PdfObject::String(s) => write_string(s, out),
        PdfObject::Name(n) => write_name(&n.0, out),
        PdfObject::Reference(id) => out.push_str(&format!("{id} R")),
        PdfObject::Array(array) => {
            out.push('[');
            for (i, item) in array.iter().enumerate() {
                if i > 0 {
                    out.push(' ');
                }
                write_object(item, out, budget);
                if out.len() > budget {
                    return;
                }
            }
            out.push(']');
        }
        PdfObject::Dictionary(dict) => write_dict(dict, out, budget),
        PdfObject::Stream(stream) => {
            write_dict(&stream.dict, out, budget);
            out.push_str(&format!(" stream[{} bytes]", stream.data.len()));
        }
    }
}

fn write_dict(dict: &PdfDictionary, out: &mut String, budget: usize) {
    out.push_str("<<");
    for (key, value) in dict.iter() {
        out.push(' ');
        write_name(key, out);
        out.push(' ');
        write_object(value, out, budget);
        if out.len() > budget {
            return;
        }
    }
    out.push_str(" >>");
}
