//! Cross-reference index and chain walking
//!
//! Implements ISO 32000-2 Sections 7.5.4 (cross-reference tables), 7.5.5
//! (trailer), 7.5.6 (incremental updates) and the hybrid-reference handling
//! of Section 7.5.8.4.
//!
//! The chain is walked newest to oldest, starting at the last `startxref`
//! and following `/Prev`. The first entry seen for an object number wins, so
//! later incremental updates override earlier ones. A recurring section
//! offset is a `/Prev` cycle and ends the walk with [`ChainOutcome::Broken`].

use super::lexer::{Lexer, Token};
use super::object_parser::ObjectParser;
use super::objects::{ObjectId, PdfDictionary, PdfObject};
use super::xref_stream::XRefStream;
use super::{find_bytes, rfind_bytes, ParseError, ParseResult};
use std::collections::{BTreeMap, HashSet};

/// How far back from the end of the file `startxref` is searched for
const STARTXREF_SEARCH_WINDOW: usize = 64 * 1024;

/// Upper bound on sections followed through `/Prev`
const MAX_SECTIONS: usize = 4096;

/// Cross-reference entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum XRefEntry {
    /// Free (deleted) object
    Free { next: u32, generation: u16 },
    /// Object stored at a byte offset
    InUse { offset: usize, generation: u16 },
    /// Object stored inside an object stream (PDF 1.5+)
    Compressed { stream: u32, index: u32 },
}

impl XRefEntry {
    pub fn is_in_use(&self) -> bool {
        !matches!(self, XRefEntry::Free { .. })
    }

    /// Generation of the object this entry describes (compressed objects are generation 0)
    pub fn generation(&self) -> u16 {
        match self {
            XRefEntry::Free { generation, .. } | XRefEntry::InUse { generation, .. } => *generation,
            XRefEntry::Compressed { .. } => 0,
        }
    }
}

/// The merged cross-reference index of a document
#[derive(Debug, Clone, Default)]
pub struct XRefTable {
    entries: BTreeMap<u32, XRefEntry>,
    trailer: PdfDictionary,
    /// Section offsets in the order they were walked (newest first)
    sections: Vec<usize>,
    rebuilt: bool,
}

impl XRefTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up the authoritative entry for an object number
    pub fn get(&self, number: u32) -> Option<&XRefEntry> {
        self.entries.get(&number)
    }

    /// Insert unless an entry for `number` already exists; returns whether it was inserted
    pub fn insert_if_absent(&mut self, number: u32, entry: XRefEntry) -> bool {
        match self.entries.entry(number) {
            std::collections::btree_map::Entry::Occupied(_) => false,
            std::collections::btree_map::Entry::Vacant(slot) => {
                slot.insert(entry);
                true
            }
        }
    }

    /// Insert, replacing any existing entry
    pub fn insert(&mut self, number: u32, entry: XRefEntry) {
        self.entries.insert(number, entry);
    }

    /// Merge the entries of an older section: existing entries win
    pub fn merge_older(&mut self, entries: impl IntoIterator<Item = (u32, XRefEntry)>) {
        for (number, entry) in entries {
            self.insert_if_absent(number, entry);
        }
    }

    /// Fill in trailer keys missing from the newer trailers
    pub fn merge_trailer(&mut self, older: &PdfDictionary) {
        for (key, value) in older.iter() {
            if !self.trailer.contains_key(key) {
                self.trailer.insert(key, value.clone());
            }
        }
    }

    pub fn set_trailer(&mut self, trailer: PdfDictionary) {
        self.trailer = trailer;
    }

    pub fn trailer(&self) -> &PdfDictionary {
        &self.trailer
    }

    /// The catalog reference from the trailer
    pub fn root(&self) -> Option<ObjectId> {
        self.trailer.get("Root").and_then(|r| r.as_reference())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of entries describing live objects
    pub fn in_use_count(&self) -> usize {
        self.entries.values().filter(|e| e.is_in_use()).count()
    }

    pub fn iter(&self) -> impl Iterator<Item = (u32, &XRefEntry)> {
        self.entries.iter().map(|(n, e)| (*n, e))
    }

    pub fn sections(&self) -> &[usize] {
        &self.sections
    }

    pub(crate) fn push_section(&mut self, offset: usize) {
        self.sections.push(offset);
    }

    /// Whether the index was reconstructed by scanning the file
    pub fn is_rebuilt(&self) -> bool {
        self.rebuilt
    }

    pub(crate) fn mark_rebuilt(&mut self) {
        self.rebuilt = true;
    }
}

/// One cross-reference section with its trailer
#[derive(Debug, Clone)]
pub struct XRefSection {
    pub offset: usize,
    pub entries: Vec<(u32, XRefEntry)>,
    pub trailer: PdfDictionary,
    pub is_stream: bool,
}

impl XRefSection {
    /// Offset of the previous (older) section
    pub fn prev(&self) -> Option<usize> {
        offset_value(self.trailer.get("Prev"))
    }

    /// Offset of the cross-reference stream of a hybrid-reference file
    pub fn xref_stm(&self) -> Option<usize> {
        offset_value(self.trailer.get("XRefStm"))
    }
}

fn offset_value(obj: Option<&PdfObject>) -> Option<usize> {
    obj.and_then(|o| o.as_integer())
        .and_then(|n| usize::try_from(n).ok())
}

/// Why the declared cross-reference chain could not be used
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChainDefect {
    MissingStartXRef,
    InvalidSection { offset: usize, message: String },
    PrevCycle { offset: usize },
    TooManySections,
    MissingRoot,
    /// `/Root` names an object the index cannot locate
    DanglingRoot { root: ObjectId },
}

impl std::fmt::Display for ChainDefect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChainDefect::MissingStartXRef => write!(f, "no usable startxref"),
            ChainDefect::InvalidSection { offset, message } => {
                write!(f, "invalid xref section at offset {offset}: {message}")
            }
            ChainDefect::PrevCycle { offset } => {
                write!(f, "/Prev cycle: section at offset {offset} visited twice")
            }
            ChainDefect::TooManySections => write!(f, "more than {MAX_SECTIONS} xref sections"),
            ChainDefect::MissingRoot => write!(f, "trailer has no /Root reference"),
            ChainDefect::DanglingRoot { root } => {
                write!(f, "/Root {root} R is not at the offset the index gives")
            }
        }
    }
}

/// Result of walking the declared cross-reference chain
#[derive(Debug, Clone)]
pub enum ChainOutcome {
    /// Every section parsed and the trailer names a catalog
    Complete(XRefTable),
    /// The chain is unusable as declared; `partial` holds what was merged before the defect
    Broken {
        partial: XRefTable,
        defect: ChainDefect,
    },
}

/// Find the offset named by the last `startxref` keyword
pub fn find_startxref(data: &[u8]) -> Option<usize> {
    let window_start = data.len().saturating_sub(STARTXREF_SEARCH_WINDOW);
    let keyword = rfind_bytes(&data[window_start..], b"startxref")? + window_start;
    let mut lexer = Lexer::at(data, keyword + b"startxref".len());
    match lexer.next_token().ok()? {
        Token::Integer(n) => usize::try_from(n).ok().filter(|&o| o < data.len()),
        _ => None,
    }
}

/// Walk the chain from the last `startxref` through every `/Prev` link
pub fn walk_chain(data: &[u8], tolerant: bool) -> ChainOutcome {
    let mut table = XRefTable::new();
    let mut visited = HashSet::new();

    let Some(start) = find_startxref(data) else {
        return ChainOutcome::Broken {
            partial: table,
            defect: ChainDefect::MissingStartXRef,
        };
    };

    let mut next = Some(start);
    while let Some(offset) = next {
        if !visited.insert(offset) {
            return ChainOutcome::Broken {
                partial: table,
                defect: ChainDefect::PrevCycle { offset },
            };
        }
        if visited.len() > MAX_SECTIONS {
            return ChainOutcome::Broken {
                partial: table,
                defect: ChainDefect::TooManySections,
            };
        }

        let section = match parse_section_at(data, offset, tolerant) {
            Ok(section) => section,
            Err(e) => {
                return ChainOutcome::Broken {
                    partial: table,
                    defect: ChainDefect::InvalidSection {
                        offset,
                        message: e.to_string(),
                    },
                }
            }
        };
        tracing::debug!(
            offset,
            entries = section.entries.len(),
            stream = section.is_stream,
            "merged xref section"
        );

        // In hybrid files the stream's entries take precedence over the table's
        if let Some(stm) = section.xref_stm() {
            if visited.insert(stm) {
                match parse_section_at(data, stm, tolerant) {
                    Ok(stream_section) => table.merge_older(stream_section.entries),
                    Err(e) => tracing::warn!(offset = stm, error = %e, "ignoring unreadable /XRefStm"),
                }
            }
        }

        table.merge_older(section.entries.iter().copied());
        table.merge_trailer(&section.trailer);
        table.push_section(offset);
        next = section.prev();
    }

    if table.root().is_none() {
        return ChainOutcome::Broken {
            partial: table,
            defect: ChainDefect::MissingRoot,
        };
    }
    ChainOutcome::Complete(table)
}

/// Parse the section (classic table or xref stream) at `offset`
pub fn parse_section_at(data: &[u8], offset: usize, tolerant: bool) -> ParseResult<XRefSection> {
    let mut lexer = Lexer::at(data, offset).with_tolerance(tolerant);
    let first = lexer.next_spanned()?;
    match first.token {
        Token::XRef => parse_traditional_xref(data, first.end, offset, tolerant),
        Token::Integer(_) => parse_xref_stream_at(data, offset, tolerant),
        other => Err(ParseError::InvalidXRef {
            offset,
            message: format!("expected 'xref' or a stream object, found {}", other.describe()),
        }),
    }
}

fn parse_xref_stream_at(data: &[u8], offset: usize, tolerant: bool) -> ParseResult<XRefSection> {
    let indirect = ObjectParser::new(data)
        .with_tolerance(tolerant)
        .parse_indirect_at(offset, None)?;
    let stream = indirect.object.as_stream().ok_or_else(|| ParseError::InvalidXRef {
        offset,
        message: format!("object {} is not a stream", indirect.id),
    })?;
    let xref = XRefStream::parse(stream)?;
    Ok(XRefSection {
        offset,
        entries: xref.entries()?,
        trailer: xref.dict,
        is_stream: true,
    })
}

/// Parse a classic `xref` table followed by its `trailer` dictionary.
///
/// Entries are read token-wise so that lines with wrong lengths or EOL
/// markers still parse.
fn parse_traditional_xref(
    data: &[u8],
    body_start: usize,
    offset: usize,
    tolerant: bool,
) -> ParseResult<XRefSection> {
    let invalid = |message: String| ParseError::InvalidXRef { offset, message };
    let mut lexer = Lexer::at(data, body_start).with_tolerance(tolerant);
    let mut entries = Vec::new();

    loop {
        let header = lexer.next_spanned()?;
        let (mut first, count) = match header.token {
            Token::Trailer => break,
            Token::Integer(first) => match lexer.next_token()? {
                Token::Integer(count) => match (u32::try_from(first), u32::try_from(count)) {
                    (Ok(first), Ok(count)) => (first, count),
                    _ => return Err(invalid(format!("subsection header {first} {count} out of range"))),
                },
                other => return Err(invalid(format!("bad subsection count: {}", other.describe()))),
            },
            other => return Err(invalid(format!("expected subsection header, found {}", other.describe()))),
        };

        for i in 0..count {
            let field1 = lexer.next_token()?;
            let field2 = lexer.next_token()?;
            let kind = lexer.next_token()?;
            let (Token::Integer(value), Token::Integer(generation)) = (field1, field2) else {
                return Err(invalid(format!("malformed entry {i} of subsection {first}")));
            };
            let generation = u16::try_from(generation).unwrap_or(u16::MAX);

            let entry = match kind {
                Token::Keyword(k) if k == "n" => XRefEntry::InUse {
                    offset: usize::try_from(value).unwrap_or(0),
                    generation,
                },
                Token::Keyword(k) if k == "f" => {
                    // Common producer defect: table starts at 1 but lists object 0 first
                    if i == 0 && first == 1 && generation == u16::MAX {
                        first = 0;
                    }
                    XRefEntry::Free {
                        next: u32::try_from(value).unwrap_or(0),
                        generation,
                    }
                }
                other => return Err(invalid(format!("bad entry type {}", other.describe()))),
            };

            // An in-use entry at offset 0 cannot be right; leave the number unresolved
            if matches!(entry, XRefEntry::InUse { offset: 0, .. }) {
                continue;
            }
            entries.push((first.saturating_add(i), entry));
        }
    }

    let mut parser = ObjectParser::at(data, lexer.position()).with_tolerance(tolerant);
    let trailer = match parser.parse_object()? {
        PdfObject::Dictionary(dict) => dict,
        other => return Err(invalid(format!("trailer is a {}, not a dictionary", other.kind()))),
    };

    Ok(XRefSection {
        offset,
        entries,
        trailer,
        is_stream: false,
    })
}

/// Every `trailer` dictionary in the file, in file order (used during reconstruction)
pub fn scan_trailers(data: &[u8]) -> Vec<(usize, PdfDictionary)> {
    let mut trailers = Vec::new();
    let mut from = 0;
    while let Some(pos) = find_bytes(data, b"trailer", from) {
        from = pos + b"trailer".len();
        let mut parser = ObjectParser::at(data, from);
        if let Ok(PdfObject::Dictionary(dict)) = parser.parse_object() {
            trailers.push((pos, dict));
        }
    }
    trailers
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::test_helpers::{hybrid_single_page, offset_of, PdfFixture};

    #[test]
    fn test_find_startxref() {
        let pdf = PdfFixture::minimal().build();
        let offset = find_startxref(&pdf).unwrap();
        assert!(pdf[offset..].starts_with(b"xref"));
        assert_eq!(find_startxref(b"%PDF-1.4 no xref here"), None);
        assert_eq!(find_startxref(b"startxref\n999999\n%%EOF"), None);
    }

    #[test]
    fn test_parse_traditional_table() {
        let pdf = PdfFixture::minimal().build();
        let offset = find_startxref(&pdf).unwrap();
        let section = parse_section_at(&pdf, offset, true).unwrap();
        assert!(!section.is_stream);
        assert_eq!(section.entries.len(), 3);
        assert_eq!(section.entries[0].1, XRefEntry::Free { next: 0, generation: 65535 });
        assert!(matches!(section.entries[1], (1, XRefEntry::InUse { .. })));
        assert_eq!(
            section.trailer.get("Root").and_then(|r| r.as_reference()),
            Some(ObjectId::new(1, 0))
        );
        assert_eq!(section.prev(), None);
    }

    #[test]
    fn test_walk_complete_chain() {
        let pdf = PdfFixture::minimal().build();
        match walk_chain(&pdf, true) {
            ChainOutcome::Complete(table) => {
                assert_eq!(table.root(), Some(ObjectId::new(1, 0)));
                assert_eq!(table.in_use_count(), 2);
                assert_eq!(table.sections().len(), 1);
                assert!(!table.is_rebuilt());
            }
            ChainOutcome::Broken { defect, .. } => panic!("unexpected defect {defect}"),
        }
    }

    #[test]
    fn test_incremental_update_newest_wins() {
        let pdf = PdfFixture::minimal()
            .update(vec![(3, "<< /Title (v2) >>".to_string())])
            .update(vec![(3, "<< /Title (v3) >>".to_string())])
            .build();
        let ChainOutcome::Complete(table) = walk_chain(&pdf, true) else {
            panic!("chain should be complete");
        };
        assert_eq!(table.sections().len(), 3);
        let Some(XRefEntry::InUse { offset, .. }) = table.get(3) else {
            panic!("object 3 missing");
        };
        let obj = ObjectParser::new(&pdf).parse_indirect_at(*offset, None).unwrap();
        let title = obj.object.as_dict().unwrap().get("Title").unwrap().as_string().unwrap();
        assert_eq!(title.to_text(), "v3");
    }

    #[test]
    fn test_prev_cycle_is_detected() {
        let pdf = PdfFixture::minimal().with_prev_cycle().build();
        match walk_chain(&pdf, true) {
            ChainOutcome::Broken { defect, .. } => {
                assert!(matches!(defect, ChainDefect::PrevCycle { .. }))
            }
            ChainOutcome::Complete(_) => panic!("cycle not detected"),
        }
    }

    #[test]
    fn test_missing_startxref() {
        let pdf = b"%PDF-1.4\n1 0 obj << /Type /Catalog >> endobj\n";
        assert!(matches!(
            walk_chain(pdf, true),
            ChainOutcome::Broken { defect: ChainDefect::MissingStartXRef, .. }
        ));
    }

    #[test]
    fn test_subsection_starting_at_one_is_shifted() {
        let data = b"xref\n1 2\n0000000000 65535 f \n0000000017 00000 n \ntrailer\n<< /Size 2 >>";
        let section = parse_section_at(data, 0, true).unwrap();
        assert_eq!(section.entries[0].0, 0);
        assert_eq!(section.entries[1], (1, XRefEntry::InUse { offset: 17, generation: 0 }));
    }

    #[test]
    fn test_out_of_range_subsection_header() {
        for header in ["4294967296 1", "0 4294967296", "-1 1"] {
            let data = format!("xref\n{header}\n0000000017 00000 n \ntrailer\n<< /Size 2 >>");
            assert!(matches!(
                parse_section_at(data.as_bytes(), 0, true),
                Err(ParseError::InvalidXRef { offset: 0, .. })
            ));
        }
    }

    #[test]
    fn test_hybrid_stream_entries_take_precedence() {
        let pdf = hybrid_single_page();
        let ChainOutcome::Complete(table) = walk_chain(&pdf, true) else {
            panic!("hybrid chain should be complete");
        };
        assert_eq!(table.sections().len(), 1);
        let Some(XRefEntry::InUse { offset, .. }) = table.get(5) else {
            panic!("object 5 missing");
        };
        assert!(*offset > offset_of(&pdf, "%%EOF"));
        let font = ObjectParser::new(&pdf).parse_indirect_at(*offset, None).unwrap();
        assert_eq!(font.object.as_dict().unwrap().get_name("BaseFont"), Some("Courier"));
        // Entries only the table has are still merged
        assert!(matches!(table.get(3), Some(XRefEntry::InUse { .. })));
    }

    #[test]
    fn test_merge_rules() {
        let mut table = XRefTable::new();
        table.merge_older(vec![(1, XRefEntry::InUse { offset: 100, generation: 0 })]);
        table.merge_older(vec![
            (1, XRefEntry::InUse { offset: 50, generation: 0 }),
            (2, XRefEntry::Free { next: 0, generation: 1 }),
        ]);
        assert_eq!(table.get(1), Some(&XRefEntry::InUse { offset: 100, generation: 0 }));
        assert_eq!(table.len(), 2);
        assert_eq!(table.in_use_count(), 1);

        let mut newer = PdfDictionary::new();
        newer.insert("Size", PdfObject::Integer(5));
        let mut older = PdfDictionary::new();
        older.insert("Size", PdfObject::Integer(3));
        older.insert("Info", PdfObject::Reference(ObjectId::new(9, 0)));
        table.merge_trailer(&newer);
        table.merge_trailer(&older);
        assert_eq!(table.trailer().get_integer("Size"), Some(5));
        assert!(table.trailer().contains_key("Info"));
    }

    #[test]
    fn test_scan_trailers() {
        let pdf = PdfFixture::minimal().build();
        let trailers = scan_trailers(&pdf);
        assert_eq!(trailers.len(), 1);
        assert!(trailers[0].1.contains_key("Root"));
    }
}
