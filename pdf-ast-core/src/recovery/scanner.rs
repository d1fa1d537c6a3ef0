//! Linear object scanner used to rebuild a cross-reference index
//!
//! Finds every `n g obj` header in the file body. When an object number
//! occurs more than once the last occurrence wins, matching how incremental
//! updates append newer definitions.

use crate::diagnostics::ValidationIssue;
use crate::parser::object_parser::ObjectParser;
use crate::parser::object_stream::ObjectStream;
use crate::parser::objects::{ObjectId, PdfDictionary, PdfObject};
use crate::parser::xref::{scan_trailers, XRefEntry, XRefTable};
use crate::parser::{find_bytes, is_delimiter, is_whitespace};
use std::collections::BTreeMap;

/// An object header found by the scanner
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScannedObject {
    pub id: ObjectId,
    pub offset: usize,
}

/// Statistics of a rebuild scan
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanResult {
    /// Object headers found (duplicates included)
    pub headers_found: usize,
    /// Objects registered from object streams
    pub compressed_objects: usize,
    /// Where the trailer came from
    pub trailer_source: TrailerSource,
}

/// Origin of the trailer of a rebuilt index
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TrailerSource {
    /// A `trailer` dictionary whose `/Root` resolves
    TrailerKeyword,
    /// The dictionary of a cross-reference stream
    XRefStream,
    /// Synthesized from the last `/Type /Catalog` object
    Catalog,
    #[default]
    None,
}

/// Find all object headers in file order
pub fn scan_objects(data: &[u8]) -> Vec<ScannedObject> {
    let mut found = Vec::new();
    let mut from = 0;
    while let Some(pos) = find_bytes(data, b"obj", from) {
        from = pos + 3;
        // Reject `objstm`-like words and `endobj`
        if data.get(pos + 3).is_some_and(|&b| !is_whitespace(b) && !is_delimiter(b)) {
            continue;
        }
        if let Some((id, offset)) = header_before(data, pos) {
            found.push(ScannedObject { id, offset });
        }
    }
    found
}

/// Parse `n g` backwards from the `obj` keyword at `obj_pos`
fn header_before(data: &[u8], obj_pos: usize) -> Option<(ObjectId, usize)> {
    let mut pos = obj_pos;
    let skip_ws = |mut p: usize| {
        while p > 0 && is_whitespace(data[p - 1]) {
            p -= 1;
        }
        p
    };
    let digits_before = |end: usize| {
        let mut start = end;
        while start > 0 && data[start - 1].is_ascii_digit() {
            start -= 1;
        }
        (start < end && end - start <= 10).then_some(start)
    };

    pos = skip_ws(pos);
    if pos == obj_pos {
        return None;
    }
    let gen_start = digits_before(pos)?;
    let generation: u16 = std::str::from_utf8(&data[gen_start..pos]).ok()?.parse().ok()?;

    let num_end = skip_ws(gen_start);
    if num_end == gen_start {
        return None;
    }
    let num_start = digits_before(num_end)?;
    if num_start > 0 && !is_whitespace(data[num_start - 1]) && !is_delimiter(data[num_start - 1]) {
        return None;
    }
    let number: u32 = std::str::from_utf8(&data[num_start..num_end]).ok()?.parse().ok()?;
    Some((ObjectId::new(number, generation), num_start))
}

/// Rebuild the cross-reference index by scanning the whole file.
///
/// `hint` is the trailer recovered from a broken chain, if any. Keys it has
/// that the rebuilt trailer lacks (`/Info`, `/Encrypt`, `/ID`) are kept.
pub fn rebuild_index(data: &[u8], hint: &PdfDictionary) -> (XRefTable, ScanResult, Vec<ValidationIssue>) {
    let headers = scan_objects(data);
    let mut result = ScanResult {
        headers_found: headers.len(),
        ..ScanResult::default()
    };
    let mut warnings = Vec::new();

    let mut latest: BTreeMap<u32, ScannedObject> = BTreeMap::new();
    for header in &headers {
        latest.insert(header.id.number, *header);
    }

    let mut table = XRefTable::new();
    let mut catalogs = Vec::new();
    let mut xref_stream_trailers = Vec::new();
    let mut object_streams = Vec::new();

    for scanned in latest.values() {
        table.insert(
            scanned.id.number,
            XRefEntry::InUse {
                offset: scanned.offset,
                generation: scanned.id.generation,
            },
        );

        let Ok(indirect) = ObjectParser::new(data).parse_indirect_at(scanned.offset, None) else {
            continue;
        };
        let Some(dict) = indirect.object.as_dict() else {
            continue;
        };
        match dict.get_type() {
            Some("Catalog") => catalogs.push((scanned.offset, scanned.id)),
            Some("XRef") if dict.contains_key("Root") => {
                xref_stream_trailers.push((scanned.offset, dict.clone()))
            }
            Some("ObjStm") => {
                if let PdfObject::Stream(stream) = &indirect.object {
                    match ObjectStream::parse(scanned.id.number, stream, true) {
                        Ok(objstm) => object_streams.push(objstm),
                        Err(e) => warnings.push(
                            ValidationIssue::warning(
                                "OBJSTM_UNREADABLE",
                                format!("Object stream {}: {e}", scanned.id),
                            )
                            .at_offset(scanned.offset),
                        ),
                    }
                }
            }
            _ => {}
        }
    }

    // Top-level definitions take precedence over object stream members
    for objstm in &object_streams {
        for (index, (number, object)) in objstm.iter().enumerate() {
            let inserted = table.insert_if_absent(
                number,
                XRefEntry::Compressed {
                    stream: objstm.number,
                    index: index as u32,
                },
            );
            if inserted {
                result.compressed_objects += 1;
                if object.as_dict().and_then(|d| d.get_type()) == Some("Catalog") {
                    catalogs.push((usize::MAX, ObjectId::new(number, 0)));
                }
            }
        }
    }

    let root_known = |dict: &PdfDictionary, table: &XRefTable| {
        dict.get("Root")
            .and_then(|r| r.as_reference())
            .is_some_and(|root| table.get(root.number).is_some_and(|e| e.is_in_use()))
    };

    let trailer = if let Some((_, dict)) = scan_trailers(data)
        .into_iter()
        .rev()
        .find(|(_, d)| root_known(d, &table))
    {
        result.trailer_source = TrailerSource::TrailerKeyword;
        Some(dict)
    } else if let Some((_, dict)) = xref_stream_trailers
        .into_iter()
        .rev()
        .find(|(_, d)| root_known(d, &table))
    {
        result.trailer_source = TrailerSource::XRefStream;
        Some(dict)
    } else if let Some((_, id)) = catalogs.iter().max_by_key(|(offset, _)| *offset) {
        result.trailer_source = TrailerSource::Catalog;
        let mut dict = PdfDictionary::new();
        dict.insert("Root", PdfObject::Reference(*id));
        Some(dict)
    } else {
        None
    };

    if let Some(trailer) = trailer {
        table.set_trailer(trailer);
    }
    table.merge_trailer(hint);
    table.insert_if_absent(0, XRefEntry::Free { next: 0, generation: u16::MAX });
    table.mark_rebuilt();

    tracing::debug!(
        headers = result.headers_found,
        objects = table.len(),
        compressed = result.compressed_objects,
        trailer = ?result.trailer_source,
        "rebuilt cross-reference index"
    );
    (table, result, warnings)
}
