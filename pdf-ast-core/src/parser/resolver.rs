//! Reference resolution over a finished cross-reference index
//!
//! Once the index is built the resolver is read-only: every lookup takes
//! `&self`, so objects can be resolved from several threads at once. The only
//! shared mutable state is the cache of decoded object streams, kept behind
//! an `RwLock`.
//!
//! In tolerant mode an xref offset that does not lead to the requested object
//! is not the end of the lookup: the file is scanned once for object headers
//! and the last definition of that number is used instead.

use super::object_parser::ObjectParser;
use super::object_stream::ObjectStream;
use super::objects::{ObjectId, PdfObject};
use super::xref::{XRefEntry, XRefTable};
use super::{ParseError, ParseOptions, ParseResult};
use crate::diagnostics::ValidationIssue;
use crate::encryption::SecurityHandler;
use crate::recovery::{scan_objects, ScannedObject};
use std::collections::HashMap;
use std::sync::{Arc, OnceLock, RwLock};

/// Where a resolved object was stored
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectLocation {
    /// Top-level indirect object in the file body
    Direct,
    /// Inside an object stream
    Compressed { stream: u32, index: u32 },
}

/// A resolved indirect object with its provenance
#[derive(Debug, Clone)]
pub struct Resolved {
    pub id: ObjectId,
    pub object: PdfObject,
    /// Byte offset of the object (of its object stream when compressed)
    pub offset: usize,
    /// Byte length of the object (of its object stream when compressed)
    pub length: usize,
    pub location: ObjectLocation,
    pub warnings: Vec<ValidationIssue>,
}

#[derive(Clone)]
struct CachedObjectStream {
    objects: Arc<ObjectStream>,
    offset: usize,
    length: usize,
}

/// Read-only object lookup
pub struct Resolver<'a> {
    data: &'a [u8],
    xref: XRefTable,
    tolerant: bool,
    max_nesting: usize,
    security: Option<SecurityHandler>,
    object_streams: RwLock<HashMap<u32, CachedObjectStream>>,
    /// Last header per object number, filled on the first stale offset
    scanned: OnceLock<HashMap<u32, ScannedObject>>,
}

impl<'a> Resolver<'a> {
    pub fn new(data: &'a [u8], xref: XRefTable, options: &ParseOptions) -> Self {
        Self {
            data,
            xref,
            tolerant: options.tolerant,
            max_nesting: options.max_object_nesting,
            security: None,
            object_streams: RwLock::new(HashMap::new()),
            scanned: OnceLock::new(),
        }
    }

    /// Decrypt strings and streams with `handler` from now on
    pub fn with_security(mut self, handler: SecurityHandler) -> Self {
        self.security = Some(handler);
        // Cached streams were read before decryption was available
        if let Ok(mut cache) = self.object_streams.write() {
            cache.clear();
        }
        self
    }

    pub fn data(&self) -> &'a [u8] {
        self.data
    }

    pub fn xref(&self) -> &XRefTable {
        &self.xref
    }

    pub fn security(&self) -> Option<&SecurityHandler> {
        self.security.as_ref()
    }

    /// Resolve an indirect reference
    pub fn resolve(&self, id: ObjectId) -> ParseResult<Resolved> {
        let entry = self
            .xref
            .get(id.number)
            .copied()
            .ok_or(ParseError::InvalidReference(id.number, id.generation))?;

        let mut resolved = match entry {
            XRefEntry::Free { .. } => {
                return Err(ParseError::InvalidReference(id.number, id.generation))
            }
            XRefEntry::InUse { offset, generation } => {
                self.resolve_in_use(ObjectId::new(id.number, generation), offset)?
            }
            XRefEntry::Compressed { stream, index } => self.resolve_compressed(id.number, stream, index)?,
        };

        if entry.generation() != id.generation {
            resolved.warnings.push(ValidationIssue::warning(
                "REFERENCE_GENERATION_MISMATCH",
                format!(
                    "Reference {id} R points at generation {} of object {}",
                    entry.generation(),
                    id.number
                ),
            ));
        }
        Ok(resolved)
    }

    /// Resolve `object` if it is a reference, otherwise clone it
    pub fn follow(&self, object: &PdfObject) -> Option<PdfObject> {
        match object {
            PdfObject::Reference(id) => self.resolve(*id).ok().map(|r| r.object),
            other => Some(other.clone()),
        }
    }

    /// Parse top-level object `id` at its xref offset, falling back to a header scan
    fn resolve_in_use(&self, id: ObjectId, offset: usize) -> ParseResult<Resolved> {
        match self.resolve_direct(id, offset) {
            Ok(resolved) => Ok(resolved),
            Err(e) if self.tolerant => self.resolve_scanned(id, offset).ok_or(e),
            Err(e) => Err(e),
        }
    }

    fn resolve_scanned(&self, id: ObjectId, stale: usize) -> Option<Resolved> {
        let found = *self.scanned().get(&id.number)?;
        if found.offset == stale {
            return None;
        }
        let mut resolved = self.resolve_direct(found.id, found.offset).ok()?;
        tracing::debug!(object = %id, stale, offset = found.offset, "object relocated by header scan");
        resolved.warnings.push(
            ValidationIssue::warning(
                "OBJECT_OFFSET_RECOVERED",
                format!(
                    "Object {} is not at xref offset {stale}; using the definition at offset {}",
                    id.number, found.offset
                ),
            )
            .at_offset(found.offset),
        );
        Some(resolved)
    }

    fn scanned(&self) -> &HashMap<u32, ScannedObject> {
        self.scanned.get_or_init(|| {
            scan_objects(self.data)
                .into_iter()
                .map(|header| (header.id.number, header))
                .collect()
        })
    }

    fn resolve_direct(&self, id: ObjectId, offset: usize) -> ParseResult<Resolved> {
        if offset >= self.data.len() {
            return Err(ParseError::InvalidReference(id.number, id.generation));
        }
        let lookup = |length_id: ObjectId| self.lookup_length(length_id);
        let mut parser = ObjectParser::new(self.data)
            .with_tolerance(self.tolerant)
            .with_max_nesting(self.max_nesting)
            .with_length_lookup(&lookup);
        let indirect = parser.parse_indirect_at(offset, Some(id))?;
        // A stale offset that lands on another object is a miss, not a match
        if self.tolerant && indirect.id.number != id.number {
            return Err(ParseError::SyntaxError {
                position: indirect.offset,
                message: format!("offset {offset} holds object {}, not {id}", indirect.id),
            });
        }

        let mut object = indirect.object;
        let mut warnings = indirect.warnings;
        if let Some(security) = &self.security {
            if let Err(e) = security.decrypt_object(id, &mut object) {
                warnings.push(
                    ValidationIssue::warning("DECRYPTION_FAILED", format!("Object {id}: {e}"))
                        .at_offset(indirect.offset),
                );
            }
        }

        Ok(Resolved {
            id,
            object,
            offset: indirect.offset,
            length: indirect.end - indirect.offset,
            location: ObjectLocation::Direct,
            warnings,
        })
    }

    fn resolve_compressed(&self, number: u32, stream: u32, index: u32) -> ParseResult<Resolved> {
        let (objstm, warnings, offset, length) = self.object_stream(stream)?;
        let object = objstm
            .get_at(index, number)
            .cloned()
            .ok_or(ParseError::InvalidReference(number, 0))?;
        Ok(Resolved {
            id: ObjectId::new(number, 0),
            object,
            offset,
            length,
            location: ObjectLocation::Compressed { stream, index },
            warnings,
        })
    }

    /// Load (or fetch from the cache) the object stream `number`
    fn object_stream(&self, number: u32) -> ParseResult<(Arc<ObjectStream>, Vec<ValidationIssue>, usize, usize)> {
        let cached = self
            .object_streams
            .read()
            .ok()
            .and_then(|cache| cache.get(&number).cloned());
        if let Some(cached) = cached {
            return Ok((cached.objects, Vec::new(), cached.offset, cached.length));
        }

        let Some(XRefEntry::InUse { offset, generation }) = self.xref.get(number).copied() else {
            return Err(ParseError::SyntaxError {
                position: 0,
                message: format!("Object stream {number} is not a top-level object"),
            });
        };
        let container = self.resolve_in_use(ObjectId::new(number, generation), offset)?;
        let stream = container.object.as_stream().ok_or_else(|| ParseError::SyntaxError {
            position: container.offset,
            message: format!("Object {number} is not a stream"),
        })?;
        let objects = Arc::new(ObjectStream::parse(number, stream, self.tolerant)?);
        tracing::debug!(stream = number, objects = objects.len(), "decoded object stream");

        if let Ok(mut cache) = self.object_streams.write() {
            cache.entry(number).or_insert_with(|| CachedObjectStream {
                objects: Arc::clone(&objects),
                offset: container.offset,
                length: container.length,
            });
        }
        let warnings = objects.warnings.clone();
        Ok((objects, warnings, container.offset, container.length))
    }

    /// Resolve an indirect `/Length` without following further lengths
    fn lookup_length(&self, id: ObjectId) -> Option<i64> {
        match self.xref.get(id.number)? {
            XRefEntry::InUse { offset, .. } => ObjectParser::new(self.data)
                .parse_indirect_at(*offset, None)
                .ok()?
                .object
                .as_integer(),
            XRefEntry::Compressed { stream, .. } => self
                .object_streams
                .read()
                .ok()?
                .get(stream)?
                .objects
                .get(id.number)?
                .as_integer(),
            XRefEntry::Free { .. } => None,
        }
    }

    /// Decoded object streams currently cached
    pub fn cached_object_streams(&self) -> usize {
        self.object_streams.read().map(|c| c.len()).unwrap_or(0)
    }
}
