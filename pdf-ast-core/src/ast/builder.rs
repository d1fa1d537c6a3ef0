//! AST construction
//!
//! Breadth-first traversal of the object graph starting at the catalog.
//! Every indirect object becomes exactly one node; reaching it again from
//! another parent only adds an edge. Direct dictionaries become nodes when
//! they classify to something other than [`NodeType::Other`], otherwise the
//! traversal passes through them. Back-pointer keys are never followed and a
//! reference to an ancestor is reported as a cycle instead of becoming an
//! edge, so the traversal always terminates. An edge between branches that
//! would close a loop in the children index is dropped the same way, which
//! keeps the structure a DAG.

use super::classify::{classify, ReachContext};
use super::document::{Document, DocumentParts};
use super::node::{AstNode, NodeId, NodeMetadata, NodeType};
use super::signature::signature_properties;
use crate::diagnostics::ValidationIssue;
use crate::encryption::Permissions;
use crate::parser::filters::decode_stream_detailed;
use crate::parser::reader::PdfReader;
use crate::parser::resolver::{ObjectLocation, Resolved};
use crate::parser::{ObjectId, ParseError, ParseOptions, ParseResult, PdfDictionary, PdfObject};
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};

/// Keys that point back up the tree
const BACK_POINTER_KEYS: &[&str] = &["Parent", "P", "Prev", "Last", "Dest", "D", "ParentTree"];

/// An indirect object waiting to have its contents expanded
struct Pending {
    node: NodeId,
    object: PdfObject,
    /// Key through which the object was reached
    reached_by: Option<String>,
    /// Object numbers on the path from the catalog, this object included
    ancestors: Vec<u32>,
    span: (usize, usize),
}

/// Where a value being walked sits
#[derive(Clone, Copy)]
struct Position<'p> {
    parent: NodeId,
    key: Option<&'p str>,
    parent_key: Option<&'p str>,
    span: (usize, usize),
}

pub(crate) struct AstBuilder<'r, 'a> {
    reader: &'r PdfReader<'a>,
    options: &'r ParseOptions,
    nodes: Vec<AstNode>,
    index: HashMap<NodeId, usize>,
    children: HashMap<NodeId, Vec<NodeId>>,
    parents: HashMap<NodeId, Vec<NodeId>>,
    by_object: HashMap<u32, NodeId>,
    queue: VecDeque<Pending>,
    diagnostics: Vec<ValidationIssue>,
    depth_truncated: usize,
    budget_truncated: usize,
}

impl<'r, 'a> AstBuilder<'r, 'a> {
    pub(crate) fn new(reader: &'r PdfReader<'a>, options: &'r ParseOptions) -> Self {
        Self {
            reader,
            options,
            nodes: Vec::new(),
            index: HashMap::new(),
            children: HashMap::new(),
            parents: HashMap::new(),
            by_object: HashMap::new(),
            queue: VecDeque::new(),
            diagnostics: Vec::new(),
            depth_truncated: 0,
            budget_truncated: 0,
        }
    }

    /// Build the document, consuming the reader's diagnostics
    #[tracing::instrument(level = "debug", skip_all)]
    pub(crate) fn build(mut self, mut reader_diagnostics: Vec<ValidationIssue>) -> ParseResult<Document> {
        let root = self.build_root()?;

        while let Some(pending) = self.queue.pop_front() {
            self.expand(pending);
        }

        self.attach_trailer_entries(root);
        self.report_truncation();

        reader_diagnostics.append(&mut self.diagnostics);
        tracing::debug!(
            nodes = self.nodes.len(),
            diagnostics = reader_diagnostics.len(),
            "built document tree"
        );

        Ok(Document::from_parts(DocumentParts {
            nodes: self.nodes,
            root,
            version: self.reader.version(),
            children: self.children,
            parents: self.parents,
            by_object: self.by_object,
            diagnostics: reader_diagnostics,
            encryption: self.reader.encryption().clone(),
            xref_rebuilt: self.reader.xref().is_rebuilt(),
            object_count: self.reader.xref().in_use_count(),
            linearization: self.reader.linearization().cloned(),
        }))
    }

    fn build_root(&mut self) -> ParseResult<NodeId> {
        let root_id = self.reader.root_id().ok_or_else(|| {
            tracing::warn!("trailer names no catalog");
            ParseError::NoObjects
        })?;
        let resolved = self.reader.resolver().resolve(root_id).map_err(|e| {
            tracing::warn!(%root_id, error = %e, "catalog cannot be resolved");
            ParseError::NoObjects
        })?;

        if resolved.object.as_dict().and_then(|d| d.get_type()) != Some("Catalog") {
            self.diagnostics.push(
                ValidationIssue::warning(
                    "CATALOG_TYPE_MISSING",
                    format!("Document catalog {} R is not marked /Type /Catalog", resolved.id),
                )
                .at_offset(resolved.offset),
            );
        }

        let node = self.indirect_node(&resolved, NodeType::Catalog, 0);
        self.absorb_warnings(resolved.warnings, node);
        self.queue.push_back(Pending {
            node,
            object: resolved.object,
            reached_by: None,
            ancestors: vec![resolved.id.number],
            span: (resolved.offset, resolved.length),
        });
        Ok(node)
    }

    /// Trailer `/Info` and `/Encrypt` hang off the catalog
    fn attach_trailer_entries(&mut self, root: NodeId) {
        let trailer = self.reader.trailer().clone();
        for key in ["Info", "Encrypt"] {
            let Some(value) = trailer.get(key) else {
                continue;
            };
            let ancestors = self
                .node(root)
                .and_then(|n| n.object_id())
                .map(|id| vec![id.number])
                .unwrap_or_default();
            let pending = Pending {
                node: root,
                object: PdfObject::Null,
                reached_by: None,
                ancestors,
                span: (0, 0),
            };
            let position = Position {
                parent: root,
                key: Some(key),
                parent_key: Some("Trailer"),
                span: (0, 0),
            };
            self.walk(value, position, &pending);
            while let Some(next) = self.queue.pop_front() {
                self.expand(next);
            }
        }
    }

    /// Walk the contents of one indirect object
    fn expand(&mut self, pending: Pending) {
        let position = Position {
            parent: pending.node,
            key: None,
            parent_key: pending.reached_by.as_deref(),
            span: pending.span,
        };
        match &pending.object {
            PdfObject::Dictionary(dict) => self.walk_dict(dict, position, &pending),
            PdfObject::Stream(stream) => self.walk_dict(&stream.dict, position, &pending),
            PdfObject::Array(array) => {
                for item in array.iter() {
                    self.walk(item, Position { key: pending.reached_by.as_deref(), ..position }, &pending);
                }
            }
            _ => {}
        }
    }

    fn walk_dict(&mut self, dict: &PdfDictionary, position: Position<'_>, pending: &Pending) {
        for (key, value) in dict.iter() {
            if BACK_POINTER_KEYS.contains(&key) {
                continue;
            }
            let child = Position {
                key: Some(key),
                parent_key: position.key.or(position.parent_key),
                ..position
            };
            self.walk(value, child, pending);
        }
    }

    fn walk(&mut self, value: &PdfObject, position: Position<'_>, pending: &Pending) {
        match value {
            PdfObject::Reference(id) => self.follow_reference(*id, position, pending),
            PdfObject::Array(array) => {
                for item in array.iter() {
                    self.walk(item, position, pending);
                }
            }
            PdfObject::Dictionary(dict) => {
                let parent_type = self.node(position.parent).map(|n| n.node_type);
                let ctx = ReachContext {
                    key: position.key,
                    parent_key: position.parent_key,
                    parent_type,
                };
                let node_type = classify(value, &ctx);
                if node_type == NodeType::Other {
                    self.walk_dict(dict, position, pending);
                    return;
                }
                let Some(node) = self.direct_node(value, node_type, position) else {
                    return;
                };
                let inner = Position {
                    parent: node,
                    key: None,
                    parent_key: position.key,
                    span: position.span,
                };
                self.walk_dict(dict, inner, pending);
            }
            _ => {}
        }
    }

    fn follow_reference(&mut self, id: ObjectId, position: Position<'_>, pending: &Pending) {
        if pending.ancestors.contains(&id.number) {
            self.diagnostics.push(
                ValidationIssue::warning(
                    "CYCLIC_REFERENCE",
                    format!("Reference {id} R points back at an ancestor"),
                )
                .with_node(position.parent)
                .with_location(key_location(position)),
            );
            return;
        }

        if let Some(&existing) = self.by_object.get(&id.number) {
            if self.reaches(existing, position.parent) {
                self.diagnostics.push(
                    ValidationIssue::warning(
                        "CYCLIC_REFERENCE",
                        format!("Reference {id} R would close a cycle through another branch"),
                    )
                    .with_node(position.parent)
                    .with_location(key_location(position)),
                );
                return;
            }
            self.link(position.parent, existing);
            return;
        }

        let mut resolved = match self.reader.resolver().resolve(id) {
            Ok(resolved) => resolved,
            Err(e) => {
                self.diagnostics.push(
                    ValidationIssue::warning(
                        "REFERENCE_UNRESOLVED",
                        format!("Reference {id} R cannot be resolved: {e}"),
                    )
                    .with_node(position.parent)
                    .with_location(key_location(position)),
                );
                return;
            }
        };

        let Some(depth) = self.child_depth(position.parent) else {
            return;
        };
        let parent_type = self.node(position.parent).map(|n| n.node_type);
        let ctx = ReachContext {
            key: position.key,
            parent_key: position.parent_key,
            parent_type,
        };
        let node_type = classify(&resolved.object, &ctx);
        if self.nodes.len() >= self.options.max_nodes.max(1) {
            self.budget_truncated += 1;
            return;
        }

        let node = self.indirect_node(&resolved, node_type, depth);
        self.link(position.parent, node);
        self.absorb_warnings(std::mem::take(&mut resolved.warnings), node);

        let mut ancestors = pending.ancestors.clone();
        ancestors.push(resolved.id.number);
        self.queue.push_back(Pending {
            node,
            span: (resolved.offset, resolved.length),
            object: resolved.object,
            reached_by: position.key.map(str::to_string),
            ancestors,
        });
    }

    fn child_depth(&mut self, parent: NodeId) -> Option<usize> {
        let depth = self.node(parent).map_or(0, |n| n.depth()) + 1;
        if depth > self.options.max_depth {
            self.depth_truncated += 1;
            return None;
        }
        Some(depth)
    }

    fn indirect_node(&mut self, resolved: &Resolved, node_type: NodeType, depth: usize) -> NodeId {
        let max = self.options.max_value_len;
        let mut properties = render_properties(&resolved.object, max);
        properties.insert(
            "objectId".to_string(),
            format!("{} {}", resolved.id.number, resolved.id.generation),
        );
        if let ObjectLocation::Compressed { stream, index } = resolved.location {
            properties.insert("source".to_string(), format!("object stream {stream}, index {index}"));
        }
        if let PdfObject::Stream(stream) = &resolved.object {
            let filters = stream.filter_names();
            if !filters.is_empty() {
                properties.insert("filters".to_string(), filters.join(","));
            }
            properties.insert("rawLength".to_string(), stream.data.len().to_string());
            if self.options.decode_streams {
                match decode_stream_detailed(&stream.data, &stream.dict) {
                    Ok(decoded) => {
                        properties.insert("decodedLength".to_string(), decoded.data.len().to_string());
                        if let Some(codec) = decoded.stopped_at {
                            properties.insert("decodeStoppedAt".to_string(), format!("{codec:?}"));
                        }
                    }
                    Err(e) => {
                        properties.insert("decodeError".to_string(), truncate(&e.to_string(), max));
                    }
                }
            }
        }
        self.type_properties(&resolved.object, node_type, &mut properties);

        let node = AstNode {
            id: NodeId::next(),
            node_type,
            value: resolved.object.render(max),
            metadata: Some(NodeMetadata {
                byte_offset: resolved.offset,
                byte_length: resolved.length,
                depth,
                object_id: Some(resolved.id),
            }),
            properties,
        };
        let id = node.id;
        self.by_object.insert(resolved.id.number, id);
        self.push(node);
        id
    }

    fn direct_node(&mut self, value: &PdfObject, node_type: NodeType, position: Position<'_>) -> Option<NodeId> {
        let depth = self.child_depth(position.parent)?;
        if self.nodes.len() >= self.options.max_nodes.max(1) {
            self.budget_truncated += 1;
            return None;
        }
        let max = self.options.max_value_len;
        let mut properties = render_properties(value, max);
        self.type_properties(value, node_type, &mut properties);
        let (byte_offset, byte_length) = position.span;
        let node = AstNode {
            id: NodeId::next(),
            node_type,
            value: value.render(max),
            metadata: (byte_length > 0).then_some(NodeMetadata {
                byte_offset,
                byte_length,
                depth,
                object_id: None,
            }),
            properties,
        };
        let id = node.id;
        self.push(node);
        self.link(position.parent, id);
        Some(id)
    }

    /// Derived properties for encryption and signature dictionaries
    fn type_properties(&self, object: &PdfObject, node_type: NodeType, properties: &mut BTreeMap<String, String>) {
        let Some(dict) = object.as_dict() else {
            return;
        };
        match node_type {
            NodeType::Encryption => {
                if let Some(p) = dict.get_integer("P") {
                    properties.insert("permissions".to_string(), Permissions::from_p(p).describe());
                }
            }
            NodeType::Signature => {
                let file_len = self.reader.resolver().data().len();
                properties.extend(signature_properties(dict, file_len));
            }
            _ => {}
        }
    }

    fn push(&mut self, node: AstNode) {
        self.index.insert(node.id, self.nodes.len());
        self.nodes.push(node);
    }

    fn node(&self, id: NodeId) -> Option<&AstNode> {
        self.index.get(&id).map(|&i| &self.nodes[i])
    }

    /// Whether `to` is `from` or lies below it in the children index
    fn reaches(&self, from: NodeId, to: NodeId) -> bool {
        let mut seen = HashSet::from([from]);
        let mut queue = VecDeque::from([from]);
        while let Some(current) = queue.pop_front() {
            if current == to {
                return true;
            }
            for &child in self.children.get(&current).into_iter().flatten() {
                if seen.insert(child) {
                    queue.push_back(child);
                }
            }
        }
        false
    }

    fn link(&mut self, parent: NodeId, child: NodeId) {
        if parent == child {
            return;
        }
        let children = self.children.entry(parent).or_default();
        if children.contains(&child) {
            return;
        }
        children.push(child);
        self.parents.entry(child).or_default().push(parent);
    }

    fn absorb_warnings(&mut self, warnings: Vec<ValidationIssue>, node: NodeId) {
        self.diagnostics
            .extend(warnings.into_iter().map(|w| w.with_node(node)));
    }

    fn report_truncation(&mut self) {
        if self.depth_truncated > 0 {
            tracing::warn!(skipped = self.depth_truncated, "traversal depth limit reached");
            self.diagnostics.push(
                ValidationIssue::warning(
                    "TRAVERSAL_DEPTH_EXCEEDED",
                    format!(
                        "{} references lie deeper than the depth limit of {} and were not expanded",
                        self.depth_truncated, self.options.max_depth
                    ),
                )
                .with_suggestion("Raise ParseOptions::max_depth to build the full tree"),
            );
        }
        if self.budget_truncated > 0 {
            tracing::warn!(skipped = self.budget_truncated, "node budget exhausted");
            self.diagnostics.push(
                ValidationIssue::warning(
                    "TRAVERSAL_NODE_BUDGET_EXCEEDED",
                    format!(
                        "Node budget of {} exhausted, {} further objects were not expanded",
                        self.options.max_nodes, self.budget_truncated
                    ),
                )
                .with_suggestion("Raise ParseOptions::max_nodes to build the full tree"),
            );
        }
    }
}

fn render_properties(object: &PdfObject, max: usize) -> BTreeMap<String, String> {
    object
        .as_dict()
        .map(|dict| {
            dict.iter()
                .map(|(key, value)| (key.to_string(), value.render(max)))
                .collect()
        })
        .unwrap_or_default()
}

fn key_location(position: Position<'_>) -> String {
    match (position.parent_key, position.key) {
        (Some(parent), Some(key)) => format!("/{parent}/{key}"),
        (None, Some(key)) => format!("/{key}"),
        _ => "value".to_string(),
    }
}

fn truncate(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}

/// Build the document tree for an opened reader
pub(crate) fn build_document(mut reader: PdfReader<'_>, options: &ParseOptions) -> ParseResult<Document> {
    let diagnostics = reader.take_diagnostics();
    AstBuilder::new(&reader, options).build(diagnostics)
}
