//! The document model
//!
//! A [`Document`] is an arena of [`AstNode`]s addressed by [`NodeId`], with
//! structural parent/child edges kept in separate adjacency maps. Shared
//! objects (a font used by many pages) are one node with several parents.
//! The model is immutable once built; clones share the same inner data.

use super::node::{AstNode, NodeId, NodeType};
use crate::diagnostics::{SeverityCounts, ValidationIssue};
use crate::error::Result;
use crate::parser::reader::EncryptionState;
use crate::parser::{LinearizationInfo, ObjectId, PdfVersion};
use crate::validation::{self, ValidationOptions, ValidationReport};
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::Arc;

/// Summary figures computed once when the document is built
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DocumentStatistics {
    pub total_nodes: usize,
    pub nodes_by_type: BTreeMap<NodeType, usize>,
    pub version: String,
    pub diagnostics: SeverityCounts,
    pub xref_rebuilt: bool,
    /// In-use entries of the cross-reference index
    pub object_count: usize,
    pub encrypted: bool,
    /// The file opens with a linearization dictionary, intact or not
    pub linearized: bool,
    pub max_depth: usize,
}

impl DocumentStatistics {
    pub fn count(&self, node_type: NodeType) -> usize {
        self.nodes_by_type.get(&node_type).copied().unwrap_or(0)
    }
}

/// Everything the builder hands over
pub(crate) struct DocumentParts {
    pub nodes: Vec<AstNode>,
    pub root: NodeId,
    pub version: PdfVersion,
    pub children: HashMap<NodeId, Vec<NodeId>>,
    pub parents: HashMap<NodeId, Vec<NodeId>>,
    pub by_object: HashMap<u32, NodeId>,
    pub diagnostics: Vec<ValidationIssue>,
    pub encryption: EncryptionState,
    pub xref_rebuilt: bool,
    pub object_count: usize,
    pub linearization: Option<LinearizationInfo>,
}

struct DocumentInner {
    nodes: Vec<AstNode>,
    index: HashMap<NodeId, usize>,
    root: NodeId,
    version: PdfVersion,
    children: HashMap<NodeId, Vec<NodeId>>,
    parents: HashMap<NodeId, Vec<NodeId>>,
    by_type: HashMap<NodeType, Vec<NodeId>>,
    by_object: HashMap<u32, NodeId>,
    diagnostics: Vec<ValidationIssue>,
    encryption: EncryptionState,
    linearization: Option<LinearizationInfo>,
    statistics: DocumentStatistics,
}

/// A parsed document
#[derive(Clone)]
pub struct Document {
    inner: Arc<DocumentInner>,
}

impl std::fmt::Debug for Document {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Document")
            .field("version", &self.inner.version)
            .field("root", &self.inner.root)
            .field("nodes", &self.inner.nodes.len())
            .field("diagnostics", &self.inner.diagnostics.len())
            .finish()
    }
}

impl Document {
    pub(crate) fn from_parts(parts: DocumentParts) -> Self {
        let index: HashMap<NodeId, usize> = parts
            .nodes
            .iter()
            .enumerate()
            .map(|(i, node)| (node.id, i))
            .collect();

        let mut by_type: HashMap<NodeType, Vec<NodeId>> = HashMap::new();
        let mut histogram = BTreeMap::new();
        let mut max_depth = 0;
        for node in &parts.nodes {
            by_type.entry(node.node_type).or_default().push(node.id);
            *histogram.entry(node.node_type).or_insert(0) += 1;
            max_depth = max_depth.max(node.depth());
        }

        let statistics = DocumentStatistics {
            total_nodes: parts.nodes.len(),
            nodes_by_type: histogram,
            version: parts.version.to_string(),
            diagnostics: SeverityCounts::from_issues(&parts.diagnostics),
            xref_rebuilt: parts.xref_rebuilt,
            object_count: parts.object_count,
            encrypted: parts.encryption.is_encrypted(),
            linearized: parts.linearization.is_some(),
            max_depth,
        };

        Self {
            inner: Arc::new(DocumentInner {
                nodes: parts.nodes,
                index,
                root: parts.root,
                version: parts.version,
                children: parts.children,
                parents: parts.parents,
                by_type,
                by_object: parts.by_object,
                diagnostics: parts.diagnostics,
                encryption: parts.encryption,
                linearization: parts.linearization,
                statistics,
            }),
        }
    }

    /// The catalog node
    pub fn root(&self) -> &AstNode {
        // The builder always creates the root first
        &self.inner.nodes[self.inner.index[&self.inner.root]]
    }

    pub fn root_id(&self) -> NodeId {
        self.inner.root
    }

    pub fn node(&self, id: NodeId) -> Option<&AstNode> {
        self.inner.index.get(&id).map(|&i| &self.inner.nodes[i])
    }

    /// Child ids in discovery order
    pub fn child_ids(&self, id: NodeId) -> &[NodeId] {
        self.inner.children.get(&id).map_or(&[], Vec::as_slice)
    }

    pub fn children(&self, id: NodeId) -> Vec<&AstNode> {
        self.child_ids(id).iter().filter_map(|&c| self.node(c)).collect()
    }

    /// Parent ids; the first is the parent the node was discovered from
    pub fn parent_ids(&self, id: NodeId) -> &[NodeId] {
        self.inner.parents.get(&id).map_or(&[], Vec::as_slice)
    }

    pub fn parents(&self, id: NodeId) -> Vec<&AstNode> {
        self.parent_ids(id).iter().filter_map(|&p| self.node(p)).collect()
    }

    pub fn nodes_by_type(&self, node_type: NodeType) -> Vec<&AstNode> {
        self.inner
            .by_type
            .get(&node_type)
            .map(|ids| ids.iter().filter_map(|&id| self.node(id)).collect())
            .unwrap_or_default()
    }

    /// Nodes of any of the font types
    pub fn fonts(&self) -> Vec<&AstNode> {
        self.inner.nodes.iter().filter(|n| n.node_type.is_font()).collect()
    }

    /// All nodes in breadth-first discovery order
    pub fn all_nodes(&self) -> &[AstNode] {
        &self.inner.nodes
    }

    pub fn statistics(&self) -> &DocumentStatistics {
        &self.inner.statistics
    }

    /// The node built for an indirect object
    pub fn node_for_object(&self, id: ObjectId) -> Option<&AstNode> {
        let node = self.node(*self.inner.by_object.get(&id.number)?)?;
        (node.object_id() == Some(id)).then_some(node)
    }

    /// The node a reference-valued property of `node` points at
    pub fn referenced(&self, node: &AstNode, key: &str) -> Option<&AstNode> {
        let id = node.property_reference(key)?;
        self.inner
            .by_object
            .get(&id.number)
            .and_then(|&n| self.node(n))
    }

    /// Every node reachable from `id` (excluding it), each once
    pub fn descendants(&self, id: NodeId) -> Vec<&AstNode> {
        let mut seen = HashSet::from([id]);
        let mut queue: VecDeque<NodeId> = self.child_ids(id).iter().copied().collect();
        let mut out = Vec::new();
        while let Some(next) = queue.pop_front() {
            if !seen.insert(next) {
                continue;
            }
            if let Some(node) = self.node(next) {
                out.push(node);
            }
            queue.extend(self.child_ids(next).iter().copied());
        }
        out
    }

    /// Diagnostics recorded while parsing
    pub fn diagnostics(&self) -> &[ValidationIssue] {
        &self.inner.diagnostics
    }

    pub fn version(&self) -> PdfVersion {
        self.inner.version
    }

    pub fn encryption(&self) -> &EncryptionState {
        &self.inner.encryption
    }

    pub fn linearization(&self) -> Option<&LinearizationInfo> {
        self.inner.linearization.as_ref()
    }

    /// Deepest node depth below the catalog
    pub fn max_depth(&self) -> usize {
        self.inner.statistics.max_depth
    }

    /// Validate against a registered schema
    pub fn validate(&self, schema: &str) -> Result<ValidationReport> {
        validation::validate(self, schema, &ValidationOptions::default())
    }

    pub fn validate_with_options(&self, schema: &str, options: &ValidationOptions) -> Result<ValidationReport> {
        validation::validate(self, schema, options)
    }
}
