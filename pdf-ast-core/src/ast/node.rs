//! AST node types and metadata

use crate::parser::ObjectId;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_NODE_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique node identifier; never reused
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct NodeId(u64);

impl NodeId {
    pub(crate) fn next() -> Self {
        Self(NEXT_NODE_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn value(self) -> u64 {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Classification of a node
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum NodeType {
    Catalog,
    Pages,
    Page,
    ContentStream,
    Font,
    Type1Font,
    TrueTypeFont,
    Type3Font,
    Image,
    Annotation,
    Outline,
    Action,
    Encryption,
    Metadata,
    Structure,
    Form,
    Signature,
    JavaScript,
    Multimedia,
    ColorSpace,
    Pattern,
    Shading,
    XObject,
    EmbeddedFile,
    Other,
}

const ALL_NODE_TYPES: [NodeType; 25] = [
    NodeType::Catalog,
    NodeType::Pages,
    NodeType::Page,
    NodeType::ContentStream,
    NodeType::Font,
    NodeType::Type1Font,
    NodeType::TrueTypeFont,
    NodeType::Type3Font,
    NodeType::Image,
    NodeType::Annotation,
    NodeType::Outline,
    NodeType::Action,
    NodeType::Encryption,
    NodeType::Metadata,
    NodeType::Structure,
    NodeType::Form,
    NodeType::Signature,
    NodeType::JavaScript,
    NodeType::Multimedia,
    NodeType::ColorSpace,
    NodeType::Pattern,
    NodeType::Shading,
    NodeType::XObject,
    NodeType::EmbeddedFile,
    NodeType::Other,
];

impl NodeType {
    /// Every node type, in declaration order
    pub fn all() -> &'static [NodeType] {
        &ALL_NODE_TYPES
    }

    pub fn name(self) -> &'static str {
        match self {
            NodeType::Catalog => "Catalog",
            NodeType::Pages => "Pages",
            NodeType::Page => "Page",
            NodeType::ContentStream => "ContentStream",
            NodeType::Font => "Font",
            NodeType::Type1Font => "Type1Font",
            NodeType::TrueTypeFont => "TrueTypeFont",
            NodeType::Type3Font => "Type3Font",
            NodeType::Image => "Image",
            NodeType::Annotation => "Annotation",
            NodeType::Outline => "Outline",
            NodeType::Action => "Action",
            NodeType::Encryption => "Encryption",
            NodeType::Metadata => "Metadata",
            NodeType::Structure => "Structure",
            NodeType::Form => "Form",
            NodeType::Signature => "Signature",
            NodeType::JavaScript => "JavaScript",
            NodeType::Multimedia => "Multimedia",
            NodeType::ColorSpace => "ColorSpace",
            NodeType::Pattern => "Pattern",
            NodeType::Shading => "Shading",
            NodeType::XObject => "XObject",
            NodeType::EmbeddedFile => "EmbeddedFile",
            NodeType::Other => "Other",
        }
    }

    /// Any of the font node types
    pub fn is_font(self) -> bool {
        matches!(
            self,
            NodeType::Font | NodeType::Type1Font | NodeType::TrueTypeFont | NodeType::Type3Font
        )
    }
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for NodeType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ALL_NODE_TYPES
            .iter()
            .copied()
            .find(|t| t.name() == s)
            .ok_or_else(|| format!("unknown node type: {s}"))
    }
}

/// Where a node came from in the source buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct NodeMetadata {
    /// Offset of the indirect object that holds this node
    pub byte_offset: usize,
    pub byte_length: usize,
    /// Breadth-first distance from the catalog
    pub depth: usize,
    /// Set for nodes that are indirect objects themselves
    pub object_id: Option<ObjectId>,
}

impl NodeMetadata {
    /// The byte range `[offset, offset + length)`
    pub fn byte_range(&self) -> std::ops::Range<usize> {
        self.byte_offset..self.byte_offset + self.byte_length
    }
}

/// A node of the document tree
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AstNode {
    pub id: NodeId,
    pub node_type: NodeType,
    /// Bounded PDF-syntax rendering of the underlying value
    pub value: String,
    pub metadata: Option<NodeMetadata>,
    pub properties: BTreeMap<String, String>,
}

impl AstNode {
    pub fn property(&self, key: &str) -> Option<&str> {
        self.properties.get(key).map(String::as_str)
    }

    pub fn has_property(&self, key: &str) -> bool {
        self.properties.contains_key(key)
    }

    pub fn object_id(&self) -> Option<ObjectId> {
        self.metadata.and_then(|m| m.object_id)
    }

    pub fn depth(&self) -> usize {
        self.metadata.map_or(0, |m| m.depth)
    }

    /// A name-valued property without its leading slash
    pub fn property_name(&self, key: &str) -> Option<&str> {
        self.property(key)?.strip_prefix('/')
    }

    /// A string-valued property without delimiters or escapes
    pub fn property_text(&self, key: &str) -> Option<String> {
        let raw = self.property(key)?;
        let inner = raw.strip_prefix('(')?;
        let inner = inner.strip_suffix(')').unwrap_or(inner);
        let mut text = String::with_capacity(inner.len());
        let mut chars = inner.chars();
        while let Some(c) = chars.next() {
            match c {
                '\\' => text.extend(chars.next()),
                c => text.push(c),
            }
        }
        Some(text)
    }

    /// The object a property like `"5 0 R"` refers to
    pub fn property_reference(&self, key: &str) -> Option<ObjectId> {
        parse_reference(self.property(key)?)
    }

    /// All references in a property such as `"[3 0 R 7 0 R]"`
    pub fn property_references(&self, key: &str) -> Vec<ObjectId> {
        self.property(key).map(scan_references).unwrap_or_default()
    }
}

/// Parse a rendered reference `n g R`
pub fn parse_reference(text: &str) -> Option<ObjectId> {
    let mut parts = text.split_whitespace();
    let number = parts.next()?.parse().ok()?;
    let generation = parts.next()?.parse().ok()?;
    (parts.next()? == "R" && parts.next().is_none()).then(|| ObjectId::new(number, generation))
}

/// Every `n g R` triple inside a rendered value
pub fn scan_references(text: &str) -> Vec<ObjectId> {
    let tokens: Vec<&str> = text
        .split(|c: char| c.is_whitespace() || "[]<>".contains(c))
        .filter(|t| !t.is_empty())
        .collect();
    tokens
        .windows(3)
        .filter(|w| w[2] == "R")
        .filter_map(|w| Some(ObjectId::new(w[0].parse().ok()?, w[1].parse().ok()?)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_ids_are_unique_and_increasing() {
        let a = NodeId::next();
        let b = NodeId::next();
        assert!(b > a);
        assert_ne!(a, b);
    }

    #[test]
    fn test_node_type_round_trip_names() {
        assert_eq!(NodeType::all().len(), 25);
        for t in NodeType::all() {
            assert_eq!(t.name().parse::<NodeType>(), Ok(*t));
        }
        assert!("Nope".parse::<NodeType>().is_err());
        assert!(NodeType::TrueTypeFont.is_font());
        assert!(!NodeType::Image.is_font());
    }

    #[test]
    fn test_reference_parsing() {
        assert_eq!(parse_reference("5 0 R"), Some(ObjectId::new(5, 0)));
        assert_eq!(parse_reference("5 0"), None);
        assert_eq!(parse_reference("/Name"), None);
        assert_eq!(
            scan_references("[3 0 R 7 1 R 42]"),
            vec![ObjectId::new(3, 0), ObjectId::new(7, 1)]
        );
        assert_eq!(
            scan_references("<< /F1 5 0 R >>"),
            vec![ObjectId::new(5, 0)]
        );
    }
}
