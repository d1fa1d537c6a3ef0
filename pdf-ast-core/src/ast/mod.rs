//! Typed document tree built from the PDF object graph

pub(crate) mod builder;
pub mod classify;
pub mod document;
pub mod node;
pub mod signature;

pub use classify::{classify, ReachContext};
pub use document::{Document, DocumentStatistics};
pub use node::{parse_reference, scan_references, AstNode, NodeId, NodeMetadata, NodeType};
pub use signature::{inspect_byte_range, ByteRangeCoverage, ByteRangeStatus};
