//! Content trees
//!
//! Each side of a document is an arena of nodes addressed by [`NodeId`].
//! Correspondence between the two sides never relies on node ids (which
//! are per-tree) but on the identifiers carried by link and reference
//! markup.

mod content;
mod document;
mod node;

pub use content::{ContentTree, NodeSpec, TreeSpec};
pub use document::{Document, SectionCorrespondence, SourcePointers};
pub use node::{
    Highlight, LinkMarks, LinkMarkup, Node, NodeId, NodeKind, RefAnchor, RefBody, RefData,
    RefNote, SectionMarkup, Side,
};
