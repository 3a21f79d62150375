//! A working unit: a source tree and its derived target tree

use super::content::ContentTree;
use super::node::{NodeId, Side};
use serde::{Deserialize, Serialize};

/// The two trees of one translation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub source: ContentTree,
    pub target: ContentTree,
}

impl Document {
    pub fn new(source: ContentTree, target: ContentTree) -> Self {
        Self { source, target }
    }

    /// Empty trees for a language pair
    pub fn empty(source_language: &str, target_language: &str) -> Self {
        Self::new(
            ContentTree::new(source_language),
            ContentTree::new(target_language),
        )
    }

    pub fn tree(&self, side: Side) -> &ContentTree {
        match side {
            Side::Source => &self.source,
            Side::Target => &self.target,
        }
    }

    pub fn tree_mut(&mut self, side: Side) -> &mut ContentTree {
        match side {
            Side::Source => &mut self.source,
            Side::Target => &mut self.target,
        }
    }

    /// Load from JSON
    pub fn from_json(json: &str) -> crate::error::EngineResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Serialize to pretty JSON
    pub fn to_json(&self) -> crate::error::EngineResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Maps a target section to the source section it was generated from
///
/// The mapping is supplied by the editing surface; the engine never
/// computes it. `None` means the section was authored by hand.
pub trait SectionCorrespondence: Send + Sync {
    fn source_section(&self, document: &Document, target_section: NodeId) -> Option<NodeId>;
}

/// Reads the pointer stored on the target section markup
#[derive(Debug, Clone, Copy, Default)]
pub struct SourcePointers;

impl SectionCorrespondence for SourcePointers {
    fn source_section(&self, document: &Document, target_section: NodeId) -> Option<NodeId> {
        let source_id = document
            .target
            .get(target_section)?
            .as_section()?
            .source
            .as_deref()?;
        document.source.by_dom_id(source_id)
    }
}
