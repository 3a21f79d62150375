//! Text selection in the target tree
//!
//! The editing surface owns the real selection. The engine only needs to
//! read it, restore the last saved one, and replace it with new markup.

use crate::error::{EngineError, EngineResult};
use crate::tree::{ContentTree, NodeId, NodeKind};
use std::ops::Range;
use std::sync::Mutex;

/// A byte range inside one text node
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    pub node: NodeId,
    pub range: Range<usize>,
    pub text: String,
}

impl Selection {
    /// Select `range` of a text node
    pub fn in_text(tree: &ContentTree, node: NodeId, range: Range<usize>) -> EngineResult<Self> {
        let text = match &tree.node(node)?.kind {
            NodeKind::Text { text } => text,
            _ => {
                return Err(EngineError::WrongKind {
                    id: node,
                    expected: "text",
                })
            }
        };
        let selected = text
            .get(range.clone())
            .ok_or_else(|| EngineError::InvalidSelection(format!("{range:?} out of bounds")))?;
        Ok(Self {
            node,
            text: selected.to_string(),
            range,
        })
    }
}

/// Access to the editing surface's selection
pub trait SelectionProvider: Send + Sync {
    /// The current selection, if any
    fn current(&self) -> Option<Selection>;

    /// Make the last saved selection current again
    fn restore(&self);

    /// Replace the selected text with a new element
    fn replace(
        &self,
        tree: &mut ContentTree,
        selection: &Selection,
        dom_id: Option<String>,
        kind: NodeKind,
    ) -> EngineResult<NodeId> {
        tree.splice_text(selection.node, selection.range.clone(), dom_id, kind)
    }
}

/// In-memory selection, for tools and tests driving the engine directly
#[derive(Debug, Default)]
pub struct MemorySelection {
    current: Mutex<Option<Selection>>,
    saved: Mutex<Option<Selection>>,
}

impl MemorySelection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the current selection and remember it
    pub fn select(&self, selection: Selection) {
        if let Ok(mut saved) = self.saved.lock() {
            *saved = Some(selection.clone());
        }
        if let Ok(mut current) = self.current.lock() {
            *current = Some(selection);
        }
    }

    /// Drop the current selection; the saved one is kept
    pub fn clear(&self) {
        if let Ok(mut current) = self.current.lock() {
            *current = None;
        }
    }
}

impl SelectionProvider for MemorySelection {
    fn current(&self) -> Option<Selection> {
        self.current.lock().ok().and_then(|s| s.clone())
    }

    fn restore(&self) {
        let saved = self.saved.lock().ok().and_then(|s| s.clone());
        if let (Some(saved), Ok(mut current)) = (saved, self.current.lock()) {
            *current = Some(saved);
        }
    }
}

/// Whether a selection can be turned into a link or reference.
///
/// The text must be non-empty and sit inside an editable section, not
/// within a read-only element and not within an existing link.
pub fn is_valid_selection(tree: &ContentTree, selection: &Selection) -> bool {
    if selection.text.is_empty() {
        return false;
    }
    match tree.get(selection.node) {
        Some(node) if matches!(node.kind, NodeKind::Text { .. }) => {}
        _ => return false,
    }
    is_editable_position(tree, selection.node)
}

/// Whether new markup may be inserted at `node`
pub fn is_editable_position(tree: &ContentTree, node: NodeId) -> bool {
    for ancestor in tree.ancestors(node) {
        let Some(ancestor) = tree.get(ancestor) else {
            return false;
        };
        match &ancestor.kind {
            NodeKind::Link(_) => return false,
            NodeKind::Reference(anchor) if anchor.read_only => return false,
            NodeKind::Section(section) => return section.editable,
            _ => {}
        }
    }
    false
}
