//! ContentTree: an arena of nodes for one side of a document

use super::node::{LinkMarkup, Node, NodeId, NodeKind, RefAnchor};
use crate::error::{EngineError, EngineResult};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::ops::Range;

/// Nested, serializable form of a node and its subtree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(flatten)]
    pub kind: NodeKind,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<NodeSpec>,
}

impl NodeSpec {
    pub fn new(kind: NodeKind) -> Self {
        Self {
            id: None,
            kind,
            children: Vec::new(),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_child(mut self, child: NodeSpec) -> Self {
        self.children.push(child);
        self
    }

    pub fn with_text(self, text: impl Into<String>) -> Self {
        self.with_child(NodeSpec::new(NodeKind::text(text)))
    }
}

/// Serializable form of a whole tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreeSpec {
    pub language: String,
    #[serde(default)]
    pub nodes: Vec<NodeSpec>,
}

/// One side of a document: an ordered forest of sections
///
/// Nodes live in an arena and are addressed by [`NodeId`]. Removed nodes
/// leave a tombstone so ids are never reused within a tree. Element ids
/// (`dom_id`) are unique and indexed.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "TreeSpec", into = "TreeSpec")]
pub struct ContentTree {
    language: String,
    nodes: Vec<Option<Node>>,
    roots: Vec<NodeId>,
    dom_index: HashMap<String, NodeId>,
}

impl ContentTree {
    /// Create an empty tree for a language
    pub fn new(language: impl Into<String>) -> Self {
        Self {
            language: language.into(),
            nodes: Vec::new(),
            roots: Vec::new(),
            dom_index: HashMap::new(),
        }
    }

    /// Build a tree from nested specs
    pub fn from_specs(language: impl Into<String>, specs: Vec<NodeSpec>) -> EngineResult<Self> {
        let mut tree = Self::new(language);
        for spec in specs {
            tree.insert_spec(None, spec)?;
        }
        Ok(tree)
    }

    fn insert_spec(&mut self, parent: Option<NodeId>, spec: NodeSpec) -> EngineResult<NodeId> {
        let id = self.append(parent, spec.id, spec.kind)?;
        for child in spec.children {
            self.insert_spec(Some(id), child)?;
        }
        Ok(id)
    }

    /// Nested form of the subtree rooted at `id`
    pub fn to_spec(&self, id: NodeId) -> Option<NodeSpec> {
        let node = self.get(id)?;
        Some(NodeSpec {
            id: node.dom_id.clone(),
            kind: node.kind.clone(),
            children: node
                .children
                .iter()
                .filter_map(|child| self.to_spec(*child))
                .collect(),
        })
    }

    pub fn language(&self) -> &str {
        &self.language
    }

    /// Number of live nodes
    pub fn len(&self) -> usize {
        self.nodes.iter().filter(|n| n.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }

    pub fn roots(&self) -> &[NodeId] {
        &self.roots
    }

    pub fn get(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.index()).and_then(Option::as_ref)
    }

    pub fn get_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(id.index()).and_then(Option::as_mut)
    }

    /// Like [`get`](Self::get) but an error when absent
    pub fn node(&self, id: NodeId) -> EngineResult<&Node> {
        self.get(id).ok_or(EngineError::NodeNotFound(id))
    }

    /// Look a node up by element id
    pub fn by_dom_id(&self, dom_id: &str) -> Option<NodeId> {
        self.dom_index.get(dom_id).copied()
    }

    /// Allocate a node and attach it as the last child of `parent`
    /// (or as the last root)
    pub fn append(
        &mut self,
        parent: Option<NodeId>,
        dom_id: Option<String>,
        kind: NodeKind,
    ) -> EngineResult<NodeId> {
        if let Some(parent) = parent {
            self.node(parent)?;
        }
        let id = self.alloc(parent, dom_id, kind)?;
        match parent {
            Some(parent) => {
                if let Some(p) = self.get_mut(parent) {
                    p.children.push(id);
                }
            }
            None => self.roots.push(id),
        }
        Ok(id)
    }

    fn alloc(
        &mut self,
        parent: Option<NodeId>,
        dom_id: Option<String>,
        kind: NodeKind,
    ) -> EngineResult<NodeId> {
        let id = NodeId::from_index(self.nodes.len());
        if let Some(dom) = &dom_id {
            if self.dom_index.contains_key(dom) {
                return Err(EngineError::DuplicateId(dom.clone()));
            }
            self.dom_index.insert(dom.clone(), id);
        }
        self.nodes.push(Some(Node {
            id,
            dom_id,
            kind,
            parent,
            children: Vec::new(),
        }));
        Ok(id)
    }

    /// Change a node's element id
    pub fn set_dom_id(&mut self, id: NodeId, dom_id: Option<String>) -> EngineResult<()> {
        let current = self.node(id)?.dom_id.clone();
        if current == dom_id {
            return Ok(());
        }
        if let Some(new) = &dom_id {
            if self.dom_index.contains_key(new) {
                return Err(EngineError::DuplicateId(new.clone()));
            }
        }
        if let Some(old) = current {
            self.dom_index.remove(&old);
        }
        if let Some(new) = &dom_id {
            self.dom_index.insert(new.clone(), id);
        }
        if let Some(node) = self.get_mut(id) {
            node.dom_id = dom_id;
        }
        Ok(())
    }

    /// Parent chain from the node's parent up to its root
    pub fn ancestors(&self, id: NodeId) -> Vec<NodeId> {
        let mut chain = Vec::new();
        let mut current = self.get(id).and_then(|n| n.parent);
        while let Some(parent) = current {
            chain.push(parent);
            current = self.get(parent).and_then(|n| n.parent);
        }
        chain
    }

    /// Preorder walk of the subtree under `id`, excluding `id` itself
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack: Vec<NodeId> = match self.get(id) {
            Some(node) => node.children.iter().rev().copied().collect(),
            None => return out,
        };
        while let Some(next) = stack.pop() {
            if let Some(node) = self.get(next) {
                out.push(next);
                stack.extend(node.children.iter().rev().copied());
            }
        }
        out
    }

    /// Preorder walk of the whole tree
    pub fn walk(&self) -> Vec<NodeId> {
        let mut out = Vec::new();
        for root in &self.roots {
            out.push(*root);
            out.extend(self.descendants(*root));
        }
        out
    }

    /// The nearest section containing `id` (itself included)
    pub fn section_of(&self, id: NodeId) -> Option<NodeId> {
        std::iter::once(id)
            .chain(self.ancestors(id))
            .find(|n| self.get(*n).is_some_and(|node| node.as_section().is_some()))
    }

    /// All top-level sections
    pub fn sections(&self) -> Vec<NodeId> {
        self.roots
            .iter()
            .copied()
            .filter(|id| self.get(*id).is_some_and(|n| n.as_section().is_some()))
            .collect()
    }

    /// Links under `id`, in document order
    pub fn links_under(&self, id: NodeId) -> Vec<NodeId> {
        self.descendants(id)
            .into_iter()
            .filter(|n| self.get(*n).is_some_and(|node| node.as_link().is_some()))
            .collect()
    }

    /// Reference anchors under `id`, in document order
    pub fn references_under(&self, id: NodeId) -> Vec<NodeId> {
        self.descendants(id)
            .into_iter()
            .filter(|n| self.get(*n).is_some_and(|node| node.as_reference().is_some()))
            .collect()
    }

    /// All reference-list containers
    pub fn reference_lists(&self) -> Vec<NodeId> {
        self.walk()
            .into_iter()
            .filter(|n| {
                self.get(*n)
                    .is_some_and(|node| matches!(node.kind, NodeKind::ReferenceList { .. }))
            })
            .collect()
    }

    /// Notes inside reference lists whose back-references include `anchor_id`
    pub fn notes_citing(&self, anchor_id: &str) -> Vec<NodeId> {
        self.reference_lists()
            .into_iter()
            .flat_map(|list| self.descendants(list))
            .filter(|n| {
                self.get(*n)
                    .and_then(Node::as_note)
                    .is_some_and(|note| note.backrefs.iter().any(|b| b == anchor_id))
            })
            .collect()
    }

    /// Concatenated text of the subtree
    pub fn text_content(&self, id: NodeId) -> String {
        std::iter::once(id)
            .chain(self.descendants(id))
            .filter_map(|n| match self.get(n).map(|node| &node.kind) {
                Some(NodeKind::Text { text }) => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }

    pub fn link(&self, id: NodeId) -> EngineResult<&LinkMarkup> {
        self.node(id)?.as_link().ok_or(EngineError::WrongKind {
            id,
            expected: "link",
        })
    }

    pub fn link_mut(&mut self, id: NodeId) -> EngineResult<&mut LinkMarkup> {
        match self.get_mut(id).map(|n| &mut n.kind) {
            Some(NodeKind::Link(link)) => Ok(link),
            Some(_) => Err(EngineError::WrongKind {
                id,
                expected: "link",
            }),
            None => Err(EngineError::NodeNotFound(id)),
        }
    }

    pub fn reference(&self, id: NodeId) -> EngineResult<&RefAnchor> {
        self.node(id)?.as_reference().ok_or(EngineError::WrongKind {
            id,
            expected: "reference",
        })
    }

    pub fn reference_mut(&mut self, id: NodeId) -> EngineResult<&mut RefAnchor> {
        match self.get_mut(id).map(|n| &mut n.kind) {
            Some(NodeKind::Reference(anchor)) => Ok(anchor),
            Some(_) => Err(EngineError::WrongKind {
                id,
                expected: "reference",
            }),
            None => Err(EngineError::NodeNotFound(id)),
        }
    }

    /// Detach and delete the subtree rooted at `id`
    pub fn remove(&mut self, id: NodeId) -> EngineResult<()> {
        let parent = self.node(id)?.parent;
        match parent.and_then(|p| self.get_mut(p)) {
            Some(p) => p.children.retain(|c| *c != id),
            None => self.roots.retain(|r| *r != id),
        }
        let mut doomed = vec![id];
        doomed.extend(self.descendants(id));
        for n in doomed {
            if let Some(node) = self.nodes.get_mut(n.index()).and_then(Option::take) {
                if let Some(dom) = node.dom_id {
                    self.dom_index.remove(&dom);
                }
            }
        }
        Ok(())
    }

    /// Replace an element by a text node holding its text content
    pub fn unwrap_to_text(&mut self, id: NodeId) -> EngineResult<NodeId> {
        let text = self.text_content(id);
        let parent = self.node(id)?.parent;
        let replacement = self.alloc(parent, None, NodeKind::text(text))?;
        let siblings = match parent {
            Some(p) => &mut self.get_mut(p).ok_or(EngineError::NodeNotFound(p))?.children,
            None => &mut self.roots,
        };
        if let Some(pos) = siblings.iter().position(|c| *c == id) {
            siblings[pos] = replacement;
        }
        // Detached already; drop the subtree without touching the parent.
        if let Some(node) = self.get_mut(id) {
            node.parent = None;
        }
        let mut doomed = vec![id];
        doomed.extend(self.descendants(id));
        for n in doomed {
            if let Some(node) = self.nodes.get_mut(n.index()).and_then(Option::take) {
                if let Some(dom) = node.dom_id {
                    self.dom_index.remove(&dom);
                }
            }
        }
        Ok(replacement)
    }

    /// Replace a byte range of a text node with a new element.
    ///
    /// The text node is split around the range; empty halves are dropped.
    /// Returns the id of the inserted element.
    pub fn splice_text(
        &mut self,
        text_node: NodeId,
        range: Range<usize>,
        dom_id: Option<String>,
        kind: NodeKind,
    ) -> EngineResult<NodeId> {
        let node = self.node(text_node)?;
        let text = match &node.kind {
            NodeKind::Text { text } => text.clone(),
            _ => {
                return Err(EngineError::WrongKind {
                    id: text_node,
                    expected: "text",
                })
            }
        };
        let parent = node.parent.ok_or_else(|| {
            EngineError::InvalidSelection("text outside of any element".to_string())
        })?;
        if range.start > range.end
            || range.end > text.len()
            || !text.is_char_boundary(range.start)
            || !text.is_char_boundary(range.end)
        {
            return Err(EngineError::InvalidSelection(format!(
                "range {}..{} does not fit text of length {}",
                range.start,
                range.end,
                text.len()
            )));
        }

        let pos = self
            .node(parent)?
            .children
            .iter()
            .position(|c| *c == text_node)
            .ok_or(EngineError::NodeNotFound(text_node))?;

        let before = &text[..range.start];
        let after = &text[range.end..];

        // Only the element can fail (duplicate id), so it goes first.
        let inserted = self.alloc(Some(parent), dom_id, kind)?;
        let mut replacement = Vec::with_capacity(3);
        if !before.is_empty() {
            replacement.push(self.alloc(Some(parent), None, NodeKind::text(before))?);
        }
        replacement.push(inserted);
        if !after.is_empty() {
            replacement.push(self.alloc(Some(parent), None, NodeKind::text(after))?);
        }

        self.get_mut(parent)
            .ok_or(EngineError::NodeNotFound(parent))?
            .children
            .splice(pos..=pos, replacement);
        if let Some(dom) = self.nodes[text_node.index()].take().and_then(|n| n.dom_id) {
            self.dom_index.remove(&dom);
        }
        Ok(inserted)
    }

    /// Copy a subtree from another tree, attaching it under `parent`.
    ///
    /// Element ids are rewritten with `rename`; returns the new root.
    pub fn import_subtree(
        &mut self,
        from: &ContentTree,
        root: NodeId,
        parent: Option<NodeId>,
        rename: &dyn Fn(&str) -> String,
    ) -> EngineResult<NodeId> {
        let source = from.node(root)?;
        let copy = self.append(
            parent,
            source.dom_id.as_deref().map(rename),
            source.kind.clone(),
        )?;
        for child in &source.children {
            self.import_subtree(from, *child, Some(copy), rename)?;
        }
        Ok(copy)
    }

    /// Clear highlight marks from every link
    pub fn clear_highlights(&mut self) {
        for node in self.nodes.iter_mut().flatten() {
            if let NodeKind::Link(link) = &mut node.kind {
                link.marks.highlight = None;
            }
        }
    }
}

impl TryFrom<TreeSpec> for ContentTree {
    type Error = EngineError;

    fn try_from(spec: TreeSpec) -> Result<Self, Self::Error> {
        ContentTree::from_specs(spec.language, spec.nodes)
    }
}

impl From<ContentTree> for TreeSpec {
    fn from(tree: ContentTree) -> Self {
        TreeSpec {
            language: tree.language.clone(),
            nodes: tree
                .roots
                .iter()
                .filter_map(|root| tree.to_spec(*root))
                .collect(),
        }
    }
}
