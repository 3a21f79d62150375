//! Node representation in a content tree

use serde::{Deserialize, Serialize};

/// Index of a node in its tree's arena
///
/// Only meaningful for the tree that allocated it; the two trees of a
/// document have independent id spaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(usize);

impl NodeId {
    pub(crate) fn from_index(index: usize) -> Self {
        Self(index)
    }

    /// Position in the arena
    pub fn index(&self) -> usize {
        self.0
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Which of the two trees of a document a node or entity belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Source,
    Target,
}

impl Side {
    /// The other tree
    pub fn opposite(self) -> Side {
        match self {
            Side::Source => Side::Target,
            Side::Target => Side::Source,
        }
    }
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Side::Source => write!(f, "source"),
            Side::Target => write!(f, "target"),
        }
    }
}

/// Selection highlight on a link
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Highlight {
    /// The link the user selected
    Primary,
    /// Its counterpart in the other tree
    Secondary,
}

/// Adaptation marks carried by link markup
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkMarks {
    /// Link has already been through target-side adaptation
    pub target_link: bool,
    /// No counterpart title exists; converted to plain text on publish
    pub unadapted: bool,
    /// Deliberately points at a page that does not exist
    pub red_link: bool,
    /// Adapted title does not exist in the target language
    pub missing_article: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub highlight: Option<Highlight>,
}

/// A wiki link
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkMarkup {
    /// Correspondence identifier (marked with the tree prefix on the target side)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link_id: Option<String>,
    /// Title of the page the link points at
    pub title: String,
    /// Link destination
    pub href: String,
    #[serde(default)]
    pub marks: LinkMarks,
}

impl LinkMarkup {
    pub fn new(title: impl Into<String>) -> Self {
        let title = title.into();
        Self {
            link_id: None,
            href: title.clone(),
            title,
            marks: LinkMarks::default(),
        }
    }

    pub fn with_id(mut self, link_id: impl Into<String>) -> Self {
        self.link_id = Some(link_id.into());
        self
    }
}

/// Where a footnote's content lives
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RefBody {
    /// Inline markup of the footnote
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub html: Option<String>,
    /// Element id of the reference-list entry holding the markup
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

/// Structured data attached to a reference anchor
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RefData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<RefBody>,
    /// Annotations for content the template filter has already rewritten
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub annotations: Option<serde_json::Value>,
}

impl RefData {
    pub fn with_html(html: impl Into<String>) -> Self {
        Self {
            body: Some(RefBody {
                html: Some(html.into()),
                id: None,
            }),
            annotations: None,
        }
    }

    pub fn with_body_id(id: impl Into<String>) -> Self {
        Self {
            body: Some(RefBody {
                html: None,
                id: Some(id.into()),
            }),
            annotations: None,
        }
    }

    /// True when this anchor carries the footnote payload
    pub fn has_body(&self) -> bool {
        self.body.is_some()
    }
}

/// A footnote anchor in running text
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RefAnchor {
    /// Carries the reference marker; anchors without it are never trusted
    #[serde(default)]
    pub is_reference: bool,
    /// Visible label, e.g. `[1]`
    #[serde(default)]
    pub label: String,
    /// Element id of the source anchor this one was copied from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<RefData>,
    #[serde(default)]
    pub read_only: bool,
}

impl RefAnchor {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            is_reference: true,
            label: label.into(),
            ..Default::default()
        }
    }

    pub fn with_data(mut self, data: RefData) -> Self {
        self.data = Some(data);
        self
    }
}

/// An entry of a reference list
///
/// `backrefs` lists the element ids of every anchor citing this note, in
/// document order. Only one of those anchors carries the payload.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RefNote {
    #[serde(default)]
    pub backrefs: Vec<String>,
    /// Rendered footnote markup
    #[serde(default)]
    pub content: String,
    /// Element id of the content element, targeted by `RefBody::id`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_id: Option<String>,
    /// Annotations rewritten by the template filter
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub annotations: Option<serde_json::Value>,
}

/// A top-level section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SectionMarkup {
    /// Element id of the source section this one was generated from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    /// Restored from a saved draft; already adapted
    #[serde(default)]
    pub restored: bool,
    #[serde(default = "default_editable")]
    pub editable: bool,
}

fn default_editable() -> bool {
    true
}

impl SectionMarkup {
    pub fn new() -> Self {
        Self {
            source: None,
            restored: false,
            editable: true,
        }
    }

    pub fn from_source(source: impl Into<String>) -> Self {
        Self {
            source: Some(source.into()),
            ..Self::new()
        }
    }
}

impl Default for SectionMarkup {
    fn default() -> Self {
        Self::new()
    }
}

/// Node classification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NodeKind {
    Section(SectionMarkup),
    /// Any other element (paragraph, span, list item…)
    Element { tag: String },
    Text { text: String },
    Link(LinkMarkup),
    Reference(RefAnchor),
    ReferenceList {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        data: Option<serde_json::Value>,
    },
    Note(RefNote),
}

impl NodeKind {
    pub fn text(text: impl Into<String>) -> Self {
        NodeKind::Text { text: text.into() }
    }

    pub fn element(tag: impl Into<String>) -> Self {
        NodeKind::Element { tag: tag.into() }
    }

    /// Short name used in error messages
    pub fn name(&self) -> &'static str {
        match self {
            NodeKind::Section(_) => "section",
            NodeKind::Element { .. } => "element",
            NodeKind::Text { .. } => "text",
            NodeKind::Link(_) => "link",
            NodeKind::Reference(_) => "reference",
            NodeKind::ReferenceList { .. } => "reference list",
            NodeKind::Note(_) => "note",
        }
    }
}

/// A node in a content tree
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub id: NodeId,
    /// Element id attribute, unique within the tree
    pub dom_id: Option<String>,
    pub kind: NodeKind,
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
}

impl Node {
    pub fn as_link(&self) -> Option<&LinkMarkup> {
        match &self.kind {
            NodeKind::Link(link) => Some(link),
            _ => None,
        }
    }

    pub fn as_reference(&self) -> Option<&RefAnchor> {
        match &self.kind {
            NodeKind::Reference(anchor) => Some(anchor),
            _ => None,
        }
    }

    pub fn as_section(&self) -> Option<&SectionMarkup> {
        match &self.kind {
            NodeKind::Section(section) => Some(section),
            _ => None,
        }
    }

    pub fn as_note(&self) -> Option<&RefNote> {
        match &self.kind {
            NodeKind::Note(note) => Some(note),
            _ => None,
        }
    }
}
