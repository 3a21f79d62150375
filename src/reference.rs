//! Reference entities: footnote anchors and their content
//!
//! A footnote cited N times yields N anchors in the source tree, and only
//! one of them carries the footnote payload. Which one is not fixed, so
//! resolution scans every anchor listed by the footnote's reference-list
//! entry and takes the first that has a body.
//!
//! Anchors that do not carry the reference marker are never trusted: their
//! data is ignored and the lookup fails closed.

use crate::adapt::{AdaptationEvent, SectionKind};
use crate::card::{ReferenceAffordance, ReferenceCard};
use crate::error::{EngineError, EngineResult};
use crate::registry::Identifier;
use crate::selection::{is_editable_position, SelectionProvider};
use crate::session::Session;
use crate::tree::{ContentTree, Document, NodeId, NodeKind, RefData, SectionMarkup, Side};
use serde::Serialize;
use tracing::{debug, warn};

/// Adaptation state of a reference
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferenceState {
    NotAdapted,
    Adapted,
}

/// One footnote anchor occurrence
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReferenceEntity {
    pub id: Identifier,
    pub side: Side,
    /// Anchor node in the tree of `side`; `None` for a detached entity
    pub node: Option<NodeId>,
    /// Visible label, e.g. `[1]`
    pub label: String,
    /// Resolved footnote markup, shared by every anchor citing the footnote
    pub content: Option<String>,
    pub state: ReferenceState,
}

impl ReferenceEntity {
    pub fn is_detached(&self) -> bool {
        self.node.is_none()
    }
}

/// Element ids of every anchor citing the same footnote as `anchor_id`,
/// in reference-list order. An anchor no list mentions is its own group.
pub fn sibling_group(tree: &ContentTree, anchor_id: &str) -> Vec<String> {
    let mut group: Vec<String> = Vec::new();
    for note in tree.notes_citing(anchor_id) {
        if let Some(note) = tree.get(note).and_then(|n| n.as_note()) {
            for backref in &note.backrefs {
                if !group.contains(backref) {
                    group.push(backref.clone());
                }
            }
        }
    }
    if group.is_empty() {
        group.push(anchor_id.to_string());
    }
    group
}

/// Label shown for an anchor: its text, or the label field when it has none
fn anchor_label(tree: &ContentTree, node: NodeId) -> String {
    let text = tree.text_content(node);
    if !text.is_empty() {
        return text;
    }
    tree.reference(node)
        .map(|anchor| anchor.label.clone())
        .unwrap_or_default()
}

/// Reference operations scoped to a session
pub struct ReferenceTool<'a> {
    session: &'a Session,
}

impl<'a> ReferenceTool<'a> {
    pub fn new(session: &'a Session) -> Self {
        Self { session }
    }

    pub fn get(&self, id: &Identifier, side: Side) -> Option<ReferenceEntity> {
        self.session.reference_registry().get(id, side)
    }

    fn register(&self, entity: &ReferenceEntity) {
        self.session
            .reference_registry()
            .register(entity.id.clone(), entity.side, entity.clone());
    }

    /// Footnote data for a source anchor.
    ///
    /// Returns `None`, after logging a warning, when the anchor does not
    /// carry the reference marker. Otherwise returns the data of the first
    /// anchor in its sibling group that has a body.
    pub fn reference_data(&self, document: &Document, id: &Identifier) -> Option<RefData> {
        let tree = &document.source;
        let anchor = tree.by_dom_id(id.as_str())?;
        match tree.get(anchor).and_then(|n| n.as_reference()) {
            Some(markup) if markup.is_reference => {}
            _ => {
                warn!(reference = %id, "element without reference marker used as reference, ignored");
                return None;
            }
        }

        sibling_group(tree, id.as_str()).into_iter().find_map(|sibling| {
            let node = tree.by_dom_id(&sibling)?;
            let markup = tree.get(node)?.as_reference()?;
            if !markup.is_reference {
                return None;
            }
            markup.data.as_ref().filter(|data| data.has_body()).cloned()
        })
    }

    /// Footnote markup for a source anchor: the inline body, or the
    /// content of the element the body points at
    pub fn resolve_content(&self, document: &Document, id: &Identifier) -> Option<String> {
        let body = self.reference_data(document, id)?.body?;
        if let Some(html) = body.html {
            return Some(html);
        }
        let tree = &document.source;
        let node = tree.by_dom_id(body.id.as_deref()?)?;
        match &tree.get(node)?.kind {
            NodeKind::Note(note) => Some(note.content.clone()),
            _ => Some(tree.text_content(node)),
        }
    }

    /// Copy the footnote payload into the target anchor for `id`.
    ///
    /// Annotations already rewritten on the footnote's reference-list entry
    /// replace those of the payload. Also makes sure the target has a
    /// reference list. Returns `None` when there is no target anchor or no
    /// payload.
    pub fn adapt(&self, document: &mut Document, id: &Identifier) -> EngineResult<Option<ReferenceEntity>> {
        let marked = self.session.marked(id, Side::Target);
        let Some(target) = document.target.by_dom_id(&marked) else {
            return Ok(None);
        };
        let Some(mut data) = self.reference_data(document, id) else {
            return Ok(None);
        };
        let annotations = document
            .source
            .notes_citing(id.as_str())
            .into_iter()
            .find_map(|note| document.source.get(note)?.as_note()?.annotations.clone());
        if annotations.is_some() {
            data.annotations = annotations;
        }

        document.target.reference_mut(target)?.data = Some(data);
        let entity = ReferenceEntity {
            id: id.clone(),
            side: Side::Target,
            node: Some(target),
            label: anchor_label(&document.target, target),
            content: self.resolve_content(document, id),
            state: ReferenceState::Adapted,
        };
        self.register(&entity);
        self.ensure_reference_list(document)?;
        debug!(reference = %id, "adapted reference");
        Ok(Some(entity))
    }

    /// Entity for an anchor without modifying the tree
    fn observe(&self, document: &Document, side: Side, node: NodeId) -> EngineResult<ReferenceEntity> {
        let tree = document.tree(side);
        let markup = tree.reference(node)?;
        let id = match (&markup.source_id, &tree.node(node)?.dom_id) {
            (Some(source_id), _) => Identifier::new(source_id.clone()),
            (None, Some(dom_id)) => self.session.identifier(dom_id, side),
            (None, None) => Identifier::synthesize(),
        };
        let state = match side {
            Side::Target if markup.data.as_ref().is_some_and(RefData::has_body) => ReferenceState::Adapted,
            _ => ReferenceState::NotAdapted,
        };
        let entity = ReferenceEntity {
            content: self.resolve_content(document, &id),
            label: anchor_label(tree, node),
            id,
            side,
            node: Some(node),
            state,
        };
        self.register(&entity);
        Ok(entity)
    }

    /// Prepare every anchor in a target section.
    ///
    /// Anchors become read-only. Unless the section was restored from a
    /// draft, each anchor is renamed into the target namespace, remembers
    /// its source id and is adapted. A section holding a reference list
    /// takes its list metadata from `source_section`.
    pub fn process_section(
        &self,
        document: &mut Document,
        section: NodeId,
        source_section: Option<NodeId>,
    ) -> EngineResult<Vec<ReferenceEntity>> {
        let restored = document
            .target
            .node(section)?
            .as_section()
            .ok_or(EngineError::NotASection(section))?
            .restored;

        let mut entities = Vec::new();
        for anchor in document.target.references_under(section) {
            document.target.reference_mut(anchor)?.read_only = true;
            let dom_id = document.target.node(anchor)?.dom_id.clone();
            let already_processed = document.target.reference(anchor)?.source_id.is_some();

            if restored || already_processed {
                entities.push(self.observe(document, Side::Target, anchor)?);
                continue;
            }
            let Some(source_id) = dom_id else {
                entities.push(self.observe(document, Side::Target, anchor)?);
                continue;
            };

            let id = Identifier::new(source_id.clone());
            document.target.reference_mut(anchor)?.source_id = Some(source_id);
            document
                .target
                .set_dom_id(anchor, Some(self.session.marked(&id, Side::Target)))?;
            match self.adapt(document, &id)? {
                Some(entity) => entities.push(entity),
                None => entities.push(self.observe(document, Side::Target, anchor)?),
            }
        }

        if !restored {
            self.copy_list_data(document, section, source_section)?;
        }
        Ok(entities)
    }

    /// Give reference lists in a target section the metadata of the
    /// corresponding source lists, matched by position
    fn copy_list_data(
        &self,
        document: &mut Document,
        section: NodeId,
        source_section: Option<NodeId>,
    ) -> EngineResult<()> {
        let Some(source_section) = source_section else {
            return Ok(());
        };
        let source_data: Vec<Option<serde_json::Value>> = document
            .source
            .descendants(source_section)
            .into_iter()
            .filter_map(|n| match &document.source.get(n)?.kind {
                NodeKind::ReferenceList { data } => Some(data.clone()),
                _ => None,
            })
            .collect();
        let target_lists: Vec<NodeId> = document
            .target
            .descendants(section)
            .into_iter()
            .filter(|n| {
                document
                    .target
                    .get(*n)
                    .is_some_and(|node| matches!(node.kind, NodeKind::ReferenceList { .. }))
            })
            .collect();

        for (list, data) in target_lists.into_iter().zip(source_data) {
            if let Some(NodeKind::ReferenceList { data: target_data }) =
                document.target.get_mut(list).map(|n| &mut n.kind)
            {
                *target_data = data;
            }
        }
        Ok(())
    }

    /// Make sure the target tree has a reference list.
    ///
    /// When it has none, every source reference list is copied into the
    /// target, inside the target section generated from the list's source
    /// section (created if needed), and a `SectionAdded` event is emitted
    /// per new section. Does nothing when a target list already exists.
    pub fn ensure_reference_list(&self, document: &mut Document) -> EngineResult<Vec<NodeId>> {
        if !document.target.reference_lists().is_empty() {
            return Ok(Vec::new());
        }

        let marker = self.session.marker().to_string();
        let rename = |id: &str| format!("{marker}{id}");
        let mut created = Vec::new();
        let source_lists = document.source.reference_lists();
        if source_lists.is_empty() {
            let section = document
                .target
                .append(None, None, NodeKind::Section(SectionMarkup::new()))?;
            document
                .target
                .append(Some(section), None, NodeKind::ReferenceList { data: None })?;
            created.push(section);
            self.session.emit(AdaptationEvent::SectionAdded {
                section,
                source_section: None,
                kind: SectionKind::ReferenceList,
            });
            return Ok(created);
        }

        for list in source_lists {
            let source_section = document.source.section_of(list);
            let source_dom = source_section
                .and_then(|s| document.source.get(s))
                .and_then(|s| s.dom_id.clone());

            let existing = source_dom.as_deref().and_then(|dom| {
                document.target.sections().into_iter().find(|s| {
                    document
                        .target
                        .get(*s)
                        .and_then(|n| n.as_section())
                        .is_some_and(|markup| markup.source.as_deref() == Some(dom))
                })
            });
            let section = match existing {
                Some(section) => section,
                None => {
                    let markup = match &source_dom {
                        Some(dom) => SectionMarkup::from_source(dom.clone()),
                        None => SectionMarkup::new(),
                    };
                    let section = document.target.append(
                        None,
                        source_dom.as_deref().map(rename),
                        NodeKind::Section(markup),
                    )?;
                    self.session.emit(AdaptationEvent::SectionAdded {
                        section,
                        source_section,
                        kind: SectionKind::ReferenceList,
                    });
                    section
                }
            };
            document
                .target
                .import_subtree(&document.source, list, Some(section), &rename)?;
            created.push(section);
        }
        debug!(lists = created.len(), "added target reference list");
        Ok(created)
    }

    /// Copy a source reference into the target at the saved selection.
    ///
    /// The copy is renamed into the target namespace, points back at its
    /// source anchor, is read-only and is adapted right away.
    pub fn add_at_selection(
        &self,
        document: &mut Document,
        id: &Identifier,
        selection: &dyn SelectionProvider,
    ) -> EngineResult<ReferenceEntity> {
        let source_node = document.source.by_dom_id(id.as_str()).ok_or_else(|| {
            EngineError::NotRegistered {
                kind: "reference",
                id: id.to_string(),
            }
        })?;
        let mut markup = document.source.reference(source_node)?.clone();

        selection.restore();
        let current = selection
            .current()
            .ok_or_else(|| EngineError::InvalidSelection("no cursor position".to_string()))?;
        if !is_editable_position(&document.target, current.node) {
            return Err(EngineError::InvalidSelection(
                "cursor is not in an editable section".to_string(),
            ));
        }

        markup.source_id = Some(id.as_str().to_string());
        markup.read_only = true;
        let marked = self.session.marked(id, Side::Target);
        let anchor = selection.replace(
            &mut document.target,
            &current,
            Some(marked.clone()),
            NodeKind::Reference(markup),
        )?;
        let children = document.source.node(source_node)?.children.clone();
        let marker = self.session.marker().to_string();
        for child in children {
            document.target.import_subtree(
                &document.source,
                child,
                Some(anchor),
                &|dom: &str| format!("{marker}{dom}"),
            )?;
        }

        let entity = match self.adapt(document, id)? {
            Some(entity) => entity,
            None => self.observe(document, Side::Target, anchor)?,
        };
        if let Some(section) = document.target.section_of(anchor) {
            self.session.emit(AdaptationEvent::InputChanged { section });
        }
        Ok(entity)
    }

    /// Delete a target anchor. The entity stays registered, detached.
    pub fn remove(&self, document: &mut Document, entity: &ReferenceEntity) -> EngineResult<ReferenceEntity> {
        let Some(node) = entity.node else {
            return Ok(entity.clone());
        };
        if entity.side != Side::Target {
            return Err(EngineError::WrongKind {
                id: node,
                expected: "target reference",
            });
        }
        let section = document.target.section_of(node);
        document.target.remove(node)?;
        let detached = ReferenceEntity {
            node: None,
            ..entity.clone()
        };
        self.register(&detached);
        if let Some(section) = section {
            self.session.emit(AdaptationEvent::InputChanged { section });
        }
        Ok(detached)
    }

    /// Select an anchor and announce it with its base identifier
    pub fn select(&self, document: &Document, side: Side, node: NodeId) -> EngineResult<ReferenceEntity> {
        let entity = self.observe(document, side, node)?;
        self.session.emit(AdaptationEvent::ReferenceSelected {
            id: entity.id.clone(),
            side,
        });
        Ok(entity)
    }

    /// The counterpart of a reference in the other tree; detached when
    /// the other tree has no anchor for it
    pub fn corresponding(&self, document: &Document, entity: &ReferenceEntity) -> EngineResult<ReferenceEntity> {
        let other = entity.side.opposite();
        if let Some(found) = self.get(&entity.id, other) {
            return Ok(found);
        }
        let marked = self.session.marked(&entity.id, other);
        if let Some(node) = document.tree(other).by_dom_id(&marked) {
            if document.tree(other).reference(node).is_ok() {
                return self.observe(document, other, node);
            }
        }
        let detached = ReferenceEntity {
            id: entity.id.clone(),
            side: other,
            node: None,
            label: entity.label.clone(),
            content: entity.content.clone(),
            state: ReferenceState::NotAdapted,
        };
        self.register(&detached);
        Ok(detached)
    }

    /// Card for a reference seen from one side.
    ///
    /// `None` when the footnote content cannot be resolved or the anchor
    /// does not exist on that side.
    pub fn card(&self, document: &Document, id: &Identifier, side: Side) -> Option<ReferenceCard> {
        let content = self.resolve_content(document, id)?;
        let source_anchor = document.source.by_dom_id(id.as_str())?;
        let present = document
            .tree(side)
            .by_dom_id(&self.session.marked(id, side))
            .is_some();
        if !present {
            return None;
        }
        Some(ReferenceCard {
            side,
            language: self.session.language(side).to_string(),
            label: anchor_label(&document.source, source_anchor),
            content: Some(content),
            affordance: match side {
                Side::Source => ReferenceAffordance::Add,
                Side::Target => ReferenceAffordance::Remove,
            },
        })
    }
}
