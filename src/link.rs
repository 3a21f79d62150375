//! Link entities and their adaptation state machine
//!
//! A link is one `LinkEntity` value tagged with its side. Both sides share
//! the entity shape; what differs is the transition table and how a state
//! is written back to link markup. Entities are views over the trees and
//! the caches: any of them can be dropped and re-derived.

use crate::card::{LinkCard, LinkCards};
use crate::error::{EngineError, EngineResult};
use crate::registry::Identifier;
use crate::resolve::{PageLookup, PageMeta};
use crate::selection::{is_valid_selection, SelectionProvider};
use crate::session::Session;
use crate::title::{display_title, normalize};
use crate::tree::{ContentTree, Document, Highlight, LinkMarks, LinkMarkup, NodeId, NodeKind, Side};
use crate::adapt::AdaptationEvent;
use serde::Serialize;
use tracing::debug;

/// Adaptation state of a link
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkState {
    /// Title known, no adaptation attempted
    Unresolved,
    /// Points at the counterpart title
    Adapted,
    /// No counterpart; converted to plain text on publish
    Unadapted,
    /// Deliberately points at a page that does not exist
    RedLink,
    /// Adapted title has no page in the target language
    MissingArticle,
}

impl LinkState {
    /// State recorded by the marks of already adapted markup
    pub fn from_marks(marks: &LinkMarks) -> Self {
        if marks.red_link {
            LinkState::RedLink
        } else if marks.unadapted {
            LinkState::Unadapted
        } else if marks.missing_article {
            LinkState::MissingArticle
        } else if marks.target_link {
            LinkState::Adapted
        } else {
            LinkState::Unresolved
        }
    }
}

/// Input to the state machine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    /// Title resolution finished: the counterpart title, or none
    Resolved(Option<String>),
    /// The page probe reported that the page does not exist
    PageMissing,
    /// The translator marked the link as a red link
    MarkedRedLink,
}

/// Transition table. Pairs not listed leave the state unchanged.
fn next_state(side: Side, state: LinkState, event: &LinkEvent) -> LinkState {
    use LinkEvent::*;
    use LinkState::*;

    match (side, state, event) {
        (_, Unresolved | Unadapted, Resolved(Some(_))) => Adapted,
        (_, Unresolved, Resolved(None)) => Unadapted,
        (Side::Target, Adapted, PageMissing) => MissingArticle,
        (Side::Source, Unresolved | Adapted | Unadapted, PageMissing) => RedLink,
        (_, _, MarkedRedLink) => RedLink,
        (_, state, _) => state,
    }
}

/// One hyperlink occurrence
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LinkEntity {
    pub id: Identifier,
    pub side: Side,
    /// Title as written, in the language it was written in
    pub title: String,
    /// Counterpart title in the target language, once known
    pub resolved_title: Option<String>,
    pub state: LinkState,
    /// Backing node in the tree of `side`; `None` for a detached entity
    pub node: Option<NodeId>,
}

impl LinkEntity {
    pub fn attached(id: Identifier, side: Side, title: impl Into<String>, node: NodeId) -> Self {
        Self {
            id,
            side,
            title: title.into(),
            resolved_title: None,
            state: LinkState::Unresolved,
            node: Some(node),
        }
    }

    /// An entity with no tree node, known only by identifier and title
    pub fn detached(id: Identifier, side: Side, title: impl Into<String>) -> Self {
        Self {
            id,
            side,
            title: title.into(),
            resolved_title: None,
            state: LinkState::Unresolved,
            node: None,
        }
    }

    /// Rebuild a target entity from markup that was already adapted
    fn restored(id: Identifier, markup: &LinkMarkup, node: NodeId) -> Self {
        let state = LinkState::from_marks(&markup.marks);
        Self {
            id,
            side: Side::Target,
            title: markup.title.clone(),
            resolved_title: match state {
                LinkState::Unadapted | LinkState::Unresolved => None,
                _ => Some(markup.title.clone()),
            },
            state,
            node: Some(node),
        }
    }

    pub fn is_detached(&self) -> bool {
        self.node.is_none()
    }

    /// Title the link currently points at in its own tree
    pub fn display_title(&self) -> &str {
        match self.side {
            Side::Target => self.resolved_title.as_deref().unwrap_or(&self.title),
            Side::Source => &self.title,
        }
    }

    /// Feed an event through the state machine. Returns whether anything
    /// changed; re-applying an event is a no-op.
    pub fn apply(&mut self, event: &LinkEvent) -> bool {
        let next = next_state(self.side, self.state, event);
        let mut changed = next != self.state;
        if let LinkEvent::Resolved(Some(target)) = event {
            if next == LinkState::Adapted && self.resolved_title.is_none() {
                self.resolved_title = Some(target.clone());
                changed = true;
            }
        }
        self.state = next;
        changed
    }
}

/// Write a target entity's state into its markup
fn write_target_marks(
    tree: &mut ContentTree,
    node: NodeId,
    entity: &LinkEntity,
    marked_id: String,
) -> EngineResult<()> {
    let link = tree.link_mut(node)?;
    link.link_id.get_or_insert(marked_id);
    link.marks.target_link = true;
    match entity.state {
        LinkState::Adapted => {
            if let Some(resolved) = &entity.resolved_title {
                link.title = resolved.clone();
                link.href = resolved.clone();
            }
            link.marks.unadapted = false;
        }
        LinkState::Unadapted => link.marks.unadapted = true,
        LinkState::RedLink => {
            link.marks.unadapted = false;
            link.marks.missing_article = false;
            link.marks.red_link = true;
        }
        LinkState::MissingArticle => link.marks.missing_article = true,
        LinkState::Unresolved => {}
    }
    Ok(())
}

/// First link in `tree` carrying `marked_id`
fn find_link(tree: &ContentTree, marked_id: &str) -> Option<NodeId> {
    tree.walk().into_iter().find(|id| {
        tree.get(*id)
            .and_then(|node| node.as_link())
            .is_some_and(|link| link.link_id.as_deref() == Some(marked_id))
    })
}

/// Link operations scoped to a session
pub struct LinkTool<'a> {
    session: &'a Session,
}

impl<'a> LinkTool<'a> {
    pub fn new(session: &'a Session) -> Self {
        Self { session }
    }

    /// Registered entity for an identifier
    pub fn get(&self, id: &Identifier, side: Side) -> Option<LinkEntity> {
        self.session.link_registry().get(id, side)
    }

    fn register(&self, entity: &LinkEntity) {
        self.session
            .link_registry()
            .register(entity.id.clone(), entity.side, entity.clone());
    }

    fn identifier_of(&self, markup: &LinkMarkup, side: Side) -> Identifier {
        markup
            .link_id
            .as_deref()
            .map(|raw| self.session.identifier(raw, side))
            .unwrap_or_else(Identifier::synthesize)
    }

    /// Adapt a target-tree link from the cache.
    ///
    /// Reads only the cache; the batch for the section must have been
    /// resolved first. Links already carrying the target-link mark keep
    /// their state, except that an unadapted link whose title has since
    /// been resolved becomes adapted. Idempotent.
    pub fn adapt_target(&self, document: &mut Document, node: NodeId) -> EngineResult<LinkEntity> {
        let markup = document.target.link(node)?.clone();
        let id = self.identifier_of(&markup, Side::Target);
        let pair = self.session.language_pair();

        let entity = if markup.marks.target_link {
            let mut restored = LinkEntity::restored(id, &markup, node);
            if let Some(Some(target)) = self.session.resolver().cached_pair(&restored.title, &pair) {
                restored.apply(&LinkEvent::Resolved(Some(target)));
            }
            restored
        } else {
            let mut fresh = LinkEntity::attached(id, Side::Target, markup.title.clone(), node);
            let resolution = self
                .session
                .resolver()
                .cached_pair(&fresh.title, &pair)
                .flatten();
            fresh.apply(&LinkEvent::Resolved(resolution));
            fresh
        };

        let marked = self.session.marked(&entity.id, Side::Target);
        write_target_marks(&mut document.target, node, &entity, marked)?;
        debug!(id = %entity.id, state = ?entity.state, "adapted target link");
        self.register(&entity);
        Ok(entity)
    }

    /// Instantiate a source-tree link from its markup and the cache
    pub fn attach_source(&self, document: &Document, node: NodeId) -> EngineResult<LinkEntity> {
        let markup = document.source.link(node)?;
        let id = self.identifier_of(markup, Side::Source);
        let mut entity = LinkEntity::attached(id, Side::Source, markup.title.clone(), node);

        let pair = self.session.language_pair();
        if let Some(resolution) = self.session.resolver().cached_pair(&entity.title, &pair) {
            entity.apply(&LinkEvent::Resolved(resolution));
        }
        if markup.marks.red_link {
            entity.apply(&LinkEvent::PageMissing);
        }
        self.register(&entity);
        Ok(entity)
    }

    /// Entity for a link node without modifying the tree
    fn observe(&self, document: &Document, side: Side, node: NodeId) -> EngineResult<LinkEntity> {
        match side {
            Side::Source => self.attach_source(document, node),
            Side::Target => {
                let markup = document.target.link(node)?;
                let id = self.identifier_of(markup, Side::Target);
                let entity = if markup.marks.target_link {
                    LinkEntity::restored(id, markup, node)
                } else {
                    LinkEntity::attached(id, Side::Target, markup.title.clone(), node)
                };
                self.register(&entity);
                Ok(entity)
            }
        }
    }

    /// The counterpart of a link in the other tree.
    ///
    /// Looks in the registry, then in the other tree. When neither has
    /// it, a detached counterpart is synthesized from the known title
    /// (through the cache when the title is already resolved) and
    /// registered.
    pub fn corresponding(&self, document: &Document, entity: &LinkEntity) -> EngineResult<LinkEntity> {
        let other = entity.side.opposite();
        if let Some(found) = self.get(&entity.id, other) {
            return Ok(found);
        }

        let marked = self.session.marked(&entity.id, other);
        if let Some(node) = find_link(document.tree(other), &marked) {
            return self.observe(document, other, node);
        }

        let title = match entity.side {
            Side::Source => self.target_title(entity),
            Side::Target => entity.title.clone(),
        };
        let detached = LinkEntity::detached(entity.id.clone(), other, title);
        debug!(id = %entity.id, side = %other, "synthesized detached link");
        self.register(&detached);
        Ok(detached)
    }

    /// Title a target-language link for `entity` should point at
    pub fn target_title(&self, entity: &LinkEntity) -> String {
        let pair = self.session.language_pair();
        let title = entity
            .resolved_title
            .clone()
            .or_else(|| {
                self.session
                    .resolver()
                    .cached_pair(&entity.title, &pair)
                    .flatten()
            })
            .unwrap_or_else(|| entity.title.clone());
        display_title(&title)
    }

    /// Detached target link for a word the translator selected or searched
    pub fn from_text(&self, text: &str) -> Option<LinkEntity> {
        let title = normalize(text)?;
        let entity = LinkEntity::detached(Identifier::synthesize(), Side::Target, title.into_string());
        self.register(&entity);
        Some(entity)
    }

    /// Probe the page a link points at, in its own language
    pub async fn fetch_link_data(&self, entity: &LinkEntity) -> PageLookup {
        let language = self.session.language(entity.side);
        self.session
            .resolver()
            .fetch_page_metadata(entity.display_title(), language)
            .await
    }

    /// Apply a probe result: a missing page makes a source link a red
    /// link and an adapted target link a missing article
    pub fn apply_page_lookup(
        &self,
        document: &mut Document,
        entity: &LinkEntity,
        lookup: &PageLookup,
    ) -> EngineResult<LinkEntity> {
        let mut entity = entity.clone();
        if *lookup == PageLookup::Missing && entity.apply(&LinkEvent::PageMissing) {
            if let Some(node) = entity.node {
                let marks = &mut document.tree_mut(entity.side).link_mut(node)?.marks;
                match entity.side {
                    Side::Source => marks.red_link = true,
                    Side::Target => marks.missing_article = true,
                }
            }
            self.register(&entity);
        }
        Ok(entity)
    }

    /// Probe and apply in one step
    pub async fn probe(&self, document: &mut Document, entity: &LinkEntity) -> EngineResult<LinkEntity> {
        let lookup = self.fetch_link_data(entity).await;
        self.apply_page_lookup(document, entity, &lookup)
    }

    /// Select a link: highlight it and its counterpart, and announce it.
    ///
    /// Selecting a source link while the target selection is valid turns
    /// that selection into the corresponding target link, unless one
    /// already exists. Returns the created link.
    pub fn select(
        &self,
        document: &mut Document,
        entity: &LinkEntity,
        selection: Option<&dyn SelectionProvider>,
    ) -> EngineResult<Option<LinkEntity>> {
        document.source.clear_highlights();
        document.target.clear_highlights();
        if let Some(node) = entity.node {
            document.tree_mut(entity.side).link_mut(node)?.marks.highlight = Some(Highlight::Primary);
        }
        let counterpart = self.corresponding(document, entity)?;
        if let Some(node) = counterpart.node {
            document.tree_mut(counterpart.side).link_mut(node)?.marks.highlight =
                Some(Highlight::Secondary);
        }
        self.session.emit(AdaptationEvent::LinkSelected {
            id: entity.id.clone(),
            side: entity.side,
        });

        if entity.side != Side::Source || !counterpart.is_detached() {
            return Ok(None);
        }
        let Some(provider) = selection else {
            return Ok(None);
        };
        match provider.current() {
            Some(current) if is_valid_selection(&document.target, &current) => {
                self.create_link(document, provider, &counterpart).map(Some)
            }
            _ => Ok(None),
        }
    }

    /// Turn the saved target selection into a link for `target`.
    ///
    /// The link points at the target title, keeps the entity's identifier
    /// and is marked as adapted.
    pub fn create_link(
        &self,
        document: &mut Document,
        selection: &dyn SelectionProvider,
        target: &LinkEntity,
    ) -> EngineResult<LinkEntity> {
        selection.restore();
        let current = selection
            .current()
            .ok_or_else(|| EngineError::InvalidSelection("nothing selected".to_string()))?;
        if !is_valid_selection(&document.target, &current) {
            return Err(EngineError::InvalidSelection(format!(
                "cannot link {:?} here",
                current.text
            )));
        }

        let title = self.target_title(target);
        let mut markup =
            LinkMarkup::new(title.clone()).with_id(self.session.marked(&target.id, Side::Target));
        markup.marks.target_link = true;
        let node = selection.replace(&mut document.target, &current, None, NodeKind::Link(markup))?;
        document
            .target
            .append(Some(node), None, NodeKind::text(current.text.clone()))?;

        let mut entity = LinkEntity::attached(target.id.clone(), Side::Target, target.title.clone(), node);
        entity.apply(&LinkEvent::Resolved(Some(title)));
        self.register(&entity);

        if let Some(section) = document.target.section_of(node) {
            self.session.emit(AdaptationEvent::InputChanged { section });
        }
        Ok(entity)
    }

    /// Replace a target link by its text. The entity stays registered,
    /// detached.
    pub fn remove(&self, document: &mut Document, entity: &LinkEntity) -> EngineResult<LinkEntity> {
        let Some(node) = entity.node else {
            return Ok(entity.clone());
        };
        if entity.side != Side::Target {
            return Err(EngineError::WrongKind {
                id: node,
                expected: "target link",
            });
        }
        let section = document.target.section_of(node);
        document.target.unwrap_to_text(node)?;

        let detached = LinkEntity {
            node: None,
            ..entity.clone()
        };
        self.register(&detached);
        if let Some(section) = section {
            self.session.emit(AdaptationEvent::InputChanged { section });
        }
        Ok(detached)
    }

    /// Mark the target side of a link as a red link.
    ///
    /// When the target link does not exist yet, the saved selection is
    /// turned into it first; with no valid selection nothing happens and
    /// `None` is returned.
    pub fn mark_red_link(
        &self,
        document: &mut Document,
        entity: &LinkEntity,
        selection: Option<&dyn SelectionProvider>,
    ) -> EngineResult<Option<LinkEntity>> {
        let mut target = match entity.side {
            Side::Target => entity.clone(),
            Side::Source => self.corresponding(document, entity)?,
        };

        if target.is_detached() {
            let Some(provider) = selection else {
                return Ok(None);
            };
            provider.restore();
            match provider.current() {
                Some(current) if is_valid_selection(&document.target, &current) => {
                    target = self.create_link(document, provider, &target)?;
                }
                _ => return Ok(None),
            }
        }

        target.apply(&LinkEvent::MarkedRedLink);
        if let Some(node) = target.node {
            let marked = self.session.marked(&target.id, Side::Target);
            write_target_marks(&mut document.target, node, &target, marked)?;
        }
        self.register(&target);
        Ok(Some(target))
    }

    /// Card model for one side of a link, given its probe result
    pub fn card(&self, entity: &LinkEntity, page: Option<&PageMeta>) -> LinkCard {
        let side = entity.side;
        LinkCard::build(
            side,
            self.session.language(side),
            &display_title(entity.display_title()),
            page,
            entity.state == LinkState::RedLink,
            !entity.is_detached(),
            |title| self.session.page_url(side, title),
        )
    }

    /// Cards for a selected link: the source card when the source page
    /// exists, and always the target card
    pub async fn cards(&self, document: &Document, entity: &LinkEntity) -> EngineResult<LinkCards> {
        let counterpart = self.corresponding(document, entity)?;
        let (source, target) = match entity.side {
            Side::Source => (entity.clone(), counterpart),
            Side::Target => (counterpart, entity.clone()),
        };
        let (source_page, target_page) =
            tokio::join!(self.fetch_link_data(&source), self.fetch_link_data(&target));

        Ok(LinkCards {
            source: source_page.meta().map(|meta| self.card(&source, Some(meta))),
            target: self.card(&target, target_page.meta()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::card::LinkAffordance;
    use crate::config::EngineConfig;
    use crate::resolve::{MockTitleService, PageMeta};
    use crate::selection::{MemorySelection, Selection};
    use crate::tree::SectionMarkup;
    use std::sync::Arc;

    fn session(service: MockTitleService) -> Session {
        let config = EngineConfig::default().with_languages("en", "fr");
        Session::new(config, Arc::new(service)).unwrap()
    }

    /// Source and target section, each with one link titled "Paris"
    /// carrying identifier "1"
    fn document() -> (Document, NodeId, NodeId) {
        let mut doc = Document::empty("en", "fr");
        let s = doc
            .source
            .append(None, Some("s1".into()), NodeKind::Section(SectionMarkup::new()))
            .unwrap();
        let source_link = doc
            .source
            .append(Some(s), None, NodeKind::Link(LinkMarkup::new("Paris").with_id("1")))
            .unwrap();
        doc.source.append(Some(source_link), None, NodeKind::text("Paris")).unwrap();

        let t = doc
            .target
            .append(None, Some("cxs1".into()), NodeKind::Section(SectionMarkup::from_source("s1")))
            .unwrap();
        let target_link = doc
            .target
            .append(Some(t), None, NodeKind::Link(LinkMarkup::new("Paris").with_id("cx1")))
            .unwrap();
        doc.target.append(Some(target_link), None, NodeKind::text("Paris")).unwrap();
        (doc, source_link, target_link)
    }

    #[test]
    fn transition_table_for_target() {
        let t = Side::Target;
        let found = LinkEvent::Resolved(Some("X".into()));
        assert_eq!(next_state(t, LinkState::Unresolved, &found), LinkState::Adapted);
        assert_eq!(next_state(t, LinkState::Unresolved, &LinkEvent::Resolved(None)), LinkState::Unadapted);
        assert_eq!(next_state(t, LinkState::Adapted, &found), LinkState::Adapted);
        assert_eq!(next_state(t, LinkState::Adapted, &LinkEvent::Resolved(None)), LinkState::Adapted);
        assert_eq!(next_state(t, LinkState::Adapted, &LinkEvent::PageMissing), LinkState::MissingArticle);
        assert_eq!(next_state(t, LinkState::Unadapted, &LinkEvent::PageMissing), LinkState::Unadapted);
        assert_eq!(next_state(t, LinkState::MissingArticle, &LinkEvent::MarkedRedLink), LinkState::RedLink);
        assert_eq!(next_state(t, LinkState::RedLink, &found), LinkState::RedLink);
    }

    #[test]
    fn transition_table_for_source() {
        let s = Side::Source;
        assert_eq!(next_state(s, LinkState::Unresolved, &LinkEvent::PageMissing), LinkState::RedLink);
        assert_eq!(next_state(s, LinkState::Adapted, &LinkEvent::PageMissing), LinkState::RedLink);
        assert_eq!(next_state(s, LinkState::RedLink, &LinkEvent::Resolved(Some("X".into()))), LinkState::RedLink);
    }

    #[test]
    fn apply_is_idempotent() {
        let mut entity = LinkEntity::detached(Identifier::new("1"), Side::Target, "Paris");
        assert!(entity.apply(&LinkEvent::Resolved(Some("Paris (fr)".into()))));
        assert!(!entity.apply(&LinkEvent::Resolved(Some("Other".into()))));
        assert_eq!(entity.resolved_title.as_deref(), Some("Paris (fr)"));
        assert_eq!(entity.state, LinkState::Adapted);
    }

    #[test]
    fn state_from_marks() {
        let mut marks = LinkMarks {
            target_link: true,
            ..Default::default()
        };
        assert_eq!(LinkState::from_marks(&marks), LinkState::Adapted);
        marks.unadapted = true;
        assert_eq!(LinkState::from_marks(&marks), LinkState::Unadapted);
        marks.red_link = true;
        assert_eq!(LinkState::from_marks(&marks), LinkState::RedLink);
        assert_eq!(LinkState::from_marks(&LinkMarks::default()), LinkState::Unresolved);
    }

    #[tokio::test]
    async fn adapt_target_rewrites_resolved_link() {
        let session = session(MockTitleService::new().with_pair("en", "fr", "Paris", "Paris (fr)"));
        let (mut doc, _, target_link) = document();
        session.resolver().resolve_titles(["Paris"], &session.language_pair()).await;

        let entity = session.links().adapt_target(&mut doc, target_link).unwrap();
        assert_eq!(entity.state, LinkState::Adapted);
        assert_eq!(entity.id.as_str(), "1");

        let markup = doc.target.link(target_link).unwrap();
        assert_eq!(markup.title, "Paris (fr)");
        assert_eq!(markup.href, "Paris (fr)");
        assert!(markup.marks.target_link);
        assert!(!markup.marks.unadapted);
    }

    #[tokio::test]
    async fn adapting_twice_changes_nothing() {
        let session = session(MockTitleService::new().with_pair("en", "fr", "Paris", "Paris (fr)"));
        let (mut doc, _, target_link) = document();
        session.resolver().resolve_titles(["Paris"], &session.language_pair()).await;

        let first = session.links().adapt_target(&mut doc, target_link).unwrap();
        let markup = doc.target.link(target_link).unwrap().clone();
        let second = session.links().adapt_target(&mut doc, target_link).unwrap();
        assert_eq!(first.state, second.state);
        assert_eq!(first.resolved_title, second.resolved_title);
        assert_eq!(doc.target.link(target_link).unwrap(), &markup);
    }

    #[test]
    fn uncached_title_is_unadapted() {
        let session = session(MockTitleService::new());
        let (mut doc, _, target_link) = document();
        let entity = session.links().adapt_target(&mut doc, target_link).unwrap();
        assert_eq!(entity.state, LinkState::Unadapted);
        assert!(doc.target.link(target_link).unwrap().marks.unadapted);
        assert_eq!(doc.target.link(target_link).unwrap().title, "Paris");
    }

    #[tokio::test]
    async fn unadapted_link_adapts_once_resolved() {
        let session = session(MockTitleService::new().with_pair("en", "fr", "Paris", "Paris (fr)"));
        let (mut doc, _, target_link) = document();
        let entity = session.links().adapt_target(&mut doc, target_link).unwrap();
        assert_eq!(entity.state, LinkState::Unadapted);

        session.resolver().resolve_titles(["Paris"], &session.language_pair()).await;
        let entity = session.links().adapt_target(&mut doc, target_link).unwrap();
        assert_eq!(entity.state, LinkState::Adapted);
        let markup = doc.target.link(target_link).unwrap();
        assert_eq!(markup.title, "Paris (fr)");
        assert!(!markup.marks.unadapted);
    }

    #[tokio::test]
    async fn source_link_reads_cache() {
        let session = session(MockTitleService::new().with_pair("en", "fr", "Paris", "Paris (fr)"));
        let (doc, source_link, _) = document();
        let unresolved = session.links().attach_source(&doc, source_link).unwrap();
        assert_eq!(unresolved.state, LinkState::Unresolved);

        session.resolver().resolve_titles(["Paris"], &session.language_pair()).await;
        let resolved = session.links().attach_source(&doc, source_link).unwrap();
        assert_eq!(resolved.state, LinkState::Adapted);
        assert_eq!(resolved.resolved_title.as_deref(), Some("Paris (fr)"));
    }

    #[tokio::test]
    async fn corresponding_links_are_symmetric() {
        let session = session(MockTitleService::new().with_pair("en", "fr", "Paris", "Paris (fr)"));
        let (mut doc, source_link, target_link) = document();
        session.resolver().resolve_titles(["Paris"], &session.language_pair()).await;
        let links = session.links();
        links.adapt_target(&mut doc, target_link).unwrap();
        let source = links.attach_source(&doc, source_link).unwrap();

        let target = links.corresponding(&doc, &source).unwrap();
        assert_eq!(target.node, Some(target_link));
        let back = links.corresponding(&doc, &target).unwrap();
        assert_eq!(back, source);
    }

    #[tokio::test]
    async fn counterpart_found_in_tree_when_unregistered() {
        let session = session(MockTitleService::new());
        let (doc, source_link, target_link) = document();
        let source = session.links().attach_source(&doc, source_link).unwrap();
        let target = session.links().corresponding(&doc, &source).unwrap();
        assert_eq!(target.node, Some(target_link));
        assert_eq!(target.side, Side::Target);
    }

    #[tokio::test]
    async fn missing_counterpart_is_synthesized_detached() {
        let session = session(MockTitleService::new().with_pair("en", "fr", "Berlin", "Berlin (fr)"));
        session.resolver().resolve_titles(["Berlin"], &session.language_pair()).await;
        let doc = Document::empty("en", "fr");

        let source = LinkEntity::detached(Identifier::new("9"), Side::Source, "Berlin");
        let target = session.links().corresponding(&doc, &source).unwrap();
        assert!(target.is_detached());
        assert_eq!(target.title, "Berlin (fr)");
        assert_eq!(session.links().get(&Identifier::new("9"), Side::Target), Some(target));
    }

    #[tokio::test]
    async fn missing_source_page_makes_red_link() {
        let session = session(MockTitleService::new());
        let (mut doc, source_link, _) = document();
        let source = session.links().attach_source(&doc, source_link).unwrap();
        let source = session.links().probe(&mut doc, &source).await.unwrap();
        assert_eq!(source.state, LinkState::RedLink);
        assert!(doc.source.link(source_link).unwrap().marks.red_link);
    }

    #[tokio::test]
    async fn missing_target_page_makes_missing_article() {
        let service = MockTitleService::new().with_pair("en", "fr", "Paris", "Paris (fr)");
        let session = session(service);
        let (mut doc, _, target_link) = document();
        session.resolver().resolve_titles(["Paris"], &session.language_pair()).await;
        let target = session.links().adapt_target(&mut doc, target_link).unwrap();

        let target = session.links().probe(&mut doc, &target).await.unwrap();
        assert_eq!(target.state, LinkState::MissingArticle);
        assert!(doc.target.link(target_link).unwrap().marks.missing_article);
    }

    #[tokio::test]
    async fn selecting_highlights_both_sides_and_emits() {
        let session = session(MockTitleService::new());
        let mut rx = session.subscribe();
        let (mut doc, source_link, target_link) = document();
        let links = session.links();
        let target = links.adapt_target(&mut doc, target_link).unwrap();
        let source = links.attach_source(&doc, source_link).unwrap();

        links.select(&mut doc, &source, None).unwrap();
        assert_eq!(doc.source.link(source_link).unwrap().marks.highlight, Some(Highlight::Primary));
        assert_eq!(doc.target.link(target_link).unwrap().marks.highlight, Some(Highlight::Secondary));

        links.select(&mut doc, &target, None).unwrap();
        assert_eq!(doc.target.link(target_link).unwrap().marks.highlight, Some(Highlight::Primary));
        assert_eq!(doc.source.link(source_link).unwrap().marks.highlight, Some(Highlight::Secondary));

        let event = rx.recv().await.unwrap();
        assert_eq!(
            event,
            AdaptationEvent::LinkSelected {
                id: Identifier::new("1"),
                side: Side::Source
            }
        );
    }

    /// Target section with plain text only, and a source link "Berlin"
    fn document_with_selection() -> (Document, NodeId, MemorySelection) {
        let mut doc = Document::empty("en", "fr");
        let s = doc
            .source
            .append(None, Some("s1".into()), NodeKind::Section(SectionMarkup::new()))
            .unwrap();
        let source_link = doc
            .source
            .append(Some(s), None, NodeKind::Link(LinkMarkup::new("Berlin").with_id("7")))
            .unwrap();
        doc.source.append(Some(source_link), None, NodeKind::text("Berlin")).unwrap();

        let t = doc
            .target
            .append(None, None, NodeKind::Section(SectionMarkup::from_source("s1")))
            .unwrap();
        let text = doc.target.append(Some(t), None, NodeKind::text("à Berlin")).unwrap();
        let selection = MemorySelection::new();
        selection.select(Selection::in_text(&doc.target, text, 3..9).unwrap());
        (doc, source_link, selection)
    }

    #[tokio::test]
    async fn selecting_source_link_with_selection_creates_target_link() {
        let session = session(MockTitleService::new().with_pair("en", "fr", "Berlin", "Berlin (fr)"));
        session.resolver().resolve_titles(["Berlin"], &session.language_pair()).await;
        let (mut doc, source_link, selection) = document_with_selection();
        let links = session.links();
        let source = links.attach_source(&doc, source_link).unwrap();

        let created = links.select(&mut doc, &source, Some(&selection)).unwrap().unwrap();
        let node = created.node.unwrap();
        let markup = doc.target.link(node).unwrap();
        assert_eq!(markup.title, "Berlin (fr)");
        assert_eq!(markup.link_id.as_deref(), Some("cx7"));
        assert_eq!(doc.target.text_content(node), "Berlin");
        assert_eq!(created.state, LinkState::Adapted);
        assert_eq!(links.corresponding(&doc, &created).unwrap(), source);
    }

    #[test]
    fn link_from_text_starts_unresolved() {
        let session = session(MockTitleService::new());
        let entity = session.links().from_text(" tour eiffel ").unwrap();
        assert_eq!(entity.title, "Tour eiffel");
        assert_eq!(entity.state, LinkState::Unresolved);
        assert!(entity.is_detached());
        assert!(session.links().from_text("").is_none());
    }

    #[test]
    fn mark_red_link_converts_selection_first() {
        let session = session(MockTitleService::new());
        let (mut doc, _, selection) = document_with_selection();
        let links = session.links();
        let entity = links.from_text("Berlin").unwrap();

        let marked = links.mark_red_link(&mut doc, &entity, Some(&selection)).unwrap().unwrap();
        assert_eq!(marked.state, LinkState::RedLink);
        let markup = doc.target.link(marked.node.unwrap()).unwrap();
        assert!(markup.marks.red_link);
        assert!(!markup.marks.unadapted);
    }

    #[test]
    fn mark_red_link_without_selection_does_nothing() {
        let session = session(MockTitleService::new());
        let mut doc = Document::empty("en", "fr");
        let entity = session.links().from_text("Berlin").unwrap();
        assert!(session.links().mark_red_link(&mut doc, &entity, None).unwrap().is_none());
    }

    #[test]
    fn remove_unwraps_link_and_detaches_entity() {
        let session = session(MockTitleService::new());
        let (mut doc, _, target_link) = document();
        let links = session.links();
        let target = links.adapt_target(&mut doc, target_link).unwrap();
        let section = doc.target.section_of(target_link).unwrap();

        let removed = links.remove(&mut doc, &target).unwrap();
        assert!(removed.is_detached());
        assert!(doc.target.links_under(section).is_empty());
        assert_eq!(doc.target.text_content(section), "Paris");
    }

    #[tokio::test]
    async fn cards_reflect_page_existence() {
        let service = MockTitleService::new()
            .with_pair("en", "fr", "Paris", "Paris (fr)")
            .with_page("en", PageMeta::existing("Paris"))
            .with_page("fr", PageMeta::existing("Paris (fr)"));
        let session = session(service);
        let (mut doc, source_link, target_link) = document();
        session.resolver().resolve_titles(["Paris"], &session.language_pair()).await;
        session.links().adapt_target(&mut doc, target_link).unwrap();
        let source = session.links().attach_source(&doc, source_link).unwrap();

        let cards = session.links().cards(&doc, &source).await.unwrap();
        assert!(cards.source.is_some());
        assert!(cards.target.offers(&LinkAffordance::RemoveLink));
        assert!(cards.target.offers(&LinkAffordance::Open {
            url: "https://fr.wikipedia.org/wiki/Paris_(fr)".to_string()
        }));
    }

    #[tokio::test]
    async fn source_card_hidden_when_source_page_missing() {
        let session = session(MockTitleService::new());
        let entity = session.links().from_text("Atlantis").unwrap();
        let doc = Document::empty("en", "fr");
        let cards = session.links().cards(&doc, &entity).await.unwrap();
        assert!(cards.source.is_none());
        assert!(cards.target.offers(&LinkAffordance::MarkMissing));
        assert!(cards.target.offers(&LinkAffordance::AddLink));
    }
}
