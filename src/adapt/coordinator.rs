//! Adaptation coordinator
//!
//! Runs whole-section passes in two phases. The resolve phase collects
//! every link title of a section and resolves them in one batch; it only
//! reads the document, so several sections can resolve concurrently. The
//! instantiate phase then builds link and reference entities from the
//! warm cache and writes their state back into the target tree.

use super::events::AdaptationEvent;
use crate::error::{EngineError, EngineResult};
use crate::link::{LinkEntity, LinkState};
use crate::reference::ReferenceState;
use crate::session::Session;
use crate::tree::{Document, NodeId, SectionCorrespondence, Side, SourcePointers};
use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info};

/// A target section paired with the source section it came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct SectionPlan {
    section: NodeId,
    source: Option<NodeId>,
    restored: bool,
}

/// Link states counted after a pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LinkTally {
    pub adapted: usize,
    pub unadapted: usize,
    pub red_link: usize,
    pub missing_article: usize,
    pub unresolved: usize,
}

impl LinkTally {
    fn count(&mut self, state: LinkState) {
        match state {
            LinkState::Adapted => self.adapted += 1,
            LinkState::Unadapted => self.unadapted += 1,
            LinkState::RedLink => self.red_link += 1,
            LinkState::MissingArticle => self.missing_article += 1,
            LinkState::Unresolved => self.unresolved += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.adapted + self.unadapted + self.red_link + self.missing_article + self.unresolved
    }
}

/// Summary of an adaptation pass
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AdaptationReport {
    pub sections: usize,
    /// Titles whose resolution is known after the resolve phase
    pub titles_resolved: usize,
    /// Target-tree links by state
    pub target_links: LinkTally,
    /// Source-tree links by state
    pub source_links: LinkTally,
    pub references: usize,
    pub references_adapted: usize,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl AdaptationReport {
    fn started() -> Self {
        let now = Utc::now();
        Self {
            sections: 0,
            titles_resolved: 0,
            target_links: LinkTally::default(),
            source_links: LinkTally::default(),
            references: 0,
            references_adapted: 0,
            started_at: now,
            finished_at: now,
        }
    }
}

/// Drives adaptation passes for one session
pub struct Coordinator {
    session: Arc<Session>,
    sections: Arc<dyn SectionCorrespondence>,
}

impl Coordinator {
    /// Coordinator reading section correspondence from the target markup
    pub fn new(session: Arc<Session>) -> Self {
        Self::with_correspondence(session, Arc::new(SourcePointers))
    }

    pub fn with_correspondence(
        session: Arc<Session>,
        sections: Arc<dyn SectionCorrespondence>,
    ) -> Self {
        Self { session, sections }
    }

    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    fn plan(&self, document: &Document, section: NodeId) -> EngineResult<SectionPlan> {
        let markup = document
            .target
            .node(section)?
            .as_section()
            .ok_or(EngineError::NotASection(section))?;
        Ok(SectionPlan {
            section,
            source: self.sections.source_section(document, section),
            restored: markup.restored,
        })
    }

    /// Titles to resolve for a section: every source link, plus target
    /// links that have not been adapted yet. Restored sections need none.
    fn collect_titles(document: &Document, plan: &SectionPlan) -> Vec<String> {
        if plan.restored {
            return Vec::new();
        }
        let mut titles: Vec<String> = plan
            .source
            .map(|source| document.source.links_under(source))
            .unwrap_or_default()
            .into_iter()
            .filter_map(|n| document.source.get(n)?.as_link().map(|l| l.title.clone()))
            .collect();
        titles.extend(
            document
                .target
                .links_under(plan.section)
                .into_iter()
                .filter_map(|n| document.target.get(n)?.as_link())
                .filter(|link| !link.marks.target_link)
                .map(|link| link.title.clone()),
        );
        titles
    }

    /// Resolve phase: one batched lookup for all titles of a section
    async fn resolve(&self, document: &Document, plan: &SectionPlan) -> usize {
        let titles = Self::collect_titles(document, plan);
        if titles.is_empty() {
            return 0;
        }
        let pair = self.session.language_pair();
        let resolved = self.session.resolver().resolve_titles(&titles, &pair).await;
        debug!(
            section = plan.section.index(),
            titles = titles.len(),
            resolved = resolved.len(),
            "section titles resolved"
        );
        resolved.len()
    }

    /// Instantiate phase: build entities from the cache and write link and
    /// reference state into the target tree. Returns the links to probe.
    fn instantiate(
        &self,
        document: &mut Document,
        plan: &SectionPlan,
        report: &mut AdaptationReport,
    ) -> EngineResult<Vec<LinkEntity>> {
        let links = self.session.links();
        let mut probe = Vec::new();

        for node in document.target.links_under(plan.section) {
            let entity = links.adapt_target(document, node)?;
            if entity.state == LinkState::Adapted {
                probe.push(entity);
            }
        }
        if let Some(source) = plan.source {
            for node in document.source.links_under(source) {
                probe.push(links.attach_source(document, node)?);
            }
        }

        let references = self
            .session
            .references()
            .process_section(document, plan.section, plan.source)?;
        report.references += references.len();
        report.references_adapted += references
            .iter()
            .filter(|r| r.state == ReferenceState::Adapted)
            .count();
        Ok(probe)
    }

    /// Probe phase: check page existence for every candidate concurrently,
    /// then apply the answers in order
    async fn probe(&self, document: &mut Document, entities: Vec<LinkEntity>) -> EngineResult<()> {
        if !self.session.config().probe_pages || entities.is_empty() {
            return Ok(());
        }
        let links = self.session.links();
        let lookups = join_all(entities.iter().map(|entity| links.fetch_link_data(entity))).await;
        for (entity, lookup) in entities.iter().zip(lookups) {
            links.apply_page_lookup(document, entity, &lookup)?;
        }
        Ok(())
    }

    fn tally(&self, document: &Document, plans: &[SectionPlan], report: &mut AdaptationReport) {
        let links = self.session.links();
        let count = |side: Side, nodes: Vec<NodeId>, tally: &mut LinkTally| {
            for node in nodes {
                let Some(markup) = document.tree(side).get(node).and_then(|n| n.as_link()) else {
                    continue;
                };
                let id = markup
                    .link_id
                    .as_deref()
                    .map(|raw| self.session.identifier(raw, side));
                let state = id
                    .and_then(|id| links.get(&id, side))
                    .filter(|entity| entity.node == Some(node))
                    .map_or_else(|| LinkState::from_marks(&markup.marks), |entity| entity.state);
                tally.count(state);
            }
        };
        for plan in plans {
            count(Side::Target, document.target.links_under(plan.section), &mut report.target_links);
            if let Some(source) = plan.source {
                count(Side::Source, document.source.links_under(source), &mut report.source_links);
            }
        }
    }

    /// Adapt one target section.
    ///
    /// Emits `DocumentReady` before and `AdaptationComplete` after the
    /// pass. The batch resolution finishes before any entity reads the
    /// cache.
    pub async fn adapt(&self, document: &mut Document, section: NodeId) -> EngineResult<AdaptationReport> {
        let plan = self.plan(document, section)?;
        self.run(document, vec![plan]).await
    }

    /// Adapt every top-level section of the target tree.
    ///
    /// Sections resolve their titles concurrently; entity instantiation
    /// then runs section by section.
    pub async fn adapt_document(&self, document: &mut Document) -> EngineResult<AdaptationReport> {
        let plans = document
            .target
            .sections()
            .into_iter()
            .map(|section| self.plan(document, section))
            .collect::<EngineResult<Vec<_>>>()?;
        self.run(document, plans).await
    }

    async fn run(&self, document: &mut Document, plans: Vec<SectionPlan>) -> EngineResult<AdaptationReport> {
        let mut report = AdaptationReport::started();
        report.sections = plans.len();
        for plan in &plans {
            self.session
                .emit(AdaptationEvent::DocumentReady { section: plan.section });
        }

        let resolved = {
            let snapshot: &Document = document;
            join_all(plans.iter().map(|plan| self.resolve(snapshot, plan))).await
        };
        report.titles_resolved = resolved.into_iter().sum();

        let mut candidates = Vec::new();
        for plan in &plans {
            candidates.extend(self.instantiate(document, plan, &mut report)?);
        }
        self.probe(document, candidates).await?;

        self.tally(document, &plans, &mut report);
        for plan in &plans {
            self.session
                .emit(AdaptationEvent::AdaptationComplete { section: plan.section });
        }
        report.finished_at = Utc::now();
        info!(
            sections = report.sections,
            adapted = report.target_links.adapted,
            unadapted = report.target_links.unadapted,
            references = report.references,
            "adaptation pass complete"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::resolve::{MockTitleService, PageMeta};
    use crate::tree::{LinkMarkup, NodeKind, SectionMarkup};

    fn coordinator(service: MockTitleService) -> (Coordinator, Arc<MockTitleService>) {
        let service = Arc::new(service);
        let config = EngineConfig::default().with_languages("en", "fr");
        let session = Session::new(config, service.clone()).unwrap();
        (Coordinator::new(Arc::new(session)), service)
    }

    /// One section pair; each title becomes a source link `i` and its
    /// machine-translated copy `cxi`
    fn document(titles: &[&str]) -> (Document, NodeId) {
        let mut doc = Document::empty("en", "fr");
        let s = doc
            .source
            .append(None, Some("s1".into()), NodeKind::Section(SectionMarkup::new()))
            .unwrap();
        let t = doc
            .target
            .append(None, Some("cxs1".into()), NodeKind::Section(SectionMarkup::from_source("s1")))
            .unwrap();
        for (i, title) in titles.iter().enumerate() {
            let link = doc
                .source
                .append(Some(s), None, NodeKind::Link(LinkMarkup::new(*title).with_id(i.to_string())))
                .unwrap();
            doc.source.append(Some(link), None, NodeKind::text(*title)).unwrap();
            let link = doc
                .target
                .append(Some(t), None, NodeKind::Link(LinkMarkup::new(*title).with_id(format!("cx{i}"))))
                .unwrap();
            doc.target.append(Some(link), None, NodeKind::text(*title)).unwrap();
        }
        (doc, t)
    }

    #[tokio::test]
    async fn section_pass_resolves_once_and_adapts() {
        let (coordinator, service) = coordinator(
            MockTitleService::new()
                .with_pair("en", "fr", "Paris", "Paris (fr)")
                .with_page("fr", PageMeta::existing("Paris (fr)"))
                .with_page("en", PageMeta::existing("Paris")),
        );
        let (mut doc, section) = document(&["Paris", "Berlin", "Paris"]);

        let report = coordinator.adapt(&mut doc, section).await.unwrap();
        assert_eq!(service.resolve_count(), 1);
        assert_eq!(report.target_links.adapted, 2);
        assert_eq!(report.target_links.unadapted, 1);
        assert_eq!(report.titles_resolved, 2);

        let first = doc.target.links_under(section)[0];
        assert_eq!(doc.target.link(first).unwrap().title, "Paris (fr)");
    }

    #[tokio::test]
    async fn missing_target_page_becomes_missing_article() {
        let (coordinator, _) = coordinator(
            MockTitleService::new()
                .with_pair("en", "fr", "Atlantis", "Atlantide")
                .with_page("en", PageMeta::existing("Atlantis")),
        );
        let (mut doc, section) = document(&["Atlantis"]);
        let report = coordinator.adapt(&mut doc, section).await.unwrap();

        assert_eq!(report.target_links.missing_article, 1);
        let link = doc.target.links_under(section)[0];
        assert!(doc.target.link(link).unwrap().marks.missing_article);
    }

    #[tokio::test]
    async fn missing_source_page_becomes_red_link() {
        let (coordinator, _) = coordinator(MockTitleService::new());
        let (mut doc, section) = document(&["Nowhere"]);
        let report = coordinator.adapt(&mut doc, section).await.unwrap();
        assert_eq!(report.source_links.red_link, 1);
        assert_eq!(report.target_links.unadapted, 1);
    }

    #[tokio::test]
    async fn probing_can_be_disabled() {
        let service = Arc::new(MockTitleService::new().with_pair("en", "fr", "Paris", "Paris"));
        let mut config = EngineConfig::default().with_languages("en", "fr");
        config.probe_pages = false;
        let session = Session::new(config, service.clone()).unwrap();
        let coordinator = Coordinator::new(Arc::new(session));
        let (mut doc, section) = document(&["Paris"]);

        coordinator.adapt(&mut doc, section).await.unwrap();
        assert!(service.page_requests().is_empty());
    }

    #[tokio::test]
    async fn restored_section_skips_resolution() {
        let (coordinator, service) = coordinator(MockTitleService::new());
        let (mut doc, section) = document(&["Paris"]);
        if let Some(NodeKind::Section(markup)) = doc.target.get_mut(section).map(|n| &mut n.kind) {
            markup.restored = true;
        }
        coordinator.adapt(&mut doc, section).await.unwrap();
        assert_eq!(service.resolve_count(), 0);
    }

    #[tokio::test]
    async fn pass_is_bracketed_by_events() {
        let (coordinator, _) = coordinator(MockTitleService::new());
        let mut rx = coordinator.session().subscribe();
        let (mut doc, section) = document(&[]);

        coordinator.adapt(&mut doc, section).await.unwrap();
        assert_eq!(rx.try_recv().unwrap(), AdaptationEvent::DocumentReady { section });
        assert_eq!(rx.try_recv().unwrap(), AdaptationEvent::AdaptationComplete { section });
    }

    #[tokio::test]
    async fn adapting_a_non_section_fails() {
        let (coordinator, _) = coordinator(MockTitleService::new());
        let (mut doc, section) = document(&["Paris"]);
        let link = doc.target.links_under(section)[0];
        let result = coordinator.adapt(&mut doc, link).await;
        assert!(matches!(result, Err(EngineError::NotASection(_))));
    }
}
