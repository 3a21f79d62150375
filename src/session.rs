//! Session: the context every engine operation runs in
//!
//! A session owns the resolution cache, the correspondence registries and
//! the event channel for one editing session. Drop it when the document is
//! closed; nothing it holds outlives the session.

use crate::adapt::AdaptationEvent;
use crate::config::EngineConfig;
use crate::error::EngineResult;
use crate::link::{LinkEntity, LinkTool};
use crate::reference::{ReferenceEntity, ReferenceTool};
use crate::registry::{Identifier, Registry};
use crate::resolve::{LanguagePair, ResolutionCache, TitleResolver, TitleService};
use crate::tree::Side;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::debug;

/// Events buffered per subscriber before the oldest are dropped.
const EVENT_CAPACITY: usize = 256;

/// One editing session over a source/target language pair
pub struct Session {
    config: EngineConfig,
    resolver: TitleResolver,
    links: Registry<LinkEntity>,
    references: Registry<ReferenceEntity>,
    events: broadcast::Sender<AdaptationEvent>,
}

impl Session {
    /// Start a session. Fails only on an invalid configuration.
    pub fn new(config: EngineConfig, service: Arc<dyn TitleService>) -> EngineResult<Self> {
        config.validate()?;
        let cache = Arc::new(ResolutionCache::new());
        let resolver = TitleResolver::new(service, cache, config.batch_limit);
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        debug!(
            source = %config.source_language,
            target = %config.target_language,
            "session started"
        );
        Ok(Self {
            config,
            resolver,
            links: Registry::default(),
            references: Registry::default(),
            events,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn resolver(&self) -> &TitleResolver {
        &self.resolver
    }

    pub fn cache(&self) -> &ResolutionCache {
        self.resolver.cache()
    }

    pub fn link_registry(&self) -> &Registry<LinkEntity> {
        &self.links
    }

    pub fn reference_registry(&self) -> &Registry<ReferenceEntity> {
        &self.references
    }

    /// Language of one side
    pub fn language(&self, side: Side) -> &str {
        self.config.language(side)
    }

    /// Source → target pair
    pub fn language_pair(&self) -> LanguagePair {
        self.config.language_pair()
    }

    pub fn marker(&self) -> &str {
        &self.config.target_marker
    }

    /// Identifier as stored in the tree of `side`
    pub fn marked(&self, id: &Identifier, side: Side) -> String {
        id.marked(side, &self.config.target_marker)
    }

    /// Base identifier from a value stored in the tree of `side`
    pub fn identifier(&self, raw: &str, side: Side) -> Identifier {
        Identifier::from_marked(raw, side, &self.config.target_marker)
    }

    /// Article URL for a title on one side
    pub fn page_url(&self, side: Side, title: &str) -> String {
        self.config.site.page_url(self.language(side), title)
    }

    /// Subscribe to engine events
    pub fn subscribe(&self) -> broadcast::Receiver<AdaptationEvent> {
        self.events.subscribe()
    }

    /// Emit an event; having no subscribers is not an error
    pub(crate) fn emit(&self, event: AdaptationEvent) {
        debug!(?event, "emit");
        let _ = self.events.send(event);
    }

    /// Link operations
    pub fn links(&self) -> LinkTool<'_> {
        LinkTool::new(self)
    }

    /// Reference operations
    pub fn references(&self) -> ReferenceTool<'_> {
        ReferenceTool::new(self)
    }
}
