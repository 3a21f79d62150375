//! TitleResolver: batched, deduplicated, single-flight lookups
//!
//! Every title passes through [`normalize`] before it touches the cache or
//! the service. Uncached titles are chunked to the service's batch limit;
//! each chunk runs as its own task, so a caller that stops waiting does
//! not stop the lookup, and the result still lands in the cache.
//!
//! While a chunk is in flight its keys are registered in an in-flight
//! table. A concurrent caller asking for any of those keys awaits the
//! existing chunk instead of issuing a second request.

use super::cache::ResolutionCache;
use super::service::{LanguagePair, PageMeta, TitleQuery, TitleService};
use crate::title::{normalize, TitleKey};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures::future::{join_all, BoxFuture, FutureExt, Shared};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::{debug, warn};

/// Results of one chunk, keyed by normalized title
type ChunkResult = Arc<HashMap<TitleKey, Option<String>>>;

type InFlight<K, V> = Arc<DashMap<K, Shared<BoxFuture<'static, V>>>>;

/// Outcome of a page-existence probe
#[derive(Debug, Clone, PartialEq)]
pub enum PageLookup {
    /// The page exists
    Found(PageMeta),
    /// The page does not exist (cached)
    Missing,
    /// The probe failed; nothing was cached
    Failed,
}

impl PageLookup {
    pub fn exists(&self) -> Option<bool> {
        match self {
            PageLookup::Found(_) => Some(true),
            PageLookup::Missing => Some(false),
            PageLookup::Failed => None,
        }
    }

    pub fn meta(&self) -> Option<&PageMeta> {
        match self {
            PageLookup::Found(meta) => Some(meta),
            _ => None,
        }
    }
}

/// Resolves titles across languages through the cache and the service
#[derive(Clone)]
pub struct TitleResolver {
    service: Arc<dyn TitleService>,
    cache: Arc<ResolutionCache>,
    batch_limit: usize,
    pairs_in_flight: InFlight<(LanguagePair, TitleKey), ChunkResult>,
    pages_in_flight: InFlight<(String, TitleKey), PageLookup>,
}

impl TitleResolver {
    pub fn new(
        service: Arc<dyn TitleService>,
        cache: Arc<ResolutionCache>,
        batch_limit: usize,
    ) -> Self {
        Self {
            service,
            cache,
            batch_limit: batch_limit.max(1),
            pairs_in_flight: Arc::new(DashMap::new()),
            pages_in_flight: Arc::new(DashMap::new()),
        }
    }

    pub fn cache(&self) -> &Arc<ResolutionCache> {
        &self.cache
    }

    /// Cached counterpart of a raw title, without any lookup
    pub fn cached_pair(&self, title: &str, pair: &LanguagePair) -> Option<Option<String>> {
        normalize(title).and_then(|key| self.cache.pair(pair, &key))
    }

    /// Resolve a set of titles from `pair.from` into `pair.to`.
    ///
    /// Returns every title whose resolution is known: `Some(target)` when
    /// a counterpart exists, `None` when the service reports none. Titles
    /// whose lookup failed are left out and are not cached. Never fails.
    pub async fn resolve_titles<I, S>(
        &self,
        titles: I,
        pair: &LanguagePair,
    ) -> HashMap<TitleKey, Option<String>>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let requested: BTreeSet<TitleKey> = titles
            .into_iter()
            .filter_map(|t| normalize(t.as_ref()))
            .collect();

        let mut results = HashMap::new();
        let mut uncached = Vec::new();
        for key in &requested {
            match self.cache.pair(pair, key) {
                Some(target) => {
                    results.insert(key.clone(), target);
                }
                None => uncached.push(key.clone()),
            }
        }
        if uncached.is_empty() {
            debug!(pair = %pair, hits = results.len(), "all titles cached");
            return results;
        }

        let mut waiting: Vec<Shared<BoxFuture<'static, ChunkResult>>> = Vec::new();
        let mut launches = Vec::new();
        for chunk in uncached.chunks(self.batch_limit) {
            let (tx, rx) = oneshot::channel::<ChunkResult>();
            let shared = async move { rx.await.unwrap_or_default() }.boxed().shared();

            let mut claimed = Vec::new();
            for key in chunk {
                match self.pairs_in_flight.entry((pair.clone(), key.clone())) {
                    Entry::Occupied(existing) => waiting.push(existing.get().clone()),
                    Entry::Vacant(slot) => {
                        slot.insert(shared.clone());
                        claimed.push(key.clone());
                    }
                }
            }
            if !claimed.is_empty() {
                waiting.push(shared);
                launches.push((claimed, tx));
            }
        }

        debug!(
            pair = %pair,
            hits = results.len(),
            joined = waiting.len() - launches.len(),
            batches = launches.len(),
            "resolving titles"
        );

        for (keys, tx) in launches {
            let fetch = fetch_chunk(
                Arc::clone(&self.service),
                Arc::clone(&self.cache),
                Arc::clone(&self.pairs_in_flight),
                pair.clone(),
                keys,
                self.batch_limit,
            );
            tokio::spawn(async move {
                let _ = tx.send(fetch.await);
            });
        }

        for chunk in join_all(waiting).await {
            for (key, target) in chunk.iter() {
                if requested.contains(key) {
                    results.entry(key.clone()).or_insert_with(|| target.clone());
                }
            }
        }
        results
    }

    /// Probe existence and thumbnail of one page.
    ///
    /// Non-existence is cached like any other answer; a failed probe is not.
    pub async fn fetch_page_metadata(&self, title: &str, language: &str) -> PageLookup {
        let Some(key) = normalize(title) else {
            return PageLookup::Missing;
        };
        if let Some(cached) = self.cache.page(language, &key) {
            return cached.map_or(PageLookup::Missing, PageLookup::Found);
        }

        let (shared, launch) = match self.pages_in_flight.entry((language.to_string(), key.clone()))
        {
            Entry::Occupied(existing) => (existing.get().clone(), None),
            Entry::Vacant(slot) => {
                let (tx, rx) = oneshot::channel::<PageLookup>();
                let shared = async move { rx.await.unwrap_or(PageLookup::Failed) }
                    .boxed()
                    .shared();
                slot.insert(shared.clone());
                (shared, Some(tx))
            }
        };

        if let Some(tx) = launch {
            let service = Arc::clone(&self.service);
            let cache = Arc::clone(&self.cache);
            let in_flight = Arc::clone(&self.pages_in_flight);
            let language = language.to_string();
            tokio::spawn(async move {
                let lookup = probe_page(service.as_ref(), &cache, &language, key.clone()).await;
                in_flight.remove(&(language, key));
                let _ = tx.send(lookup);
            });
        }

        shared.await
    }
}

async fn fetch_chunk(
    service: Arc<dyn TitleService>,
    cache: Arc<ResolutionCache>,
    in_flight: InFlight<(LanguagePair, TitleKey), ChunkResult>,
    pair: LanguagePair,
    keys: Vec<TitleKey>,
    limit: usize,
) -> ChunkResult {
    let mut batch = HashMap::new();
    let mut to_fetch = Vec::new();
    for key in &keys {
        match cache.pair(&pair, key) {
            Some(target) => {
                batch.insert(key.clone(), target);
            }
            None => to_fetch.push(key.clone()),
        }
    }

    if !to_fetch.is_empty() {
        let query = TitleQuery {
            titles: to_fetch.iter().map(|k| k.as_str().to_string()).collect(),
            source_language: pair.from.clone(),
            target_language: pair.to.clone(),
            limit,
        };
        match service.resolve(&query).await {
            Ok(resolutions) => {
                let mut by_key: HashMap<TitleKey, Option<String>> = resolutions
                    .into_iter()
                    .filter_map(|(title, resolution)| {
                        normalize(&title).map(|key| (key, resolution.target))
                    })
                    .collect();
                for key in to_fetch {
                    let target = by_key.remove(&key).flatten();
                    cache.insert_pair(&pair, key.clone(), target.clone());
                    batch.insert(key, target);
                }
            }
            Err(e) => {
                warn!(pair = %pair, titles = query.titles.len(), error = %e, "title resolution failed");
            }
        }
    }

    // Cache writes are done; later callers read the cache instead.
    for key in keys {
        in_flight.remove(&(pair.clone(), key));
    }
    Arc::new(batch)
}

async fn probe_page(
    service: &dyn TitleService,
    cache: &ResolutionCache,
    language: &str,
    key: TitleKey,
) -> PageLookup {
    match service.page_metadata(key.as_str(), language).await {
        Ok(meta) if meta.exists => {
            cache.insert_page(language, key, Some(meta.clone()));
            PageLookup::Found(meta)
        }
        Ok(_) => {
            debug!(%language, title = %key, "page does not exist");
            cache.insert_page(language, key, None);
            PageLookup::Missing
        }
        Err(e) => {
            warn!(%language, title = %key, error = %e, "page metadata probe failed");
            PageLookup::Failed
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolve::service::MockTitleService;
    use std::time::Duration;

    fn resolver(service: Arc<MockTitleService>, batch_limit: usize) -> TitleResolver {
        TitleResolver::new(service, Arc::new(ResolutionCache::new()), batch_limit)
    }

    fn en_fr() -> LanguagePair {
        LanguagePair::new("en", "fr")
    }

    fn key(raw: &str) -> TitleKey {
        normalize(raw).unwrap()
    }

    #[tokio::test]
    async fn batch_resolves_present_and_absent() {
        let service = Arc::new(MockTitleService::new().with_pair("en", "fr", "Paris", "Paris (fr)"));
        let resolver = resolver(Arc::clone(&service), 50);

        let result = resolver.resolve_titles(["Paris", "Berlin"], &en_fr()).await;
        assert_eq!(result[&key("Paris")].as_deref(), Some("Paris (fr)"));
        assert_eq!(result[&key("Berlin")], None);

        let again = resolver.resolve_titles(["Paris", "Berlin"], &en_fr()).await;
        assert_eq!(again, result);
        assert_eq!(service.resolve_count(), 1);
    }

    #[tokio::test]
    async fn spellings_are_requested_once() {
        let service = Arc::new(MockTitleService::new().with_pair("en", "fr", "New York", "New York"));
        let resolver = resolver(Arc::clone(&service), 50);

        let result = resolver
            .resolve_titles(["New_York", "new_York", " New  York "], &en_fr())
            .await;
        assert_eq!(result.len(), 1);
        let requests = service.resolve_requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].titles, vec!["New York".to_string()]);
    }

    #[tokio::test]
    async fn large_batches_are_chunked() {
        let service = Arc::new(MockTitleService::new());
        let resolver = resolver(Arc::clone(&service), 2);

        let result = resolver
            .resolve_titles(["A", "B", "C", "D", "E"], &en_fr())
            .await;
        assert_eq!(result.len(), 5);
        let requests = service.resolve_requests();
        assert_eq!(requests.len(), 3);
        assert!(requests.iter().all(|q| q.titles.len() <= 2 && q.limit == 2));
    }

    #[tokio::test]
    async fn failure_resolves_empty_and_is_not_cached() {
        let service = Arc::new(MockTitleService::failing());
        let resolver = resolver(Arc::clone(&service), 50);

        let result = resolver.resolve_titles(["Paris"], &en_fr()).await;
        assert!(result.is_empty());
        assert!(resolver.cached_pair("Paris", &en_fr()).is_none());

        resolver.resolve_titles(["Paris"], &en_fr()).await;
        assert_eq!(service.resolve_count(), 2);
    }

    #[tokio::test]
    async fn concurrent_overlapping_calls_share_requests() {
        let service = Arc::new(
            MockTitleService::new()
                .with_pair("en", "fr", "Paris", "Paris (fr)")
                .with_latency(Duration::from_millis(50)),
        );
        let resolver = resolver(Arc::clone(&service), 50);
        let pair = en_fr();

        let (first, second) = tokio::join!(
            resolver.resolve_titles(["Paris", "Berlin"], &pair),
            resolver.resolve_titles(["Paris", "Rome"], &pair),
        );
        assert_eq!(first[&key("Paris")].as_deref(), Some("Paris (fr)"));
        assert_eq!(second[&key("Paris")].as_deref(), Some("Paris (fr)"));
        assert!(second.contains_key(&key("Rome")));
        assert!(!second.contains_key(&key("Berlin")));
        assert_eq!(service.requests_for("Paris"), 1);
        assert_eq!(service.resolve_count(), 2);
    }

    #[tokio::test]
    async fn dropped_caller_still_populates_cache() {
        let service = Arc::new(
            MockTitleService::new()
                .with_pair("en", "fr", "Paris", "Paris (fr)")
                .with_latency(Duration::from_millis(20)),
        );
        let resolver = resolver(Arc::clone(&service), 50);

        let pair = en_fr();
        let abandoned = tokio::time::timeout(
            Duration::from_millis(1),
            resolver.resolve_titles(["Paris"], &pair),
        )
        .await;
        assert!(abandoned.is_err());

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(
            resolver.cached_pair("Paris", &pair),
            Some(Some("Paris (fr)".to_string()))
        );
        assert_eq!(service.resolve_count(), 1);
    }

    #[tokio::test]
    async fn invalid_titles_are_skipped() {
        let service = Arc::new(MockTitleService::new());
        let resolver = resolver(Arc::clone(&service), 50);
        let result = resolver.resolve_titles(["", "a|b"], &en_fr()).await;
        assert!(result.is_empty());
        assert_eq!(service.resolve_count(), 0);
    }

    #[tokio::test]
    async fn missing_page_is_cached_terminal_state() {
        let service = Arc::new(MockTitleService::new());
        let resolver = resolver(Arc::clone(&service), 50);

        assert_eq!(resolver.fetch_page_metadata("Atlantis", "en").await, PageLookup::Missing);
        assert_eq!(resolver.fetch_page_metadata("atlantis", "en").await, PageLookup::Missing);
        assert_eq!(service.page_requests().len(), 1);
    }

    #[tokio::test]
    async fn concurrent_page_probes_share_one_request() {
        let service = Arc::new(
            MockTitleService::new()
                .with_page("en", PageMeta::existing("Paris"))
                .with_latency(Duration::from_millis(20)),
        );
        let resolver = resolver(Arc::clone(&service), 50);

        let (a, b) = tokio::join!(
            resolver.fetch_page_metadata("Paris", "en"),
            resolver.fetch_page_metadata("Paris", "en"),
        );
        assert_eq!(a.exists(), Some(true));
        assert_eq!(a, b);
        assert_eq!(service.page_requests().len(), 1);
    }

    #[tokio::test]
    async fn failed_probe_is_not_cached() {
        let service = Arc::new(MockTitleService::failing());
        let resolver = resolver(Arc::clone(&service), 50);

        assert_eq!(resolver.fetch_page_metadata("Paris", "en").await, PageLookup::Failed);
        assert_eq!(resolver.fetch_page_metadata("Paris", "en").await, PageLookup::Failed);
        assert_eq!(service.page_requests().len(), 2);
    }
}
