//! Resolution service: the external collaborator that maps titles across
//! languages and reports page existence
//!
//! Two implementations:
//! - `MediaWikiService`: the wiki Action API over HTTP (production)
//! - `MockTitleService`: preconfigured answers with a request log (testing)

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::Duration;

/// Ordered (from, to) language pair scoping title resolutions
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LanguagePair {
    pub from: String,
    pub to: String,
}

impl LanguagePair {
    pub fn new(from: &str, to: &str) -> Self {
        Self {
            from: from.to_string(),
            to: to.to_string(),
        }
    }
}

impl std::fmt::Display for LanguagePair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}→{}", self.from, self.to)
    }
}

/// One batched resolution request
#[derive(Debug, Clone, PartialEq)]
pub struct TitleQuery {
    pub titles: Vec<String>,
    pub source_language: String,
    pub target_language: String,
    pub limit: usize,
}

/// Resolution of one requested title
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Resolution {
    /// Counterpart title in the target language, if any
    pub target: Option<String>,
    /// Redirects followed from the requested title to the canonical one
    #[serde(default)]
    pub redirects: Vec<String>,
}

impl Resolution {
    pub fn found(target: impl Into<String>) -> Self {
        Self {
            target: Some(target.into()),
            redirects: Vec::new(),
        }
    }

    pub fn absent() -> Self {
        Self::default()
    }
}

/// Page thumbnail
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Thumbnail {
    pub source: String,
    #[serde(default)]
    pub width: u32,
    #[serde(default)]
    pub height: u32,
}

/// Existence and thumbnail of one page
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageMeta {
    pub title: String,
    pub exists: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnail: Option<Thumbnail>,
}

impl PageMeta {
    pub fn existing(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            exists: true,
            thumbnail: None,
        }
    }

    pub fn missing(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            exists: false,
            thumbnail: None,
        }
    }

    pub fn with_thumbnail(mut self, source: impl Into<String>, width: u32, height: u32) -> Self {
        self.thumbnail = Some(Thumbnail {
            source: source.into(),
            width,
            height,
        });
        self
    }
}

/// Errors from the resolution service
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("resolution service unavailable: {0}")]
    Unavailable(String),
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("service returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("malformed response: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Client trait for the resolution service.
///
/// Abstracts over transport so the resolver doesn't depend on how the
/// service is reached. Callers are responsible for chunking to `limit`.
#[async_trait]
pub trait TitleService: Send + Sync {
    /// Resolve a batch of titles. The returned map is keyed by the title
    /// as requested; titles without a counterpart may be absent or map to
    /// a `Resolution` with no target.
    async fn resolve(&self, query: &TitleQuery)
        -> Result<HashMap<String, Resolution>, ServiceError>;

    /// Existence and thumbnail for a single page
    async fn page_metadata(&self, title: &str, language: &str) -> Result<PageMeta, ServiceError>;
}

/// Mock service for testing: returns preconfigured answers and records
/// every request it receives.
#[derive(Default)]
pub struct MockTitleService {
    pairs: HashMap<(LanguagePair, String), String>,
    redirects: HashMap<(LanguagePair, String), String>,
    pages: HashMap<(String, String), PageMeta>,
    failing: bool,
    latency: Option<Duration>,
    resolve_log: Mutex<Vec<TitleQuery>>,
    page_log: Mutex<Vec<(String, String)>>,
}

impl MockTitleService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer `title` in `from` with `target` in `to`
    pub fn with_pair(mut self, from: &str, to: &str, title: &str, target: &str) -> Self {
        self.pairs.insert(
            (LanguagePair::new(from, to), title.to_string()),
            target.to_string(),
        );
        self
    }

    /// Follow a redirect from `alias` to the canonical `title` before looking up
    pub fn with_redirect(mut self, from: &str, to: &str, alias: &str, title: &str) -> Self {
        self.redirects.insert(
            (LanguagePair::new(from, to), alias.to_string()),
            title.to_string(),
        );
        self
    }

    /// Register page metadata for a title in a language
    pub fn with_page(mut self, language: &str, meta: PageMeta) -> Self {
        self.pages
            .insert((language.to_string(), meta.title.clone()), meta);
        self
    }

    /// Every request fails with `Unavailable`
    pub fn failing() -> Self {
        Self {
            failing: true,
            ..Self::default()
        }
    }

    /// Delay every response
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Resolution requests received so far
    pub fn resolve_requests(&self) -> Vec<TitleQuery> {
        self.resolve_log
            .lock()
            .map(|log| log.clone())
            .unwrap_or_default()
    }

    pub fn resolve_count(&self) -> usize {
        self.resolve_requests().len()
    }

    /// How many resolution requests included `title`
    pub fn requests_for(&self, title: &str) -> usize {
        self.resolve_requests()
            .iter()
            .filter(|q| q.titles.iter().any(|t| t == title))
            .count()
    }

    /// Page metadata requests received so far, as (title, language)
    pub fn page_requests(&self) -> Vec<(String, String)> {
        self.page_log
            .lock()
            .map(|log| log.clone())
            .unwrap_or_default()
    }

    async fn delay(&self) {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
    }
}

#[async_trait]
impl TitleService for MockTitleService {
    async fn resolve(
        &self,
        query: &TitleQuery,
    ) -> Result<HashMap<String, Resolution>, ServiceError> {
        if let Ok(mut log) = self.resolve_log.lock() {
            log.push(query.clone());
        }
        self.delay().await;
        if self.failing {
            return Err(ServiceError::Unavailable(
                "mock service configured as failing".to_string(),
            ));
        }

        let pair = LanguagePair::new(&query.source_language, &query.target_language);
        let mut seen = HashSet::new();
        let mut results = HashMap::new();
        for title in query.titles.iter().filter(|t| seen.insert(t.as_str())) {
            let mut resolution = Resolution::absent();
            let canonical = match self.redirects.get(&(pair.clone(), title.clone())) {
                Some(canonical) => {
                    resolution.redirects.push(title.clone());
                    canonical.clone()
                }
                None => title.clone(),
            };
            resolution.target = self.pairs.get(&(pair.clone(), canonical)).cloned();
            results.insert(title.clone(), resolution);
        }
        Ok(results)
    }

    async fn page_metadata(&self, title: &str, language: &str) -> Result<PageMeta, ServiceError> {
        if let Ok(mut log) = self.page_log.lock() {
            log.push((title.to_string(), language.to_string()));
        }
        self.delay().await;
        if self.failing {
            return Err(ServiceError::Unavailable(
                "mock service configured as failing".to_string(),
            ));
        }
        Ok(self
            .pages
            .get(&(language.to_string(), title.to_string()))
            .cloned()
            .unwrap_or_else(|| PageMeta::missing(title)))
    }
}
