//! MediaWiki Action API implementation of [`TitleService`]
//!
//! Titles are resolved through `prop=langlinks` on the wiki of the titles'
//! own language, asking for the interlanguage link into the other
//! language. Page existence comes from `prop=pageimages`, which also
//! yields the thumbnail shown on link cards.

use super::service::{PageMeta, Resolution, ServiceError, Thumbnail, TitleQuery, TitleService};
use crate::config::SiteMapper;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::collections::HashMap;
use tracing::debug;

/// Largest `lllimit` the API accepts.
const LANGLINK_LIMIT_MAX: usize = 500;

#[derive(Debug, Deserialize)]
struct ApiResponse {
    query: Option<ApiQuery>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ApiQuery {
    pages: HashMap<String, ApiPage>,
    redirects: Vec<TitleMapping>,
    normalized: Vec<TitleMapping>,
}

#[derive(Debug, Deserialize)]
struct TitleMapping {
    from: String,
    to: String,
}

#[derive(Debug, Deserialize)]
struct ApiPage {
    title: String,
    #[serde(default)]
    langlinks: Vec<LangLink>,
    /// Present (as an empty string) when the page does not exist
    missing: Option<serde_json::Value>,
    thumbnail: Option<Thumbnail>,
}

#[derive(Debug, Deserialize)]
struct LangLink {
    #[serde(rename = "*")]
    title: String,
}

/// Map a `prop=langlinks` response to resolutions keyed by requested title.
///
/// A page reached through a redirect is keyed by the redirect's `from`,
/// otherwise by its own title; title normalizations reported by the API
/// are undone the same way. A response without a `query` block yields an
/// empty map.
pub fn pairs_from_response(body: &str) -> Result<HashMap<String, Resolution>, ServiceError> {
    let response: ApiResponse = serde_json::from_str(body)?;
    let Some(query) = response.query else {
        return Ok(HashMap::new());
    };

    let mut pairs = HashMap::new();
    for page in query.pages.into_values() {
        let mut resolution = Resolution {
            target: page.langlinks.into_iter().next().map(|link| link.title),
            redirects: Vec::new(),
        };
        let mut key = page.title;
        if let Some(redirect) = query.redirects.iter().find(|r| r.to == key) {
            resolution.redirects.push(redirect.from.clone());
            key = redirect.from.clone();
        }
        if let Some(normalized) = query.normalized.iter().find(|n| n.to == key) {
            key = normalized.from.clone();
        }
        pairs.insert(key, resolution);
    }
    Ok(pairs)
}

/// Map a `prop=pageimages` response for a single title to page metadata.
pub fn page_from_response(title: &str, body: &str) -> Result<PageMeta, ServiceError> {
    let response: ApiResponse = serde_json::from_str(body)?;
    let page = response
        .query
        .and_then(|q| q.pages.into_iter().next());

    Ok(match page {
        Some((page_id, page)) => PageMeta {
            exists: !page_id.starts_with('-') && page.missing.is_none(),
            title: page.title,
            thumbnail: page.thumbnail,
        },
        None => PageMeta::missing(title),
    })
}

/// Resolution service backed by live wikis
pub struct MediaWikiService {
    client: Client,
    site: SiteMapper,
    thumbnail_size: u32,
}

impl MediaWikiService {
    pub fn new(site: SiteMapper, thumbnail_size: u32) -> Self {
        Self {
            client: Client::new(),
            site,
            thumbnail_size,
        }
    }

    async fn get(&self, language: &str, params: &[(&str, String)]) -> Result<String, ServiceError> {
        let url = self.site.api_url(language);
        debug!(%url, "querying wiki API");
        let response = self.client.get(&url).query(params).send().await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(ServiceError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(body)
    }
}

#[async_trait]
impl TitleService for MediaWikiService {
    async fn resolve(
        &self,
        query: &TitleQuery,
    ) -> Result<HashMap<String, Resolution>, ServiceError> {
        if query.titles.is_empty() {
            return Ok(HashMap::new());
        }
        let limit = query.titles.len().min(query.limit).min(LANGLINK_LIMIT_MAX);
        let params = [
            ("action", "query".to_string()),
            ("format", "json".to_string()),
            ("prop", "langlinks".to_string()),
            ("titles", query.titles.join("|")),
            ("lllimit", limit.to_string()),
            (
                "lllang",
                self.site.domain_code(&query.target_language).to_string(),
            ),
            ("redirects", "1".to_string()),
        ];
        let body = self.get(&query.source_language, &params).await?;
        pairs_from_response(&body)
    }

    async fn page_metadata(&self, title: &str, language: &str) -> Result<PageMeta, ServiceError> {
        let params = [
            ("action", "query".to_string()),
            ("format", "json".to_string()),
            ("prop", "pageimages".to_string()),
            ("piprop", "thumbnail".to_string()),
            ("pithumbsize", self.thumbnail_size.to_string()),
            ("titles", title.to_string()),
            ("redirects", "1".to_string()),
        ];
        let body = self.get(language, &params).await?;
        page_from_response(title, &body)
    }
}
