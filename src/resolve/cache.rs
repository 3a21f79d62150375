//! Session-lifetime resolution cache
//!
//! Two append-only maps: title pairs per language pair, and page metadata
//! per (language, title). A key, once written, is never overwritten, so
//! concurrent writers racing on the same key are harmless.

use super::service::{LanguagePair, PageMeta};
use crate::title::TitleKey;
use dashmap::DashMap;
use tracing::debug;

/// Cached knowledge about titles and pages
#[derive(Debug, Default)]
pub struct ResolutionCache {
    /// `None` records that the title has no counterpart
    pairs: DashMap<(LanguagePair, TitleKey), Option<String>>,
    /// `None` records that the page does not exist
    pages: DashMap<(String, TitleKey), Option<PageMeta>>,
}

impl ResolutionCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached counterpart of a title.
    ///
    /// Outer `None`: never looked up. `Some(None)`: looked up, no counterpart.
    pub fn pair(&self, pair: &LanguagePair, title: &TitleKey) -> Option<Option<String>> {
        self.pairs
            .get(&(pair.clone(), title.clone()))
            .map(|entry| entry.value().clone())
    }

    /// Record a counterpart (or its absence). Existing entries win.
    pub fn insert_pair(&self, pair: &LanguagePair, title: TitleKey, target: Option<String>) {
        let key = (pair.clone(), title);
        if self.pairs.contains_key(&key) {
            return;
        }
        debug!(pair = %key.0, title = %key.1, ?target, "caching title pair");
        self.pairs.entry(key).or_insert(target);
    }

    pub fn contains_pair(&self, pair: &LanguagePair, title: &TitleKey) -> bool {
        self.pairs.contains_key(&(pair.clone(), title.clone()))
    }

    /// Cached page metadata.
    ///
    /// Outer `None`: never probed. `Some(None)`: the page does not exist.
    pub fn page(&self, language: &str, title: &TitleKey) -> Option<Option<PageMeta>> {
        self.pages
            .get(&(language.to_string(), title.clone()))
            .map(|entry| entry.value().clone())
    }

    /// Record page metadata (or non-existence). Existing entries win.
    pub fn insert_page(&self, language: &str, title: TitleKey, meta: Option<PageMeta>) {
        self.pages
            .entry((language.to_string(), title))
            .or_insert(meta);
    }

    /// Number of cached title pairs
    pub fn pair_count(&self) -> usize {
        self.pairs.len()
    }

    /// Number of cached page probes
    pub fn page_count(&self) -> usize {
        self.pages.len()
    }
}
