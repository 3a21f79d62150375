//! Cross-language title resolution
//!
//! The service boundary, the session cache and the single-flight resolver
//! that sits between them.

mod cache;
mod client;
pub mod mediawiki;
mod service;

pub use cache::ResolutionCache;
pub use client::{PageLookup, TitleResolver};
pub use mediawiki::MediaWikiService;
pub use service::{
    LanguagePair, MockTitleService, PageMeta, Resolution, ServiceError, Thumbnail, TitleQuery,
    TitleService,
};
