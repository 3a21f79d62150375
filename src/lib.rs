//! Interlang: cross-language link and reference adaptation
//!
//! Keeps a source content tree and its translated target tree consistent
//! with respect to links and footnote references. Link titles are resolved
//! across the language boundary in cached, single-flight batches, and an
//! identifier-keyed registry pairs every occurrence with its counterpart
//! in the other tree.
//!
//! # Core Concepts
//!
//! - **Session**: the cache, registries and event channel of one editing session
//! - **Link / Reference entities**: derived views over tree markup with their own state
//! - **Coordinator**: whole-section passes that resolve first, then adapt
//!
//! # Example
//!
//! ```
//! use interlang::{EngineConfig, MockTitleService, Session};
//! use std::sync::Arc;
//!
//! let config = EngineConfig::default().with_languages("en", "fr");
//! let session = Session::new(config, Arc::new(MockTitleService::new())).unwrap();
//! assert_eq!(session.language_pair().to_string(), "en→fr");
//! ```

pub mod adapt;
pub mod card;
pub mod config;
mod error;
pub mod link;
pub mod reference;
pub mod registry;
pub mod resolve;
pub mod selection;
mod session;
pub mod title;
pub mod tree;

pub use adapt::{strip_unadapted, AdaptationEvent, AdaptationReport, Coordinator};
pub use card::{LinkCard, LinkCards, ReferenceCard};
pub use config::{EngineConfig, SiteMapper};
pub use error::{EngineError, EngineResult};
pub use link::{LinkEntity, LinkState};
pub use reference::{ReferenceEntity, ReferenceState};
pub use registry::{Identifier, Registry};
pub use resolve::{
    LanguagePair, MediaWikiService, MockTitleService, PageMeta, ServiceError, TitleResolver,
    TitleService,
};
pub use selection::{MemorySelection, Selection, SelectionProvider};
pub use session::Session;
pub use title::{normalize, TitleKey};
pub use tree::{ContentTree, Document, NodeId, NodeKind, SectionCorrespondence, Side};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
