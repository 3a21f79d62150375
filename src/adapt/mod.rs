//! Adaptation passes over a document
//!
//! The coordinator resolves and adapts whole sections, events announce
//! progress to the editing surface, and publish cleans the target tree
//! before it leaves the engine.

mod coordinator;
mod events;
pub mod publish;

pub use coordinator::{AdaptationReport, Coordinator, LinkTally};
pub use events::{AdaptationEvent, SectionKind};
pub use publish::strip_unadapted;
