//! Signals emitted at tree boundaries
//!
//! Fire-and-observe: the engine never waits for a listener. Sections are
//! target-tree node ids.

use crate::registry::Identifier;
use crate::tree::{NodeId, Side};
use serde::Serialize;

/// What kind of section was requested from the editing surface
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SectionKind {
    ReferenceList,
}

/// An event emitted by the engine
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum AdaptationEvent {
    /// A target section is ready for its adaptation pass
    DocumentReady { section: NodeId },
    /// A link was selected; the presentation layer may show its cards
    LinkSelected { id: Identifier, side: Side },
    /// A reference was selected
    ReferenceSelected { id: Identifier, side: Side },
    /// All links and references of a target section have been adapted
    AdaptationComplete { section: NodeId },
    /// The engine changed the content of a target section
    InputChanged { section: NodeId },
    /// The engine created a target section the surface has not seen yet
    SectionAdded {
        section: NodeId,
        source_section: Option<NodeId>,
        kind: SectionKind,
    },
}

impl AdaptationEvent {
    /// Target section the event concerns, if any
    pub fn section(&self) -> Option<NodeId> {
        match self {
            AdaptationEvent::DocumentReady { section }
            | AdaptationEvent::AdaptationComplete { section }
            | AdaptationEvent::InputChanged { section }
            | AdaptationEvent::SectionAdded { section, .. } => Some(*section),
            AdaptationEvent::LinkSelected { .. } | AdaptationEvent::ReferenceSelected { .. } => {
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn section_events_expose_their_section() {
        let section = NodeId::from_index(3);
        let event = AdaptationEvent::AdaptationComplete { section };
        assert_eq!(event.section(), Some(section));

        let event = AdaptationEvent::LinkSelected {
            id: Identifier::new("7"),
            side: Side::Source,
        };
        assert_eq!(event.section(), None);
    }

    #[test]
    fn events_serialize_with_tag() {
        let event = AdaptationEvent::ReferenceSelected {
            id: Identifier::new("cite_note-1"),
            side: Side::Target,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "reference_selected");
        assert_eq!(json["id"], "cite_note-1");
        assert_eq!(json["side"], "target");
    }
}
