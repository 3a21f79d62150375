//! Presentation-neutral card models
//!
//! Cards describe what a tooltip for a selected link or reference would
//! show and which actions it would offer. Rendering is left to the
//! editing surface.

use crate::resolve::{PageMeta, Thumbnail};
use crate::tree::Side;
use serde::Serialize;

/// An action a link card offers
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum LinkAffordance {
    /// Open the existing page
    Open { url: String },
    /// Start translating the missing page of a red link
    CreatePage { title: String },
    /// Mark the link as a deliberate red link
    MarkMissing,
    /// Turn the current selection into this link
    AddLink,
    /// Replace the link by its text
    RemoveLink,
}

/// What is known about the page a card points at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PageStatus {
    Exists,
    RedLink,
    Missing,
}

/// Card for one side of a link
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LinkCard {
    pub side: Side,
    pub language: String,
    pub title: String,
    pub status: PageStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumbnail: Option<Thumbnail>,
    pub affordances: Vec<LinkAffordance>,
}

impl LinkCard {
    /// Build the card from a page probe.
    ///
    /// `page_url` maps an existing page to its article URL. `materialized`
    /// tells whether the link exists in its tree; it only matters on the
    /// target side, where it selects between adding and removing.
    pub fn build(
        side: Side,
        language: &str,
        title: &str,
        page: Option<&PageMeta>,
        red_link: bool,
        materialized: bool,
        page_url: impl Fn(&str) -> String,
    ) -> Self {
        let mut affordances = Vec::new();
        let status = match page {
            Some(meta) => {
                affordances.push(LinkAffordance::Open {
                    url: page_url(&meta.title),
                });
                PageStatus::Exists
            }
            None if red_link => {
                affordances.push(LinkAffordance::CreatePage {
                    title: title.to_string(),
                });
                PageStatus::RedLink
            }
            None => {
                affordances.push(LinkAffordance::MarkMissing);
                PageStatus::Missing
            }
        };

        if side == Side::Target {
            affordances.push(if materialized {
                LinkAffordance::RemoveLink
            } else {
                LinkAffordance::AddLink
            });
        }

        Self {
            side,
            language: language.to_string(),
            title: page.map_or_else(|| title.to_string(), |meta| meta.title.clone()),
            status,
            thumbnail: page.and_then(|meta| meta.thumbnail.clone()),
            affordances,
        }
    }

    pub fn offers(&self, affordance: &LinkAffordance) -> bool {
        self.affordances.contains(affordance)
    }
}

/// Cards shown for a selected link
///
/// The source card only appears when the source page exists.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LinkCards {
    pub source: Option<LinkCard>,
    pub target: LinkCard,
}

/// Action a reference card offers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferenceAffordance {
    /// Copy the source reference into the translation
    Add,
    /// Remove the reference from the translation
    Remove,
}

/// Card for a selected reference
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReferenceCard {
    pub side: Side,
    pub language: String,
    /// Visible label of the anchor, e.g. `[2]`
    pub label: String,
    /// Resolved footnote content; `None` when it could not be resolved
    pub content: Option<String>,
    pub affordance: ReferenceAffordance,
}
