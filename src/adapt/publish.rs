//! Publish-time cleanup of the target tree

use crate::error::EngineResult;
use crate::tree::ContentTree;
use tracing::info;

/// Convert every unadapted link to plain text.
///
/// Links deliberately marked as red links are kept. Returns the number of
/// links converted.
pub fn strip_unadapted(tree: &mut ContentTree) -> EngineResult<usize> {
    let doomed: Vec<_> = tree
        .walk()
        .into_iter()
        .filter(|n| {
            tree.get(*n)
                .and_then(|node| node.as_link())
                .is_some_and(|link| link.marks.unadapted && !link.marks.red_link)
        })
        .collect();

    let mut stripped = 0;
    for node in doomed {
        // A nested link may already be gone with its ancestor.
        if tree.get(node).is_none() {
            continue;
        }
        tree.unwrap_to_text(node)?;
        stripped += 1;
    }
    if stripped > 0 {
        info!(stripped, "converted unadapted links to text");
    }
    Ok(stripped)
}
