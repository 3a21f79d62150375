//! Title normalization
//!
//! Raw titles arrive in many spellings (`new_york`, ` New  York `,
//! `New York#History`). Every cache read, cache write and batch lookup is
//! keyed by a [`TitleKey`], and a `TitleKey` can only be produced by
//! [`normalize`], so two spellings of one title always share a cache slot.
//!
//! The case rule follows the resolution service: the first character is
//! uppercased, the remainder is left as written.

use serde::Serialize;

/// Characters that can never appear in a page title.
const ILLEGAL_CHARS: &[char] = &['<', '>', '[', ']', '{', '}', '|'];

/// Canonical comparison key for a page title
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct TitleKey(String);

impl TitleKey {
    /// The canonical title text (spaces, not underscores)
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consume the key, returning the canonical title text
    pub fn into_string(self) -> String {
        self.0
    }
}

impl std::fmt::Display for TitleKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for TitleKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Normalize a raw title into its canonical key.
///
/// - drops any `#fragment`
/// - treats underscores as spaces and collapses whitespace runs
/// - strips a leading `:` (explicit main-namespace prefix)
/// - uppercases the first character
///
/// Returns `None` for titles that cannot name a page (empty, or
/// containing characters the service rejects).
pub fn normalize(raw: &str) -> Option<TitleKey> {
    let without_fragment = raw.split('#').next().unwrap_or_default();
    let spaced = without_fragment.replace('_', " ");
    let collapsed = spaced.split_whitespace().collect::<Vec<_>>().join(" ");
    let trimmed = collapsed.trim_start_matches(':').trim_start();

    if trimmed.is_empty() || trimmed.contains(ILLEGAL_CHARS) {
        return None;
    }

    let mut chars = trimmed.chars();
    let first = chars.next()?;
    let mut key: String = first.to_uppercase().collect();
    key.push_str(chars.as_str());
    Some(TitleKey(key))
}

/// Normalized display text for a title, falling back to the trimmed input
/// when the title is not valid.
pub fn display_title(raw: &str) -> String {
    normalize(raw)
        .map(TitleKey::into_string)
        .unwrap_or_else(|| raw.trim().to_string())
}
