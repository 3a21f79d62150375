//! Engine configuration
//!
//! Loaded from YAML. Every field has a default, so an empty file (or no
//! file at all) yields a working English → Spanish configuration.
//!
//! ```yaml
//! source_language: en
//! target_language: fr
//! batch_limit: 50
//! site:
//!   api_url: "https://$1.wikipedia.org/w/api.php"
//!   domain_codes:
//!     nb: "no"
//! ```

use crate::error::{EngineError, EngineResult};
use crate::resolve::LanguagePair;
use crate::tree::Side;
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Bytes escaped in article paths. Punctuation the wiki leaves readable
/// in its own URLs stays as is.
const TITLE_PATH: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')')
    .remove(b';')
    .remove(b'@')
    .remove(b'$')
    .remove(b',')
    .remove(b'/')
    .remove(b':');
use std::path::{Path, PathBuf};

/// Titles per request accepted by the resolution service.
pub const DEFAULT_BATCH_LIMIT: usize = 50;

/// Thumbnail width requested with page metadata, in pixels.
pub const DEFAULT_THUMBNAIL_SIZE: u32 = 150;

/// Prefix that turns a source identifier into its target-tree form.
pub const DEFAULT_TARGET_MARKER: &str = "cx";

/// Maps languages to wiki endpoints
///
/// `$1` in a template is replaced by the wiki domain code, `$2` by the
/// page title.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SiteMapper {
    /// Action API endpoint template
    pub api_url: String,
    /// Article view URL template
    pub page_url: String,
    /// Language codes whose wiki uses a different domain code
    pub domain_codes: HashMap<String, String>,
}

impl Default for SiteMapper {
    fn default() -> Self {
        let domain_codes = [("be-tarask", "be-x-old"), ("nb", "no")]
            .into_iter()
            .map(|(lang, code)| (lang.to_string(), code.to_string()))
            .collect();
        Self {
            api_url: "https://$1.wikipedia.org/w/api.php".to_string(),
            page_url: "https://$1.wikipedia.org/wiki/$2".to_string(),
            domain_codes,
        }
    }
}

impl SiteMapper {
    /// Wiki domain code for a language (`nb` → `no`)
    pub fn domain_code<'a>(&'a self, language: &'a str) -> &'a str {
        self.domain_codes
            .get(language)
            .map(String::as_str)
            .unwrap_or(language)
    }

    /// API endpoint for a language
    pub fn api_url(&self, language: &str) -> String {
        self.api_url.replace("$1", self.domain_code(language))
    }

    /// Article URL for a title in a language
    pub fn page_url(&self, language: &str, title: &str) -> String {
        let title = title.trim().replace(' ', "_");
        let title = utf8_percent_encode(&title, TITLE_PATH).to_string();
        self.page_url
            .replace("$1", self.domain_code(language))
            .replace("$2", &title)
    }
}

/// Configuration for one editing session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Language of the source tree
    pub source_language: String,
    /// Language of the target (translated) tree
    pub target_language: String,
    /// Maximum titles per resolution request
    pub batch_limit: usize,
    /// Thumbnail width requested with page metadata
    pub thumbnail_size: u32,
    /// Whether adaptation passes probe page existence after resolving titles
    pub probe_pages: bool,
    /// Prefix applied to identifiers in the target tree
    pub target_marker: String,
    /// Default log filter used by the CLI
    pub log_level: String,
    /// Wiki endpoint mapping
    pub site: SiteMapper,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            source_language: "en".to_string(),
            target_language: "es".to_string(),
            batch_limit: DEFAULT_BATCH_LIMIT,
            thumbnail_size: DEFAULT_THUMBNAIL_SIZE,
            probe_pages: true,
            target_marker: DEFAULT_TARGET_MARKER.to_string(),
            log_level: "info".to_string(),
            site: SiteMapper::default(),
        }
    }
}

impl EngineConfig {
    /// Parse and validate a YAML configuration
    pub fn from_yaml_str(yaml: &str) -> EngineResult<Self> {
        let config: Self = if yaml.trim().is_empty() {
            Self::default()
        } else {
            serde_yaml::from_str(yaml)?
        };
        config.validate()?;
        Ok(config)
    }

    /// Load from a YAML file
    pub fn load(path: impl AsRef<Path>) -> EngineResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&text)
    }

    /// Load from the default location, falling back to defaults when the
    /// file does not exist
    pub fn load_default() -> EngineResult<Self> {
        match Self::default_path() {
            Some(path) if path.exists() => Self::load(path),
            _ => Ok(Self::default()),
        }
    }

    /// Default config path (`~/.config/interlang/config.yaml` on Linux)
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("interlang").join("config.yaml"))
    }

    /// Replace the language pair
    pub fn with_languages(mut self, source: impl Into<String>, target: impl Into<String>) -> Self {
        self.source_language = source.into();
        self.target_language = target.into();
        self
    }

    /// Check invariants the engine relies on
    pub fn validate(&self) -> EngineResult<()> {
        if self.source_language.trim().is_empty() || self.target_language.trim().is_empty() {
            return Err(EngineError::InvalidConfig(
                "source_language and target_language must be set".to_string(),
            ));
        }
        if self.source_language == self.target_language {
            return Err(EngineError::InvalidConfig(format!(
                "source and target languages cannot be the same ({})",
                self.source_language
            )));
        }
        if self.batch_limit == 0 {
            return Err(EngineError::InvalidConfig(
                "batch_limit must be at least 1".to_string(),
            ));
        }
        if self.target_marker.is_empty() {
            return Err(EngineError::InvalidConfig(
                "target_marker must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Language of one side of the document
    pub fn language(&self, side: Side) -> &str {
        match side {
            Side::Source => &self.source_language,
            Side::Target => &self.target_language,
        }
    }

    /// Source → target pair used for link adaptation
    pub fn language_pair(&self) -> LanguagePair {
        LanguagePair::new(&self.source_language, &self.target_language)
    }
}
