//! Extension-to-media-type lookup table.
//!
//! Loaded from a `mime.types` file: one `type ext [ext...]` entry per
//! line, `#` comments and blank lines skipped, tabs treated as spaces. A
//! lookup miss is passed through as `None` — the response stage then emits
//! an empty `Content-Type` value rather than guessing.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Error from loading the media-type table.
#[derive(Debug, Error)]
pub enum MimeError {
    #[error("failed to read mime.types file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Extension → media-type table.
///
/// # Examples
///
/// ```
/// use modserve::mime::MediaTypes;
///
/// let mut types = MediaTypes::new();
/// types.register("text/html", "html htm");
/// assert_eq!(types.lookup("html"), Some("text/html"));
/// assert_eq!(types.lookup("bin"), None);
/// ```
#[derive(Debug, Clone, Default)]
pub struct MediaTypes {
    by_ext: HashMap<String, String>,
}

impl MediaTypes {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads a `mime.types` file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, MimeError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| MimeError::Io {
            path: path.to_owned(),
            source,
        })?;
        Ok(Self::parse(&text))
    }

    /// Parses `mime.types` text.
    pub fn parse(text: &str) -> Self {
        let mut table = Self::new();
        for line in text.lines() {
            let line = line.replace('\t', " ");
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            if let Some((media_type, extensions)) = line.split_once(' ') {
                table.register(media_type, extensions);
            }
            // A type with no extensions maps to nothing; skip it.
        }
        table
    }

    /// Registers one media type for a space-separated list of extensions
    /// (without leading periods). The first registration for an extension
    /// wins.
    pub fn register(&mut self, media_type: &str, extensions: &str) {
        for ext in extensions.split_whitespace() {
            self.by_ext
                .entry(ext.to_owned())
                .or_insert_with(|| media_type.to_owned());
        }
    }

    /// Returns the media type for `ext` (no leading period), or `None`.
    pub fn lookup(&self, ext: &str) -> Option<&str> {
        self.by_ext.get(ext).map(String::as_str)
    }

    /// Returns the number of registered extensions.
    pub fn len(&self) -> usize {
        self.by_ext.len()
    }

    /// Returns `true` if no extensions are registered.
    pub fn is_empty(&self) -> bool {
        self.by_ext.is_empty()
    }
}
