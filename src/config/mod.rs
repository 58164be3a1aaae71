//! Key-value configuration loader.
//!
//! The configuration file is line-oriented: one `Directive value...` pair
//! per line, `#` starts a comment, blank lines are skipped, and the first
//! space separates the directive name from its value. Directives the core
//! consumes: `Address`, `Port`, `DocumentRoot`, `DirectoryIndex`,
//! `ServerName`, `ModulesDir`.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Errors from loading or interpreting the configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid value for directive {directive}: {value}")]
    InvalidDirective { directive: &'static str, value: String },
}

/// Loaded configuration directives with typed accessors.
///
/// Unknown directives are kept and reachable through [`get`](Self::get) so
/// modules can define their own.
#[derive(Debug, Clone, Default)]
pub struct Config {
    directives: HashMap<String, String>,
}

impl Config {
    /// Loads and parses the configuration file at `path`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_owned(),
            source,
        })?;
        let config = Self::parse(&text);
        // Surface a bad Port at load time instead of at bind time.
        config.port()?;
        Ok(config)
    }

    /// Parses configuration text. Lines without a space are ignored.
    pub fn parse(text: &str) -> Self {
        let mut directives = HashMap::new();
        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            if let Some((key, value)) = line.split_once(' ') {
                directives.insert(key.trim().to_owned(), value.trim().to_owned());
            }
        }
        Self { directives }
    }

    /// Returns the raw value of a directive, if present.
    pub fn get(&self, directive: &str) -> Option<&str> {
        self.directives.get(directive).map(String::as_str)
    }

    /// The address to bind, default `127.0.0.1`.
    pub fn address(&self) -> &str {
        self.get("Address").unwrap_or("127.0.0.1")
    }

    /// The port to bind, default 8080.
    pub fn port(&self) -> Result<u16, ConfigError> {
        match self.get("Port") {
            Some(value) => value
                .parse()
                .map_err(|_| ConfigError::InvalidDirective {
                    directive: "Port",
                    value: value.to_owned(),
                }),
            None => Ok(8080),
        }
    }

    /// `address:port`, ready for the listener.
    pub fn bind_addr(&self) -> Result<String, ConfigError> {
        Ok(format!("{}:{}", self.address(), self.port()?))
    }

    /// The directory served files are resolved under, default `.`.
    pub fn document_root(&self) -> PathBuf {
        PathBuf::from(self.get("DocumentRoot").unwrap_or("."))
    }

    /// Directory-index candidate filenames, in the order they are tried.
    /// Default: `index.html`.
    pub fn index_candidates(&self) -> Vec<String> {
        self.get("DirectoryIndex")
            .unwrap_or("index.html")
            .split_whitespace()
            .map(str::to_owned)
            .collect()
    }

    /// The string sent in the `Server` header and the listing footer.
    pub fn server_name(&self) -> &str {
        self.get("ServerName").unwrap_or(concat!("modserve/", env!("CARGO_PKG_VERSION")))
    }

    /// The directory scanned for module binaries, if configured.
    pub fn modules_dir(&self) -> Option<PathBuf> {
        self.get("ModulesDir").map(PathBuf::from)
    }
}
