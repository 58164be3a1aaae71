//! Request header map.
//!
//! Keys are stored exactly as they appear on the wire; lookup compares
//! case-insensitively so hook callbacks do not have to guess how a client
//! capitalized a header name.

use std::fmt;

/// An order-preserving header map with case-insensitive lookup.
///
/// # Examples
///
/// ```
/// use modserve::http::Headers;
///
/// let mut headers = Headers::new();
/// headers.insert("Host", "localhost");
/// assert_eq!(headers.get("host"), Some("localhost"));
/// assert_eq!(headers.get("HOST"), Some("localhost"));
/// ```
#[derive(Debug, Clone, Default)]
pub struct Headers {
    inner: Vec<(String, String)>,
}

impl Headers {
    /// Creates an empty header map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a header entry; the key is stored verbatim.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.inner.push((name.into(), value.into()));
    }

    /// Returns the first value for the given header name, or `None`.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.inner
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Returns `true` if the map contains at least one entry with the given name.
    pub fn contains(&self, name: &str) -> bool {
        self.inner.iter().any(|(k, _)| k.eq_ignore_ascii_case(name))
    }

    /// Returns the number of header entries.
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Returns `true` if there are no header entries.
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Returns an iterator over all `(name, value)` pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.inner.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl fmt::Display for Headers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (name, value) in &self.inner {
            write!(f, "{name}: {value}\r\n")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn case_insensitive_get() {
        let mut h = Headers::new();
        h.insert("Content-Type", "text/plain");
        assert_eq!(h.get("content-type"), Some("text/plain"));
        assert_eq!(h.get("CONTENT-TYPE"), Some("text/plain"));
    }

    #[test]
    fn keys_kept_verbatim() {
        let mut h = Headers::new();
        h.insert("x-odd-CASING", "1");
        let names: Vec<_> = h.iter().map(|(k, _)| k).collect();
        assert_eq!(names, vec!["x-odd-CASING"]);
    }

    #[test]
    fn contains_and_len() {
        let mut h = Headers::new();
        assert!(h.is_empty());
        h.insert("Host", "a");
        h.insert("Accept", "b");
        assert!(h.contains("host"));
        assert!(!h.contains("cookie"));
        assert_eq!(h.len(), 2);
    }
}
