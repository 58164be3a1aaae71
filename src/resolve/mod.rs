//! Resource resolution: mapping a decoded request path to a filesystem
//! entity.
//!
//! Directory requests (trailing slash) and direct file requests share one
//! resolution path: decode, join under the document root, then try the
//! configured directory-index candidates whenever the joined path turns
//! out to be a directory. The outcome is a file to serve, a directory to
//! list, or nothing.

use std::io;
use std::path::{Component, Path, PathBuf};

use percent_encoding::percent_decode_str;
use tracing::debug;

/// The filesystem entity a request path resolved to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolved {
    /// An existing file to serve.
    File(PathBuf),
    /// An existing directory with no index candidate; gets a listing.
    Directory(PathBuf),
    /// Neither a file nor a directory.
    NotFound,
}

/// Percent-decodes a raw request target.
///
/// Invalid UTF-8 sequences are replaced rather than rejected; the decoded
/// path either resolves or it does not.
pub fn decode(raw_target: &str) -> String {
    percent_decode_str(raw_target)
        .decode_utf8_lossy()
        .into_owned()
}

/// Resolves a decoded request path against the document root.
///
/// If the path names a directory — explicitly via a trailing slash, or
/// because the joined path is one — each index candidate is tried in
/// order and the first existing file wins; an existing directory with no
/// candidate becomes [`Resolved::Directory`]. A plain path that names an
/// existing file is served directly.
///
/// A decoded path containing a `..` component never resolves: requests
/// cannot climb out of the document root.
pub async fn resolve(
    document_root: &Path,
    decoded_target: &str,
    index_candidates: &[String],
) -> Resolved {
    let relative = decoded_target.trim_start_matches('/');
    if Path::new(relative)
        .components()
        .any(|c| matches!(c, Component::ParentDir))
    {
        return Resolved::NotFound;
    }
    let joined = if relative.is_empty() {
        document_root.to_owned()
    } else {
        document_root.join(relative)
    };

    if decoded_target.ends_with('/') || is_dir(&joined).await {
        for candidate in index_candidates {
            let indexed = joined.join(candidate.trim());
            if is_file(&indexed).await {
                debug!(path = %indexed.display(), "index candidate selected");
                return Resolved::File(indexed);
            }
        }
        if is_dir(&joined).await {
            return Resolved::Directory(joined);
        }
        return Resolved::NotFound;
    }

    if is_file(&joined).await {
        Resolved::File(joined)
    } else {
        Resolved::NotFound
    }
}

/// Builds the HTML directory listing for `dir`.
///
/// Emits a parent link (the site root when the listed directory sits
/// directly under the document root, or is the root itself), then each
/// subdirectory and each file as a link in filesystem enumeration order,
/// and a footer naming the server and port.
pub async fn listing(
    document_root: &Path,
    dir: &Path,
    decoded_target: &str,
    server_name: &str,
    port: u16,
) -> io::Result<String> {
    // Links are relative when the request ended in a slash; otherwise they
    // must be prefixed with the full request path to stay reachable.
    let prefix = if decoded_target.ends_with('/') {
        String::new()
    } else {
        format!("{decoded_target}/")
    };

    let mut dirs = Vec::new();
    let mut files = Vec::new();
    let mut entries = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name().to_string_lossy().into_owned();
        if entry.file_type().await?.is_dir() {
            dirs.push(name);
        } else {
            files.push(name);
        }
    }

    let parent_href = match dir.parent() {
        Some(parent) if parent == document_root => "/".to_owned(),
        _ if dir == document_root => "/".to_owned(),
        Some(parent) => match parent.file_name() {
            Some(name) => format!("/{}/", name.to_string_lossy()),
            None => "/".to_owned(),
        },
        None => "/".to_owned(),
    };

    let mut html = String::new();
    html.push_str("<html>\n<head>\n  <title>Index of ");
    html.push_str(decoded_target);
    html.push_str("</title>\n</head>\n<body>\n<h1>Index of ");
    html.push_str(decoded_target);
    html.push_str("</h1>\n<pre>\n");
    html.push_str(&format!("<a href=\"{parent_href}\">Parent Folder</a>\n"));
    for name in &dirs {
        html.push_str(&format!("<a href=\"{prefix}{name}/\">{name}</a>\n"));
    }
    for name in &files {
        html.push_str(&format!("<a href=\"{prefix}{name}\">{name}</a>\n"));
    }
    html.push_str("</pre>\n<hr />\n<div class=\"serverStamp\">");
    html.push_str(&format!("{server_name} Port: {port}"));
    html.push_str("</div>\n</body>\n</html>\n");

    Ok(html)
}

async fn is_file(path: &Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .map(|m| m.is_file())
        .unwrap_or(false)
}

async fn is_dir(path: &Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .map(|m| m.is_dir())
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn fixture() -> TempDir {
        let root = tempfile::tempdir().unwrap();
        std::fs::write(root.path().join("index.html"), "<p>hi</p>").unwrap();
        std::fs::write(root.path().join("about.txt"), "about").unwrap();
        std::fs::create_dir(root.path().join("docs")).unwrap();
        std::fs::write(root.path().join("docs/guide.html"), "guide").unwrap();
        std::fs::create_dir(root.path().join("empty")).unwrap();
        root
    }

    #[test]
    fn decode_percent_sequences() {
        assert_eq!(decode("/a%20b.txt"), "/a b.txt");
        assert_eq!(decode("/plain"), "/plain");
    }

    #[tokio::test]
    async fn root_request_selects_index_candidate() {
        let root = fixture();
        let candidates = vec!["index.html".to_owned()];
        let resolved = resolve(root.path(), "/", &candidates).await;
        assert_eq!(resolved, Resolved::File(root.path().join("index.html")));
    }

    #[tokio::test]
    async fn candidates_tried_in_order() {
        let root = fixture();
        let candidates = vec!["default.html".to_owned(), "index.html".to_owned()];
        let resolved = resolve(root.path(), "/", &candidates).await;
        assert_eq!(resolved, Resolved::File(root.path().join("index.html")));
    }

    #[tokio::test]
    async fn direct_file_request() {
        let root = fixture();
        let resolved = resolve(root.path(), "/about.txt", &[]).await;
        assert_eq!(resolved, Resolved::File(root.path().join("about.txt")));
    }

    #[tokio::test]
    async fn directory_without_slash_still_tries_candidates() {
        let root = fixture();
        let candidates = vec!["guide.html".to_owned()];
        let resolved = resolve(root.path(), "/docs", &candidates).await;
        assert_eq!(
            resolved,
            Resolved::File(root.path().join("docs").join("guide.html"))
        );
    }

    #[tokio::test]
    async fn directory_with_no_candidate_is_listed() {
        let root = fixture();
        let candidates = vec!["index.html".to_owned()];
        let resolved = resolve(root.path(), "/empty/", &candidates).await;
        assert_eq!(resolved, Resolved::Directory(root.path().join("empty")));
    }

    #[tokio::test]
    async fn missing_path_is_not_found() {
        let root = fixture();
        let resolved = resolve(root.path(), "/nope.html", &[]).await;
        assert_eq!(resolved, Resolved::NotFound);
        let resolved = resolve(root.path(), "/nope/", &[]).await;
        assert_eq!(resolved, Resolved::NotFound);
    }

    #[tokio::test]
    async fn parent_components_never_resolve() {
        let outer = tempfile::tempdir().unwrap();
        let root = outer.path().join("site");
        std::fs::create_dir(&root).unwrap();
        std::fs::write(root.join("index.html"), "inside").unwrap();
        std::fs::write(outer.path().join("secret.txt"), "outside").unwrap();

        let resolved = resolve(&root, "/../secret.txt", &[]).await;
        assert_eq!(resolved, Resolved::NotFound);

        // Nested traversal that still lands outside the root.
        let resolved = resolve(&root, "/docs/../../secret.txt", &[]).await;
        assert_eq!(resolved, Resolved::NotFound);

        // Encoded dots decode to the same rejected path.
        let decoded = decode("/%2e%2e/secret.txt");
        let resolved = resolve(&root, &decoded, &[]).await;
        assert_eq!(resolved, Resolved::NotFound);
    }

    #[tokio::test]
    async fn percent_decoded_names_resolve() {
        let root = fixture();
        std::fs::write(root.path().join("a b.txt"), "spaced").unwrap();
        let decoded = decode("/a%20b.txt");
        let resolved = resolve(root.path(), &decoded, &[]).await;
        assert_eq!(resolved, Resolved::File(root.path().join("a b.txt")));
    }

    #[tokio::test]
    async fn listing_contains_entries_and_footer() {
        let root = fixture();
        let html = listing(root.path(), root.path(), "/", "TestServer/1.0", 8080)
            .await
            .unwrap();
        assert!(html.contains("Index of /"));
        assert!(html.contains("<a href=\"/\">Parent Folder</a>"));
        assert!(html.contains("<a href=\"docs/\">docs</a>"));
        assert!(html.contains("<a href=\"about.txt\">about.txt</a>"));
        assert!(html.contains("TestServer/1.0 Port: 8080"));
    }

    #[tokio::test]
    async fn listing_under_root_links_parent_to_site_root() {
        let root = fixture();
        let html = listing(
            root.path(),
            &root.path().join("empty"),
            "/empty/",
            "TestServer/1.0",
            8080,
        )
        .await
        .unwrap();
        assert!(html.contains("<a href=\"/\">Parent Folder</a>"));
    }

    #[tokio::test]
    async fn listing_without_trailing_slash_prefixes_links() {
        let root = fixture();
        let html = listing(
            root.path(),
            &root.path().join("docs"),
            "/docs",
            "TestServer/1.0",
            8080,
        )
        .await
        .unwrap();
        assert!(html.contains("<a href=\"/docs/guide.html\">guide.html</a>"));
    }
}
