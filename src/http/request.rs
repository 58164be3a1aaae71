//! Request parsing and the per-request state hook callbacks operate on.
//!
//! Parsing is deliberately line-oriented and forgiving: the header block
//! ends at the first `\r\n\r\n` *or* `\n\n`, header lines without a `": "`
//! separator are silently ignored, and no HTTP version is required. The
//! leading token of the request line is taken as the method; the pipeline
//! serves GET and answers every other method with the fixed internal-error
//! response.

use bytes::Bytes;

use super::{Headers, Method, StatusCode};

/// Returns `true` once `buf` contains a complete header block.
///
/// The terminator is either `\r\n\r\n` or a bare `\n\n`. No body is ever
/// read; the pipeline serves GET only.
pub fn header_block_complete(buf: &[u8]) -> bool {
    buf.windows(4).any(|w| w == b"\r\n\r\n") || buf.windows(2).any(|w| w == b"\n\n")
}

/// Per-request state, visible to and mutable by hook callbacks.
///
/// Created once the header block has been fully read, mutated by the
/// connection handler and by hooks, and dropped when the connection closes.
///
/// Content flows through two buffers: `raw` holds the file bytes exactly as
/// read from disk, `finalized` starts as a copy of `raw` and is what
/// transform hooks replace via [`set_finalized`](Self::set_finalized).
/// Replacing it marks the request transformed, which tells the response
/// stage to serve the finalized bytes (with whatever status is set) instead
/// of the raw bytes with a plain 200.
#[derive(Debug, Clone, Default)]
pub struct Request {
    method: Option<Method>,
    target: String,
    headers: Headers,
    status: Option<StatusCode>,
    media_type: Option<String>,
    raw: Bytes,
    finalized: Bytes,
    transformed: bool,
    skip_builtin_serve: bool,
}

impl Request {
    /// Parses a complete header block into a `Request`.
    ///
    /// Never fails: malformed input yields a request without a method,
    /// which the pipeline turns into an internal-error response. The
    /// caller is responsible for accumulating bytes until
    /// [`header_block_complete`] is satisfied.
    pub fn parse(buf: &[u8]) -> Self {
        let text = String::from_utf8_lossy(buf);
        let mut lines = text.split('\n').map(|line| line.trim_end_matches('\r'));

        let mut request = Request::default();

        if let Some(request_line) = lines.next() {
            let mut words = request_line.split_whitespace();
            // The method must be the leading token of the request line; a
            // line with fewer than two words carries neither method nor
            // target.
            if let (Some(token), Some(target)) = (words.next(), words.next()) {
                request.method = Some(token.parse().unwrap()); // Infallible
                request.target = target.to_owned();
            }
        }

        for line in lines {
            if let Some(sep) = line.find(": ") {
                request
                    .headers
                    .insert(&line[..sep], &line[sep + 2..]);
            }
            // Lines without the separator (including the trailing blank
            // line of the terminator) are ignored.
        }

        request
    }

    /// Returns the request method, if the request line carried one.
    pub fn method(&self) -> Option<&Method> {
        self.method.as_ref()
    }

    /// Returns the raw target path, still percent-encoded.
    pub fn target(&self) -> &str {
        &self.target
    }

    /// Replaces the target path. This is the seam `start.request` hooks use
    /// to rewrite a request before any filesystem access happens.
    pub fn set_target(&mut self, target: impl Into<String>) {
        self.target = target.into();
    }

    /// Returns the request headers.
    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    /// Returns the status assigned to this request, if any.
    pub fn status(&self) -> Option<StatusCode> {
        self.status
    }

    /// Assigns a response status. Unset until the resolver or a hook sets one.
    pub fn set_status(&mut self, status: StatusCode) {
        self.status = Some(status);
    }

    /// Returns the media type assigned after resolution, if any.
    pub fn media_type(&self) -> Option<&str> {
        self.media_type.as_deref()
    }

    /// Assigns the media type of the resolved resource.
    pub fn set_media_type(&mut self, media_type: Option<impl Into<String>>) {
        self.media_type = media_type.map(Into::into);
    }

    /// Returns the raw content bytes as read from disk.
    pub fn raw(&self) -> &Bytes {
        &self.raw
    }

    /// Installs the resolved file's bytes. Finalized content starts equal to
    /// raw, and any earlier transform mark is cleared.
    pub fn set_content(&mut self, raw: Bytes) {
        self.finalized = raw.clone();
        self.raw = raw;
        self.transformed = false;
    }

    /// Returns the finalized content bytes.
    pub fn finalized(&self) -> &Bytes {
        &self.finalized
    }

    /// Replaces the finalized content and marks the request transformed.
    ///
    /// Hooks registered later for the same invocation observe the
    /// replacement, and the response stage serves it — an empty buffer is a
    /// legitimate transformed body, not a signal to fall back to raw.
    pub fn set_finalized(&mut self, finalized: Bytes) {
        self.finalized = finalized;
        self.transformed = true;
    }

    /// Returns `true` if a hook replaced the finalized content.
    pub fn is_transformed(&self) -> bool {
        self.transformed
    }

    /// Returns the skip-built-in-serving flag.
    ///
    /// Declared for modules that render content themselves; the current
    /// pipeline does not consult it.
    pub fn skip_builtin_serve(&self) -> bool {
        self.skip_builtin_serve
    }

    /// Sets the skip-built-in-serving flag (reserved, see [`skip_builtin_serve`](Self::skip_builtin_serve)).
    pub fn set_skip_builtin_serve(&mut self, skip: bool) {
        self.skip_builtin_serve = skip;
    }
}
