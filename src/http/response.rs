//! Response emission.
//!
//! Responses are written header line by header line, each flushed
//! independently, in a fixed order: status line, `Server`, `Content-Length`
//! (only when an explicit length is known), `Content-Type`, blank line,
//! body. Directory listings and error pages use the length-less variant and
//! rely on connection close to delimit the body.

use std::io;

use tokio::io::{AsyncWrite, AsyncWriteExt};

use super::StatusCode;

/// Writes HTTP/1.1-shaped responses onto a connection.
///
/// One writer is created per connection, carrying the configured server
/// name for the `Server` header.
pub struct ResponseWriter<'a, W> {
    stream: &'a mut W,
    server_name: &'a str,
}

impl<'a, W: AsyncWrite + Unpin> ResponseWriter<'a, W> {
    /// Creates a writer over `stream` that stamps `server_name` on every response.
    pub fn new(stream: &'a mut W, server_name: &'a str) -> Self {
        Self {
            stream,
            server_name,
        }
    }

    /// Emits the response head.
    ///
    /// `content_length` is written only when known; `media_type` is written
    /// as-is, so an absent media type produces an empty `Content-Type`
    /// value (a deliberate pass-through of the lookup table's miss).
    pub async fn send_head(
        &mut self,
        status: StatusCode,
        content_length: Option<usize>,
        media_type: Option<&str>,
    ) -> io::Result<()> {
        let status_line = match status.reason_phrase() {
            Some(reason) => format!("HTTP/1.1 {} {}\r\n", status.as_u16(), reason),
            None => format!("HTTP/1.1 {}\r\n", status.as_u16()),
        };
        self.write_line(&status_line).await?;
        self.write_line(&format!("Server: {}\r\n", self.server_name))
            .await?;
        if let Some(length) = content_length {
            self.write_line(&format!("Content-Length: {length}\r\n"))
                .await?;
        }
        self.write_line(&format!(
            "Content-Type: {}\r\n\r\n",
            media_type.unwrap_or_default()
        ))
        .await
    }

    /// Writes the body bytes and flushes.
    pub async fn send_body(&mut self, body: &[u8]) -> io::Result<()> {
        self.stream.write_all(body).await?;
        self.stream.flush().await
    }

    // Each header line goes out in its own write/flush pair.
    async fn write_line(&mut self, line: &str) -> io::Result<()> {
        self.stream.write_all(line.as_bytes()).await?;
        self.stream.flush().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn head_to_string(
        status: StatusCode,
        length: Option<usize>,
        media_type: Option<&str>,
    ) -> String {
        let mut buf = Vec::new();
        let mut writer = ResponseWriter::new(&mut buf, "TestServer/1.0");
        writer.send_head(status, length, media_type).await.unwrap();
        String::from_utf8(buf).unwrap()
    }

    #[tokio::test]
    async fn head_with_length() {
        let head = head_to_string(StatusCode::OK, Some(5), Some("text/html")).await;
        assert_eq!(
            head,
            "HTTP/1.1 200 OK\r\nServer: TestServer/1.0\r\nContent-Length: 5\r\nContent-Type: text/html\r\n\r\n"
        );
    }

    #[tokio::test]
    async fn head_without_length() {
        let head = head_to_string(StatusCode::NOT_FOUND, None, Some("text/html")).await;
        assert!(head.starts_with("HTTP/1.1 404 Not Found\r\n"));
        assert!(!head.contains("Content-Length"));
    }

    #[tokio::test]
    async fn unknown_status_gets_bare_number() {
        let head = head_to_string(StatusCode(302), None, None).await;
        assert!(head.starts_with("HTTP/1.1 302\r\n"));
    }

    #[tokio::test]
    async fn missing_media_type_is_passed_through_empty() {
        let head = head_to_string(StatusCode::OK, Some(0), None).await;
        assert!(head.contains("Content-Type: \r\n\r\n"));
    }

    #[tokio::test]
    async fn body_follows_head() {
        let mut buf = Vec::new();
        let mut writer = ResponseWriter::new(&mut buf, "TestServer/1.0");
        writer
            .send_head(StatusCode::OK, Some(2), Some("text/plain"))
            .await
            .unwrap();
        writer.send_body(b"hi").await.unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert!(text.ends_with("\r\n\r\nhi"));
    }
}
