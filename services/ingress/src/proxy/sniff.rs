//! `Host` extraction from an HTTP/1.x request head.
//!
//! The sniffer reads until the end of the request head (`\r\n\r\n`), bounded by a byte
//! limit and a timeout. Everything read is kept so it can be replayed to the target.

use std::io;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::time::timeout;
use tracing::debug;

/// Default time allowed for the client to send its request head.
pub const DEFAULT_SNIFF_TIMEOUT: Duration = Duration::from_secs(5);

/// Default cap on the request head size.
pub const DEFAULT_MAX_HEAD_BYTES: usize = 16 * 1024;

const HEAD_TERMINATOR: &[u8] = b"\r\n\r\n";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SniffResult {
    /// `Host` header value, as sent (trimmed; may be empty).
    Found(String),
    /// Well-formed head without a `Host` header.
    NoHost,
    /// Not an HTTP/1.x request, or the head exceeds the byte limit.
    Malformed,
    /// Client closed before sending anything.
    Closed,
    Timeout,
    IoError(String),
}

#[derive(Debug, Clone)]
pub struct SniffConfig {
    pub timeout: Duration,
    pub max_bytes: usize,
}

impl Default for SniffConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_SNIFF_TIMEOUT,
            max_bytes: DEFAULT_MAX_HEAD_BYTES,
        }
    }
}

pub struct HostSniffer {
    config: SniffConfig,
}

impl HostSniffer {
    pub fn new() -> Self {
        Self::with_config(SniffConfig::default())
    }

    pub fn with_config(config: SniffConfig) -> Self {
        Self { config }
    }

    /// Read the request head into `buffer` and pull out the `Host` header.
    ///
    /// On return `buffer` holds every byte consumed from `stream`, which may extend past
    /// the head when the client pipelined a body.
    pub async fn inspect<R: AsyncRead + Unpin>(
        &self,
        stream: &mut R,
        buffer: &mut Vec<u8>,
    ) -> SniffResult {
        buffer.clear();

        match timeout(self.config.timeout, self.read_head(stream, buffer)).await {
            Ok(Ok(Some(head_len))) => parse_host(&buffer[..head_len]),
            Ok(Ok(None)) if buffer.is_empty() => SniffResult::Closed,
            Ok(Ok(None)) => {
                debug!(bytes = buffer.len(), "Request head incomplete or oversized");
                SniffResult::Malformed
            }
            Ok(Err(e)) => SniffResult::IoError(e.to_string()),
            Err(_) => SniffResult::Timeout,
        }
    }

    /// Returns the head length including the terminator, or `None` on EOF or overflow.
    async fn read_head<R: AsyncRead + Unpin>(
        &self,
        stream: &mut R,
        buffer: &mut Vec<u8>,
    ) -> io::Result<Option<usize>> {
        let mut chunk = [0u8; 2048];
        loop {
            let n = stream.read(&mut chunk).await?;
            if n == 0 {
                return Ok(None);
            }

            // Rescan from just before the new bytes in case the terminator straddles reads.
            let scan_from = buffer.len().saturating_sub(HEAD_TERMINATOR.len() - 1);
            buffer.extend_from_slice(&chunk[..n]);

            if let Some(pos) = find(&buffer[scan_from..], HEAD_TERMINATOR) {
                let head_len = scan_from + pos + HEAD_TERMINATOR.len();
                if head_len > self.config.max_bytes {
                    return Ok(None);
                }
                return Ok(Some(head_len));
            }
            if buffer.len() >= self.config.max_bytes {
                return Ok(None);
            }
        }
    }
}

impl Default for HostSniffer {
    fn default() -> Self {
        Self::new()
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

/// Parse a complete request head.
///
/// ```text
/// GET /path HTTP/1.1\r\n
/// Host: my-blog.apps.example.com\r\n
/// \r\n
/// ```
fn parse_host(head: &[u8]) -> SniffResult {
    let Ok(head) = std::str::from_utf8(head) else {
        return SniffResult::Malformed;
    };
    let mut lines = head.split("\r\n");

    let request_line = lines.next().unwrap_or_default();
    let mut parts = request_line.split(' ');
    let (Some(method), Some(target), Some(version), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return SniffResult::Malformed;
    };
    if method.is_empty()
        || !method.bytes().all(|b| b.is_ascii_uppercase())
        || target.is_empty()
        || !version.starts_with("HTTP/1.")
    {
        return SniffResult::Malformed;
    }

    for line in lines {
        if line.is_empty() {
            break;
        }
        let Some((name, value)) = line.split_once(':') else {
            return SniffResult::Malformed;
        };
        if name.eq_ignore_ascii_case("host") {
            return SniffResult::Found(value.trim().to_string());
        }
    }

    SniffResult::NoHost
}
