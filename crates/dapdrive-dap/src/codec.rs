//! DAP wire framing: `Content-Length` headers around JSON bodies.

use serde::Serialize;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, BufReader};

use crate::error::DapError;

/// Upper bound on the header block before the `\r\n\r\n` terminator.
const MAX_HEADER_LEN: usize = 8 * 1024;

/// Largest body accepted from the adapter.
pub const MAX_BODY_LEN: usize = 64 * 1024 * 1024;

/// Initial body buffer; larger bodies grow it as bytes arrive.
const BODY_CHUNK: usize = 64 * 1024;

const HEADER_TERMINATOR: &[u8] = b"\r\n\r\n";

/// Encode a document into a DAP wire-format frame.
pub fn encode_message<T: Serialize + ?Sized>(doc: &T) -> Result<Vec<u8>, DapError> {
    let body = serde_json::to_vec(doc).map_err(|e| DapError::Encoding(e.to_string()))?;
    let header = format!("Content-Length: {}\r\n\r\n", body.len());
    let mut buf = Vec::with_capacity(header.len() + body.len());
    buf.extend_from_slice(header.as_bytes());
    buf.extend_from_slice(&body);
    Ok(buf)
}

/// Parse the Content-Length value from the header block (terminator excluded).
///
/// The first `Content-Length:` line wins; any other header line is ignored.
pub fn parse_content_length(header: &[u8]) -> Result<usize, DapError> {
    let header = std::str::from_utf8(header)
        .map_err(|e| DapError::Protocol(format!("header is not valid UTF-8: {e}")))?;
    for line in header.split("\r\n") {
        if let Some(value) = line.trim().strip_prefix("Content-Length:") {
            let value = value.trim();
            return value.parse::<usize>().map_err(|e| {
                DapError::Protocol(format!("invalid Content-Length value '{value}': {e}"))
            });
        }
    }
    Err(DapError::Protocol("missing Content-Length header".into()))
}

/// Decodes one frame at a time from an async byte stream.
///
/// Any error leaves the reader at an unknown position; callers must treat it
/// as fatal to the connection.
#[derive(Debug)]
pub struct FrameReader<R> {
    reader: BufReader<R>,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    /// Wrap a raw read half.
    pub fn new(inner: R) -> Self {
        Self {
            reader: BufReader::new(inner),
        }
    }

    /// Read the next complete frame and parse its body as JSON.
    pub async fn read_message(&mut self) -> Result<serde_json::Value, DapError> {
        let mut header = Vec::with_capacity(64);
        loop {
            let read = self
                .reader
                .read_until(b'\n', &mut header)
                .await
                .map_err(closed_on_io)?;
            if read == 0 {
                return Err(DapError::ConnectionClosed);
            }
            if header.ends_with(HEADER_TERMINATOR) {
                break;
            }
            if header.len() > MAX_HEADER_LEN {
                return Err(DapError::Protocol(format!(
                    "header exceeds {MAX_HEADER_LEN} bytes without terminator"
                )));
            }
        }

        let content_length =
            parse_content_length(&header[..header.len() - HEADER_TERMINATOR.len()])?;
        if content_length > MAX_BODY_LEN {
            return Err(DapError::Protocol(format!(
                "Content-Length {content_length} exceeds the {MAX_BODY_LEN} byte limit"
            )));
        }

        let mut body = Vec::with_capacity(content_length.min(BODY_CHUNK));
        let read = (&mut self.reader)
            .take(content_length as u64)
            .read_to_end(&mut body)
            .await
            .map_err(closed_on_io)?;
        if read < content_length {
            tracing::debug!(expected = content_length, read, "stream ended mid-body");
            return Err(DapError::ConnectionClosed);
        }

        serde_json::from_slice(&body)
            .map_err(|e| DapError::Protocol(format!("invalid JSON body: {e}")))
    }
}

fn closed_on_io(err: std::io::Error) -> DapError {
    tracing::debug!(error = %err, "read side failed");
    DapError::ConnectionClosed
}
