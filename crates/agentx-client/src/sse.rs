//! Incremental line framing for `data:`-prefixed progress streams.

/// Prefix that marks a record line.
pub const RECORD_PREFIX: &str = "data:";

/// Accumulates raw body chunks and yields complete lines.
///
/// Buffering is byte based and lines are cut at `\n`, a byte that never
/// appears inside a multi-byte UTF-8 sequence, so a character split across
/// chunks is always decoded once both halves have arrived.
#[derive(Debug, Default)]
pub struct LineDecoder {
    buf: Vec<u8>,
}

impl LineDecoder {
    /// Appends a chunk and returns every line it completed, in order.
    pub fn push_chunk(&mut self, chunk: &[u8]) -> Vec<String> {
        let scan_from = self.buf.len();
        self.buf.extend_from_slice(chunk);
        let mut lines = Vec::new();
        let mut start = 0;
        for idx in scan_from..self.buf.len() {
            if self.buf[idx] == b'\n' {
                lines.push(decode_line(&self.buf[start..idx]));
                start = idx + 1;
            }
        }
        self.buf.drain(..start);
        lines
    }

    /// Returns the unterminated tail left at end of stream, if any.
    pub fn finish(&mut self) -> Option<String> {
        if self.buf.is_empty() {
            return None;
        }
        let tail = decode_line(&self.buf);
        self.buf.clear();
        Some(tail)
    }

    /// Number of bytes waiting for a line terminator.
    pub fn pending_bytes(&self) -> usize {
        self.buf.len()
    }
}

fn decode_line(bytes: &[u8]) -> String {
    let bytes = bytes.strip_suffix(b"\r").unwrap_or(bytes);
    String::from_utf8_lossy(bytes).into_owned()
}

/// Returns the trimmed record payload of a `data:` line.
///
/// Other lines (comments, `event:` fields, blank separators) and empty
/// payloads yield `None`.
pub fn record_payload(line: &str) -> Option<&str> {
    let payload = line.strip_prefix(RECORD_PREFIX)?.trim();
    if payload.is_empty() {
        None
    } else {
        Some(payload)
    }
}
