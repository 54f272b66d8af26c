//! Decoding of `text/event-stream` bodies.
//!
//! Only the `data` field matters for `streamGenerateContent`: multiple `data:` lines are joined
//! with `\n`, a blank line ends the event, lines starting with `:` are comments, and `\n`, `\r`,
//! `\r\n` are all accepted as line endings.

/// Incremental SSE decoder. Feed it raw body bytes with [SseDecoder::push] and it returns the
/// `data` payload of every event completed by those bytes.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
    data: Vec<String>,
    /// A `\r` was the last byte seen, so a following `\n` belongs to the same line ending.
    pending_cr: bool,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        let mut events = Vec::new();
        for &byte in bytes {
            if std::mem::take(&mut self.pending_cr) && byte == b'\n' {
                continue;
            }
            match byte {
                b'\n' | b'\r' => {
                    self.pending_cr = byte == b'\r';
                    let line = std::mem::take(&mut self.buffer);
                    if let Some(event) = self.decode_line(&String::from_utf8_lossy(&line)) {
                        events.push(event);
                    }
                },
                _ => self.buffer.push(byte),
            }
        }
        events
    }

    /// Called once the body ends, returns a trailing event that was not terminated by a blank
    /// line.
    pub fn finish(&mut self) -> Option<String> {
        let line = std::mem::take(&mut self.buffer);
        if !line.is_empty() {
            if let Some(event) = self.decode_line(&String::from_utf8_lossy(&line)) {
                return Some(event);
            }
        }
        self.decode_line("")
    }

    fn decode_line(&mut self, line: &str) -> Option<String> {
        if line.is_empty() {
            if self.data.is_empty() {
                return None;
            }
            let data = self.data.join("\n");
            self.data.clear();
            return Some(data);
        }

        if line.starts_with(':') {
            return None;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };

        if field == "data" {
            self.data.push(value.to_owned());
        }

        None
    }
}
