//! NDJSON chat stream events and the incremental line decoder.
//!
//! The chat stream endpoint writes one JSON object per line. Network chunks
//! do not respect line boundaries, so the decoder keeps the trailing partial
//! line between chunks and only parses complete lines. Lines are split on raw
//! bytes: `\n` never occurs inside a multi-byte UTF-8 sequence, so a character
//! split across two chunks is reassembled before decoding.

use crate::chat::ChatResponse;
use serde::{Deserialize, Serialize};

/// Fallback text for an `error` event without a message.
pub const DEFAULT_STREAM_ERROR: &str = "Agent chat stream failed";

/// One event of the chat stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    Start,
    Delta {
        #[serde(default)]
        content: Option<String>,
    },
    Done {
        #[serde(default)]
        response: Option<Box<ChatResponse>>,
    },
    Error {
        #[serde(default)]
        message: Option<String>,
    },
}

impl StreamEvent {
    pub fn delta(content: impl Into<String>) -> Self {
        StreamEvent::Delta {
            content: Some(content.into()),
        }
    }

    pub fn done(response: ChatResponse) -> Self {
        StreamEvent::Done {
            response: Some(Box::new(response)),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        StreamEvent::Error {
            message: Some(message.into()),
        }
    }

    /// Encode as a single NDJSON line, newline included.
    pub fn to_line(&self) -> String {
        let mut line = serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string());
        line.push('\n');
        line
    }
}

/// Parse one complete line. Blank and malformed lines yield `None`.
pub fn parse_line(line: &[u8]) -> Option<StreamEvent> {
    let text = match std::str::from_utf8(line) {
        Ok(text) => text.trim(),
        Err(err) => {
            tracing::debug!(error = %err, "dropping non-utf8 stream line");
            return None;
        }
    };
    if text.is_empty() {
        return None;
    }
    match serde_json::from_str::<StreamEvent>(text) {
        Ok(event) => Some(event),
        Err(err) => {
            tracing::debug!(error = %err, line = %preview(text), "dropping malformed stream line");
            None
        }
    }
}

fn preview(text: &str) -> String {
    text.chars().take(120).collect()
}

/// Incremental NDJSON decoder.
#[derive(Debug, Default)]
pub struct NdjsonDecoder {
    buffer: Vec<u8>,
    dropped: usize,
}

impl NdjsonDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk and return the events of every line it completed.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<StreamEvent> {
        let searched_from = self.buffer.len();
        self.buffer.extend_from_slice(chunk);

        let last_newline = match self.buffer[searched_from..].iter().rposition(|&b| b == b'\n') {
            Some(offset) => searched_from + offset,
            None => return Vec::new(),
        };

        let complete: Vec<u8> = self.buffer.drain(..=last_newline).collect();
        complete
            .split(|&b| b == b'\n')
            .filter_map(|line| self.parse_counted(line))
            .collect()
    }

    /// Flush the residual partial line as one final line.
    ///
    /// Catches a trailing object written without a newline.
    pub fn finish(&mut self) -> Option<StreamEvent> {
        let residual = std::mem::take(&mut self.buffer);
        self.parse_counted(&residual)
    }

    /// Bytes held back waiting for a newline.
    pub fn pending_len(&self) -> usize {
        self.buffer.len()
    }

    /// Non-blank lines that failed to parse so far.
    pub fn dropped_lines(&self) -> usize {
        self.dropped
    }

    fn parse_counted(&mut self, line: &[u8]) -> Option<StreamEvent> {
        let event = parse_line(line);
        if event.is_none() && line.iter().any(|b| !b.is_ascii_whitespace()) {
            self.dropped += 1;
        }
        event
    }
}

/// Decode a complete body in one pass.
pub fn decode_all(body: &[u8]) -> Vec<StreamEvent> {
    let mut decoder = NdjsonDecoder::new();
    let mut events = decoder.push(body);
    events.extend(decoder.finish());
    events
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_known_events() {
        assert_eq!(parse_line(br#"{"type":"start"}"#), Some(StreamEvent::Start));
        assert_eq!(
            parse_line(br#"{"type":"delta","content":"Hel"}"#),
            Some(StreamEvent::delta("Hel"))
        );
        assert_eq!(
            parse_line(br#"{"type":"delta"}"#),
            Some(StreamEvent::Delta { content: None })
        );
        assert_eq!(
            parse_line(br#"{"type":"error","message":"boom"}"#),
            Some(StreamEvent::error("boom"))
        );
        assert_eq!(
            parse_line(br#"{"type":"done"}"#),
            Some(StreamEvent::Done { response: None })
        );
    }

    #[test]
    fn test_blank_and_malformed_lines_are_none() {
        assert_eq!(parse_line(b""), None);
        assert_eq!(parse_line(b"   \r"), None);
        assert_eq!(parse_line(b"{not json"), None);
        assert_eq!(parse_line(br#"{"type":"mystery"}"#), None);
    }

    #[test]
    fn test_partial_line_is_retained() {
        let mut decoder = NdjsonDecoder::new();
        assert!(decoder.push(br#"{"type":"del"#).is_empty());
        assert!(decoder.pending_len() > 0);
        let events = decoder.push(b"ta\",\"content\":\"x\"}\n{\"type\"");
        assert_eq!(events, vec![StreamEvent::delta("x")]);
        assert_eq!(decoder.pending_len(), 7);
    }

    #[test]
    fn test_malformed_line_between_valid_lines() {
        let body = b"{\"type\":\"start\"}\n{oops\n{\"type\":\"delta\",\"content\":\"a\"}\n";
        let mut decoder = NdjsonDecoder::new();
        let events = decoder.push(body);
        assert_eq!(events, vec![StreamEvent::Start, StreamEvent::delta("a")]);
        assert_eq!(decoder.dropped_lines(), 1);
    }

    #[test]
    fn test_finish_flushes_unterminated_line() {
        let mut decoder = NdjsonDecoder::new();
        assert_eq!(decoder.push(b"{\"type\":\"start\"}\n{\"type\":\"delta\",\"content\":\"z\"}"), vec![StreamEvent::Start]);
        assert_eq!(decoder.finish(), Some(StreamEvent::delta("z")));
        assert_eq!(decoder.pending_len(), 0);
        assert_eq!(decoder.finish(), None);
    }

    #[test]
    fn test_multibyte_character_split_across_chunks() {
        let line = "{\"type\":\"delta\",\"content\":\"光固化\"}\n".as_bytes();
        let split = line.iter().position(|&b| b >= 0x80).unwrap() + 1;
        let mut decoder = NdjsonDecoder::new();
        assert!(decoder.push(&line[..split]).is_empty());
        assert_eq!(decoder.push(&line[split..]), vec![StreamEvent::delta("光固化")]);
    }

    #[test]
    fn test_crlf_lines() {
        let events = decode_all(b"{\"type\":\"start\"}\r\n{\"type\":\"delta\",\"content\":\"q\"}\r\n");
        assert_eq!(events, vec![StreamEvent::Start, StreamEvent::delta("q")]);
    }

    #[test]
    fn test_to_line_roundtrips_through_decoder() {
        let line = StreamEvent::error("x").to_line();
        assert!(line.ends_with('\n'));
        assert_eq!(decode_all(line.as_bytes()), vec![StreamEvent::error("x")]);
    }
}
