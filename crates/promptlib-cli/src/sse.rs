//! Incremental decoder for `text/event-stream` bodies.
//!
//! The store's listen endpoint is a server-sent event stream. Chunks arrive
//! at arbitrary byte boundaries, so the decoder buffers partial lines and
//! only yields a message once its terminating blank line has been seen.

/// One dispatched server-sent event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseMessage {
    /// The `event:` field, `"message"` when absent.
    pub event: String,
    /// All `data:` lines joined with `\n`.
    pub data: String,
    pub id: Option<String>,
}

#[derive(Debug, Default)]
pub struct SseDecoder {
    buf: Vec<u8>,
    event: Option<String>,
    data: Vec<String>,
    id: Option<String>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Consume one chunk and return every message it completed.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<SseMessage> {
        self.buf.extend_from_slice(chunk);
        let mut messages = Vec::new();

        let mut start = 0;
        while let Some(offset) = self.buf[start..]
            .iter()
            .position(|b| *b == b'\n' || *b == b'\r')
        {
            let end = start + offset;
            let next = match self.buf[end] {
                b'\r' if end + 1 == self.buf.len() => break,
                b'\r' if self.buf[end + 1] == b'\n' => end + 2,
                _ => end + 1,
            };
            let line = String::from_utf8_lossy(&self.buf[start..end]).into_owned();
            if let Some(message) = self.line(&line) {
                messages.push(message);
            }
            start = next;
        }
        self.buf.drain(..start);
        messages
    }

    fn line(&mut self, line: &str) -> Option<SseMessage> {
        if line.is_empty() {
            return self.dispatch();
        }
        if line.starts_with(':') {
            return None;
        }

        let (field, value) = line.split_once(':').map_or((line, ""), |(field, value)| {
            (field, value.strip_prefix(' ').unwrap_or(value))
        });
        match field {
            "event" => self.event = Some(value.to_string()),
            "data" => self.data.push(value.to_string()),
            "id" => self.id = Some(value.to_string()),
            // `retry` and unknown fields carry nothing we act on.
            _ => {}
        }
        None
    }

    fn dispatch(&mut self) -> Option<SseMessage> {
        let event = self.event.take();
        if self.data.is_empty() {
            return None;
        }
        let data = std::mem::take(&mut self.data).join("\n");
        Some(SseMessage {
            event: event.unwrap_or_else(|| "message".to_string()),
            data,
            id: self.id.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_a_complete_message() {
        let mut decoder = SseDecoder::new();
        let out = decoder.push(b"event: welcome\ndata: {\"listenerName\":\"abc\"}\n\n");
        assert_eq!(
            out,
            vec![SseMessage {
                event: "welcome".into(),
                data: "{\"listenerName\":\"abc\"}".into(),
                id: None,
            }]
        );
    }

    #[test]
    fn message_split_across_chunks() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.push(b"event: muta").is_empty());
        assert!(decoder.push(b"tion\nid: t1\ndata: {\"a\"").is_empty());
        let out = decoder.push(b":1}\n\n");
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].event, "mutation");
        assert_eq!(out[0].data, "{\"a\":1}");
        assert_eq!(out[0].id.as_deref(), Some("t1"));
    }

    #[test]
    fn crlf_split_between_chunks_is_one_terminator() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.push(b"data: x\r").is_empty());
        assert!(decoder.push(b"\n\r").is_empty());
        let out = decoder.push(b"\n");
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].data, "x");
    }

    #[test]
    fn bare_cr_terminates_lines() {
        let mut decoder = SseDecoder::new();
        let out = decoder.push(b"data: one\r\rdata: two\r\r ");
        let data: Vec<_> = out.iter().map(|m| m.data.as_str()).collect();
        assert_eq!(data, vec!["one", "two"]);
    }

    #[test]
    fn comments_and_empty_blocks_are_skipped() {
        let mut decoder = SseDecoder::new();
        let out = decoder.push(b": keepalive\n\nevent: ping\n\ndata: real\n\n");
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].event, "message");
        assert_eq!(out[0].data, "real");
    }

    #[test]
    fn multiline_data_is_joined() {
        let mut decoder = SseDecoder::new();
        let out = decoder.push(b"data: first\ndata:second\n\n");
        assert_eq!(out[0].data, "first\nsecond");
    }

    #[test]
    fn last_event_id_persists() {
        let mut decoder = SseDecoder::new();
        let out = decoder.push(b"id: 7\ndata: a\n\ndata: b\n\n");
        assert_eq!(out[1].id.as_deref(), Some("7"));
    }
}
