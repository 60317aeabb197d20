//! Line-level relay of chat completion event streams into Ooba stream events.
//!
//! [`LineSplitter`] turns the upstream byte stream into complete text lines and
//! [`StreamRelay`] decides, one line at a time, what (if anything) the legacy
//! caller should see. Neither does I/O; the driving loop lives in
//! [`crate::upstream`].

use super::ooba_types::OobaStreamEvent;
use super::openai_types::ChatCompletionChunk;

const DATA_MARKER: &str = "data:";
const DONE_SENTINEL: &str = "[DONE]";

/// Longest partial line kept while waiting for its newline.
pub const MAX_LINE_BYTES: usize = 1024 * 1024;

/// Accumulates raw bytes and hands back complete `\n`-terminated lines.
///
/// Lines are decoded only once complete, so a multi-byte character split
/// across two network chunks is not mangled. A partial line that grows past
/// the limit is discarded up to its next newline.
#[derive(Debug)]
pub struct LineSplitter {
    buffer: Vec<u8>,
    limit: usize,
    discarding: bool,
}

impl Default for LineSplitter {
    fn default() -> Self {
        Self::with_limit(MAX_LINE_BYTES)
    }
}

impl LineSplitter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_limit(limit: usize) -> Self {
        Self {
            buffer: Vec::new(),
            limit,
            discarding: false,
        }
    }

    /// Append `bytes` and drain every complete line, without its terminator.
    /// Only the newly appended bytes are scanned.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        let mut lines = Vec::new();
        let mut rest = bytes;

        while let Some(pos) = rest.iter().position(|b| *b == b'\n') {
            if self.discarding {
                self.discarding = false;
            } else {
                self.buffer.extend_from_slice(&rest[..pos]);
                lines.push(decode_line(&self.buffer));
            }
            self.buffer.clear();
            rest = &rest[pos + 1..];
        }

        if !self.discarding {
            self.buffer.extend_from_slice(rest);
            if self.buffer.len() > self.limit {
                tracing::warn!(
                    len = self.buffer.len(),
                    limit = self.limit,
                    "Discarding oversized upstream line"
                );
                self.buffer.clear();
                self.discarding = true;
            }
        }

        lines
    }

    /// Take whatever is left after the body ended without a final newline.
    pub fn flush(&mut self) -> Option<String> {
        if self.buffer.is_empty() || self.discarding {
            return None;
        }
        let raw = std::mem::take(&mut self.buffer);
        Some(decode_line(&raw))
    }
}

fn decode_line(raw: &[u8]) -> String {
    let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
    String::from_utf8_lossy(raw).into_owned()
}

/// What the relay decided for one upstream line.
#[derive(Debug, Clone, PartialEq)]
pub enum RelayStep {
    /// Forward this event to the caller now.
    Emit(OobaStreamEvent),
    /// Nothing to forward for this line.
    Skip,
    /// The upstream sent its end-of-stream sentinel.
    Done,
}

/// State machine that relays chat completion SSE lines as Ooba stream events.
///
/// Usage:
///   let mut relay = StreamRelay::new();
///   for line in lines {
///       match relay.push_line(&line) {
///           RelayStep::Emit(event) => send(event),
///           RelayStep::Skip => {}
///           RelayStep::Done => break,
///       }
///   }
///   if let Some(end) = relay.finish() { send(end) }
#[derive(Debug, Default)]
pub struct StreamRelay {
    done: bool,
    ended: bool,
    emitted: usize,
    dropped: usize,
}

impl StreamRelay {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_line(&mut self, line: &str) -> RelayStep {
        if self.done {
            return RelayStep::Skip;
        }

        let line = line.trim();
        if line.is_empty() {
            return RelayStep::Skip;
        }

        // Anything else (event:, id:, retry:, comments) carries no content
        let Some(payload) = line.strip_prefix(DATA_MARKER) else {
            return RelayStep::Skip;
        };
        let payload = payload.trim();

        if payload == DONE_SENTINEL {
            self.done = true;
            return RelayStep::Done;
        }

        let chunk: ChatCompletionChunk = match serde_json::from_str(payload) {
            Ok(c) => c,
            Err(e) => {
                self.dropped += 1;
                tracing::debug!(error = %e, "Skipping unparseable chunk");
                return RelayStep::Skip;
            }
        };

        let text = chunk
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.delta.content)
            .unwrap_or_default();

        self.emitted += 1;
        RelayStep::Emit(OobaStreamEvent::text(text))
    }

    /// The closing `stream_end` event. Returns it once; later calls return `None`.
    pub fn finish(&mut self) -> Option<OobaStreamEvent> {
        if self.ended {
            return None;
        }
        self.ended = true;
        self.done = true;
        Some(OobaStreamEvent::end())
    }

    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Number of `text_stream` events produced so far.
    pub fn emitted(&self) -> usize {
        self.emitted
    }

    /// Number of data lines dropped because they were not valid chunks.
    pub fn dropped(&self) -> usize {
        self.dropped
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk_line(content: &str) -> String {
        format!(
            "data: {}",
            serde_json::json!({
                "id": "chat-1",
                "object": "chat.completion.chunk",
                "choices": [{"index": 0, "delta": {"content": content}, "finish_reason": null}]
            })
        )
    }

    fn run(lines: &[String]) -> Vec<OobaStreamEvent> {
        let mut relay = StreamRelay::new();
        let mut events = Vec::new();
        for line in lines {
            match relay.push_line(line) {
                RelayStep::Emit(e) => events.push(e),
                RelayStep::Skip => {}
                RelayStep::Done => break,
            }
        }
        events.extend(relay.finish());
        events
    }

    #[test]
    fn test_simple_text_stream() {
        let events = run(&[
            chunk_line("Hel"),
            String::new(),
            chunk_line("lo"),
            String::new(),
            "data: [DONE]".to_string(),
        ]);

        assert_eq!(
            events,
            vec![
                OobaStreamEvent::text("Hel"),
                OobaStreamEvent::text("lo"),
                OobaStreamEvent::end(),
            ]
        );
    }

    #[test]
    fn test_malformed_line_is_dropped() {
        let mut relay = StreamRelay::new();
        assert_eq!(relay.push_line("data: {not json"), RelayStep::Skip);
        assert_eq!(
            relay.push_line(&chunk_line("ok")),
            RelayStep::Emit(OobaStreamEvent::text("ok"))
        );
        assert_eq!(relay.dropped(), 1);
        assert_eq!(relay.emitted(), 1);
    }

    #[test]
    fn test_lines_after_done_are_ignored() {
        let events = run(&[
            chunk_line("a"),
            "data: [DONE]".to_string(),
            chunk_line("b"),
        ]);
        assert_eq!(events, vec![OobaStreamEvent::text("a"), OobaStreamEvent::end()]);

        let mut relay = StreamRelay::new();
        assert_eq!(relay.push_line("data: [DONE]"), RelayStep::Done);
        assert_eq!(relay.push_line(&chunk_line("late")), RelayStep::Skip);
    }

    #[test]
    fn test_zero_chunks_still_end() {
        let events = run(&["data: [DONE]".to_string()]);
        assert_eq!(events, vec![OobaStreamEvent::end()]);
    }

    #[test]
    fn test_finish_only_once() {
        let mut relay = StreamRelay::new();
        assert_eq!(relay.finish(), Some(OobaStreamEvent::end()));
        assert_eq!(relay.finish(), None);
    }

    #[test]
    fn test_missing_content_emits_empty_text() {
        let mut relay = StreamRelay::new();
        let role_only = r#"data: {"choices":[{"index":0,"delta":{"role":"assistant"}}]}"#;
        assert_eq!(
            relay.push_line(role_only),
            RelayStep::Emit(OobaStreamEvent::text(""))
        );

        let null_content = r#"data: {"choices":[{"delta":{"content":null}}]}"#;
        assert_eq!(
            relay.push_line(null_content),
            RelayStep::Emit(OobaStreamEvent::text(""))
        );
    }

    #[test]
    fn test_chunk_without_choices_emits_empty_text() {
        let mut relay = StreamRelay::new();
        let usage_only = r#"data: {"choices":[],"usage":{"prompt_tokens":1}}"#;
        assert_eq!(
            relay.push_line(usage_only),
            RelayStep::Emit(OobaStreamEvent::text(""))
        );
        assert_eq!(
            relay.push_line(r#"data: {"id":"chat-1"}"#),
            RelayStep::Emit(OobaStreamEvent::text(""))
        );
        assert_eq!(relay.emitted(), 2);
    }

    #[test]
    fn test_non_data_lines_are_skipped() {
        let mut relay = StreamRelay::new();
        assert_eq!(relay.push_line(": keep-alive"), RelayStep::Skip);
        assert_eq!(relay.push_line("event: message"), RelayStep::Skip);
        assert_eq!(relay.push_line("   "), RelayStep::Skip);
    }

    #[test]
    fn test_marker_without_space() {
        let mut relay = StreamRelay::new();
        assert_eq!(
            relay.push_line(r#"data:{"choices":[{"delta":{"content":"x"}}]}"#),
            RelayStep::Emit(OobaStreamEvent::text("x"))
        );
        assert_eq!(relay.push_line("data:[DONE]"), RelayStep::Done);
    }

    #[test]
    fn test_splitter_handles_partial_lines() {
        let mut splitter = LineSplitter::new();
        assert!(splitter.push(b"data: {\"a\"").is_empty());
        assert_eq!(splitter.push(b":1}\r\n\ndata: [DO"), vec!["data: {\"a\":1}", ""]);
        assert_eq!(splitter.push(b"NE]\n"), vec!["data: [DONE]"]);
        assert_eq!(splitter.flush(), None);
    }

    #[test]
    fn test_splitter_keeps_split_utf8_intact() {
        let text = "data: é\n".as_bytes();
        // 'é' is two bytes; split between them
        let split = text.iter().position(|b| *b == 0xC3).unwrap() + 1;

        let mut splitter = LineSplitter::new();
        assert!(splitter.push(&text[..split]).is_empty());
        assert_eq!(splitter.push(&text[split..]), vec!["data: é"]);
    }

    #[test]
    fn test_splitter_flushes_trailing_line() {
        let mut splitter = LineSplitter::new();
        assert!(splitter.push(b"data: [DONE]").is_empty());
        assert_eq!(splitter.flush(), Some("data: [DONE]".to_string()));
        assert_eq!(splitter.flush(), None);
    }

    #[test]
    fn test_splitter_discards_oversized_line() {
        let mut splitter = LineSplitter::with_limit(8);
        assert!(splitter.push(b"data: 0123456789").is_empty());
        assert!(splitter.push(b"still the same line").is_empty());
        assert_eq!(splitter.push(b"tail\ndata: ok\n"), vec!["data: ok"]);
        assert_eq!(splitter.flush(), None);
    }

    #[test]
    fn test_splitter_oversized_tail_is_not_flushed() {
        let mut splitter = LineSplitter::with_limit(4);
        assert!(splitter.push(b"data: [DONE]").is_empty());
        assert_eq!(splitter.flush(), None);
    }
}
