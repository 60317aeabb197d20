//! Type definitions for the legacy Ooba text-generation API.
//!
//! These are the shapes exposed to callers of `/api/v1/generate`: the request
//! with its per-field defaults, the buffered response, and the streamed events.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Request types (what callers send TO us)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OobaGenerateRequest {
    #[serde(default)]
    pub prompt: String,
    #[serde(default = "default_max_new_tokens")]
    pub max_new_tokens: i64,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    #[serde(default = "default_top_p")]
    pub top_p: f64,
    // Accepted for compatibility, never forwarded upstream
    #[serde(default = "default_top_k")]
    pub top_k: i64,
    #[serde(default = "default_repetition_penalty")]
    pub repetition_penalty: f64,
    #[serde(default)]
    pub stopping_strings: Vec<String>,
    #[serde(default)]
    pub stream: bool,
}

fn default_max_new_tokens() -> i64 {
    512
}

fn default_temperature() -> f64 {
    0.7
}

fn default_top_p() -> f64 {
    0.9
}

fn default_top_k() -> i64 {
    40
}

fn default_repetition_penalty() -> f64 {
    1.0
}

impl Default for OobaGenerateRequest {
    fn default() -> Self {
        Self {
            prompt: String::new(),
            max_new_tokens: default_max_new_tokens(),
            temperature: default_temperature(),
            top_p: default_top_p(),
            top_k: default_top_k(),
            repetition_penalty: default_repetition_penalty(),
            stopping_strings: Vec::new(),
            stream: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Response types (what we send BACK)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OobaGenerateResponse {
    pub results: Vec<OobaResult>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OobaResult {
    pub text: String,
    /// Whitespace word count, not a tokenizer count.
    pub tokens: usize,
}

/// Streaming event, serialized as `{"event": "...", "message_num": 0, ...}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum OobaStreamEvent {
    TextStream { message_num: u32, text: String },
    StreamEnd { message_num: u32 },
}

impl OobaStreamEvent {
    pub fn text(text: impl Into<String>) -> Self {
        Self::TextStream {
            message_num: 0,
            text: text.into(),
        }
    }

    pub fn end() -> Self {
        Self::StreamEnd { message_num: 0 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub details: String,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>, details: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            details: details.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_defaults() {
        let req: OobaGenerateRequest = serde_json::from_value(json!({})).unwrap();
        assert_eq!(req, OobaGenerateRequest::default());
        assert_eq!(req.prompt, "");
        assert_eq!(req.max_new_tokens, 512);
        assert_eq!(req.temperature, 0.7);
        assert_eq!(req.top_p, 0.9);
        assert_eq!(req.top_k, 40);
        assert_eq!(req.repetition_penalty, 1.0);
        assert!(req.stopping_strings.is_empty());
        assert!(!req.stream);
    }

    #[test]
    fn test_request_ignores_unknown_fields() {
        let req: OobaGenerateRequest = serde_json::from_value(json!({
            "prompt": "Hi",
            "typical_p": 1.0,
            "seed": -1
        }))
        .unwrap();
        assert_eq!(req.prompt, "Hi");
    }

    #[test]
    fn test_request_rejects_wrong_type() {
        let res = serde_json::from_value::<OobaGenerateRequest>(json!({"prompt": 42}));
        assert!(res.is_err());
    }

    #[test]
    fn test_stream_event_shape() {
        let text = serde_json::to_value(OobaStreamEvent::text("Hel")).unwrap();
        assert_eq!(
            text,
            json!({"event": "text_stream", "message_num": 0, "text": "Hel"})
        );

        let end = serde_json::to_value(OobaStreamEvent::end()).unwrap();
        assert_eq!(end, json!({"event": "stream_end", "message_num": 0}));
    }
}
