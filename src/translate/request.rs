//! Translate legacy Ooba generation requests into chat completion requests.

use super::ooba_types::OobaGenerateRequest;
use super::openai_types::{ChatCompletionRequest, ChatMessage};

/// Translate an Ooba generate request into a chat completion request for `model`.
/// Pure function: no validation beyond the serde defaults already applied.
pub fn ooba_to_chat(req: &OobaGenerateRequest, model: &str) -> ChatCompletionRequest {
    let stop = if req.stopping_strings.is_empty() {
        None
    } else {
        Some(req.stopping_strings.clone())
    };

    ChatCompletionRequest {
        model: model.to_string(),
        messages: vec![ChatMessage {
            role: "user".to_string(),
            content: req.prompt.clone(),
        }],
        max_tokens: req.max_new_tokens,
        temperature: req.temperature,
        top_p: req.top_p,
        stop,
        stream: req.stream,
    }
}
