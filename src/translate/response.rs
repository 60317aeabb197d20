use super::ooba_types::{OobaGenerateResponse, OobaResult};
use super::openai_types::ChatCompletionResponse;
use crate::error::{ProxyError, Result};

/// Translate a chat completion response into an Ooba generate response.
/// Reads only the first choice; null content becomes empty text.
pub fn chat_to_ooba(resp: &ChatCompletionResponse) -> Result<OobaGenerateResponse> {
    let choice = resp
        .choices
        .first()
        .ok_or_else(|| ProxyError::translation("upstream response contained no choices"))?;

    let text = choice.message.content.clone().unwrap_or_default();
    let tokens = approximate_token_count(&text);

    Ok(OobaGenerateResponse {
        results: vec![OobaResult { text, tokens }],
    })
}

/// Number of whitespace-separated words in `text`.
pub fn approximate_token_count(text: &str) -> usize {
    text.split_whitespace().count()
}
