//! API translation between the legacy Ooba format and `OpenAI`-style chat completions.
//!
//! The core of the proxy: converts requests, responses, and streaming lines
//! between the two API formats. All translation functions are pure (no I/O).

pub mod ooba_types;
pub mod openai_types;
pub mod request;
pub mod response;
pub mod streaming;
