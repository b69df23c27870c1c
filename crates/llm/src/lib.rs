//! Text generation capability used by the workflow pipeline.
//!
//! [`Generator`] is the seam: [`ChatClient`] talks to any OpenAI-compatible
//! chat completions endpoint, [`OfflineGenerator`] stands in when no
//! credential is configured.

mod client;
mod error;
mod generator;
mod json;
mod types;

pub use client::{
    ChatClient, ChatClientConfig, RetryPolicy, DEFAULT_BASE_URL, DEFAULT_MODEL,
    DEFAULT_REQUEST_TIMEOUT,
};
pub use error::{LlmError, LlmResult};
pub use generator::{generate_structured, Generator, OfflineGenerator, OutputSchema, OFFLINE_TEXT};
pub use json::extract_json;
pub use types::*;
