use async_trait::async_trait;
use serde_json::Value;

use crate::error::TransportError;
use crate::message::Message;

/// A request for a single chat completion.
#[derive(Clone, Debug, Default)]
pub struct ChatCompletionsRequest {
    /// The ordered messages to send, already filtered for model
    /// visibility by the caller.
    pub messages: Vec<Message>,
    /// An optional JSON schema the response text must conform to.
    pub json_schema: Option<Value>,
    /// An optional forced tool choice, for backends that support it.
    pub tool_choice: Option<String>,
    /// An optional backend-specific prompt template name.
    pub prompt_template: Option<String>,
}

impl ChatCompletionsRequest {
    /// Creates a plain request with no schema or tool choice.
    pub fn new(messages: Vec<Message>) -> Self {
        Self {
            messages,
            ..Self::default()
        }
    }
}

/// The completed response to a chat request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChatCompletionsResult {
    /// The model-generated text.
    pub text: String,
}

/// A client that can produce one chat completion per request.
///
/// Implementations should behave like stateless objects: they may keep
/// connection pools or other internals, but callers never rely on state
/// carried between requests. Failures are reported as
/// [`TransportError`] and are never retried by the core.
#[async_trait]
pub trait CompletionsClient: Send + Sync {
    /// Sends one request and awaits the full response.
    async fn get_chat_completion(
        &self,
        request: ChatCompletionsRequest,
    ) -> Result<ChatCompletionsResult, TransportError>;
}
