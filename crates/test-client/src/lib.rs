//! A scripted fake completions client for testing purpose.

mod preset;

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use cellflow_model::{
    ChatCompletionsRequest, ChatCompletionsResult, CompletionsClient,
    TransportError,
};

pub use preset::*;

/// A local fake completions client.
///
/// Before running a program, set up the reply script: each request
/// consumes the next scripted reply in order. When the script runs out,
/// the client fails with a transport error. Every request received is
/// captured and can be inspected afterwards, which lets tests assert on
/// exactly what the core sent to the model.
///
/// Requests and replies are cloned liberally to keep assertions simple,
/// so this belongs in tests and nowhere else.
#[derive(Default)]
pub struct ScriptedCompletionsClient {
    replies: Mutex<VecDeque<PresetReply>>,
    requests: Mutex<Vec<ChatCompletionsRequest>>,
}

impl ScriptedCompletionsClient {
    /// Creates a client with an empty script.
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a reply to the script.
    pub fn push_reply(&self, reply: PresetReply) {
        lock_recovering(&self.replies).push_back(reply);
    }

    /// Creates a client pre-loaded with the given replies.
    pub fn with_replies(replies: impl Into<Vec<PresetReply>>) -> Self {
        let client = Self::new();
        for reply in replies.into() {
            client.push_reply(reply);
        }
        client
    }

    /// Returns copies of every request received so far, in order.
    pub fn captured_requests(&self) -> Vec<ChatCompletionsRequest> {
        lock_recovering(&self.requests).clone()
    }

    /// Returns the number of scripted replies not yet consumed.
    pub fn remaining_replies(&self) -> usize {
        lock_recovering(&self.replies).len()
    }
}

#[async_trait]
impl CompletionsClient for ScriptedCompletionsClient {
    async fn get_chat_completion(
        &self,
        request: ChatCompletionsRequest,
    ) -> Result<ChatCompletionsResult, TransportError> {
        lock_recovering(&self.requests).push(request);

        let reply = lock_recovering(&self.replies).pop_front();
        match reply {
            Some(PresetReply::Text(text)) => {
                Ok(ChatCompletionsResult { text })
            }
            Some(PresetReply::Failure(message)) => {
                Err(TransportError::new(message))
            }
            None => Err(TransportError::new("no scripted reply remaining")),
        }
    }
}

fn lock_recovering<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
