//! Tool call supports.

mod execute;

use std::error::Error as StdError;

use async_trait::async_trait;

use crate::conversation::ConversationThread;

pub use execute::{ExecuteToolCell, ToolRouting, ToolSelection};

/// A failure reported by a tool.
///
/// The interpreter propagates these unmodified; it never retries a tool
/// call on its own.
#[derive(Debug, thiserror::Error)]
#[error("tool `{tool}` failed: {message}")]
pub struct ToolError {
    tool: String,
    message: String,
    #[source]
    source: Option<Box<dyn StdError + Send + Sync>>,
}

impl ToolError {
    /// Creates a tool error.
    pub fn new<T, M>(tool: T, message: M) -> Self
    where
        T: Into<String>,
        M: Into<String>,
    {
        Self {
            tool: tool.into(),
            message: message.into(),
            source: None,
        }
    }

    /// Attaches the underlying cause.
    pub fn with_source<E>(mut self, source: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        self.source = Some(Box::new(source));
        self
    }

    /// Returns the name of the failing tool.
    #[inline]
    pub fn tool(&self) -> &str {
        &self.tool
    }
}

/// An external capability invocable by name with a single string
/// argument.
///
/// Implementations should be stateless. The `definition` is a human- and
/// model-readable signature description, e.g.
/// `search_news(query: string) - searches recent news articles`; it is
/// what the tool-selection model sees when choosing a function.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Returns the name of the tool.
    fn name(&self) -> &str;

    /// Returns the signature description of the tool.
    fn definition(&self) -> &str;

    /// Invokes the tool with the extracted argument and the full thread
    /// at the point of invocation.
    async fn get_output(
        &self,
        thread: &ConversationThread,
        argument: &str,
    ) -> Result<String, ToolError>;
}
