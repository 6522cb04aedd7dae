//! The persistence hook.
//!
//! The core never stores anything itself. After each completion, the
//! request/reply pair is handed to an [`ExchangeWriter`] on a
//! fire-and-forget basis so storage latency and failures never block or
//! fail the run.

use std::error::Error as StdError;

use async_trait::async_trait;
use cellflow_model::Message;

use crate::conversation::ConversationId;

/// One completed model exchange: the messages sent out and the reply
/// that came back.
#[derive(Clone, Debug)]
pub struct Exchange {
    /// The conversation the exchange belongs to.
    pub conversation_id: ConversationId,
    /// A unique id for this exchange.
    pub request_id: String,
    /// The rendered messages sent to the model.
    pub input_messages: Vec<Message>,
    /// The reply message appended to the thread.
    pub output_message: Message,
}

/// A sink for completed exchanges.
///
/// Writers run detached from the agent's control flow; a failed write is
/// logged and dropped, never surfaced to the run.
#[async_trait]
pub trait ExchangeWriter: Send + Sync {
    /// Stores one exchange.
    async fn store_exchange(
        &self,
        exchange: Exchange,
    ) -> Result<(), Box<dyn StdError + Send + Sync>>;
}
