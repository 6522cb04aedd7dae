//! Agents and their generated programs.
//!
//! An [`Agent`] is a policy: given the current state of a conversation,
//! it produces the next cell program to run. [`CustomAgent`] is the
//! primitive single-turn responder; [`ToolAgent`] composes two of them
//! around the tool-invocation pipeline. [`AgentCell`] is the bridge that
//! lets a program delegate to an agent's generated sub-program.

mod console;
mod custom;
mod tool_agent;

use std::sync::Arc;

use async_trait::async_trait;
use cellflow_model::{AgentName, Role};

use crate::cell::{Cell, RunContext};
use crate::conversation::ConversationThread;
use crate::error::Error;

pub use console::{ReadUserInputCell, UserConsoleAgent};
pub use custom::{CustomAgent, CustomAgentConfig};
pub use tool_agent::{ToolAgent, ToolAgentConfig};

/// A policy that generates the next cell program to run against the
/// current thread.
pub trait Agent: Send + Sync {
    /// Returns the name this agent authors messages under.
    fn name(&self) -> &AgentName;

    /// Returns the role this agent authors messages under.
    fn role(&self) -> Role;

    /// Produces the next program to run.
    fn next_program(&self) -> Box<dyn Cell<ConversationThread>>;
}

/// A cell that delegates to an agent's generated sub-program.
pub struct AgentCell {
    agent: Arc<dyn Agent>,
}

impl AgentCell {
    /// Creates a cell over the given agent.
    pub fn new(agent: Arc<dyn Agent>) -> Self {
        Self { agent }
    }
}

#[async_trait]
impl Cell<ConversationThread> for AgentCell {
    fn name(&self) -> &str {
        "agent"
    }

    async fn run(
        &self,
        input: ConversationThread,
        cx: &RunContext,
    ) -> Result<ConversationThread, Error> {
        debug!(agent = %self.agent.name(), "delegating to agent program");
        let program = self.agent.next_program();
        program.run(input, cx).await
    }
}
