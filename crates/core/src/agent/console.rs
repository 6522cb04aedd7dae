//! The console-driven user agent.

use async_trait::async_trait;
use cellflow_model::{AgentName, Message, Role};
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::agent::Agent;
use crate::cell::{Cell, RunContext};
use crate::conversation::ConversationThread;
use crate::error::Error;

/// Reads one trimmed line from standard input and appends it as a User
/// message. The read is a suspension point: cancelling the run abandons
/// it with [`Error::Cancelled`].
pub struct ReadUserInputCell {
    agent_name: AgentName,
}

impl ReadUserInputCell {
    /// Creates the cell; input is recorded under the given agent name.
    pub fn new(agent_name: AgentName) -> Self {
        Self { agent_name }
    }
}

#[async_trait]
impl Cell<ConversationThread> for ReadUserInputCell {
    fn name(&self) -> &str {
        "read_user_input"
    }

    async fn run(
        &self,
        input: ConversationThread,
        cx: &RunContext,
    ) -> Result<ConversationThread, Error> {
        cx.ensure_active()?;

        let mut reader = BufReader::new(tokio::io::stdin());
        let mut line = String::new();
        tokio::select! {
            _ = cx.cancellation().cancelled() => {
                return Err(Error::Cancelled);
            }
            read = reader.read_line(&mut line) => {
                let count = read.map_err(|err| {
                    Error::Protocol(format!("could not read user input: {err}"))
                })?;
                if count == 0 {
                    return Err(Error::Protocol(
                        "user input stream closed".to_owned(),
                    ));
                }
            }
        }

        Ok(input.with_added_message(Message::new(
            self.agent_name.clone(),
            Role::User,
            line.trim(),
        )))
    }
}

/// An agent whose program asks the user at the console for their next
/// message.
pub struct UserConsoleAgent {
    name: AgentName,
}

impl UserConsoleAgent {
    /// Creates a console agent authoring under the given name.
    pub fn new(name: AgentName) -> Self {
        Self { name }
    }
}

impl Agent for UserConsoleAgent {
    fn name(&self) -> &AgentName {
        &self.name
    }

    fn role(&self) -> Role {
        Role::User
    }

    fn next_program(&self) -> Box<dyn Cell<ConversationThread>> {
        Box::new(ReadUserInputCell::new(self.name.clone()))
    }
}
