//! The configurable single-turn responder.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use cellflow_model::{
    AgentName, ChatCompletionsRequest, CompletionsClient, Message,
    MessageVisibility, Role,
};
use serde_json::Value;
use uuid::Uuid;

use crate::cell::{Cell, RunContext, SequenceCell};
use crate::conversation::ConversationThread;
use crate::error::Error;
use crate::persistence::{Exchange, ExchangeWriter};
use crate::prompt::{self, Prompt};
use crate::strategy::{
    InstructionStrategy, ToolOutputStrategy, apply_instruction_strategy,
    apply_tool_output_strategy,
};

/// Accumulated configuration for a [`CustomAgent`].
///
/// All fields can be set in any order; nothing is validated until
/// [`CustomAgentConfig::build`], which fails with
/// [`Error::Configuration`] when the name, role, or completions client
/// is missing.
#[derive(Clone, Default)]
pub struct CustomAgentConfig {
    /// The name the agent authors messages under.
    pub name: Option<AgentName>,
    /// The role the agent authors messages under.
    pub role: Option<Role>,
    /// The completions client the agent sends requests through.
    pub client: Option<Arc<dyn CompletionsClient>>,
    /// An optional instruction prompt, rendered and inserted before the
    /// completion call.
    pub instruction: Option<Prompt>,
    /// Variables bound on the agent itself. These take precedence over
    /// the thread's template variables when rendering the instruction.
    pub variables: HashMap<String, String>,
    /// Where the rendered instruction is placed.
    pub instruction_strategy: InstructionStrategy,
    /// Where a preceding tool output is placed in the outbound view.
    pub tool_output_strategy: ToolOutputStrategy,
    /// Visibility stamped on the reply message.
    pub visibility: MessageVisibility,
    /// An optional JSON schema the reply must conform to.
    pub response_schema: Option<Value>,
    /// An optional forced tool choice forwarded to the client.
    pub tool_choice: Option<String>,
    /// An optional sink for completed exchanges.
    pub writer: Option<Arc<dyn ExchangeWriter>>,
}

impl CustomAgentConfig {
    /// Creates an empty configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the agent name.
    pub fn with_name(mut self, name: AgentName) -> Self {
        self.name = Some(name);
        self
    }

    /// Sets the agent role.
    pub fn with_role(mut self, role: Role) -> Self {
        self.role = Some(role);
        self
    }

    /// Sets the completions client.
    pub fn with_client(mut self, client: Arc<dyn CompletionsClient>) -> Self {
        self.client = Some(client);
        self
    }

    /// Sets the instruction prompt.
    pub fn with_instruction(mut self, instruction: Prompt) -> Self {
        self.instruction = Some(instruction);
        self
    }

    /// Binds a template variable on the agent.
    pub fn with_variable<K, V>(mut self, key: K, value: V) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        let _ = self.variables.insert(key.into(), value.into());
        self
    }

    /// Sets the instruction-placement strategy.
    pub fn with_instruction_strategy(
        mut self,
        strategy: InstructionStrategy,
    ) -> Self {
        self.instruction_strategy = strategy;
        self
    }

    /// Sets the tool-output-placement strategy.
    pub fn with_tool_output_strategy(
        mut self,
        strategy: ToolOutputStrategy,
    ) -> Self {
        self.tool_output_strategy = strategy;
        self
    }

    /// Sets the visibility stamped on reply messages.
    pub fn with_visibility(mut self, visibility: MessageVisibility) -> Self {
        self.visibility = visibility;
        self
    }

    /// Forces replies to conform to the given JSON schema.
    pub fn with_response_schema(mut self, schema: Value) -> Self {
        self.response_schema = Some(schema);
        self
    }

    /// Forces a tool choice on the client.
    pub fn with_tool_choice<S: Into<String>>(mut self, choice: S) -> Self {
        self.tool_choice = Some(choice.into());
        self
    }

    /// Attaches an exchange writer.
    pub fn with_exchange_writer(
        mut self,
        writer: Arc<dyn ExchangeWriter>,
    ) -> Self {
        self.writer = Some(writer);
        self
    }

    /// Validates the required fields and finalizes the agent.
    pub fn build(self) -> Result<CustomAgent, Error> {
        Ok(CustomAgent::from_validated(self.validate()?))
    }

    pub(crate) fn validate(self) -> Result<ValidatedConfig, Error> {
        let Some(name) = self.name else {
            return Err(Error::Configuration("agent name is unset".to_owned()));
        };
        let Some(role) = self.role else {
            return Err(Error::Configuration("agent role is unset".to_owned()));
        };
        let Some(client) = self.client else {
            return Err(Error::Configuration(
                "completions client is unset".to_owned(),
            ));
        };

        Ok(ValidatedConfig {
            name,
            role,
            client,
            instruction: self.instruction,
            variables: self.variables,
            instruction_strategy: self.instruction_strategy,
            tool_output_strategy: self.tool_output_strategy,
            visibility: self.visibility,
            response_schema: self.response_schema,
            tool_choice: self.tool_choice,
            writer: self.writer,
        })
    }
}

/// A configuration whose required fields are known present, so agent
/// construction from it cannot fail.
#[derive(Clone)]
pub(crate) struct ValidatedConfig {
    name: AgentName,
    role: Role,
    client: Arc<dyn CompletionsClient>,
    instruction: Option<Prompt>,
    variables: HashMap<String, String>,
    instruction_strategy: InstructionStrategy,
    tool_output_strategy: ToolOutputStrategy,
    visibility: MessageVisibility,
    response_schema: Option<Value>,
    tool_choice: Option<String>,
    writer: Option<Arc<dyn ExchangeWriter>>,
}

/// A single-turn responder: optionally inserts a rendered instruction,
/// then makes one completion call and appends the reply.
pub struct CustomAgent {
    config: ValidatedConfig,
}

impl CustomAgent {
    pub(crate) fn from_validated(config: ValidatedConfig) -> Self {
        Self { config }
    }
}

impl super::Agent for CustomAgent {
    fn name(&self) -> &AgentName {
        &self.config.name
    }

    fn role(&self) -> Role {
        self.config.role
    }

    fn next_program(&self) -> Box<dyn Cell<ConversationThread>> {
        let mut cells: Vec<Box<dyn Cell<ConversationThread>>> = Vec::new();
        if self.config.instruction.is_some() {
            cells.push(Box::new(ApplyInstructionCell {
                config: self.config.clone(),
            }));
        }
        cells.push(Box::new(CompletionCell {
            config: self.config.clone(),
        }));
        Box::new(SequenceCell::new(cells))
    }
}

/// Renders the configured instruction and inserts it per the
/// instruction strategy.
struct ApplyInstructionCell {
    config: ValidatedConfig,
}

#[async_trait]
impl Cell<ConversationThread> for ApplyInstructionCell {
    fn name(&self) -> &str {
        "apply_instruction"
    }

    async fn run(
        &self,
        input: ConversationThread,
        _cx: &RunContext,
    ) -> Result<ConversationThread, Error> {
        let Some(instruction) = &self.config.instruction else {
            return Ok(input);
        };

        // Agent-bound variables win over thread-bound ones.
        let mut variables = input.template_variables().clone();
        variables.extend(
            self.config
                .variables
                .iter()
                .map(|(k, v)| (k.clone(), v.clone())),
        );

        let rendered = prompt::render(instruction, &variables)?;
        apply_instruction_strategy(
            self.config.instruction_strategy,
            &self.config.name,
            &rendered,
            &input,
        )
    }
}

/// Makes one completion call and appends the reply to the thread.
///
/// The request is built from a derived outbound view of the thread:
/// template tokens applied to the system message, model-invisible
/// messages dropped, and the tool-output strategy applied. The reply is
/// appended to the original thread, never the derived one, so rendering
/// artifacts never leak into conversation history.
struct CompletionCell {
    config: ValidatedConfig,
}

#[async_trait]
impl Cell<ConversationThread> for CompletionCell {
    fn name(&self) -> &str {
        "completion"
    }

    async fn run(
        &self,
        input: ConversationThread,
        cx: &RunContext,
    ) -> Result<ConversationThread, Error> {
        if input
            .last_message()
            .is_some_and(|m| m.role == Role::Assistant)
        {
            warn!(
                agent = %self.config.name,
                "requesting a completion while the last message is \
                 already from the assistant"
            );
        }

        let outbound = apply_tool_output_strategy(
            self.config.tool_output_strategy,
            &input
                .with_template_applied_to_system()
                .with_model_visible_messages(),
        )?;

        let request = ChatCompletionsRequest {
            messages: outbound.messages().to_vec(),
            json_schema: self.config.response_schema.clone(),
            tool_choice: self.config.tool_choice.clone(),
            prompt_template: None,
        };

        cx.ensure_active()?;
        debug!(
            agent = %self.config.name,
            messages = request.messages.len(),
            "requesting completion"
        );
        let result = tokio::select! {
            _ = cx.cancellation().cancelled() => {
                return Err(Error::Cancelled);
            }
            result = self.config.client.get_chat_completion(request.clone()) => {
                result?
            }
        };

        let reply = Message::new(
            self.config.name.clone(),
            self.config.role,
            result.text,
        )
        .with_visibility(self.config.visibility);

        if let Some(writer) = &self.config.writer {
            store_exchange_detached(
                Arc::clone(writer),
                Exchange {
                    conversation_id: input.conversation_id().clone(),
                    request_id: Uuid::new_v4().simple().to_string(),
                    input_messages: request.messages,
                    output_message: reply.clone(),
                },
            );
        }

        Ok(input.with_added_message(reply))
    }
}

/// Hands the exchange to the writer without awaiting it. A failed write
/// is logged and dropped.
fn store_exchange_detached(writer: Arc<dyn ExchangeWriter>, exchange: Exchange) {
    drop(tokio::spawn(async move {
        let request_id = exchange.request_id.clone();
        if let Err(err) = writer.store_exchange(exchange).await {
            warn!(%request_id, "failed to store exchange: {err}");
        }
    }));
}
