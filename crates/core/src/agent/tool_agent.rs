//! The composite tool-calling agent.

use std::sync::{Arc, OnceLock};

use cellflow_model::{
    AgentName, CompletionsClient, MessageVisibility, Role,
};

use crate::agent::custom::{CustomAgent, CustomAgentConfig, ValidatedConfig};
use crate::agent::{Agent, AgentCell};
use crate::cell::{Cell, SequenceCell};
use crate::conversation::ConversationThread;
use crate::error::Error;
use crate::persistence::ExchangeWriter;
use crate::prompt::Prompt;
use crate::strategy::{InstructionStrategy, ToolOutputStrategy};
use crate::tool::{ExecuteToolCell, Tool, ToolRouting, ToolSelection};

/// The instruction given to the selection sub-agent when the caller
/// does not supply one. The `tools` variable is always bound by the
/// agent itself.
const DEFAULT_SELECTION_TEMPLATE: &str = "\
You are a function-calling assistant. Based on the last user message, \
select exactly one of the functions below and reply with a JSON object \
containing the fields `last_user_message_intent`, `function_name` and \
`invocation`.

Available functions:

{{tools}}

If no function applies, set `invocation` to `direct_response()`.";

/// Accumulated configuration for a [`ToolAgent`].
#[derive(Clone, Default)]
pub struct ToolAgentConfig {
    /// The name the agent authors messages under.
    pub name: Option<AgentName>,
    /// The role of the final response message.
    pub role: Option<Role>,
    /// The completions client shared by both sub-agents.
    pub client: Option<Arc<dyn CompletionsClient>>,
    /// The registered tools. At least one is required.
    pub tools: Vec<Arc<dyn Tool>>,
    /// How a parsed selection is routed to a registered tool.
    pub routing: ToolRouting,
    /// Overrides the built-in selection instruction.
    pub selection_instruction: Option<Prompt>,
    /// An optional instruction for the responding sub-agent.
    pub response_instruction: Option<Prompt>,
    /// Where the selection instruction is placed.
    pub instruction_strategy: InstructionStrategy,
    /// Where the tool output lands in the responder's outbound view.
    pub tool_output_strategy: ToolOutputStrategy,
    /// An optional sink for completed exchanges, shared by both
    /// sub-agents.
    pub writer: Option<Arc<dyn ExchangeWriter>>,
}

impl ToolAgentConfig {
    /// Creates an empty configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the agent name.
    pub fn with_name(mut self, name: AgentName) -> Self {
        self.name = Some(name);
        self
    }

    /// Sets the role of the final response.
    pub fn with_role(mut self, role: Role) -> Self {
        self.role = Some(role);
        self
    }

    /// Sets the completions client.
    pub fn with_client(mut self, client: Arc<dyn CompletionsClient>) -> Self {
        self.client = Some(client);
        self
    }

    /// Registers a tool.
    pub fn with_tool(mut self, tool: Arc<dyn Tool>) -> Self {
        self.tools.push(tool);
        self
    }

    /// Sets the routing mode.
    pub fn with_routing(mut self, routing: ToolRouting) -> Self {
        self.routing = routing;
        self
    }

    /// Overrides the built-in selection instruction.
    pub fn with_selection_instruction(mut self, instruction: Prompt) -> Self {
        self.selection_instruction = Some(instruction);
        self
    }

    /// Sets an instruction for the responding sub-agent.
    pub fn with_response_instruction(mut self, instruction: Prompt) -> Self {
        self.response_instruction = Some(instruction);
        self
    }

    /// Sets the instruction-placement strategy for the selector.
    pub fn with_instruction_strategy(
        mut self,
        strategy: InstructionStrategy,
    ) -> Self {
        self.instruction_strategy = strategy;
        self
    }

    /// Sets the tool-output-placement strategy for the responder.
    pub fn with_tool_output_strategy(
        mut self,
        strategy: ToolOutputStrategy,
    ) -> Self {
        self.tool_output_strategy = strategy;
        self
    }

    /// Attaches an exchange writer to both sub-agents.
    pub fn with_exchange_writer(
        mut self,
        writer: Arc<dyn ExchangeWriter>,
    ) -> Self {
        self.writer = Some(writer);
        self
    }

    /// Validates the required fields and finalizes the agent.
    ///
    /// Both sub-agent configurations are validated here so that no
    /// configuration error can surface later at run time.
    pub fn build(self) -> Result<ToolAgent, Error> {
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
        if self.tools.is_empty() {
            return Err(Error::Configuration(
                "a tool agent requires at least one tool".to_owned(),
            ));
        }

        let selection_instruction = self
            .selection_instruction
            .unwrap_or_else(|| {
                Prompt::new(DEFAULT_SELECTION_TEMPLATE)
                    .with_declared_variable("tools")
            });

        let mut selector = CustomAgentConfig::new()
            .with_name(AgentName::new("ToolSelectorAgent"))
            .with_role(Role::ToolInvocation)
            .with_client(Arc::clone(&client))
            .with_instruction(selection_instruction)
            .with_variable("tools", join_tool_definitions(&self.tools))
            .with_instruction_strategy(self.instruction_strategy)
            .with_visibility(MessageVisibility::new(false, true))
            .with_response_schema(ToolSelection::json_schema())
            .with_tool_choice("invoke_function");
        if let Some(writer) = &self.writer {
            selector = selector.with_exchange_writer(Arc::clone(writer));
        }

        let mut responder = CustomAgentConfig::new()
            .with_name(AgentName::new("ResponseAgent"))
            .with_role(role)
            .with_client(Arc::clone(&client))
            .with_tool_output_strategy(self.tool_output_strategy);
        if let Some(instruction) = self.response_instruction {
            responder = responder.with_instruction(instruction);
        }
        if let Some(writer) = &self.writer {
            responder = responder.with_exchange_writer(Arc::clone(writer));
        }

        Ok(ToolAgent {
            name,
            role,
            tools: self.tools,
            routing: self.routing,
            selector: Memoized::new(selector.validate()?),
            responder: Memoized::new(responder.validate()?),
        })
    }
}

/// A sub-agent slot built lazily, exactly once, from an
/// already-validated configuration.
struct Memoized {
    config: ValidatedConfig,
    slot: OnceLock<Arc<CustomAgent>>,
}

impl Memoized {
    fn new(config: ValidatedConfig) -> Self {
        Self {
            config,
            slot: OnceLock::new(),
        }
    }

    fn get(&self) -> Arc<dyn Agent> {
        let agent = self.slot.get_or_init(|| {
            Arc::new(CustomAgent::from_validated(self.config.clone()))
        });
        Arc::clone(agent) as Arc<dyn Agent>
    }
}

/// A composite agent that selects a tool, executes it, and responds.
///
/// Its generated program is a fixed three-cell sequence: the selection
/// sub-agent (schema-forced ToolInvocation output), the tool-execution
/// cell, and the responding sub-agent.
pub struct ToolAgent {
    name: AgentName,
    role: Role,
    tools: Vec<Arc<dyn Tool>>,
    routing: ToolRouting,
    selector: Memoized,
    responder: Memoized,
}

impl Agent for ToolAgent {
    fn name(&self) -> &AgentName {
        &self.name
    }

    fn role(&self) -> Role {
        self.role
    }

    fn next_program(&self) -> Box<dyn Cell<ConversationThread>> {
        Box::new(SequenceCell::new(vec![
            Box::new(AgentCell::new(self.selector.get())),
            Box::new(
                ExecuteToolCell::new(self.tools.clone())
                    .with_routing(self.routing),
            ),
            Box::new(AgentCell::new(self.responder.get())),
        ]))
    }
}

fn join_tool_definitions(tools: &[Arc<dyn Tool>]) -> String {
    tools
        .iter()
        .map(|tool| tool.definition())
        .collect::<Vec<_>>()
        .join("\n\n")
}
