//! The tool-invocation pipeline cell.

use std::sync::Arc;

use async_trait::async_trait;
use cellflow_model::{AgentName, Message, MessageVisibility, Role};
use schemars::{JsonSchema, schema_for};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::cell::{Cell, RunContext};
use crate::conversation::ConversationThread;
use crate::error::Error;
use crate::tool::Tool;

/// The agent name recorded on tool output messages.
const TOOL_EXECUTION_AGENT: &str = "ToolExecution";

/// The notice recorded when the model declined to use a tool.
const NO_TOOL_NOTICE: &str =
    "nothing; no tool was executed. respond directly.";

/// The structured tool-selection payload the model is forced to emit.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct ToolSelection {
    /// The model's reading of what the user last asked for.
    pub last_user_message_intent: String,
    /// The name of the selected function.
    pub function_name: String,
    /// The call expression, e.g. `search_news('election polls')`, or
    /// `direct_response()` to skip tool execution.
    pub invocation: String,
}

impl ToolSelection {
    /// Returns the JSON schema forced onto the tool-selection model.
    pub fn json_schema() -> Value {
        schema_for!(ToolSelection).to_value()
    }
}

/// How the executor routes a parsed selection to a registered tool.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ToolRouting {
    /// Exact lookup on the parsed `function_name` field. An unknown name
    /// fails with [`Error::ToolNotFound`].
    #[default]
    ByName,
    /// Compatibility shim for models that mangle the `function_name`
    /// field: picks the first registered tool whose name appears as a
    /// substring of the raw selection text, and falls back to the first
    /// registered tool when none does. The fallback is logged loudly;
    /// prefer [`ToolRouting::ByName`].
    SubstringFallback,
}

/// Parses the trailing tool-selection message, dispatches to a matching
/// [`Tool`], and records its result as a ToolOutput message.
///
/// The input thread's last message must have role
/// [`Role::ToolInvocation`]; anything else is a protocol violation.
pub struct ExecuteToolCell {
    tools: Vec<Arc<dyn Tool>>,
    routing: ToolRouting,
}

impl ExecuteToolCell {
    /// Creates the cell over the given tools with default routing.
    pub fn new(tools: Vec<Arc<dyn Tool>>) -> Self {
        Self {
            tools,
            routing: ToolRouting::default(),
        }
    }

    /// Overrides the routing mode.
    pub fn with_routing(mut self, routing: ToolRouting) -> Self {
        self.routing = routing;
        self
    }

    fn route(
        &self,
        selection: &ToolSelection,
        raw_selection_text: &str,
    ) -> Result<Arc<dyn Tool>, Error> {
        match self.routing {
            ToolRouting::ByName => self
                .tools
                .iter()
                .find(|tool| tool.name() == selection.function_name)
                .cloned()
                .ok_or_else(|| {
                    Error::ToolNotFound(selection.function_name.clone())
                }),
            ToolRouting::SubstringFallback => {
                if let Some(tool) = self
                    .tools
                    .iter()
                    .find(|tool| raw_selection_text.contains(tool.name()))
                {
                    return Ok(Arc::clone(tool));
                }
                let first = self.tools.first().ok_or_else(|| {
                    Error::ToolNotFound(selection.function_name.clone())
                })?;
                warn!(
                    function_name = %selection.function_name,
                    fallback = %first.name(),
                    "no registered tool name found in the selection text; \
                     falling back to the first registered tool"
                );
                Ok(Arc::clone(first))
            }
        }
    }
}

#[async_trait]
impl Cell<ConversationThread> for ExecuteToolCell {
    fn name(&self) -> &str {
        "execute_tool"
    }

    async fn run(
        &self,
        input: ConversationThread,
        cx: &RunContext,
    ) -> Result<ConversationThread, Error> {
        let Some(last) = input.last_message() else {
            return Err(Error::Protocol(
                "expected a tool-invocation message, but the thread is empty"
                    .to_owned(),
            ));
        };
        if last.role != Role::ToolInvocation {
            return Err(Error::Protocol(format!(
                "expected the last message to be a tool invocation, was: {}",
                last.role
            )));
        }

        let selection = parse_tool_selection(&last.content)?;
        info!(
            function_name = %selection.function_name,
            intent = %selection.last_user_message_intent,
            "saw tool selection"
        );

        let output = if is_direct_response(&selection.invocation) {
            debug!("model chose to respond directly; skipping execution");
            NO_TOOL_NOTICE.to_owned()
        } else {
            let tool = self.route(&selection, &last.content)?;
            let argument = extract_argument(&selection.invocation)?;
            debug!(tool = tool.name(), %argument, "invoking tool");

            cx.ensure_active()?;
            tokio::select! {
                _ = cx.cancellation().cancelled() => {
                    return Err(Error::Cancelled);
                }
                output = tool.get_output(&input, &argument) => output?,
            }
        };

        Ok(input.with_added_message(
            Message::new(
                AgentName::new(TOOL_EXECUTION_AGENT),
                Role::ToolOutput,
                output,
            )
            .with_visibility(MessageVisibility::new(false, true)),
        ))
    }
}

fn is_direct_response(invocation: &str) -> bool {
    let invocation = invocation.trim();
    invocation == "direct_response()" || invocation == "direct_response"
}

/// Extracts the JSON object from the selection text, tolerating
/// extraneous prose around it.
fn parse_tool_selection(content: &str) -> Result<ToolSelection, Error> {
    let start = content.find('{').ok_or_else(|| {
        Error::Parse("no JSON object found in the selection text".to_owned())
    })?;
    let end = content
        .rfind('}')
        .filter(|end| *end > start)
        .ok_or_else(|| {
            Error::Parse(
                "no closing brace found in the selection text".to_owned(),
            )
        })?;

    serde_json::from_str(&content[start..=end])
        .map_err(|err| Error::Parse(err.to_string()))
}

/// Extracts the single string argument of a call expression: the
/// substring between the first `(` and the last `)`, with surrounding
/// quotes trimmed.
fn extract_argument(invocation: &str) -> Result<String, Error> {
    let invocation = invocation.trim();
    let open = invocation.find('(').ok_or_else(|| {
        Error::Parse(format!(
            "invocation has no opening parenthesis: `{invocation}`"
        ))
    })?;
    let close = invocation
        .rfind(')')
        .filter(|close| *close > open)
        .ok_or_else(|| {
            Error::Parse(format!(
                "invocation has no closing parenthesis: `{invocation}`"
            ))
        })?;

    let raw = invocation[open + 1..close].trim();
    Ok(trim_matching_quotes(raw).to_owned())
}

fn trim_matching_quotes(raw: &str) -> &str {
    for quote in ['\'', '"'] {
        if raw.len() >= 2
            && raw.starts_with(quote)
            && raw.ends_with(quote)
        {
            return &raw[1..raw.len() - 1];
        }
    }
    raw
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::time::Duration;

    use serde_json::json;
    use tokio::sync::watch;
    use tokio::time::timeout;
    use tokio_util::sync::CancellationToken;

    use super::*;
    use crate::conversation::ConversationId;
    use crate::tool::ToolError;

    /// Records the arguments it was called with.
    struct RecordingTool {
        name: &'static str,
        calls: Mutex<Vec<String>>,
    }

    impl RecordingTool {
        fn new(name: &'static str) -> Arc<Self> {
            Arc::new(Self {
                name,
                calls: Mutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Tool for RecordingTool {
        fn name(&self) -> &str {
            self.name
        }

        fn definition(&self) -> &str {
            "tool(argument: string) - a test tool"
        }

        async fn get_output(
            &self,
            _thread: &ConversationThread,
            argument: &str,
        ) -> Result<String, ToolError> {
            self.calls.lock().unwrap().push(argument.to_owned());
            Ok(format!("{}: ok", self.name))
        }
    }

    fn selection_json(function_name: &str, invocation: &str) -> String {
        json!({
            "last_user_message_intent": "x",
            "function_name": function_name,
            "invocation": invocation,
        })
        .to_string()
    }

    fn invocation_thread(content: &str) -> ConversationThread {
        ConversationThread::from_messages(
            ConversationId::new("conv-1"),
            vec![
                Message::new(
                    AgentName::new("user"),
                    Role::User,
                    "latest news on the election",
                ),
                Message::new(
                    AgentName::new("ToolSelectorAgent"),
                    Role::ToolInvocation,
                    content,
                )
                .with_visibility(MessageVisibility::new(false, true)),
            ],
        )
    }

    #[tokio::test]
    async fn test_selects_tool_by_function_name() {
        let search_web = RecordingTool::new("search_web");
        let search_news = RecordingTool::new("search_news");
        let cell = ExecuteToolCell::new(vec![
            Arc::clone(&search_web) as Arc<dyn Tool>,
            Arc::clone(&search_news) as Arc<dyn Tool>,
        ]);

        let thread = invocation_thread(&selection_json(
            "search_news",
            "search_news('election polls')",
        ));
        let output = cell.run(thread, &RunContext::new()).await.unwrap();

        assert_eq!(search_news.calls(), ["election polls"]);
        assert!(search_web.calls().is_empty());

        let last = output.last_message().unwrap();
        assert_eq!(last.role, Role::ToolOutput);
        assert!(!last.visibility.shown_to_user);
        assert!(last.visibility.shown_to_model);
    }

    #[tokio::test]
    async fn test_unknown_function_name_fails() {
        let cell = ExecuteToolCell::new(vec![
            RecordingTool::new("search_web") as Arc<dyn Tool>,
        ]);

        let thread = invocation_thread(&selection_json(
            "search_news",
            "search_news('polls')",
        ));
        let err = cell.run(thread, &RunContext::new()).await.unwrap_err();

        assert!(matches!(err, Error::ToolNotFound(name) if name == "search_news"));
    }

    #[tokio::test]
    async fn test_substring_routing_matches_selection_text() {
        let search_web = RecordingTool::new("search_web");
        let search_news = RecordingTool::new("search_news");
        let cell = ExecuteToolCell::new(vec![
            Arc::clone(&search_web) as Arc<dyn Tool>,
            Arc::clone(&search_news) as Arc<dyn Tool>,
        ])
        .with_routing(ToolRouting::SubstringFallback);

        // The function_name field is mangled, but the invocation text
        // still contains the real tool name.
        let thread = invocation_thread(&selection_json(
            "newsSearch",
            "search_news('election polls')",
        ));
        let _ = cell.run(thread, &RunContext::new()).await.unwrap();

        assert_eq!(search_news.calls(), ["election polls"]);
    }

    #[tokio::test]
    async fn test_substring_routing_falls_back_to_first_tool() {
        let search_web = RecordingTool::new("search_web");
        let search_news = RecordingTool::new("search_news");
        let cell = ExecuteToolCell::new(vec![
            Arc::clone(&search_web) as Arc<dyn Tool>,
            Arc::clone(&search_news) as Arc<dyn Tool>,
        ])
        .with_routing(ToolRouting::SubstringFallback);

        let thread = invocation_thread(&selection_json(
            "lookup",
            "lookup('polls')",
        ));
        let _ = cell.run(thread, &RunContext::new()).await.unwrap();

        assert_eq!(search_web.calls(), ["polls"]);
        assert!(search_news.calls().is_empty());
    }

    #[tokio::test]
    async fn test_direct_response_skips_execution() {
        let search_web = RecordingTool::new("search_web");
        let cell = ExecuteToolCell::new(vec![
            Arc::clone(&search_web) as Arc<dyn Tool>,
        ]);

        let thread = invocation_thread(&selection_json(
            "direct_response",
            "direct_response()",
        ));
        let output = cell.run(thread, &RunContext::new()).await.unwrap();

        assert!(search_web.calls().is_empty());
        let last = output.last_message().unwrap();
        assert_eq!(last.role, Role::ToolOutput);
        assert_eq!(last.content, NO_TOOL_NOTICE);
    }

    #[tokio::test]
    async fn test_requires_tool_invocation_last() {
        let cell = ExecuteToolCell::new(vec![
            RecordingTool::new("search_web") as Arc<dyn Tool>,
        ]);

        let thread = ConversationThread::from_messages(
            ConversationId::new("conv-1"),
            vec![Message::new(AgentName::new("user"), Role::User, "hi")],
        );
        let err = cell.run(thread, &RunContext::new()).await.unwrap_err();

        assert!(matches!(err, Error::Protocol(_)));
    }

    #[tokio::test]
    async fn test_malformed_selection_fails_parse() {
        let cell = ExecuteToolCell::new(vec![
            RecordingTool::new("search_web") as Arc<dyn Tool>,
        ]);

        let thread = invocation_thread("not json at all");
        let err = cell.run(thread, &RunContext::new()).await.unwrap_err();

        assert!(matches!(err, Error::Parse(_)));
    }

    #[tokio::test]
    async fn test_prose_around_json_is_tolerated() {
        let search_web = RecordingTool::new("search_web");
        let cell = ExecuteToolCell::new(vec![
            Arc::clone(&search_web) as Arc<dyn Tool>,
        ]);

        let content = format!(
            "Sure! Here is my selection:\n{}\nLet me know.",
            selection_json("search_web", "search_web(\"cute puppies\")"),
        );
        let thread = invocation_thread(&content);
        let _ = cell.run(thread, &RunContext::new()).await.unwrap();

        assert_eq!(search_web.calls(), ["cute puppies"]);
    }

    /// Signals when it is invoked, then never returns.
    struct BlockingTool {
        started: watch::Sender<bool>,
    }

    #[async_trait]
    impl Tool for BlockingTool {
        fn name(&self) -> &str {
            "slow_tool"
        }

        fn definition(&self) -> &str {
            "slow_tool(argument: string) - a tool that never finishes"
        }

        async fn get_output(
            &self,
            _thread: &ConversationThread,
            _argument: &str,
        ) -> Result<String, ToolError> {
            let _ = self.started.send(true);
            std::future::pending().await
        }
    }

    #[tokio::test]
    async fn test_cancelling_mid_tool_call_abandons_it() {
        let (started_tx, mut started_rx) = watch::channel(false);
        let cell = ExecuteToolCell::new(vec![Arc::new(BlockingTool {
            started: started_tx,
        }) as Arc<dyn Tool>]);

        let token = CancellationToken::new();
        let cx = RunContext::with_cancellation(token.clone());
        let thread = invocation_thread(&selection_json(
            "slow_tool",
            "slow_tool('x')",
        ));
        let run = tokio::spawn(async move { cell.run(thread, &cx).await });

        // Cancel only once the tool call is actually in flight.
        started_rx.wait_for(|started| *started).await.unwrap();
        token.cancel();

        let result = timeout(Duration::from_secs(5), run)
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(result, Err(Error::Cancelled)));
    }

    #[test]
    fn test_extract_argument_trims_quotes() {
        assert_eq!(
            extract_argument("search_web('cute puppies')").unwrap(),
            "cute puppies"
        );
        assert_eq!(
            extract_argument("search_web(\"quoted\")").unwrap(),
            "quoted"
        );
        assert_eq!(extract_argument("noop()").unwrap(), "");
        assert!(extract_argument("no_parens").is_err());
    }

    #[test]
    fn test_schema_requires_all_fields() {
        let schema = ToolSelection::json_schema();
        let required = schema["required"]
            .as_array()
            .expect("schema should list required fields");
        for field in
            ["last_user_message_intent", "function_name", "invocation"]
        {
            assert!(required.iter().any(|v| v == field), "missing {field}");
        }
    }
}
