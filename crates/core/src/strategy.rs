//! Message-placement strategies.
//!
//! Pure appliers that decide where a rendered instruction or a tool's
//! output lands in the message list. Both appliers take a thread and
//! return a new one; neither ever reorders existing messages.

use cellflow_model::{AgentName, Message, Role};

use crate::conversation::ConversationThread;
use crate::error::Error;

/// Where a rendered instruction message is placed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum InstructionStrategy {
    /// Strip any existing System message and insert the new one at
    /// position 0.
    #[default]
    TopLevelSystemMessage,
    /// Append the instruction as a new User-role message at the end.
    InlineUserMessage,
    /// Append the instruction as a new System-role message at the end
    /// (not at position 0).
    InlineSystemMessage,
    /// Wrap the instruction in a delimiter tag and append it to the last
    /// User message's content. Fails if the last message is not
    /// User-role.
    AppendedToUserMessage,
    /// Reserved and unimplemented. Applying it fails explicitly rather
    /// than silently defaulting to another strategy.
    PrecedingLastUserMessage,
}

/// Where a tool's recorded output is placed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ToolOutputStrategy {
    /// No transform; the ToolOutput message stays a distinct message.
    InlineToolOutputMessage,
    /// Remove the ToolOutput message and append its content, wrapped in
    /// a delimiter tag, to the last User message.
    #[default]
    AppendedToUserMessage,
}

/// Inserts a rendered instruction into the thread per the strategy.
pub fn apply_instruction_strategy(
    strategy: InstructionStrategy,
    agent_name: &AgentName,
    content: &str,
    thread: &ConversationThread,
) -> Result<ConversationThread, Error> {
    match strategy {
        InstructionStrategy::TopLevelSystemMessage => {
            Ok(thread.with_system_message(Message::new(
                agent_name.clone(),
                Role::System,
                content,
            )))
        }
        InstructionStrategy::InlineUserMessage => {
            Ok(thread.with_added_message(Message::new(
                agent_name.clone(),
                Role::User,
                content,
            )))
        }
        InstructionStrategy::InlineSystemMessage => {
            Ok(thread.with_added_message(Message::new(
                agent_name.clone(),
                Role::System,
                content,
            )))
        }
        InstructionStrategy::AppendedToUserMessage => {
            append_to_last_user_message(
                thread,
                &format!("\n\n<instructions>{content}</instructions>"),
            )
        }
        InstructionStrategy::PrecedingLastUserMessage => {
            Err(Error::NotSupported("PrecedingLastUserMessage"))
        }
    }
}

/// Re-places the latest tool output in the thread per the strategy.
///
/// With [`ToolOutputStrategy::AppendedToUserMessage`], the ToolInvocation
/// and ToolOutput messages are removed and the output content is folded
/// into the last User message. A thread with no ToolOutput message is
/// returned unchanged.
pub fn apply_tool_output_strategy(
    strategy: ToolOutputStrategy,
    thread: &ConversationThread,
) -> Result<ConversationThread, Error> {
    match strategy {
        ToolOutputStrategy::InlineToolOutputMessage => Ok(thread.clone()),
        ToolOutputStrategy::AppendedToUserMessage => {
            let Some(tool_output) = thread
                .messages()
                .iter()
                .rev()
                .find(|m| m.role == Role::ToolOutput)
            else {
                return Ok(thread.clone());
            };
            let output_content = tool_output.content.clone();

            let without_tool_messages = thread.with_matching_messages(|m| {
                m.role != Role::ToolInvocation && m.role != Role::ToolOutput
            });

            append_to_last_user_message(
                &without_tool_messages,
                &format!("\n\n<tool_output>\n{output_content}\n</tool_output>"),
            )
        }
    }
}

fn append_to_last_user_message(
    thread: &ConversationThread,
    suffix: &str,
) -> Result<ConversationThread, Error> {
    let Some(last) = thread.last_message() else {
        return Err(Error::Protocol(
            "cannot append to the last user message of an empty thread"
                .to_owned(),
        ));
    };
    if last.role != Role::User {
        return Err(Error::Protocol(format!(
            "expected the last message to be user-role, was: {}",
            last.role
        )));
    }

    let updated = Message {
        content: format!("{}{suffix}", last.content),
        ..last.clone()
    };

    let mut messages = thread.messages().to_vec();
    let _ = messages.pop();
    messages.push(updated);
    Ok(thread.with_replaced_messages(messages))
}

#[cfg(test)]
mod tests {
    use cellflow_model::MessageVisibility;

    use super::*;
    use crate::conversation::ConversationId;

    fn agent() -> AgentName {
        AgentName::new("agent")
    }

    fn thread_with(messages: Vec<Message>) -> ConversationThread {
        ConversationThread::from_messages(
            ConversationId::new("conv-1"),
            messages,
        )
    }

    fn user(content: &str) -> Message {
        Message::new(AgentName::new("user"), Role::User, content)
    }

    #[test]
    fn test_top_level_system_replaces_existing() {
        let thread = thread_with(vec![
            user("hello"),
            Message::new(agent(), Role::System, "old"),
        ]);

        let next = apply_instruction_strategy(
            InstructionStrategy::TopLevelSystemMessage,
            &agent(),
            "new",
            &thread,
        )
        .unwrap();

        assert_eq!(next.messages()[0].role, Role::System);
        assert_eq!(next.messages()[0].content, "new");
        assert_eq!(
            next.messages()
                .iter()
                .filter(|m| m.role == Role::System)
                .count(),
            1
        );
    }

    #[test]
    fn test_inline_user_appends_at_end() {
        let thread = thread_with(vec![user("hello")]);

        let next = apply_instruction_strategy(
            InstructionStrategy::InlineUserMessage,
            &agent(),
            "do this",
            &thread,
        )
        .unwrap();

        let last = next.last_message().unwrap();
        assert_eq!(last.role, Role::User);
        assert_eq!(last.content, "do this");
    }

    #[test]
    fn test_inline_system_appends_at_end() {
        let thread = thread_with(vec![user("hello")]);

        let next = apply_instruction_strategy(
            InstructionStrategy::InlineSystemMessage,
            &agent(),
            "do this",
            &thread,
        )
        .unwrap();

        let last = next.last_message().unwrap();
        assert_eq!(last.role, Role::System);
        assert_ne!(next.messages()[0].role, Role::System);
    }

    #[test]
    fn test_appended_instruction_wraps_in_tag() {
        let thread = thread_with(vec![user("question")]);

        let next = apply_instruction_strategy(
            InstructionStrategy::AppendedToUserMessage,
            &agent(),
            "rules",
            &thread,
        )
        .unwrap();

        assert_eq!(next.messages().len(), 1);
        assert_eq!(
            next.messages()[0].content,
            "question\n\n<instructions>rules</instructions>"
        );
    }

    #[test]
    fn test_appended_instruction_requires_user_last() {
        let thread = thread_with(vec![
            user("question"),
            Message::new(agent(), Role::Assistant, "answer"),
        ]);

        let err = apply_instruction_strategy(
            InstructionStrategy::AppendedToUserMessage,
            &agent(),
            "rules",
            &thread,
        )
        .unwrap_err();

        assert!(matches!(err, Error::Protocol(_)));
    }

    #[test]
    fn test_preceding_last_user_is_reserved() {
        let thread = thread_with(vec![user("question")]);

        let err = apply_instruction_strategy(
            InstructionStrategy::PrecedingLastUserMessage,
            &agent(),
            "rules",
            &thread,
        )
        .unwrap_err();

        assert!(matches!(err, Error::NotSupported(_)));
    }

    #[test]
    fn test_tool_output_appended_to_user_message() {
        let thread = thread_with(vec![
            user("Q"),
            Message::new(agent(), Role::ToolInvocation, "{...}")
                .with_visibility(MessageVisibility::new(false, true)),
            Message::new(agent(), Role::ToolOutput, "X")
                .with_visibility(MessageVisibility::new(false, true)),
        ]);

        let next = apply_tool_output_strategy(
            ToolOutputStrategy::AppendedToUserMessage,
            &thread,
        )
        .unwrap();

        assert_eq!(next.messages().len(), 1);
        let only = &next.messages()[0];
        assert_eq!(only.role, Role::User);
        assert_eq!(only.content, "Q\n\n<tool_output>\nX\n</tool_output>");
        assert!(
            !next
                .messages()
                .iter()
                .any(|m| m.role == Role::ToolOutput)
        );
    }

    #[test]
    fn test_tool_output_strategy_without_output_is_identity() {
        let thread = thread_with(vec![user("Q")]);

        let next = apply_tool_output_strategy(
            ToolOutputStrategy::AppendedToUserMessage,
            &thread,
        )
        .unwrap();

        assert_eq!(next.messages(), thread.messages());
    }

    #[test]
    fn test_inline_tool_output_is_identity() {
        let thread = thread_with(vec![
            user("Q"),
            Message::new(agent(), Role::ToolOutput, "X"),
        ]);

        let next = apply_tool_output_strategy(
            ToolOutputStrategy::InlineToolOutputMessage,
            &thread,
        )
        .unwrap();

        assert_eq!(next.messages(), thread.messages());
    }
}
