//! Immutable conversation state.

use std::collections::HashMap;
use std::fmt::{self, Display, Formatter};

use cellflow_model::{AgentName, Message, Role};

/// Identifies one conversation across a run.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ConversationId(String);

impl ConversationId {
    /// Creates a conversation id.
    #[inline]
    pub fn new<S: Into<String>>(id: S) -> Self {
        Self(id.into())
    }

    /// Returns the id as a string slice.
    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for ConversationId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// An immutable ordered message history plus template variables.
///
/// Message order is chronological and never reordered by any operation.
/// Every transformation returns a new thread; the receiver is never
/// mutated. A thread is discarded after its run completes — persistence
/// is an external collaborator, not a concern of this type.
#[derive(Clone, Debug)]
pub struct ConversationThread {
    conversation_id: ConversationId,
    messages: Vec<Message>,
    template_variables: HashMap<String, String>,
}

impl ConversationThread {
    /// Creates an empty thread.
    pub fn new(conversation_id: ConversationId) -> Self {
        Self {
            conversation_id,
            messages: Vec::new(),
            template_variables: HashMap::new(),
        }
    }

    /// Creates a thread from an initial message list.
    pub fn from_messages(
        conversation_id: ConversationId,
        messages: Vec<Message>,
    ) -> Self {
        Self {
            conversation_id,
            messages,
            template_variables: HashMap::new(),
        }
    }

    /// Returns the conversation id.
    #[inline]
    pub fn conversation_id(&self) -> &ConversationId {
        &self.conversation_id
    }

    /// Returns the messages in chronological order.
    #[inline]
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Returns the most recent message, if any.
    #[inline]
    pub fn last_message(&self) -> Option<&Message> {
        self.messages.last()
    }

    /// Returns the bound template variables.
    #[inline]
    pub fn template_variables(&self) -> &HashMap<String, String> {
        &self.template_variables
    }

    /// Returns the distinct agent names involved in this thread, in
    /// order of first appearance.
    pub fn agent_names(&self) -> Vec<AgentName> {
        let mut names: Vec<AgentName> = Vec::new();
        for message in &self.messages {
            if !names.contains(&message.agent_name) {
                names.push(message.agent_name.clone());
            }
        }
        names
    }

    /// Returns a new thread with the message appended.
    pub fn with_added_message(&self, message: Message) -> Self {
        self.with_added_messages([message])
    }

    /// Returns a new thread with the messages appended in order.
    pub fn with_added_messages(
        &self,
        messages: impl IntoIterator<Item = Message>,
    ) -> Self {
        let mut next = self.clone();
        next.messages.extend(messages);
        next
    }

    /// Returns a new thread keeping only the messages matching the
    /// predicate. The relative order of retained messages is preserved.
    pub fn with_matching_messages(
        &self,
        predicate: impl Fn(&Message) -> bool,
    ) -> Self {
        let messages = self
            .messages
            .iter()
            .filter(|message| predicate(message))
            .cloned()
            .collect();
        self.with_replaced_messages(messages)
    }

    /// Returns a new thread with the message history replaced wholesale.
    pub fn with_replaced_messages(&self, messages: Vec<Message>) -> Self {
        Self {
            conversation_id: self.conversation_id.clone(),
            messages,
            template_variables: self.template_variables.clone(),
        }
    }

    /// Returns a new thread whose sole System message is the given one,
    /// inserted at position 0. Any existing System messages are stripped
    /// first, so a thread can never accumulate more than one.
    pub fn with_system_message(&self, message: Message) -> Self {
        let mut messages: Vec<Message> = self
            .messages
            .iter()
            .filter(|m| m.role != Role::System)
            .cloned()
            .collect();
        messages.insert(0, message);
        self.with_replaced_messages(messages)
    }

    /// Returns a new thread with the template variable bound.
    pub fn with_template_value<K, V>(&self, key: K, value: V) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        let mut next = self.clone();
        let _ = next
            .template_variables
            .insert(key.into(), value.into());
        next
    }

    /// Returns a new thread keeping only the messages that are visible
    /// to the model.
    pub fn with_model_visible_messages(&self) -> Self {
        self.with_matching_messages(|m| m.visibility.shown_to_model)
    }

    /// Returns a new thread with the bound template variables
    /// substituted into the leading System message, if there is one.
    ///
    /// Only the outbound copy of a thread should ever be rendered this
    /// way; the durable history keeps its raw `{{token}}` form.
    pub fn with_template_applied_to_system(&self) -> Self {
        let Some(first) = self.messages.first() else {
            return self.clone();
        };
        if first.role != Role::System {
            return self.clone();
        }

        let mut content = first.content.clone();
        for (key, value) in &self.template_variables {
            content = content.replace(&format!("{{{{{key}}}}}"), value);
        }

        self.with_system_message(Message::new(
            first.agent_name.clone(),
            Role::System,
            content,
        ))
    }
}
