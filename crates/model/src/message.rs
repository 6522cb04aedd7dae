use std::fmt::{self, Display, Formatter};

use serde::{Deserialize, Serialize};

use crate::role::Role;

/// The name of the agent that authored a message.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AgentName(String);

impl AgentName {
    /// Creates an agent name.
    #[inline]
    pub fn new<S: Into<String>>(name: S) -> Self {
        Self(name.into())
    }

    /// Returns the name as a string slice.
    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for AgentName {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Controls who a message is presented to.
///
/// The two flags are independent: a message can be part of the model
/// context without ever being rendered to the end user (tool plumbing),
/// or shown to the user without being sent to the model.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageVisibility {
    /// Whether the message is rendered to the end user.
    pub shown_to_user: bool,
    /// Whether the message is sent to the model.
    pub shown_to_model: bool,
}

impl MessageVisibility {
    /// Creates a visibility with both flags set explicitly.
    #[inline]
    pub fn new(shown_to_user: bool, shown_to_model: bool) -> Self {
        Self {
            shown_to_user,
            shown_to_model,
        }
    }
}

impl Default for MessageVisibility {
    #[inline]
    fn default() -> Self {
        Self::new(true, true)
    }
}

/// A single immutable message in a conversation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// The agent that authored this message.
    pub agent_name: AgentName,
    /// The role under which the message was authored.
    pub role: Role,
    /// The message text.
    pub content: String,
    /// Who the message is presented to.
    #[serde(default)]
    pub visibility: MessageVisibility,
}

impl Message {
    /// Creates a message visible to both the user and the model.
    pub fn new<S: Into<String>>(
        agent_name: AgentName,
        role: Role,
        content: S,
    ) -> Self {
        Self {
            agent_name,
            role,
            content: content.into(),
            visibility: MessageVisibility::default(),
        }
    }

    /// Returns a copy of this message with the given visibility.
    #[inline]
    pub fn with_visibility(mut self, visibility: MessageVisibility) -> Self {
        self.visibility = visibility;
        self
    }
}
