use std::fmt::{self, Display, Formatter};

use serde::{Deserialize, Serialize};

use crate::error::UnknownRoleError;

/// The role under which a message was authored.
///
/// This is a closed set. The two tool roles are an internal sub-protocol
/// and may not be understood by every model backend; clients are expected
/// to filter or fold them before going over the wire.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// An end-user input.
    User,
    /// A model-generated reply.
    Assistant,
    /// System instructions.
    System,
    /// A structured tool-selection message produced by the model.
    ToolInvocation,
    /// The recorded result of a tool call.
    ToolOutput,
}

impl Role {
    /// Returns the wire name of this role.
    pub fn name(self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::System => "system",
            Role::ToolInvocation => "tool_invocation",
            Role::ToolOutput => "tool_output",
        }
    }

    /// Resolves a role from its wire name.
    pub fn from_name(name: &str) -> Result<Self, UnknownRoleError> {
        match name {
            "user" => Ok(Role::User),
            "assistant" => Ok(Role::Assistant),
            "system" => Ok(Role::System),
            "tool_invocation" => Ok(Role::ToolInvocation),
            "tool_output" => Ok(Role::ToolOutput),
            _ => Err(UnknownRoleError {
                name: name.to_owned(),
            }),
        }
    }
}

impl Display for Role {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
