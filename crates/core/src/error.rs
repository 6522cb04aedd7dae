use cellflow_model::{TransportError, UnknownRoleError};

use crate::tool::ToolError;

/// Errors produced while building or running a cell program.
///
/// Every variant is fatal for the current program: the runner aborts and
/// the thread at the point of failure remains valid and unchanged, since
/// state is immutable. The core never retries on its own.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// An agent was finalized with a required field missing. Raised at
    /// build time, never at run time.
    #[error("invalid agent configuration: {0}")]
    Configuration(String),

    /// A cell was run against a thread that violates its input contract,
    /// e.g. the tool-execution cell without a trailing tool-invocation
    /// message, or a forced strategy against the wrong last-message role.
    #[error("protocol violation: {0}")]
    Protocol(String),

    /// The model's tool-selection output could not be parsed. The caller
    /// may choose to re-prompt the model; the core does not.
    #[error("could not parse tool selection: {0}")]
    Parse(String),

    /// A template-declared variable has no bound value.
    #[error("template variable `{0}` has no bound value")]
    Template(String),

    /// No registered tool matches the selected function name.
    #[error("no tool registered under the name `{0}`")]
    ToolNotFound(String),

    /// A declared-but-unimplemented strategy was applied.
    #[error("strategy `{0}` is reserved and not supported")]
    NotSupported(&'static str),

    /// The run was cancelled at a suspension point. No partial state is
    /// observable.
    #[error("run cancelled")]
    Cancelled,

    /// An unrecognized role name during role resolution.
    #[error(transparent)]
    UnknownRole(#[from] UnknownRoleError),

    /// A completions-client failure, propagated verbatim.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A tool failure, propagated unmodified.
    #[error(transparent)]
    Tool(#[from] ToolError),
}
