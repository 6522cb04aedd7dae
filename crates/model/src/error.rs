use std::error::Error as StdError;

/// A role name that does not resolve to a known [`Role`](crate::Role).
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("unknown role name: `{name}`")]
pub struct UnknownRoleError {
    /// The unrecognized name.
    pub name: String,
}

/// A failure reported by a completions backend.
///
/// The interpreter core propagates these verbatim and never retries;
/// retry policy belongs to the caller or to the client implementation.
#[derive(Debug, thiserror::Error)]
#[error("completions transport error: {message}")]
pub struct TransportError {
    message: String,
    #[source]
    source: Option<Box<dyn StdError + Send + Sync>>,
}

impl TransportError {
    /// Creates a transport error with the given message.
    pub fn new<S: Into<String>>(message: S) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }

    /// Attaches the underlying cause.
    pub fn with_source<E>(mut self, source: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        self.source = Some(Box::new(source));
        self
    }

    /// Returns the error message.
    #[inline]
    pub fn message(&self) -> &str {
        &self.message
    }
}
