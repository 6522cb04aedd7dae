use serde::{Deserialize, Serialize};

/// One scripted reply from the fake completions client.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum PresetReply {
    /// Respond with the given text.
    #[serde(rename = "text")]
    Text(String),
    /// Fail the request with a transport error carrying this message.
    #[serde(rename = "failure")]
    Failure(String),
}

impl PresetReply {
    /// Creates a text reply.
    #[inline]
    pub fn text<S: Into<String>>(text: S) -> Self {
        Self::Text(text.into())
    }

    /// Creates a failing reply.
    #[inline]
    pub fn failure<S: Into<String>>(message: S) -> Self {
        Self::Failure(message.into())
    }
}
