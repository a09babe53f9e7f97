use thiserror::Error;

/// Errors produced by the chat protocol layer.
#[derive(Debug, Error)]
pub enum ChatError {
    #[error("codec error: {0}")]
    Codec(String),

    #[error("invalid message: {0}")]
    InvalidMessage(String),

    #[error("invalid user id: {0}")]
    InvalidUserId(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("timeout")]
    Timeout,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<ciborium::de::Error<std::io::Error>> for ChatError {
    fn from(e: ciborium::de::Error<std::io::Error>) -> Self {
        ChatError::Codec(e.to_string())
    }
}

impl From<ciborium::ser::Error<std::io::Error>> for ChatError {
    fn from(e: ciborium::ser::Error<std::io::Error>) -> Self {
        ChatError::Codec(e.to_string())
    }
}

impl From<serde_json::Error> for ChatError {
    fn from(e: serde_json::Error) -> Self {
        ChatError::Codec(e.to_string())
    }
}

pub type ChatResult<T> = Result<T, ChatError>;
