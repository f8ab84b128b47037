//! Plugin host API error types.

use std::any::Any;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("command already registered: {0}")]
    DuplicateCommand(String),

    #[error("command not found: {0}")]
    UnknownCommand(String),

    #[error("invalid command id: {0:?}")]
    InvalidCommandId(String),

    #[error("invalid command reference: {0}")]
    InvalidCommand(String),

    #[error("invalid extension id: {0:?}")]
    InvalidExtensionId(String),

    #[error("invalid argument for internal command {command}: argument {position} is not a primitive value")]
    InvalidArgument { command: String, position: usize },

    #[error("listener failed on {emitter}: {message}")]
    ListenerFailure { emitter: String, message: String },

    #[error("disposal failed: {}", .0.join("; "))]
    DisposalFailure(Vec<String>),

    #[error("command {command} failed: {message}")]
    HandlerFailed { command: String, message: String },

    #[error("command {command} panicked: {message}")]
    HandlerPanicked { command: String, message: String },

    #[error("invalid account: {0}")]
    InvalidAccount(String),

    #[error("wallet not found: {0}")]
    UnknownWallet(u64),

    #[error("sub-wallet not found: {0}")]
    UnknownSubWallet(u64),

    #[error("network not found: {0}")]
    UnknownNetwork(u64),

    #[error("network already registered: {0}")]
    DuplicateNetwork(String),

    #[error("invalid config: {0}")]
    InvalidConfig(String),

    #[error("semver error: {0}")]
    Semver(#[from] semver::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ApiError {
    /// Build a `HandlerFailed` error from any displayable cause.
    pub fn handler(command: impl Into<String>, cause: impl std::fmt::Display) -> Self {
        Self::HandlerFailed {
            command: command.into(),
            message: cause.to_string(),
        }
    }
}

/// Extract a readable message from a caught panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
