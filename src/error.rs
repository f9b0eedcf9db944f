//! Error types for tunnelctl

use std::io;

#[derive(Debug, thiserror::Error)]
pub enum TunnelError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Command execution failed
    #[error("Command '{cmd}' failed{}: {stderr}", code_suffix(.code))]
    CommandFailed { cmd: String, code: Option<i32>, stderr: String },

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Platform operation did not finish in time
    #[error("Timed out: {0}")]
    Timeout(String),

    /// Not supported on this platform
    #[error("Not supported: {0}")]
    NotSupported(String),

    /// Parse error
    #[error("Parse error: {0}")]
    ParseError(String),
}

fn code_suffix(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!(" with code {}", code),
        None => String::new(),
    }
}

impl From<serde_json::Error> for TunnelError {
    fn from(error: serde_json::Error) -> Self {
        TunnelError::ParseError(error.to_string())
    }
}

pub type TunnelResult<T> = Result<T, TunnelError>;
