//! Error types for the pingdurable binary

use libpingdurable_core::{ConfigError, TransportError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CliError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CliError {
    pub fn error_code(&self) -> &'static str {
        match self {
            CliError::Config(_) => "invalid_config",
            CliError::Transport(e) => e.error_code(),
            CliError::Io(_) => "io_error",
            CliError::Json(_) => "internal_error",
        }
    }

    pub fn exit_code(&self) -> i32 {
        1
    }
}

pub type Result<T> = std::result::Result<T, CliError>;
