use std::io;

use thiserror::Error;

use crate::models::script::ScriptId;

pub type StoreResult<T> = Result<T, StoreError>;
pub type SupervisorResult<T> = Result<T, SupervisorError>;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("state store I/O failed: {0}")]
    Io(#[from] io::Error),

    #[error("state store is malformed: {0}")]
    Format(#[from] serde_json::Error),
}

#[derive(Error, Debug)]
pub enum SupervisorError {
    #[error("script not found: {0}")]
    NotFound(ScriptId),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("failed to spawn {path}: {source}")]
    Spawn {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Persistence(#[from] StoreError),
}

/// Result code handed to front-end collaborators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultCode {
    Ok,
    NotFound,
    Forbidden,
    SpawnError,
    PersistenceError,
}

impl SupervisorError {
    pub fn code(&self) -> ResultCode {
        match self {
            SupervisorError::NotFound(_) => ResultCode::NotFound,
            SupervisorError::Forbidden(_) => ResultCode::Forbidden,
            SupervisorError::Spawn { .. } => ResultCode::SpawnError,
            SupervisorError::Persistence(_) => ResultCode::PersistenceError,
        }
    }
}

impl ResultCode {
    pub fn of<T>(result: &SupervisorResult<T>) -> Self {
        match result {
            Ok(_) => ResultCode::Ok,
            Err(e) => e.code(),
        }
    }
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value for {key}: {value:?}")]
    Invalid { key: &'static str, value: String },
}
