//! Failure taxonomy of the resolution layer.
//!
//! Collaborators report typed failures (`EngineError`, `ChainError`); they are
//! classified into `ResolveError` at the point they surface, via `From`.

use std::time::Duration;

/// Failure of a manifest/state resolution as observed by callers.
///
/// `Clone` so a single failed computation can be handed to every waiter that
/// shared it.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ResolveError {
    /// Subject missing on chain, or sub-resource missing within resolved state.
    #[error("{0}")]
    NotFound(String),
    /// The engine refused the requested options for this contract.
    #[error("{0}")]
    EvaluationRejected(String),
    #[error("State evaluation exceeded limit of {}ms.", .0.as_millis())]
    Timeout(Duration),
    #[error("{0}")]
    Unknown(String),
}

impl ResolveError {
    /// Stable label for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            ResolveError::NotFound(_) => "not_found",
            ResolveError::EvaluationRejected(_) => "evaluation_rejected",
            ResolveError::Timeout(_) => "timeout",
            ResolveError::Unknown(_) => "unknown",
        }
    }
}

/// Failure reported by the evaluation engine collaborator.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EngineError {
    #[error("contract not found: {0}")]
    NotFound(String),
    #[error("{0}")]
    Rejected(String),
    #[error("{0}")]
    Other(String),
}

/// Failure reported by the chain-data collaborator.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChainError {
    #[error("transaction not found: {0}")]
    NotFound(String),
    #[error("{0}")]
    Other(String),
}

impl From<EngineError> for ResolveError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::NotFound(_) => ResolveError::NotFound("Contract not found".to_string()),
            EngineError::Rejected(message) => ResolveError::EvaluationRejected(message),
            EngineError::Other(message) => ResolveError::Unknown(message),
        }
    }
}

impl From<ChainError> for ResolveError {
    fn from(err: ChainError) -> Self {
        match err {
            ChainError::NotFound(_) => ResolveError::NotFound("Contract not found".to_string()),
            ChainError::Other(message) => ResolveError::Unknown(message),
        }
    }
}
