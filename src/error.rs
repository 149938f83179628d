//! Error kinds surfaced by a session.
//!
//! Causes from collaborators stay as `anyhow::Error`; the variants here are
//! what the UI pattern-matches on.

use std::fmt;
use std::time::Duration;

use thiserror::Error;

/// Setup steps of a session, in the order they run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitStage {
    Connect,
    BuildAgent,
    AttachEngine,
}

impl InitStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            InitStage::Connect => "connecting to the automation environment",
            InitStage::BuildAgent => "building the agent",
            InitStage::AttachEngine => "attaching the reasoning engine",
        }
    }
}

impl fmt::Display for InitStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug)]
pub enum InitError {
    #[error("failed while {stage}: {cause:#}")]
    Failed { stage: InitStage, cause: anyhow::Error },

    #[error("timed out after {after:?} while {stage}")]
    Timeout { stage: InitStage, after: Duration },

    #[error("session has been shut down")]
    ShutDown,
}

impl InitError {
    pub fn stage(&self) -> Option<InitStage> {
        match self {
            InitError::Failed { stage, .. } | InitError::Timeout { stage, .. } => Some(*stage),
            InitError::ShutDown => None,
        }
    }
}

#[derive(Error, Debug)]
pub enum AgentError {
    #[error("{var} not set")]
    MissingCredential { var: String },

    #[error("initialization failed: {0}")]
    InitFailed(InitError),

    #[error("execution failed: {0:#}")]
    ExecutionFailed(anyhow::Error),

    #[error("{operation} timed out after {after:?}")]
    Timeout { operation: String, after: Duration },

    #[error("request cancelled")]
    Cancelled,

    #[error("session has been shut down")]
    ShutDown,
}

impl From<InitError> for AgentError {
    fn from(err: InitError) -> Self {
        match err {
            InitError::Timeout { stage, after } => AgentError::Timeout {
                operation: stage.to_string(),
                after,
            },
            InitError::ShutDown => AgentError::ShutDown,
            other => AgentError::InitFailed(other),
        }
    }
}

impl AgentError {
    /// Text shown to the user in place of a response
    pub fn user_message(&self) -> String {
        match self {
            AgentError::MissingCredential { var } => format!("❌ Error: {} not set", var),
            AgentError::InitFailed(InitError::Failed { stage, cause }) => {
                format!("Error during initialization ({}): {:#}", stage, cause)
            }
            AgentError::InitFailed(other) => format!("Error during initialization: {}", other),
            AgentError::ExecutionFailed(cause) => format!("❌ Error: {:#}", cause),
            AgentError::Timeout { operation, after } => {
                format!("⏱️ Timed out after {}s while {}", after.as_secs(), operation)
            }
            AgentError::Cancelled => "⏹️ Cancelled".to_string(),
            AgentError::ShutDown => "❌ Error: this session has been closed".to_string(),
        }
    }

    /// Whether simply re-submitting the same command may succeed
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            AgentError::MissingCredential { .. } | AgentError::ShutDown
        )
    }
}
