//! Orchestrator error types.

use thiserror::Error;

use strata_provider::ProviderError;
use strata_tags::TagError;
use strata_wait::WaitError;

/// Errors surfaced by the entity managers.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// Rejected before any provider call.
    #[error("invalid request: {0}")]
    Validation(String),

    #[error("environment not found: {0}")]
    EnvironmentNotFound(String),

    #[error("deploy not found: {0}")]
    DeployNotFound(String),

    #[error("service not found: {0}")]
    ServiceNotFound(String),

    #[error("task not found: {0}")]
    TaskNotFound(String),

    /// A convergence wait exhausted its retry budget.
    #[error("timed out waiting for {operation} (last state: {last_state})")]
    Timeout { operation: String, last_state: String },

    /// Provider failure, code and message verbatim.
    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error("user data template error: {0}")]
    Template(String),

    #[error("tag store error: {0}")]
    Tags(#[from] TagError),
}

pub type OrchestratorResult<T> = Result<T, OrchestratorError>;

impl OrchestratorError {
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            OrchestratorError::EnvironmentNotFound(_)
                | OrchestratorError::DeployNotFound(_)
                | OrchestratorError::ServiceNotFound(_)
                | OrchestratorError::TaskNotFound(_)
        )
    }

    pub fn is_validation(&self) -> bool {
        match self {
            OrchestratorError::Validation(_) => true,
            OrchestratorError::Tags(err) => err.is_validation(),
            _ => false,
        }
    }
}

impl From<WaitError<OrchestratorError>> for OrchestratorError {
    fn from(err: WaitError<OrchestratorError>) -> Self {
        match err {
            WaitError::Timeout {
                operation,
                last_state,
                ..
            } => OrchestratorError::Timeout {
                operation,
                last_state,
            },
            WaitError::Check(inner) => inner,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_errors_keep_code_and_message() {
        let err = OrchestratorError::from(ProviderError::new("AccessDenied", "not authorized"));
        assert_eq!(err.to_string(), "AccessDenied: not authorized");
        assert!(!err.is_not_found());
    }

    #[test]
    fn wait_errors_flatten() {
        let timeout = OrchestratorError::from(WaitError::<OrchestratorError>::Timeout {
            operation: "asg deletion".to_string(),
            attempts: 3,
            last_state: "Delete in progress".to_string(),
        });
        assert!(timeout.to_string().contains("Delete in progress"));

        let inner = OrchestratorError::from(WaitError::Check(OrchestratorError::Validation(
            "bad".to_string(),
        )));
        assert!(inner.is_validation());
    }
}
