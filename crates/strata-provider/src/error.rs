//! Provider error type.

use thiserror::Error;

pub type ProviderResult<T> = Result<T, ProviderError>;

/// Error codes the orchestrator matches on.
pub mod codes {
    pub const CLUSTER_NOT_FOUND: &str = "ClusterNotFoundException";
    pub const CLUSTER_CONTAINS_SERVICES: &str = "ClusterContainsServicesException";
    pub const SERVICE_NOT_FOUND: &str = "ServiceNotFoundException";
    pub const SERVICE_NOT_ACTIVE: &str = "ServiceNotActiveException";
    pub const CLIENT_EXCEPTION: &str = "ClientException";
    pub const INVALID_PARAMETER: &str = "InvalidParameterException";
    pub const DUPLICATE_PERMISSION: &str = "InvalidPermission.Duplicate";
    pub const PERMISSION_NOT_FOUND: &str = "InvalidPermission.NotFound";
    pub const GROUP_NOT_FOUND: &str = "InvalidGroup.NotFound";
    pub const GROUP_DUPLICATE: &str = "InvalidGroup.Duplicate";
    pub const DEPENDENCY_VIOLATION: &str = "DependencyViolation";
    pub const VALIDATION_ERROR: &str = "ValidationError";
    pub const ALREADY_EXISTS: &str = "AlreadyExists";
    pub const RESOURCE_IN_USE: &str = "ResourceInUse";
}

/// A failed provider call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{code}: {message}")]
pub struct ProviderError {
    pub code: String,
    pub message: String,
}

impl ProviderError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }

    pub fn has_code(&self, code: &str) -> bool {
        self.code == code
    }

    /// Case-insensitive substring match on the message.
    pub fn message_contains(&self, fragment: &str) -> bool {
        self.message
            .to_ascii_lowercase()
            .contains(&fragment.to_ascii_lowercase())
    }

    /// Matches when the code equals any of `codes` or the message contains
    /// any of `fragments`.
    pub fn matches(&self, codes: &[&str], fragments: &[&str]) -> bool {
        codes.iter().any(|c| self.has_code(c)) || fragments.iter().any(|f| self.message_contains(f))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matching_by_code_or_message() {
        let err = ProviderError::new(codes::VALIDATION_ERROR, "AutoScalingGroup name not found - l0-dev-x");
        assert!(err.has_code("ValidationError"));
        assert!(err.message_contains("Name Not Found"));
        assert!(err.matches(&[codes::CLUSTER_NOT_FOUND], &["name not found"]));
        assert!(!err.matches(&[codes::CLUSTER_NOT_FOUND], &["pending delete"]));
        assert_eq!(
            err.to_string(),
            "ValidationError: AutoScalingGroup name not found - l0-dev-x"
        );
    }
}
