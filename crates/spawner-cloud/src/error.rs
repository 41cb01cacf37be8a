//! Canonical error taxonomy

use crate::model::Provider;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors surfaced by every canonical operation
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SpawnerError {
    #[error("Credential resolution failed for account '{account}': {reason}")]
    CredentialResolutionFailed { account: String, reason: String },

    /// The credential store answered but holds no entry for the account
    #[error("Credential resolution failed for account '{account}': no {provider} credentials for this account")]
    UnknownAccount { provider: Provider, account: String },

    #[error("Rate limit exceeded for {0}")]
    RateLimited(String),

    #[error("Circuit open for {0}")]
    CircuitOpen(String),

    #[error("Provider unavailable: {0}")]
    ProviderUnavailable(String),

    #[error("Provider rejected request: {0}")]
    ProviderRejected(String),

    #[error("Resource not found: {0}")]
    ResourceNotFound(String),

    #[error("Operation canceled: {0}")]
    OperationCanceled(String),

    #[error("{operation} is not implemented for provider {provider}")]
    NotImplemented {
        provider: Provider,
        operation: &'static str,
    },

    #[error("No adapter registered for provider {0}")]
    UnknownProvider(Provider),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl SpawnerError {
    pub fn credential(account: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::CredentialResolutionFailed {
            account: account.into(),
            reason: reason.into(),
        }
    }

    pub fn unknown_account(provider: Provider, account: impl Into<String>) -> Self {
        Self::UnknownAccount {
            provider,
            account: account.into(),
        }
    }

    pub fn not_implemented(provider: Provider, operation: &'static str) -> Self {
        Self::NotImplemented {
            provider,
            operation,
        }
    }

    /// Stable classification of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            SpawnerError::CredentialResolutionFailed { .. } | SpawnerError::UnknownAccount { .. } => {
                ErrorKind::CredentialResolutionFailed
            }
            SpawnerError::RateLimited(_) => ErrorKind::RateLimited,
            SpawnerError::CircuitOpen(_) => ErrorKind::CircuitOpen,
            SpawnerError::ProviderUnavailable(_) => ErrorKind::ProviderUnavailable,
            SpawnerError::ProviderRejected(_) => ErrorKind::ProviderRejected,
            SpawnerError::ResourceNotFound(_) => ErrorKind::ResourceNotFound,
            SpawnerError::OperationCanceled(_) => ErrorKind::OperationCanceled,
            SpawnerError::NotImplemented { .. } => ErrorKind::NotImplemented,
            SpawnerError::UnknownProvider(_) => ErrorKind::UnknownProvider,
            SpawnerError::InvalidRequest(_) => ErrorKind::InvalidRequest,
        }
    }

    /// Append context to the message, keeping the variant
    pub fn with_context(self, context: &str) -> Self {
        let append = |message: String| format!("{} ({})", message, context);
        match self {
            SpawnerError::CredentialResolutionFailed { account, reason } => {
                SpawnerError::CredentialResolutionFailed {
                    account,
                    reason: append(reason),
                }
            }
            SpawnerError::RateLimited(m) => SpawnerError::RateLimited(append(m)),
            SpawnerError::CircuitOpen(m) => SpawnerError::CircuitOpen(append(m)),
            SpawnerError::ProviderUnavailable(m) => SpawnerError::ProviderUnavailable(append(m)),
            SpawnerError::ProviderRejected(m) => SpawnerError::ProviderRejected(append(m)),
            SpawnerError::ResourceNotFound(m) => SpawnerError::ResourceNotFound(append(m)),
            SpawnerError::OperationCanceled(m) => SpawnerError::OperationCanceled(append(m)),
            SpawnerError::InvalidRequest(m) => SpawnerError::InvalidRequest(append(m)),
            other => other,
        }
    }

    /// Whether this outcome should count against a circuit breaker.
    ///
    /// Only failures of the credential store or the provider itself trip the
    /// breaker; caller-side outcomes such as a missing resource or an unknown
    /// account do not.
    pub fn is_dependency_failure(&self) -> bool {
        matches!(
            self,
            SpawnerError::CredentialResolutionFailed { .. }
                | SpawnerError::ProviderUnavailable(_)
                | SpawnerError::ProviderRejected(_)
        )
    }
}

/// Distinguishable error kinds exposed to callers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    CredentialResolutionFailed,
    RateLimited,
    CircuitOpen,
    ProviderUnavailable,
    ProviderRejected,
    ResourceNotFound,
    OperationCanceled,
    NotImplemented,
    UnknownProvider,
    InvalidRequest,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ErrorKind::CredentialResolutionFailed => "credential_resolution_failed",
            ErrorKind::RateLimited => "rate_limited",
            ErrorKind::CircuitOpen => "circuit_open",
            ErrorKind::ProviderUnavailable => "provider_unavailable",
            ErrorKind::ProviderRejected => "provider_rejected",
            ErrorKind::ResourceNotFound => "resource_not_found",
            ErrorKind::OperationCanceled => "operation_canceled",
            ErrorKind::NotImplemented => "not_implemented",
            ErrorKind::UnknownProvider => "unknown_provider",
            ErrorKind::InvalidRequest => "invalid_request",
        };
        f.write_str(s)
    }
}

pub type Result<T> = std::result::Result<T, SpawnerError>;
