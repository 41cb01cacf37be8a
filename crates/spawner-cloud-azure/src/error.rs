//! Azure provider error types

use spawner_cloud::SpawnerError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AzureError {
    #[error("token request rejected for account '{account}': {message}")]
    TokenRejected { account: String, message: String },

    #[error("HTTP transport error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("ARM API error ({status}) {code}: {message}")]
    Api {
        status: u16,
        code: String,
        message: String,
    },

    #[error("malformed response: {0}")]
    MalformedResponse(String),

    #[error("invalid kubeconfig: {0}")]
    InvalidKubeconfig(String),

    #[error("JSON parse error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("YAML parse error: {0}")]
    YamlError(#[from] serde_yaml::Error),

    #[error("base64 decode error: {0}")]
    Base64Error(#[from] base64::DecodeError),
}

pub type Result<T> = std::result::Result<T, AzureError>;

impl From<AzureError> for SpawnerError {
    fn from(err: AzureError) -> Self {
        match err {
            AzureError::TokenRejected { account, message } => {
                SpawnerError::CredentialResolutionFailed {
                    account,
                    reason: message,
                }
            }
            AzureError::Http(e) => SpawnerError::ProviderUnavailable(e.to_string()),
            AzureError::Api {
                status: 404,
                code,
                message,
            } => SpawnerError::ResourceNotFound(format!("{}: {}", code, message)),
            AzureError::Api {
                status,
                code,
                message,
            } if status >= 500 => {
                SpawnerError::ProviderUnavailable(format!("{} ({}): {}", code, status, message))
            }
            AzureError::Api { code, message, .. } => {
                SpawnerError::ProviderRejected(format!("{}: {}", code, message))
            }
            other => SpawnerError::ProviderRejected(other.to_string()),
        }
    }
}
