//! Credential resolvers
//!
//! The credential store is a JSON document listing one entry per provider
//! account:
//!
//! ```json
//! {
//!   "version": 1,
//!   "accounts": [
//!     {
//!       "provider": "azure",
//!       "accountName": "acct-1",
//!       "clientId": "...",
//!       "clientSecret": "...",
//!       "tenantId": "...",
//!       "subscriptionId": "...",
//!       "resourceGroup": "spawner-rg",
//!       "region": "eastus"
//!     }
//!   ]
//! }
//! ```

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use spawner_cloud::{Credential, CredentialResolver, Provider, Result, SpawnerError};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs;

const STORE_VERSION: u32 = 1;

#[derive(Error, Debug)]
pub enum CredentialStoreError {
    #[error("failed to read credential store {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid credential store {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("unsupported credential store version {0}")]
    Version(u32),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialRecord {
    pub provider: Provider,
    #[serde(flatten)]
    pub credential: Credential,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CredentialFile {
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default)]
    pub accounts: Vec<CredentialRecord>,
}

fn default_version() -> u32 {
    STORE_VERSION
}

/// In-memory resolver, mainly for tests and embedding
#[derive(Debug, Clone, Default)]
pub struct StaticCredentialResolver {
    accounts: HashMap<(Provider, String), Credential>,
}

impl StaticCredentialResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_account(mut self, provider: Provider, credential: Credential) -> Self {
        self.insert(provider, credential);
        self
    }

    pub fn insert(&mut self, provider: Provider, credential: Credential) {
        self.accounts
            .insert((provider, credential.account_name.clone()), credential);
    }
}

#[async_trait]
impl CredentialResolver for StaticCredentialResolver {
    async fn resolve(&self, provider: Provider, account: &str) -> Result<Credential> {
        self.accounts
            .get(&(provider, account.to_string()))
            .cloned()
            .ok_or_else(|| SpawnerError::unknown_account(provider, account))
    }
}

/// Resolver backed by a JSON file, re-read on every call so rotated secrets
/// take effect without a restart
#[derive(Debug, Clone)]
pub struct FileCredentialResolver {
    path: PathBuf,
}

impl FileCredentialResolver {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn load(&self) -> std::result::Result<CredentialFile, CredentialStoreError> {
        let content =
            fs::read_to_string(&self.path)
                .await
                .map_err(|source| CredentialStoreError::Io {
                    path: self.path.clone(),
                    source,
                })?;
        let file: CredentialFile =
            serde_json::from_str(&content).map_err(|source| CredentialStoreError::Parse {
                path: self.path.clone(),
                source,
            })?;
        if file.version > STORE_VERSION {
            return Err(CredentialStoreError::Version(file.version));
        }
        Ok(file)
    }
}

#[async_trait]
impl CredentialResolver for FileCredentialResolver {
    async fn resolve(&self, provider: Provider, account: &str) -> Result<Credential> {
        let file = self.load().await.map_err(|e| {
            tracing::error!(path = %self.path.display(), "credential store unavailable: {}", e);
            SpawnerError::credential(account, e.to_string())
        })?;

        file.accounts
            .into_iter()
            .find(|r| r.provider == provider && r.credential.account_name == account)
            .map(|r| r.credential)
            .ok_or_else(|| SpawnerError::unknown_account(provider, account))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const STORE: &str = r#"{
        "accounts": [
            {
                "provider": "azure",
                "accountName": "acct-1",
                "clientId": "app-id",
                "clientSecret": "s3cret",
                "tenantId": "tenant",
                "subscriptionId": "sub",
                "resourceGroup": "rg",
                "region": "eastus"
            },
            {
                "provider": "aws",
                "accountName": "acct-1",
                "clientId": "AKIA",
                "clientSecret": "aws-secret"
            }
        ]
    }"#;

    #[tokio::test]
    async fn test_file_resolver_picks_provider_account() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("credentials.json");
        std::fs::write(&path, STORE).unwrap();

        let resolver = FileCredentialResolver::new(&path);
        let azure = resolver.resolve(Provider::Azure, "acct-1").await.unwrap();
        assert_eq!(azure.client_secret, "s3cret");
        assert_eq!(azure.resource_group, "rg");

        let aws = resolver.resolve(Provider::Aws, "acct-1").await.unwrap();
        assert_eq!(aws.client_id, "AKIA");
        assert!(aws.tenant_id.is_empty());
    }

    #[tokio::test]
    async fn test_file_resolver_rereads_on_each_call() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("credentials.json");
        std::fs::write(&path, r#"{"accounts": []}"#).unwrap();

        let resolver = FileCredentialResolver::new(&path);
        let err = resolver.resolve(Provider::Azure, "acct-1").await.unwrap_err();
        assert!(matches!(err, SpawnerError::UnknownAccount { .. }));
        assert!(!err.is_dependency_failure());

        std::fs::write(&path, STORE).unwrap();
        assert!(resolver.resolve(Provider::Azure, "acct-1").await.is_ok());
    }

    #[tokio::test]
    async fn test_missing_store_is_resolution_failure() {
        let dir = tempdir().unwrap();
        let resolver = FileCredentialResolver::new(dir.path().join("absent.json"));
        let err = resolver.resolve(Provider::Azure, "acct-1").await.unwrap_err();
        assert!(err.is_dependency_failure());
        assert!(!err.to_string().contains("s3cret"));
    }

    #[tokio::test]
    async fn test_newer_store_version_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("credentials.json");
        std::fs::write(&path, r#"{"version": 9, "accounts": []}"#).unwrap();

        let resolver = FileCredentialResolver::new(&path);
        assert!(matches!(
            resolver.load().await,
            Err(CredentialStoreError::Version(9))
        ));
    }

    #[tokio::test]
    async fn test_static_resolver() {
        let resolver = StaticCredentialResolver::new().with_account(
            Provider::Azure,
            Credential {
                account_name: "acct-1".to_string(),
                ..Default::default()
            },
        );
        assert!(resolver.resolve(Provider::Azure, "acct-1").await.is_ok());
        assert!(resolver.resolve(Provider::Aws, "acct-1").await.is_err());
        assert!(resolver.resolve(Provider::Azure, "acct-2").await.is_err());
    }
}
