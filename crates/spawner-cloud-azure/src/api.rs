//! Azure Resource Manager surface used by the AKS adapter
//!
//! [`ManagementApi`] is the seam between the canonical operation mapping in
//! [`crate::provider`] and the wire client in [`crate::arm`]. Mutating calls
//! return an [`ArmPoller`] that the LRO bridge drives to completion.

use crate::aks::{AgentPool, CredentialResults, ManagedCluster};
use crate::compute::{Disk, Snapshot};
use crate::error::{AzureError, Result};
use async_trait::async_trait;
use spawner_cloud::{Credential, LongRunningOperation, SpawnerError};

/// Terminal outcome of an ARM mutation
#[derive(Debug, Clone, PartialEq)]
pub struct ArmOutcome {
    /// Status code of the submitting request; 204 means nothing was there
    pub status: u16,
    /// Final resource body, if the operation produces one
    pub body: Option<serde_json::Value>,
}

impl ArmOutcome {
    pub fn no_content() -> Self {
        Self {
            status: 204,
            body: None,
        }
    }

    pub fn with_body(status: u16, body: serde_json::Value) -> Self {
        Self {
            status,
            body: Some(body),
        }
    }

    pub fn is_no_content(&self) -> bool {
        self.status == 204
    }

    /// Decode the final body as `T`
    pub fn parse<T: serde::de::DeserializeOwned>(&self) -> Result<T> {
        let body = self
            .body
            .clone()
            .ok_or_else(|| AzureError::MalformedResponse("operation returned no body".into()))?;
        Ok(serde_json::from_value(body)?)
    }
}

pub type ArmPoller = Box<dyn LongRunningOperation<Output = ArmOutcome>>;

/// OAuth2 bearer token for the management endpoint
#[derive(Clone)]
pub struct AccessToken {
    pub token: String,
}

impl std::fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessToken").field("token", &"<redacted>").finish()
    }
}

/// Subscription and resource group every ARM path is rooted at
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceScope {
    pub subscription_id: String,
    pub resource_group: String,
}

impl ResourceScope {
    pub fn from_credential(cred: &Credential) -> std::result::Result<Self, SpawnerError> {
        let missing = |field: &str| {
            SpawnerError::credential(
                &cred.account_name,
                format!("{} is not set for this account", field),
            )
        };
        if cred.subscription_id.is_empty() {
            return Err(missing("subscriptionId"));
        }
        if cred.resource_group.is_empty() {
            return Err(missing("resourceGroup"));
        }
        Ok(Self {
            subscription_id: cred.subscription_id.clone(),
            resource_group: cred.resource_group.clone(),
        })
    }
}

#[async_trait]
pub trait ManagementApi: Send + Sync {
    /// Exchange service principal credentials for a management token
    async fn authenticate(&self, cred: &Credential) -> Result<AccessToken>;

    async fn create_or_update_cluster(
        &self,
        token: &AccessToken,
        scope: &ResourceScope,
        name: &str,
        cluster: &ManagedCluster,
    ) -> Result<ArmPoller>;

    async fn get_cluster(
        &self,
        token: &AccessToken,
        scope: &ResourceScope,
        name: &str,
    ) -> Result<ManagedCluster>;

    /// All clusters in the resource group, following `nextLink` pages
    async fn list_clusters(
        &self,
        token: &AccessToken,
        scope: &ResourceScope,
    ) -> Result<Vec<ManagedCluster>>;

    async fn delete_cluster(
        &self,
        token: &AccessToken,
        scope: &ResourceScope,
        name: &str,
    ) -> Result<ArmPoller>;

    async fn create_or_update_agent_pool(
        &self,
        token: &AccessToken,
        scope: &ResourceScope,
        cluster: &str,
        pool: &str,
        body: &AgentPool,
    ) -> Result<ArmPoller>;

    async fn delete_agent_pool(
        &self,
        token: &AccessToken,
        scope: &ResourceScope,
        cluster: &str,
        pool: &str,
    ) -> Result<ArmPoller>;

    async fn list_cluster_user_credentials(
        &self,
        token: &AccessToken,
        scope: &ResourceScope,
        cluster: &str,
    ) -> Result<CredentialResults>;

    async fn create_disk(
        &self,
        token: &AccessToken,
        scope: &ResourceScope,
        name: &str,
        disk: &Disk,
    ) -> Result<ArmPoller>;

    async fn get_disk(
        &self,
        token: &AccessToken,
        scope: &ResourceScope,
        name: &str,
    ) -> Result<Disk>;

    async fn delete_disk(
        &self,
        token: &AccessToken,
        scope: &ResourceScope,
        name: &str,
    ) -> Result<ArmPoller>;

    async fn create_snapshot(
        &self,
        token: &AccessToken,
        scope: &ResourceScope,
        name: &str,
        snapshot: &Snapshot,
    ) -> Result<ArmPoller>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scope_requires_subscription() {
        let cred = Credential {
            account_name: "acct-1".to_string(),
            resource_group: "rg".to_string(),
            ..Default::default()
        };
        let err = ResourceScope::from_credential(&cred).unwrap_err();
        assert!(matches!(err, SpawnerError::CredentialResolutionFailed { .. }));
    }

    #[test]
    fn test_outcome_parse_without_body() {
        let outcome = ArmOutcome::no_content();
        assert!(outcome.is_no_content());
        assert!(outcome.parse::<ManagedCluster>().is_err());
    }
}
