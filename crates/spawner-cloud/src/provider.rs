//! Provider capability and credential traits

use crate::context::CallContext;
use crate::error::Result;
use crate::model::*;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Provider credentials for one account
///
/// Resolved per call and never cached by the core.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Credential {
    pub account_name: String,
    pub client_id: String,
    pub client_secret: String,
    #[serde(default)]
    pub tenant_id: String,
    #[serde(default)]
    pub subscription_id: String,
    #[serde(default)]
    pub resource_group: String,
    #[serde(default)]
    pub region: String,
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("account_name", &self.account_name)
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("tenant_id", &self.tenant_id)
            .field("subscription_id", &self.subscription_id)
            .field("resource_group", &self.resource_group)
            .field("region", &self.region)
            .finish()
    }
}

/// Looks up provider credentials by account identifier
#[async_trait]
pub trait CredentialResolver: Send + Sync {
    /// Resolve `account` for `provider`, failing with
    /// `CredentialResolutionFailed` when the account is unknown or unreadable
    async fn resolve(&self, provider: Provider, account: &str) -> Result<Credential>;
}

/// Canonical operation set every provider adapter implements
///
/// Adapters hold no per-call state: the resolved credential and the call
/// context arrive with each invocation. An adapter without a backend for an
/// operation must return `NotImplemented`, never an empty success.
#[async_trait]
pub trait ClusterController: Send + Sync {
    /// Provider this adapter serves
    fn provider(&self) -> Provider;

    /// Human-readable provider name for logs
    fn display_name(&self) -> &str;

    async fn create_cluster(
        &self,
        ctx: &CallContext,
        cred: &Credential,
        req: &ClusterRequest,
    ) -> Result<ClusterResponse>;

    async fn get_cluster(
        &self,
        ctx: &CallContext,
        cred: &Credential,
        req: &GetClusterRequest,
    ) -> Result<ClusterSpec>;

    async fn get_clusters(
        &self,
        ctx: &CallContext,
        cred: &Credential,
        req: &GetClustersRequest,
    ) -> Result<GetClustersResponse>;

    async fn cluster_status(
        &self,
        ctx: &CallContext,
        cred: &Credential,
        req: &ClusterStatusRequest,
    ) -> Result<ClusterStatusResponse>;

    async fn add_node(
        &self,
        ctx: &CallContext,
        cred: &Credential,
        req: &NodeSpawnRequest,
    ) -> Result<NodeSpawnResponse>;

    async fn delete_node(
        &self,
        ctx: &CallContext,
        cred: &Credential,
        req: &NodeDeleteRequest,
    ) -> Result<NodeDeleteResponse>;

    async fn delete_cluster(
        &self,
        ctx: &CallContext,
        cred: &Credential,
        req: &ClusterDeleteRequest,
    ) -> Result<ClusterDeleteResponse>;

    async fn create_volume(
        &self,
        ctx: &CallContext,
        cred: &Credential,
        req: &CreateVolumeRequest,
    ) -> Result<CreateVolumeResponse>;

    async fn delete_volume(
        &self,
        ctx: &CallContext,
        cred: &Credential,
        req: &DeleteVolumeRequest,
    ) -> Result<DeleteVolumeResponse>;

    async fn create_snapshot(
        &self,
        ctx: &CallContext,
        cred: &Credential,
        req: &CreateSnapshotRequest,
    ) -> Result<CreateSnapshotResponse>;

    async fn create_snapshot_and_delete(
        &self,
        ctx: &CallContext,
        cred: &Credential,
        req: &CreateSnapshotAndDeleteRequest,
    ) -> Result<CreateSnapshotAndDeleteResponse>;

    async fn get_token(
        &self,
        ctx: &CallContext,
        cred: &Credential,
        req: &GetTokenRequest,
    ) -> Result<GetTokenResponse>;

    async fn add_token(
        &self,
        ctx: &CallContext,
        cred: &Credential,
        req: &AddTokenRequest,
    ) -> Result<AddTokenResponse>;
}
