//! AWS provider adapter
//!
//! No backend is wired yet. Every operation fails with `NotImplemented` so
//! callers can tell an unsupported call apart from a successful one.

use async_trait::async_trait;
use spawner_cloud::*;

/// AWS adapter stub
#[derive(Debug, Clone, Default)]
pub struct AwsController;

impl AwsController {
    pub fn new() -> Self {
        Self
    }

    fn unsupported<T>(&self, operation: &'static str, account: &str) -> Result<T> {
        tracing::debug!(account, operation, "AWS operation requested");
        Err(SpawnerError::not_implemented(Provider::Aws, operation))
    }
}

#[async_trait]
impl ClusterController for AwsController {
    fn provider(&self) -> Provider {
        Provider::Aws
    }

    fn display_name(&self) -> &str {
        "Amazon Web Services"
    }

    async fn create_cluster(
        &self,
        _ctx: &CallContext,
        cred: &Credential,
        _req: &ClusterRequest,
    ) -> Result<ClusterResponse> {
        self.unsupported("create_cluster", &cred.account_name)
    }

    async fn get_cluster(
        &self,
        _ctx: &CallContext,
        cred: &Credential,
        _req: &GetClusterRequest,
    ) -> Result<ClusterSpec> {
        self.unsupported("get_cluster", &cred.account_name)
    }

    async fn get_clusters(
        &self,
        _ctx: &CallContext,
        cred: &Credential,
        _req: &GetClustersRequest,
    ) -> Result<GetClustersResponse> {
        self.unsupported("get_clusters", &cred.account_name)
    }

    async fn cluster_status(
        &self,
        _ctx: &CallContext,
        cred: &Credential,
        _req: &ClusterStatusRequest,
    ) -> Result<ClusterStatusResponse> {
        self.unsupported("cluster_status", &cred.account_name)
    }

    async fn add_node(
        &self,
        _ctx: &CallContext,
        cred: &Credential,
        _req: &NodeSpawnRequest,
    ) -> Result<NodeSpawnResponse> {
        self.unsupported("add_node", &cred.account_name)
    }

    async fn delete_node(
        &self,
        _ctx: &CallContext,
        cred: &Credential,
        _req: &NodeDeleteRequest,
    ) -> Result<NodeDeleteResponse> {
        self.unsupported("delete_node", &cred.account_name)
    }

    async fn delete_cluster(
        &self,
        _ctx: &CallContext,
        cred: &Credential,
        _req: &ClusterDeleteRequest,
    ) -> Result<ClusterDeleteResponse> {
        self.unsupported("delete_cluster", &cred.account_name)
    }

    async fn create_volume(
        &self,
        _ctx: &CallContext,
        cred: &Credential,
        _req: &CreateVolumeRequest,
    ) -> Result<CreateVolumeResponse> {
        self.unsupported("create_volume", &cred.account_name)
    }

    async fn delete_volume(
        &self,
        _ctx: &CallContext,
        cred: &Credential,
        _req: &DeleteVolumeRequest,
    ) -> Result<DeleteVolumeResponse> {
        self.unsupported("delete_volume", &cred.account_name)
    }

    async fn create_snapshot(
        &self,
        _ctx: &CallContext,
        cred: &Credential,
        _req: &CreateSnapshotRequest,
    ) -> Result<CreateSnapshotResponse> {
        self.unsupported("create_snapshot", &cred.account_name)
    }

    async fn create_snapshot_and_delete(
        &self,
        _ctx: &CallContext,
        cred: &Credential,
        _req: &CreateSnapshotAndDeleteRequest,
    ) -> Result<CreateSnapshotAndDeleteResponse> {
        self.unsupported("create_snapshot_and_delete", &cred.account_name)
    }

    async fn get_token(
        &self,
        _ctx: &CallContext,
        cred: &Credential,
        _req: &GetTokenRequest,
    ) -> Result<GetTokenResponse> {
        self.unsupported("get_token", &cred.account_name)
    }

    async fn add_token(
        &self,
        _ctx: &CallContext,
        cred: &Credential,
        _req: &AddTokenRequest,
    ) -> Result<AddTokenResponse> {
        self.unsupported("add_token", &cred.account_name)
    }
}
