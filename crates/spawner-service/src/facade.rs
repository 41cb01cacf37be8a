//! Provider facade
//!
//! Validates a canonical request, picks the adapter registered for its
//! provider, resolves the account's credentials and dispatches.

use spawner_cloud::*;
use std::collections::HashMap;
use std::sync::Arc;

/// Routes canonical requests to provider adapters
pub struct Spawner {
    controllers: HashMap<Provider, Arc<dyn ClusterController>>,
    resolver: Arc<dyn CredentialResolver>,
}

impl Spawner {
    pub fn new(resolver: Arc<dyn CredentialResolver>) -> Self {
        Self {
            controllers: HashMap::new(),
            resolver,
        }
    }

    /// Register an adapter under the provider it reports
    pub fn with_controller(mut self, controller: Arc<dyn ClusterController>) -> Self {
        self.register(controller);
        self
    }

    pub fn register(&mut self, controller: Arc<dyn ClusterController>) {
        tracing::info!(
            provider = %controller.provider(),
            name = controller.display_name(),
            "registered provider adapter"
        );
        self.controllers.insert(controller.provider(), controller);
    }

    pub fn providers(&self) -> Vec<Provider> {
        Provider::ALL
            .into_iter()
            .filter(|p| self.controllers.contains_key(p))
            .collect()
    }

    fn controller(&self, provider: Provider) -> Result<Arc<dyn ClusterController>> {
        self.controllers
            .get(&provider)
            .cloned()
            .ok_or(SpawnerError::UnknownProvider(provider))
    }

    /// Validation, adapter lookup and credential resolution shared by every
    /// operation
    async fn prepare<R: CloudRequest + Sync>(
        &self,
        ctx: &CallContext,
        req: &R,
    ) -> Result<(Arc<dyn ClusterController>, Credential)> {
        req.validate()?;
        let controller = self.controller(req.provider())?;
        let credential = ctx
            .run(self.resolver.resolve(req.provider(), req.account_name()))
            .await?;
        Ok((controller, credential))
    }
}

macro_rules! facade_operations {
    ($($op:ident($req:ty) -> $resp:ty;)*) => {
        impl Spawner {
            $(
                pub async fn $op(&self, ctx: &CallContext, req: &$req) -> Result<$resp> {
                    let (controller, credential) = self.prepare(ctx, req).await?;
                    tracing::debug!(
                        operation = stringify!($op),
                        provider = %req.provider,
                        account = %req.account_name,
                        "dispatching"
                    );
                    controller.$op(ctx, &credential, req).await
                }
            )*
        }
    };
}

facade_operations! {
    create_cluster(ClusterRequest) -> ClusterResponse;
    get_cluster(GetClusterRequest) -> ClusterSpec;
    get_clusters(GetClustersRequest) -> GetClustersResponse;
    cluster_status(ClusterStatusRequest) -> ClusterStatusResponse;
    add_node(NodeSpawnRequest) -> NodeSpawnResponse;
    delete_node(NodeDeleteRequest) -> NodeDeleteResponse;
    delete_cluster(ClusterDeleteRequest) -> ClusterDeleteResponse;
    create_volume(CreateVolumeRequest) -> CreateVolumeResponse;
    delete_volume(DeleteVolumeRequest) -> DeleteVolumeResponse;
    create_snapshot(CreateSnapshotRequest) -> CreateSnapshotResponse;
    create_snapshot_and_delete(CreateSnapshotAndDeleteRequest) -> CreateSnapshotAndDeleteResponse;
    get_token(GetTokenRequest) -> GetTokenResponse;
    add_token(AddTokenRequest) -> AddTokenResponse;
}
