//! Endpoint set: the resilient entry point for every canonical operation
//!
//! Each call passes its operation's rate limiter, then its circuit breaker,
//! then the facade. A rejected call never reaches the layers behind it.

use crate::facade::Spawner;
use crate::registry::{OperationKind, ResiliencePolicies};
use spawner_cloud::*;
use std::sync::Arc;
use std::time::Duration;

#[derive(Clone)]
pub struct EndpointSet {
    spawner: Arc<Spawner>,
    policies: Arc<ResiliencePolicies>,
    request_timeout: Option<Duration>,
}

impl EndpointSet {
    pub fn new(spawner: Arc<Spawner>, policies: Arc<ResiliencePolicies>) -> Self {
        Self {
            spawner,
            policies,
            request_timeout: None,
        }
    }

    /// Deadline applied to every call on top of the caller's own
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    pub fn policies(&self) -> &ResiliencePolicies {
        &self.policies
    }

    pub fn spawner(&self) -> &Spawner {
        &self.spawner
    }

    fn call_context(&self, ctx: &CallContext) -> CallContext {
        match self.request_timeout {
            Some(timeout) => ctx.child().deadline_after(timeout),
            None => ctx.clone(),
        }
    }
}

macro_rules! endpoints {
    ($($op:ident($req:ty) -> $resp:ty => $kind:ident;)*) => {
        impl EndpointSet {
            $(
                pub async fn $op(&self, ctx: &CallContext, req: &$req) -> Result<$resp> {
                    let ctx = self.call_context(ctx);
                    let result = self
                        .policies
                        .guard(OperationKind::$kind, self.spawner.$op(&ctx, req))
                        .await;
                    match &result {
                        Err(err) if err.is_dependency_failure() => tracing::error!(
                            operation = OperationKind::$kind.as_str(),
                            kind = %err.kind(),
                            "call failed: {}",
                            err
                        ),
                        Err(err) => tracing::info!(
                            operation = OperationKind::$kind.as_str(),
                            kind = %err.kind(),
                            "call rejected: {}",
                            err
                        ),
                        Ok(_) => {}
                    }
                    result
                }
            )*
        }
    };
}

endpoints! {
    create_cluster(ClusterRequest) -> ClusterResponse => CreateCluster;
    get_cluster(GetClusterRequest) -> ClusterSpec => GetCluster;
    get_clusters(GetClustersRequest) -> GetClustersResponse => GetClusters;
    cluster_status(ClusterStatusRequest) -> ClusterStatusResponse => ClusterStatus;
    add_node(NodeSpawnRequest) -> NodeSpawnResponse => AddNode;
    delete_node(NodeDeleteRequest) -> NodeDeleteResponse => DeleteNode;
    delete_cluster(ClusterDeleteRequest) -> ClusterDeleteResponse => DeleteCluster;
    create_volume(CreateVolumeRequest) -> CreateVolumeResponse => CreateVolume;
    delete_volume(DeleteVolumeRequest) -> DeleteVolumeResponse => DeleteVolume;
    create_snapshot(CreateSnapshotRequest) -> CreateSnapshotResponse => CreateSnapshot;
    create_snapshot_and_delete(CreateSnapshotAndDeleteRequest) -> CreateSnapshotAndDeleteResponse => CreateSnapshotAndDelete;
    get_token(GetTokenRequest) -> GetTokenResponse => GetToken;
    add_token(AddTokenRequest) -> AddTokenResponse => AddToken;
}
