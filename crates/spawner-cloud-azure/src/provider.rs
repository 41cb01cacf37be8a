//! Azure (AKS) implementation of the canonical operation set

use crate::aks::{
    AGENT_POOL_MODE_SYSTEM, AGENT_POOL_MODE_USER, AgentPool, AgentPoolProfile, ManagedCluster,
    ManagedClusterProperties, POWER_CODE_RUNNING, ServicePrincipalProfile,
};
use crate::api::{AccessToken, ManagementApi, ResourceScope};
use crate::arm::{ArmClient, ArmEndpoints};
use crate::compute::{CreationData, Disk, DiskProperties, DiskSku, Snapshot, SnapshotProperties};
use crate::kubeconfig::parse_kubeconfig;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use spawner_cloud::labels::with_default_tags;
use spawner_cloud::*;
use std::collections::HashMap;
use std::future::Future;

pub const DEFAULT_KUBERNETES_VERSION: &str = "1.29.2";

/// Adapter-wide settings that do not vary per call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AzureSettings {
    /// Kubernetes version pinned on new clusters and node pools
    pub kubernetes_version: String,
}

impl Default for AzureSettings {
    fn default() -> Self {
        Self {
            kubernetes_version: DEFAULT_KUBERNETES_VERSION.to_string(),
        }
    }
}

/// Azure provider adapter
pub struct AzureController<A = ArmClient> {
    api: A,
    bridge: LroBridge,
    settings: AzureSettings,
}

impl AzureController<ArmClient> {
    pub fn new(endpoints: ArmEndpoints, bridge: LroBridge, settings: AzureSettings) -> Self {
        Self::with_api(ArmClient::new(endpoints), bridge, settings)
    }
}

impl<A: ManagementApi> AzureController<A> {
    pub fn with_api(api: A, bridge: LroBridge, settings: AzureSettings) -> Self {
        Self {
            api,
            bridge,
            settings,
        }
    }

    pub fn settings(&self) -> &AzureSettings {
        &self.settings
    }

    /// Token and resource scope for one call
    async fn session(
        &self,
        ctx: &CallContext,
        cred: &Credential,
    ) -> Result<(AccessToken, ResourceScope)> {
        let scope = ResourceScope::from_credential(cred)?;
        let token = native(ctx, self.api.authenticate(cred)).await?;
        Ok((token, scope))
    }

    async fn fetch_cluster(
        &self,
        ctx: &CallContext,
        cred: &Credential,
        name: &str,
    ) -> Result<ManagedCluster> {
        let (token, scope) = self.session(ctx, cred).await?;
        native(ctx, self.api.get_cluster(&token, &scope, name)).await
    }

    /// Snapshot a managed disk and return the snapshot resource id
    async fn snapshot_disk(
        &self,
        ctx: &CallContext,
        token: &AccessToken,
        scope: &ResourceScope,
        volume_id: &str,
        region: &str,
        labels: &HashMap<String, String>,
    ) -> Result<String> {
        let disk_name = resource_name(volume_id);
        let disk = native(ctx, self.api.get_disk(token, scope, disk_name)).await?;
        let source = disk.id.clone().ok_or_else(|| {
            SpawnerError::ProviderRejected(format!("disk {} has no resource id", disk_name))
        })?;

        let name = snapshot_name(disk_name, Utc::now());
        let location = disk
            .location
            .clone()
            .filter(|l| !l.is_empty())
            .unwrap_or_else(|| region.to_string());
        let body = Snapshot {
            location: Some(location),
            tags: Some(with_default_tags(labels)),
            properties: SnapshotProperties {
                creation_data: CreationData::copy_from(source),
                incremental: Some(false),
                provisioning_state: None,
            },
            ..Default::default()
        };

        tracing::info!(disk = disk_name, snapshot = %name, "creating snapshot");
        let poller = native(ctx, self.api.create_snapshot(token, scope, &name, &body)).await?;
        let outcome = self.bridge.wait(ctx, "create snapshot", poller).await?;
        let snapshot: Snapshot = outcome.parse()?;
        snapshot.id.ok_or_else(|| {
            SpawnerError::ProviderRejected(format!("snapshot {} has no resource id", name))
        })
    }

    /// Delete a managed disk; `false` when it was already gone
    async fn remove_disk(
        &self,
        ctx: &CallContext,
        token: &AccessToken,
        scope: &ResourceScope,
        volume_id: &str,
    ) -> Result<bool> {
        let name = resource_name(volume_id);
        tracing::info!(disk = name, "deleting managed disk");
        let poller = native(ctx, self.api.delete_disk(token, scope, name)).await?;
        let outcome = self.bridge.wait(ctx, "delete volume", poller).await?;
        Ok(!outcome.is_no_content())
    }
}

/// Run a native ARM call under the context, mapping its error
async fn native<T, F>(ctx: &CallContext, fut: F) -> Result<T>
where
    F: Future<Output = crate::error::Result<T>>,
{
    ctx.run(async { fut.await.map_err(SpawnerError::from) })
        .await
}

/// Last path segment of an ARM resource id, or the input if it is a bare name
pub fn resource_name(id: &str) -> &str {
    id.trim_end_matches('/').rsplit('/').next().unwrap_or(id)
}

pub fn snapshot_name(disk: &str, at: DateTime<Utc>) -> String {
    format!("{}-snapshot-{}", disk, at.format("%Y%m%d%H%M%S"))
}

fn volume_name(at: DateTime<Utc>) -> String {
    format!("spawner-vol-{}", at.format("%Y%m%d%H%M%S%3f"))
}

/// Agent pool definition for a caller node request
pub fn node_pool_profile(node: &NodeRequest, kubernetes_version: &str, mode: &str) -> AgentPoolProfile {
    let labels = with_default_tags(&node.labels);
    AgentPoolProfile {
        name: Some(node.name.clone()),
        count: Some(1),
        vm_size: Some(node.instance.clone()),
        os_disk_size_gb: Some(node.disk_size),
        node_labels: Some(labels.clone()),
        tags: Some(labels),
        mode: Some(mode.to_string()),
        orchestrator_version: Some(kubernetes_version.to_string()),
        ..Default::default()
    }
}

/// Managed cluster descriptor for a create-cluster request
pub fn build_managed_cluster(
    req: &ClusterRequest,
    cred: &Credential,
    kubernetes_version: &str,
) -> ManagedCluster {
    ManagedCluster {
        name: Some(req.cluster_name.clone()),
        location: Some(req.region.clone()),
        tags: Some(with_default_tags(&req.labels)),
        properties: Some(ManagedClusterProperties {
            dns_prefix: Some(req.cluster_name.clone()),
            kubernetes_version: Some(kubernetes_version.to_string()),
            agent_pool_profiles: Some(vec![node_pool_profile(
                &req.node,
                kubernetes_version,
                AGENT_POOL_MODE_SYSTEM,
            )]),
            service_principal_profile: Some(ServicePrincipalProfile {
                client_id: cred.client_id.clone(),
                secret: Some(cred.client_secret.clone()),
            }),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Field a provider response must carry for the call to succeed
fn required<T: Clone>(value: &Option<T>, what: &str) -> Result<T> {
    value.clone().ok_or_else(|| {
        SpawnerError::ProviderRejected(format!("malformed response: {} is missing", what))
    })
}

fn required_text(value: &Option<String>, what: &str) -> Result<String> {
    required(value, what).and_then(|text| {
        if text.trim().is_empty() {
            Err(SpawnerError::ProviderRejected(format!(
                "malformed response: {} is empty",
                what
            )))
        } else {
            Ok(text)
        }
    })
}

pub fn node_spec_from_profile(
    pool: &AgentPoolProfile,
    cluster_id: &str,
    state: ClusterStatus,
) -> Result<NodeSpec> {
    let name = required_text(&pool.name, "agent pool name")?;
    let instance = required_text(&pool.vm_size, &format!("vmSize of agent pool {}", name))?;
    let disk_size = required(&pool.os_disk_size_gb, &format!("osDiskSizeGB of agent pool {}", name))?;
    Ok(NodeSpec {
        name,
        instance,
        disk_size,
        state,
        ip_addr: None,
        availability_zone: pool.first_zone(),
        cluster_id: cluster_id.to_string(),
        labels: pool.tags.clone().unwrap_or_default(),
        gpu_enabled: false,
        health: Health::default(),
    })
}

fn cluster_spec(cluster: &ManagedCluster) -> Result<ClusterSpec> {
    let name = required_text(&cluster.name, "cluster name")?;
    let cluster_id = required_text(&cluster.id, &format!("id of cluster {}", name))?;
    let node_spec = cluster
        .agent_pools()
        .iter()
        .map(|pool| {
            let state = ClusterStatus::from_power_code(pool.power_code(), POWER_CODE_RUNNING);
            node_spec_from_profile(pool, &cluster_id, state)
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(ClusterSpec {
        name,
        cluster_id,
        node_spec,
    })
}

#[async_trait]
impl<A: ManagementApi> ClusterController for AzureController<A> {
    fn provider(&self) -> Provider {
        Provider::Azure
    }

    fn display_name(&self) -> &str {
        "Azure Kubernetes Service"
    }

    async fn create_cluster(
        &self,
        ctx: &CallContext,
        cred: &Credential,
        req: &ClusterRequest,
    ) -> Result<ClusterResponse> {
        let (token, scope) = self.session(ctx, cred).await?;
        let cluster = build_managed_cluster(req, cred, &self.settings.kubernetes_version);

        tracing::info!(
            cluster = %req.cluster_name,
            region = %req.region,
            pool = %req.node.name,
            "creating AKS cluster"
        );
        let poller = native(
            ctx,
            self.api
                .create_or_update_cluster(&token, &scope, &req.cluster_name, &cluster),
        )
        .await?;
        self.bridge.wait(ctx, "create cluster", poller).await?;

        Ok(ClusterResponse {
            cluster_name: req.cluster_name.clone(),
        })
    }

    async fn get_cluster(
        &self,
        ctx: &CallContext,
        cred: &Credential,
        req: &GetClusterRequest,
    ) -> Result<ClusterSpec> {
        let cluster = self.fetch_cluster(ctx, cred, &req.cluster_name).await?;
        let pool = cluster.agent_pools().first().ok_or_else(|| {
            SpawnerError::ProviderRejected(format!(
                "cluster {} reports no agent pools",
                req.cluster_name
            ))
        })?;

        let cluster_id = required_text(&cluster.id, &format!("id of cluster {}", req.cluster_name))?;
        let state = ClusterStatus::from_power_code(cluster.power_code(), POWER_CODE_RUNNING);
        Ok(ClusterSpec {
            name: cluster
                .name
                .clone()
                .unwrap_or_else(|| req.cluster_name.clone()),
            node_spec: vec![node_spec_from_profile(pool, &cluster_id, state)?],
            cluster_id,
        })
    }

    async fn get_clusters(
        &self,
        ctx: &CallContext,
        cred: &Credential,
        _req: &GetClustersRequest,
    ) -> Result<GetClustersResponse> {
        let (token, scope) = self.session(ctx, cred).await?;
        let clusters = native(ctx, self.api.list_clusters(&token, &scope)).await?;
        tracing::debug!(count = clusters.len(), "listed AKS clusters");

        Ok(GetClustersResponse {
            clusters: clusters.iter().map(cluster_spec).collect::<Result<Vec<_>>>()?,
        })
    }

    async fn cluster_status(
        &self,
        ctx: &CallContext,
        cred: &Credential,
        req: &ClusterStatusRequest,
    ) -> Result<ClusterStatusResponse> {
        let cluster = self.fetch_cluster(ctx, cred, &req.cluster_name).await?;
        Ok(ClusterStatusResponse {
            status: ClusterStatus::from_power_code(cluster.power_code(), POWER_CODE_RUNNING),
        })
    }

    async fn add_node(
        &self,
        ctx: &CallContext,
        cred: &Credential,
        req: &NodeSpawnRequest,
    ) -> Result<NodeSpawnResponse> {
        let (token, scope) = self.session(ctx, cred).await?;
        let body = AgentPool {
            properties: node_pool_profile(
                &req.node_spec,
                &self.settings.kubernetes_version,
                AGENT_POOL_MODE_USER,
            ),
        };

        tracing::info!(cluster = %req.cluster_name, pool = %req.node_spec.name, "adding node pool");
        let poller = native(
            ctx,
            self.api.create_or_update_agent_pool(
                &token,
                &scope,
                &req.cluster_name,
                &req.node_spec.name,
                &body,
            ),
        )
        .await?;
        self.bridge.wait(ctx, "add node", poller).await?;

        Ok(NodeSpawnResponse {
            cluster_name: req.cluster_name.clone(),
            node_name: req.node_spec.name.clone(),
        })
    }

    async fn delete_node(
        &self,
        ctx: &CallContext,
        cred: &Credential,
        req: &NodeDeleteRequest,
    ) -> Result<NodeDeleteResponse> {
        let (token, scope) = self.session(ctx, cred).await?;

        tracing::info!(cluster = %req.cluster_name, pool = %req.node_group_name, "deleting node pool");
        let poller = native(
            ctx,
            self.api
                .delete_agent_pool(&token, &scope, &req.cluster_name, &req.node_group_name),
        )
        .await?;
        let outcome = self.bridge.wait(ctx, "delete node", poller).await?;
        if outcome.is_no_content() {
            return Err(SpawnerError::ResourceNotFound(format!(
                "node pool {} in cluster {}",
                req.node_group_name, req.cluster_name
            )));
        }

        Ok(NodeDeleteResponse {
            node_name: req.node_group_name.clone(),
        })
    }

    async fn delete_cluster(
        &self,
        ctx: &CallContext,
        cred: &Credential,
        req: &ClusterDeleteRequest,
    ) -> Result<ClusterDeleteResponse> {
        let (token, scope) = self.session(ctx, cred).await?;

        tracing::info!(cluster = %req.cluster_name, "deleting AKS cluster");
        let poller = native(
            ctx,
            self.api.delete_cluster(&token, &scope, &req.cluster_name),
        )
        .await?;
        let outcome = self.bridge.wait(ctx, "delete cluster", poller).await?;
        if outcome.is_no_content() {
            return Err(SpawnerError::ResourceNotFound(format!(
                "cluster {}",
                req.cluster_name
            )));
        }

        Ok(ClusterDeleteResponse {
            cluster_name: req.cluster_name.clone(),
        })
    }

    async fn create_volume(
        &self,
        ctx: &CallContext,
        cred: &Credential,
        req: &CreateVolumeRequest,
    ) -> Result<CreateVolumeResponse> {
        let (token, scope) = self.session(ctx, cred).await?;
        let name = volume_name(Utc::now());
        let creation_data = match req.snapshot_id.as_deref().filter(|s| !s.is_empty()) {
            Some(snapshot) => CreationData::copy_from(snapshot),
            None => CreationData::empty(),
        };
        let disk = Disk {
            location: Some(req.region.clone()),
            zones: (!req.availability_zone.is_empty()).then(|| vec![req.availability_zone.clone()]),
            sku: Some(DiskSku {
                name: req.volume_type.clone(),
            }),
            tags: Some(with_default_tags(&req.labels)),
            properties: DiskProperties {
                creation_data,
                disk_size_gb: (req.size > 0).then_some(req.size),
                provisioning_state: None,
            },
            ..Default::default()
        };

        tracing::info!(disk = %name, sku = %req.volume_type, size = req.size, "creating managed disk");
        let poller = native(ctx, self.api.create_disk(&token, &scope, &name, &disk)).await?;
        let outcome = self.bridge.wait(ctx, "create volume", poller).await?;
        let created: Disk = outcome.parse()?;

        Ok(CreateVolumeResponse {
            volume_id: created.id.ok_or_else(|| {
                SpawnerError::ProviderRejected(format!("disk {} has no resource id", name))
            })?,
        })
    }

    async fn delete_volume(
        &self,
        ctx: &CallContext,
        cred: &Credential,
        req: &DeleteVolumeRequest,
    ) -> Result<DeleteVolumeResponse> {
        let (token, scope) = self.session(ctx, cred).await?;
        if !self.remove_disk(ctx, &token, &scope, &req.volume_id).await? {
            return Err(SpawnerError::ResourceNotFound(format!(
                "volume {}",
                req.volume_id
            )));
        }
        Ok(DeleteVolumeResponse { deleted: true })
    }

    async fn create_snapshot(
        &self,
        ctx: &CallContext,
        cred: &Credential,
        req: &CreateSnapshotRequest,
    ) -> Result<CreateSnapshotResponse> {
        let (token, scope) = self.session(ctx, cred).await?;
        let snapshot_id = self
            .snapshot_disk(ctx, &token, &scope, &req.volume_id, &req.region, &req.labels)
            .await?;
        Ok(CreateSnapshotResponse { snapshot_id })
    }

    async fn create_snapshot_and_delete(
        &self,
        ctx: &CallContext,
        cred: &Credential,
        req: &CreateSnapshotAndDeleteRequest,
    ) -> Result<CreateSnapshotAndDeleteResponse> {
        let (token, scope) = self.session(ctx, cred).await?;
        let snapshot_id = self
            .snapshot_disk(ctx, &token, &scope, &req.volume_id, &req.region, &req.labels)
            .await?;
        let volume_deleted = match self.remove_disk(ctx, &token, &scope, &req.volume_id).await {
            Ok(deleted) => deleted,
            Err(err) => {
                tracing::warn!(
                    volume = %req.volume_id,
                    snapshot = %snapshot_id,
                    "snapshot kept but source volume was not deleted: {}",
                    err
                );
                return Err(err.with_context(&format!("snapshot {} was created", snapshot_id)));
            }
        };
        if !volume_deleted {
            tracing::warn!(volume = %req.volume_id, "source volume was already gone");
        }

        Ok(CreateSnapshotAndDeleteResponse {
            snapshot_id,
            volume_deleted,
        })
    }

    async fn get_token(
        &self,
        ctx: &CallContext,
        cred: &Credential,
        req: &GetTokenRequest,
    ) -> Result<GetTokenResponse> {
        let (token, scope) = self.session(ctx, cred).await?;
        let results = native(
            ctx,
            self.api
                .list_cluster_user_credentials(&token, &scope, &req.cluster_name),
        )
        .await?;

        let encoded = results
            .kubeconfigs
            .into_iter()
            .find_map(|k| k.value)
            .ok_or_else(|| {
                SpawnerError::ProviderRejected(format!(
                    "cluster {} returned no kubeconfig",
                    req.cluster_name
                ))
            })?;
        let access = parse_kubeconfig(&encoded)?;

        Ok(GetTokenResponse {
            token: access.token,
            ca_data: access.ca_data,
            endpoint: access.endpoint,
        })
    }

    async fn add_token(
        &self,
        _ctx: &CallContext,
        _cred: &Credential,
        _req: &AddTokenRequest,
    ) -> Result<AddTokenResponse> {
        Err(SpawnerError::not_implemented(Provider::Azure, "add_token"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aks::{CredentialResult, CredentialResults, PowerState};
    use crate::api::{ArmOutcome, ArmPoller};
    use crate::error::AzureError;
    use base64::Engine;
    use spawner_cloud::labels::{CREATOR_LABEL, PROVISIONER_VERSION_LABEL};
    use std::sync::Mutex;

    /// In-memory ARM double; every mutation completes immediately
    #[derive(Default)]
    struct FakeApi {
        clusters: Mutex<Vec<ManagedCluster>>,
        submitted_clusters: Mutex<Vec<ManagedCluster>>,
        submitted_pools: Mutex<Vec<(String, AgentPool)>>,
        disks: Mutex<HashMap<String, Disk>>,
        submitted_disks: Mutex<Vec<Disk>>,
        deleted_disks: Mutex<Vec<String>>,
        kubeconfig: Option<String>,
        reject_token: bool,
        fail_disk_delete: bool,
        calls: Mutex<u32>,
    }

    impl FakeApi {
        fn touch(&self) {
            *self.calls.lock().unwrap() += 1;
        }

        fn with_cluster(cluster: ManagedCluster) -> Self {
            let api = Self::default();
            api.clusters.lock().unwrap().push(cluster);
            api
        }
    }

    fn done(status: u16, body: serde_json::Value) -> ArmPoller {
        Box::new(Completed::new(ArmOutcome::with_body(status, body)))
    }

    fn gone() -> ArmPoller {
        Box::new(Completed::new(ArmOutcome::no_content()))
    }

    #[async_trait]
    impl ManagementApi for FakeApi {
        async fn authenticate(&self, cred: &Credential) -> crate::error::Result<AccessToken> {
            self.touch();
            if self.reject_token {
                return Err(AzureError::TokenRejected {
                    account: cred.account_name.clone(),
                    message: "invalid_client".to_string(),
                });
            }
            Ok(AccessToken {
                token: "tok".to_string(),
            })
        }

        async fn create_or_update_cluster(
            &self,
            _token: &AccessToken,
            _scope: &ResourceScope,
            _name: &str,
            cluster: &ManagedCluster,
        ) -> crate::error::Result<ArmPoller> {
            self.touch();
            self.submitted_clusters.lock().unwrap().push(cluster.clone());
            Ok(done(201, serde_json::to_value(cluster)?))
        }

        async fn get_cluster(
            &self,
            _token: &AccessToken,
            _scope: &ResourceScope,
            name: &str,
        ) -> crate::error::Result<ManagedCluster> {
            self.touch();
            self.clusters
                .lock()
                .unwrap()
                .iter()
                .find(|c| c.name.as_deref() == Some(name))
                .cloned()
                .ok_or_else(|| AzureError::Api {
                    status: 404,
                    code: "ResourceNotFound".to_string(),
                    message: format!("managed cluster {} not found", name),
                })
        }

        async fn list_clusters(
            &self,
            _token: &AccessToken,
            _scope: &ResourceScope,
        ) -> crate::error::Result<Vec<ManagedCluster>> {
            self.touch();
            Ok(self.clusters.lock().unwrap().clone())
        }

        async fn delete_cluster(
            &self,
            _token: &AccessToken,
            _scope: &ResourceScope,
            name: &str,
        ) -> crate::error::Result<ArmPoller> {
            self.touch();
            let mut clusters = self.clusters.lock().unwrap();
            let before = clusters.len();
            clusters.retain(|c| c.name.as_deref() != Some(name));
            if clusters.len() == before {
                Ok(gone())
            } else {
                Ok(done(200, serde_json::Value::Null))
            }
        }

        async fn create_or_update_agent_pool(
            &self,
            _token: &AccessToken,
            _scope: &ResourceScope,
            _cluster: &str,
            pool: &str,
            body: &AgentPool,
        ) -> crate::error::Result<ArmPoller> {
            self.touch();
            self.submitted_pools
                .lock()
                .unwrap()
                .push((pool.to_string(), body.clone()));
            Ok(done(201, serde_json::to_value(body)?))
        }

        async fn delete_agent_pool(
            &self,
            _token: &AccessToken,
            _scope: &ResourceScope,
            _cluster: &str,
            _pool: &str,
        ) -> crate::error::Result<ArmPoller> {
            self.touch();
            Ok(gone())
        }

        async fn list_cluster_user_credentials(
            &self,
            _token: &AccessToken,
            _scope: &ResourceScope,
            _cluster: &str,
        ) -> crate::error::Result<CredentialResults> {
            self.touch();
            Ok(CredentialResults {
                kubeconfigs: self
                    .kubeconfig
                    .iter()
                    .map(|value| CredentialResult {
                        name: Some("clusterUser".to_string()),
                        value: Some(value.clone()),
                    })
                    .collect(),
            })
        }

        async fn create_disk(
            &self,
            _token: &AccessToken,
            _scope: &ResourceScope,
            name: &str,
            disk: &Disk,
        ) -> crate::error::Result<ArmPoller> {
            self.touch();
            self.submitted_disks.lock().unwrap().push(disk.clone());
            let mut created = disk.clone();
            created.id = Some(format!("/subscriptions/sub/resourceGroups/rg/providers/Microsoft.Compute/disks/{}", name));
            Ok(done(201, serde_json::to_value(created)?))
        }

        async fn get_disk(
            &self,
            _token: &AccessToken,
            _scope: &ResourceScope,
            name: &str,
        ) -> crate::error::Result<Disk> {
            self.touch();
            self.disks
                .lock()
                .unwrap()
                .get(name)
                .cloned()
                .ok_or_else(|| AzureError::Api {
                    status: 404,
                    code: "ResourceNotFound".to_string(),
                    message: format!("disk {} not found", name),
                })
        }

        async fn delete_disk(
            &self,
            _token: &AccessToken,
            _scope: &ResourceScope,
            name: &str,
        ) -> crate::error::Result<ArmPoller> {
            self.touch();
            if self.fail_disk_delete {
                return Err(AzureError::Api {
                    status: 503,
                    code: "ServiceUnavailable".to_string(),
                    message: format!("disk {} is busy", name),
                });
            }
            if self.disks.lock().unwrap().remove(name).is_some() {
                self.deleted_disks.lock().unwrap().push(name.to_string());
                Ok(done(200, serde_json::Value::Null))
            } else {
                Ok(gone())
            }
        }

        async fn create_snapshot(
            &self,
            _token: &AccessToken,
            _scope: &ResourceScope,
            name: &str,
            snapshot: &Snapshot,
        ) -> crate::error::Result<ArmPoller> {
            self.touch();
            let mut created = snapshot.clone();
            created.id = Some(format!("/subscriptions/sub/resourceGroups/rg/providers/Microsoft.Compute/snapshots/{}", name));
            Ok(done(201, serde_json::to_value(created)?))
        }
    }

    fn controller(api: FakeApi) -> AzureController<FakeApi> {
        AzureController::with_api(api, LroBridge::default(), AzureSettings::default())
    }

    fn credential() -> Credential {
        Credential {
            account_name: "acct-1".to_string(),
            client_id: "app-id".to_string(),
            client_secret: "secret".to_string(),
            tenant_id: "tenant".to_string(),
            subscription_id: "sub".to_string(),
            resource_group: "rg".to_string(),
            region: "eastus".to_string(),
        }
    }

    fn pool(name: &str, power: &str, zones: &[&str]) -> AgentPoolProfile {
        AgentPoolProfile {
            name: Some(name.to_string()),
            count: Some(1),
            vm_size: Some("Standard_D2".to_string()),
            os_disk_size_gb: Some(30),
            availability_zones: (!zones.is_empty())
                .then(|| zones.iter().map(|z| z.to_string()).collect()),
            tags: Some(HashMap::from([("team".to_string(), "ml".to_string())])),
            power_state: Some(PowerState::new(power)),
            ..Default::default()
        }
    }

    fn cluster(name: &str, power: &str, pools: Vec<AgentPoolProfile>) -> ManagedCluster {
        ManagedCluster {
            id: Some(format!("/subscriptions/sub/resourceGroups/rg/providers/Microsoft.ContainerService/managedClusters/{}", name)),
            name: Some(name.to_string()),
            location: Some("eastus".to_string()),
            properties: Some(ManagedClusterProperties {
                power_state: Some(PowerState::new(power)),
                agent_pool_profiles: Some(pools),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    fn create_request() -> ClusterRequest {
        ClusterRequest {
            provider: Provider::Azure,
            account_name: "acct-1".to_string(),
            cluster_name: "demo".to_string(),
            region: "eastus".to_string(),
            node: NodeRequest {
                name: "pool1".to_string(),
                instance: "Standard_D2".to_string(),
                disk_size: 30,
                labels: HashMap::new(),
            },
            labels: HashMap::from([(CREATOR_LABEL.to_string(), "team-ml".to_string())]),
        }
    }

    #[tokio::test]
    async fn test_create_cluster_returns_name() {
        let azure = controller(FakeApi::default());
        let resp = azure
            .create_cluster(&CallContext::new(), &credential(), &create_request())
            .await
            .unwrap();
        assert_eq!(resp.cluster_name, "demo");

        let submitted = azure.api.submitted_clusters.lock().unwrap();
        let sent = &submitted[0];
        let props = sent.properties.as_ref().unwrap();
        assert_eq!(props.dns_prefix.as_deref(), Some("demo"));
        assert_eq!(props.kubernetes_version.as_deref(), Some(DEFAULT_KUBERNETES_VERSION));
        let tags = sent.tags.as_ref().unwrap();
        assert_eq!(tags.get(CREATOR_LABEL).map(String::as_str), Some("team-ml"));
        assert!(tags.contains_key(PROVISIONER_VERSION_LABEL));

        let pools = sent.agent_pools();
        assert_eq!(pools.len(), 1);
        assert_eq!(pools[0].count, Some(1));
        assert_eq!(pools[0].mode.as_deref(), Some(AGENT_POOL_MODE_SYSTEM));
        assert_eq!(pools[0].os_disk_size_gb, Some(30));
        assert_eq!(
            props
                .service_principal_profile
                .as_ref()
                .map(|sp| sp.client_id.as_str()),
            Some("app-id")
        );
    }

    #[tokio::test]
    async fn test_get_cluster_stopped_is_inactive() {
        let azure = controller(FakeApi::with_cluster(cluster(
            "demo",
            "Stopped",
            vec![pool("pool1", "Stopped", &["2"])],
        )));
        let req = GetClusterRequest {
            provider: Provider::Azure,
            account_name: "acct-1".to_string(),
            cluster_name: "demo".to_string(),
        };

        let spec = azure
            .get_cluster(&CallContext::new(), &credential(), &req)
            .await
            .unwrap();
        assert_eq!(spec.name, "demo");
        assert_eq!(spec.node_spec.len(), 1);
        let node = &spec.node_spec[0];
        assert_eq!(node.state, ClusterStatus::Inactive);
        assert_eq!(node.instance, "Standard_D2");
        assert_eq!(node.disk_size, 30);
        assert_eq!(node.availability_zone, "2");
        assert_eq!(node.cluster_id, spec.cluster_id);
    }

    #[tokio::test]
    async fn test_get_cluster_without_pools_is_rejected() {
        let azure = controller(FakeApi::with_cluster(cluster("demo", "Running", vec![])));
        let req = GetClusterRequest {
            provider: Provider::Azure,
            account_name: "acct-1".to_string(),
            cluster_name: "demo".to_string(),
        };
        let err = azure
            .get_cluster(&CallContext::new(), &credential(), &req)
            .await
            .unwrap_err();
        assert!(matches!(err, SpawnerError::ProviderRejected(_)));
    }

    #[tokio::test]
    async fn test_missing_cluster_is_not_found() {
        let azure = controller(FakeApi::default());
        let req = ClusterStatusRequest {
            provider: Provider::Azure,
            account_name: "acct-1".to_string(),
            cluster_name: "ghost".to_string(),
        };
        let err = azure
            .cluster_status(&CallContext::new(), &credential(), &req)
            .await
            .unwrap_err();
        assert!(matches!(err, SpawnerError::ResourceNotFound(_)));
    }

    #[tokio::test]
    async fn test_cluster_status_maps_power_code() {
        let azure = controller(FakeApi::with_cluster(cluster(
            "demo",
            "Running",
            vec![pool("pool1", "Running", &[])],
        )));
        let req = ClusterStatusRequest {
            provider: Provider::Azure,
            account_name: "acct-1".to_string(),
            cluster_name: "demo".to_string(),
        };
        let resp = azure
            .cluster_status(&CallContext::new(), &credential(), &req)
            .await
            .unwrap();
        assert_eq!(resp.status, ClusterStatus::Active);
    }

    #[tokio::test]
    async fn test_list_clusters_keeps_order_and_pools() {
        let api = FakeApi::default();
        api.clusters.lock().unwrap().extend([
            cluster(
                "alpha",
                "Running",
                vec![pool("sys", "Running", &["1", "3"]), pool("gpu", "Stopped", &[])],
            ),
            cluster("beta", "Stopped", vec![pool("sys", "Stopped", &[])]),
        ]);
        let azure = controller(api);
        let req = GetClustersRequest {
            provider: Provider::Azure,
            account_name: "acct-1".to_string(),
        };

        let resp = azure
            .get_clusters(&CallContext::new(), &credential(), &req)
            .await
            .unwrap();
        let names: Vec<_> = resp.clusters.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, ["alpha", "beta"]);

        let alpha = &resp.clusters[0].node_spec;
        assert_eq!(alpha.len(), 2);
        assert_eq!(alpha[0].state, ClusterStatus::Active);
        assert_eq!(alpha[0].availability_zone, "1");
        assert_eq!(alpha[1].state, ClusterStatus::Inactive);
        assert_eq!(alpha[1].availability_zone, "");
        assert_eq!(alpha[0].labels.get("team").map(String::as_str), Some("ml"));
        assert!(!alpha[0].gpu_enabled);
        assert_eq!(alpha[0].health, Health::default());
    }

    #[tokio::test]
    async fn test_incomplete_pool_is_rejected() {
        let bare = AgentPoolProfile {
            power_state: Some(PowerState::new("Running")),
            ..Default::default()
        };
        let api = FakeApi::default();
        api.clusters
            .lock()
            .unwrap()
            .push(cluster("demo", "Running", vec![bare]));
        let azure = controller(api);

        let req = GetClustersRequest {
            provider: Provider::Azure,
            account_name: "acct-1".to_string(),
        };
        let err = tokio_test::assert_err!(
            azure
                .get_clusters(&CallContext::new(), &credential(), &req)
                .await
        );
        assert_eq!(
            err,
            SpawnerError::ProviderRejected("malformed response: agent pool name is missing".to_string())
        );

        let req = GetClusterRequest {
            provider: Provider::Azure,
            account_name: "acct-1".to_string(),
            cluster_name: "demo".to_string(),
        };
        let err = tokio_test::assert_err!(
            azure
                .get_cluster(&CallContext::new(), &credential(), &req)
                .await
        );
        assert_eq!(err.kind(), ErrorKind::ProviderRejected);
    }

    #[test]
    fn test_pool_without_vm_size_is_rejected() {
        let mut profile = pool("gpu", "Running", &[]);
        profile.vm_size = None;
        let err = tokio_test::assert_err!(node_spec_from_profile(
            &profile,
            "/managedClusters/demo",
            ClusterStatus::Active
        ));
        assert_eq!(
            err,
            SpawnerError::ProviderRejected(
                "malformed response: vmSize of agent pool gpu is missing".to_string()
            )
        );

        profile.vm_size = Some("Standard_NC6".to_string());
        profile.os_disk_size_gb = None;
        assert!(node_spec_from_profile(&profile, "/managedClusters/demo", ClusterStatus::Active).is_err());
    }

    #[tokio::test]
    async fn test_cluster_without_id_is_rejected() {
        let mut listed = cluster("demo", "Running", vec![pool("sys", "Running", &[])]);
        listed.id = None;
        let azure = controller(FakeApi::with_cluster(listed));
        let req = GetClustersRequest {
            provider: Provider::Azure,
            account_name: "acct-1".to_string(),
        };
        let err = tokio_test::assert_err!(
            azure
                .get_clusters(&CallContext::new(), &credential(), &req)
                .await
        );
        assert_eq!(
            err,
            SpawnerError::ProviderRejected("malformed response: id of cluster demo is missing".to_string())
        );
    }

    #[tokio::test]
    async fn test_delete_absent_cluster_is_not_found() {
        let azure = controller(FakeApi::default());
        let req = ClusterDeleteRequest {
            provider: Provider::Azure,
            account_name: "acct-1".to_string(),
            cluster_name: "demo".to_string(),
        };
        let err = azure
            .delete_cluster(&CallContext::new(), &credential(), &req)
            .await
            .unwrap_err();
        assert!(matches!(err, SpawnerError::ResourceNotFound(_)));
    }

    #[tokio::test]
    async fn test_delete_existing_cluster() {
        let azure = controller(FakeApi::with_cluster(cluster("demo", "Running", vec![])));
        let req = ClusterDeleteRequest {
            provider: Provider::Azure,
            account_name: "acct-1".to_string(),
            cluster_name: "demo".to_string(),
        };
        let resp = azure
            .delete_cluster(&CallContext::new(), &credential(), &req)
            .await
            .unwrap();
        assert_eq!(resp.cluster_name, "demo");
    }

    #[tokio::test]
    async fn test_add_node_creates_user_pool() {
        let azure = controller(FakeApi::default());
        let req = NodeSpawnRequest {
            provider: Provider::Azure,
            account_name: "acct-1".to_string(),
            cluster_name: "demo".to_string(),
            region: "eastus".to_string(),
            node_spec: NodeRequest {
                name: "gpu1".to_string(),
                instance: "Standard_NC6".to_string(),
                disk_size: 100,
                labels: HashMap::from([("workspace".to_string(), "ws-1".to_string())]),
            },
        };

        let resp = azure
            .add_node(&CallContext::new(), &credential(), &req)
            .await
            .unwrap();
        assert_eq!(resp.node_name, "gpu1");

        let pools = azure.api.submitted_pools.lock().unwrap();
        let (name, body) = &pools[0];
        assert_eq!(name, "gpu1");
        assert_eq!(body.properties.mode.as_deref(), Some(AGENT_POOL_MODE_USER));
        let labels = body.properties.node_labels.as_ref().unwrap();
        assert_eq!(labels.get("workspace").map(String::as_str), Some("ws-1"));
        assert!(labels.contains_key(CREATOR_LABEL));
    }

    #[tokio::test]
    async fn test_delete_missing_node_is_not_found() {
        let azure = controller(FakeApi::default());
        let req = NodeDeleteRequest {
            provider: Provider::Azure,
            account_name: "acct-1".to_string(),
            cluster_name: "demo".to_string(),
            node_group_name: "pool9".to_string(),
        };
        let err = azure
            .delete_node(&CallContext::new(), &credential(), &req)
            .await
            .unwrap_err();
        assert!(matches!(err, SpawnerError::ResourceNotFound(_)));
    }

    #[tokio::test]
    async fn test_create_volume_from_snapshot() {
        let azure = controller(FakeApi::default());
        let req = CreateVolumeRequest {
            provider: Provider::Azure,
            account_name: "acct-1".to_string(),
            region: "eastus".to_string(),
            availability_zone: "1".to_string(),
            volume_type: "Premium_LRS".to_string(),
            size: 64,
            snapshot_id: Some("/snapshots/snap-1".to_string()),
            labels: HashMap::new(),
        };

        let resp = azure
            .create_volume(&CallContext::new(), &credential(), &req)
            .await
            .unwrap();
        assert!(resp.volume_id.contains("/disks/spawner-vol-"));

        let disks = azure.api.submitted_disks.lock().unwrap();
        let sent = &disks[0];
        assert_eq!(sent.zones, Some(vec!["1".to_string()]));
        assert_eq!(sent.properties.creation_data, CreationData::copy_from("/snapshots/snap-1"));
        assert_eq!(sent.properties.disk_size_gb, Some(64));
    }

    #[tokio::test]
    async fn test_snapshot_and_delete() {
        let api = FakeApi::default();
        api.disks.lock().unwrap().insert(
            "vol-1".to_string(),
            Disk {
                id: Some("/subscriptions/sub/resourceGroups/rg/providers/Microsoft.Compute/disks/vol-1".to_string()),
                name: Some("vol-1".to_string()),
                location: Some("eastus".to_string()),
                ..Default::default()
            },
        );
        let azure = controller(api);
        let req = CreateSnapshotAndDeleteRequest {
            provider: Provider::Azure,
            account_name: "acct-1".to_string(),
            region: "eastus".to_string(),
            volume_id: "/subscriptions/sub/resourceGroups/rg/providers/Microsoft.Compute/disks/vol-1"
                .to_string(),
            labels: HashMap::new(),
        };

        let resp = azure
            .create_snapshot_and_delete(&CallContext::new(), &credential(), &req)
            .await
            .unwrap();
        assert!(resp.snapshot_id.contains("/snapshots/vol-1-snapshot-"));
        assert!(resp.volume_deleted);
        assert_eq!(*azure.api.deleted_disks.lock().unwrap(), vec!["vol-1".to_string()]);
    }

    #[tokio::test]
    async fn test_failed_delete_keeps_snapshot_id() {
        let api = FakeApi {
            fail_disk_delete: true,
            ..Default::default()
        };
        api.disks.lock().unwrap().insert(
            "vol-1".to_string(),
            Disk {
                id: Some("/subscriptions/sub/resourceGroups/rg/providers/Microsoft.Compute/disks/vol-1".to_string()),
                location: Some("eastus".to_string()),
                ..Default::default()
            },
        );
        let azure = controller(api);
        let req = CreateSnapshotAndDeleteRequest {
            provider: Provider::Azure,
            account_name: "acct-1".to_string(),
            region: "eastus".to_string(),
            volume_id: "vol-1".to_string(),
            labels: HashMap::new(),
        };

        let err = tokio_test::assert_err!(
            azure
                .create_snapshot_and_delete(&CallContext::new(), &credential(), &req)
                .await
        );
        assert_eq!(err.kind(), ErrorKind::ProviderUnavailable);
        let message = err.to_string();
        assert!(message.contains("ServiceUnavailable"));
        assert!(message.contains("/snapshots/vol-1-snapshot-"), "{message}");
        assert!(azure.api.disks.lock().unwrap().contains_key("vol-1"));
    }

    #[tokio::test]
    async fn test_delete_missing_volume_is_not_found() {
        let azure = controller(FakeApi::default());
        let req = DeleteVolumeRequest {
            provider: Provider::Azure,
            account_name: "acct-1".to_string(),
            region: "eastus".to_string(),
            volume_id: "vol-9".to_string(),
        };
        let err = azure
            .delete_volume(&CallContext::new(), &credential(), &req)
            .await
            .unwrap_err();
        assert!(matches!(err, SpawnerError::ResourceNotFound(_)));
    }

    #[tokio::test]
    async fn test_get_token_from_kubeconfig() {
        let kubeconfig = "clusters:\n- name: demo\n  cluster:\n    server: https://demo.hcp.eastus.azmk8s.io:443\n    certificate-authority-data: Q0E=\nusers:\n- name: clusterUser\n  user:\n    token: abc123\n";
        let api = FakeApi {
            kubeconfig: Some(base64::engine::general_purpose::STANDARD.encode(kubeconfig)),
            ..Default::default()
        };
        let azure = controller(api);
        let req = GetTokenRequest {
            provider: Provider::Azure,
            account_name: "acct-1".to_string(),
            cluster_name: "demo".to_string(),
            region: "eastus".to_string(),
        };

        let resp = azure
            .get_token(&CallContext::new(), &credential(), &req)
            .await
            .unwrap();
        assert_eq!(resp.token, "abc123");
        assert_eq!(resp.ca_data, "Q0E=");
        assert_eq!(resp.endpoint, "https://demo.hcp.eastus.azmk8s.io:443");
    }

    #[tokio::test]
    async fn test_add_token_not_implemented() {
        let azure = controller(FakeApi::default());
        let req = AddTokenRequest {
            provider: Provider::Azure,
            account_name: "acct-1".to_string(),
            cluster_name: "demo".to_string(),
            region: String::new(),
            token: "t".to_string(),
            ca_data: String::new(),
            endpoint: String::new(),
        };
        let err = azure
            .add_token(&CallContext::new(), &credential(), &req)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotImplemented);
    }

    #[tokio::test]
    async fn test_rejected_token_is_credential_failure() {
        let azure = controller(FakeApi {
            reject_token: true,
            ..Default::default()
        });
        let err = azure
            .create_cluster(&CallContext::new(), &credential(), &create_request())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::CredentialResolutionFailed);
        assert!(azure.api.submitted_clusters.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_canceled_context_makes_no_calls() {
        let azure = controller(FakeApi::default());
        let ctx = CallContext::new();
        ctx.cancel();
        let err = azure
            .create_cluster(&ctx, &credential(), &create_request())
            .await
            .unwrap_err();
        assert!(matches!(err, SpawnerError::OperationCanceled(_)));
        assert_eq!(*azure.api.calls.lock().unwrap(), 0);
    }

    #[test]
    fn test_resource_name() {
        assert_eq!(
            resource_name("/subscriptions/s/resourceGroups/rg/providers/Microsoft.Compute/disks/vol-1"),
            "vol-1"
        );
        assert_eq!(resource_name("vol-1"), "vol-1");
    }

    #[test]
    fn test_snapshot_name_uses_utc_timestamp() {
        let at = DateTime::parse_from_rfc3339("2024-03-05T07:08:09Z")
            .unwrap()
            .with_timezone(&Utc);
        assert_eq!(snapshot_name("vol-1", at), "vol-1-snapshot-20240305070809");
    }
}
