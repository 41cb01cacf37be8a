//! Canonical request and response shapes
//!
//! These types are provider-agnostic. Adapters translate them to and from
//! their native control-plane payloads; nothing here is persisted.

use crate::error::{Result, SpawnerError};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;

/// Cloud providers known to the system
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", try_from = "String")]
pub enum Provider {
    Azure,
    Aws,
}

impl Provider {
    pub const ALL: [Provider; 2] = [Provider::Azure, Provider::Aws];

    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Azure => "azure",
            Provider::Aws => "aws",
        }
    }
}

impl std::fmt::Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Provider {
    type Err = SpawnerError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "azure" => Ok(Provider::Azure),
            "aws" => Ok(Provider::Aws),
            other => Err(SpawnerError::InvalidRequest(format!(
                "unsupported provider '{}'",
                other
            ))),
        }
    }
}

impl TryFrom<String> for Provider {
    type Error = SpawnerError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

/// Two-valued canonical cluster/node state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClusterStatus {
    Active,
    Inactive,
}

impl ClusterStatus {
    /// `Active` only when the provider code is exactly the provider's
    /// running code; stopped, stopping, provisioning and unknown codes all
    /// collapse to `Inactive`.
    pub fn from_power_code(code: Option<&str>, running_code: &str) -> Self {
        match code {
            Some(c) if c == running_code => ClusterStatus::Active,
            _ => ClusterStatus::Inactive,
        }
    }
}

impl std::fmt::Display for ClusterStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ClusterStatus::Active => write!(f, "active"),
            ClusterStatus::Inactive => write!(f, "inactive"),
        }
    }
}

/// Node pool definition supplied by callers
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeRequest {
    pub name: String,
    pub instance: String,
    pub disk_size: i32,
    #[serde(default)]
    pub labels: HashMap<String, String>,
}

/// Health summary of a node pool
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Health {
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub issues: Vec<String>,
}

/// Canonical view of one node pool as reported by a provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeSpec {
    pub name: String,
    pub instance: String,
    pub disk_size: i32,
    pub state: ClusterStatus,
    pub ip_addr: Option<String>,
    pub availability_zone: String,
    pub cluster_id: String,
    pub labels: HashMap<String, String>,
    pub gpu_enabled: bool,
    pub health: Health,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterSpec {
    pub name: String,
    pub cluster_id: String,
    pub node_spec: Vec<NodeSpec>,
}

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterRequest {
    pub provider: Provider,
    #[serde(alias = "account")]
    pub account_name: String,
    #[serde(alias = "cluster")]
    pub cluster_name: String,
    pub region: String,
    pub node: NodeRequest,
    #[serde(default)]
    pub labels: HashMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetClusterRequest {
    pub provider: Provider,
    #[serde(alias = "account")]
    pub account_name: String,
    #[serde(alias = "cluster")]
    pub cluster_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetClustersRequest {
    pub provider: Provider,
    #[serde(alias = "account")]
    pub account_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterStatusRequest {
    pub provider: Provider,
    #[serde(alias = "account")]
    pub account_name: String,
    #[serde(alias = "cluster")]
    pub cluster_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeSpawnRequest {
    pub provider: Provider,
    #[serde(alias = "account")]
    pub account_name: String,
    #[serde(alias = "cluster")]
    pub cluster_name: String,
    pub region: String,
    pub node_spec: NodeRequest,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeDeleteRequest {
    pub provider: Provider,
    #[serde(alias = "account")]
    pub account_name: String,
    #[serde(alias = "cluster")]
    pub cluster_name: String,
    pub node_group_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterDeleteRequest {
    pub provider: Provider,
    #[serde(alias = "account")]
    pub account_name: String,
    #[serde(alias = "cluster")]
    pub cluster_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateVolumeRequest {
    pub provider: Provider,
    #[serde(alias = "account")]
    pub account_name: String,
    pub region: String,
    #[serde(default)]
    pub availability_zone: String,
    pub volume_type: String,
    pub size: i32,
    #[serde(default)]
    pub snapshot_id: Option<String>,
    #[serde(default)]
    pub labels: HashMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteVolumeRequest {
    pub provider: Provider,
    #[serde(alias = "account")]
    pub account_name: String,
    pub region: String,
    pub volume_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSnapshotRequest {
    pub provider: Provider,
    #[serde(alias = "account")]
    pub account_name: String,
    pub region: String,
    pub volume_id: String,
    #[serde(default)]
    pub labels: HashMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSnapshotAndDeleteRequest {
    pub provider: Provider,
    #[serde(alias = "account")]
    pub account_name: String,
    pub region: String,
    pub volume_id: String,
    #[serde(default)]
    pub labels: HashMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetTokenRequest {
    pub provider: Provider,
    #[serde(alias = "account")]
    pub account_name: String,
    #[serde(alias = "cluster")]
    pub cluster_name: String,
    #[serde(default)]
    pub region: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddTokenRequest {
    pub provider: Provider,
    #[serde(alias = "account")]
    pub account_name: String,
    #[serde(alias = "cluster")]
    pub cluster_name: String,
    #[serde(default)]
    pub region: String,
    pub token: String,
    pub ca_data: String,
    pub endpoint: String,
}

// ---------------------------------------------------------------------------
// Responses
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterResponse {
    pub cluster_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetClustersResponse {
    pub clusters: Vec<ClusterSpec>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterStatusResponse {
    pub status: ClusterStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeSpawnResponse {
    pub cluster_name: String,
    pub node_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeDeleteResponse {
    pub node_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterDeleteResponse {
    pub cluster_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateVolumeResponse {
    pub volume_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteVolumeResponse {
    pub deleted: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSnapshotResponse {
    pub snapshot_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSnapshotAndDeleteResponse {
    pub snapshot_id: String,
    pub volume_deleted: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetTokenResponse {
    pub token: String,
    pub ca_data: String,
    pub endpoint: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddTokenResponse {
    pub cluster_name: String,
}

// ---------------------------------------------------------------------------
// Request routing
// ---------------------------------------------------------------------------

/// Fields every canonical request carries
pub trait CloudRequest {
    /// Provider the request is addressed to
    fn provider(&self) -> Provider;

    /// Account whose credentials the call runs under
    fn account_name(&self) -> &str;

    /// Resource names the operation cannot run without
    fn required_fields(&self) -> Vec<(&'static str, &str)>;

    /// Request-specific rules beyond the required names
    fn check(&self) -> Result<()> {
        Ok(())
    }

    /// Reject malformed requests before any credential lookup
    fn validate(&self) -> Result<()> {
        if self.account_name().trim().is_empty() {
            return Err(SpawnerError::InvalidRequest(
                "accountName is required".to_string(),
            ));
        }
        for (field, value) in self.required_fields() {
            if value.trim().is_empty() {
                return Err(SpawnerError::InvalidRequest(format!(
                    "{} is required",
                    field
                )));
            }
        }
        self.check()
    }
}

macro_rules! cloud_request {
    ($ty:ty $(, $($field:ident).+ => $name:literal)* $(; check = $check:path)?) => {
        impl CloudRequest for $ty {
            fn provider(&self) -> Provider {
                self.provider
            }

            fn account_name(&self) -> &str {
                &self.account_name
            }

            fn required_fields(&self) -> Vec<(&'static str, &str)> {
                vec![$(($name, self.$($field).+.as_str())),*]
            }

            $(
                fn check(&self) -> Result<()> {
                    $check(self)
                }
            )?
        }
    };
}

cloud_request!(ClusterRequest, cluster_name => "clusterName", region => "region");
cloud_request!(GetClusterRequest, cluster_name => "clusterName");
cloud_request!(GetClustersRequest);
cloud_request!(ClusterStatusRequest, cluster_name => "clusterName");
cloud_request!(NodeSpawnRequest, cluster_name => "clusterName", node_spec.name => "nodeSpec.name");
cloud_request!(NodeDeleteRequest, cluster_name => "clusterName", node_group_name => "nodeGroupName");
cloud_request!(ClusterDeleteRequest, cluster_name => "clusterName");
cloud_request!(
    CreateVolumeRequest,
    region => "region",
    volume_type => "volumeType";
    check = check_volume_size
);

/// A blank volume needs a size; one restored from a snapshot inherits it
fn check_volume_size(req: &CreateVolumeRequest) -> Result<()> {
    let from_snapshot = req.snapshot_id.as_deref().is_some_and(|s| !s.trim().is_empty());
    if req.size <= 0 && !from_snapshot {
        return Err(SpawnerError::InvalidRequest(
            "size must be positive".to_string(),
        ));
    }
    Ok(())
}
cloud_request!(DeleteVolumeRequest, volume_id => "volumeId");
cloud_request!(CreateSnapshotRequest, volume_id => "volumeId");
cloud_request!(CreateSnapshotAndDeleteRequest, volume_id => "volumeId");
cloud_request!(GetTokenRequest, cluster_name => "clusterName");
cloud_request!(AddTokenRequest, cluster_name => "clusterName", token => "token");
