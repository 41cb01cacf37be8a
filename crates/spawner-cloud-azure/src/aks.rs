//! AKS managed-cluster payloads
//!
//! Subset of the `Microsoft.ContainerService` REST shapes the adapter reads
//! and writes. Read-only properties are optional and skipped on the way out.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Power code AKS reports for a running cluster or agent pool
pub const POWER_CODE_RUNNING: &str = "Running";

pub const AGENT_POOL_MODE_SYSTEM: &str = "System";
pub const AGENT_POOL_MODE_USER: &str = "User";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManagedCluster {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<HashMap<String, String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub properties: Option<ManagedClusterProperties>,
}

impl ManagedCluster {
    pub fn power_code(&self) -> Option<&str> {
        self.properties
            .as_ref()?
            .power_state
            .as_ref()?
            .code
            .as_deref()
    }

    pub fn agent_pools(&self) -> &[AgentPoolProfile] {
        self.properties
            .as_ref()
            .and_then(|p| p.agent_pool_profiles.as_deref())
            .unwrap_or(&[])
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManagedClusterProperties {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provisioning_state: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub power_state: Option<PowerState>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dns_prefix: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fqdn: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kubernetes_version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent_pool_profiles: Option<Vec<AgentPoolProfile>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service_principal_profile: Option<ServicePrincipalProfile>,
}

/// Agent pool as embedded in a managed cluster, and the properties block of
/// a standalone agent pool resource
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentPoolProfile {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub count: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vm_size: Option<String>,
    #[serde(rename = "osDiskSizeGB", skip_serializing_if = "Option::is_none")]
    pub os_disk_size_gb: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub node_labels: Option<HashMap<String, String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<HashMap<String, String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub orchestrator_version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub availability_zones: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub power_state: Option<PowerState>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provisioning_state: Option<String>,
}

impl AgentPoolProfile {
    pub fn power_code(&self) -> Option<&str> {
        self.power_state.as_ref()?.code.as_deref()
    }

    pub fn first_zone(&self) -> String {
        self.availability_zones
            .as_ref()
            .and_then(|z| z.first().cloned())
            .unwrap_or_default()
    }
}

/// Standalone agent pool resource (`.../managedClusters/{name}/agentPools/{pool}`)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentPool {
    pub properties: AgentPoolProfile,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PowerState {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

impl PowerState {
    pub fn new(code: impl Into<String>) -> Self {
        Self {
            code: Some(code.into()),
        }
    }
}

#[derive(Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServicePrincipalProfile {
    pub client_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secret: Option<String>,
}

impl std::fmt::Debug for ServicePrincipalProfile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServicePrincipalProfile")
            .field("client_id", &self.client_id)
            .field("secret", &self.secret.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManagedClusterList {
    #[serde(default)]
    pub value: Vec<ManagedCluster>,
    pub next_link: Option<String>,
}

/// Result of `listClusterUserCredential`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CredentialResults {
    #[serde(default)]
    pub kubeconfigs: Vec<CredentialResult>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CredentialResult {
    pub name: Option<String>,
    /// Base64-encoded kubeconfig
    pub value: Option<String>,
}
