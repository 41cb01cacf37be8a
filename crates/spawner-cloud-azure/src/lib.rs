//! Azure provider for Spawner
//!
//! Implements [`spawner_cloud::ClusterController`] on top of Azure Resource
//! Manager: AKS managed clusters and agent pools, managed disks and
//! snapshots, and cluster user credentials.
//!
//! # Requirements
//!
//! - A service principal per account (client id, secret, tenant id)
//! - Subscription and resource group set on the resolved credential
//!
//! # Example
//!
//! ```ignore
//! use spawner_cloud::{CallContext, LroBridge};
//! use spawner_cloud_azure::{ArmEndpoints, AzureController, AzureSettings};
//!
//! let azure = AzureController::new(
//!     ArmEndpoints::default(),
//!     LroBridge::default(),
//!     AzureSettings::default(),
//! );
//! let status = azure.cluster_status(&CallContext::new(), &cred, &req).await?;
//! ```

pub mod aks;
pub mod api;
pub mod arm;
pub mod compute;
pub mod error;
pub mod kubeconfig;
pub mod provider;

pub use api::{AccessToken, ArmOutcome, ArmPoller, ManagementApi, ResourceScope};
pub use arm::{ArmClient, ArmEndpoints, DEFAULT_LOGIN_ENDPOINT, DEFAULT_MANAGEMENT_ENDPOINT};
pub use error::{AzureError, Result};
pub use provider::{AzureController, AzureSettings, DEFAULT_KUBERNETES_VERSION};
