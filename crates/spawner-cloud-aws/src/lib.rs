//! AWS provider for Spawner
//!
//! Placeholder adapter registered under `aws`. It satisfies the full
//! [`spawner_cloud::ClusterController`] surface and answers every call with
//! `NotImplemented` until an EKS/EBS backend lands.

pub mod provider;

pub use provider::AwsController;
