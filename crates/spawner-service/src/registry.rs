//! Operation kinds and their resilience policies
//!
//! Built once at startup; every operation kind owns one rate limiter and one
//! circuit breaker for the lifetime of the process.

use crate::resilience::{
    CircuitBreaker, CircuitBreakerConfig, CircuitState, RateLimitConfig, RateLimitResult,
    RateLimiter,
};
use spawner_cloud::{Result, SpawnerError};
use std::future::Future;

/// Canonical operations exposed by the service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    CreateCluster,
    GetCluster,
    GetClusters,
    ClusterStatus,
    AddNode,
    DeleteNode,
    DeleteCluster,
    CreateVolume,
    DeleteVolume,
    CreateSnapshot,
    CreateSnapshotAndDelete,
    GetToken,
    AddToken,
}

impl OperationKind {
    pub const ALL: [OperationKind; 13] = [
        OperationKind::CreateCluster,
        OperationKind::GetCluster,
        OperationKind::GetClusters,
        OperationKind::ClusterStatus,
        OperationKind::AddNode,
        OperationKind::DeleteNode,
        OperationKind::DeleteCluster,
        OperationKind::CreateVolume,
        OperationKind::DeleteVolume,
        OperationKind::CreateSnapshot,
        OperationKind::CreateSnapshotAndDelete,
        OperationKind::GetToken,
        OperationKind::AddToken,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::CreateCluster => "create_cluster",
            OperationKind::GetCluster => "get_cluster",
            OperationKind::GetClusters => "get_clusters",
            OperationKind::ClusterStatus => "cluster_status",
            OperationKind::AddNode => "add_node",
            OperationKind::DeleteNode => "delete_node",
            OperationKind::DeleteCluster => "delete_cluster",
            OperationKind::CreateVolume => "create_volume",
            OperationKind::DeleteVolume => "delete_volume",
            OperationKind::CreateSnapshot => "create_snapshot",
            OperationKind::CreateSnapshotAndDelete => "create_snapshot_and_delete",
            OperationKind::GetToken => "get_token",
            OperationKind::AddToken => "add_token",
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

impl std::fmt::Display for OperationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Settings applied to every operation's policy pair
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResilienceConfig {
    pub rate_limit: RateLimitConfig,
    pub circuit_breaker: CircuitBreakerConfig,
}

/// Rate limiter and breaker guarding one operation kind
#[derive(Debug)]
pub struct OperationPolicy {
    pub limiter: RateLimiter,
    pub breaker: CircuitBreaker,
}

#[derive(Debug)]
pub struct ResiliencePolicies {
    policies: Vec<OperationPolicy>,
}

impl Default for ResiliencePolicies {
    fn default() -> Self {
        Self::new(&ResilienceConfig::default())
    }
}

impl ResiliencePolicies {
    pub fn new(config: &ResilienceConfig) -> Self {
        let policies = OperationKind::ALL
            .iter()
            .map(|kind| OperationPolicy {
                limiter: RateLimiter::new(config.rate_limit.clone()),
                breaker: CircuitBreaker::new(kind.as_str(), config.circuit_breaker.clone()),
            })
            .collect();
        Self { policies }
    }

    pub fn policy(&self, kind: OperationKind) -> &OperationPolicy {
        &self.policies[kind.index()]
    }

    pub fn breaker_state(&self, kind: OperationKind) -> CircuitState {
        self.policy(kind).breaker.state()
    }

    /// Run `fut` behind the operation's rate limiter, then its breaker.
    ///
    /// `fut` is not polled at all when either layer rejects the call.
    pub async fn guard<T, F>(&self, kind: OperationKind, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        let policy = self.policy(kind);
        if let RateLimitResult::RateLimited { retry_after } = policy.limiter.check() {
            tracing::debug!(operation = %kind, ?retry_after, "rate limited");
            return Err(SpawnerError::RateLimited(kind.to_string()));
        }
        policy.breaker.call(fut).await
    }
}
