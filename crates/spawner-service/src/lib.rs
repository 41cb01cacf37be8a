//! Spawner service core
//!
//! Wires provider adapters behind a single facade and guards every canonical
//! operation with its own rate limiter and circuit breaker.
//!
//! ```text
//! caller ─▶ EndpointSet ─▶ rate limiter ─▶ circuit breaker ─▶ Spawner ─▶ adapter
//!                          (per operation)  (per operation)   (facade)
//! ```

pub mod config;
pub mod credentials;
pub mod endpoint;
pub mod facade;
pub mod registry;
pub mod resilience;

pub use config::{DEFAULT_REQUEST_TIMEOUT, ServiceConfig};
pub use credentials::{FileCredentialResolver, StaticCredentialResolver};
pub use endpoint::EndpointSet;
pub use facade::Spawner;
pub use registry::{OperationKind, ResilienceConfig, ResiliencePolicies};
pub use resilience::{CircuitBreakerConfig, CircuitState, RateLimitConfig};
