//! Spawner Cloud Abstraction
//!
//! Provider-agnostic building blocks shared by every Spawner crate: the
//! canonical request/response model, the error taxonomy, the call context,
//! the long-running operation bridge, and the traits provider adapters and
//! credential stores implement.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────┐
//! │                spawner-service                   │
//! │     (resilience middleware + facade dispatch)    │
//! └─────────────────┬───────────────────────────────┘
//!                   │
//! ┌─────────────────▼───────────────────────────────┐
//! │                 spawner-cloud                    │
//! │  ┌──────────────────────────────────────────┐   │
//! │  │          Provider Abstraction             │   │
//! │  │  trait ClusterController { ... }          │   │
//! │  └──────────────────────────────────────────┘   │
//! │  ┌──────────────┐  ┌──────────────┐            │
//! │  │ Canonical    │  │  LRO Bridge  │            │
//! │  │ model        │  │              │            │
//! │  └──────────────┘  └──────────────┘            │
//! └───────┬─────────────────┬───────────────────────┘
//!         │                 │
//! ┌───────▼───────┐ ┌───────▼───────┐
//! │  azure (AKS)  │ │  aws (stub)   │
//! │   adapter     │ │   adapter     │
//! └───────────────┘ └───────────────┘
//! ```

pub mod context;
pub mod error;
pub mod labels;
pub mod model;
pub mod operation;
pub mod provider;

// Re-exports
pub use context::CallContext;
pub use error::{ErrorKind, Result, SpawnerError};
pub use model::*;
pub use operation::{
    Completed, LongRunningOperation, LroBridge, OperationState, PollConfig, PollStatus,
};
pub use provider::{ClusterController, Credential, CredentialResolver};
