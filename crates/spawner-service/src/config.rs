//! Service runtime settings

use crate::registry::ResilienceConfig;
use spawner_cloud::PollConfig;
use std::time::Duration;

/// Default upper bound on a single call, long enough for AKS provisioning
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30 * 60);

#[derive(Debug, Clone, PartialEq)]
pub struct ServiceConfig {
    pub request_timeout: Duration,
    pub poll: PollConfig,
    pub resilience: ResilienceConfig,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            poll: PollConfig::default(),
            resilience: ResilienceConfig::default(),
        }
    }
}
