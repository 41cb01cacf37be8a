//! Daemon configuration
//!
//! Read from a KDL file. Every key is optional; anything omitted keeps its
//! built-in default.
//!
//! ```kdl
//! listen "127.0.0.1:8080"
//! request-timeout-secs 1800
//! credentials "/etc/spawner/credentials.json"
//! lro {
//!     poll-interval-ms 5000
//!     max-poll-interval-ms 30000
//! }
//! rate-limit {
//!     capacity 1
//!     refill-per-sec 1
//! }
//! circuit-breaker {
//!     failure-threshold 5
//!     failure-ratio 0.6
//!     min-requests 10
//!     interval-secs 60
//!     open-timeout-secs 60
//!     half-open-max-calls 1
//! }
//! azure {
//!     kubernetes-version "1.29.2"
//!     management-endpoint "https://management.azure.com"
//!     login-endpoint "https://login.microsoftonline.com"
//! }
//! ```

use anyhow::{Context, Result, anyhow, bail};
use kdl::{KdlDocument, KdlNode};
use spawner_cloud_azure::{ArmEndpoints, AzureSettings};
use spawner_service::ServiceConfig;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

pub const CONFIG_ENV: &str = "SPAWNER_CONFIG";

#[derive(Debug, Clone, PartialEq)]
pub struct DaemonConfig {
    pub listen: SocketAddr,
    /// JSON credential store; `None` serves with no accounts
    pub credentials: Option<PathBuf>,
    pub service: ServiceConfig,
    pub azure: AzureConfig,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AzureConfig {
    pub settings: AzureSettings,
    pub endpoints: ArmEndpoints,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            listen: SocketAddr::from(([127, 0, 0, 1], 8080)),
            credentials: None,
            service: ServiceConfig::default(),
            azure: AzureConfig::default(),
        }
    }
}

impl DaemonConfig {
    /// Load from `path`, or fall back to defaults when there is none
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            info!("no config file found, using defaults");
            return Ok(Self::default());
        };

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        let config = parse_config(&content)
            .with_context(|| format!("invalid config {}", path.display()))?;
        info!(path = %path.display(), "loaded config");
        Ok(config)
    }
}

/// Pick the config file to load
///
/// An explicit path (flag or `SPAWNER_CONFIG`) always wins and must exist.
/// Otherwise `<config dir>/spawner/spawnerd.kdl` is used when present.
pub fn discover(explicit: Option<&Path>) -> Result<Option<PathBuf>> {
    if let Some(path) = explicit {
        if !path.exists() {
            bail!("config file {} does not exist", path.display());
        }
        return Ok(Some(path.to_path_buf()));
    }

    let Some(dir) = dirs::config_dir() else {
        return Ok(None);
    };
    let candidate = dir.join("spawner").join("spawnerd.kdl");
    debug!(checking = %candidate.display(), "looking for config");
    Ok(candidate.exists().then_some(candidate))
}

pub fn parse_config(content: &str) -> Result<DaemonConfig> {
    let doc: KdlDocument = content.parse().map_err(|e| anyhow!("{}", e))?;
    let mut config = DaemonConfig::default();

    for node in doc.nodes() {
        match node.name().value() {
            "listen" => {
                let addr = string_arg(node)?;
                config.listen = addr
                    .parse()
                    .with_context(|| format!("listen: invalid address '{}'", addr))?;
            }
            "request-timeout-secs" => {
                config.service.request_timeout = Duration::from_secs(unsigned_arg(node)?);
            }
            "credentials" => {
                config.credentials = Some(PathBuf::from(string_arg(node)?));
            }
            "lro" => parse_lro(node, &mut config.service)?,
            "rate-limit" => parse_rate_limit(node, &mut config.service)?,
            "circuit-breaker" => parse_circuit_breaker(node, &mut config.service)?,
            "azure" => parse_azure(node, &mut config.azure)?,
            other => warn!(key = other, "ignoring unknown config key"),
        }
    }

    Ok(config)
}

fn parse_lro(node: &KdlNode, service: &mut ServiceConfig) -> Result<()> {
    for child in children(node) {
        match child.name().value() {
            "poll-interval-ms" => {
                service.poll.interval = Duration::from_millis(unsigned_arg(child)?);
            }
            "max-poll-interval-ms" => {
                service.poll.max_interval = Duration::from_millis(unsigned_arg(child)?);
            }
            other => warn!(key = other, section = "lro", "ignoring unknown config key"),
        }
    }
    if service.poll.interval.is_zero() {
        bail!("lro: poll-interval-ms must be positive");
    }
    if service.poll.max_interval.is_zero() {
        bail!("lro: max-poll-interval-ms must be positive");
    }
    if service.poll.max_interval < service.poll.interval {
        bail!("lro: max-poll-interval-ms must not be below poll-interval-ms");
    }
    Ok(())
}

fn parse_rate_limit(node: &KdlNode, service: &mut ServiceConfig) -> Result<()> {
    let limit = &mut service.resilience.rate_limit;
    for child in children(node) {
        match child.name().value() {
            "capacity" => limit.capacity = u32::try_from(unsigned_arg(child)?)?,
            "refill-per-sec" => limit.refill_per_sec = number_arg(child)?,
            other => warn!(key = other, section = "rate-limit", "ignoring unknown config key"),
        }
    }
    if limit.capacity == 0 {
        bail!("rate-limit: capacity must be at least 1");
    }
    if !limit.refill_per_sec.is_finite() || limit.refill_per_sec <= 0.0 {
        bail!("rate-limit: refill-per-sec must be a positive number");
    }
    Ok(())
}

fn parse_circuit_breaker(node: &KdlNode, service: &mut ServiceConfig) -> Result<()> {
    let breaker = &mut service.resilience.circuit_breaker;
    for child in children(node) {
        match child.name().value() {
            "failure-threshold" => breaker.failure_threshold = u32::try_from(unsigned_arg(child)?)?,
            "failure-ratio" => {
                let ratio = number_arg(child)?;
                if !(0.0..=1.0).contains(&ratio) {
                    bail!("circuit-breaker: failure-ratio must be within 0..=1");
                }
                breaker.failure_ratio = Some(ratio);
            }
            "min-requests" => breaker.min_requests = u32::try_from(unsigned_arg(child)?)?,
            "interval-secs" => {
                let secs = unsigned_arg(child)?;
                breaker.interval = (secs > 0).then(|| Duration::from_secs(secs));
            }
            "open-timeout-secs" => breaker.open_timeout = Duration::from_secs(unsigned_arg(child)?),
            "half-open-max-calls" => {
                breaker.half_open_max_calls = u32::try_from(unsigned_arg(child)?)?
            }
            other => warn!(
                key = other,
                section = "circuit-breaker",
                "ignoring unknown config key"
            ),
        }
    }
    if breaker.half_open_max_calls == 0 {
        bail!("circuit-breaker: half-open-max-calls must be at least 1");
    }
    Ok(())
}

fn parse_azure(node: &KdlNode, azure: &mut AzureConfig) -> Result<()> {
    for child in children(node) {
        match child.name().value() {
            "kubernetes-version" => azure.settings.kubernetes_version = string_arg(child)?.to_string(),
            "management-endpoint" => azure.endpoints.management = endpoint_arg(child)?,
            "login-endpoint" => azure.endpoints.login = endpoint_arg(child)?,
            other => warn!(key = other, section = "azure", "ignoring unknown config key"),
        }
    }
    Ok(())
}

fn children(node: &KdlNode) -> impl Iterator<Item = &KdlNode> {
    node.children().into_iter().flat_map(|doc| doc.nodes())
}

fn string_arg(node: &KdlNode) -> Result<&str> {
    node.entries()
        .first()
        .and_then(|e| e.value().as_string())
        .ok_or_else(|| anyhow!("{} requires a string value", node.name().value()))
}

fn endpoint_arg(node: &KdlNode) -> Result<String> {
    Ok(string_arg(node)?.trim_end_matches('/').to_string())
}

fn unsigned_arg(node: &KdlNode) -> Result<u64> {
    let value = node
        .entries()
        .first()
        .and_then(|e| e.value().as_integer())
        .ok_or_else(|| anyhow!("{} requires an integer value", node.name().value()))?;
    u64::try_from(value)
        .map_err(|_| anyhow!("{} must not be negative", node.name().value()))
}

fn number_arg(node: &KdlNode) -> Result<f64> {
    let value = node.entries().first().map(|e| e.value());
    value
        .and_then(|v| v.as_float())
        .or_else(|| value.and_then(|v| v.as_integer()).map(|i| i as f64))
        .ok_or_else(|| anyhow!("{} requires a numeric value", node.name().value()))
}
