//! Azure Resource Manager REST client
//!
//! Thin `reqwest` client for the handful of ARM resources the adapter needs.
//! Authentication uses the OAuth2 client-credentials flow against the
//! configured login endpoint; mutations return an [`ArmOperation`] that
//! follows the `Azure-AsyncOperation` or `Location` header until terminal.

use crate::aks::{AgentPool, CredentialResults, ManagedCluster, ManagedClusterList};
use crate::api::{AccessToken, ArmOutcome, ArmPoller, ManagementApi, ResourceScope};
use crate::compute::{Disk, Snapshot};
use crate::error::{AzureError, Result};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, RETRY_AFTER};
use serde::Deserialize;
use spawner_cloud::{Completed, Credential, LongRunningOperation, PollStatus, SpawnerError};
use std::time::Duration;

pub const DEFAULT_MANAGEMENT_ENDPOINT: &str = "https://management.azure.com";
pub const DEFAULT_LOGIN_ENDPOINT: &str = "https://login.microsoftonline.com";

const AKS_API_VERSION: &str = "2024-02-01";
const COMPUTE_API_VERSION: &str = "2023-04-02";

const ASYNC_OPERATION_HEADER: &str = "azure-asyncoperation";
const LOCATION_HEADER: &str = "location";

/// Endpoints of the Azure cloud the client talks to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArmEndpoints {
    pub management: String,
    pub login: String,
}

impl Default for ArmEndpoints {
    fn default() -> Self {
        Self {
            management: DEFAULT_MANAGEMENT_ENDPOINT.to_string(),
            login: DEFAULT_LOGIN_ENDPOINT.to_string(),
        }
    }
}

/// ARM client shared by all calls; holds no per-account state
#[derive(Debug, Clone)]
pub struct ArmClient {
    client: reqwest::Client,
    endpoints: ArmEndpoints,
}

impl Default for ArmClient {
    fn default() -> Self {
        Self::new(ArmEndpoints::default())
    }
}

impl ArmClient {
    pub fn new(endpoints: ArmEndpoints) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoints: ArmEndpoints {
                management: endpoints.management.trim_end_matches('/').to_string(),
                login: endpoints.login.trim_end_matches('/').to_string(),
            },
        }
    }

    pub fn endpoints(&self) -> &ArmEndpoints {
        &self.endpoints
    }

    fn group_url(&self, scope: &ResourceScope) -> String {
        format!(
            "{}/subscriptions/{}/resourceGroups/{}",
            self.endpoints.management, scope.subscription_id, scope.resource_group
        )
    }

    fn cluster_url(&self, scope: &ResourceScope, name: &str) -> String {
        format!(
            "{}/providers/Microsoft.ContainerService/managedClusters/{}",
            self.group_url(scope),
            name
        )
    }

    fn agent_pool_url(&self, scope: &ResourceScope, cluster: &str, pool: &str) -> String {
        format!("{}/agentPools/{}", self.cluster_url(scope, cluster), pool)
    }

    fn disk_url(&self, scope: &ResourceScope, name: &str) -> String {
        format!(
            "{}/providers/Microsoft.Compute/disks/{}",
            self.group_url(scope),
            name
        )
    }

    fn snapshot_url(&self, scope: &ResourceScope, name: &str) -> String {
        format!(
            "{}/providers/Microsoft.Compute/snapshots/{}",
            self.group_url(scope),
            name
        )
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        token: &AccessToken,
        url: &str,
    ) -> Result<T> {
        let response = self.client.get(url).bearer_auth(&token.token).send().await?;
        let response = check_status(response).await?;
        Ok(response.json().await?)
    }

    /// Send a mutation and wrap the response in a poller
    async fn submit(
        &self,
        token: &AccessToken,
        request: reqwest::RequestBuilder,
        final_url: Option<String>,
    ) -> Result<ArmPoller> {
        let response = request.bearer_auth(&token.token).send().await?;
        let response = check_status(response).await?;
        let status = response.status().as_u16();

        if status == 204 {
            return Ok(Box::new(Completed::new(ArmOutcome::no_content())));
        }

        let headers = response.headers();
        let target = header_str(headers, ASYNC_OPERATION_HEADER)
            .map(PollTarget::AsyncOperation)
            .or_else(|| header_str(headers, LOCATION_HEADER).map(PollTarget::Location));
        let retry_hint = retry_after(headers);

        let body = read_body(response).await?;
        match target {
            Some(target) if status == 201 || status == 202 || status == 200 => {
                tracing::debug!(status, "ARM operation accepted");
                Ok(Box::new(ArmOperation {
                    client: self.client.clone(),
                    token: token.clone(),
                    submitted: status,
                    target,
                    final_url,
                    retry_hint,
                }))
            }
            _ => Ok(Box::new(Completed::new(ArmOutcome { status, body }))),
        }
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Debug, Default, Deserialize)]
struct TokenErrorResponse {
    #[serde(default)]
    error: String,
    #[serde(default)]
    error_description: String,
}

#[derive(Debug, Default, Deserialize)]
struct ArmErrorEnvelope {
    error: Option<ArmErrorBody>,
}

#[derive(Debug, Default, Deserialize)]
struct ArmErrorBody {
    #[serde(default)]
    code: String,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct AsyncOperationStatus {
    status: String,
    error: Option<ArmErrorBody>,
}

#[async_trait]
impl ManagementApi for ArmClient {
    async fn authenticate(&self, cred: &Credential) -> Result<AccessToken> {
        if cred.tenant_id.is_empty() {
            return Err(AzureError::TokenRejected {
                account: cred.account_name.clone(),
                message: "tenantId is not set for this account".to_string(),
            });
        }

        let url = format!("{}/{}/oauth2/v2.0/token", self.endpoints.login, cred.tenant_id);
        let scope = format!("{}/.default", self.endpoints.management);
        let response = self
            .client
            .post(&url)
            .form(&[
                ("grant_type", "client_credentials"),
                ("client_id", cred.client_id.as_str()),
                ("client_secret", cred.client_secret.as_str()),
                ("scope", scope.as_str()),
            ])
            .send()
            .await?;

        let status = response.status();
        if status.is_server_error() {
            let text = response.text().await.unwrap_or_default();
            return Err(AzureError::Api {
                status: status.as_u16(),
                code: "TokenEndpointUnavailable".to_string(),
                message: text,
            });
        }
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let err: TokenErrorResponse = serde_json::from_str(&text).unwrap_or_default();
            let message = if err.error_description.is_empty() {
                format!("{} {}", status.as_u16(), err.error)
            } else {
                err.error_description
            };
            tracing::warn!(account = %cred.account_name, "token request rejected");
            return Err(AzureError::TokenRejected {
                account: cred.account_name.clone(),
                message,
            });
        }

        let token: TokenResponse = response.json().await?;
        Ok(AccessToken {
            token: token.access_token,
        })
    }

    async fn create_or_update_cluster(
        &self,
        token: &AccessToken,
        scope: &ResourceScope,
        name: &str,
        cluster: &ManagedCluster,
    ) -> Result<ArmPoller> {
        let url = self.cluster_url(scope, name);
        let request = self
            .client
            .put(&url)
            .query(&[("api-version", AKS_API_VERSION)])
            .json(cluster);
        self.submit(token, request, Some(versioned(&url, AKS_API_VERSION)))
            .await
    }

    async fn get_cluster(
        &self,
        token: &AccessToken,
        scope: &ResourceScope,
        name: &str,
    ) -> Result<ManagedCluster> {
        let url = versioned(&self.cluster_url(scope, name), AKS_API_VERSION);
        self.get_json(token, &url).await
    }

    async fn list_clusters(
        &self,
        token: &AccessToken,
        scope: &ResourceScope,
    ) -> Result<Vec<ManagedCluster>> {
        let first = versioned(
            &format!(
                "{}/providers/Microsoft.ContainerService/managedClusters",
                self.group_url(scope)
            ),
            AKS_API_VERSION,
        );

        let mut clusters = Vec::new();
        let mut next = Some(first);
        while let Some(url) = next.take() {
            let page: ManagedClusterList = self.get_json(token, &url).await?;
            clusters.extend(page.value);
            next = page.next_link.filter(|link| !link.is_empty());
        }
        Ok(clusters)
    }

    async fn delete_cluster(
        &self,
        token: &AccessToken,
        scope: &ResourceScope,
        name: &str,
    ) -> Result<ArmPoller> {
        let request = self
            .client
            .delete(self.cluster_url(scope, name))
            .query(&[("api-version", AKS_API_VERSION)]);
        self.submit(token, request, None).await
    }

    async fn create_or_update_agent_pool(
        &self,
        token: &AccessToken,
        scope: &ResourceScope,
        cluster: &str,
        pool: &str,
        body: &AgentPool,
    ) -> Result<ArmPoller> {
        let url = self.agent_pool_url(scope, cluster, pool);
        let request = self
            .client
            .put(&url)
            .query(&[("api-version", AKS_API_VERSION)])
            .json(body);
        self.submit(token, request, Some(versioned(&url, AKS_API_VERSION)))
            .await
    }

    async fn delete_agent_pool(
        &self,
        token: &AccessToken,
        scope: &ResourceScope,
        cluster: &str,
        pool: &str,
    ) -> Result<ArmPoller> {
        let request = self
            .client
            .delete(self.agent_pool_url(scope, cluster, pool))
            .query(&[("api-version", AKS_API_VERSION)]);
        self.submit(token, request, None).await
    }

    async fn list_cluster_user_credentials(
        &self,
        token: &AccessToken,
        scope: &ResourceScope,
        cluster: &str,
    ) -> Result<CredentialResults> {
        let url = format!("{}/listClusterUserCredential", self.cluster_url(scope, cluster));
        let response = self
            .client
            .post(&url)
            .query(&[("api-version", AKS_API_VERSION)])
            .bearer_auth(&token.token)
            .send()
            .await?;
        let response = check_status(response).await?;
        Ok(response.json().await?)
    }

    async fn create_disk(
        &self,
        token: &AccessToken,
        scope: &ResourceScope,
        name: &str,
        disk: &Disk,
    ) -> Result<ArmPoller> {
        let url = self.disk_url(scope, name);
        let request = self
            .client
            .put(&url)
            .query(&[("api-version", COMPUTE_API_VERSION)])
            .json(disk);
        self.submit(token, request, Some(versioned(&url, COMPUTE_API_VERSION)))
            .await
    }

    async fn get_disk(
        &self,
        token: &AccessToken,
        scope: &ResourceScope,
        name: &str,
    ) -> Result<Disk> {
        let url = versioned(&self.disk_url(scope, name), COMPUTE_API_VERSION);
        self.get_json(token, &url).await
    }

    async fn delete_disk(
        &self,
        token: &AccessToken,
        scope: &ResourceScope,
        name: &str,
    ) -> Result<ArmPoller> {
        let request = self
            .client
            .delete(self.disk_url(scope, name))
            .query(&[("api-version", COMPUTE_API_VERSION)]);
        self.submit(token, request, None).await
    }

    async fn create_snapshot(
        &self,
        token: &AccessToken,
        scope: &ResourceScope,
        name: &str,
        snapshot: &Snapshot,
    ) -> Result<ArmPoller> {
        let url = self.snapshot_url(scope, name);
        let request = self
            .client
            .put(&url)
            .query(&[("api-version", COMPUTE_API_VERSION)])
            .json(snapshot);
        self.submit(token, request, Some(versioned(&url, COMPUTE_API_VERSION)))
            .await
    }
}

/// Where an accepted operation reports progress
#[derive(Debug, Clone, PartialEq, Eq)]
enum PollTarget {
    AsyncOperation(String),
    Location(String),
}

/// In-flight ARM mutation
pub struct ArmOperation {
    client: reqwest::Client,
    token: AccessToken,
    submitted: u16,
    target: PollTarget,
    /// Resource URL fetched once the operation succeeds (PUT only)
    final_url: Option<String>,
    retry_hint: Option<Duration>,
}

impl ArmOperation {
    async fn poll_once(&mut self) -> Result<PollStatus<ArmOutcome>> {
        match self.target.clone() {
            PollTarget::AsyncOperation(url) => {
                let response = self
                    .client
                    .get(&url)
                    .bearer_auth(&self.token.token)
                    .send()
                    .await?;
                let response = check_status(response).await?;
                if let Some(hint) = retry_after(response.headers()) {
                    self.retry_hint = Some(hint);
                }
                let status: AsyncOperationStatus = response.json().await?;

                match status.status.as_str() {
                    "Succeeded" => Ok(PollStatus::Succeeded(self.final_outcome(None).await?)),
                    "Failed" => Ok(PollStatus::Failed(describe(status.error, "Failed"))),
                    "Canceled" => Ok(PollStatus::Canceled(describe(status.error, "Canceled"))),
                    _ => Ok(PollStatus::InProgress(self.retry_hint)),
                }
            }
            PollTarget::Location(url) => {
                let response = self
                    .client
                    .get(&url)
                    .bearer_auth(&self.token.token)
                    .send()
                    .await?;
                let response = check_status(response).await?;
                if response.status().as_u16() == 202 {
                    if let Some(hint) = retry_after(response.headers()) {
                        self.retry_hint = Some(hint);
                    }
                    return Ok(PollStatus::InProgress(self.retry_hint));
                }
                let body = read_body(response).await?;
                Ok(PollStatus::Succeeded(self.final_outcome(body).await?))
            }
        }
    }

    async fn final_outcome(&self, body: Option<serde_json::Value>) -> Result<ArmOutcome> {
        let body = match &self.final_url {
            Some(url) => {
                let response = self
                    .client
                    .get(url)
                    .bearer_auth(&self.token.token)
                    .send()
                    .await?;
                read_body(check_status(response).await?).await?
            }
            None => body,
        };
        Ok(ArmOutcome {
            status: self.submitted,
            body,
        })
    }
}

#[async_trait]
impl LongRunningOperation for ArmOperation {
    type Output = ArmOutcome;

    async fn poll(&mut self) -> spawner_cloud::Result<PollStatus<ArmOutcome>> {
        self.poll_once().await.map_err(SpawnerError::from)
    }
}

fn versioned(url: &str, api_version: &str) -> String {
    format!("{}?api-version={}", url, api_version)
}

fn header_str(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Parse a `Retry-After` header given in whole seconds
pub(crate) fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

fn describe(error: Option<ArmErrorBody>, fallback: &str) -> String {
    match error {
        Some(e) if !e.code.is_empty() || !e.message.is_empty() => {
            format!("{}: {}", e.code, e.message)
        }
        _ => fallback.to_string(),
    }
}

async fn read_body(response: reqwest::Response) -> Result<Option<serde_json::Value>> {
    let text = response.text().await?;
    if text.trim().is_empty() {
        return Ok(None);
    }
    Ok(Some(serde_json::from_str(&text)?))
}

/// Turn a non-success response into an [`AzureError::Api`]
async fn check_status(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let text = response.text().await.unwrap_or_default();
    Err(parse_arm_error(status.as_u16(), &text))
}

pub(crate) fn parse_arm_error(status: u16, body: &str) -> AzureError {
    let envelope: ArmErrorEnvelope = serde_json::from_str(body).unwrap_or_default();
    match envelope.error {
        Some(e) => AzureError::Api {
            status,
            code: e.code,
            message: e.message,
        },
        None => AzureError::Api {
            status,
            code: format!("Http{}", status),
            message: body.trim().to_string(),
        },
    }
}
