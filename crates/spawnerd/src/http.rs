//! JSON-over-HTTP surface
//!
//! One `POST /v1/<operation>` route per canonical operation. Request and
//! response bodies are the canonical JSON shapes; failures answer with
//! `{"kind": ..., "message": ...}` and a status derived from the error kind.

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use spawner_cloud::*;
use spawner_service::{EndpointSet, OperationKind};
use std::collections::BTreeMap;

/// Error response carrying a canonical error
#[derive(Debug)]
pub struct ApiError(SpawnerError);

impl From<SpawnerError> for ApiError {
    fn from(err: SpawnerError) -> Self {
        Self(err)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self(SpawnerError::InvalidRequest(rejection.body_text()))
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    kind: ErrorKind,
    message: String,
}

pub fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::InvalidRequest | ErrorKind::UnknownProvider => StatusCode::BAD_REQUEST,
        ErrorKind::CredentialResolutionFailed => StatusCode::UNAUTHORIZED,
        ErrorKind::ResourceNotFound => StatusCode::NOT_FOUND,
        ErrorKind::ProviderRejected => StatusCode::UNPROCESSABLE_ENTITY,
        ErrorKind::RateLimited => StatusCode::TOO_MANY_REQUESTS,
        ErrorKind::NotImplemented => StatusCode::NOT_IMPLEMENTED,
        ErrorKind::ProviderUnavailable => StatusCode::BAD_GATEWAY,
        ErrorKind::CircuitOpen => StatusCode::SERVICE_UNAVAILABLE,
        ErrorKind::OperationCanceled => StatusCode::GATEWAY_TIMEOUT,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let kind = self.0.kind();
        let body = ErrorBody {
            kind,
            message: self.0.to_string(),
        };
        (status_for(kind), Json(body)).into_response()
    }
}

#[derive(Debug, Serialize)]
struct HealthReport {
    providers: Vec<Provider>,
    breakers: BTreeMap<&'static str, String>,
}

async fn health(State(endpoints): State<EndpointSet>) -> Json<HealthReport> {
    let breakers = OperationKind::ALL
        .into_iter()
        .map(|kind| (kind.as_str(), endpoints.policies().breaker_state(kind).to_string()))
        .collect();
    Json(HealthReport {
        providers: endpoints.spawner().providers(),
        breakers,
    })
}

macro_rules! routes {
    ($($op:ident($req:ty) -> $resp:ty => $kind:ident;)*) => {
        $(
            async fn $op(
                State(endpoints): State<EndpointSet>,
                payload: std::result::Result<Json<$req>, JsonRejection>,
            ) -> std::result::Result<Json<$resp>, ApiError> {
                let Json(req) = payload?;
                // A dropped connection drops this future, which abandons any
                // in-flight provider wait.
                let ctx = CallContext::new();
                Ok(Json(endpoints.$op(&ctx, &req).await?))
            }
        )*

        /// Build the router serving every operation
        pub fn router(endpoints: EndpointSet) -> Router {
            Router::new()
                $(.route(&format!("/v1/{}", OperationKind::$kind.as_str()), post($op)))*
                .route("/health", get(health))
                .with_state(endpoints)
        }
    };
}

routes! {
    create_cluster(ClusterRequest) -> ClusterResponse => CreateCluster;
    get_cluster(GetClusterRequest) -> ClusterSpec => GetCluster;
    get_clusters(GetClustersRequest) -> GetClustersResponse => GetClusters;
    cluster_status(ClusterStatusRequest) -> ClusterStatusResponse => ClusterStatus;
    add_node(NodeSpawnRequest) -> NodeSpawnResponse => AddNode;
    delete_node(NodeDeleteRequest) -> NodeDeleteResponse => DeleteNode;
    delete_cluster(ClusterDeleteRequest) -> ClusterDeleteResponse => DeleteCluster;
    create_volume(CreateVolumeRequest) -> CreateVolumeResponse => CreateVolume;
    delete_volume(DeleteVolumeRequest) -> DeleteVolumeResponse => DeleteVolume;
    create_snapshot(CreateSnapshotRequest) -> CreateSnapshotResponse => CreateSnapshot;
    create_snapshot_and_delete(CreateSnapshotAndDeleteRequest) -> CreateSnapshotAndDeleteResponse => CreateSnapshotAndDelete;
    get_token(GetTokenRequest) -> GetTokenResponse => GetToken;
    add_token(AddTokenRequest) -> AddTokenResponse => AddToken;
}
