//! Handlers of the REST API. Each one loads the calling team, delegates to the sandbox service
//! and shapes the result.

use std::time::Duration;

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, HeaderValue, StatusCode},
    response::IntoResponse,
    Json,
};

use super::{
    state::{CallingTeam, ServerState},
    types::{HealthResponse, ListParams, MetadataRequest, RefreshRequest, TimeoutRequest},
};
use crate::{
    lifecycle::{BulkKillSummary, CreateSandboxRequest, ResumeSandboxRequest},
    listing::ListQuery,
    models::{ListedSandbox, Sandbox},
    SandplaneError, SandplaneResult,
};

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

/// The response header carrying the next page's token.
pub const NEXT_TOKEN_HEADER: &str = "x-next-token";

//--------------------------------------------------------------------------------------------------
// Functions: Handlers
//--------------------------------------------------------------------------------------------------

/// Handler for `GET /health`
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
    })
}

/// Handler for `POST /sandboxes`
pub async fn create_handler(
    State(state): State<ServerState>,
    CallingTeam(team): CallingTeam,
    Json(request): Json<CreateSandboxRequest>,
) -> SandplaneResult<(StatusCode, Json<Sandbox>)> {
    tracing::debug!(team_id = %team.id, template = %request.template, "create request");
    let sandbox = state.service().create(&team, request).await?;
    Ok((StatusCode::CREATED, Json(sandbox)))
}

/// Handler for `GET /sandboxes`
pub async fn list_handler(
    State(state): State<ServerState>,
    CallingTeam(team): CallingTeam,
    Query(params): Query<ListParams>,
) -> SandplaneResult<impl IntoResponse> {
    let query = ListQuery {
        states: params.states()?,
        metadata: params.metadata()?,
        limit: params.limit,
        next_token: params.next_token.clone(),
    };

    let page = state.service().list(&team.id, &query).await?;

    let mut headers = HeaderMap::new();
    if let Some(token) = page.next_token {
        let value = HeaderValue::from_str(&token)
            .map_err(|e| SandplaneError::Internal(format!("invalid next token header: {e}")))?;
        headers.insert(NEXT_TOKEN_HEADER, value);
    }

    Ok((headers, Json(page.items)))
}

/// Handler for `GET /sandboxes/{id}`
pub async fn get_handler(
    State(state): State<ServerState>,
    CallingTeam(team): CallingTeam,
    Path(sandbox_id): Path<String>,
) -> SandplaneResult<Json<ListedSandbox>> {
    let sandbox = state.service().get(&team.id, &sandbox_id).await?;
    Ok(Json(sandbox))
}

/// Handler for `DELETE /sandboxes/{id}`
pub async fn kill_handler(
    State(state): State<ServerState>,
    CallingTeam(team): CallingTeam,
    Path(sandbox_id): Path<String>,
) -> SandplaneResult<StatusCode> {
    state.service().kill(&team.id, &sandbox_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Handler for `DELETE /sandboxes`
pub async fn kill_all_handler(
    State(state): State<ServerState>,
    CallingTeam(team): CallingTeam,
) -> Json<BulkKillSummary> {
    Json(state.service().kill_all(&team.id).await)
}

/// Handler for `POST /sandboxes/{id}/pause`
pub async fn pause_handler(
    State(state): State<ServerState>,
    CallingTeam(team): CallingTeam,
    Path(sandbox_id): Path<String>,
) -> SandplaneResult<StatusCode> {
    state.service().pause(&team.id, &sandbox_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Handler for `POST /sandboxes/{id}/resume`
pub async fn resume_handler(
    State(state): State<ServerState>,
    CallingTeam(team): CallingTeam,
    Path(sandbox_id): Path<String>,
    Json(request): Json<ResumeSandboxRequest>,
) -> SandplaneResult<(StatusCode, Json<Sandbox>)> {
    let sandbox = state.service().resume(&team, &sandbox_id, request).await?;
    Ok((StatusCode::CREATED, Json(sandbox)))
}

/// Handler for `POST /sandboxes/{id}/timeout`
///
/// Replaces the deadline, shortening it if asked to.
pub async fn timeout_handler(
    State(state): State<ServerState>,
    CallingTeam(team): CallingTeam,
    Path(sandbox_id): Path<String>,
    Json(request): Json<TimeoutRequest>,
) -> SandplaneResult<StatusCode> {
    state
        .service()
        .keep_alive_for(
            &team,
            &sandbox_id,
            Duration::from_secs(request.timeout),
            true,
        )
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Handler for `POST /sandboxes/{id}/refreshes`
///
/// Extends the deadline; never shortens it.
pub async fn refresh_handler(
    State(state): State<ServerState>,
    CallingTeam(team): CallingTeam,
    Path(sandbox_id): Path<String>,
    Json(request): Json<RefreshRequest>,
) -> SandplaneResult<StatusCode> {
    let service = state.service();
    let duration = request
        .duration
        .map(Duration::from_secs)
        .unwrap_or_else(|| service.get_config().default_sandbox_timeout());

    service
        .keep_alive_for(&team, &sandbox_id, duration, false)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Handler for `PUT /sandboxes/{id}/metadata`
pub async fn metadata_handler(
    State(state): State<ServerState>,
    CallingTeam(team): CallingTeam,
    Path(sandbox_id): Path<String>,
    Json(request): Json<MetadataRequest>,
) -> SandplaneResult<Json<ListedSandbox>> {
    let service = state.service();
    service
        .update_metadata(&team.id, &sandbox_id, request.metadata)
        .await?;

    let sandbox = service.get(&team.id, &sandbox_id).await?;
    Ok(Json(sandbox))
}
