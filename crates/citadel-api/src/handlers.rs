//! REST endpoint handlers for the HTTP bridge.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET` | `/api/health` | Liveness, claim count, registry state |
//! | `POST` | `/api/events` | Decide a host event |
//! | `POST` | `/api/claims` | Create a claim |
//! | `GET` | `/api/claims/{id}` | Fetch a claim |
//! | `DELETE` | `/api/claims/{id}?actor=` | Remove a claim |
//! | `POST` | `/api/claims/{id}/reinforce` | Re-reinforce a claim |
//! | `PUT` | `/api/claims/{id}/access` | Set a subject's permissions |
//! | `DELETE` | `/api/claims/{id}/access` | Revoke a subject |
//! | `PUT` | `/api/claims/{id}/insecure` | Toggle automation access |
//! | `GET` | `/api/claims/{id}/audit` | Recent audit entries |
//! | `GET` | `/api/lookup` | Claim at a block |
//! | `GET` | `/api/region` | Claims intersecting a box |
//! | `GET` | `/api/chunks` | Chunks holding stored claims |
//! | `POST` | `/api/chunks/load` | Index the stored claims of one chunk |
//! | `PUT` | `/api/groups/{id}/members` | Replace a group's members |
//! | `DELETE` | `/api/groups/{id}` | Forget a group |
//! | `PUT` | `/api/groups/availability` | Mark the group mirror (un)available |

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use citadel_core::NewClaim;
use citadel_types::{
    AccessSubject, BlockPos, Bounds, ChunkPos, ClaimId, GroupId, HostEvent, PermissionSet,
    PlayerId, WorldId,
};
use uuid::Uuid;

use crate::error::ApiError;
use crate::state::AppState;

/// Audit entries returned when no `limit` is given.
const DEFAULT_AUDIT_LIMIT: u32 = 50;

/// Upper bound on `limit` for the audit endpoint.
const MAX_AUDIT_LIMIT: u32 = 1000;

// ---------------------------------------------------------------------------
// Request bodies and query parameters
// ---------------------------------------------------------------------------

/// Query parameters naming the acting player.
#[derive(Debug, serde::Deserialize)]
pub struct ActorQuery {
    /// Player UUID.
    pub actor: String,
}

/// Body of `POST /api/claims/{id}/reinforce`.
#[derive(Debug, serde::Deserialize)]
pub struct ReinforceRequest {
    /// The player reinforcing.
    pub actor: PlayerId,
    /// Reinforcement material to apply.
    pub reinforcement_type: u16,
}

/// Body of `PUT /api/claims/{id}/access`.
#[derive(Debug, serde::Deserialize)]
pub struct SetAccessRequest {
    /// The player making the change.
    pub actor: PlayerId,
    /// Group or player receiving the record.
    pub subject: AccessSubject,
    /// Flags to grant. Omitted flags are denied.
    pub permissions: PermissionSet,
}

/// Body of `DELETE /api/claims/{id}/access`.
#[derive(Debug, serde::Deserialize)]
pub struct RevokeAccessRequest {
    /// The player making the change.
    pub actor: PlayerId,
    /// Group or player losing its record.
    pub subject: AccessSubject,
}

/// Body of `PUT /api/claims/{id}/insecure`.
#[derive(Debug, serde::Deserialize)]
pub struct InsecureRequest {
    /// The player making the change.
    pub actor: PlayerId,
    /// Whether host automation may reach the claim's containers.
    pub insecure: bool,
}

/// Query parameters for `GET /api/claims/{id}/audit`.
#[derive(Debug, serde::Deserialize)]
pub struct AuditQuery {
    /// Maximum entries to return (default 50, max 1000).
    pub limit: Option<u32>,
}

/// Query parameters for `GET /api/lookup`.
#[derive(Debug, serde::Deserialize)]
pub struct LookupQuery {
    /// World ID.
    pub world: u16,
    /// Block x.
    pub x: i32,
    /// Block y.
    pub y: i32,
    /// Block z.
    pub z: i32,
}

/// Query parameters for `GET /api/region`. Corners may be given in any
/// order.
#[derive(Debug, serde::Deserialize)]
pub struct RegionQuery {
    /// World ID.
    pub world: u16,
    /// First corner x.
    pub min_x: i32,
    /// First corner y.
    pub min_y: i32,
    /// First corner z.
    pub min_z: i32,
    /// Opposite corner x.
    pub max_x: i32,
    /// Opposite corner y.
    pub max_y: i32,
    /// Opposite corner z.
    pub max_z: i32,
}

/// Body of `POST /api/chunks/load`.
#[derive(Debug, serde::Deserialize)]
pub struct ChunkRequest {
    /// World ID.
    pub world: u16,
    /// Chunk column x (block x >> 4).
    pub x: i32,
    /// Chunk column z (block z >> 4).
    pub z: i32,
}

/// Body of `PUT /api/groups/{id}/members`.
#[derive(Debug, serde::Deserialize)]
pub struct GroupMembersRequest {
    /// The complete member list, replacing any previous one.
    pub members: Vec<PlayerId>,
}

/// Body of `PUT /api/groups/availability`.
#[derive(Debug, serde::Deserialize)]
pub struct AvailabilityRequest {
    /// Whether membership lookups may be answered.
    pub available: bool,
}

// ---------------------------------------------------------------------------
// Health
// ---------------------------------------------------------------------------

/// Liveness check with the current claim count.
pub async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "claims": state.service.index().len(),
        "registry_available": state.registry.is_available(),
        "pending_damage": state.gateway.pending_background(),
    }))
}

// ---------------------------------------------------------------------------
// Host events
// ---------------------------------------------------------------------------

/// Decide a host event within the gateway's time budget.
pub async fn decide_event(
    State(state): State<Arc<AppState>>,
    Json(event): Json<HostEvent>,
) -> impl IntoResponse {
    Json(state.gateway.handle(&event).await)
}

// ---------------------------------------------------------------------------
// Claims
// ---------------------------------------------------------------------------

/// Create and reinforce a new claim.
pub async fn create_claim(
    State(state): State<Arc<AppState>>,
    Json(request): Json<NewClaim>,
) -> Result<impl IntoResponse, ApiError> {
    let claim = state.service.create_claim(request).await?;
    Ok((StatusCode::CREATED, Json(claim)))
}

/// Fetch one claim.
pub async fn get_claim(
    State(state): State<Arc<AppState>>,
    Path(id_str): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let id = ClaimId::from(parse_uuid(&id_str)?);
    Ok(Json(state.service.get(id)?))
}

/// Remove a claim on behalf of `actor`.
pub async fn remove_claim(
    State(state): State<Arc<AppState>>,
    Path(id_str): Path<String>,
    Query(params): Query<ActorQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let id = ClaimId::from(parse_uuid(&id_str)?);
    let actor = PlayerId::from(parse_uuid(&params.actor)?);
    state.service.remove_claim(id, actor).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Re-reinforce a claim, restoring full health.
pub async fn reinforce_claim(
    State(state): State<Arc<AppState>>,
    Path(id_str): Path<String>,
    Json(request): Json<ReinforceRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let id = ClaimId::from(parse_uuid(&id_str)?);
    let claim = state
        .service
        .reinforce(id, request.actor, request.reinforcement_type)
        .await?;
    Ok(Json(claim))
}

/// Grant a subject a set of permissions.
pub async fn set_access(
    State(state): State<Arc<AppState>>,
    Path(id_str): Path<String>,
    Json(request): Json<SetAccessRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let id = ClaimId::from(parse_uuid(&id_str)?);
    let claim = state
        .service
        .set_access(id, request.actor, request.subject, request.permissions)
        .await?;
    Ok(Json(claim))
}

/// Remove a subject's access record.
pub async fn revoke_access(
    State(state): State<Arc<AppState>>,
    Path(id_str): Path<String>,
    Json(request): Json<RevokeAccessRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let id = ClaimId::from(parse_uuid(&id_str)?);
    let claim = state
        .service
        .revoke_access(id, request.actor, request.subject)
        .await?;
    Ok(Json(claim))
}

/// Open or close a claim's containers to host automation.
pub async fn set_insecure(
    State(state): State<Arc<AppState>>,
    Path(id_str): Path<String>,
    Json(request): Json<InsecureRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let id = ClaimId::from(parse_uuid(&id_str)?);
    let claim = state
        .service
        .set_insecure(id, request.actor, request.insecure)
        .await?;
    Ok(Json(claim))
}

/// Recent audit entries for a claim, newest first.
pub async fn claim_audit(
    State(state): State<Arc<AppState>>,
    Path(id_str): Path<String>,
    Query(params): Query<AuditQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let id = ClaimId::from(parse_uuid(&id_str)?);
    let limit = params
        .limit
        .unwrap_or(DEFAULT_AUDIT_LIMIT)
        .min(MAX_AUDIT_LIMIT);
    let entries = state.service.audit_for_claim(id, limit).await?;

    Ok(Json(serde_json::json!({
        "count": entries.len(),
        "entries": entries,
    })))
}

// ---------------------------------------------------------------------------
// Spatial queries
// ---------------------------------------------------------------------------

/// The claim containing a block, or `null`.
pub async fn lookup(
    State(state): State<Arc<AppState>>,
    Query(params): Query<LookupQuery>,
) -> impl IntoResponse {
    let pos = BlockPos::new(WorldId(params.world), params.x, params.y, params.z);
    Json(serde_json::json!({
        "position": pos,
        "claim": state.service.lookup(&pos),
    }))
}

/// Every claim intersecting a box.
pub async fn region(
    State(state): State<Arc<AppState>>,
    Query(params): Query<RegionQuery>,
) -> impl IntoResponse {
    let bounds = Bounds::new(
        WorldId(params.world),
        (params.min_x, params.min_y, params.min_z),
        (params.max_x, params.max_y, params.max_z),
    );
    let claims = state.service.region(&bounds);

    Json(serde_json::json!({
        "count": claims.len(),
        "claims": claims,
    }))
}

/// Chunks holding stored claims, so the host can preload them.
pub async fn populated_chunks(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ApiError> {
    let chunks = state.service.populated_chunks().await?;
    Ok(Json(serde_json::json!({
        "count": chunks.len(),
        "chunks": chunks,
    })))
}

/// Index the stored claims touching one chunk. Called by the host when a
/// chunk is loaded.
pub async fn load_chunk(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ChunkRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let chunk = ChunkPos::new(WorldId(request.world), request.x, request.z);
    let loaded = state.service.load_chunk(chunk).await?;
    Ok(Json(serde_json::json!({
        "chunk": chunk,
        "loaded": loaded,
    })))
}

// ---------------------------------------------------------------------------
// Group sync
// ---------------------------------------------------------------------------

/// Replace a group's member list.
pub async fn sync_group_members(
    State(state): State<Arc<AppState>>,
    Path(id_str): Path<String>,
    Json(request): Json<GroupMembersRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let group = GroupId::from(parse_uuid(&id_str)?);
    let count = request.members.len();
    state.registry.set_members(group, request.members);
    tracing::debug!(%group, members = count, "Group membership synced");
    Ok(StatusCode::NO_CONTENT)
}

/// Forget a deleted group.
pub async fn delete_group(
    State(state): State<Arc<AppState>>,
    Path(id_str): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let group = GroupId::from(parse_uuid(&id_str)?);
    if !state.registry.remove_group(group) {
        return Err(ApiError::NotFound(format!("group {group}")));
    }
    tracing::info!(%group, "Group removed from membership mirror");
    Ok(StatusCode::NO_CONTENT)
}

/// Mark the membership mirror as synced (or not). While unavailable,
/// every claimed check that needs a group lookup is denied.
pub async fn set_availability(
    State(state): State<Arc<AppState>>,
    Json(request): Json<AvailabilityRequest>,
) -> impl IntoResponse {
    state.registry.set_available(request.available);
    tracing::info!(available = request.available, "Group registry availability changed");
    StatusCode::NO_CONTENT
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Parse a UUID from a string, returning an [`ApiError`] on failure.
fn parse_uuid(s: &str) -> Result<Uuid, ApiError> {
    s.parse::<Uuid>()
        .map_err(|e| ApiError::InvalidUuid(format!("{s}: {e}")))
}
