//! # Registration Routes
//!
//! | Method | Path | Operation |
//! |--------|------|-----------|
//! | POST   | `/v1/registrations` | Submit for the token's DID (201; 401 without a valid token; 403 if the body names another DID; 409 on an active duplicate; 422 on an invalid endpoint) |
//! | GET    | `/v1/registrations/{id}` | Status of one registration |
//! | GET    | `/v1/registrations?did=...` | Every registration for a DID, newest first |
//! | GET    | `/v1/registrations?state=...&limit=&offset=` | Paged listing |
//!
//! Handlers only translate HTTP to [`RegistrationService`] calls. Processing
//! happens in the engine loop, never on the request path.
//!
//! [`RegistrationService`]: dsreg_engine::RegistrationService

use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;
use uuid::Uuid;

use dsreg_core::RegistrationId;
use dsreg_engine::SubmitRegistration;
use dsreg_state::{RegistrationState, RegistrationStatus};

use crate::auth::AuthenticatedDid;
use crate::error::AppError;
use crate::extractors::{extract_json, extract_query};
use crate::state::AppState;

/// Page size used when `limit` is omitted.
pub const DEFAULT_PAGE_SIZE: usize = 50;

/// Build the registrations router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/v1/registrations",
            get(list_registrations).post(submit_registration),
        )
        .route("/v1/registrations/{id}", get(get_registration))
}

/// Body of `POST /v1/registrations`. The DID is taken from the bearer
/// token; `participant_did`, if sent, must name that same DID.
#[derive(Debug, Default, Deserialize)]
pub struct SubmitBody {
    #[serde(default)]
    pub participant_did: Option<String>,
    #[serde(default)]
    pub endpoint_url: Option<String>,
    #[serde(default)]
    pub supported_protocols: Vec<String>,
}

/// Query parameters for `GET /v1/registrations`.
#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    /// Restrict to one participant DID. Takes precedence over the paging
    /// parameters.
    pub did: Option<String>,
    /// Restrict to one lifecycle state, e.g. `FAILED`.
    pub state: Option<String>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

async fn submit_registration(
    State(state): State<AppState>,
    AuthenticatedDid(caller): AuthenticatedDid,
    body: Result<Json<SubmitBody>, JsonRejection>,
) -> Result<(StatusCode, Json<RegistrationStatus>), AppError> {
    let body = extract_json(body)?;
    if let Some(claimed) = body.participant_did.as_deref() {
        if claimed.trim() != caller.as_str() {
            tracing::warn!(
                token_issuer = %caller,
                participant_did = %claimed,
                "enrollment refused: body DID differs from token issuer"
            );
            return Err(AppError::Forbidden(format!(
                "token issued by {caller} cannot enroll {claimed}"
            )));
        }
    }

    let request = SubmitRegistration {
        participant_did: caller.as_str().to_string(),
        endpoint_url: body.endpoint_url,
        supported_protocols: body.supported_protocols,
    };
    let created = state.service.submit(request).await?;
    tracing::info!(
        registration_id = %created.id,
        participant_did = %created.participant_did,
        "registration submitted"
    );
    Ok((StatusCode::CREATED, Json(created)))
}

async fn get_registration(
    State(state): State<AppState>,
    id: Result<Path<Uuid>, PathRejection>,
) -> Result<Json<RegistrationStatus>, AppError> {
    let Path(id) = id.map_err(|e| AppError::BadRequest(e.body_text()))?;
    let status = state.service.status(RegistrationId::from(id)).await?;
    Ok(Json(status))
}

async fn list_registrations(
    State(state): State<AppState>,
    query: Result<Query<ListQuery>, QueryRejection>,
) -> Result<Json<Vec<RegistrationStatus>>, AppError> {
    let query = extract_query(query)?;

    if let Some(did) = query.did.as_deref() {
        return Ok(Json(state.service.status_by_did(did).await?));
    }

    let filter = query
        .state
        .as_deref()
        .map(str::parse::<RegistrationState>)
        .transpose()
        .map_err(|e| AppError::Validation(e.to_string()))?;
    let page = state
        .service
        .list(
            filter,
            query.limit.unwrap_or(DEFAULT_PAGE_SIZE),
            query.offset.unwrap_or(0),
        )
        .await?;
    Ok(Json(page))
}
