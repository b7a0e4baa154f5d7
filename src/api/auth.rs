//! Credential extraction and the login probe.
//!
//! Every library-backed endpoint takes credentials from the
//! `X-Library-Id` / `X-Library-Key` request headers; there is no session
//! state. Login does not create anything server-side, it just validates
//! the credentials against the library API and returns the derived user
//! id.

use axum::{
    extract::{FromRequestParts, State},
    http::request::Parts,
    routing::post,
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::error::{ApiError, ApiResult};
use crate::models::{Identity, LibraryCredentials};
use crate::services::zotero_client::LibraryError;
use crate::AppState;

pub const LIBRARY_ID_HEADER: &str = "x-library-id";
pub const LIBRARY_KEY_HEADER: &str = "x-library-key";

/// Credentials and derived identity of the calling request.
#[derive(Debug, Clone)]
pub struct LibraryAuth {
    pub credentials: LibraryCredentials,
    pub identity: Identity,
}

#[axum::async_trait]
impl<S> FromRequestParts<S> for LibraryAuth
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let library_id = header_value(parts, LIBRARY_ID_HEADER)?;
        let api_key = header_value(parts, LIBRARY_KEY_HEADER)?;
        let credentials = LibraryCredentials::new(library_id, api_key);
        let identity = Identity::from_credentials(&credentials);
        Ok(Self {
            credentials,
            identity,
        })
    }
}

fn header_value(parts: &Parts, name: &str) -> Result<String, ApiError> {
    let value = parts
        .headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .unwrap_or_default();
    if value.is_empty() {
        return Err(ApiError::Unauthorized(
            "library credentials required".to_string(),
        ));
    }
    Ok(value.to_string())
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub library_id: String,
    #[serde(default)]
    pub api_key: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub success: bool,
    pub user_id: String,
    pub library_id: String,
}

/// POST /api/auth/login
///
/// Stateless credential probe: verifies the pair can read the library and
/// returns the identity it maps to.
pub async fn login(
    State(state): State<AppState>,
    Json(request): Json<LoginRequest>,
) -> ApiResult<Json<LoginResponse>> {
    let library_id = request.library_id.trim().to_string();
    let api_key = request.api_key.trim().to_string();
    if library_id.is_empty() || api_key.is_empty() {
        return Err(ApiError::BadRequest(
            "library id and API key are required".to_string(),
        ));
    }

    let credentials = LibraryCredentials::new(library_id, api_key);
    state
        .library
        .verify_credentials(&credentials)
        .await
        .map_err(|e| match e {
            LibraryError::Forbidden => {
                ApiError::Unauthorized("invalid API key or insufficient permissions".to_string())
            }
            LibraryError::NotFound => ApiError::Unauthorized("library not found".to_string()),
            other => ApiError::Unauthorized(format!("credential validation failed: {}", other)),
        })?;

    let identity = Identity::from_credentials(&credentials);
    tracing::info!(library_id = %identity.library_id(), "login verified");

    Ok(Json(LoginResponse {
        success: true,
        user_id: identity.user_id().to_string(),
        library_id: identity.library_id().to_string(),
    }))
}

/// Build auth routes
pub fn auth_routes() -> Router<AppState> {
    Router::new().route("/api/auth/login", post(login))
}
