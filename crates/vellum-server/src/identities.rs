use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use tracing::{error, info, warn};

use vellum_crypto::{KeyStore, PublicKey, StoreError, StoredKeyPair};
use vellum_types::IdentityId;
use vellum_types::api::{PublicKeyResponse, PublishKeyRequest};

use crate::AppState;
use crate::middleware::Caller;

/// Publish the caller's public key. Keys are immutable once published.
pub async fn publish_key(
    State(state): State<AppState>,
    Path(id): Path<IdentityId>,
    Extension(Caller(caller)): Extension<Caller>,
    Json(req): Json<PublishKeyRequest>,
) -> Result<impl IntoResponse, StatusCode> {
    if caller != id {
        warn!("{} tried to publish a key for {}", caller, id);
        return Err(StatusCode::FORBIDDEN);
    }

    let key = PublicKey::from_pem(&req.public_key).map_err(|_| StatusCode::BAD_REQUEST)?;
    // Store the canonical encoding, not whatever whitespace the client sent
    let public_key = key.to_pem().map_err(|_| StatusCode::BAD_REQUEST)?;
    let fingerprint = key.fingerprint().map_err(|_| StatusCode::BAD_REQUEST)?;

    let db = state.db.clone();
    let stored = public_key.clone();
    tokio::task::spawn_blocking(move || db.put(id, StoredKeyPair::public_only(stored)))
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?
        .map_err(|e| match e {
            StoreError::AlreadyExists(_) => StatusCode::CONFLICT,
            StoreError::Backend(e) => {
                error!("failed to store key for {}: {}", id, e);
                StatusCode::INTERNAL_SERVER_ERROR
            }
        })?;

    info!("{} published key {}", id, fingerprint);
    Ok((
        StatusCode::CREATED,
        Json(PublicKeyResponse {
            identity_id: id,
            public_key,
            fingerprint,
        }),
    ))
}

pub async fn get_key(
    State(state): State<AppState>,
    Path(id): Path<IdentityId>,
) -> Result<impl IntoResponse, StatusCode> {
    let db = state.db.clone();
    let public_key = tokio::task::spawn_blocking(move || db.public_key(id))
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?
        .map_err(|e| {
            error!("failed to load key for {}: {}", id, e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?
        .ok_or(StatusCode::NOT_FOUND)?;

    // Only keys that parsed are ever stored
    let fingerprint = PublicKey::from_pem(&public_key)
        .and_then(|key| key.fingerprint())
        .map_err(|e| {
            error!("stored key for {} is unreadable: {}", id, e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?;

    Ok(Json(PublicKeyResponse {
        identity_id: id,
        public_key,
        fingerprint,
    }))
}
