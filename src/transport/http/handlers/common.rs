use crate::domain::error::Error;
use crate::crypto::hashing::hash_asset;
use crate::domain::model::{ContentHash, ImageAsset, LookupOutcome};
use crate::infra::identity::enrich;
use crate::transport::http::types::{ApiResponse, AppState, RegistrationStatus, VerifyResponse};
use axum::http::header::CONTENT_TYPE;
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use serde::Serialize;

pub type HandlerResult = Result<(StatusCode, Json<ApiResponse>), (StatusCode, Json<ApiResponse>)>;

pub fn ok<T: Serialize>(data: T) -> HandlerResult {
    let data = serde_json::to_value(data)
        .map_err(|e| error_response(StatusCode::INTERNAL_SERVER_ERROR, format!("Failed to encode response: {}", e)))?;
    Ok((
        StatusCode::OK,
        Json(ApiResponse {
            success: true,
            data: Some(data),
            error: None,
        }),
    ))
}

pub fn error_response(status: StatusCode, message: impl Into<String>) -> (StatusCode, Json<ApiResponse>) {
    (
        status,
        Json(ApiResponse {
            success: false,
            data: None,
            error: Some(message.into()),
        }),
    )
}

/// Client mistakes are 4xx; a registry that cannot be read is a bad gateway.
pub fn status_for(err: &Error) -> StatusCode {
    match err {
        Error::InvalidAsset(_) | Error::HashComputationFailed(_) => StatusCode::UNPROCESSABLE_ENTITY,
        Error::LookupFailed(_) => StatusCode::BAD_GATEWAY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

pub fn domain_error(err: Error) -> (StatusCode, Json<ApiResponse>) {
    error_response(status_for(&err), err.user_message())
}

/// Builds an asset from a raw request body, taking the media type from `Content-Type`.
pub fn asset_from_body(headers: &HeaderMap, body: &[u8]) -> Result<ImageAsset, (StatusCode, Json<ApiResponse>)> {
    let media_type = headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.split(';').next().unwrap_or(v).trim().to_string())
        .unwrap_or_default();
    let file_name = headers
        .get("x-file-name")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("upload")
        .to_string();
    ImageAsset::new(body.to_vec(), media_type, file_name).map_err(domain_error)
}

/// Hashes on the blocking pool so large bodies do not stall the runtime.
pub async fn hash_off_runtime(asset: &ImageAsset) -> Result<ContentHash, (StatusCode, Json<ApiResponse>)> {
    let asset = asset.clone();
    tokio::task::spawn_blocking(move || hash_asset(&asset))
        .await
        .map_err(|e| domain_error(Error::HashComputationFailed(e.to_string())))
}

/// Lookup result plus the registrant's profile if it resolves within the configured timeout.
pub async fn describe_outcome(state: &AppState, hash: String, outcome: LookupOutcome) -> VerifyResponse {
    let profile = match (outcome.registrant(), &state.resolver) {
        (Some(address), Some(resolver)) => enrich(resolver, address, state.identity_timeout).await,
        _ => None,
    };
    let mut message = outcome.message();
    if let Some(name) = profile.as_ref().and_then(|p| p.display_name()) {
        message.push_str(&format!(" ({})", name));
    }

    VerifyResponse {
        hash,
        status: match outcome {
            LookupOutcome::Unregistered => RegistrationStatus::Unregistered,
            LookupOutcome::RegisteredBy(_) => RegistrationStatus::Registered,
        },
        registrant: outcome.registrant().map(|a| a.to_checksum()),
        message,
        profile,
    }
}
