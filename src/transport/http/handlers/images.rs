use crate::domain::model::ContentHash;
use crate::transport::http::handlers::common::{
    asset_from_body, describe_outcome, domain_error, error_response, hash_off_runtime, ok, HandlerResult,
};
use crate::transport::http::types::{ApiResponse, AppState, HashResponse};
use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};

#[utoipa::path(
    post,
    path = "/api/hash",
    request_body(content = Vec<u8>, description = "Raw image bytes; Content-Type must be image/*", content_type = "application/octet-stream"),
    responses(
        (status = 200, description = "Content hash of the image", body = ApiResponse),
        (status = 422, description = "Body is empty or not an image", body = ApiResponse)
    )
)]
pub async fn hash_handler(headers: HeaderMap, body: Bytes) -> HandlerResult {
    let asset = asset_from_body(&headers, &body)?;
    let hash = hash_off_runtime(&asset).await?;
    ok(HashResponse {
        hash: hash.to_string(),
        media_type: asset.media_type().to_string(),
        size: asset.len(),
    })
}

#[utoipa::path(
    post,
    path = "/api/verify",
    request_body(content = Vec<u8>, description = "Raw image bytes; Content-Type must be image/*", content_type = "application/octet-stream"),
    responses(
        (status = 200, description = "Registration status of the image", body = ApiResponse),
        (status = 422, description = "Body is empty or not an image", body = ApiResponse),
        (status = 502, description = "Registry could not be read", body = ApiResponse)
    )
)]
pub async fn verify_handler(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> HandlerResult {
    let asset = asset_from_body(&headers, &body)?;
    let hash = hash_off_runtime(&asset).await?;
    let outcome = state.registry.lookup(&hash).await.map_err(domain_error)?;
    ok(describe_outcome(&state, hash.to_string(), outcome).await)
}

#[utoipa::path(
    get,
    path = "/api/lookup/{hash}",
    params(("hash" = String, Path, description = "Content hash, 0x + 64 hex chars")),
    responses(
        (status = 200, description = "Registration status of the hash", body = ApiResponse),
        (status = 400, description = "Malformed hash", body = ApiResponse),
        (status = 502, description = "Registry could not be read", body = ApiResponse)
    )
)]
pub async fn lookup_handler(State(state): State<AppState>, Path(raw): Path<String>) -> HandlerResult {
    let hash = raw
        .parse::<ContentHash>()
        .map_err(|e| error_response(StatusCode::BAD_REQUEST, format!("Invalid hash: {}", e)))?;
    let outcome = state.registry.lookup(&hash).await.map_err(domain_error)?;
    ok(describe_outcome(&state, hash.to_string(), outcome).await)
}
