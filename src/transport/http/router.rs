use crate::infra::indexer::FeedEntry;
use crate::transport::http::handlers::{feed, health, images};
use crate::transport::http::types::{
    ApiResponse, FeedItem, HashResponse, RegistrationStatus, VerifyResponse, MAX_IMAGE_BYTES,
};
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    paths(
        health::healthcheck_handler,
        images::hash_handler,
        images::verify_handler,
        images::lookup_handler,
        feed::feed_handler
    ),
    components(schemas(
        ApiResponse,
        HashResponse,
        RegistrationStatus,
        VerifyResponse,
        FeedEntry,
        FeedItem
    ))
)]
pub struct ApiDoc;

pub fn create_router(app_state: crate::transport::http::types::AppState) -> Router {
    Router::new()
        .route("/health", get(health::healthcheck_handler))
        .route("/api/hash", post(images::hash_handler))
        .route("/api/verify", post(images::verify_handler))
        .route("/api/lookup/:hash", get(images::lookup_handler))
        .route("/api/feed", get(feed::feed_handler))
        .layer(DefaultBodyLimit::max(MAX_IMAGE_BYTES))
        .with_state(app_state)
}
