use crate::transport::http::handlers::common::{error_response, ok, HandlerResult};
use crate::transport::http::types::{ApiResponse, AppState, FeedItem, FeedQuery, DEFAULT_FEED_SIZE, MAX_FEED_SIZE};
use axum::extract::{Query, State};
use axum::http::StatusCode;

#[utoipa::path(
    get,
    path = "/api/feed",
    params(FeedQuery),
    responses(
        (status = 200, description = "Recent registrations with gateway links", body = ApiResponse),
        (status = 502, description = "Indexer request failed", body = ApiResponse),
        (status = 503, description = "No indexer configured", body = ApiResponse)
    )
)]
pub async fn feed_handler(State(state): State<AppState>, Query(query): Query<FeedQuery>) -> HandlerResult {
    let feed = state
        .feed
        .as_ref()
        .ok_or_else(|| error_response(StatusCode::SERVICE_UNAVAILABLE, "Feed is not configured (set SUBGRAPH_URL)"))?;
    let first = query.first.unwrap_or(DEFAULT_FEED_SIZE).clamp(1, MAX_FEED_SIZE);

    let entries = feed.recent(first).await.map_err(|e| {
        tracing::warn!(error = %e, "feed request failed");
        error_response(StatusCode::BAD_GATEWAY, format!("Feed request failed: {}", e))
    })?;

    let items: Vec<FeedItem> = entries
        .into_iter()
        .map(|entry| FeedItem {
            gateway_url: entry.gateway_url(&state.ipfs_gateway),
            entry,
        })
        .collect();
    ok(items)
}
