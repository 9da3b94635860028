use crate::infra::evm::provider::parse_quantity;
use crate::transport::http::types::{ApiResponse, AppState};
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;

#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Service is healthy (RPC reachable, expected chain)", body = ApiResponse),
        (status = 503, description = "Service is unhealthy (RPC unreachable or wrong chain)", body = ApiResponse)
    )
)]
pub async fn healthcheck_handler(State(state): State<AppState>) -> impl IntoResponse {
    let chain = match state.provider.request("eth_chainId", serde_json::json!([])).await {
        Ok(value) => parse_quantity("eth_chainId", &value),
        Err(e) => Err(e),
    };

    match chain {
        Ok(chain_id) if chain_id == state.chain_id => (
            StatusCode::OK,
            Json(ApiResponse {
                success: true,
                data: Some(serde_json::json!({
                    "status": "ok",
                    "chain_id": chain_id,
                    "registry": state.registry.contract().to_checksum(),
                    "feed": state.feed.is_some(),
                    "identity": state.resolver.is_some(),
                })),
                error: None,
            }),
        )
            .into_response(),
        Ok(chain_id) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ApiResponse {
                success: false,
                data: Some(serde_json::json!({ "status": "unhealthy" })),
                error: Some(format!(
                    "RPC is on chain {}, expected chain {}",
                    chain_id, state.chain_id
                )),
            }),
        )
            .into_response(),
        Err(e) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ApiResponse {
                success: false,
                data: Some(serde_json::json!({ "status": "unhealthy" })),
                error: Some(format!("RPC ping failed: {}", e)),
            }),
        )
            .into_response(),
    }
}
