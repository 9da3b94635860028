// src/bin/api_server.rs

use anyhow::Context;
use authentichain::infra::evm::{HttpProvider, RegistryClient, SignerProvider};
use authentichain::infra::identity::{AirstackResolver, IdentityResolver};
use authentichain::infra::indexer::FeedClient;
use authentichain::transport;
use authentichain::Config;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing_subscriber::EnvFilter;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::from_env().context("invalid configuration")?;

    // --- Chain access ---
    let provider: Arc<dyn SignerProvider> = Arc::new(HttpProvider::new(&config.rpc_url, config.http_timeout)?);
    let registry = Arc::new(RegistryClient::new(
        provider.clone(),
        config.registry_address,
        config.receipt_poll_interval,
    ));
    tracing::info!(
        rpc = %config.rpc_url,
        chain_id = config.chain_id,
        registry = %config.registry_address.to_checksum(),
        "registry client initialized"
    );

    // --- Optional collaborators ---
    let resolver: Option<Arc<dyn IdentityResolver>> = match &config.airstack_api_key {
        Some(key) => Some(Arc::new(AirstackResolver::new(
            &config.airstack_url,
            key.clone(),
            config.http_timeout,
        )?)),
        None => {
            tracing::info!("AIRSTACK_API_KEY not set; registrant enrichment disabled");
            None
        }
    };
    let feed = match &config.subgraph_url {
        Some(url) => Some(Arc::new(FeedClient::new(url, config.http_timeout)?)),
        None => {
            tracing::info!("SUBGRAPH_URL not set; /api/feed disabled");
            None
        }
    };

    let app_state = transport::http::AppState {
        provider,
        chain_id: config.chain_id,
        registry,
        resolver,
        identity_timeout: config.identity_timeout,
        feed,
        ipfs_gateway: config.ipfs_gateway.clone(),
    };

    // --- API Server Initialization ---
    let cors = CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any);
    let app = transport::http::create_router(app_state)
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", transport::http::ApiDoc::openapi()))
        .layer(cors);
    let listener = tokio::net::TcpListener::bind(&config.api_bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.api_bind_addr))?;
    tracing::info!(addr = %config.api_bind_addr, "API server listening; Swagger UI at /swagger-ui");

    tokio::select! {
        result = axum::serve(listener, app) => {
            result?;
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutdown signal received");
        }
    }

    Ok(())
}
