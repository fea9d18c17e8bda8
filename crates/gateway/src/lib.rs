//! HTTP API gateway for Sproutline.
//!
//! Serves the chat widget and the admin console over one Axum router:
//! health check at the root, everything else under `/v1`.

pub mod api_v1;

use axum::{Router, response::Json, routing::get};
use serde::Serialize;
use sproutline_config::AppConfig;
use tower_http::cors::CorsLayer;
use tracing::{info, warn};

pub use api_v1::{GatewayState, SharedState};

/// Build the full router: health at the root, the v1 API nested below,
/// CORS and trace logging applied to everything.
pub fn build_router(state: SharedState, allowed_origin: Option<&str>) -> Router {
    // The widget is embedded on the daycare's site, so CORS must admit
    // that origin. With no origin configured we stay permissive, which
    // suits local development.
    let cors = match allowed_origin {
        Some(raw) => match raw.parse() {
            Ok(origin) => CorsLayer::new()
                .allow_origin(tower_http::cors::AllowOrigin::exact(origin))
                .allow_methods([
                    axum::http::Method::GET,
                    axum::http::Method::POST,
                    axum::http::Method::DELETE,
                ])
                .allow_headers([axum::http::header::CONTENT_TYPE]),
            Err(_) => {
                warn!(origin = %raw, "Invalid allowed_origin, falling back to permissive CORS");
                CorsLayer::permissive()
            }
        },
        None => CorsLayer::permissive(),
    };

    Router::new()
        .route("/health", get(health_handler))
        .nest("/v1", api_v1::v1_router(state))
        .layer(cors)
        .layer(tower_http::trace::TraceLayer::new_for_http())
}

/// Start the gateway HTTP server and run until shutdown.
pub async fn serve(
    config: &AppConfig,
    state: SharedState,
) -> Result<(), Box<dyn std::error::Error>> {
    let addr = format!("{}:{}", config.gateway.host, config.gateway.port);
    let app = build_router(state, config.gateway.allowed_origin.as_deref());

    info!(addr = %addr, "Gateway starting");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}
