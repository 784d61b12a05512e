#![forbid(unsafe_code)]

use axum::extract::DefaultBodyLimit;
use axum::http::HeaderValue;
use axum::routing::{get, post};
use axum::Router;
use intake_store::IntakeStore;
use std::sync::atomic::{AtomicBool, AtomicU64};
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::warn;

mod cache;
mod config;
mod http_handlers;
mod live;
mod pipeline;
mod telemetry;

pub const CRATE_NAME: &str = "intake-server";

pub use cache::{DocumentCache, RedisMirror, RedisPolicy};
pub use config::{ApiConfig, CONFIG_SCHEMA_VERSION};
pub use live::{ConnectionGuard, LiveHub};
pub use pipeline::{PipelineError, UpdatePipeline};
pub use telemetry::RequestMetrics;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn IntakeStore>,
    pub pipeline: Arc<UpdatePipeline>,
    pub cache: Arc<DocumentCache>,
    pub hub: Arc<LiveHub>,
    pub api: ApiConfig,
    pub ready: Arc<AtomicBool>,
    pub(crate) metrics: Arc<RequestMetrics>,
    pub(crate) request_id_seed: Arc<AtomicU64>,
}

impl AppState {
    #[must_use]
    pub fn new(store: Arc<dyn IntakeStore>) -> Self {
        Self::with_config(store, ApiConfig::default())
    }

    #[must_use]
    pub fn with_config(store: Arc<dyn IntakeStore>, api: ApiConfig) -> Self {
        let mirror = api.redis_url.as_deref().and_then(|url| {
            match RedisMirror::new(url, &api.redis_prefix, RedisPolicy::default()) {
                Ok(mirror) => Some(mirror),
                Err(e) => {
                    warn!("redis mirror disabled: {e}");
                    None
                }
            }
        });
        let cache = Arc::new(DocumentCache::new(api.cache_ttl, mirror));
        let hub = LiveHub::new(api.ws_send_buffer);
        let pipeline = UpdatePipeline::new(Arc::clone(&store), Arc::clone(&cache), Arc::clone(&hub));
        Self {
            store,
            pipeline,
            cache,
            hub,
            api,
            ready: Arc::new(AtomicBool::new(true)),
            metrics: Arc::new(RequestMetrics::default()),
            request_id_seed: Arc::new(AtomicU64::new(1)),
        }
    }
}

fn cors_layer(api: &ApiConfig) -> CorsLayer {
    if api.cors_allowed_origins.iter().any(|origin| origin == "*") {
        return CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);
    }
    let origins: Vec<HeaderValue> = api
        .cors_allowed_origins
        .iter()
        .filter_map(|origin| origin.parse().ok())
        .collect();
    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods(Any)
        .allow_headers(Any)
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(http_handlers::health_handler))
        .route("/readyz", get(http_handlers::readyz_handler))
        .route("/metrics", get(http_handlers::metrics_handler))
        .route("/version", get(http_handlers::version_handler))
        .route("/ws", get(live::socket::ws_handler))
        .route(
            "/api/v1/vehicles",
            get(http_handlers::list_vehicles_handler).post(http_handlers::create_vehicle_handler),
        )
        .route(
            "/api/v1/vehicles/{id}",
            get(http_handlers::get_vehicle_handler).put(http_handlers::update_vehicle_handler),
        )
        .route(
            "/api/v1/inspections",
            get(http_handlers::list_inspections_handler)
                .post(http_handlers::create_inspection_handler),
        )
        .route(
            "/api/v1/inspections/{id}",
            get(http_handlers::get_inspection_handler)
                .put(http_handlers::update_inspection_handler)
                .delete(http_handlers::delete_inspection_handler),
        )
        .route(
            "/api/v1/inspections/{id}/data",
            get(http_handlers::inspection_data_handler),
        )
        .route(
            "/api/v1/inspections/{id}/update",
            post(http_handlers::patch_inspection_handler),
        )
        .route(
            "/api/v1/form-templates",
            get(http_handlers::list_templates_handler)
                .post(http_handlers::create_template_handler),
        )
        .route(
            "/api/v1/form-templates/{id}",
            get(http_handlers::get_template_handler)
                .put(http_handlers::update_template_handler)
                .delete(http_handlers::delete_template_handler),
        )
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer(&state.api))
        .layer(DefaultBodyLimit::max(state.api.max_body_bytes))
        .with_state(state)
}

#[cfg(test)]
mod pipeline_tests;
