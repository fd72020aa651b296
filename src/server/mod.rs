use std::sync::Arc;
use std::time::Instant;

use anyhow::Context;
use axum::{Extension, Router, http::HeaderValue, routing::get};
use metrics_exporter_prometheus::PrometheusBuilder;
use once_cell::sync::Lazy;
use tower::limit::ConcurrencyLimitLayer;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::config::AppConfig;

pub mod api;
pub mod dtos;
pub mod error;
pub mod services;
pub mod utils;

use api::health_controller::health_endpoint;
use api::proxy_controller::ProxyController;
use services::cache_services::ResponseCacheServiceTrait as _;
use services::proxy_services::ProxyServices;

static START_TIME: Lazy<Instant> = Lazy::new(Instant::now);

pub fn get_app_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

pub fn get_uptime_seconds() -> u64 {
    START_TIME.elapsed().as_secs()
}

pub struct ApplicationServer;

impl ApplicationServer {
    pub async fn serve(config: Arc<AppConfig>) -> anyhow::Result<()> {
        // pin the uptime clock to actual startup, not the first health probe
        Lazy::force(&START_TIME);

        let services = ProxyServices::new(config.clone());

        let metrics_handle = PrometheusBuilder::new()
            .install_recorder()
            .context("failed to install metrics recorder")?;

        let router = Router::new()
            .nest("/api/v1/proxy", ProxyController::app())
            .route("/api/v1/health", get(health_endpoint))
            .route(
                "/api/v1/metrics",
                get(move || async move { metrics_handle.render() }),
            )
            .layer(Extension(services.clone()))
            .layer(TraceLayer::new_for_http())
            .layer(Self::cors_layer(&config.cors_origin))
            .layer(ConcurrencyLimitLayer::new(1024));

        let addr = format!("{}:{}", config.host, config.port);
        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .with_context(|| format!("failed to bind {}", addr))?;

        info!("listening on {}", addr);

        axum::serve(listener, router)
            .with_graceful_shutdown(Self::shutdown_signal())
            .await
            .context("server error")?;

        // stops the cache sweep task and drops all entries
        services.cache.destroy().await;

        Ok(())
    }

    fn cors_layer(cors_origin: &str) -> CorsLayer {
        if cors_origin == "*" {
            return CorsLayer::new().allow_origin(Any).allow_methods(Any);
        }

        let origins: Vec<HeaderValue> = cors_origin
            .split(',')
            .filter_map(|o| o.trim().parse().ok())
            .collect();

        CorsLayer::new()
            .allow_origin(AllowOrigin::list(origins))
            .allow_methods(Any)
    }

    async fn shutdown_signal() {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install ctrl-c handler");
        info!("shutdown signal received");
    }
}
