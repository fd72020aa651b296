use axum::Extension;
use axum::Json;
use axum::http::StatusCode;
use chrono::Utc;

use crate::server::dtos::health_dto::{
    HealthResponse, HealthStatus, ProxyCacheHealth, ServiceHealthDetails,
};
use crate::server::services::cache_services::ResponseCacheServiceTrait as _;
use crate::server::services::proxy_services::ProxyServices;
use crate::server::{get_app_version, get_uptime_seconds};

/// health endpoint - the cache is the only stateful piece, so this mostly
/// exists for load balancer probes and the entry count
pub async fn health_endpoint(
    Extension(services): Extension<ProxyServices>,
) -> (StatusCode, Json<HealthResponse>) {
    let cache_stats = services.cache.stats().await;

    let response = HealthResponse {
        status: HealthStatus::Healthy,
        timestamp: Utc::now(),
        uptime_seconds: get_uptime_seconds(),
        version: get_app_version().to_string(),
        environment: format!("{:?}", services.config.cargo_env).to_lowercase(),
        services: ServiceHealthDetails {
            proxy_cache: ProxyCacheHealth {
                status: HealthStatus::Healthy,
                entries: cache_stats.entries,
            },
        },
    };

    (StatusCode::OK, Json(response))
}
