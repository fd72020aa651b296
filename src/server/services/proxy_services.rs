use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use crate::config::AppConfig;

use super::cache_services::{
    DynResponseCacheService, ResponseCacheService, SWEEP_INTERVAL_SECONDS,
};
use super::fetch_services::{DynProxyFetchService, HttpUpstreamClient, ProxyFetchService};

/// the service bundle handed to every request handler via axum Extension
#[derive(Clone)]
pub struct ProxyServices {
    pub fetch: DynProxyFetchService,
    pub cache: DynResponseCacheService,
    pub http: reqwest::Client,
    pub config: Arc<AppConfig>,
}

impl ProxyServices {
    pub fn new(config: Arc<AppConfig>) -> Self {
        info!("starting proxy services...");

        // cert validation is off on purpose. half the streaming origins out
        // there run expired or self-signed certs and the players don't care,
        // so neither do we
        let http = reqwest::Client::builder()
            .danger_accept_invalid_certs(true)
            .build()
            .expect("http client should build");

        let cache = Arc::new(ResponseCacheService::new(Duration::from_secs(
            SWEEP_INTERVAL_SECONDS,
        ))) as DynResponseCacheService;

        let upstream = Arc::new(HttpUpstreamClient::new(
            http.clone(),
            Duration::from_millis(config.request_timeout_ms),
        ));

        let fetch = Arc::new(ProxyFetchService::new(
            upstream,
            cache.clone(),
            config.playlist_cache_ttl_seconds,
            config.cache_ttl_seconds,
        )) as DynProxyFetchService;

        info!("proxy services ok");

        Self {
            fetch,
            cache,
            http,
            config,
        }
    }
}
