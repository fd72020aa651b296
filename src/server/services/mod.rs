pub mod cache_services;
pub mod fetch_services;
pub mod proxy_services;

pub use cache_services::DynResponseCacheService;
pub use fetch_services::DynProxyFetchService;
