use std::io::Read;
use std::sync::Arc;
use std::time::Duration;

use metrics::counter;
use reqwest::header::{self, HeaderMap};
use tracing::{debug, error, warn};
use url::Url;

use crate::server::error::{AppResult, Error};
use crate::server::services::cache_services::{
    DynResponseCacheService, ResponseCacheServiceTrait as _,
};
use crate::server::utils::{header_utils::HeaderTemplateRegistry, media_utils, playlist_utils};

pub type DynProxyFetchService = Arc<dyn ProxyFetchServiceTrait + Send + Sync>;

/// what came back from the origin, before any post-processing
pub struct UpstreamResponse {
    pub status: u16,
    pub bytes: Vec<u8>,
    pub content_type: Option<String>,
    pub content_encoding: Option<String>,
}

/// the one seam the pipeline needs for tests: everything else in the pipeline
/// is deterministic, this is the only part that touches the network
#[mockall::automock]
#[async_trait::async_trait]
pub trait UpstreamClient: Send + Sync {
    async fn fetch(&self, url: &str, headers: HeaderMap) -> AppResult<UpstreamResponse>;
}

pub struct HttpUpstreamClient {
    http: reqwest::Client,
    timeout: Duration,
}

impl HttpUpstreamClient {
    pub fn new(http: reqwest::Client, timeout: Duration) -> Self {
        Self { http, timeout }
    }
}

#[async_trait::async_trait]
impl UpstreamClient for HttpUpstreamClient {
    async fn fetch(&self, url: &str, headers: HeaderMap) -> AppResult<UpstreamResponse> {
        let response = self
            .http
            .get(url)
            .headers(headers)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    Error::UpstreamTimeout(url.to_string())
                } else {
                    Error::UpstreamError(format!("{}: {}", url, e))
                }
            })?;

        let status = response.status().as_u16();

        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string());

        let content_encoding = response
            .headers()
            .get(header::CONTENT_ENCODING)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string());

        let bytes = response.bytes().await.map_err(|e| {
            if e.is_timeout() {
                Error::UpstreamTimeout(url.to_string())
            } else {
                Error::UpstreamError(format!("{}: failed to read body: {}", url, e))
            }
        })?;

        Ok(UpstreamResponse {
            status,
            bytes: bytes.to_vec(),
            content_type,
            content_encoding,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheStatus {
    Hit,
    Miss,
}

impl CacheStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Hit => "HIT",
            Self::Miss => "MISS",
        }
    }
}

/// the fully processed result handed back to the http layer
#[derive(Debug)]
pub struct ProxyPayload {
    pub body: Vec<u8>,
    pub content_type: String,
    pub cache_status: CacheStatus,
    pub upstream_status: u16,
    /// set only when upstream compression could not be undone, so the client
    /// still knows how to decode the body itself
    pub content_encoding: Option<String>,
}

#[async_trait::async_trait]
pub trait ProxyFetchServiceTrait {
    /// resolve headers, fetch, decompress, classify, rewrite-if-playlist,
    /// cache, return. the whole request pipeline in one call.
    async fn handle_proxy(&self, target_url: &str, proxy_base: &str) -> AppResult<ProxyPayload>;
}

pub struct ProxyFetchService {
    upstream: Arc<dyn UpstreamClient + Send + Sync>,
    cache: DynResponseCacheService,
    registry: HeaderTemplateRegistry,
    playlist_ttl_seconds: u64,
    segment_ttl_seconds: u64,
}

impl ProxyFetchService {
    pub fn new(
        upstream: Arc<dyn UpstreamClient + Send + Sync>,
        cache: DynResponseCacheService,
        playlist_ttl_seconds: u64,
        segment_ttl_seconds: u64,
    ) -> Self {
        Self {
            upstream,
            cache,
            registry: HeaderTemplateRegistry::new(),
            playlist_ttl_seconds,
            segment_ttl_seconds,
        }
    }

    // the url or declared type merely nominate the payload as a playlist, the
    // bytes have the final say. plenty of origins serve raw ts segments from
    // .m3u8 paths to confuse scrapers
    fn should_rewrite(target_url: &str, content_type: &str, body: &[u8]) -> bool {
        let nominated = content_type.contains("mpegurl")
            || content_type.contains("m3u8")
            || target_url.split(['?', '#']).next().is_some_and(|path| {
                let path = path.to_ascii_lowercase();
                path.ends_with(".m3u8") || path.ends_with(".m3u")
            });

        nominated && (body.starts_with(b"#EXTM3U") || body.starts_with(b"#EXT-X-"))
    }
}

#[async_trait::async_trait]
impl ProxyFetchServiceTrait for ProxyFetchService {
    async fn handle_proxy(&self, target_url: &str, proxy_base: &str) -> AppResult<ProxyPayload> {
        let parsed = Url::parse(target_url)
            .map_err(|e| Error::BadRequest(format!("invalid target url: {}", e)))?;

        if parsed.scheme() != "http" && parsed.scheme() != "https" {
            return Err(Error::BadRequest(format!(
                "unsupported scheme: {}",
                parsed.scheme()
            )));
        }

        // cache first, and never while an upstream fetch is in flight - the
        // lock lives entirely inside get/set
        if let Some((body, content_type)) = self.cache.get(target_url).await {
            debug!("proxy cache HIT for {}", target_url);
            return Ok(ProxyPayload {
                body,
                content_type,
                cache_status: CacheStatus::Hit,
                upstream_status: 200,
                content_encoding: None,
            });
        }

        let headers = self.registry.build_headers(&parsed);

        counter!("upstream_fetches_total").increment(1);
        let upstream = self.upstream.fetch(target_url, headers).await?;

        debug!(
            "upstream {} for {} ({} bytes, type {:?}, encoding {:?})",
            upstream.status,
            target_url,
            upstream.bytes.len(),
            upstream.content_type,
            upstream.content_encoding
        );

        let (body, retained_encoding) = decompress_body(upstream.bytes, upstream.content_encoding);

        // non-2xx bodies still flow back so the caller can decide whether an
        // error page is worth something, but they never enter the cache
        if !(200..300).contains(&upstream.status) {
            warn!("upstream returned {} for {}", upstream.status, target_url);
            return Ok(ProxyPayload {
                content_type: upstream
                    .content_type
                    .unwrap_or_else(|| media_utils::BINARY_CONTENT_TYPE.to_string()),
                body,
                cache_status: CacheStatus::Miss,
                upstream_status: upstream.status,
                content_encoding: retained_encoding,
            });
        }

        let content_type =
            media_utils::classify(target_url, Some(&body), upstream.content_type.as_deref());

        let (body, content_type) = if Self::should_rewrite(target_url, &content_type, &body) {
            match String::from_utf8(body) {
                Ok(text) => {
                    let rewritten = playlist_utils::rewrite(&text, target_url, proxy_base);
                    counter!("playlists_rewritten_total").increment(1);
                    (
                        rewritten.into_bytes(),
                        media_utils::PLAYLIST_CONTENT_TYPE.to_string(),
                    )
                }
                Err(e) => {
                    // nominally a playlist but not valid utf-8, ship it raw
                    error!("playlist body is not utf-8 for {}: {}", target_url, e);
                    (e.into_bytes(), content_type)
                }
            }
        } else {
            (body, content_type)
        };

        // a payload we couldn't decompress is in an odd half-state, keep it out
        // of the cache rather than replay it for the ttl window
        if retained_encoding.is_none() {
            let ttl = if content_type == media_utils::PLAYLIST_CONTENT_TYPE {
                self.playlist_ttl_seconds
            } else {
                self.segment_ttl_seconds
            };
            self.cache.set(target_url, body.clone(), &content_type, ttl).await;
        }

        Ok(ProxyPayload {
            body,
            content_type,
            cache_status: CacheStatus::Miss,
            upstream_status: upstream.status,
            content_encoding: retained_encoding,
        })
    }
}

/// undo the transport encoding. on failure the original bytes come back along
/// with the encoding name, so the response can keep its content-encoding header
/// and the client can decompress itself. on success the encoding is consumed
/// and no header is forwarded.
fn decompress_body(bytes: Vec<u8>, encoding: Option<String>) -> (Vec<u8>, Option<String>) {
    let Some(encoding) = encoding else {
        return (bytes, None);
    };

    if !matches!(encoding.as_str(), "gzip" | "deflate" | "br" | "zstd") {
        warn!("unsupported content-encoding {}, passing through", encoding);
        return (bytes, Some(encoding));
    }

    match try_decompress(&encoding, &bytes) {
        Ok(decompressed) => {
            debug!(
                "decompressed {} body: {} -> {} bytes",
                encoding,
                bytes.len(),
                decompressed.len()
            );
            (decompressed, None)
        }
        Err(e) => {
            warn!(
                "failed to decompress {} body, passing through: {}",
                encoding, e
            );
            (bytes, Some(encoding))
        }
    }
}

fn try_decompress(encoding: &str, bytes: &[u8]) -> std::io::Result<Vec<u8>> {
    match encoding {
        "gzip" => {
            let mut decoder = flate2::read::GzDecoder::new(bytes);
            let mut out = Vec::new();
            decoder.read_to_end(&mut out)?;
            Ok(out)
        }
        // http deflate is zlib-wrapped in practice; raw-deflate origins fall
        // into the pass-through path above
        "deflate" => {
            let mut decoder = flate2::read::ZlibDecoder::new(bytes);
            let mut out = Vec::new();
            decoder.read_to_end(&mut out)?;
            Ok(out)
        }
        "br" => {
            let mut decoder = brotli::Decompressor::new(bytes, 4096);
            let mut out = Vec::new();
            decoder.read_to_end(&mut out)?;
            Ok(out)
        }
        "zstd" => zstd::decode_all(bytes),
        other => Err(std::io::Error::other(format!(
            "unknown encoding: {}",
            other
        ))),
    }
}
