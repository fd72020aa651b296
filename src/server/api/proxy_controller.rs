use axum::{
    Extension, Router,
    extract::Query,
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use std::io::Write;

use base64::{Engine as _, engine::general_purpose::URL_SAFE};
use flate2::{Compression, write::GzEncoder};
use serde::Deserialize;
use tracing::{debug, error};

use crate::server::{
    error::{AppResult, Error},
    services::fetch_services::ProxyFetchServiceTrait as _,
    services::proxy_services::ProxyServices,
    utils::media_utils,
};

/// where rewritten playlist references point back to. handed to the rewrite
/// pipeline so the core never hardcodes its own mount point.
pub const PROXY_BASE_PATH: &str = "/api/v1/proxy";

/// supported response encodings for the client-facing side
#[derive(Debug, Clone, Copy, PartialEq)]
enum ContentEncoding {
    Zstd,
    Gzip,
    None,
}

impl ContentEncoding {
    /// pick the best encoding for the client's Accept-Encoding header.
    /// apple HLS players send "gzip, deflate" or "identity" and mean it
    fn from_accept_encoding(accept_encoding: Option<&str>) -> Self {
        match accept_encoding {
            Some(v) => {
                if v == "identity" || v.starts_with("identity,") {
                    return Self::None;
                }
                if v.contains("zstd") {
                    Self::Zstd
                } else if v.contains("gzip") {
                    Self::Gzip
                } else {
                    Self::None
                }
            }
            None => Self::None,
        }
    }

    fn as_header_value(&self) -> Option<&'static str> {
        match self {
            Self::Zstd => Some("zstd"),
            Self::Gzip => Some("gzip"),
            Self::None => None,
        }
    }

    fn compress(&self, data: &[u8]) -> Result<Vec<u8>, std::io::Error> {
        match self {
            Self::Zstd => zstd::encode_all(data, 3),
            Self::Gzip => {
                let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
                encoder.write_all(data)?;
                encoder.finish()
            }
            Self::None => Ok(data.to_vec()),
        }
    }
}

#[derive(Deserialize)]
struct ProxyQuery {
    url: String,
}

pub struct ProxyController;

impl ProxyController {
    pub fn app() -> Router {
        Router::new().route("/", get(Self::proxy_get).options(Self::proxy_options))
    }

    async fn proxy_get(
        Extension(services): Extension<ProxyServices>,
        Query(params): Query<ProxyQuery>,
        headers: HeaderMap,
    ) -> AppResult<Response> {
        let target_url = Self::decode_url(&params.url)?;

        if !target_url.starts_with("http://") && !target_url.starts_with("https://") {
            return Err(Error::BadRequest("Invalid URL format".to_string()));
        }

        debug!("proxying: {}", target_url);

        let payload = services
            .fetch
            .handle_proxy(&target_url, PROXY_BASE_PATH)
            .await?;

        let status =
            StatusCode::from_u16(payload.upstream_status).unwrap_or(StatusCode::BAD_GATEWAY);

        let mut response_headers = HeaderMap::new();
        response_headers.insert(
            header::CONTENT_TYPE,
            payload
                .content_type
                .parse()
                .unwrap_or(header::HeaderValue::from_static(
                    media_utils::BINARY_CONTENT_TYPE,
                )),
        );
        response_headers.insert(
            "x-cache",
            payload
                .cache_status
                .as_str()
                .parse()
                .expect("static header value should parse"),
        );

        // a body we couldn't decompress goes back verbatim with its original
        // content-encoding so the client can decode it itself. no re-compression,
        // no range slicing on top of someone else's compressed bytes
        if let Some(encoding) = payload.content_encoding {
            if let Ok(value) = encoding.parse() {
                response_headers.insert(header::CONTENT_ENCODING, value);
            }
            response_headers.insert(
                header::CONTENT_LENGTH,
                payload
                    .body
                    .len()
                    .to_string()
                    .parse()
                    .expect("content length should parse"),
            );
            return Ok((status, response_headers, payload.body).into_response());
        }

        if payload.content_type == media_utils::PLAYLIST_CONTENT_TYPE {
            Self::build_playlist_response(status, response_headers, payload.body, &headers)
        } else {
            Self::build_binary_response(status, response_headers, payload.body, &headers)
        }
    }

    async fn proxy_options() -> impl IntoResponse {
        StatusCode::NO_CONTENT
    }

    /// playlists are tiny text and recompress well, so honor the client's
    /// Accept-Encoding. never cached client-side, live playlists rotate fast
    fn build_playlist_response(
        status: StatusCode,
        mut response_headers: HeaderMap,
        body: Vec<u8>,
        request_headers: &HeaderMap,
    ) -> AppResult<Response> {
        response_headers.insert(
            header::CACHE_CONTROL,
            "no-cache".parse().expect("static header value should parse"),
        );

        let encoding = ContentEncoding::from_accept_encoding(
            request_headers
                .get(header::ACCEPT_ENCODING)
                .and_then(|v| v.to_str().ok()),
        );

        let response_body = Self::maybe_compress(encoding, body, &mut response_headers)?;

        response_headers.insert(
            header::CONTENT_LENGTH,
            response_body
                .len()
                .to_string()
                .parse()
                .expect("content length should parse"),
        );

        Ok((status, response_headers, response_body).into_response())
    }

    /// segments are immutable once published, so the client may cache them hard.
    /// serves byte ranges ourselves since we always fetch the full payload
    fn build_binary_response(
        status: StatusCode,
        mut response_headers: HeaderMap,
        body: Vec<u8>,
        request_headers: &HeaderMap,
    ) -> AppResult<Response> {
        response_headers.insert(
            header::CACHE_CONTROL,
            "public, max-age=31536000"
                .parse()
                .expect("static header value should parse"),
        );
        response_headers.insert(
            header::ACCEPT_RANGES,
            "bytes".parse().expect("static header value should parse"),
        );

        let total_len = body.len();

        let range = if status == StatusCode::OK {
            request_headers
                .get(header::RANGE)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| Self::parse_range(v, total_len))
        } else {
            None
        };

        if let Some((start, end)) = range {
            let sliced = body[start..=end].to_vec();
            debug!("serving range {}-{} of {} bytes", start, end, total_len);
            response_headers.insert(
                header::CONTENT_RANGE,
                format!("bytes {}-{}/{}", start, end, total_len)
                    .parse()
                    .expect("range header should parse"),
            );
            response_headers.insert(
                header::CONTENT_LENGTH,
                sliced
                    .len()
                    .to_string()
                    .parse()
                    .expect("content length should parse"),
            );
            return Ok((StatusCode::PARTIAL_CONTENT, response_headers, sliced).into_response());
        }

        // only compress full responses
        let encoding = ContentEncoding::from_accept_encoding(
            request_headers
                .get(header::ACCEPT_ENCODING)
                .and_then(|v| v.to_str().ok()),
        );

        let response_body = Self::maybe_compress(encoding, body, &mut response_headers)?;

        response_headers.insert(
            header::CONTENT_LENGTH,
            response_body
                .len()
                .to_string()
                .parse()
                .expect("content length should parse"),
        );

        Ok((status, response_headers, response_body).into_response())
    }

    fn maybe_compress(
        encoding: ContentEncoding,
        body: Vec<u8>,
        response_headers: &mut HeaderMap,
    ) -> AppResult<Vec<u8>> {
        if encoding == ContentEncoding::None {
            return Ok(body);
        }

        let compressed = encoding.compress(&body).map_err(|e| {
            error!("failed to compress response with {:?}: {}", encoding, e);
            Error::InternalServerErrorWithContext("Failed to compress response".to_string())
        })?;

        debug!(
            "compressed response with {:?} from {} to {} bytes",
            encoding,
            body.len(),
            compressed.len()
        );

        if let Some(enc_header) = encoding.as_header_value() {
            response_headers.insert(
                header::CONTENT_ENCODING,
                enc_header.parse().expect("static header value should parse"),
            );
        }

        Ok(compressed)
    }

    // parse "bytes=start-end", clamped to the body. anything unparseable just
    // means a full response
    fn parse_range(range: &str, total_len: usize) -> Option<(usize, usize)> {
        let range_part = range.strip_prefix("bytes=")?;
        let (start_str, end_str) = range_part.split_once('-')?;

        let start: usize = start_str.parse().ok()?;
        let end: usize = if end_str.is_empty() {
            total_len.checked_sub(1)?
        } else {
            end_str.parse().ok()?
        };
        let end = end.min(total_len.checked_sub(1)?);

        if start < total_len && start <= end {
            Some((start, end))
        } else {
            None
        }
    }

    // the url param is either a percent-encoded http(s) url or unpadded
    // url-safe base64, players hit us with both
    fn decode_url(url_param: &str) -> AppResult<String> {
        if url_param.starts_with("http://") || url_param.starts_with("https://") {
            urlencoding::decode(url_param)
                .map(|s| s.to_string())
                .map_err(|e| {
                    error!("failed to decode url: {}", e);
                    Error::BadRequest("Invalid URL encoding".to_string())
                })
        } else {
            let mut padded = url_param.to_string();
            while !padded.len().is_multiple_of(4) {
                padded.push('=');
            }

            URL_SAFE
                .decode(&padded)
                .map_err(|e| {
                    error!("failed to decode base64: {}", e);
                    Error::BadRequest("Invalid URL encoding".to_string())
                })
                .and_then(|bytes| {
                    String::from_utf8(bytes).map_err(|e| {
                        error!("failed to parse utf-8: {}", e);
                        Error::BadRequest("Invalid URL encoding".to_string())
                    })
                })
        }
    }
}
