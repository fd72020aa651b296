use once_cell::sync::Lazy;
use regex::Regex;

/// content-type for HLS master/variant playlists
pub const PLAYLIST_CONTENT_TYPE: &str = "application/vnd.apple.mpegurl";

/// content-type for MPEG transport-stream segments
pub const TRANSPORT_STREAM_CONTENT_TYPE: &str = "video/mp2t";

/// fallback when nothing else fits and upstream declared nothing
pub const BINARY_CONTENT_TYPE: &str = "application/octet-stream";

// every mpeg-ts packet is 188 bytes and starts with the sync byte
const TS_PACKET_LEN: usize = 188;
const TS_SYNC_BYTE: u8 = 0x47;

// extensions origins use to disguise segments from hotlink scanners. a ".jpg"
// that is really a ts segment is depressingly common
const SUSPICIOUS_EXTENSIONS: &[&str] = &[
    ".txt", ".html", ".htm", ".jpg", ".jpeg", ".png", ".gif", ".webp", ".bmp", ".ico", ".js",
    ".css", ".json", ".xml", ".bin",
];

const TS_EXTENSIONS: &[&str] = &[".ts", ".m2ts", ".mts"];

// numbered segment/chunk/fragment/part names, plus the -v<N>-a<N> variant suffix
// some packagers emit
static SEGMENT_NAME_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)((^|[/_-])(seg|segment|chunk|frag|fragment|part)[-_]?\d+|-v\d+-a\d+)")
        .expect("static pattern should parse")
});

/// true if the sample looks like an MPEG transport stream: sync byte at offset 0
/// plus at least one more sync byte on a 188-byte stride. a single 0x47 at the
/// start is not enough, random binaries hit that one in 256 times.
pub fn looks_like_transport_stream(sample: &[u8]) -> bool {
    if sample.len() < TS_PACKET_LEN || sample[0] != TS_SYNC_BYTE {
        return false;
    }

    (1..=5).any(|stride| {
        let offset = stride * TS_PACKET_LEN;
        sample.get(offset).copied() == Some(TS_SYNC_BYTE)
    })
}

/// decide the true media type of a fetched resource. the url extension, the
/// payload bytes and the upstream's declared content-type all get a vote, in
/// that order, because any one of them can lie.
pub fn classify(url_or_path: &str, sample: Option<&[u8]>, declared: Option<&str>) -> String {
    let path = normalized_path(url_or_path);

    // playlist extensions are trusted without a sample. with one, the first two
    // bytes of #EXTM3U settle it either way
    if path.ends_with(".m3u8") || path.ends_with(".m3u") {
        match sample {
            None => return PLAYLIST_CONTENT_TYPE.to_string(),
            Some(bytes) if bytes.starts_with(b"#E") => return PLAYLIST_CONTENT_TYPE.to_string(),
            // extension lied, keep sniffing
            Some(_) => {}
        }
    }

    // the signature check runs on every sampled payload, which also covers the
    // suspicious-extension disguises
    if let Some(bytes) = sample {
        if looks_like_transport_stream(bytes) {
            return TRANSPORT_STREAM_CONTENT_TYPE.to_string();
        }
    }

    // no sample (or no signature hit): segment-looking names with a ts or
    // disguised extension still count as segments
    if SEGMENT_NAME_PATTERN.is_match(&path)
        && (has_extension(&path, TS_EXTENSIONS) || has_extension(&path, SUSPICIOUS_EXTENSIONS))
    {
        return TRANSPORT_STREAM_CONTENT_TYPE.to_string();
    }

    match declared {
        Some(declared) if !declared.is_empty() => declared.to_string(),
        _ => BINARY_CONTENT_TYPE.to_string(),
    }
}

// lowercase path with any query/fragment chopped off, so extension checks see
// "chunk-1.ts" and not "chunk-1.ts?token=..."
fn normalized_path(url_or_path: &str) -> String {
    let end = url_or_path
        .find(['?', '#'])
        .unwrap_or(url_or_path.len());
    url_or_path[..end].to_ascii_lowercase()
}

fn has_extension(path: &str, extensions: &[&str]) -> bool {
    extensions.iter().any(|ext| path.ends_with(ext))
}
