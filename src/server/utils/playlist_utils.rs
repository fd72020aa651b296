use tracing::{error, warn};
use url::Url;

const URI_ATTRIBUTE: &str = "URI=\"";

/// rewrite every segment and sub-playlist reference in an m3u8 document into a
/// proxied url of the form `{proxy_base}?url={percent-encoded absolute url}`.
///
/// the transform is total: every input line maps to exactly one output line, a
/// line that fails to resolve passes through unmodified, and if anything about
/// the document as a whole goes sideways the caller gets the original text
/// back. a half-rewritten playlist blanks out the channel, an unrewritten one
/// at least still plays for direct-access origins.
pub fn rewrite(text: &str, source_url: &str, proxy_base: &str) -> String {
    match rewrite_inner(text, source_url, proxy_base) {
        Ok(rewritten) => rewritten,
        Err(e) => {
            error!("playlist rewrite failed for {}: {}", source_url, e);
            text.to_string()
        }
    }
}

fn rewrite_inner(
    text: &str,
    source_url: &str,
    proxy_base: &str,
) -> Result<String, url::ParseError> {
    let source = Url::parse(source_url)?;
    let base = resolution_base(&source)?;

    let lines: Vec<String> = text
        .lines()
        .map(|line| rewrite_line(line, &source, &base, proxy_base))
        .collect();

    // line() strips \r\n as well, output is normalized to \n
    Ok(lines.join("\n"))
}

// base for relative references: a playlist url resolves against its directory,
// anything else is treated as a directory itself
fn resolution_base(source: &Url) -> Result<Url, url::ParseError> {
    let path = source.path();

    let dir = if path.ends_with(".m3u8") {
        match path.rfind('/') {
            Some(idx) => &path[..=idx],
            None => "/",
        }
    } else if path.ends_with('/') {
        path
    } else {
        return Url::parse(&format!(
            "{}://{}{}/",
            source.scheme(),
            source_authority(source),
            path
        ));
    };

    Url::parse(&format!(
        "{}://{}{}",
        source.scheme(),
        source_authority(source),
        dir
    ))
}

fn source_authority(source: &Url) -> String {
    let host = source.host_str().unwrap_or("");
    match source.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host.to_string(),
    }
}

fn rewrite_line(line: &str, source: &Url, base: &Url, proxy_base: &str) -> String {
    let trimmed = line.trim();

    if trimmed.is_empty() {
        return line.to_string();
    }

    if trimmed.starts_with('#') {
        // tags like #EXT-X-KEY and #EXT-X-MAP carry URI="..." attributes that
        // point at keys, init segments or partial segments
        if line.contains(URI_ATTRIBUTE) {
            return rewrite_uri_attributes(line, source, base, proxy_base);
        }
        return line.to_string();
    }

    // plain line: a segment or sub-playlist reference
    match rewrite_reference(trimmed, source, base, proxy_base) {
        Some(rewritten) => rewritten,
        None => {
            warn!("could not resolve playlist reference, passing through: {}", trimmed);
            line.to_string()
        }
    }
}

// rewrite each URI="..." value in place, leaving everything around it verbatim
fn rewrite_uri_attributes(line: &str, source: &Url, base: &Url, proxy_base: &str) -> String {
    let mut out = String::with_capacity(line.len() * 2);
    let mut rest = line;

    while let Some(idx) = rest.find(URI_ATTRIBUTE) {
        let value_start = idx + URI_ATTRIBUTE.len();
        out.push_str(&rest[..value_start]);
        rest = &rest[value_start..];

        let Some(value_end) = rest.find('"') else {
            // unterminated attribute, emit the tail untouched
            break;
        };

        let value = &rest[..value_end];
        match rewrite_reference(value, source, base, proxy_base) {
            Some(rewritten) => out.push_str(&rewritten),
            None => {
                warn!("could not resolve URI attribute, passing through: {}", value);
                out.push_str(value);
            }
        }

        // closing quote and the rest of the line are handled by the next pass
        rest = &rest[value_end..];
    }

    out.push_str(rest);
    out
}

// resolve a reference to an absolute url and wrap it in a proxied path.
// references that already point at the proxy are left alone so a second pass
// over the same playlist is a no-op.
fn rewrite_reference(
    reference: &str,
    source: &Url,
    base: &Url,
    proxy_base: &str,
) -> Option<String> {
    if reference.starts_with(proxy_base) {
        return Some(reference.to_string());
    }

    let absolute = resolve_reference(reference, source, base)?;

    Some(format!(
        "{}?url={}",
        proxy_base,
        urlencoding::encode(&absolute)
    ))
}

fn resolve_reference(reference: &str, source: &Url, base: &Url) -> Option<String> {
    if reference.starts_with("http://") || reference.starts_with("https://") {
        return Some(reference.to_string());
    }

    // protocol-relative: //host/path inherits the source's scheme
    if let Some(rest) = reference.strip_prefix("//") {
        return Some(format!("{}://{}", source.scheme(), rest));
    }

    match base.join(reference) {
        Ok(resolved) => Some(resolved.to_string()),
        Err(e) => {
            error!("failed to resolve {} against {}: {}", reference, base, e);
            None
        }
    }
}
