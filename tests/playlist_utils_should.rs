use streamgate::server::utils::playlist_utils::rewrite;

const SOURCE: &str = "https://cdn.example.com/videos/show/index.m3u8";
const PROXY: &str = "/proxy";

#[test]
fn test_relative_segment_is_proxied() {
    let out = rewrite("segment001.ts", SOURCE, PROXY);
    assert_eq!(
        out,
        "/proxy?url=https%3A%2F%2Fcdn.example.com%2Fvideos%2Fshow%2Fsegment001.ts"
    );
}

#[test]
fn test_absolute_url_is_proxied_as_is() {
    let out = rewrite("https://other.example.net/seg/42.ts", SOURCE, PROXY);
    assert_eq!(
        out,
        "/proxy?url=https%3A%2F%2Fother.example.net%2Fseg%2F42.ts"
    );
}

#[test]
fn test_protocol_relative_inherits_source_scheme() {
    let out = rewrite("//other.example.net/seg/42.ts", SOURCE, PROXY);
    assert_eq!(
        out,
        "/proxy?url=https%3A%2F%2Fother.example.net%2Fseg%2F42.ts"
    );

    let http_source = "http://cdn.example.com/videos/show/index.m3u8";
    let out = rewrite("//other.example.net/seg/42.ts", http_source, PROXY);
    assert_eq!(out, "/proxy?url=http%3A%2F%2Fother.example.net%2Fseg%2F42.ts");
}

#[test]
fn test_root_relative_reference() {
    let out = rewrite("/keys/master.key", SOURCE, PROXY);
    assert_eq!(
        out,
        "/proxy?url=https%3A%2F%2Fcdn.example.com%2Fkeys%2Fmaster.key"
    );
}

#[test]
fn test_directive_uri_attribute_is_rewritten_in_place() {
    let out = rewrite("#EXT-X-KEY:METHOD=AES-128,URI=\"key.bin\"", SOURCE, PROXY);
    assert_eq!(
        out,
        "#EXT-X-KEY:METHOD=AES-128,URI=\"/proxy?url=https%3A%2F%2Fcdn.example.com%2Fvideos%2Fshow%2Fkey.bin\""
    );
}

#[test]
fn test_directive_with_attributes_after_uri_keeps_them() {
    let out = rewrite(
        "#EXT-X-MAP:URI=\"init.mp4\",BYTERANGE=\"720@0\"",
        SOURCE,
        PROXY,
    );
    assert_eq!(
        out,
        "#EXT-X-MAP:URI=\"/proxy?url=https%3A%2F%2Fcdn.example.com%2Fvideos%2Fshow%2Finit.mp4\",BYTERANGE=\"720@0\""
    );
}

#[test]
fn test_multiple_uri_attributes_on_one_line() {
    let out = rewrite(
        "#EXT-X-CUSTOM:URI=\"a.ts\",OTHER-URI=\"b.ts\"",
        SOURCE,
        PROXY,
    );
    assert_eq!(
        out,
        "#EXT-X-CUSTOM:URI=\"/proxy?url=https%3A%2F%2Fcdn.example.com%2Fvideos%2Fshow%2Fa.ts\",OTHER-URI=\"/proxy?url=https%3A%2F%2Fcdn.example.com%2Fvideos%2Fshow%2Fb.ts\""
    );
}

#[test]
fn test_plain_directives_and_blanks_pass_through() {
    let input = "#EXTM3U\n#EXT-X-VERSION:3\n#EXTINF:10.0,\n\nsegment001.ts";
    let out = rewrite(input, SOURCE, PROXY);
    let lines: Vec<&str> = out.lines().collect();

    assert_eq!(lines[0], "#EXTM3U");
    assert_eq!(lines[1], "#EXT-X-VERSION:3");
    assert_eq!(lines[2], "#EXTINF:10.0,");
    assert_eq!(lines[3], "");
    assert!(lines[4].starts_with("/proxy?url="));
}

#[test]
fn test_crlf_input_is_normalized() {
    let input = "#EXTM3U\r\nsegment001.ts\r\n";
    let out = rewrite(input, SOURCE, PROXY);
    assert_eq!(
        out,
        "#EXTM3U\n/proxy?url=https%3A%2F%2Fcdn.example.com%2Fvideos%2Fshow%2Fsegment001.ts"
    );
}

#[test]
fn test_rewrite_is_idempotent() {
    let input = "#EXTM3U\n#EXT-X-KEY:METHOD=AES-128,URI=\"key.bin\"\nsegment001.ts";
    let once = rewrite(input, SOURCE, PROXY);
    let twice = rewrite(&once, SOURCE, PROXY);
    assert_eq!(once, twice);
}

#[test]
fn test_query_and_fragment_survive_resolution() {
    let out = rewrite("segment001.ts?token=abc&kid=7", SOURCE, PROXY);
    assert_eq!(
        out,
        format!(
            "/proxy?url={}",
            urlencoding::encode("https://cdn.example.com/videos/show/segment001.ts?token=abc&kid=7")
        )
    );
}

#[test]
fn test_source_without_playlist_extension_is_treated_as_directory() {
    let out = rewrite("seg.ts", "https://cdn.example.com/videos/show", PROXY);
    assert_eq!(
        out,
        "/proxy?url=https%3A%2F%2Fcdn.example.com%2Fvideos%2Fshow%2Fseg.ts"
    );
}

#[test]
fn test_unparseable_source_returns_input_unchanged() {
    let input = "#EXTM3U\nsegment001.ts";
    assert_eq!(rewrite(input, "not a url at all", PROXY), input);
}

#[test]
fn test_unterminated_uri_attribute_passes_through() {
    let input = "#EXT-X-KEY:METHOD=AES-128,URI=\"key.bin";
    assert_eq!(rewrite(input, SOURCE, PROXY), input);
}
