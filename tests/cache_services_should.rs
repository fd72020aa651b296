use std::time::Duration;

use streamgate::server::services::cache_services::{
    ResponseCacheService, ResponseCacheServiceTrait,
};

// long sweep interval keeps the background task out of these tests, expiry
// behaviour is exercised through lazy deletion on get
fn cache() -> ResponseCacheService {
    ResponseCacheService::new(Duration::from_secs(3600))
}

#[tokio::test]
async fn test_round_trip() {
    let cache = cache();

    cache
        .set(
            "https://cdn.example.com/a.ts",
            b"payload".to_vec(),
            "video/mp2t",
            300,
        )
        .await;

    let (body, content_type) = cache
        .get("https://cdn.example.com/a.ts")
        .await
        .expect("entry should be fresh");
    assert_eq!(body, b"payload");
    assert_eq!(content_type, "video/mp2t");

    cache.destroy().await;
}

#[tokio::test]
async fn test_keys_are_not_normalized() {
    let cache = cache();

    cache
        .set("https://cdn.example.com/a.ts", b"x".to_vec(), "video/mp2t", 300)
        .await;

    // different spelling, different entry
    assert!(cache.get("https://CDN.example.com/a.ts").await.is_none());

    cache.destroy().await;
}

#[tokio::test]
async fn test_expired_entry_is_deleted_on_get() {
    let cache = cache();

    cache
        .set("https://cdn.example.com/live.m3u8", b"#EXTM3U".to_vec(), "application/vnd.apple.mpegurl", 1)
        .await;
    assert_eq!(cache.stats().await.entries, 1);

    tokio::time::sleep(Duration::from_millis(1200)).await;

    assert!(cache.get("https://cdn.example.com/live.m3u8").await.is_none());
    // deleted, not just ignored
    assert_eq!(cache.stats().await.entries, 0);

    cache.destroy().await;
}

#[tokio::test]
async fn test_clear_drops_everything() {
    let cache = cache();

    cache.set("a", b"1".to_vec(), "video/mp2t", 300).await;
    cache.set("b", b"2".to_vec(), "video/mp2t", 300).await;
    assert_eq!(cache.stats().await.entries, 2);

    cache.clear().await;
    assert_eq!(cache.stats().await.entries, 0);
    assert!(cache.get("a").await.is_none());

    cache.destroy().await;
}

#[tokio::test]
async fn test_overwrite_replaces_entry() {
    let cache = cache();

    cache.set("a", b"old".to_vec(), "video/mp2t", 300).await;
    cache.set("a", b"new".to_vec(), "video/mp2t", 300).await;

    let (body, _) = cache.get("a").await.expect("entry should exist");
    assert_eq!(body, b"new");
    assert_eq!(cache.stats().await.entries, 1);

    cache.destroy().await;
}

#[tokio::test]
async fn test_destroy_clears_entries_and_stops_sweep() {
    let cache = cache();

    cache.set("a", b"1".to_vec(), "video/mp2t", 300).await;
    cache.destroy().await;

    assert_eq!(cache.stats().await.entries, 0);
    assert!(cache.get("a").await.is_none());
}

#[tokio::test]
async fn test_background_sweep_deletes_expired_entries() {
    // short sweep interval so the task actually runs during the test
    let cache = ResponseCacheService::new(Duration::from_millis(200));

    cache.set("a", b"1".to_vec(), "video/mp2t", 1).await;
    cache.set("b", b"2".to_vec(), "video/mp2t", 300).await;

    tokio::time::sleep(Duration::from_millis(1600)).await;

    // the expired entry is gone without any get() observing it
    assert_eq!(cache.stats().await.entries, 1);
    assert!(cache.get("b").await.is_some());

    cache.destroy().await;
}
