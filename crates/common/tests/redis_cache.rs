//! Redis cache integration tests.
//!
//! These tests require a running Redis instance.
//! Run with: `cargo test --test redis_cache -- --ignored`
//!
//! Environment variables:
//!   `TEST_REDIS_URL` (default: `redis://localhost:6380`)

#![allow(clippy::unwrap_used)]

use std::sync::Arc;
use std::time::Duration;

use cinekami_common::{Cache, CacheKeys, RedisCache};
use fred::clients::Client;
use fred::interfaces::ClientLike;

async fn connect(namespace: &str) -> RedisCache {
    let url = std::env::var("TEST_REDIS_URL").unwrap_or_else(|_| "redis://localhost:6380".into());
    let config = fred::types::config::Config::from_url(&url).unwrap();
    let client = Client::new(config, None, None, None);
    client.connect();
    client.wait_for_connect().await.unwrap();
    RedisCache::new(Arc::new(client), namespace)
}

#[tokio::test]
#[ignore = "requires running Redis instance"]
async fn test_set_get_delete() {
    let cache = connect("cinekami-test-basic").await;

    cache.set("page", "{\"items\":[]}", Duration::from_secs(30)).await.unwrap();
    assert_eq!(cache.get("page").await.unwrap().as_deref(), Some("{\"items\":[]}"));

    cache.delete("page").await.unwrap();
    assert!(cache.get("page").await.unwrap().is_none());
}

#[tokio::test]
#[ignore = "requires running Redis instance"]
async fn test_delete_prefix_is_scoped() {
    let cache = connect("cinekami-test-prefix").await;
    let ttl = Duration::from_secs(30);

    cache.set("tallies:4:limit:20", "a", ttl).await.unwrap();
    cache.set("tallies:4:limit:50", "b", ttl).await.unwrap();
    cache.set("tallies:42:limit:20", "c", ttl).await.unwrap();

    let removed = cache
        .delete_prefix(&CacheKeys::tallies_prefix(4))
        .await
        .unwrap();
    assert_eq!(removed, 2);
    assert!(cache.get("tallies:42:limit:20").await.unwrap().is_some());

    cache.delete_prefix("tallies:").await.unwrap();
}

#[tokio::test]
#[ignore = "requires running Redis instance"]
async fn test_entries_expire() {
    let cache = connect("cinekami-test-ttl").await;

    cache.set("short", "x", Duration::from_secs(1)).await.unwrap();
    tokio::time::sleep(Duration::from_millis(1500)).await;
    assert!(cache.get("short").await.unwrap().is_none());
}
