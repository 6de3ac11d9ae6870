#![allow(clippy::unwrap_used, clippy::panic, clippy::missing_panics_doc, unreachable_pub, missing_debug_implementations)]
mod common;

use common::TestApp;
use serde_json::Value;
use umbra_server::config::{Config, RateLimitConfig};

#[tokio::test]
async fn key_fetches_beyond_the_limit_get_429_with_retry_hint() {
    let config = Config {
        rate_limit: RateLimitConfig { keys_per_minute: 2, ..common::get_test_config().rate_limit },
        ..common::get_test_config()
    };
    let app = TestApp::spawn_with_config(config).await;

    let url = format!("{}/api/v1/keys/{}", app.server_url, common::unique_phone_hash());

    // The limiter sits in front of the handler, so 404s burn budget too.
    for _ in 0..2 {
        let resp = app.client.get(&url).send().await.unwrap();
        assert_eq!(resp.status(), 404);
    }

    let resp = app.client.get(&url).send().await.unwrap();
    assert_eq!(resp.status(), 429);
    assert!(resp.headers().contains_key("retry-after"));

    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["detail"], "Rate limit exceeded");
    assert!(body["retry_after"].as_u64().is_some());
}

#[tokio::test]
async fn other_routes_are_not_throttled_by_the_keys_limiter() {
    let config = Config {
        rate_limit: RateLimitConfig { keys_per_minute: 1, ..common::get_test_config().rate_limit },
        ..common::get_test_config()
    };
    let app = TestApp::spawn_with_config(config).await;

    let keys_url = format!("{}/api/v1/keys/{}", app.server_url, common::unique_phone_hash());
    let _ = app.client.get(&keys_url).send().await.unwrap();
    let throttled = app.client.get(&keys_url).send().await.unwrap();
    assert_eq!(throttled.status(), 429);

    // Health and registration still answer.
    let resp = app.client.get(format!("{}/health/", app.server_url)).send().await.unwrap();
    assert_eq!(resp.status(), 200);

    let user = common::register_user(&app, &[]).await;
    let _ = common::issue_token(&app, &user).await;
}
