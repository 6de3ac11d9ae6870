#![allow(clippy::unwrap_used, clippy::panic, clippy::missing_panics_doc, unreachable_pub, missing_debug_implementations)]
mod common;

use base64::{Engine as _, engine::general_purpose::STANDARD};
use common::TestApp;
use serde_json::{Value, json};
use std::collections::HashSet;

#[tokio::test]
async fn bundle_dispenses_prekeys_oldest_first_then_null() {
    let app = TestApp::spawn().await;
    let phone_hash = "a".repeat(64);

    let payload = json!({
        "phone_hash": phone_hash,
        "identity_key": STANDARD.encode(b"IK"),
        "signed_prekey": STANDARD.encode(b"SPK"),
        "prekey_signature": STANDARD.encode(b"SIG"),
        "one_time_prekeys": [
            {"key_id": 1, "public_key": STANDARD.encode(b"K1")},
            {"key_id": 2, "public_key": STANDARD.encode(b"K2")},
        ],
    });
    let resp = app.client.post(format!("{}/api/v1/register", app.server_url)).json(&payload).send().await.unwrap();
    assert_eq!(resp.status(), 200);

    let url = format!("{}/api/v1/keys/{phone_hash}", app.server_url);

    let first: Value = app.client.get(&url).send().await.unwrap().json().await.unwrap();
    assert_eq!(first["identity_key"], STANDARD.encode(b"IK"));
    assert_eq!(first["signed_prekey"], STANDARD.encode(b"SPK"));
    assert_eq!(first["prekey_signature"], STANDARD.encode(b"SIG"));
    assert_eq!(first["one_time_prekey"]["key_id"], 1);
    assert_eq!(first["one_time_prekey"]["public_key"], STANDARD.encode(b"K1"));

    let second: Value = app.client.get(&url).send().await.unwrap().json().await.unwrap();
    assert_eq!(second["one_time_prekey"]["key_id"], 2);

    let third: Value = app.client.get(&url).send().await.unwrap().json().await.unwrap();
    assert_eq!(third["one_time_prekey"], Value::Null);
    assert_eq!(third["identity_key"], STANDARD.encode(b"IK"));
}

#[tokio::test]
async fn unknown_user_is_404() {
    let app = TestApp::spawn().await;

    let resp = app
        .client
        .get(format!("{}/api/v1/keys/{}", app.server_url, common::unique_phone_hash()))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
}

#[tokio::test]
async fn malformed_phone_hash_is_400() {
    let app = TestApp::spawn().await;

    let resp = app.client.get(format!("{}/api/v1/keys/{}", app.server_url, "A".repeat(64))).send().await.unwrap();
    assert_eq!(resp.status(), 400);
}

#[tokio::test]
async fn concurrent_fetches_never_dispense_the_same_prekey() {
    let app = TestApp::spawn().await;

    let prekeys: Vec<(i32, &[u8])> =
        vec![(1, b"P1" as &[u8]), (2, b"P2"), (3, b"P3"), (4, b"P4"), (5, b"P5")];
    let user = common::register_user(&app, &prekeys).await;

    let url = format!("{}/api/v1/keys/{}", app.server_url, user.phone_hash);
    let callers = 8;

    let fetches = (0..callers).map(|_| {
        let client = app.client.clone();
        let url = url.clone();
        async move {
            let resp = client.get(&url).send().await.unwrap();
            assert_eq!(resp.status(), 200);
            resp.json::<Value>().await.unwrap()
        }
    });

    let bundles = futures::future::join_all(fetches).await;

    let mut dispensed = Vec::new();
    let mut exhausted = 0;
    for bundle in bundles {
        match &bundle["one_time_prekey"] {
            Value::Null => exhausted += 1,
            prekey => dispensed.push(prekey["key_id"].as_i64().unwrap()),
        }
    }

    // Exactly min(N, K) winners with distinct ids, the rest exhausted.
    assert_eq!(dispensed.len(), 5);
    assert_eq!(exhausted, callers - 5);
    let distinct: HashSet<i64> = dispensed.iter().copied().collect();
    assert_eq!(distinct.len(), 5, "a prekey was dispensed twice: {dispensed:?}");
}

#[tokio::test]
async fn dispensed_prekey_is_marked_used_not_deleted() {
    let app = TestApp::spawn().await;
    let user = common::register_user(&app, &[(7, b"K7")]).await;

    let resp =
        app.client.get(format!("{}/api/v1/keys/{}", app.server_url, user.phone_hash)).send().await.unwrap();
    assert_eq!(resp.status(), 200);

    let (used_count, total): (i64, i64) = sqlx::query_as(
        "SELECT COUNT(*) FILTER (WHERE used), COUNT(*) FROM one_time_prekeys WHERE user_id = $1",
    )
    .bind(user.user_id)
    .fetch_one(&app.pool)
    .await
    .unwrap();

    assert_eq!(used_count, 1);
    assert_eq!(total, 1);
}
