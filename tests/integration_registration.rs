#![allow(clippy::unwrap_used, clippy::panic, clippy::missing_panics_doc, unreachable_pub, missing_debug_implementations)]
mod common;

use base64::{Engine as _, engine::general_purpose::STANDARD};
use common::TestApp;
use serde_json::{Value, json};
use uuid::Uuid;

#[tokio::test]
async fn register_creates_user_with_raw_key_material() {
    let app = TestApp::spawn().await;
    let user = common::register_user(&app, &[(1, b"K1"), (2, b"K2")]).await;

    let (identity_key, signed_prekey): (Vec<u8>, Vec<u8>) =
        sqlx::query_as("SELECT identity_key, signed_prekey FROM users WHERE id = $1")
            .bind(user.user_id)
            .fetch_one(&app.pool)
            .await
            .unwrap();

    assert_eq!(identity_key, user.signing_key.verifying_key().to_bytes().to_vec());
    assert_eq!(signed_prekey, b"SPK".to_vec());

    let prekey_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM one_time_prekeys WHERE user_id = $1")
        .bind(user.user_id)
        .fetch_one(&app.pool)
        .await
        .unwrap();
    assert_eq!(prekey_count, 2);
}

#[tokio::test]
async fn re_registration_overwrites_material_and_keeps_identifier() {
    let app = TestApp::spawn().await;
    let user = common::register_user(&app, &[]).await;

    let payload = json!({
        "phone_hash": user.phone_hash,
        "identity_key": STANDARD.encode(b"fresh-identity"),
        "signed_prekey": STANDARD.encode(b"fresh-spk"),
        "prekey_signature": STANDARD.encode(b"fresh-sig"),
        "one_time_prekeys": [],
    });

    let resp = app.client.post(format!("{}/api/v1/register", app.server_url)).json(&payload).send().await.unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["user_id"], json!(user.user_id));

    let identity_key: Vec<u8> = sqlx::query_scalar("SELECT identity_key FROM users WHERE id = $1")
        .bind(user.user_id)
        .fetch_one(&app.pool)
        .await
        .unwrap();
    assert_eq!(identity_key, b"fresh-identity".to_vec());
}

#[tokio::test]
async fn malformed_phone_hash_is_rejected() {
    let app = TestApp::spawn().await;

    for bad in ["short", &"A".repeat(64), &"g".repeat(64), &"a".repeat(65)] {
        let payload = json!({
            "phone_hash": bad,
            "identity_key": STANDARD.encode(b"IK"),
            "signed_prekey": STANDARD.encode(b"SPK"),
            "prekey_signature": STANDARD.encode(b"SIG"),
            "one_time_prekeys": [],
        });

        let resp =
            app.client.post(format!("{}/api/v1/register", app.server_url)).json(&payload).send().await.unwrap();
        assert_eq!(resp.status(), 400, "accepted phone_hash {bad:?}");
    }
}

#[tokio::test]
async fn invalid_base64_key_material_is_rejected() {
    let app = TestApp::spawn().await;

    let payload = json!({
        "phone_hash": common::unique_phone_hash(),
        "identity_key": "not base64!",
        "signed_prekey": STANDARD.encode(b"SPK"),
        "prekey_signature": STANDARD.encode(b"SIG"),
        "one_time_prekeys": [],
    });

    let resp = app.client.post(format!("{}/api/v1/register", app.server_url)).json(&payload).send().await.unwrap();
    assert_eq!(resp.status(), 400);

    let body: Value = resp.json().await.unwrap();
    assert!(body["error"].as_str().unwrap().contains("identity_key"));
}

#[tokio::test]
async fn partial_registration_is_never_observable() {
    let app = TestApp::spawn().await;
    let phone_hash = common::unique_phone_hash();

    // The batch itself fails validation, so neither the user row nor any
    // prekey row may land.
    let payload = json!({
        "phone_hash": phone_hash,
        "identity_key": STANDARD.encode(b"IK"),
        "signed_prekey": STANDARD.encode(b"SPK"),
        "prekey_signature": STANDARD.encode(b"SIG"),
        "one_time_prekeys": [{"key_id": 1, "public_key": "not base64!"}],
    });

    let resp = app.client.post(format!("{}/api/v1/register", app.server_url)).json(&payload).send().await.unwrap();
    assert_eq!(resp.status(), 400);

    let user_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE phone_hash = $1")
        .bind(&phone_hash)
        .fetch_one(&app.pool)
        .await
        .unwrap();
    assert_eq!(user_count, 0);
}

#[tokio::test]
async fn prekey_reupload_resets_consumed_flag() {
    let app = TestApp::spawn().await;
    let user = common::register_user(&app, &[(1, b"K1")]).await;

    // Consume the only prekey.
    let resp =
        app.client.get(format!("{}/api/v1/keys/{}", app.server_url, user.phone_hash)).send().await.unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["one_time_prekey"]["key_id"], 1);

    // Re-upload the same key id.
    let payload = common::registration_payload(&user.phone_hash, &user.signing_key, &[(1, b"K1-again")]);
    let resp = app.client.post(format!("{}/api/v1/register", app.server_url)).json(&payload).send().await.unwrap();
    assert_eq!(resp.status(), 200);

    let resp =
        app.client.get(format!("{}/api/v1/keys/{}", app.server_url, user.phone_hash)).send().await.unwrap();
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["one_time_prekey"]["key_id"], 1);
    assert_eq!(body["one_time_prekey"]["public_key"], STANDARD.encode(b"K1-again"));
}

#[tokio::test]
async fn registration_with_empty_prekey_batch_is_valid() {
    let app = TestApp::spawn().await;
    let user = common::register_user(&app, &[]).await;
    assert_ne!(user.user_id, Uuid::nil());
}
