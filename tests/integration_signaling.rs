#![allow(clippy::unwrap_used, clippy::panic, clippy::missing_panics_doc, unreachable_pub, missing_debug_implementations)]
mod common;

use common::TestApp;
use serde_json::json;
use std::time::Duration;

#[tokio::test]
async fn signaling_is_forwarded_verbatim_with_sender_injected() {
    let app = TestApp::spawn().await;
    let (caller, mut caller_ws) = common::register_and_connect(&app).await;
    let (callee, mut callee_ws) = common::register_and_connect(&app).await;

    common::send_json(
        &mut caller_ws,
        &json!({
            "type": "call_offer",
            "recipient_id": callee.user_id,
            "sdp": "v=0\r\no=- 46117 2 IN IP4 127.0.0.1",
            "call_id": "call-123",
        }),
    )
    .await;

    let frame = common::recv_json(&mut callee_ws).await;
    assert_eq!(frame["type"], "call_offer");
    assert_eq!(frame["sender_id"], json!(caller.user_id));
    assert_eq!(frame["sdp"], "v=0\r\no=- 46117 2 IN IP4 127.0.0.1");
    assert_eq!(frame["call_id"], "call-123");
    assert!(frame.get("recipient_id").is_none());
}

#[tokio::test]
async fn every_signaling_kind_is_relayed() {
    let app = TestApp::spawn().await;
    let (_, mut caller_ws) = common::register_and_connect(&app).await;
    let (callee, mut callee_ws) = common::register_and_connect(&app).await;

    for kind in ["call_offer", "call_answer", "ice_candidate", "call_reject", "call_end"] {
        common::send_json(
            &mut caller_ws,
            &json!({"type": kind, "recipient_id": callee.user_id, "marker": kind}),
        )
        .await;

        let frame = common::recv_json(&mut callee_ws).await;
        assert_eq!(frame["type"], kind);
        assert_eq!(frame["marker"], kind);
    }
}

#[tokio::test]
async fn signaling_to_offline_recipient_leaves_no_state_and_no_error() {
    let app = TestApp::spawn().await;
    let (sender, mut sender_ws) = common::register_and_connect(&app).await;
    let offline = common::register_user(&app, &[]).await;

    common::send_json(
        &mut sender_ws,
        &json!({"type": "call_offer", "recipient_id": offline.user_id, "sdp": "v=0"}),
    )
    .await;

    // Give the relay time to (incorrectly) persist before we look.
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(common::pending_count(&app.pool, offline.user_id).await, 0);

    // No error surfaced: the sender's session still relays.
    common::send_json(
        &mut sender_ws,
        &json!({"type": "encrypted_message", "recipient_id": sender.user_id, "payload": "c3RpbGwtb24="}),
    )
    .await;
    let frame = common::recv_json(&mut sender_ws).await;
    assert_eq!(frame["payload"], "c3RpbGwtb24=");
}
