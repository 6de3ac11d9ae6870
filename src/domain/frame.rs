use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use uuid::Uuid;

/// The frame text was not valid JSON. Per the gateway contract this is the
/// only parse outcome that terminates the connection; everything else is a
/// silent drop.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("malformed frame")]
pub struct MalformedFrame;

/// Client-to-server frames, keyed by the `type` field.
///
/// Signaling variants carry their remaining fields verbatim so the relay can
/// forward them untouched; it never interprets SDP or ICE payloads.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
    EncryptedMessage {
        recipient_id: Uuid,
        payload: String,
    },
    CallOffer {
        recipient_id: Uuid,
        #[serde(flatten)]
        body: Map<String, Value>,
    },
    CallAnswer {
        recipient_id: Uuid,
        #[serde(flatten)]
        body: Map<String, Value>,
    },
    IceCandidate {
        recipient_id: Uuid,
        #[serde(flatten)]
        body: Map<String, Value>,
    },
    CallReject {
        recipient_id: Uuid,
        #[serde(flatten)]
        body: Map<String, Value>,
    },
    CallEnd {
        recipient_id: Uuid,
        #[serde(flatten)]
        body: Map<String, Value>,
    },
}

impl ClientFrame {
    /// Decodes one inbound frame.
    ///
    /// Returns `Ok(None)` for frames that must be dropped without closing the
    /// connection: missing or non-string `type`, unknown `type`, or a known
    /// `type` with missing/invalid required fields.
    ///
    /// # Errors
    /// Returns `MalformedFrame` when the text is not valid JSON.
    pub fn parse(text: &str) -> Result<Option<Self>, MalformedFrame> {
        let value: Value = serde_json::from_str(text).map_err(|_| MalformedFrame)?;

        if value.get("type").and_then(Value::as_str).is_none() {
            return Ok(None);
        }

        Ok(serde_json::from_value(value).ok())
    }

    #[must_use]
    pub const fn recipient_id(&self) -> Uuid {
        match self {
            Self::EncryptedMessage { recipient_id, .. }
            | Self::CallOffer { recipient_id, .. }
            | Self::CallAnswer { recipient_id, .. }
            | Self::IceCandidate { recipient_id, .. }
            | Self::CallReject { recipient_id, .. }
            | Self::CallEnd { recipient_id, .. } => *recipient_id,
        }
    }

    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::EncryptedMessage { .. } => "encrypted_message",
            Self::CallOffer { .. } => "call_offer",
            Self::CallAnswer { .. } => "call_answer",
            Self::IceCandidate { .. } => "ice_candidate",
            Self::CallReject { .. } => "call_reject",
            Self::CallEnd { .. } => "call_end",
        }
    }

    /// Rewrites a signaling frame for delivery: `recipient_id` is replaced by
    /// the authenticated `sender_id`, everything else passes through.
    /// Returns `None` for `EncryptedMessage`, which has its own delivery path.
    #[must_use]
    pub fn into_forward(self, sender_id: Uuid) -> Option<ServerFrame> {
        match self {
            Self::EncryptedMessage { .. } => None,
            Self::CallOffer { body, .. } => Some(ServerFrame::CallOffer { sender_id, body }),
            Self::CallAnswer { body, .. } => Some(ServerFrame::CallAnswer { sender_id, body }),
            Self::IceCandidate { body, .. } => Some(ServerFrame::IceCandidate { sender_id, body }),
            Self::CallReject { body, .. } => Some(ServerFrame::CallReject { sender_id, body }),
            Self::CallEnd { body, .. } => Some(ServerFrame::CallEnd { sender_id, body }),
        }
    }
}

/// Server-to-client frames. Same tag set as [`ClientFrame`] with `sender_id`
/// in place of `recipient_id`.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerFrame {
    EncryptedMessage {
        sender_id: Uuid,
        payload: String,
        timestamp: String,
    },
    CallOffer {
        sender_id: Uuid,
        #[serde(flatten)]
        body: Map<String, Value>,
    },
    CallAnswer {
        sender_id: Uuid,
        #[serde(flatten)]
        body: Map<String, Value>,
    },
    IceCandidate {
        sender_id: Uuid,
        #[serde(flatten)]
        body: Map<String, Value>,
    },
    CallReject {
        sender_id: Uuid,
        #[serde(flatten)]
        body: Map<String, Value>,
    },
    CallEnd {
        sender_id: Uuid,
        #[serde(flatten)]
        body: Map<String, Value>,
    },
}

impl ServerFrame {
    #[must_use]
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}
