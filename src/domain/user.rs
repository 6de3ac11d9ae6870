use uuid::Uuid;

/// The slice of a user row needed to authenticate a token request: the
/// identifier plus the long-lived public key the caller must prove possession
/// of.
#[derive(Debug, Clone)]
pub struct AuthMaterial {
    pub user_id: Uuid,
    pub identity_key: Vec<u8>,
}

/// A stored push-notification routing token. Fan-out is a future
/// collaborator; the relay only keeps the mapping current.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushToken {
    pub token: String,
    pub platform: String,
}
