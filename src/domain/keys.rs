/// A single uploaded or dispensed one-time prekey. `key_id` is scoped to the
/// owning user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OneTimePrekey {
    pub key_id: i32,
    pub public_key: Vec<u8>,
}

/// The X3DH bundle a sender needs to initiate an asynchronous session.
/// `one_time_prekey` is `None` once the recipient's supply is exhausted.
#[derive(Debug, Clone)]
pub struct KeyBundle {
    pub identity_key: Vec<u8>,
    pub signed_prekey: Vec<u8>,
    pub prekey_signature: Vec<u8>,
    pub one_time_prekey: Option<OneTimePrekey>,
}

/// Everything a registration call stores. Key material is opaque bytes; the
/// server never constrains its shape.
#[derive(Debug, Clone)]
pub struct Registration {
    pub phone_hash: String,
    pub identity_key: Vec<u8>,
    pub signed_prekey: Vec<u8>,
    pub prekey_signature: Vec<u8>,
    pub one_time_prekeys: Vec<OneTimePrekey>,
}
