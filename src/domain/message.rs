use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use uuid::Uuid;

/// A ciphertext envelope stored for an offline recipient.
#[derive(Debug, Clone)]
pub struct QueuedEnvelope {
    pub id: Uuid,
    pub sender_id: Uuid,
    pub payload: Vec<u8>,
    pub timestamp: OffsetDateTime,
}

/// RFC-3339 rendering used for the `timestamp` field of relayed frames.
#[must_use]
pub fn rfc3339(ts: OffsetDateTime) -> String {
    ts.format(&Rfc3339).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rfc3339_renders_utc() {
        let ts = OffsetDateTime::from_unix_timestamp(1_700_000_000).unwrap();
        assert_eq!(rfc3339(ts), "2023-11-14T22:13:20Z");
    }
}
