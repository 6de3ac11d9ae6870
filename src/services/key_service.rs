use crate::domain::keys::{KeyBundle, Registration};
use crate::error::{AppError, Result};
use crate::storage::DbPool;
use crate::storage::key_repo::KeyRepository;
use crate::storage::user_repo::UserRepository;
use opentelemetry::{global, metrics::Counter};

#[derive(Clone, Debug)]
struct Metrics {
    registrations_total: Counter<u64>,
    prekeys_dispensed_total: Counter<u64>,
    bundles_exhausted_total: Counter<u64>,
}

impl Metrics {
    fn new() -> Self {
        let meter = global::meter("umbra-server");
        Self {
            registrations_total: meter
                .u64_counter("umbra_registrations_total")
                .with_description("User registrations and re-registrations")
                .build(),
            prekeys_dispensed_total: meter
                .u64_counter("umbra_prekeys_dispensed_total")
                .with_description("One-time prekeys consumed by bundle fetches")
                .build(),
            bundles_exhausted_total: meter
                .u64_counter("umbra_bundles_exhausted_total")
                .with_description("Bundle fetches served without a one-time prekey")
                .build(),
        }
    }
}

/// Registration and X3DH bundle dispensing.
#[derive(Clone, Debug)]
pub struct KeyService {
    pool: DbPool,
    users: UserRepository,
    prekeys: KeyRepository,
    metrics: Metrics,
}

impl KeyService {
    #[must_use]
    pub fn new(pool: DbPool, users: UserRepository, prekeys: KeyRepository) -> Self {
        Self { pool, users, prekeys, metrics: Metrics::new() }
    }

    /// Stores a user's long-lived key material and one-time prekey batch in
    /// one transaction; partial success is never observable.
    ///
    /// # Errors
    /// Returns `AppError::Database` if any statement fails.
    #[tracing::instrument(err, skip(self, reg), fields(prekey_count = reg.one_time_prekeys.len()))]
    pub async fn register(&self, reg: Registration) -> Result<uuid::Uuid> {
        let mut tx = self.pool.begin().await?;

        let user_id = self.users.upsert_keys(&mut tx, &reg).await?;
        self.prekeys.upsert_one_time_prekeys(&mut tx, user_id, &reg.one_time_prekeys).await?;

        tx.commit().await?;

        self.metrics.registrations_total.add(1, &[]);
        tracing::info!(user_id = %user_id, "Registered key material");

        Ok(user_id)
    }

    /// Assembles a key bundle, atomically consuming at most one unused
    /// prekey. When the supply is exhausted the bundle is served with
    /// `one_time_prekey = None` and the peer falls back to the signed prekey
    /// alone.
    ///
    /// # Errors
    /// Returns `AppError::NotFound` for an unknown `phone_hash`,
    /// `AppError::Database` on storage failure.
    #[tracing::instrument(err(level = "debug"), skip(self))]
    pub async fn fetch_bundle(&self, phone_hash: &str) -> Result<KeyBundle> {
        let mut conn = self.pool.acquire().await?;

        let Some(user) = self.users.find_keys(&mut conn, phone_hash).await? else {
            return Err(AppError::NotFound);
        };

        let one_time_prekey = self.prekeys.consume_oldest_unused(&mut conn, user.id).await?;

        if one_time_prekey.is_some() {
            self.metrics.prekeys_dispensed_total.add(1, &[]);
        } else {
            self.metrics.bundles_exhausted_total.add(1, &[]);
            tracing::debug!("One-time prekey supply exhausted");
        }

        Ok(KeyBundle {
            identity_key: user.identity_key,
            signed_prekey: user.signed_prekey,
            prekey_signature: user.prekey_signature,
            one_time_prekey,
        })
    }
}
