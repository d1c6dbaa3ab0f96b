//! PostgreSQL repositories for campus-gate.
//!
//! Each repository implements one of the engine's storage traits:
//! - Identity records and their alt-account lookup
//! - Identity overrides with soft deletion
//! - Community configuration documents
//! - Community ban lists
//! - The custom import overlay
//! - Pending verification requests

pub mod bans;
pub mod communities;
pub mod custom_imports;
pub mod identities;
pub mod overrides;
pub mod verification_requests;

pub use bans::PgBanStore;
pub use communities::PgConfigSource;
pub use custom_imports::PgCustomImportOverlay;
pub use identities::PgIdentityStore;
pub use overrides::PgOverrideStore;
pub use verification_requests::PgPendingStore;

use campus_gate_verification::StoreError;
use sqlx::PgPool;

/// Maps a database error onto the engine's store error.
pub(crate) fn store_error(err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Decode(_) | sqlx::Error::ColumnDecode { .. } => StoreError::Corrupt {
            reason: err.to_string(),
        },
        other => StoreError::Unavailable {
            reason: other.to_string(),
        },
    }
}

/// Builds a decode error for a column holding an unexpected value.
pub(crate) fn invalid_data(message: String) -> sqlx::Error {
    sqlx::Error::Decode(Box::new(std::io::Error::new(
        std::io::ErrorKind::InvalidData,
        message,
    )))
}

/// Every repository, sharing one pool.
#[derive(Clone)]
pub struct Stores {
    pub identities: PgIdentityStore,
    pub overrides: PgOverrideStore,
    pub configs: PgConfigSource,
    pub bans: PgBanStore,
    pub custom_imports: PgCustomImportOverlay,
    pub verification_requests: PgPendingStore,
}

impl Stores {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self {
            identities: PgIdentityStore::new(pool.clone()),
            overrides: PgOverrideStore::new(pool.clone()),
            configs: PgConfigSource::new(pool.clone()),
            bans: PgBanStore::new(pool.clone()),
            custom_imports: PgCustomImportOverlay::new(pool.clone()),
            verification_requests: PgPendingStore::new(pool),
        }
    }
}
