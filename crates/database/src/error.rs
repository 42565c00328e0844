//! Database-specific errors.

use eventide_common::StoreError;
use thiserror::Error;

/// Result alias of the database layer.
pub type DbResult<T> = Result<T, DbError>;

/// Database-specific errors.
#[derive(Debug, Error)]
pub enum DbError {
    /// Sled operation failed.
    #[error("sled: {0}")]
    Sled(#[from] sled::Error),

    /// A stored record failed to decode.
    #[error("corrupt record in {tree}: {message}")]
    CorruptRecord {
        /// Tree the record lives in.
        tree: &'static str,
        /// Decoder message.
        message: String,
    },

    /// A stored key failed to decode.
    #[error("corrupt key in {tree}")]
    CorruptKey {
        /// Tree the key lives in.
        tree: &'static str,
    },

    /// A record failed to encode.
    #[error("encode: {0}")]
    Encode(String),

    /// The blocking task running the operation was cancelled.
    #[error("blocking task cancelled: {0}")]
    TaskCancelled(String),
}

impl DbError {
    pub(crate) fn corrupt(tree: &'static str, err: impl std::fmt::Display) -> Self {
        DbError::CorruptRecord {
            tree,
            message: err.to_string(),
        }
    }
}

impl From<DbError> for StoreError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::Sled(e) => StoreError::database(e.to_string()),
            DbError::Encode(e) => StoreError::serialization(e),
            DbError::CorruptRecord { .. } | DbError::CorruptKey { .. } => {
                StoreError::deserialization(err.to_string())
            }
            DbError::TaskCancelled(e) => StoreError::database(e),
        }
    }
}
