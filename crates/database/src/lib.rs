//! sled-backed sync store for the eventide sync core.

pub mod cache_key;
mod error;
mod init;
mod keys;
mod rpc_cache;
mod sleddb;
mod storage;

pub use error::{DbError, DbResult};
pub use init::init_db_storage;
pub use rpc_cache::CachedEthClient;
pub use storage::Storage;
