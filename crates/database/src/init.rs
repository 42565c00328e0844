//! Store initialization.

use std::{path::Path, sync::Arc};

use crate::{error::DbResult, sleddb::SyncDb, storage::Storage};

/// Opens a single sled instance at `<datadir>/sled` and returns the async
/// store facade.
pub fn init_db_storage(datadir: &Path) -> DbResult<Storage> {
    let db = sled::open(datadir.join("sled"))?;
    Ok(Storage::new(Arc::new(SyncDb::open(&db)?)))
}
