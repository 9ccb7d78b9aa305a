use std::fmt::Debug;
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::storage::file::BlockId;
use crate::storage::page::Page;

pub mod buffer;
pub mod file;
pub mod memory;
pub mod page;
pub mod wal;

/// Transaction identifier, assigned by the transaction layer.
pub type TxId = u64;

/// Block-granular file storage: every file is a sequence of page-sized
/// blocks addressed by a [`BlockId`].
///
/// The trait is designed as `trait object` compatible so backends can be
/// swapped behind `Arc<dyn FileManager>`; all methods take `&self` and
/// implementations synchronize internally.
pub trait FileManager: Debug + Send + Sync {
    /// Reads the given block into the page buffer. A block past the end
    /// of its file reads as all zeroes.
    fn read(&self, blk: &BlockId, page: &mut Page) -> Result<()>;

    /// Writes the page buffer to the given block, extending the file as
    /// needed.
    fn write(&self, blk: &BlockId, page: &Page) -> Result<()>;

    /// Extends the file by one zeroed block, returning its id.
    fn append(&self, file_name: &str) -> Result<BlockId>;

    /// Returns the number of blocks in the file.
    fn size(&self, file_name: &str) -> Result<u64>;
}

#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageType {
    Memory,
    Disk,
}

pub fn new_file_manager(typ: StorageType, dir: &Path) -> Result<Arc<dyn FileManager>> {
    match typ {
        StorageType::Memory => Ok(Arc::new(memory::Memory::new())),
        StorageType::Disk => Ok(Arc::new(file::DiskManager::new(dir)?)),
    }
}
