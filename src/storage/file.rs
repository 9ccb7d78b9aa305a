use std::collections::HashMap;
use std::fmt::{Display, Formatter};
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use crate::error::Result;
use crate::storage::page::{Page, PAGE_SIZE};
use crate::storage::FileManager;

/// A reference to a disk block: the name of the file it lives in and its
/// position within that file. A BlockId does not hold the block contents;
/// that is the job of a [`Page`].
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockId {
    file_name: String,
    number: u64,
}

impl BlockId {
    pub fn new(file_name: impl Into<String>, number: u64) -> BlockId {
        BlockId { file_name: file_name.into(), number }
    }

    /// The name of the file where the block lives.
    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    /// The location of the block within the file.
    pub fn number(&self) -> u64 {
        self.number
    }
}

impl Display for BlockId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "[file {}, block {}]", self.file_name, self.number)
    }
}

/// A file manager over a data directory, one file per table or log, each
/// a sequence of page-sized blocks. File handles are opened on demand and
/// cached; each handle carries its own lock so I/O on different files
/// proceeds in parallel.
#[derive(Debug)]
pub struct DiskManager {
    dir: PathBuf,
    files: Mutex<HashMap<String, Arc<Mutex<File>>>>,
}

impl DiskManager {
    pub fn new(dir: impl Into<PathBuf>) -> Result<DiskManager> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(DiskManager { dir, files: Mutex::new(HashMap::new()) })
    }

    fn open(&self, file_name: &str) -> Result<Arc<Mutex<File>>> {
        let mut files = self.files.lock()?;
        if let Some(file) = files.get(file_name) {
            return Ok(Arc::clone(file));
        }
        let path = self.dir.join(file_name);
        let file = OpenOptions::new().read(true).write(true).create(true).open(path)?;
        let file = Arc::new(Mutex::new(file));
        files.insert(file_name.to_string(), Arc::clone(&file));
        Ok(file)
    }
}

impl FileManager for DiskManager {
    fn read(&self, blk: &BlockId, page: &mut Page) -> Result<()> {
        let file = self.open(blk.file_name())?;
        let mut file = file.lock()?;
        let offset = blk.number() * PAGE_SIZE as u64;
        if offset >= file.metadata()?.len() {
            page.clear();
            return Ok(());
        }
        file.seek(SeekFrom::Start(offset))?;
        file.read_exact(page.as_bytes_mut())?;
        Ok(())
    }

    fn write(&self, blk: &BlockId, page: &Page) -> Result<()> {
        let file = self.open(blk.file_name())?;
        let mut file = file.lock()?;
        file.seek(SeekFrom::Start(blk.number() * PAGE_SIZE as u64))?;
        file.write_all(page.as_bytes())?;
        Ok(())
    }

    fn append(&self, file_name: &str) -> Result<BlockId> {
        let file = self.open(file_name)?;
        let mut file = file.lock()?;
        let number = file.metadata()?.len() / PAGE_SIZE as u64;
        file.seek(SeekFrom::Start(number * PAGE_SIZE as u64))?;
        file.write_all(Page::new().as_bytes())?;
        Ok(BlockId::new(file_name, number))
    }

    fn size(&self, file_name: &str) -> Result<u64> {
        let file = self.open(file_name)?;
        let file = file.lock()?;
        Ok(file.metadata()?.len() / PAGE_SIZE as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_dir(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("bufpool-{}-{}", name, std::process::id()))
    }

    #[test]
    fn test_block_id_identity_and_order() {
        let a = BlockId::new("a", 1);
        assert_eq!(a, BlockId::new("a", 1));
        assert_ne!(a, BlockId::new("a", 2));
        assert_ne!(a, BlockId::new("b", 1));
        // file name orders first, block number second
        assert!(BlockId::new("a", 2) < BlockId::new("b", 1));
        assert!(BlockId::new("a", 1) < BlockId::new("a", 2));
        assert_eq!("[file a, block 1]", format!("{}", a));
    }

    #[test]
    fn test_append_write_read_roundtrip() -> Result<()> {
        let dir = test_dir("roundtrip");
        let _ = std::fs::remove_dir_all(&dir);
        let dm = DiskManager::new(&dir)?;

        assert_eq!(0, dm.size("a.tbl")?);
        let b0 = dm.append("a.tbl")?;
        let b1 = dm.append("a.tbl")?;
        assert_eq!(0, b0.number());
        assert_eq!(1, b1.number());
        assert_eq!(2, dm.size("a.tbl")?);

        let mut page = Page::new();
        page.as_bytes_mut()[..5].copy_from_slice(b"hello");
        dm.write(&b1, &page)?;

        let mut readback = Page::new();
        dm.read(&b1, &mut readback)?;
        assert_eq!(b"hello", &readback.as_bytes()[..5]);

        // a freshly appended block reads as zeroes
        dm.read(&b0, &mut readback)?;
        assert!(readback.as_bytes().iter().all(|&b| b == 0));

        std::fs::remove_dir_all(&dir).ok();
        Ok(())
    }

    #[test]
    fn test_read_past_end_of_file_is_zeroes() -> Result<()> {
        let dir = test_dir("pasteof");
        let _ = std::fs::remove_dir_all(&dir);
        let dm = DiskManager::new(&dir)?;

        let mut page = Page::new();
        page.as_bytes_mut()[0] = 9;
        dm.read(&BlockId::new("a.tbl", 7), &mut page)?;
        assert_eq!(0, page.as_bytes()[0]);

        std::fs::remove_dir_all(&dir).ok();
        Ok(())
    }
}
