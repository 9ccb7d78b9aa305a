use std::collections::HashMap;
use std::sync::Mutex;

use crate::error::Result;
use crate::storage::file::BlockId;
use crate::storage::page::{Page, PAGE_SIZE};
use crate::storage::FileManager;

/// An in-memory file manager keeping each file as a vector of blocks.
/// Used by tests and ephemeral deployments.
#[derive(Debug, Default)]
pub struct Memory {
    files: Mutex<HashMap<String, Vec<Box<[u8]>>>>,
}

impl Memory {
    pub fn new() -> Memory {
        Memory::default()
    }

    fn empty_block() -> Box<[u8]> {
        vec![0u8; PAGE_SIZE].into_boxed_slice()
    }
}

impl FileManager for Memory {
    fn read(&self, blk: &BlockId, page: &mut Page) -> Result<()> {
        let files = self.files.lock()?;
        let block = files.get(blk.file_name()).and_then(|blocks| blocks.get(blk.number() as usize));
        match block {
            Some(data) => page.as_bytes_mut().copy_from_slice(data),
            None => page.clear(),
        }
        Ok(())
    }

    fn write(&self, blk: &BlockId, page: &Page) -> Result<()> {
        let mut files = self.files.lock()?;
        let blocks = files.entry(blk.file_name().to_string()).or_default();
        let number = blk.number() as usize;
        while blocks.len() <= number {
            blocks.push(Memory::empty_block());
        }
        blocks[number].copy_from_slice(page.as_bytes());
        Ok(())
    }

    fn append(&self, file_name: &str) -> Result<BlockId> {
        let mut files = self.files.lock()?;
        let blocks = files.entry(file_name.to_string()).or_default();
        blocks.push(Memory::empty_block());
        Ok(BlockId::new(file_name, blocks.len() as u64 - 1))
    }

    fn size(&self, file_name: &str) -> Result<u64> {
        let files = self.files.lock()?;
        Ok(files.get(file_name).map_or(0, |blocks| blocks.len() as u64))
    }
}
