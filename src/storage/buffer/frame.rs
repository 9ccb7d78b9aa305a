use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};

use crate::error::{Error, Result};
use crate::storage::file::BlockId;
use crate::storage::page::Page;
use crate::storage::wal::{LogManager, Lsn};
use crate::storage::{FileManager, TxId};

use super::history::{millis, RefHistory};
use super::FrameId;

/// A page-sized slot in the buffer pool. The latch guards the slot's
/// residence, contents and flush; a handful of atomics mirror the state
/// the victim scan needs so it can walk the pool without latching every
/// frame.
pub struct Frame {
    id: FrameId,
    /// Number of live pins. Written only under the latch; read lock-free.
    pin_count: AtomicU32,
    /// Published replacement metadata of the resident block, maintained
    /// under the latch.
    resident: AtomicBool,
    last_reference: AtomicU64,
    order: AtomicU64,
    inner: Mutex<FrameInner>,
}

/// The latched state of a frame.
pub(super) struct FrameInner {
    pub(super) page: Page,
    pub(super) block: Option<BlockId>,
    pub(super) history: RefHistory,
    pub(super) dirty: bool,
    pub(super) last_lsn: Option<Lsn>,
    pub(super) modifying_txs: HashSet<TxId>,
}

impl FrameInner {
    fn new(k: usize) -> FrameInner {
        FrameInner {
            page: Page::new(),
            block: None,
            history: RefHistory::new(k),
            dirty: false,
            last_lsn: None,
            modifying_txs: HashSet::new(),
        }
    }

    pub(super) fn is_modified_by(&self, tx: TxId) -> bool {
        self.modifying_txs.contains(&tx)
    }

    /// Writes the page back if dirty, flushing the log through the page's
    /// lsn first so the data file never runs ahead of the WAL.
    pub(super) fn flush(&mut self, files: &dyn FileManager, wal: &dyn LogManager) -> Result<()> {
        if !self.dirty {
            return Ok(());
        }
        let blk = self
            .block
            .clone()
            .ok_or_else(|| Error::internal("dirty frame with no resident block"))?;
        if let Some(lsn) = self.last_lsn {
            wal.flush_to(lsn)?;
        }
        files.write(&blk, &self.page)?;
        self.dirty = false;
        self.modifying_txs.clear();
        Ok(())
    }

    /// Drops the current residence and reads `blk` into the buffer,
    /// flushing the old page first if it was dirty. The reference history
    /// starts over: it belongs to the residence, not the block.
    pub(super) fn assign_to_block(
        &mut self,
        files: &dyn FileManager,
        wal: &dyn LogManager,
        blk: &BlockId,
        k: usize,
    ) -> Result<()> {
        self.flush(files, wal)?;
        self.block = Some(blk.clone());
        self.history = RefHistory::new(k);
        files.read(blk, &mut self.page)
    }

    /// Takes residence of a freshly appended block: the page image is
    /// initialized by the formatter and marked dirty so it reaches disk
    /// on the next flush.
    pub(super) fn assign_to_new(
        &mut self,
        files: &dyn FileManager,
        wal: &dyn LogManager,
        blk: &BlockId,
        k: usize,
        formatter: impl FnOnce(&mut Page),
    ) -> Result<()> {
        self.flush(files, wal)?;
        self.block = Some(blk.clone());
        self.history = RefHistory::new(k);
        self.page.clear();
        formatter(&mut self.page);
        self.dirty = true;
        Ok(())
    }

    /// Drops the current residence and returns the frame to the empty
    /// state.
    pub(super) fn reset(&mut self, k: usize) {
        self.block = None;
        self.history = RefHistory::new(k);
        self.dirty = false;
        self.last_lsn = None;
        self.modifying_txs.clear();
        self.page.clear();
    }
}

impl Frame {
    pub(super) fn new(id: FrameId, k: usize) -> Frame {
        Frame {
            id,
            pin_count: AtomicU32::new(0),
            resident: AtomicBool::new(false),
            last_reference: AtomicU64::new(0),
            order: AtomicU64::new(0),
            inner: Mutex::new(FrameInner::new(k)),
        }
    }

    pub fn id(&self) -> FrameId {
        self.id
    }

    pub fn pin_count(&self) -> u32 {
        self.pin_count.load(Ordering::SeqCst)
    }

    pub fn is_pinned(&self) -> bool {
        self.pin_count() > 0
    }

    /// The block currently resident in this frame, if any.
    pub fn block(&self) -> Result<Option<BlockId>> {
        Ok(self.latch()?.block.clone())
    }

    /// Whether `tx` has modifications in this frame not yet flushed.
    pub fn is_modified_by(&self, tx: TxId) -> Result<bool> {
        Ok(self.latch()?.is_modified_by(tx))
    }

    /// Read access to the page contents. The caller must hold a pin.
    pub fn with_page<R>(&self, f: impl FnOnce(&Page) -> R) -> Result<R> {
        let inner = self.latch()?;
        Ok(f(&inner.page))
    }

    /// Mutates the page contents on behalf of `tx`, marking the frame
    /// dirty and retaining `lsn` for the write-ahead ordering on flush.
    /// The caller must hold a pin.
    pub fn modify_page<R>(
        &self,
        tx: TxId,
        lsn: Option<Lsn>,
        f: impl FnOnce(&mut Page) -> R,
    ) -> Result<R> {
        let mut inner = self.latch()?;
        inner.dirty = true;
        inner.modifying_txs.insert(tx);
        if lsn.is_some() {
            inner.last_lsn = lsn;
        }
        Ok(f(&mut inner.page))
    }

    /// The per-frame latch.
    pub(super) fn latch(&self) -> Result<MutexGuard<'_, FrameInner>> {
        Ok(self.inner.lock()?)
    }

    pub(super) fn try_latch(&self) -> Option<MutexGuard<'_, FrameInner>> {
        self.inner.try_lock().ok()
    }

    /// +1 pin. Callers hold the latch; the count is atomic only so the
    /// victim scan can read it without latching.
    pub(super) fn add_pin(&self) {
        self.pin_count.fetch_add(1, Ordering::SeqCst);
    }

    /// -1 pin, returning the remaining count.
    pub(super) fn release_pin(&self) -> u32 {
        self.pin_count.fetch_sub(1, Ordering::SeqCst) - 1
    }

    /// Publishes the latched replacement metadata for the victim scan.
    pub(super) fn publish_meta(&self, inner: &FrameInner) {
        self.resident.store(inner.block.is_some(), Ordering::SeqCst);
        self.last_reference.store(inner.history.last_reference(), Ordering::SeqCst);
        self.order.store(inner.history.order(), Ordering::SeqCst);
    }

    pub(super) fn resident(&self) -> bool {
        self.resident.load(Ordering::SeqCst)
    }

    /// Published victim key of the resident block.
    pub(super) fn order(&self) -> u64 {
        self.order.load(Ordering::SeqCst)
    }

    /// Whether the resident block's most recent reference is old enough
    /// for the block to be evicted, judged on the published metadata.
    pub(super) fn outside_correlated_window(&self, now: u64, crt: u64) -> bool {
        millis(now) - millis(self.last_reference.load(Ordering::SeqCst)) > crt
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::memory::Memory;
    use crate::storage::wal::MemoryLog;

    #[test]
    fn test_modify_and_flush_cycle() -> Result<()> {
        let files = Memory::new();
        let wal = MemoryLog::new();
        let frame = Frame::new(0, 2);
        let blk = BlockId::new("t", 0);
        {
            let mut inner = frame.latch()?;
            inner.block = Some(blk.clone());
        }

        let lsn = wal.append();
        frame.modify_page(7, Some(lsn), |page| page.as_bytes_mut()[0] = 42)?;
        assert!(frame.is_modified_by(7)?);
        assert!(!frame.is_modified_by(8)?);

        frame.latch()?.flush(&files, &wal)?;
        assert_eq!(lsn, wal.flushed_lsn());
        assert!(!frame.is_modified_by(7)?);

        let mut page = Page::new();
        files.read(&blk, &mut page)?;
        assert_eq!(42, page.as_bytes()[0]);
        Ok(())
    }

    #[test]
    fn test_flush_on_clean_frame_is_a_no_op() -> Result<()> {
        let files = Memory::new();
        let wal = MemoryLog::new();
        let frame = Frame::new(0, 2);

        frame.latch()?.flush(&files, &wal)?;
        assert_eq!(0, files.size("t")?);
        Ok(())
    }

    #[test]
    fn test_reset_returns_frame_to_empty() -> Result<()> {
        let frame = Frame::new(0, 2);
        {
            let mut inner = frame.latch()?;
            inner.block = Some(BlockId::new("t", 1));
            inner.history.record_miss(5);
            inner.dirty = true;
            inner.modifying_txs.insert(3);
            frame.publish_meta(&inner);
        }
        assert!(frame.resident());

        {
            let mut inner = frame.latch()?;
            inner.reset(2);
            frame.publish_meta(&inner);
        }
        assert!(!frame.resident());
        assert_eq!(None, frame.block()?);
        assert!(!frame.is_modified_by(3)?);
        assert_eq!(0, frame.order());
        Ok(())
    }
}
