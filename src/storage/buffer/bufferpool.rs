use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

use log::{debug, warn};

use crate::error::Result;
use crate::storage::file::BlockId;
use crate::storage::page::Page;
use crate::storage::wal::LogManager;
use crate::storage::{FileManager, TxId};

use super::frame::{Frame, FrameInner};
use super::{BufferOptions, Clock, FrameId};

/// The fixed array of frames plus the bookkeeping that keeps block
/// residency, the available count and victim choice mutually consistent.
struct FrameTable {
    frames: Vec<Arc<Frame>>,
    /// Which frame, if any, currently holds a given block.
    index: RwLock<HashMap<BlockId, FrameId>>,
    /// Count of frames with no pins.
    available: AtomicU32,
    /// Serializes victim selection so concurrent misses do not chase the
    /// same frame. Never held across I/O.
    selector: Mutex<()>,
}

impl FrameTable {
    fn new(count: usize, k: usize) -> FrameTable {
        let frames = (0..count).map(|id| Arc::new(Frame::new(id, k))).collect();
        FrameTable {
            frames,
            index: RwLock::new(HashMap::new()),
            available: AtomicU32::new(count as u32),
            selector: Mutex::new(()),
        }
    }

    fn frame(&self, id: FrameId) -> Arc<Frame> {
        Arc::clone(&self.frames[id])
    }

    fn lookup(&self, blk: &BlockId) -> Result<Option<FrameId>> {
        Ok(self.index.read()?.get(blk).copied())
    }
}

/// Manages the pinning and unpinning of frames to blocks on behalf of
/// transactions.
///
/// The pool's operations are transparent to the rest of the system: a
/// caller asks for a block by id and does not know whether the block was
/// already in memory or had to be fetched, nor which frame it displaced.
/// Victim choice follows the LRU-K policy: an empty frame first, then the
/// unpinned frame whose K-th most recent non-correlated reference is
/// oldest; a frame whose block is still inside a burst of references is
/// never evicted, even while unpinned.
///
/// Concurrent pins of the same block serialize on a striped anchor keyed
/// by the block id, so the second pin observes the first one's swap-in
/// instead of loading the block twice. Neither the anchors nor the
/// victim-selection mutex are held across page I/O; the frame latch is.
pub struct BufferPool {
    table: FrameTable,
    /// Lock striping: a prime-sized array of anchors indexed by key hash.
    anchors: Vec<Mutex<()>>,
    files: Arc<dyn FileManager>,
    wal: Arc<dyn LogManager>,
    clock: Arc<dyn Clock>,
    opts: BufferOptions,
}

impl BufferPool {
    pub fn new(
        files: Arc<dyn FileManager>,
        wal: Arc<dyn LogManager>,
        clock: Arc<dyn Clock>,
        opts: BufferOptions,
    ) -> BufferPool {
        let table = FrameTable::new(opts.buffer_count, opts.lru_k);
        let anchors = (0..opts.anchor_stripes).map(|_| Mutex::new(())).collect();
        BufferPool { table, anchors, files, wal, clock, opts }
    }

    fn anchor<T: Hash + ?Sized>(&self, key: &T) -> &Mutex<()> {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        &self.anchors[hasher.finish() as usize % self.anchors.len()]
    }

    /// Pins a frame to the given block. A block already resident is
    /// served from its frame; otherwise a victim is chosen, its old
    /// residence evicted, and the block read from the file manager.
    ///
    /// Returns `None` when every frame is pinned or still inside its
    /// correlated window; the caller decides whether to retry or abort.
    pub fn pin(&self, blk: &BlockId) -> Result<Option<Arc<Frame>>> {
        loop {
            let anchor = self.anchor(blk).lock()?;

            if let Some(id) = self.table.lookup(blk)? {
                let frame = self.table.frame(id);
                let mut inner = frame.latch()?;
                if inner.block.as_ref() != Some(blk) {
                    // the frame was swapped while we waited for its
                    // latch; retry from the anchor
                    drop(inner);
                    drop(anchor);
                    continue;
                }
                if frame.pin_count() == 0 {
                    self.table.available.fetch_sub(1, Ordering::SeqCst);
                }
                frame.add_pin();
                inner.history.record_hit(self.clock.now(), self.opts.crt);
                frame.publish_meta(&inner);
                drop(inner);
                return Ok(Some(frame));
            }

            let Some((frame, mut inner)) = self.reserve_victim()? else {
                return Ok(None);
            };
            {
                let mut index = self.table.index.write()?;
                if let Some(old) = &inner.block {
                    debug!("evicting {} from frame {}", old, frame.id());
                    index.remove(old);
                }
                index.insert(blk.clone(), frame.id());
            }
            drop(anchor);

            // swap in: flush the old residence, then read the new block.
            // only the frame latch is held across the I/O; a concurrent
            // pin of the same block waits on it and re-verifies residency.
            if let Err(err) = self.swap_in(&frame, &mut inner, blk) {
                self.abandon(&frame, &mut inner, blk)?;
                return Err(err);
            }
            drop(inner);
            return Ok(Some(frame));
        }
    }

    /// Allocates a new block at the end of `file_name` and pins a frame
    /// to it. The formatter initializes the page image, which reaches
    /// disk on the next flush. Returns `None` without allocating when no
    /// victim is available.
    pub fn pin_new(
        &self,
        file_name: &str,
        formatter: impl FnOnce(&mut Page),
    ) -> Result<Option<Arc<Frame>>> {
        let anchor = self.anchor(file_name).lock()?;
        let Some((frame, mut inner)) = self.reserve_victim()? else {
            return Ok(None);
        };

        // the append is the one piece of I/O done under an anchor:
        // serializing extensions of the same file is what the file-name
        // anchor is for
        let blk = match self.files.append(file_name) {
            Ok(blk) => blk,
            Err(err) => {
                // nothing has changed yet but the reservation
                frame.release_pin();
                self.table.available.fetch_add(1, Ordering::SeqCst);
                return Err(err);
            }
        };
        {
            let mut index = self.table.index.write()?;
            if let Some(old) = &inner.block {
                debug!("evicting {} from frame {}", old, frame.id());
                index.remove(old);
            }
            index.insert(blk.clone(), frame.id());
        }
        drop(anchor);

        let formatted = (|| -> Result<()> {
            inner.assign_to_new(&*self.files, &*self.wal, &blk, self.opts.lru_k, formatter)?;
            inner.history.record_miss(self.clock.now());
            frame.publish_meta(&inner);
            Ok(())
        })();
        if let Err(err) = formatted {
            self.abandon(&frame, &mut inner, &blk)?;
            return Err(err);
        }
        drop(inner);
        Ok(Some(frame))
    }

    /// Releases one pin. Crossing to zero makes the frame a victim
    /// candidate again.
    pub fn unpin(&self, frame: &Frame) -> Result<()> {
        let _inner = frame.latch()?;
        assert!(frame.pin_count() > 0, "unpin on frame {} with no pins", frame.id());
        if frame.release_pin() == 0 {
            self.table.available.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }

    /// Releases one pin on each of the given frames.
    pub fn unpin_all(&self, frames: &[&Frame]) -> Result<()> {
        for frame in frames {
            self.unpin(frame)?;
        }
        Ok(())
    }

    /// Flushes every dirty frame.
    pub fn flush_all(&self) -> Result<()> {
        for frame in &self.table.frames {
            let mut inner = frame.latch()?;
            inner.flush(&*self.files, &*self.wal)?;
        }
        Ok(())
    }

    /// Flushes the dirty frames modified by the given transaction.
    pub fn flush_all_for_tx(&self, tx: TxId) -> Result<()> {
        for frame in &self.table.frames {
            let mut inner = frame.latch()?;
            if inner.is_modified_by(tx) {
                inner.flush(&*self.files, &*self.wal)?;
            }
        }
        Ok(())
    }

    /// Number of unpinned frames.
    pub fn available(&self) -> u32 {
        self.table.available.load(Ordering::SeqCst)
    }

    /// Chooses, validates and reserves an eviction victim: scan the
    /// published frame metadata for the best candidate, then confirm its
    /// state under the frame latch. A frame that fails validation is
    /// skipped for the rest of the call; the scan decides on the state it
    /// can see now and never waits for a window to close. The returned
    /// frame is pinned and its latch guard is held; no I/O has happened.
    fn reserve_victim(&self) -> Result<Option<(Arc<Frame>, MutexGuard<'_, FrameInner>)>> {
        let _selector = self.table.selector.lock()?;
        let now = self.clock.now();
        let mut skip = vec![false; self.table.frames.len()];
        loop {
            let Some(id) = self.scan(now, &skip) else {
                return Ok(None);
            };
            let frame = &self.table.frames[id];
            // a latched frame is mid-operation, as good as pinned
            let Some(inner) = frame.try_latch() else {
                skip[id] = true;
                continue;
            };
            let eligible = frame.pin_count() == 0
                && match &inner.block {
                    None => true,
                    Some(_) => !inner.history.is_correlated(now, self.opts.crt),
                };
            if !eligible {
                skip[id] = true;
                continue;
            }
            frame.add_pin();
            self.table.available.fetch_sub(1, Ordering::SeqCst);
            return Ok(Some((Arc::clone(frame), inner)));
        }
    }

    /// One pass of the replacement policy over the published metadata: an
    /// empty frame wins outright; otherwise the unpinned frame outside
    /// its correlated window with the smallest victim key, ties going to
    /// the smallest frame index.
    fn scan(&self, now: u64, skip: &[bool]) -> Option<FrameId> {
        let mut best: Option<(u64, FrameId)> = None;
        for frame in &self.table.frames {
            if skip[frame.id()] || frame.is_pinned() {
                continue;
            }
            if !frame.resident() {
                return Some(frame.id());
            }
            if !frame.outside_correlated_window(now, self.opts.crt) {
                continue;
            }
            let order = frame.order();
            if best.map_or(true, |(b, _)| order < b) {
                best = Some((order, frame.id()));
            }
        }
        best.map(|(_, id)| id)
    }

    fn swap_in(&self, frame: &Frame, inner: &mut FrameInner, blk: &BlockId) -> Result<()> {
        inner.assign_to_block(&*self.files, &*self.wal, blk, self.opts.lru_k)?;
        inner.history.record_miss(self.clock.now());
        frame.publish_meta(inner);
        Ok(())
    }

    /// Returns a frame to the empty state after an I/O failure, removing
    /// the index entry of either residence and rolling back the
    /// reservation, so the pool stays consistent while the error
    /// propagates.
    fn abandon(&self, frame: &Frame, inner: &mut FrameInner, blk: &BlockId) -> Result<()> {
        warn!("i/o failure on frame {}, resetting it to empty", frame.id());
        {
            let mut index = self.table.index.write()?;
            index.remove(blk);
            if let Some(old) = &inner.block {
                index.remove(old);
            }
        }
        inner.reset(self.opts.lru_k);
        frame.publish_meta(inner);
        frame.release_pin();
        self.table.available.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
