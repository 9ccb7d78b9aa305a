use std::fmt::Debug;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::Result;

/// Log sequence number.
pub type Lsn = u64;

/// The write-ahead log as the buffer layer sees it. `flush_to` must not
/// return until every record up to the given lsn is durable; a dirty page
/// carries the lsn of its latest modification and is written back only
/// after that call succeeds.
pub trait LogManager: Debug + Send + Sync {
    fn flush_to(&self, lsn: Lsn) -> Result<()>;

    fn current_lsn(&self) -> Lsn;
}

/// A log manager that keeps everything in memory: records are durable the
/// moment `flush_to` returns, and the flushed watermark is observable.
#[derive(Debug, Default)]
pub struct MemoryLog {
    current: AtomicU64,
    flushed: AtomicU64,
}

impl MemoryLog {
    pub fn new() -> MemoryLog {
        MemoryLog::default()
    }

    /// Assigns the next lsn, as if a record had been appended.
    pub fn append(&self) -> Lsn {
        self.current.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn flushed_lsn(&self) -> Lsn {
        self.flushed.load(Ordering::SeqCst)
    }
}

impl LogManager for MemoryLog {
    fn flush_to(&self, lsn: Lsn) -> Result<()> {
        self.flushed.fetch_max(lsn, Ordering::SeqCst);
        Ok(())
    }

    fn current_lsn(&self) -> Lsn {
        self.current.load(Ordering::SeqCst)
    }
}
