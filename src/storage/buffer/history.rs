const NANOS_PER_MILLI: u64 = 1_000_000;

/// Correlation is judged on wall-clock milliseconds: the quotient of the
/// nanosecond timestamps, not their difference.
pub(crate) fn millis(ns: u64) -> u64 {
    ns / NANOS_PER_MILLI
}

/// Reference history of the block resident in a frame: the timestamps of
/// its K most recent non-correlated references, newest at index 0, plus
/// the time of its most recent reference of any kind.
///
/// The K-th entry is the victim key: the block whose K-th most recent
/// reference is oldest is the coldest. A zero entry means the block has
/// seen fewer than K non-correlated references.
///
/// History belongs to a residence, not to the block: it is created when a
/// block is loaded into a frame and discarded when the block is evicted.
#[derive(Clone, Debug, PartialEq)]
pub struct RefHistory {
    last_reference: u64,
    hist: Vec<u64>,
}

impl RefHistory {
    pub fn new(k: usize) -> RefHistory {
        assert!(k > 0, "lru_k must be larger than zero");
        RefHistory { last_reference: 0, hist: vec![0; k] }
    }

    /// Records the reference that loaded the block into its frame.
    pub fn record_miss(&mut self, now: u64) {
        for i in (1..self.hist.len()).rev() {
            self.hist[i] = self.hist[i - 1];
        }
        self.hist[0] = now;
        self.last_reference = now;
    }

    /// Records a reference to the already resident block. Within the
    /// correlated reference period only the last-reference time moves:
    /// the burst counts as one logical access. Once a reference falls
    /// outside the period, the closed burst's length is added to every
    /// older slot so the tail does not penalize a block that was in
    /// active use moments ago.
    pub fn record_hit(&mut self, now: u64, crt: u64) {
        if millis(now) - millis(self.last_reference) > crt {
            let correlated_period = self.last_reference - self.hist[0];
            for i in (1..self.hist.len()).rev() {
                self.hist[i] = self.hist[i - 1] + correlated_period;
            }
            self.hist[0] = now;
        }
        self.last_reference = now;
    }

    /// The victim key: timestamp of the K-th most recent non-correlated
    /// reference, zero while the block has not yet seen that many.
    pub fn order(&self) -> u64 {
        self.hist[self.hist.len() - 1]
    }

    pub fn last_reference(&self) -> u64 {
        self.last_reference
    }

    /// Whether a reference at `now` still falls inside the correlated
    /// period of the most recent reference.
    pub fn is_correlated(&self, now: u64, crt: u64) -> bool {
        millis(now) - millis(self.last_reference) <= crt
    }
}
