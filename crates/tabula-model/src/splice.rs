/// A splice along one axis (rows or columns): at `start`, remove `delete`
/// entries and insert `insert` new ones. Positions are 1-based.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Splice {
    pub start: u32,
    pub delete: u32,
    pub insert: u32,
}

impl Splice {
    pub fn new(start: u32, delete: u32, insert: u32) -> Self {
        Self {
            start: start.max(1),
            delete,
            insert,
        }
    }

    pub fn delta(&self) -> i64 {
        self.insert as i64 - self.delete as i64
    }

    pub fn is_noop(&self) -> bool {
        self.delete == 0 && self.insert == 0
    }

    fn deleted_end(&self) -> u32 {
        self.start.saturating_add(self.delete)
    }

    fn shift(&self, idx: u32) -> u32 {
        (idx as i64 + self.delta()).clamp(1, u32::MAX as i64) as u32
    }

    /// New position of `idx`, or `None` when it falls in the deleted block.
    pub fn map(&self, idx: u32) -> Option<u32> {
        if idx < self.start {
            Some(idx)
        } else if idx < self.deleted_end() {
            None
        } else {
            Some(self.shift(idx))
        }
    }

    /// New bounds of the inclusive span `lo..=hi`.
    ///
    /// A span that straddles `start` grows by the inserted entries; the parts
    /// of a span inside the deleted block are clipped away. Returns `None`
    /// when nothing of the span survives.
    pub fn map_span(&self, lo: u32, hi: u32) -> Option<(u32, u32)> {
        let end = self.deleted_end();
        let new_lo = if lo < self.start {
            lo
        } else if lo >= end {
            self.shift(lo)
        } else {
            self.start.saturating_add(self.insert)
        };
        let new_hi = if hi < self.start {
            hi
        } else if hi >= end {
            self.shift(hi)
        } else {
            self.start - 1
        };
        (new_lo <= new_hi && new_hi >= 1).then_some((new_lo, new_hi))
    }
}
