use chrono::{DateTime, Utc};

/// Issues creation-ordered ids that read as millisecond timestamps.
///
/// Each id is `max(now_ms, last + 1)`, so two allocations in the same
/// millisecond (or across a backwards clock step) still get distinct,
/// strictly increasing ids. Once `u64::MAX` has been issued the
/// allocator is exhausted and `next` returns `None`.
#[derive(Debug, Clone, Default)]
pub struct IdAllocator {
    last: Option<u64>,
}

impl IdAllocator {
    /// Seeds the allocator from the largest id already in use.
    pub fn starting_after(last: Option<u64>) -> Self {
        Self { last }
    }

    pub fn next(&mut self, now: DateTime<Utc>) -> Option<u64> {
        let now_ms = now.timestamp_millis().max(0) as u64;
        let id = match self.last {
            Some(last) if now_ms <= last => last.checked_add(1)?,
            _ => now_ms,
        };
        self.last = Some(id);
        Some(id)
    }

    pub fn last(&self) -> Option<u64> {
        self.last
    }
}
