use std::{fmt, num::NonZeroU32};

use thiserror::Error;

/// A contiguous block of IDP values owned by a single device session
///
/// Ranges are handed out by an [`IdpAllocator`] and never change afterwards. Two ranges
/// produced by the same allocator never overlap, which is what lets several devices share
/// one local socket: an inbound frame's `idp` alone identifies the session it belongs to.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct IdpRange {
    start: u32,
    size: NonZeroU32,
}

impl IdpRange {
    /// Construct a range covering `start..start + size`
    ///
    /// Returns `None` if the range would extend past `u32::MAX`.
    pub fn new(start: u32, size: NonZeroU32) -> Option<Self> {
        start.checked_add(size.get() - 1)?;
        Some(Self { start, size })
    }

    /// First IDP in the range
    pub fn start(&self) -> u32 {
        self.start
    }

    /// Number of IDPs in the range
    pub fn size(&self) -> u32 {
        self.size.get()
    }

    /// Last IDP in the range (inclusive)
    pub fn last(&self) -> u32 {
        self.start + (self.size.get() - 1)
    }

    /// One past the last IDP, widened so the range ending at `u32::MAX` is representable
    pub fn end(&self) -> u64 {
        u64::from(self.start) + u64::from(self.size.get())
    }

    /// Whether `idp` belongs to this range
    pub fn contains(&self, idp: u32) -> bool {
        idp >= self.start && idp <= self.last()
    }

    /// Whether the two ranges share at least one IDP
    pub fn overlaps(&self, other: &Self) -> bool {
        self.start <= other.last() && other.start <= self.last()
    }
}

impl fmt::Display for IdpRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..={}", self.start, self.last())
    }
}

/// Returned when the IDP space has no room left for another range
#[derive(Debug, Copy, Clone, PartialEq, Eq, Error)]
#[error("IDP space exhausted: cannot allocate {size} IDPs starting at {next}")]
pub struct RangeExhausted {
    /// Where the next range would have started
    pub next: u64,
    /// Size of the range that was requested
    pub size: u32,
}

/// Hands out fixed-size, non-overlapping IDP ranges in increasing order
///
/// Allocation is monotonic: a released range is never handed out again, so frames that
/// arrive late for a session that has since gone away cannot be mistaken for traffic of a
/// newer session.
#[derive(Debug, Clone)]
pub struct IdpAllocator {
    next: u64,
    size: NonZeroU32,
}

impl IdpAllocator {
    /// Create an allocator whose first range starts at `first`
    pub fn new(first: u32, size: NonZeroU32) -> Self {
        Self {
            next: u64::from(first),
            size,
        }
    }

    /// Reserve the next range
    pub fn allocate(&mut self) -> Result<IdpRange, RangeExhausted> {
        let exhausted = RangeExhausted {
            next: self.next,
            size: self.size.get(),
        };
        let start = u32::try_from(self.next).map_err(|_| exhausted)?;
        let range = IdpRange::new(start, self.size).ok_or(exhausted)?;
        self.next = range.end();
        Ok(range)
    }

    /// Size of every range produced by this allocator
    pub fn range_size(&self) -> u32 {
        self.size.get()
    }
}

/// Sequence counter cycling through an [`IdpRange`]
#[derive(Debug, Clone)]
pub struct IdpCounter {
    range: IdpRange,
    next: u32,
}

impl IdpCounter {
    /// Start counting from the beginning of `range`
    pub fn new(range: IdpRange) -> Self {
        Self {
            range,
            next: range.start(),
        }
    }

    /// Return the current IDP and advance, wrapping back to the range start
    pub fn next_idp(&mut self) -> u32 {
        let idp = self.next;
        self.next = if idp == self.range.last() {
            self.range.start()
        } else {
            idp + 1
        };
        idp
    }

    /// Restart from the beginning of the range
    pub fn reset(&mut self) {
        self.next = self.range.start();
    }

    /// The IDP the next call to [`next_idp`](Self::next_idp) will return
    pub fn peek(&self) -> u32 {
        self.next
    }

    /// The range this counter cycles through
    pub fn range(&self) -> IdpRange {
        self.range
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn size(n: u32) -> NonZeroU32 {
        NonZeroU32::new(n).unwrap()
    }

    #[test]
    fn ranges_are_contiguous() {
        let mut alloc = IdpAllocator::new(1, size(10_000));
        let a = alloc.allocate().unwrap();
        let b = alloc.allocate().unwrap();
        assert_eq!(a.start(), 1);
        assert_eq!(a.last(), 10_000);
        assert_eq!(u64::from(b.start()), a.end());
        assert!(!a.overlaps(&b));
    }

    #[test]
    fn range_at_top_of_space() {
        let mut alloc = IdpAllocator::new(u32::MAX - 9, size(10));
        let last = alloc.allocate().unwrap();
        assert_eq!(last.last(), u32::MAX);
        assert!(last.contains(u32::MAX));
        let err = alloc.allocate().unwrap_err();
        assert_eq!(err.next, u64::from(u32::MAX) + 1);
    }

    #[test]
    fn partial_range_is_refused() {
        let mut alloc = IdpAllocator::new(u32::MAX - 4, size(10));
        assert!(alloc.allocate().is_err());
        assert!(IdpRange::new(u32::MAX, size(2)).is_none());
    }

    #[test]
    fn counter_wraps() {
        let range = IdpRange::new(50, size(3)).unwrap();
        let mut counter = IdpCounter::new(range);
        let seen = (0..4).map(|_| counter.next_idp()).collect::<Vec<_>>();
        assert_eq!(seen, [50, 51, 52, 50]);
    }

    #[test]
    fn counter_reset() {
        let range = IdpRange::new(7, size(100)).unwrap();
        let mut counter = IdpCounter::new(range);
        counter.next_idp();
        counter.next_idp();
        assert_eq!(counter.peek(), 9);
        counter.reset();
        assert_eq!(counter.next_idp(), 7);
    }

    #[test]
    fn single_idp_range() {
        let range = IdpRange::new(u32::MAX, size(1)).unwrap();
        let mut counter = IdpCounter::new(range);
        assert_eq!(counter.next_idp(), u32::MAX);
        assert_eq!(counter.next_idp(), u32::MAX);
    }

    #[test]
    fn display() {
        let range = IdpRange::new(1, size(10_000)).unwrap();
        assert_eq!(range.to_string(), "1..=10000");
    }
}
