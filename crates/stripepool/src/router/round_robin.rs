use core::num::NonZeroUsize;
use portable_atomic::{AtomicUsize, Ordering};

use crate::Router;

/// A lock-free cursor cycling through `[0, len)`.
///
/// Each call to [`Self::next`] advances the cursor exactly once, however many
/// compare-and-swap retries contention forces. The stored value is always
/// reduced modulo `len`, so it never overflows and never leaves the range.
pub struct RoundRobinCursor {
    len: usize,
    #[cfg(feature = "cache-padded")]
    cursor: crossbeam_utils::CachePadded<AtomicUsize>,
    #[cfg(not(feature = "cache-padded"))]
    cursor: AtomicUsize,
}

impl RoundRobinCursor {
    pub fn new(len: NonZeroUsize) -> Self {
        Self {
            len: len.get(),
            #[cfg(feature = "cache-padded")]
            cursor: crossbeam_utils::CachePadded::new(AtomicUsize::new(0)),
            #[cfg(not(feature = "cache-padded"))]
            cursor: AtomicUsize::new(0),
        }
    }

    pub fn stripes(&self) -> usize {
        self.len
    }

    /// Returns the current position and advances past it.
    #[inline]
    pub fn next(&self) -> usize {
        let mut current = self.cursor.load(Ordering::Relaxed);
        loop {
            let next = if current + 1 == self.len { 0 } else { current + 1 };
            match self.cursor.compare_exchange_weak(
                current,
                next,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => return current,
                Err(actual) => current = actual,
            }
        }
    }
}

impl core::fmt::Debug for RoundRobinCursor {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("RoundRobinCursor")
            .field("len", &self.len)
            .field("cursor", &self.cursor.load(Ordering::Relaxed))
            .finish()
    }
}

/// Fair routing that ignores keys.
///
/// Every call, keyed or not, takes the next stripe from a shared
/// [`RoundRobinCursor`]. Over many calls each stripe is picked with
/// frequency `1/N`.
///
/// ## Recommended When
/// - Tasks have no ordering relationship
/// - Load should be spread evenly regardless of key skew
///
/// ## See Also
/// - [`KeyRouter`](crate::KeyRouter)
#[derive(Debug)]
pub struct RoundRobinRouter {
    cursor: RoundRobinCursor,
}

impl RoundRobinRouter {
    pub fn new(stripes: NonZeroUsize) -> Self {
        Self {
            cursor: RoundRobinCursor::new(stripes),
        }
    }

    #[inline]
    pub fn next(&self) -> usize {
        self.cursor.next()
    }
}

impl Router for RoundRobinRouter {
    fn stripes(&self) -> usize {
        self.cursor.stripes()
    }

    fn route(&self, _key: u64) -> usize {
        self.next()
    }

    fn route_unkeyed(&self) -> Option<usize> {
        Some(self.next())
    }
}
