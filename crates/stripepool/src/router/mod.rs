mod key;
mod round_robin;
#[cfg(test)]
mod tests;

pub use key::*;
pub use round_robin::*;

/// Picks which of a fixed number of stripes receives a task.
///
/// Implementations must only ever return indices in `[0, stripes())`.
pub trait Router: Send + Sync {
    /// Number of stripes this router distributes over.
    fn stripes(&self) -> usize;

    /// Stripe for a keyed task.
    fn route(&self, key: u64) -> usize;

    /// Stripe for a task submitted without a key, or `None` if this router
    /// requires one.
    fn route_unkeyed(&self) -> Option<usize>;
}
