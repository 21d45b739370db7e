//! Progress reporting and cooperative cancellation

/// Receives progress updates from long-running operations.
///
/// `update` is called at a coarse granularity (once per outer loop
/// iteration or output row). Returning `false` asks the operation to stop;
/// it then returns [`Error::Cancelled`](crate::Error::Cancelled).
pub trait Progress: Sync {
    fn update(&self, current: usize, total: usize) -> bool;
}

/// Progress sink that ignores updates and never cancels.
#[derive(Debug, Clone, Copy, Default)]
pub struct Silent;

impl Progress for Silent {
    fn update(&self, _current: usize, _total: usize) -> bool {
        true
    }
}

impl<F> Progress for F
where
    F: Fn(usize, usize) -> bool + Sync,
{
    fn update(&self, current: usize, total: usize) -> bool {
        self(current, total)
    }
}
