//! Row-parallel execution with or without rayon.
//!
//! With the `parallel` feature rows are distributed over rayon's thread
//! pool; without it (e.g. for WASM builds) they run in order on the calling
//! thread. Either way the output is in row order.

/// Map `f` over `0..rows` and concatenate the per-row results.
pub fn map_rows<T, F>(rows: usize, f: F) -> Vec<T>
where
    T: Send,
    F: Fn(usize) -> Vec<T> + Sync + Send,
{
    #[cfg(feature = "parallel")]
    {
        use rayon::prelude::*;
        (0..rows).into_par_iter().flat_map_iter(f).collect()
    }
    #[cfg(not(feature = "parallel"))]
    {
        (0..rows).flat_map(f).collect()
    }
}
