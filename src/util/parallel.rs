use rayon::prelude::*;
use tracing::{debug, warn};

/// Maps `func` over `items`, on a dedicated rayon pool when `jobs > 1`.
/// Output order always matches input order.
pub fn run_in_parallel<T, R, F>(items: Vec<T>, jobs: Option<usize>, func: F) -> Vec<R>
where
    T: Send,
    R: Send,
    F: Fn(T) -> R + Send + Sync,
{
    let threads = match jobs {
        Some(count) if count > 1 && items.len() > 1 => count,
        _ => return items.into_iter().map(func).collect(),
    };
    match rayon::ThreadPoolBuilder::new().num_threads(threads).build() {
        Ok(pool) => {
            debug!(threads, items = items.len(), "running on thread pool");
            pool.install(|| items.into_par_iter().map(func).collect())
        }
        Err(err) => {
            warn!(%err, "thread pool unavailable, running sequentially");
            items.into_iter().map(func).collect()
        }
    }
}
