use parking_lot::Mutex;
use rayon::prelude::*;

use crate::error::Result;

/// Worker pool a pipeline run executes on.
///
/// Without an explicit thread count, work runs on rayon's global pool. Each pipeline stage is a
/// blocking parallel job, so consecutive stages are separated by a barrier.
pub struct Executor {
    pool: Option<rayon::ThreadPool>,
}

impl Executor {
    pub fn new(num_threads: Option<usize>) -> Result<Self> {
        let pool = match num_threads {
            Some(n) => Some(
                rayon::ThreadPoolBuilder::new()
                    .num_threads(n)
                    .thread_name(|i| format!("sift-worker-{i}"))
                    .build()?,
            ),
            None => None,
        };
        Ok(Self { pool })
    }

    pub fn num_threads(&self) -> usize {
        match &self.pool {
            Some(pool) => pool.current_num_threads(),
            None => rayon::current_num_threads(),
        }
    }

    /// Runs `op` with all nested parallel work scheduled on this executor's workers.
    pub fn install<R, F>(&self, op: F) -> R
    where
        F: FnOnce() -> R + Send,
        R: Send,
    {
        match &self.pool {
            Some(pool) => pool.install(op),
            None => op(),
        }
    }
}

/// Runs `f(i)` for every `i` in `0..n`, in no particular order, and returns once all calls have
/// finished.
pub fn parallel_for<F>(n: usize, f: F)
where
    F: Fn(usize) + Sync + Send,
{
    (0..n).into_par_iter().for_each(f);
}

/// Append-only collection shared between workers of one pipeline pass.
#[derive(Debug)]
pub struct ResultCollector<T> {
    items: Mutex<Vec<T>>,
}

impl<T> Default for ResultCollector<T> {
    fn default() -> Self {
        Self {
            items: Mutex::new(Vec::new()),
        }
    }
}

impl<T> ResultCollector<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, item: T) {
        self.items.lock().push(item);
    }

    /// Appends all of `items` under a single lock acquisition.
    pub fn extend<I: IntoIterator<Item = T>>(&self, items: I) {
        let mut items = items.into_iter().peekable();
        if items.peek().is_some() {
            self.items.lock().extend(items);
        }
    }

    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn into_inner(self) -> Vec<T> {
        self.items.into_inner()
    }
}
