//! Prefetch phase: deferred data tasks awaited before a render serializes.

use std::sync::{Arc, Mutex, PoisonError};

use futures::future::{try_join_all, BoxFuture};

use crate::DataError;

/// A deferred data task registered during a server render.
pub type PrefetchTask = BoxFuture<'static, Result<(), DataError>>;

/// Queue of prefetch tasks for one render.
///
/// Clones share the same queue, so tasks may register further tasks while
/// the phase is running.
#[derive(Clone, Default)]
pub struct PrefetchQueue {
    tasks: Arc<Mutex<Vec<(String, PrefetchTask)>>>,
}

impl std::fmt::Debug for PrefetchQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrefetchQueue")
            .field("pending", &self.pending())
            .finish()
    }
}

impl PrefetchQueue {
    /// Create an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a task under the cache key it fills.
    pub fn register(&self, key: impl Into<String>, task: PrefetchTask) {
        self.tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((key.into(), task));
    }

    /// Number of registered tasks not yet started.
    pub fn pending(&self) -> usize {
        self.tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn take_batch(&self) -> Vec<(String, PrefetchTask)> {
        std::mem::take(&mut *self.tasks.lock().unwrap_or_else(PoisonError::into_inner))
    }

    /// Run every registered task to completion.
    ///
    /// Tasks registered while a batch runs are picked up by the next batch;
    /// the phase ends once the queue stays empty. The first failure ends
    /// the phase with that error. Returns the number of tasks run.
    pub async fn run_all(&self) -> Result<usize, DataError> {
        let mut completed = 0;
        loop {
            let batch = self.take_batch();
            if batch.is_empty() {
                return Ok(completed);
            }

            let keys: Vec<String> = batch.iter().map(|(k, _)| k.clone()).collect();
            tracing::debug!(tasks = batch.len(), keys = ?keys, "prefetch batch");

            completed += batch.len();
            try_join_all(batch.into_iter().map(|(_, task)| task)).await?;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::FutureExt;
    use ssr_fetch::FetchError;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_run_all_empty() {
        let queue = PrefetchQueue::new();
        assert_eq!(queue.run_all().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_tasks_do_not_run_until_phase() {
        let queue = PrefetchQueue::new();
        let runs = Arc::new(AtomicUsize::new(0));

        let counter = runs.clone();
        queue.register(
            "a",
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
            .boxed(),
        );

        assert_eq!(runs.load(Ordering::SeqCst), 0);
        assert_eq!(queue.pending(), 1);

        assert_eq!(queue.run_all().await.unwrap(), 1);
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert_eq!(queue.pending(), 0);
    }

    #[tokio::test]
    async fn test_nested_registration_is_drained() {
        let queue = PrefetchQueue::new();
        let runs = Arc::new(AtomicUsize::new(0));

        let inner_queue = queue.clone();
        let counter = runs.clone();
        queue.register(
            "outer",
            async move {
                let inner_counter = counter.clone();
                inner_queue.register(
                    "inner",
                    async move {
                        inner_counter.fetch_add(1, Ordering::SeqCst);
                        Ok(())
                    }
                    .boxed(),
                );
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
            .boxed(),
        );

        assert_eq!(queue.run_all().await.unwrap(), 2);
        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_first_error_fails_phase() {
        let queue = PrefetchQueue::new();
        queue.register("ok", async { Ok(()) }.boxed());
        queue.register(
            "bad",
            async {
                Err(DataError::Fetch {
                    key: "bad".to_string(),
                    source: FetchError::Timeout,
                })
            }
            .boxed(),
        );

        let err = queue.run_all().await.unwrap_err();
        assert_eq!(err.key(), "bad");
    }
}
