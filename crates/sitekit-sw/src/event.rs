//! Events that can defer their completion.

use std::future::Future;
use tokio::task::JoinHandle;
use tracing::warn;

use crate::request::FetchRequest;

/// Extension point letting a handler keep an event open until spawned work
/// settles.
#[derive(Debug, Default)]
pub struct ExtendableEvent {
    pending: Vec<JoinHandle<()>>,
}

impl ExtendableEvent {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawn `task` and keep the event open until it finishes.
    ///
    /// Must be called from within a tokio runtime.
    pub fn wait_until<F>(&mut self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.pending.push(tokio::spawn(task));
    }

    /// Number of tasks not yet awaited by [`ExtendableEvent::settle`].
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Await every registered task. Returns how many were awaited.
    pub async fn settle(&mut self) -> usize {
        let handles = std::mem::take(&mut self.pending);
        let count = handles.len();
        for handle in handles {
            if let Err(e) = handle.await {
                warn!(error = %e, "Deferred task did not complete");
            }
        }
        count
    }
}

/// A request intercepted from a controlled page.
#[derive(Debug)]
pub struct FetchEvent {
    pub request: FetchRequest,
    lifetime: ExtendableEvent,
}

impl FetchEvent {
    pub fn new(request: FetchRequest) -> Self {
        Self {
            request,
            lifetime: ExtendableEvent::new(),
        }
    }

    /// See [`ExtendableEvent::wait_until`].
    pub fn wait_until<F>(&mut self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.lifetime.wait_until(task);
    }

    pub fn pending(&self) -> usize {
        self.lifetime.pending()
    }

    /// See [`ExtendableEvent::settle`].
    pub async fn settle(&mut self) -> usize {
        self.lifetime.settle().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_settle_awaits_all_tasks() {
        let done = Arc::new(AtomicUsize::new(0));
        let mut event = ExtendableEvent::new();

        for _ in 0..3 {
            let done = Arc::clone(&done);
            event.wait_until(async move {
                tokio::task::yield_now().await;
                done.fetch_add(1, Ordering::SeqCst);
            });
        }
        assert_eq!(event.pending(), 3);

        assert_eq!(event.settle().await, 3);
        assert_eq!(done.load(Ordering::SeqCst), 3);
        assert_eq!(event.pending(), 0);
    }

    #[tokio::test]
    async fn test_settle_survives_panicking_task() {
        let mut event = ExtendableEvent::new();
        event.wait_until(async { panic!("boom") });
        assert_eq!(event.settle().await, 1);
    }

    #[tokio::test]
    async fn test_settle_without_tasks() {
        let request = FetchRequest::get(url::Url::parse("https://example.com/").unwrap());
        let mut event = FetchEvent::new(request);
        assert_eq!(event.settle().await, 0);
    }
}
