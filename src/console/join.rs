//! Single-result handles for background operations
//!
//! A [`Joiner`] (forked sub-operations) or [`Waiter`] (status-scoped
//! functions) wraps the receiving half of a one-shot channel that the
//! background task writes exactly once. The first join awaits the value;
//! later joins return the same value again.

use std::future::Future;
use tokio::sync::oneshot;

use crate::{BenchError, Result};

#[derive(Debug)]
struct Slot<T> {
    rx: Option<oneshot::Receiver<Result<T>>>,
    result: Option<Result<T>>,
}

impl<T: Clone> Slot<T> {
    fn new(rx: oneshot::Receiver<Result<T>>) -> Self {
        Self {
            rx: Some(rx),
            result: None,
        }
    }

    fn ready(result: Result<T>) -> Self {
        Self {
            rx: None,
            result: Some(result),
        }
    }

    async fn resolve(&mut self) -> Result<T> {
        if let Some(result) = &self.result {
            return result.clone();
        }
        let result = match self.rx.take() {
            Some(rx) => rx.await.unwrap_or_else(|_| {
                Err(BenchError::Join(
                    "task ended without reporting a result".to_string(),
                ))
            }),
            None => Err(BenchError::Join("result slot is empty".to_string())),
        };
        self.result = Some(result.clone());
        result
    }
}

/// Handle to a forked operation
#[derive(Debug)]
pub struct Joiner<T = ()> {
    slot: Slot<T>,
}

impl<T: Clone> Joiner<T> {
    pub(crate) fn new(rx: oneshot::Receiver<Result<T>>) -> Self {
        Self { slot: Slot::new(rx) }
    }

    /// A joiner that is already resolved
    pub fn ready(result: Result<T>) -> Self {
        Self {
            slot: Slot::ready(result),
        }
    }

    /// Spawn `future` on the runtime and return its joiner
    pub fn spawn<F>(future: F) -> Self
    where
        F: Future<Output = Result<T>> + Send + 'static,
        T: Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        tokio::spawn(async move {
            let _ = tx.send(future.await);
        });
        Self::new(rx)
    }

    /// Wait for the operation and return its result
    pub async fn join(&mut self) -> Result<T> {
        self.slot.resolve().await
    }
}

/// Handle to a status-scoped function
#[derive(Debug)]
pub struct Waiter<T = ()> {
    slot: Slot<T>,
}

impl<T: Clone> Waiter<T> {
    pub(crate) fn new(rx: oneshot::Receiver<Result<T>>) -> Self {
        Self { slot: Slot::new(rx) }
    }

    /// A waiter that is already resolved
    pub fn ready(result: Result<T>) -> Self {
        Self {
            slot: Slot::ready(result),
        }
    }

    /// Wait for the function and return its result
    pub async fn wait(&mut self) -> Result<T> {
        self.slot.resolve().await
    }
}

/// Join every joiner, returning the last error observed, if any.
pub async fn join<T: Clone>(joiners: &mut [Joiner<T>]) -> Result<()> {
    let mut last = Ok(());
    for joiner in joiners.iter_mut() {
        if let Err(err) = joiner.join().await {
            last = Err(err);
        }
    }
    last
}

/// Wait on every waiter, returning the last error observed, if any.
pub async fn wait<T: Clone>(waiters: &mut [Waiter<T>]) -> Result<()> {
    let mut last = Ok(());
    for waiter in waiters.iter_mut() {
        if let Err(err) = waiter.wait().await {
            last = Err(err);
        }
    }
    last
}
