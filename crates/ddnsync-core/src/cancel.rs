//! Cancellation for reconciliation cycles
//!
//! A [`Canceller`] is held by whoever owns a cycle (the control loop); every
//! component doing network or process I/O receives a [`CancelToken`] and races
//! its work against [`CancelToken::cancelled`]. Dropping the losing future is
//! what aborts an in-flight HTTP request or kills a child process.

use std::future::Future;
use std::sync::Arc;
use tokio::sync::watch;

use crate::error::{Error, Result};

/// Create a linked canceller/token pair
pub fn pair() -> (Canceller, CancelToken) {
    let (tx, rx) = watch::channel(false);
    (
        Canceller { tx },
        CancelToken {
            rx,
            _keepalive: None,
        },
    )
}

/// Owner side: triggers cancellation
#[derive(Debug)]
pub struct Canceller {
    tx: watch::Sender<bool>,
}

impl Canceller {
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    pub fn token(&self) -> CancelToken {
        CancelToken {
            rx: self.tx.subscribe(),
            _keepalive: None,
        }
    }
}

/// Observer side: cheap to clone, passed down into every suspension point
#[derive(Debug, Clone)]
pub struct CancelToken {
    rx: watch::Receiver<bool>,
    // Set only by `never()`, whose sender has no other owner.
    _keepalive: Option<Arc<watch::Sender<bool>>>,
}

impl CancelToken {
    /// A token that is never cancelled
    pub fn never() -> Self {
        let (tx, rx) = watch::channel(false);
        Self {
            rx,
            _keepalive: Some(Arc::new(tx)),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once cancellation is requested or the canceller is dropped
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        let _ = rx.wait_for(|cancelled| *cancelled).await;
    }

    /// Run `fut` unless cancellation wins the race
    pub async fn guard<T, F>(&self, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        tokio::select! {
            biased;
            _ = self.cancelled() => Err(Error::Cancelled),
            result = fut => result,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn cancel_wakes_waiters() {
        let (canceller, token) = pair();
        let waiter = tokio::spawn({
            let token = token.clone();
            async move { token.cancelled().await }
        });

        assert!(!token.is_cancelled());
        canceller.cancel();
        waiter.await.unwrap();
        assert!(token.is_cancelled());
    }

    #[tokio::test]
    async fn dropped_canceller_counts_as_cancelled() {
        let (canceller, token) = pair();
        drop(canceller);
        tokio::time::timeout(Duration::from_secs(1), token.cancelled())
            .await
            .expect("dropping the canceller releases waiters");
    }

    #[tokio::test(start_paused = true)]
    async fn guard_abandons_slow_work() {
        let (canceller, token) = pair();
        canceller.cancel();

        let result: Result<()> = token
            .guard(async {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(())
            })
            .await;
        assert!(matches!(result, Err(Error::Cancelled)));
    }

    #[tokio::test]
    async fn never_token_lets_work_finish() {
        let token = CancelToken::never();
        let value = token.guard(async { Ok(7) }).await.unwrap();
        assert_eq!(value, 7);
    }
}
