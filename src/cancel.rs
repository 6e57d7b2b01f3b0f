use std::future::Future;
use tokio::sync::watch;

use crate::error::{Result, WalletError};

/// Cooperative cancellation shared between a caller and the operation it started.
///
/// Clones observe the same signal. Retry loops and poll loops check it between
/// attempts and race it against sleeps and in-flight requests.
#[derive(Debug, Clone)]
pub struct CancelSignal {
    tx: std::sync::Arc<watch::Sender<bool>>,
    rx: watch::Receiver<bool>,
}

impl CancelSignal {
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(false);
        Self {
            tx: std::sync::Arc::new(tx),
            rx,
        }
    }

    /// Request cancellation; idempotent
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Fail with [`WalletError::Cancelled`] if cancellation was requested
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(WalletError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Resolves once cancellation is requested
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        // The sender lives as long as `self`, so this only returns on cancel.
        let _ = rx.wait_for(|cancelled| *cancelled).await;
    }

    /// Drive `operation` until it completes or cancellation is requested.
    ///
    /// A cancelled operation is dropped where it stands, including any retry
    /// backoff it is sleeping in.
    pub async fn run<T, F>(&self, operation: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        self.check()?;
        tokio::select! {
            biased;
            _ = self.cancelled() => Err(WalletError::Cancelled),
            result = operation => result,
        }
    }
}

impl Default for CancelSignal {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_cancel_wakes_waiters() {
        let signal = CancelSignal::new();
        let waiter = signal.clone();
        let handle = tokio::spawn(async move { waiter.cancelled().await });

        assert!(signal.check().is_ok());
        signal.cancel();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(signal.check(), Err(WalletError::Cancelled)));
    }

    #[tokio::test]
    async fn test_run_drops_pending_operation() {
        let signal = CancelSignal::new();
        let trigger = signal.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });

        let result: Result<()> = signal
            .run(async {
                tokio::time::sleep(Duration::from_secs(30)).await;
                Ok(())
            })
            .await;
        assert!(matches!(result, Err(WalletError::Cancelled)));
        assert!(matches!(signal.run(async { Ok(1) }).await, Err(WalletError::Cancelled)));
        assert_eq!(CancelSignal::new().run(async { Ok(1) }).await.unwrap(), 1);
    }
}
