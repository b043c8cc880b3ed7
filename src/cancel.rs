//! Cancellation plumbing for network-bound calls

use std::future::Future;

use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};

/// Race `fut` against `token`.
///
/// Dropping the losing future aborts it; child processes spawned with
/// `kill_on_drop(true)` are killed with it.
pub async fn cancellable<T, F>(token: &CancellationToken, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    if token.is_cancelled() {
        return Err(Error::Cancelled);
    }
    tokio::select! {
        biased;
        _ = token.cancelled() => Err(Error::Cancelled),
        res = fut => res,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_completed_future_passes_through() {
        let token = CancellationToken::new();
        let out = cancellable(&token, async { Ok::<_, Error>(7) }).await;
        assert_eq!(out.unwrap(), 7);
    }

    #[tokio::test]
    async fn test_cancelled_token_aborts_pending_future() {
        let token = CancellationToken::new();
        let child = token.child_token();
        let handle = tokio::spawn(async move {
            cancellable(&child, async {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok::<_, Error>(())
            })
            .await
        });

        token.cancel();
        let res = tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("cancellation must not hang")
            .unwrap();
        assert!(matches!(res, Err(Error::Cancelled)));
    }

    #[tokio::test]
    async fn test_already_cancelled_never_polls() {
        let token = CancellationToken::new();
        token.cancel();
        let polled = std::sync::atomic::AtomicBool::new(false);
        let res = cancellable(&token, async {
            polled.store(true, std::sync::atomic::Ordering::SeqCst);
            Ok::<_, Error>(())
        })
        .await;
        assert!(matches!(res, Err(Error::Cancelled)));
        assert!(!polled.load(std::sync::atomic::Ordering::SeqCst));
    }
}
