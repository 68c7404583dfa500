//! Linked cancellation for a single call.
//!
//! A call can be abandoned for two reasons: the configured timeout elapses,
//! or the caller cancels its [`CancellationToken`]. [`CancelScope`] folds both
//! into one child token so the in-flight exchange has a single abort path and
//! the caller sees a single outcome, [`ReportError::Cancelled`].
//!
//! The scope outlives the exchange itself: a successful report body is read
//! through [`CancelScope::bind_stream`], so the same deadline and token keep
//! watching every chunk until the caller has consumed the content.

use std::future::Future;
use std::time::Duration;

use futures::stream::{self, Stream, StreamExt};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::{ReportError, Result};

/// Cancellation context for one call.
#[derive(Clone, Debug)]
pub struct CancelScope {
    token: CancellationToken,
    deadline: Option<Instant>,
}

impl CancelScope {
    /// Link the configured `timeout` with an optional caller token.
    ///
    /// The scope owns a child of the caller's token: cancelling the caller
    /// cancels the scope, while the timeout only cancels the scope.
    pub fn new(timeout: Option<Duration>, caller: Option<&CancellationToken>) -> Self {
        let token = caller
            .map(CancellationToken::child_token)
            .unwrap_or_default();
        Self {
            token,
            deadline: timeout.and_then(|t| Instant::now().checked_add(t)),
        }
    }

    /// Scope with neither a timeout nor a caller token.
    pub fn unbounded() -> Self {
        Self::new(None, None)
    }

    /// The linked token. Cancelled when either source fires.
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled() || self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    /// Drive `fut` to completion unless the scope is cancelled first.
    ///
    /// Resolves to [`ReportError::Cancelled`] without polling `fut` when the
    /// scope is already cancelled or past its deadline.
    pub async fn run<F, T>(&self, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        if self.is_cancelled() {
            self.token.cancel();
            debug!("call cancelled before it was sent");
            return Err(ReportError::Cancelled);
        }

        let deadline = async {
            match self.deadline {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            biased;
            _ = self.token.cancelled() => {
                debug!("call cancelled by caller token");
                Err(ReportError::Cancelled)
            }
            _ = deadline => {
                self.token.cancel();
                debug!("call cancelled by configured timeout");
                Err(ReportError::Cancelled)
            }
            result = fut => result,
        }
    }

    /// Guard every item of `inner` with this scope.
    ///
    /// Once the scope fires, the stream yields one [`ReportError::Cancelled`]
    /// and ends; `inner` is dropped with it.
    pub fn bind_stream<S, T>(self, inner: S) -> impl Stream<Item = Result<T>> + Send + 'static
    where
        S: Stream<Item = Result<T>> + Send + Unpin + 'static,
        T: Send + 'static,
    {
        stream::unfold(Some((self, inner)), |state| async move {
            let (scope, mut inner) = state?;
            let next = scope
                .run(async { Ok::<_, ReportError>(inner.next().await) })
                .await;
            match next {
                Ok(Some(item)) => Some((item, Some((scope, inner)))),
                Ok(None) => None,
                Err(e) => {
                    debug!("report stream cut off by cancellation");
                    Some((Err(e), None))
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn completes_when_nothing_fires() {
        let scope = CancelScope::new(Some(Duration::from_secs(5)), None);
        let value = scope.run(async { Ok(7) }).await.unwrap();
        assert_eq!(value, 7);
        assert!(!scope.token().is_cancelled());
    }

    #[tokio::test]
    async fn zero_timeout_cancels_without_polling() {
        let scope = CancelScope::new(Some(Duration::ZERO), None);
        let mut polled = false;
        let result: Result<()> = scope
            .run(async {
                polled = true;
                Ok(())
            })
            .await;
        assert!(matches!(result, Err(ReportError::Cancelled)));
        assert!(!polled);
        assert!(scope.token().is_cancelled());
    }

    #[tokio::test]
    async fn timeout_and_caller_token_give_same_outcome() {
        let slow = || async {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(())
        };

        let by_timeout = CancelScope::new(Some(Duration::from_millis(10)), None)
            .run(slow())
            .await;

        let caller = CancellationToken::new();
        let trigger = caller.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            trigger.cancel();
        });
        let by_token = CancelScope::new(None, Some(&caller)).run(slow()).await;

        assert!(matches!(by_timeout, Err(ReportError::Cancelled)));
        assert!(matches!(by_token, Err(ReportError::Cancelled)));
    }

    #[tokio::test]
    async fn already_cancelled_token_short_circuits() {
        let caller = CancellationToken::new();
        caller.cancel();
        let scope = CancelScope::new(Some(Duration::from_secs(5)), Some(&caller));
        let result: Result<()> = scope.run(async { Ok(()) }).await;
        assert!(result.unwrap_err().is_cancelled());
    }

    #[tokio::test]
    async fn timeout_does_not_cancel_caller_token() {
        let caller = CancellationToken::new();
        let scope = CancelScope::new(Some(Duration::from_millis(5)), Some(&caller));
        let result: Result<()> = scope
            .run(async {
                tokio::time::sleep(Duration::from_secs(30)).await;
                Ok(())
            })
            .await;
        assert!(result.unwrap_err().is_cancelled());
        assert!(scope.token().is_cancelled());
        assert!(!caller.is_cancelled());
    }

    #[tokio::test]
    async fn bound_stream_ends_with_cancelled_when_it_stalls() {
        let stalled = stream::iter(vec![Ok::<_, ReportError>(1)])
            .chain(stream::pending())
            .boxed();
        let scope = CancelScope::new(Some(Duration::from_millis(20)), None);
        let items: Vec<Result<i32>> = scope.bind_stream(stalled).collect().await;

        assert_eq!(items.len(), 2);
        assert!(matches!(items[0], Ok(1)));
        assert!(matches!(items[1], Err(ReportError::Cancelled)));
    }

    #[tokio::test]
    async fn bound_stream_stops_on_caller_token() {
        let caller = CancellationToken::new();
        let scope = CancelScope::new(None, Some(&caller));
        let mut bound = Box::pin(scope.bind_stream(stream::pending::<Result<u8>>().boxed()));

        let trigger = caller.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            trigger.cancel();
        });
        assert!(bound.next().await.unwrap().unwrap_err().is_cancelled());
        assert!(bound.next().await.is_none());
    }

    #[tokio::test]
    async fn bound_stream_passes_items_through() {
        let scope = CancelScope::new(Some(Duration::from_secs(5)), None);
        let items: Vec<u8> = scope
            .bind_stream(stream::iter(vec![Ok(1), Ok(2), Ok(3)]))
            .map(|item| item.unwrap())
            .collect()
            .await;
        assert_eq!(items, [1, 2, 3]);
    }

    #[tokio::test]
    async fn inner_errors_pass_through() {
        let scope = CancelScope::unbounded();
        let result: Result<()> = scope
            .run(async { Err(ReportError::InvalidRequest("bad".into())) })
            .await;
        assert!(matches!(result, Err(ReportError::InvalidRequest(_))));
    }
}
