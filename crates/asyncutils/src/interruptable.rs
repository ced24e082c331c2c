//! A cancellation-safe future wrapper (SPEC_FULL.md §5, §9): a cancel
//! issued from the consumer side transitions the future's state even
//! if the producer is still running and later "sends" a result — that
//! later result is simply never observed, since nobody polls the
//! inner future again once `Interruptable` has resolved to
//! `Err(Cancelled)`.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::task::AtomicWaker;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cancelled;

impl fmt::Display for Cancelled {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task cancelled")
    }
}

impl std::error::Error for Cancelled {}

struct CancelState {
    flag: AtomicBool,
    waker: AtomicWaker,
}

/// Held by whoever can cancel an in-flight [`Interruptable`]; cloning
/// is cheap and every clone cancels the same future.
#[derive(Clone)]
pub struct CancelHandle(Arc<CancelState>);

impl CancelHandle {
    pub fn cancel(&self) {
        self.0.flag.store(true, Ordering::SeqCst);
        self.0.waker.wake();
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.flag.load(Ordering::SeqCst)
    }
}

pin_project_lite::pin_project! {
    pub struct Interruptable<Fut> {
        #[pin]
        inner: Fut,
        state: Arc<CancelState>,
    }
}

impl<Fut> Interruptable<Fut> {
    pub fn new(inner: Fut) -> (Self, CancelHandle) {
        let state = Arc::new(CancelState { flag: AtomicBool::new(false), waker: AtomicWaker::new() });
        (Self { inner, state: state.clone() }, CancelHandle(state))
    }
}

impl<Fut: Future> Future for Interruptable<Fut> {
    type Output = Result<Fut::Output, Cancelled>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let me = self.project();
        if me.state.flag.load(Ordering::SeqCst) {
            return Poll::Ready(Err(Cancelled));
        }
        match me.inner.poll(cx) {
            Poll::Ready(value) => Poll::Ready(Ok(value)),
            Poll::Pending => {
                me.state.waker.register(cx.waker());
                if me.state.flag.load(Ordering::SeqCst) {
                    Poll::Ready(Err(Cancelled))
                } else {
                    Poll::Pending
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::future::pending;

    #[tokio::test]
    async fn an_uncancelled_future_resolves_normally() {
        let (fut, _handle) = Interruptable::new(async { 42 });
        assert_eq!(fut.await, Ok(42));
    }

    #[tokio::test]
    async fn cancelling_before_the_first_poll_short_circuits() {
        let (fut, handle) = Interruptable::new(pending::<()>());
        handle.cancel();
        assert_eq!(fut.await, Err(Cancelled));
    }

    #[tokio::test]
    async fn cancelling_a_spawned_pending_future_resolves_it_as_cancelled() {
        let (fut, handle) = Interruptable::new(pending::<()>());
        let task = tokio::spawn(fut);
        handle.cancel();
        assert_eq!(task.await.unwrap(), Err(Cancelled));
    }
}
