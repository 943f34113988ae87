//! A possibly-asynchronous result.
//!
//! [`Eventual<T>`] is the engine's uniform currency for values that may
//! already be known, may have failed, or may still be computing on another
//! task. It biases hard toward the synchronous representation: combinators
//! applied to a ready value never allocate a future, so purely synchronous
//! resolver chains execute without touching the scheduler.
//!
//! Deferred values wrap a [`Shared`] boxed future, so any number of
//! consumers (the completion pipeline, dependent resolvers, joins) can await
//! the same underlying computation and observe the same outcome.

use std::{fmt, sync::Mutex};

use futures::{
    FutureExt as _,
    channel::oneshot,
    future::{BoxFuture, Shared},
};

use crate::error::EngineError;

/// Outcome type carried by an [`Eventual`].
pub type EventualResult<T> = Result<T, EngineError>;

type SharedFuture<T> = Shared<BoxFuture<'static, EventualResult<T>>>;

/// A value that is ready, failed, or still being computed.
///
/// `map`/`and_then` short-circuit on errors, preserving the original error.
/// `recover` may convert an error into any [`Eventual`]. `then` always
/// invokes its callback with the settled [`EventualResult`]. Cancellation of
/// the underlying computation surfaces as [`EngineError::Cancelled`].
pub enum Eventual<T: Clone> {
    /// The outcome is already known.
    Ready(EventualResult<T>),
    /// The outcome is being computed elsewhere.
    Deferred(SharedFuture<T>),
}

impl<T: Clone> Clone for Eventual<T> {
    fn clone(&self) -> Self {
        match self {
            Eventual::Ready(r) => Eventual::Ready(r.clone()),
            Eventual::Deferred(f) => Eventual::Deferred(f.clone()),
        }
    }
}

impl<T: Clone + fmt::Debug> fmt::Debug for Eventual<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Eventual::Ready(r) => f.debug_tuple("Ready").field(r).finish(),
            Eventual::Deferred(_) => f.write_str("Deferred(..)"),
        }
    }
}

impl<T: Clone> Eventual<T> {
    /// A ready, successful value.
    pub fn ok(value: T) -> Eventual<T> {
        Eventual::Ready(Ok(value))
    }

    /// A ready, failed value.
    pub fn err(error: EngineError) -> Eventual<T> {
        Eventual::Ready(Err(error))
    }

    /// Wraps a settled result.
    pub fn ready(result: EventualResult<T>) -> Eventual<T> {
        Eventual::Ready(result)
    }

    /// Is the outcome already known?
    pub fn is_ready(&self) -> bool {
        matches!(self, Eventual::Ready(_))
    }

    /// The settled outcome, if already known, without suspending.
    pub fn peek(&self) -> Option<EventualResult<T>>
    where
        T: Clone,
    {
        match self {
            Eventual::Ready(r) => Some(r.clone()),
            Eventual::Deferred(f) => f.peek().cloned(),
        }
    }
}

impl<T: Clone + Send + Sync + 'static> Eventual<T> {
    /// Defers to a future computed elsewhere.
    ///
    /// The future is shared: all clones of the returned [`Eventual`] observe
    /// the same outcome.
    pub fn from_future<F>(fut: F) -> Eventual<T>
    where
        F: Future<Output = EventualResult<T>> + Send + 'static,
    {
        Eventual::Deferred(fut.boxed().shared())
    }

    /// Creates an unresolved [`Eventual`] together with its [`Completer`].
    ///
    /// Dropping the completer without completing settles the value as
    /// cancelled.
    pub fn promise() -> (Completer<T>, Eventual<T>) {
        let (tx, rx) = oneshot::channel();
        let ev = Eventual::from_future(async move {
            rx.await.unwrap_or(Err(EngineError::Cancelled))
        });
        (
            Completer {
                tx: Mutex::new(Some(tx)),
            },
            ev,
        )
    }

    /// Awaits the outcome.
    pub async fn resolve(self) -> EventualResult<T> {
        match self {
            Eventual::Ready(r) => r,
            Eventual::Deferred(f) => f.await,
        }
    }

    /// Transforms a successful value, short-circuiting on errors.
    pub fn map<U, F>(self, f: F) -> Eventual<U>
    where
        U: Clone + Send + Sync + 'static,
        F: FnOnce(T) -> U + Send + 'static,
    {
        match self {
            Eventual::Ready(Ok(v)) => Eventual::ok(f(v)),
            Eventual::Ready(Err(e)) => Eventual::err(e),
            Eventual::Deferred(fut) => Eventual::from_future(async move { fut.await.map(f) }),
        }
    }

    /// Chains another [`Eventual`] computation onto a successful value,
    /// short-circuiting on errors.
    pub fn and_then<U, F>(self, f: F) -> Eventual<U>
    where
        U: Clone + Send + Sync + 'static,
        F: FnOnce(T) -> Eventual<U> + Send + 'static,
    {
        match self {
            Eventual::Ready(Ok(v)) => f(v),
            Eventual::Ready(Err(e)) => Eventual::err(e),
            Eventual::Deferred(fut) => Eventual::from_future(async move {
                match fut.await {
                    Ok(v) => f(v).resolve().await,
                    Err(e) => Err(e),
                }
            }),
        }
    }

    /// Replaces a failed outcome with the result of `f`; successful values
    /// pass through untouched.
    pub fn recover<F>(self, f: F) -> Eventual<T>
    where
        F: FnOnce(EngineError) -> Eventual<T> + Send + 'static,
    {
        match self {
            Eventual::Ready(Ok(v)) => Eventual::ok(v),
            Eventual::Ready(Err(e)) => f(e),
            Eventual::Deferred(fut) => Eventual::from_future(async move {
                match fut.await {
                    Ok(v) => Ok(v),
                    Err(e) => f(e).resolve().await,
                }
            }),
        }
    }

    /// Invokes `f` with the settled outcome, success or failure. The
    /// callback is never skipped.
    pub fn then<U, F>(self, f: F) -> Eventual<U>
    where
        U: Clone + Send + Sync + 'static,
        F: FnOnce(EventualResult<T>) -> Eventual<U> + Send + 'static,
    {
        match self {
            Eventual::Ready(r) => f(r),
            Eventual::Deferred(fut) => {
                Eventual::from_future(async move { f(fut.await).resolve().await })
            }
        }
    }

    /// Discards the outcome, settling successfully either way.
    pub fn settle(self) -> Eventual<()> {
        self.then(|_| Eventual::ok(()))
    }

    /// Waits for every input, collecting the values in order.
    ///
    /// The first error wins. Stays synchronous when every input is already
    /// settled.
    pub fn join_all<I>(iter: I) -> Eventual<Vec<T>>
    where
        I: IntoIterator<Item = Eventual<T>>,
    {
        let items: Vec<_> = iter.into_iter().collect();
        if items.iter().all(Eventual::is_ready) {
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                match item {
                    Eventual::Ready(Ok(v)) => out.push(v),
                    Eventual::Ready(Err(e)) => return Eventual::err(e),
                    Eventual::Deferred(_) => unreachable!("all inputs are ready"),
                }
            }
            return Eventual::ok(out);
        }
        Eventual::from_future(async move {
            let settled =
                futures::future::join_all(items.into_iter().map(Eventual::resolve)).await;
            settled.into_iter().collect()
        })
    }
}

impl Eventual<()> {
    /// A ready unit value.
    pub fn unit() -> Eventual<()> {
        Eventual::ok(())
    }
}

/// Write-side of an [`Eventual::promise`].
///
/// Completing twice is a no-op: the first outcome sticks.
pub struct Completer<T> {
    tx: Mutex<Option<oneshot::Sender<EventualResult<T>>>>,
}

impl<T> Completer<T> {
    /// Settles the paired [`Eventual`]. Returns whether this call won the
    /// race to complete it.
    pub fn complete(&self, result: EventualResult<T>) -> bool {
        match self.tx.lock().expect("completer lock poisoned").take() {
            Some(tx) => tx.send(result).is_ok(),
            None => false,
        }
    }
}

impl<T> fmt::Debug for Completer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Completer(..)")
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    };

    use crate::error::EngineError;

    use super::Eventual;

    #[test]
    fn map_stays_synchronous_for_ready_values() {
        let ev = Eventual::ok(2).map(|v| v * 2);
        assert!(ev.is_ready());
        assert_eq!(ev.peek(), Some(Ok(4)));
    }

    #[test]
    fn map_short_circuits_preserving_the_error() {
        let ev: Eventual<i32> = Eventual::err(EngineError::internal("boom"));
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = calls.clone();
        let mapped = ev.map(move |v| {
            seen.fetch_add(1, Ordering::SeqCst);
            v
        });
        assert_eq!(
            mapped.peek(),
            Some(Err(EngineError::internal("boom"))),
        );
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn recover_substitutes_a_new_value() {
        let ev: Eventual<i32> = Eventual::err(EngineError::Cancelled);
        let recovered = ev.recover(|_| Eventual::ok(7));
        assert_eq!(recovered.peek(), Some(Ok(7)));
    }

    #[test]
    fn then_is_invoked_for_both_outcomes() {
        let ok = Eventual::ok(1).then(|r| Eventual::ok(r.is_ok()));
        let err: Eventual<bool> =
            Eventual::<i32>::err(EngineError::Cancelled).then(|r| Eventual::ok(r.is_ok()));
        assert_eq!(ok.peek(), Some(Ok(true)));
        assert_eq!(err.peek(), Some(Ok(false)));
    }

    #[test]
    fn join_all_is_synchronous_when_inputs_are() {
        let joined = Eventual::join_all(vec![Eventual::ok(1), Eventual::ok(2)]);
        assert_eq!(joined.peek(), Some(Ok(vec![1, 2])));
    }

    #[tokio::test]
    async fn deferred_values_resolve() {
        let ev = Eventual::from_future(async { Ok(41) }).map(|v| v + 1);
        assert_eq!(ev.resolve().await, Ok(42));
    }

    #[tokio::test]
    async fn promise_completes_once() {
        let (completer, ev) = Eventual::promise();
        assert!(completer.complete(Ok(1)));
        assert!(!completer.complete(Ok(2)));
        assert_eq!(ev.resolve().await, Ok(1));
    }

    #[tokio::test]
    async fn dropped_completer_reads_as_cancelled() {
        let (completer, ev) = Eventual::<i32>::promise();
        drop(completer);
        assert_eq!(ev.resolve().await, Err(EngineError::Cancelled));
    }

    #[tokio::test]
    async fn shared_outcome_is_observed_by_all_clones() {
        let ev = Eventual::from_future(async { Ok(String::from("shared")) });
        let a = ev.clone();
        let b = ev;
        assert_eq!(a.resolve().await.unwrap(), "shared");
        assert_eq!(b.resolve().await.unwrap(), "shared");
    }
}
