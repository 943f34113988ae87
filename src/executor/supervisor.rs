//! Request-scoped task supervision.
//!
//! Every request owns one [`RequestSupervisor`]. All concurrent work the
//! engine launches for the request (field dispatches, dependency plans,
//! lazy resolutions, nested traversals) is spawned through it, so that when
//! the request finishes, everything still running is cancelled and joined.
//! A child's failure never fails the supervisor: outcomes are captured in
//! the returned [`Eventual`]s.

use tokio_util::{sync::CancellationToken, task::TaskTracker};

use crate::{error::EngineError, eventual::Eventual};

/// Owner of a request's task tree.
pub struct RequestSupervisor {
    token: CancellationToken,
    tracker: TaskTracker,
}

impl RequestSupervisor {
    /// A fresh supervisor with no children.
    pub fn new() -> RequestSupervisor {
        RequestSupervisor {
            token: CancellationToken::new(),
            tracker: TaskTracker::new(),
        }
    }

    /// Spawns `fut` on the request scope.
    ///
    /// The task starts running immediately. Cancellation of the request
    /// resolves the returned [`Eventual`] with the cancellation marker;
    /// panics surface as internal errors. Work launched after teardown is
    /// cancelled without running.
    pub fn spawn<T, F>(&self, fut: F) -> Eventual<T>
    where
        T: Clone + Send + Sync + 'static,
        F: Future<Output = Result<T, EngineError>> + Send + 'static,
    {
        if self.tracker.is_closed() {
            return Eventual::err(EngineError::Cancelled);
        }
        let token = self.token.clone();
        let handle = tokio::spawn(self.tracker.track_future(async move {
            tokio::select! {
                _ = token.cancelled() => Err(EngineError::Cancelled),
                result = fut => result,
            }
        }));
        Eventual::from_future(async move {
            match handle.await {
                Ok(result) => result,
                Err(join) if join.is_cancelled() => Err(EngineError::Cancelled),
                Err(join) => Err(EngineError::internal(format!("task panicked: {join}"))),
            }
        })
    }

    /// A token cooperative fetchers can watch to honor cancellation.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Number of children still running.
    pub fn active_children(&self) -> usize {
        self.tracker.len()
    }

    /// Cancels every child and waits for all of them to finish. Teardown is
    /// unconditional: called on success and failure alike.
    pub async fn cancel_and_join(&self) {
        self.token.cancel();
        self.tracker.close();
        self.tracker.wait().await;
    }
}

impl Default for RequestSupervisor {
    fn default() -> RequestSupervisor {
        RequestSupervisor::new()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use crate::error::EngineError;

    use super::RequestSupervisor;

    #[tokio::test]
    async fn spawned_work_runs_and_resolves() {
        let supervisor = RequestSupervisor::new();
        let ev = supervisor.spawn(async { Ok(5) });
        assert_eq!(ev.resolve().await, Ok(5));
        supervisor.cancel_and_join().await;
        assert_eq!(supervisor.active_children(), 0);
    }

    #[tokio::test]
    async fn cancellation_resolves_children_with_the_marker() {
        let supervisor = RequestSupervisor::new();
        let ev = supervisor.spawn(async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(())
        });
        supervisor.cancel_and_join().await;
        assert_eq!(ev.resolve().await, Err(EngineError::Cancelled));
        assert_eq!(supervisor.active_children(), 0);
    }

    #[tokio::test]
    async fn spawning_after_teardown_is_cancelled() {
        let supervisor = RequestSupervisor::new();
        supervisor.cancel_and_join().await;
        let ev = supervisor.spawn(async { Ok(()) });
        assert_eq!(ev.resolve().await, Err(EngineError::Cancelled));
    }
}
