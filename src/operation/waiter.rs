/// Poll-able waiter for long-running operations
use anyhow::Result;
use async_trait::async_trait;
use futures::stream::{self, Stream};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::cloud::models::Operation;

/// Source of operation status snapshots
///
/// Implemented by the HTTP [`OperationClient`](crate::cloud::OperationClient) and by
/// fakes in tests. Errors are returned to the waiter's caller untouched.
#[async_trait]
pub trait OperationStatusClient: Send + Sync {
    /// Fetch the current state of an operation
    async fn get_operation(&self, operation_id: &str) -> Result<Operation>;
}

#[async_trait]
impl<T: OperationStatusClient + ?Sized> OperationStatusClient for &T {
    async fn get_operation(&self, operation_id: &str) -> Result<Operation> {
        (**self).get_operation(operation_id).await
    }
}

#[async_trait]
impl<T: OperationStatusClient + ?Sized> OperationStatusClient for Arc<T> {
    async fn get_operation(&self, operation_id: &str) -> Result<Operation> {
        (**self).get_operation(operation_id).await
    }
}

/// Wall-clock source used to evaluate deadlines
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

/// Clock backed by tokio's time source
///
/// Follows tokio's paused clock when one is active, which keeps deadlines and
/// `tokio::time::sleep` on the same timeline.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        tokio::time::Instant::now().into_std()
    }
}

/// Where a waiter stands after a poll
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitStatus {
    /// Operation still running and the deadline (if any) not reached
    Pending,
    /// Remote operation reported `done`
    Done,
    /// Deadline reached before the operation reported `done`
    DeadlineExceeded,
}

impl WaitStatus {
    /// True for both terminal states
    pub fn is_finished(self) -> bool {
        !matches!(self, WaitStatus::Pending)
    }
}

/// Result of a single successful poll
#[derive(Debug, Clone, PartialEq)]
pub struct PollOutcome {
    pub operation: Operation,
    pub status: WaitStatus,
}

impl PollOutcome {
    pub fn is_finished(&self) -> bool {
        self.status.is_finished()
    }
}

/// Tracks a single long-running operation until it is done or out of time.
///
/// The waiter never sleeps. Each [`poll`](Self::poll) performs exactly one fetch and
/// the caller decides how long to wait before the next one; see
/// [`wait`](Self::wait) for a driver that does the sleeping.
///
/// A waiter is driven by one caller at a time. `poll` takes `&mut self`, so sharing
/// one waiter between tasks needs external synchronization.
pub struct OperationWaiter<C, K = SystemClock> {
    operation_id: String,
    client: C,
    clock: K,
    deadline: Option<Instant>,
    operation: Option<Operation>,
    status: WaitStatus,
}

impl<C: OperationStatusClient> OperationWaiter<C> {
    /// Create a waiter using the system clock
    ///
    /// A zero or absent `timeout` means no deadline: the waiter keeps reporting
    /// [`WaitStatus::Pending`] until the operation is done.
    pub fn new(client: C, operation_id: impl Into<String>, timeout: Option<Duration>) -> Self {
        Self::with_clock(client, operation_id, timeout, SystemClock)
    }
}

impl<C: OperationStatusClient, K: Clock> OperationWaiter<C, K> {
    /// Create a waiter with an explicit clock
    pub fn with_clock(
        client: C,
        operation_id: impl Into<String>,
        timeout: Option<Duration>,
        clock: K,
    ) -> Self {
        // An unrepresentable deadline is as good as none.
        let deadline = timeout
            .filter(|timeout| !timeout.is_zero())
            .and_then(|timeout| clock.now().checked_add(timeout));

        Self {
            operation_id: operation_id.into(),
            client,
            clock,
            deadline,
            operation: None,
            status: WaitStatus::Pending,
        }
    }

    pub fn operation_id(&self) -> &str {
        &self.operation_id
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Most recently fetched snapshot, `None` before the first successful poll
    pub fn last_snapshot(&self) -> Option<&Operation> {
        self.operation.as_ref()
    }

    pub fn status(&self) -> WaitStatus {
        self.status
    }

    pub fn is_finished(&self) -> bool {
        self.status.is_finished()
    }

    /// Fetch the operation once and classify the result.
    ///
    /// `done` is checked before the deadline, and the deadline only after the fetch
    /// returns, so a slow fetch can finish up to one round-trip past it.
    ///
    /// A fetch error is returned as-is and leaves the waiter untouched. Once a
    /// terminal status has been reported, later calls return it again without
    /// fetching.
    pub async fn poll(&mut self) -> Result<PollOutcome> {
        if let (true, Some(operation)) = (self.status.is_finished(), &self.operation) {
            return Ok(PollOutcome {
                operation: operation.clone(),
                status: self.status,
            });
        }

        let operation = self.client.get_operation(&self.operation_id).await?;

        let status = if operation.done {
            WaitStatus::Done
        } else if self
            .deadline
            .is_some_and(|deadline| self.clock.now() >= deadline)
        {
            WaitStatus::DeadlineExceeded
        } else {
            WaitStatus::Pending
        };

        match status {
            WaitStatus::Pending => debug!("Operation {} still running", self.operation_id),
            WaitStatus::Done => info!("Operation {} is done", self.operation_id),
            WaitStatus::DeadlineExceeded => warn!(
                "Deadline reached while waiting for operation {}",
                self.operation_id
            ),
        }

        self.operation = Some(operation.clone());
        self.status = status;

        Ok(PollOutcome { operation, status })
    }

    /// Turn the waiter into a lazy stream of poll attempts.
    ///
    /// Every item is one fetch. The stream ends right after the terminal outcome and
    /// is infinite otherwise. Fetch errors are yielded as items and polling continues
    /// on the next `next()`. The stream never sleeps between items.
    pub fn into_stream(self) -> impl Stream<Item = Result<PollOutcome>> {
        stream::unfold(Some(self), |state| async move {
            let Some(mut waiter) = state else {
                return None;
            };
            let item = waiter.poll().await;
            let next = match &item {
                Ok(outcome) if outcome.is_finished() => None,
                _ => Some(waiter),
            };
            Some((item, next))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operation::testing::{ManualClock, ScriptedClient, Step};
    use futures::StreamExt;

    #[tokio::test]
    async fn test_last_snapshot_empty_before_poll() {
        let client = ScriptedClient::always_pending();
        let waiter = OperationWaiter::new(&client, "op-1", None);

        assert!(waiter.last_snapshot().is_none());
        assert_eq!(waiter.status(), WaitStatus::Pending);
        assert_eq!(client.calls(), 0);
    }

    #[tokio::test]
    async fn test_deadline_after_five_seconds() {
        let clock = ManualClock::new();
        let client = ScriptedClient::always_pending();
        let mut waiter = OperationWaiter::with_clock(
            &client,
            "op-1",
            Some(Duration::from_secs(5)),
            clock.clone(),
        );

        let outcome = waiter.poll().await.unwrap();
        assert_eq!(outcome.status, WaitStatus::Pending);

        clock.advance(Duration::from_millis(4999));
        let outcome = waiter.poll().await.unwrap();
        assert!(!outcome.is_finished());

        clock.advance(Duration::from_millis(1));
        let outcome = waiter.poll().await.unwrap();
        assert!(outcome.is_finished());
        assert_eq!(outcome.status, WaitStatus::DeadlineExceeded);
        assert!(!outcome.operation.done);
        assert_eq!(client.calls(), 3);
    }

    #[tokio::test]
    async fn test_poll_well_past_deadline_finishes() {
        let clock = ManualClock::new();
        let client = ScriptedClient::always_pending();
        let mut waiter = OperationWaiter::with_clock(
            &client,
            "op-1",
            Some(Duration::from_secs(1)),
            clock.clone(),
        );

        clock.advance(Duration::from_secs(3600));
        let outcome = waiter.poll().await.unwrap();
        assert_eq!(outcome.status, WaitStatus::DeadlineExceeded);
        assert!(!outcome.operation.done);
    }

    #[tokio::test]
    async fn test_done_on_fourth_poll_without_timeout() {
        let client =
            ScriptedClient::new([Step::Pending, Step::Pending, Step::Pending, Step::Done]);
        let mut waiter = OperationWaiter::new(&client, "op-1", None);
        assert!(waiter.deadline().is_none());

        let mut polls = 0;
        loop {
            polls += 1;
            let outcome = waiter.poll().await.unwrap();
            if outcome.is_finished() {
                assert_eq!(outcome.status, WaitStatus::Done);
                assert!(outcome.operation.done);
                break;
            }
        }

        assert_eq!(polls, 4);
        assert_eq!(client.calls(), 4);
    }

    #[tokio::test]
    async fn test_done_on_kth_poll_with_timeout() {
        let clock = ManualClock::new();
        let client = ScriptedClient::new([Step::Pending, Step::Done]);
        let mut waiter =
            OperationWaiter::with_clock(&client, "op-1", Some(Duration::from_secs(60)), clock);

        assert!(!waiter.poll().await.unwrap().is_finished());
        let outcome = waiter.poll().await.unwrap();
        assert_eq!(outcome.status, WaitStatus::Done);
    }

    #[tokio::test]
    async fn test_done_checked_before_deadline() {
        let clock = ManualClock::new();
        let client = ScriptedClient::new([Step::Done]);
        let mut waiter = OperationWaiter::with_clock(
            &client,
            "op-1",
            Some(Duration::from_secs(5)),
            clock.clone(),
        );

        clock.advance(Duration::from_secs(10));
        let outcome = waiter.poll().await.unwrap();
        assert_eq!(outcome.status, WaitStatus::Done);
    }

    #[tokio::test]
    async fn test_done_and_deadline_both_finish() {
        // Both terminal states report finished; only the status (or the snapshot's
        // `done` flag) tells a completed operation from an expired wait.
        let clock = ManualClock::new();
        let done_client = ScriptedClient::new([Step::Done]);
        let stuck_client = ScriptedClient::always_pending();

        let mut done = OperationWaiter::with_clock(&done_client, "op-1", None, clock.clone());
        let mut expired = OperationWaiter::with_clock(
            &stuck_client,
            "op-2",
            Some(Duration::from_secs(1)),
            clock.clone(),
        );
        clock.advance(Duration::from_secs(1));

        let done = done.poll().await.unwrap();
        let expired = expired.poll().await.unwrap();

        assert!(done.is_finished());
        assert!(expired.is_finished());
        assert!(done.operation.done);
        assert!(!expired.operation.done);
        assert_ne!(done.status, expired.status);
    }

    #[tokio::test]
    async fn test_last_snapshot_tracks_latest_fetch() {
        let clock = ManualClock::new();
        let client = ScriptedClient::new([Step::Pending, Step::Pending]);
        let mut waiter = OperationWaiter::with_clock(
            &client,
            "op-1",
            Some(Duration::from_secs(2)),
            clock.clone(),
        );

        let first = waiter.poll().await.unwrap();
        assert_eq!(waiter.last_snapshot(), Some(&first.operation));
        assert_eq!(first.operation.description, "fetch 1");

        clock.advance(Duration::from_secs(2));
        let second = waiter.poll().await.unwrap();
        assert!(second.is_finished());
        assert_eq!(waiter.last_snapshot(), Some(&second.operation));
        assert_eq!(second.operation.description, "fetch 2");
    }

    #[tokio::test]
    async fn test_transport_error_keeps_state_and_deadline() {
        let clock = ManualClock::new();
        let client = ScriptedClient::new([Step::Pending, Step::Fail("connection reset")]);
        let mut waiter = OperationWaiter::with_clock(
            &client,
            "op-1",
            Some(Duration::from_secs(5)),
            clock.clone(),
        );
        let deadline = waiter.deadline();

        let first = waiter.poll().await.unwrap();

        clock.advance(Duration::from_secs(3));
        let err = waiter.poll().await.unwrap_err();
        assert_eq!(err.to_string(), "connection reset");
        assert_eq!(waiter.status(), WaitStatus::Pending);
        assert_eq!(waiter.deadline(), deadline);
        assert_eq!(waiter.last_snapshot(), Some(&first.operation));

        // Still measured from construction, not from the failed attempt.
        clock.advance(Duration::from_secs(2));
        let outcome = waiter.poll().await.unwrap();
        assert_eq!(outcome.status, WaitStatus::DeadlineExceeded);
    }

    #[tokio::test]
    async fn test_zero_timeout_means_no_deadline() {
        let clock = ManualClock::new();
        let client = ScriptedClient::always_pending();
        let mut waiter =
            OperationWaiter::with_clock(&client, "op-1", Some(Duration::ZERO), clock.clone());
        assert!(waiter.deadline().is_none());

        clock.advance(Duration::from_secs(86400));
        assert_eq!(waiter.poll().await.unwrap().status, WaitStatus::Pending);
    }

    #[tokio::test]
    async fn test_finished_waiter_does_not_fetch_again() {
        let client = ScriptedClient::new([Step::Done]);
        let mut waiter = OperationWaiter::new(&client, "op-1", None);

        let first = waiter.poll().await.unwrap();
        let again = waiter.poll().await.unwrap();

        assert_eq!(first, again);
        assert_eq!(client.calls(), 1);
    }

    #[tokio::test]
    async fn test_slow_fetch_overruns_deadline_by_one_round_trip() {
        // The deadline is evaluated after the fetch, so the wait ends one second
        // past the nominal 5s deadline here.
        let clock = ManualClock::new();
        let start = clock.now();
        let client =
            ScriptedClient::always_pending().with_latency(clock.clone(), Duration::from_secs(3));
        let mut waiter = OperationWaiter::with_clock(
            &client,
            "op-1",
            Some(Duration::from_secs(5)),
            clock.clone(),
        );

        assert_eq!(waiter.poll().await.unwrap().status, WaitStatus::Pending);
        assert_eq!(
            waiter.poll().await.unwrap().status,
            WaitStatus::DeadlineExceeded
        );
        assert_eq!(clock.now() - start, Duration::from_secs(6));
    }

    #[tokio::test]
    async fn test_stream_ends_after_terminal_outcome() {
        let client = ScriptedClient::new([
            Step::Pending,
            Step::Fail("unavailable"),
            Step::Pending,
            Step::Done,
        ]);
        let waiter = OperationWaiter::new(&client, "op-1", None);

        let items: Vec<_> = waiter.into_stream().collect().await;

        assert_eq!(items.len(), 4);
        assert!(items[1].is_err());
        assert_eq!(items[3].as_ref().unwrap().status, WaitStatus::Done);
        assert_eq!(client.calls(), 4);
    }

    #[tokio::test]
    async fn test_stream_is_lazy() {
        let client = ScriptedClient::always_pending();
        let waiter = OperationWaiter::new(&client, "op-1", None);

        let stream = waiter.into_stream();
        assert_eq!(client.calls(), 0);

        let taken: Vec<_> = stream.take(3).collect().await;
        assert_eq!(taken.len(), 3);
        assert_eq!(client.calls(), 3);
    }

    #[test]
    fn test_poll_from_blocking_context() {
        let client = ScriptedClient::new([Step::Done]);
        let mut waiter = OperationWaiter::new(Arc::new(client), "op-1", None);

        let outcome = tokio_test::block_on(waiter.poll()).unwrap();
        assert!(outcome.operation.done);
    }
}
