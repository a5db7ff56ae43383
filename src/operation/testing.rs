//! Fakes shared by the operation tests
use anyhow::Result;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use super::waiter::{Clock, OperationStatusClient};
use crate::cloud::models::Operation;

/// Clock that only moves when told to
#[derive(Clone)]
pub(crate) struct ManualClock(Arc<Mutex<Instant>>);

impl ManualClock {
    pub(crate) fn new() -> Self {
        Self(Arc::new(Mutex::new(Instant::now())))
    }

    pub(crate) fn advance(&self, by: Duration) {
        *self.0.lock().unwrap() += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        *self.0.lock().unwrap()
    }
}

/// What the next fetch returns
pub(crate) enum Step {
    Pending,
    Done,
    Fail(&'static str),
}

/// Status client replaying a fixed script, then reporting "still running" forever
pub(crate) struct ScriptedClient {
    steps: Mutex<VecDeque<Step>>,
    calls: AtomicUsize,
    latency: Option<(ManualClock, Duration)>,
}

impl ScriptedClient {
    pub(crate) fn new(steps: impl IntoIterator<Item = Step>) -> Self {
        Self {
            steps: Mutex::new(steps.into_iter().collect()),
            calls: AtomicUsize::new(0),
            latency: None,
        }
    }

    pub(crate) fn always_pending() -> Self {
        Self::new([])
    }

    /// Advance `clock` by `latency` on every fetch
    pub(crate) fn with_latency(mut self, clock: ManualClock, latency: Duration) -> Self {
        self.latency = Some((clock, latency));
        self
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl OperationStatusClient for ScriptedClient {
    async fn get_operation(&self, operation_id: &str) -> Result<Operation> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;

        if let Some((clock, latency)) = &self.latency {
            clock.advance(*latency);
        }

        let step = self
            .steps
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Step::Pending);

        let done = match step {
            Step::Fail(message) => anyhow::bail!("{}", message),
            Step::Pending => false,
            Step::Done => true,
        };

        Ok(Operation {
            id: operation_id.to_string(),
            description: format!("fetch {}", call),
            done,
            ..Default::default()
        })
    }
}
