/// Blocking-style driver around [`OperationWaiter`]
use anyhow::{Context, Result};
use std::io::Write;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::waiter::{Clock, OperationStatusClient, OperationWaiter};
use crate::cloud::models::Operation;

/// Pause between polls used by [`wait_for_operation`]
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Marker written to the progress sink after every non-terminal poll
const PROGRESS_MARKER: &[u8] = b".";

/// Errors raised by the driver itself; fetch errors pass through unchanged
#[derive(Debug, Error)]
pub enum WaitError {
    #[error("wait for operation {operation_id} was cancelled")]
    Cancelled { operation_id: String },
}

/// Pacing and cancellation for [`OperationWaiter::wait`]
#[derive(Debug, Clone)]
pub struct WaitOptions {
    pub interval: Duration,
    pub cancel: Option<CancellationToken>,
}

impl Default for WaitOptions {
    fn default() -> Self {
        Self::new(DEFAULT_POLL_INTERVAL)
    }
}

impl WaitOptions {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            cancel: None,
        }
    }

    /// Abort the sleep between polls when `token` is cancelled
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }
}

impl<C: OperationStatusClient, K: Clock> OperationWaiter<C, K> {
    /// Poll until finished, sleeping `options.interval` between attempts.
    ///
    /// After each non-terminal poll a `.` is written to `progress` and flushed.
    /// Returns the terminal snapshot, which has `done == false` when the deadline
    /// ran out first.
    pub async fn wait(
        &mut self,
        options: &WaitOptions,
        mut progress: Option<&mut (dyn Write + Send)>,
    ) -> Result<Operation> {
        loop {
            let outcome = self.poll().await?;
            if outcome.is_finished() {
                return Ok(outcome.operation);
            }

            if let Some(sink) = progress.as_deref_mut() {
                sink.write_all(PROGRESS_MARKER)
                    .context("Failed to write progress marker")?;
                sink.flush().context("Failed to flush progress output")?;
            }

            debug!(
                "Sleeping {:?} before polling operation {} again",
                options.interval,
                self.operation_id()
            );
            self.sleep(options).await?;
        }
    }

    async fn sleep(&self, options: &WaitOptions) -> Result<()> {
        match &options.cancel {
            Some(token) => {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => {
                        return Err(WaitError::Cancelled {
                            operation_id: self.operation_id().to_string(),
                        }
                        .into());
                    }
                    _ = tokio::time::sleep(options.interval) => {}
                }
            }
            None => tokio::time::sleep(options.interval).await,
        }
        Ok(())
    }
}

/// Wait for an operation to finish, polling once per second
///
/// `timeout` of `None` or zero waits indefinitely. Progress markers go to
/// `progress` when given.
pub async fn wait_for_operation<C: OperationStatusClient>(
    client: C,
    operation_id: &str,
    timeout: Option<Duration>,
    progress: Option<&mut (dyn Write + Send)>,
) -> Result<Operation> {
    let mut waiter = OperationWaiter::new(client, operation_id, timeout);
    waiter.wait(&WaitOptions::default(), progress).await
}
