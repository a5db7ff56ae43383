/// Waiting on long-running operations
pub mod wait;
pub mod waiter;

#[cfg(test)]
mod testing;

pub use wait::{wait_for_operation, WaitError, WaitOptions, DEFAULT_POLL_INTERVAL};
pub use waiter::{
    Clock, OperationStatusClient, OperationWaiter, PollOutcome, SystemClock, WaitStatus,
};
