//! ycloud-ops - waiting on Yandex Cloud long-running operations
//!
//! Create/update/delete calls return an operation handle; [`OperationWaiter`] polls
//! the operation service until the operation is done or a deadline passes.

pub mod cloud;
pub mod config;
pub mod operation;

pub use cloud::{Operation, OperationClient};
pub use operation::{wait_for_operation, OperationWaiter, WaitStatus};
