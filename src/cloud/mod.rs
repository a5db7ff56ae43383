/// Yandex Cloud operation service client
pub mod client;
pub mod models;

pub use client::{OperationClient, DEFAULT_ENDPOINT};
pub use models::{Operation, OperationFailed, Status};
