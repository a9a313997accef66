#![cfg_attr(feature = "strict", deny(warnings))]

pub mod adapter;
pub mod batch_api;
mod batcher;
mod direction;
pub mod errors;
mod pending;
mod queue;
mod retry_counter;
pub mod test_utils;
mod transferable;

pub use adapter::{AdapterManifest, NewAdapterFn, ProgressCallback, TransferAdapter, BASIC_ADAPTER_NAME};
pub use batch_api::{Action, BatchApi, BatchObject, BatchResponse, ObjectError, ObjectResource};
pub use batcher::Batcher;
pub use direction::Direction;
pub use errors::{Result, TransferError};
pub use queue::{TransferQueue, TransferQueueOptions};
pub use retry_counter::RetryCounter;
pub use transferable::{TransferResult, Transferable};
