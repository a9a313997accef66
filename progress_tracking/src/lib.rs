#![cfg_attr(feature = "strict", deny(warnings))]

mod no_op_meter;
mod progress_log;
mod transfer_meter;

pub use no_op_meter::NoOpProgressMeter;
pub use progress_log::ProgressLog;
pub use transfer_meter::{MeterSnapshot, TransferMeter};

/// Receives the lifecycle events of a batch of object transfers.
///
/// Implementations are shared between the queue and the transfer adapters, so every
/// method takes `&self` and must be cheap; none of them may block on I/O for long.
pub trait ProgressMeter: std::fmt::Debug + Send + Sync {
    /// The first batch response arrived and transfers are about to begin.
    fn start(&self);

    /// Byte-level progress for one object.  `read` is the total transferred so far out of
    /// `total`, and `current` is the increment since the previous call.
    fn transfer_bytes(&self, direction: &str, name: &str, read: u64, total: u64, current: u64);

    /// An object was handed to the transfer adapter.
    fn start_transfer(&self, name: &str);

    /// An object finished transferring successfully.
    fn finish_transfer(&self, name: &str);

    /// An object of `size` bytes needs no transfer, or will never be transferred.
    fn skip(&self, size: u64);

    /// No further events will arrive.
    fn finish(&self);
}
