use crate::ProgressMeter;

/// A meter that discards every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoOpProgressMeter;

impl ProgressMeter for NoOpProgressMeter {
    fn start(&self) {}

    fn transfer_bytes(&self, _direction: &str, _name: &str, _read: u64, _total: u64, _current: u64) {}

    fn start_transfer(&self, _name: &str) {}

    fn finish_transfer(&self, _name: &str) {}

    fn skip(&self, _size: u64) {}

    fn finish(&self) {}
}
