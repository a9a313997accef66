pub mod log;
pub mod transfer;
