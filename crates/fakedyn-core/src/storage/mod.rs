//! Durability: the append-only operation log and its advisory lock.

pub mod lock;
pub mod log;

pub use lock::LogLock;
pub use log::{LogRecord, PersistenceLog};
