pub mod log_store;
pub mod queue;
pub mod sd_card;

use thiserror_no_std::Error;

pub use log_store::{LOG_BACKLOG_LIMIT, LOG_BUFFER_CAPACITY, LOG_FILE, LogLevel, LogStore};
pub use queue::{QUEUE_FILE, RetryQueue};
pub use sd_card::{ClockTimeSource, SdCardStorage};

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageError {
    #[error("Storage is not available")]
    Unavailable,
    #[error("File not found: {name}")]
    NotFound { name: &'static str },
    #[error("I/O error during {operation}")]
    Io { operation: &'static str },
}

/// Flat file store with 8.3 names in a single root directory.
///
/// Every call opens and closes what it needs, so nothing stays open between
/// cycles. Calls are blocking.
pub trait Storage {
    /// Check that the medium is present and the volume mounts.
    fn probe(&mut self) -> Result<(), StorageError>;

    /// Append bytes, creating the file when missing.
    fn append(&mut self, name: &'static str, data: &[u8]) -> Result<(), StorageError>;

    /// Replace the file's content, creating it when missing.
    fn write(&mut self, name: &'static str, data: &[u8]) -> Result<(), StorageError>;

    /// Read up to `buf.len()` bytes starting at `offset`. Returns the number of
    /// bytes read, 0 at end of file.
    fn read_at(
        &mut self,
        name: &'static str,
        offset: u32,
        buf: &mut [u8],
    ) -> Result<usize, StorageError>;

    /// File size in bytes, `None` when the file does not exist.
    fn size(&mut self, name: &'static str) -> Result<Option<u32>, StorageError>;

    /// Delete the file. Removing a missing file is not an error.
    fn remove(&mut self, name: &'static str) -> Result<(), StorageError>;
}

/// Wall clock in unix seconds.
pub trait Clock {
    fn now(&self) -> i64;
}

impl<C: Clock> Clock for &C {
    fn now(&self) -> i64 {
        (**self).now()
    }
}
