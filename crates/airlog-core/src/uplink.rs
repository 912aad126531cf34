//! Network transport seam.
//!
//! The core never touches sockets. Firmware implements [`Uplink`] over
//! reqwless + embassy-net, the simulator over the local filesystem.

use alloc::format;

use thiserror_no_std::Error;

use crate::storage::{Clock, LogLevel, LogStore, Storage, StorageError};

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum UplinkError {
    #[error("Connection failed")]
    Connect,
    #[error("Request failed")]
    Request,
    #[error("Request timed out")]
    Timeout,
    #[error("Request body could not be read")]
    Body,
    #[error("Response body larger than the receive buffer")]
    ResponseTooLarge,
}

impl From<StorageError> for UplinkError {
    fn from(_: StorageError) -> Self {
        UplinkError::Body
    }
}

/// A request body that is produced in chunks instead of held in memory.
pub trait BodySource {
    /// Total length, sent as `Content-Length`.
    fn content_length(&self) -> u32;

    /// Copy the next chunk into `buf`. Returns 0 once the body is exhausted.
    fn read_chunk(&mut self, buf: &mut [u8]) -> Result<usize, UplinkError>;
}

/// A file on [`Storage`], streamed from `offset` 0 to its length at open time.
pub struct FileBody<'a, S> {
    storage: &'a mut S,
    name: &'static str,
    length: u32,
    offset: u32,
}

impl<'a, S: Storage> FileBody<'a, S> {
    /// `None` when the file is missing.
    pub fn open(storage: &'a mut S, name: &'static str) -> Result<Option<Self>, StorageError> {
        let Some(length) = storage.size(name)? else {
            return Ok(None);
        };
        Ok(Some(Self {
            storage,
            name,
            length,
            offset: 0,
        }))
    }
}

impl<S: Storage> BodySource for FileBody<'_, S> {
    fn content_length(&self) -> u32 {
        self.length
    }

    fn read_chunk(&mut self, buf: &mut [u8]) -> Result<usize, UplinkError> {
        let remaining = (self.length - self.offset) as usize;
        if remaining == 0 {
            return Ok(0);
        }
        let want = remaining.min(buf.len());
        let n = self.storage.read_at(self.name, self.offset, &mut buf[..want])?;
        if n == 0 {
            // File shrank underneath us; Content-Length can no longer be honored
            return Err(UplinkError::Body);
        }
        self.offset += n as u32;
        Ok(n)
    }
}

/// HTTP(S) client used for delivery, mirroring and the update check.
///
/// Every method returns the HTTP status code; interpreting it is up to the
/// caller.
pub trait Uplink {
    /// POST `body` with `Content-Type: application/json`.
    fn post_json(
        &mut self,
        url: &str,
        body: &[u8],
    ) -> impl Future<Output = Result<u16, UplinkError>>;

    /// PUT a streamed body.
    fn put<B: BodySource>(
        &mut self,
        url: &str,
        content_type: &str,
        body: &mut B,
    ) -> impl Future<Output = Result<u16, UplinkError>>;

    /// GET into `buf`. Returns the status and the number of body bytes.
    fn get(
        &mut self,
        url: &str,
        buf: &mut [u8],
    ) -> impl Future<Output = Result<(u16, usize), UplinkError>>;
}

/// Delivery succeeds on HTTP 200 or 201 only.
pub fn is_delivered(status: u16) -> bool {
    status == 200 || status == 201
}

/// POST one JSON payload. Returns true on HTTP 200/201.
pub async fn deliver<U, S, C>(
    uplink: &mut U,
    log: &mut LogStore<S, C>,
    url: &str,
    payload: &[u8],
) -> bool
where
    U: Uplink,
    S: Storage,
    C: Clock,
{
    log.append(&format!("[HTTP] Sending to: {}", url));

    match uplink.post_json(url, payload).await {
        Ok(status) => {
            log.append(&format!("[HTTP] Response code: {}", status));
            is_delivered(status)
        }
        Err(e) => {
            log.note(LogLevel::Warn, &format!("[HTTP] ERROR: {}", e));
            false
        }
    }
}
