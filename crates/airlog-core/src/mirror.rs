//! Mirrors the combined log file to an S3 bucket.
//!
//! Every upload overwrites the same per-device object, so the bucket always
//! holds the latest full snapshot rather than a history.

use alloc::format;
use alloc::string::String;

use crate::storage::{Clock, LOG_FILE, LogLevel, LogStore, Storage};
use crate::uplink::{BodySource, FileBody, Uplink};

/// Object key for a device: `logs/device_<ID>_log.txt`.
pub fn object_key(device_id: &str) -> String {
    format!("logs/device_{}_log.txt", device_id)
}

pub fn object_url(bucket: &str, region: &str, device_id: &str) -> String {
    format!(
        "https://{}.s3.{}.amazonaws.com/{}",
        bucket,
        region,
        object_key(device_id)
    )
}

/// Any 2xx status counts as stored.
pub fn is_stored(status: u16) -> bool {
    (200..300).contains(&status)
}

/// Where mirrored logs go.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MirrorTarget {
    pub bucket: String,
    pub region: String,
    pub device_id: String,
}

impl MirrorTarget {
    pub fn url(&self) -> String {
        object_url(&self.bucket, &self.region, &self.device_id)
    }
}

/// Flush the log, then stream [`LOG_FILE`] as one PUT.
///
/// Returns false when storage is unavailable, the file is missing or empty,
/// or the request fails.
pub async fn upload_log<S, C, U>(
    log: &mut LogStore<S, C>,
    uplink: &mut U,
    target: &MirrorTarget,
) -> bool
where
    S: Storage,
    C: Clock,
    U: Uplink,
{
    if !log.is_available() {
        return false;
    }

    if let Err(e) = log.flush() {
        log.note(
            LogLevel::Warn,
            &format!("[S3-LOG] Log flush failed before upload: {}", e),
        );
    }

    let url = target.url();

    let result = match FileBody::open(log.storage_mut(), LOG_FILE) {
        Ok(Some(body)) if body.content_length() == 0 => Err("Log file is empty"),
        Ok(Some(mut body)) => {
            let size = body.content_length();
            let status = uplink.put(&url, "text/plain", &mut body).await;
            Ok((size, status))
        }
        Ok(None) => Err("No log file to upload"),
        Err(_) => Err("ERROR: Cannot open log file for reading"),
    };

    // The body borrows storage, so logging waits until the request is done
    match result {
        Err(reason) => {
            log.note(LogLevel::Warn, &format!("[S3-LOG] {}", reason));
            false
        }
        Ok((size, Ok(status))) => {
            log.append(&format!("[S3-LOG] Streamed {} bytes to: {}", size, url));
            log.append(&format!("[S3-LOG] Response code: {}", status));
            if is_stored(status) {
                log.append("[S3-LOG] Log uploaded successfully");
                true
            } else {
                false
            }
        }
        Ok((_, Err(e))) => {
            log.note(LogLevel::Warn, &format!("[S3-LOG] ERROR: {}", e));
            false
        }
    }
}
