//! Firmware update check.
//!
//! Fetches a JSON manifest `{"version": "X.Y.Z", "url": "..."}` and decides
//! whether the advertised firmware is newer than the running one. Downloading
//! and flashing the image is left to the platform.

use alloc::string::String;
use core::cmp::Ordering;
use core::fmt;

use log::{info, warn};
use serde::Deserialize;
use thiserror_no_std::Error;

use crate::uplink::{Uplink, UplinkError};

/// Largest manifest body accepted.
pub const MANIFEST_BUFFER_LEN: usize = 512;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum UpdateError {
    #[error("Manifest fetch failed: {0}")]
    Fetch(UplinkError),
    #[error("Manifest request returned HTTP {0}")]
    Status(u16),
    #[error("Manifest is not valid JSON")]
    Parse,
    #[error("Manifest missing {field} field")]
    MissingField { field: &'static str },
}

/// `MAJOR.MINOR.PATCH`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct Version {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl Version {
    pub const fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    /// Lenient parse: components are read in order, each as a leading run of
    /// digits. The first component that does not start with a digit, and every
    /// component after it, is 0.
    pub fn parse(text: &str) -> Self {
        let mut parts = [0u32; 3];
        let mut rest = text.trim_start();

        for (index, part) in parts.iter_mut().enumerate() {
            if index > 0 {
                match rest.strip_prefix('.') {
                    Some(after) => rest = after,
                    None => break,
                }
            }
            let digits = rest.bytes().take_while(u8::is_ascii_digit).count();
            if digits == 0 {
                break;
            }
            *part = rest[..digits].parse().unwrap_or(u32::MAX);
            rest = &rest[digits..];
        }

        Self::new(parts[0], parts[1], parts[2])
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// True when `remote` is strictly newer than `local`.
pub fn is_newer(local: &str, remote: &str) -> bool {
    Version::parse(remote).cmp(&Version::parse(local)) == Ordering::Greater
}

#[derive(Deserialize)]
struct RawManifest {
    #[serde(default)]
    version: String,
    #[serde(default)]
    url: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Manifest {
    pub version: String,
    pub url: String,
}

impl Manifest {
    /// Parse a manifest body. Both fields must be present and non-empty.
    pub fn from_json(body: &[u8]) -> Result<Self, UpdateError> {
        let raw: RawManifest = serde_json::from_slice(body).map_err(|_| UpdateError::Parse)?;
        if raw.version.is_empty() {
            return Err(UpdateError::MissingField { field: "version" });
        }
        if raw.url.is_empty() {
            return Err(UpdateError::MissingField { field: "url" });
        }
        Ok(Self {
            version: raw.version,
            url: raw.url,
        })
    }
}

/// Fetch the manifest at `manifest_url` and return it only when it advertises
/// a version newer than `current`.
pub async fn check_for_update<U: Uplink>(
    uplink: &mut U,
    manifest_url: &str,
    current: &str,
) -> Result<Option<Manifest>, UpdateError> {
    info!("[OTA] Current firmware: v{}", current);
    info!("[OTA] Checking for update at: {}", manifest_url);

    let mut body = [0u8; MANIFEST_BUFFER_LEN];
    let (status, len) = uplink
        .get(manifest_url, &mut body)
        .await
        .map_err(UpdateError::Fetch)?;

    if status != 200 {
        warn!("[OTA] Manifest response code: {}", status);
        return Err(UpdateError::Status(status));
    }

    let manifest = Manifest::from_json(&body[..len])?;
    info!("[OTA] Remote version: v{}", manifest.version);

    if is_newer(current, &manifest.version) {
        Ok(Some(manifest))
    } else {
        Ok(None)
    }
}
