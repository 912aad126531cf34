//! File-backed uplink.
//!
//! POSTed payloads land in `<outbox>/posts/`, mirrored logs under
//! `<outbox>/mirror/<object key>`, and `file://` manifest URLs are served from
//! disk. Every `fail_every`-th request fails with a connection error.

use std::fs;
use std::path::PathBuf;

use airlog_core::payload::Payload;
use airlog_core::uplink::{BodySource, Uplink, UplinkError};
use log::{info, warn};

const PUT_CHUNK: usize = 512;

pub struct SimUplink {
    outbox: PathBuf,
    fail_every: u32,
    requests: u32,
    posted: u32,
}

impl SimUplink {
    pub fn new(outbox: PathBuf, fail_every: u32) -> Self {
        Self {
            outbox,
            fail_every,
            requests: 0,
            posted: 0,
        }
    }

    fn next_request(&mut self, method: &str, url: &str) -> Result<(), UplinkError> {
        self.requests = self.requests.wrapping_add(1);
        if self.fail_every > 0 && self.requests % self.fail_every == 0 {
            warn!("[SIM] Dropping {} {} (injected failure)", method, url);
            return Err(UplinkError::Connect);
        }
        Ok(())
    }

    fn store(&self, relative: &str, data: &[u8]) -> Result<(), UplinkError> {
        let path = self.outbox.join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|_| UplinkError::Request)?;
        }
        fs::write(&path, data).map_err(|_| UplinkError::Request)
    }
}

/// Path part of an `http(s)://host/path` URL.
fn url_path(url: &str) -> &str {
    let without_scheme = url.split_once("://").map_or(url, |(_, rest)| rest);
    without_scheme
        .split_once('/')
        .map_or("", |(_, path)| path)
}

impl Uplink for SimUplink {
    async fn post_json(&mut self, url: &str, body: &[u8]) -> Result<u16, UplinkError> {
        self.next_request("POST", url)?;

        let Ok(json) = std::str::from_utf8(body) else {
            return Ok(400);
        };
        if Payload::from_json(json).is_err() {
            warn!("[SIM] Rejecting malformed payload");
            return Ok(400);
        }

        self.posted += 1;
        self.store(&format!("posts/{:06}.json", self.posted), body)?;
        info!("[SIM] Collector accepted payload #{}", self.posted);
        Ok(201)
    }

    async fn put<B: BodySource>(
        &mut self,
        url: &str,
        _content_type: &str,
        body: &mut B,
    ) -> Result<u16, UplinkError> {
        self.next_request("PUT", url)?;

        let mut data = Vec::with_capacity(body.content_length() as usize);
        let mut chunk = [0u8; PUT_CHUNK];
        loop {
            let n = body.read_chunk(&mut chunk)?;
            if n == 0 {
                break;
            }
            data.extend_from_slice(&chunk[..n]);
        }

        self.store(&format!("mirror/{}", url_path(url)), &data)?;
        Ok(200)
    }

    async fn get(&mut self, url: &str, buf: &mut [u8]) -> Result<(u16, usize), UplinkError> {
        self.next_request("GET", url)?;

        let Some(path) = url.strip_prefix("file://") else {
            return Ok((404, 0));
        };
        let Ok(content) = fs::read(path) else {
            return Ok((404, 0));
        };
        if content.len() > buf.len() {
            return Err(UplinkError::ResponseTooLarge);
        }
        buf[..content.len()].copy_from_slice(&content);
        Ok((200, content.len()))
    }
}
