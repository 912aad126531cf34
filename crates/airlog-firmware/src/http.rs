//! [`Uplink`] over reqwless and embassy-net.
//!
//! One connection per request. Plain `http://` and `https://` URLs both work;
//! TLS sessions are not certificate-checked.

use core::cell::{Cell, RefCell};

use airlog_core::uplink::{BodySource, Uplink, UplinkError};
use embassy_net::Stack;
use embassy_net::dns::DnsSocket;
use embassy_net::tcp::client::{TcpClient, TcpClientState};
use embassy_time::{Duration, with_timeout};
use log::{debug, warn};
use reqwless::client::{HttpClient, TlsConfig, TlsVerify};
use reqwless::request::{Method, RequestBody, RequestBuilder};

/// A full TLS record plus overhead.
pub const TLS_READ_LEN: usize = 16_640;
pub const TLS_WRITE_LEN: usize = 4096;
/// Response headers and, for GET, the whole body.
pub const RX_LEN: usize = 4096;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(20);
const BODY_CHUNK_LEN: usize = 512;

pub type TcpState = TcpClientState<1, 2048, 2048>;

pub struct HttpBuffers {
    tls_read: [u8; TLS_READ_LEN],
    tls_write: [u8; TLS_WRITE_LEN],
    rx: [u8; RX_LEN],
}

impl HttpBuffers {
    pub const fn new() -> Self {
        Self {
            tls_read: [0; TLS_READ_LEN],
            tls_write: [0; TLS_WRITE_LEN],
            rx: [0; RX_LEN],
        }
    }
}

impl Default for HttpBuffers {
    fn default() -> Self {
        Self::new()
    }
}

fn request_error(e: reqwless::Error) -> UplinkError {
    warn!("[HTTP] {:?}", e);
    match e {
        reqwless::Error::Dns => UplinkError::Connect,
        reqwless::Error::BufferTooSmall => UplinkError::ResponseTooLarge,
        _ => UplinkError::Request,
    }
}

/// Feeds a [`BodySource`] to reqwless in fixed-size chunks.
///
/// A source error cannot be reported through the writer's error type, so the
/// body ends early and `failed` is set for the caller to check.
struct StreamedBody<'b, B> {
    source: RefCell<&'b mut B>,
    failed: &'b Cell<bool>,
}

impl<B: BodySource> RequestBody for StreamedBody<'_, B> {
    fn len(&self) -> Option<usize> {
        Some(self.source.borrow().content_length() as usize)
    }

    async fn write<W: reqwless_io::Write>(&self, writer: &mut W) -> Result<(), W::Error> {
        let mut source = self.source.borrow_mut();
        let mut chunk = [0u8; BODY_CHUNK_LEN];
        loop {
            match source.read_chunk(&mut chunk) {
                Ok(0) => return Ok(()),
                Ok(n) => writer.write_all(&chunk[..n]).await?,
                Err(e) => {
                    warn!("[HTTP] Body source failed: {}", e);
                    self.failed.set(true);
                    return Ok(());
                }
            }
        }
    }
}

pub struct HttpUplink {
    stack: Stack<'static>,
    tcp_state: &'static TcpState,
    buffers: &'static mut HttpBuffers,
    seed: u64,
}

impl HttpUplink {
    pub fn new(
        stack: Stack<'static>,
        tcp_state: &'static TcpState,
        buffers: &'static mut HttpBuffers,
        seed: u64,
    ) -> Self {
        Self {
            stack,
            tcp_state,
            buffers,
            seed,
        }
    }

    fn next_seed(&mut self) -> u64 {
        self.seed = self.seed.wrapping_mul(6_364_136_223_846_793_005).wrapping_add(1);
        self.seed
    }
}

impl Uplink for HttpUplink {
    async fn post_json(&mut self, url: &str, body: &[u8]) -> Result<u16, UplinkError> {
        let seed = self.next_seed();
        let buffers = &mut *self.buffers;
        let tcp = TcpClient::new(self.stack, self.tcp_state);
        let dns = DnsSocket::new(self.stack);
        let tls = TlsConfig::new(
            seed,
            &mut buffers.tls_read,
            &mut buffers.tls_write,
            TlsVerify::None,
        );
        let mut client = HttpClient::new_with_tls(&tcp, &dns, tls);

        let exchange = async {
            let request = client
                .request(Method::POST, url)
                .await
                .map_err(request_error)?;
            let headers = [("Content-Type", "application/json")];
            let mut request = request.headers(&headers).body(body);
            let response = request.send(&mut buffers.rx).await.map_err(request_error)?;
            Ok(response.status.0)
        };

        with_timeout(REQUEST_TIMEOUT, exchange)
            .await
            .map_err(|_| UplinkError::Timeout)?
    }

    async fn put<B: BodySource>(
        &mut self,
        url: &str,
        content_type: &str,
        body: &mut B,
    ) -> Result<u16, UplinkError> {
        let seed = self.next_seed();
        let buffers = &mut *self.buffers;
        let tcp = TcpClient::new(self.stack, self.tcp_state);
        let dns = DnsSocket::new(self.stack);
        let tls = TlsConfig::new(
            seed,
            &mut buffers.tls_read,
            &mut buffers.tls_write,
            TlsVerify::None,
        );
        let mut client = HttpClient::new_with_tls(&tcp, &dns, tls);

        debug!("[HTTP] PUT {} ({} bytes)", url, body.content_length());
        let failed = Cell::new(false);
        let streamed = StreamedBody {
            source: RefCell::new(body),
            failed: &failed,
        };

        let exchange = async {
            let request = client
                .request(Method::PUT, url)
                .await
                .map_err(request_error)?;
            let headers = [("Content-Type", content_type)];
            let mut request = request.headers(&headers).body(streamed);
            let response = request.send(&mut buffers.rx).await.map_err(request_error)?;
            Ok(response.status.0)
        };

        let result = with_timeout(REQUEST_TIMEOUT, exchange).await;
        if failed.get() {
            return Err(UplinkError::Body);
        }
        result.map_err(|_| UplinkError::Timeout)?
    }

    async fn get(&mut self, url: &str, buf: &mut [u8]) -> Result<(u16, usize), UplinkError> {
        let seed = self.next_seed();
        let buffers = &mut *self.buffers;
        let tcp = TcpClient::new(self.stack, self.tcp_state);
        let dns = DnsSocket::new(self.stack);
        let tls = TlsConfig::new(
            seed,
            &mut buffers.tls_read,
            &mut buffers.tls_write,
            TlsVerify::None,
        );
        let mut client = HttpClient::new_with_tls(&tcp, &dns, tls);

        let exchange = async {
            let mut request = client
                .request(Method::GET, url)
                .await
                .map_err(request_error)?;
            let response = request.send(&mut buffers.rx).await.map_err(request_error)?;
            let status = response.status.0;
            let data = response
                .body()
                .read_to_end()
                .await
                .map_err(request_error)?;
            if data.len() > buf.len() {
                return Err(UplinkError::ResponseTooLarge);
            }
            buf[..data.len()].copy_from_slice(data);
            Ok((status, data.len()))
        };

        with_timeout(REQUEST_TIMEOUT, exchange)
            .await
            .map_err(|_| UplinkError::Timeout)?
    }
}
