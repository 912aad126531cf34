//! Minimal SNTP client over an embassy-net UDP socket.

use embassy_net::dns::DnsQueryType;
use embassy_net::udp::{PacketMetadata, UdpSocket};
use embassy_net::{IpAddress, Stack};
use embassy_time::{Duration, with_timeout};
use log::{info, warn};
use thiserror_no_std::Error;

const NTP_SERVERS: [&str; 2] = ["pool.ntp.org", "time.nist.gov"];
const NTP_PORT: u16 = 123;
const NTP_PACKET_LEN: usize = 48;
/// Seconds between the NTP epoch (1900) and the unix epoch.
const NTP_UNIX_OFFSET: i64 = 2_208_988_800;
const RESPONSE_TIMEOUT: Duration = Duration::from_secs(3);

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SntpError {
    #[error("Network has no IPv4 configuration")]
    NoNetwork,
    #[error("No NTP server answered")]
    NoResponse,
}

async fn resolve(stack: Stack<'_>, host: &str) -> Option<IpAddress> {
    match stack.dns_query(host, DnsQueryType::A).await {
        Ok(addresses) => addresses.first().copied(),
        Err(e) => {
            warn!("[TIME] DNS lookup for {} failed: {:?}", host, e);
            None
        }
    }
}

/// Ask each server in turn and return the first transmit timestamp as unix
/// seconds.
pub async fn fetch_time(stack: Stack<'_>) -> Result<i64, SntpError> {
    if stack.config_v4().is_none() {
        return Err(SntpError::NoNetwork);
    }

    for host in NTP_SERVERS {
        let Some(server) = resolve(stack, host).await else {
            continue;
        };

        let mut rx_meta = [PacketMetadata::EMPTY; 1];
        let mut rx_buffer = [0u8; 128];
        let mut tx_meta = [PacketMetadata::EMPTY; 1];
        let mut tx_buffer = [0u8; 128];
        let mut socket = UdpSocket::new(
            stack,
            &mut rx_meta,
            &mut rx_buffer,
            &mut tx_meta,
            &mut tx_buffer,
        );
        if socket.bind(0).is_err() {
            warn!("[TIME] Failed to bind UDP socket");
            continue;
        }

        let mut packet = [0u8; NTP_PACKET_LEN];
        // LI = 0, VN = 3, Mode = 3 (client)
        packet[0] = 0x1B;

        if socket.send_to(&packet, (server, NTP_PORT)).await.is_err() {
            warn!("[TIME] Request to {} not sent", host);
            continue;
        }

        let len = match with_timeout(RESPONSE_TIMEOUT, socket.recv_from(&mut packet)).await {
            Ok(Ok((len, _))) => len,
            Ok(Err(e)) => {
                warn!("[TIME] {} receive error: {:?}", host, e);
                continue;
            }
            Err(_) => {
                warn!("[TIME] {} timed out", host);
                continue;
            }
        };
        if len < NTP_PACKET_LEN {
            warn!("[TIME] Short response from {}", host);
            continue;
        }

        // Transmit timestamp, integer seconds
        let secs = u32::from_be_bytes([packet[40], packet[41], packet[42], packet[43]]);
        info!("[TIME] Synced from {}", host);
        return Ok(i64::from(secs) - NTP_UNIX_OFFSET);
    }

    Err(SntpError::NoResponse)
}
