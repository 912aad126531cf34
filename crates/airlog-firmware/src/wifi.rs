//! Station-mode Wi-Fi bring-up and reconnects.
//!
//! The logger never blocks forever on the network: each call makes a bounded
//! number of attempts and reports whether the link is usable, so a cycle can
//! fall back to the retry queue.

use embassy_net::Stack;
use embassy_time::{Duration, Timer, WithTimeout};
use esp_radio::wifi::WifiController;
use log::{info, warn};

const DHCP_TIMEOUT: Duration = Duration::from_secs(15);
const RETRY_DELAY: Duration = Duration::from_secs(2);

/// Attempts made at boot before giving up for this cycle.
pub const BOOT_ATTEMPTS: u32 = 10;
/// Attempts made before each send when the link has dropped.
pub const CYCLE_ATTEMPTS: u32 = 3;

pub fn is_online(controller: &WifiController<'_>, stack: Stack<'_>) -> bool {
    matches!(controller.is_connected(), Ok(true)) && stack.is_link_up() && stack.config_v4().is_some()
}

/// Connect and wait for a DHCP lease, trying at most `attempts` times.
pub async fn connect(
    controller: &mut WifiController<'_>,
    stack: Stack<'_>,
    attempts: u32,
) -> bool {
    for attempt in 1..=attempts {
        info!("[WIFI] Connecting (attempt {}/{})", attempt, attempts);

        if !controller.is_started().unwrap_or(false) {
            if let Err(e) = controller.start_async().await {
                warn!("[WIFI] Start failed: {:?}", e);
                Timer::after(RETRY_DELAY).await;
                continue;
            }
        }

        if let Err(e) = controller.connect_async().await {
            warn!("[WIFI] Connect failed: {:?}", e);
            let _ = controller.disconnect_async().await;
            Timer::after(RETRY_DELAY).await;
            continue;
        }

        match stack.wait_config_up().with_timeout(DHCP_TIMEOUT).await {
            Ok(()) => {
                if let Some(config) = stack.config_v4() {
                    info!("[WIFI] Connected, IP {}", config.address.address());
                }
                return true;
            }
            Err(_) => {
                warn!("[WIFI] DHCP timed out");
                let _ = controller.disconnect_async().await;
                Timer::after(RETRY_DELAY).await;
            }
        }
    }

    warn!("[WIFI] Giving up after {} attempt(s)", attempts);
    false
}

/// Reconnect only if the link is down.
pub async fn ensure_connected(controller: &mut WifiController<'_>, stack: Stack<'_>) -> bool {
    if is_online(controller, stack) {
        return true;
    }
    warn!("[WIFI] Link lost, reconnecting");
    let _ = controller.disconnect_async().await;
    connect(controller, stack, CYCLE_ATTEMPTS).await
}
