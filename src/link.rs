//! Wi-Fi station link.
//!
//! Radio drivers (cyw43, esp-wifi, ...) differ in every detail, so the node
//! only asks two things of them: bring the radio up, then associate as a
//! station within a bounded time. The board crate implements [`WifiLink`]
//! for its radio and spawns the network stack runner itself.

use embassy_time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WifiCredentials {
    pub ssid: &'static str,
    pub password: &'static str,
}

#[allow(async_fn_in_trait)]
pub trait WifiLink {
    type Error: core::fmt::Debug;

    /// Powers up the radio and switches it to station mode.
    async fn init(&mut self) -> Result<(), Self::Error>;

    /// Associates with the access point, giving up after `timeout`.
    async fn join(
        &mut self,
        credentials: &WifiCredentials,
        timeout: Duration,
    ) -> Result<(), Self::Error>;
}
