//! # Environmental Sensor Node
//!
//! `myrtio-sensor-node` is a `no_std`, asynchronous firmware core for a
//! small environmental sensor node built on the [Embassy](https://embassy.dev/)
//! ecosystem. Once a second it samples an AHT10 (temperature and relative
//! humidity) and a BH1750 (illuminance), renders the reading as JSON and
//! publishes it to an MQTT broker over Wi-Fi.
//!
//! ## Core Features
//!
//! - **`no_std` & `no_alloc`:** Buffers are fixed-size and managed with `heapless`.
//! - **Fully Async:** Sensor transfers, the broker session and all waits are `async`.
//! - **Hardware Agnostic:** Sensors take any `embedded-hal-async` I2C bus and
//!   delay, the session runs over any [`MqttTransport`], and the radio is
//!   reached through the [`WifiLink`] trait. A TCP transport on top of
//!   `embassy-net` is included.
//! - **At most one publish in flight:** Every reading is published with QoS 1.
//!   While one is unacknowledged, newer readings are dropped instead of queued.
//!
//! ## Architecture
//!
//! The board crate builds the buses, the radio and the network stack, then
//! hands everything to [`SensorNode`]:
//!
//! ```ignore
//! let config = NodeConfig::from_env()?;
//! // both buses clocked at `config.i2c_frequency_hz`
//! let sensors = Sensors::from_config(climate_bus, Delay, light_bus, Delay, &config);
//! let transport = TcpTransport::new(socket, Duration::from_secs(5), Duration::from_millis(50));
//! let mut node =
//!     SensorNode::<_, _, _, _, _, _, 512>::new(config, sensors, transport, EmbassyClock);
//!
//! // Returns only if the radio or the association fails.
//! let Err(e) = node.run(&mut wifi).await;
//! ```
//!
//! The MQTT session has no background task. [`MqttClient::poll`] reports
//! completions (accepted connection, acknowledged publish, lost broker) as
//! [`MqttEvent`]s and the node drains them once per loop iteration.

#![cfg_attr(not(test), no_std)]

// This mod MUST go first, so that the others see its macros.
pub(crate) mod fmt;

pub mod client;
pub mod config;
pub mod cycle;
pub mod error;
pub mod link;
pub mod node;
pub mod packet;
pub mod reading;
pub mod sensor;
pub mod time;
pub mod transport;
pub mod util;

#[cfg(test)]
mod testing;

// Re-export key types for easier access at the crate root.
pub use client::{MqttClient, MqttEvent, MqttOptions, PublishOutcome};
pub use config::NodeConfig;
pub use cycle::Sensors;
pub use error::{MqttError, NodeError, SensorError};
pub use link::{WifiCredentials, WifiLink};
pub use node::SensorNode;
pub use reading::SensorReading;
pub use sensor::{Aht10, Bh1750, LightMode};
pub use time::{Clock, EmbassyClock};
pub use transport::{BrokerEndpoint, MqttTransport, TcpTransport};
