//! Node configuration.
//!
//! Defaults reproduce the deployed field node. Any of them can be replaced
//! at build time by exporting the matching environment variable before
//! compiling the board crate:
//!
//! | variable        | field                 |
//! |-----------------|-----------------------|
//! | `WIFI_SSID`     | `wifi.ssid`           |
//! | `WIFI_PASSWORD` | `wifi.password`       |
//! | `BROKER_HOST`   | `broker.addr` (IPv4)  |
//! | `BROKER_PORT`   | `broker.port`         |
//! | `DEVICE_ID`     | `device_id`           |
//! | `PUBLISH_TOPIC` | `publish_topic`       |

use core::net::Ipv4Addr;

use embassy_time::Duration;

use crate::client::MqttOptions;
use crate::error::ConfigError;
use crate::link::WifiCredentials;
use crate::sensor::LightMode;
use crate::transport::BrokerEndpoint;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeConfig {
    pub wifi: WifiCredentials,
    pub broker: BrokerEndpoint,
    /// Prefix of the publish topic and base of the MQTT client id.
    pub device_id: &'static str,
    /// Appended to `device_id` to form the publish topic.
    pub publish_topic: &'static str,
    /// BH1750 mode used by [`Sensors::from_config`](crate::cycle::Sensors::from_config).
    pub light_mode: LightMode,
    /// Period of the superloop.
    pub loop_interval: Duration,
    /// Upper bound on station association.
    pub wifi_timeout: Duration,
    /// Upper bound on the first broker handshake at bring-up.
    pub mqtt_connect_wait: Duration,
    /// How often the bring-up wait checks the session.
    pub mqtt_connect_poll: Duration,
    /// Bus clock for both sensor buses. Only read by the board crate, which
    /// constructs the I2C peripherals.
    pub i2c_frequency_hz: u32,
    pub mqtt: MqttOptions,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            wifi: WifiCredentials {
                ssid: "RENASCENCA_Cozinha_multilaser_",
                password: "12345678",
            },
            broker: BrokerEndpoint::new(Ipv4Addr::new(192, 168, 1, 104), 4004),
            device_id: "Sensores",
            publish_topic: "dados/json",
            light_mode: LightMode::Continuous,
            loop_interval: Duration::from_millis(1000),
            wifi_timeout: Duration::from_secs(30),
            mqtt_connect_wait: Duration::from_secs(10),
            mqtt_connect_poll: Duration::from_millis(500),
            i2c_frequency_hz: 100_000,
            mqtt: MqttOptions::default(),
        }
    }
}

/// Raw override values, one per environment variable.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Overrides {
    pub wifi_ssid: Option<&'static str>,
    pub wifi_password: Option<&'static str>,
    pub broker_host: Option<&'static str>,
    pub broker_port: Option<&'static str>,
    pub device_id: Option<&'static str>,
    pub publish_topic: Option<&'static str>,
}

impl Overrides {
    /// Overrides captured from the build environment.
    pub const fn from_build_env() -> Self {
        Self {
            wifi_ssid: option_env!("WIFI_SSID"),
            wifi_password: option_env!("WIFI_PASSWORD"),
            broker_host: option_env!("BROKER_HOST"),
            broker_port: option_env!("BROKER_PORT"),
            device_id: option_env!("DEVICE_ID"),
            publish_topic: option_env!("PUBLISH_TOPIC"),
        }
    }
}

impl NodeConfig {
    /// Defaults with the build environment's overrides applied.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::default().with_overrides(Overrides::from_build_env())
    }

    pub fn with_overrides(mut self, overrides: Overrides) -> Result<Self, ConfigError> {
        if let Some(ssid) = overrides.wifi_ssid {
            self.wifi.ssid = ssid;
        }
        if let Some(password) = overrides.wifi_password {
            self.wifi.password = password;
        }
        if let Some(host) = overrides.broker_host {
            self.broker.addr = host
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidBrokerHost)?;
        }
        if let Some(port) = overrides.broker_port {
            self.broker.port = match port.trim().parse::<u16>() {
                Ok(0) | Err(_) => return Err(ConfigError::InvalidBrokerPort),
                Ok(port) => port,
            };
        }
        if let Some(device_id) = overrides.device_id {
            self.device_id = device_id;
        }
        if let Some(topic) = overrides.publish_topic {
            self.publish_topic = topic;
        }
        Ok(self)
    }
}
