//! The published reading and its wire representation.

use core::fmt::Write;

use heapless::String;

use crate::error::SensorError;
use crate::sensor::Climate;

/// Capacity of the topic string.
pub const TOPIC_CAPACITY: usize = 128;
/// Capacity of the JSON payload string.
pub const PAYLOAD_CAPACITY: usize = 256;

/// Temperature and humidity reported when the AHT10 read fails.
pub const CLIMATE_UNAVAILABLE: f32 = 0.0;
/// Illuminance reported when the BH1750 read fails.
pub const LUX_UNAVAILABLE: f32 = -1.0;

#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SensorReading {
    pub temperature: f32,
    pub humidity: f32,
    pub illuminance: f32,
}

impl SensorReading {
    /// Assembles a reading, substituting sentinels for failed reads.
    pub fn from_results(
        climate: Result<Climate, SensorError>,
        illuminance: Result<f32, SensorError>,
    ) -> Self {
        let (temperature, humidity) = match climate {
            Ok(c) => (c.temperature, c.humidity),
            Err(_) => (CLIMATE_UNAVAILABLE, CLIMATE_UNAVAILABLE),
        };
        Self {
            temperature,
            humidity,
            illuminance: illuminance.unwrap_or(LUX_UNAVAILABLE),
        }
    }

    /// Renders the fixed JSON schema the ingestion side expects:
    /// `{"temperatura":T, "umidade":H, "luminosidade":L}`, two decimals each.
    pub fn to_json(&self) -> Result<String<PAYLOAD_CAPACITY>, core::fmt::Error> {
        let mut payload = String::new();
        write!(
            payload,
            "{{\"temperatura\":{:.2}, \"umidade\":{:.2}, \"luminosidade\":{:.2}}}",
            self.temperature, self.humidity, self.illuminance
        )?;
        Ok(payload)
    }
}

/// Builds `<device_id>/<sub_topic>`.
pub fn topic(device_id: &str, sub_topic: &str) -> Result<String<TOPIC_CAPACITY>, core::fmt::Error> {
    let mut topic = String::new();
    write!(topic, "{}/{}", device_id, sub_topic)?;
    Ok(topic)
}
