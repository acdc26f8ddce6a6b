//! One acquisition cycle: sample both sensors, publish the reading.
//!
//! A cycle never fails. Sensor faults turn into sentinel values and MQTT
//! problems are logged and left to the superloop.

use embedded_hal_async::delay::DelayNs;
use embedded_hal_async::i2c::I2c;

use crate::client::{MqttClient, PublishOutcome};
use crate::config::NodeConfig;
use crate::reading::{SensorReading, topic};
use crate::sensor::{Aht10, Bh1750};
use crate::time::Clock;
use crate::transport::MqttTransport;

/// The node's two sensors, each on its own bus.
pub struct Sensors<CI, CD, LI, LD> {
    pub climate: Aht10<CI, CD>,
    pub light: Bh1750<LI, LD>,
}

impl<CI, CD, LI, LD> Sensors<CI, CD, LI, LD>
where
    CI: I2c,
    CD: DelayNs,
    LI: I2c,
    LD: DelayNs,
{
    pub fn new(climate: Aht10<CI, CD>, light: Bh1750<LI, LD>) -> Self {
        Self { climate, light }
    }

    /// Builds both drivers, the light sensor in the configured mode.
    pub fn from_config(
        climate_bus: CI,
        climate_delay: CD,
        light_bus: LI,
        light_delay: LD,
        config: &NodeConfig,
    ) -> Self {
        Self::new(
            Aht10::new(climate_bus, climate_delay),
            Bh1750::new(light_bus, light_delay, config.light_mode),
        )
    }

    /// Initialises both sensors. A sensor that fails here keeps being read
    /// every cycle and reports sentinels until it answers.
    pub async fn init(&mut self) {
        if let Err(e) = self.climate.init().await {
            warn!("aht10: init failed: {:?}", e);
        }
        self.light.init().await;
        debug!("node: sensors initialised ({:?} light mode)", self.light.mode());
    }

    /// Reads temperature and humidity, then illuminance.
    pub async fn sample(&mut self) -> SensorReading {
        let climate = self.climate.read().await;
        if let Err(e) = &climate {
            warn!("aht10: read failed: {:?}", e);
        }
        let illuminance = self.light.read().await;
        if let Err(e) = &illuminance {
            warn!("bh1750: read failed: {:?}", e);
        }
        SensorReading::from_results(climate, illuminance)
    }
}

/// Samples the sensors and hands the reading to the MQTT client.
pub async fn run_cycle<CI, CD, LI, LD, T, C, const BUF_SIZE: usize>(
    sensors: &mut Sensors<CI, CD, LI, LD>,
    client: &mut MqttClient<T, C, BUF_SIZE>,
    device_id: &str,
    sub_topic: &str,
) -> SensorReading
where
    CI: I2c,
    CD: DelayNs,
    LI: I2c,
    LD: DelayNs,
    T: MqttTransport,
    C: Clock,
{
    let reading = sensors.sample().await;
    info!(
        "node: T={} C, RH={} %, L={} lx",
        reading.temperature, reading.humidity, reading.illuminance
    );

    let Ok(payload) = reading.to_json() else {
        error!("node: reading does not fit the payload buffer");
        return reading;
    };
    let Ok(topic_name) = topic(device_id, sub_topic) else {
        error!("node: topic does not fit the topic buffer");
        return reading;
    };

    match client.publish(&topic_name, payload.as_bytes()).await {
        Ok(PublishOutcome::Queued { packet_id }) => {
            debug!("node: reading queued as packet {}", packet_id);
        }
        Ok(PublishOutcome::Skipped(reason)) => {
            debug!("node: publish skipped: {:?}", reason);
        }
        Err(e) => {
            warn!("node: publish failed: {}", e.kind());
        }
    }
    reading
}
