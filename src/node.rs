//! # Sensor node
//!
//! Bring-up followed by an endless superloop:
//!
//! 1. announce, bring the radio up, associate (bounded, fatal on failure)
//! 2. initialise both sensors
//! 3. open the broker session and give it a bounded window to come up
//! 4. loop forever: drain session events, run one acquisition cycle if the
//!    session is up or reconnect if it is not, then sleep for one period
//!
//! The loop has no backoff and no jitter. A reconnect costs one period, so a
//! broker outage is retried once per loop interval until it ends.

use core::convert::Infallible;

use embedded_hal_async::delay::DelayNs;
use embedded_hal_async::i2c::I2c;

use crate::client::{MqttClient, MqttEvent};
use crate::config::NodeConfig;
use crate::cycle::{Sensors, run_cycle};
use crate::error::NodeError;
use crate::link::WifiLink;
use crate::time::{Clock, Deadline};
use crate::transport::MqttTransport;

pub struct SensorNode<CI, CD, LI, LD, T, C, const BUF_SIZE: usize> {
    config: NodeConfig,
    sensors: Sensors<CI, CD, LI, LD>,
    client: MqttClient<T, C, BUF_SIZE>,
    clock: C,
}

impl<CI, CD, LI, LD, T, C, const BUF_SIZE: usize> SensorNode<CI, CD, LI, LD, T, C, BUF_SIZE>
where
    CI: I2c,
    CD: DelayNs,
    LI: I2c,
    LD: DelayNs,
    T: MqttTransport,
    C: Clock + Clone,
{
    pub fn new(
        config: NodeConfig,
        sensors: Sensors<CI, CD, LI, LD>,
        transport: T,
        clock: C,
    ) -> Self {
        let client = MqttClient::new(transport, clock.clone(), config.mqtt);
        Self {
            config,
            sensors,
            client,
            clock,
        }
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    pub fn client(&self) -> &MqttClient<T, C, BUF_SIZE> {
        &self.client
    }

    /// Brings the node up and runs the superloop. Returns only if bring-up
    /// fails.
    pub async fn run<L: WifiLink>(
        &mut self,
        link: &mut L,
    ) -> Result<Infallible, NodeError<L::Error>> {
        self.start(link).await?;
        loop {
            self.step().await;
        }
    }

    /// Everything before the superloop.
    ///
    /// Radio and association failures are fatal. The broker is not: if the
    /// session is not up when the wait ends, the superloop keeps retrying.
    pub async fn start<L: WifiLink>(&mut self, link: &mut L) -> Result<(), NodeError<L::Error>> {
        info!("node: {} starting", self.config.device_id);

        link.init().await.map_err(|e| {
            error!("node: radio init failed");
            NodeError::RadioInit(e)
        })?;
        info!("node: joining {}", self.config.wifi.ssid);
        link.join(&self.config.wifi, self.config.wifi_timeout)
            .await
            .map_err(|e| {
                error!("node: could not join {}", self.config.wifi.ssid);
                NodeError::Association(e)
            })?;
        info!("node: wifi up");

        self.sensors.init().await;

        self.connect().await;
        self.wait_for_session().await;
        Ok(())
    }

    /// One superloop iteration.
    pub async fn step(&mut self) {
        self.pump_events().await;

        if self.client.is_connected() {
            run_cycle(
                &mut self.sensors,
                &mut self.client,
                self.config.device_id,
                self.config.publish_topic,
            )
            .await;
        } else {
            info!("node: no broker session, reconnecting");
            self.connect().await;
        }

        self.clock.sleep(self.config.loop_interval).await;
    }

    /// Waits for the broker to accept the session, polling at the
    /// configured interval up to the configured bound.
    ///
    /// Returns whether the session came up.
    pub async fn wait_for_session(&mut self) -> bool {
        let deadline = Deadline::after(&self.clock, self.config.mqtt_connect_wait);
        loop {
            self.pump_events().await;
            if self.client.is_connected() {
                return true;
            }
            if deadline.has_expired(&self.clock) {
                warn!("node: broker did not answer in time, continuing");
                return false;
            }
            self.clock.sleep(self.config.mqtt_connect_poll).await;
        }
    }

    /// Handles every event the session has ready.
    pub async fn pump_events(&mut self) {
        loop {
            match self.client.poll().await {
                Ok(Some(event)) => log_event(event),
                Ok(None) => break,
                Err(e) => {
                    warn!("node: broker session dropped: {}", e.kind());
                    break;
                }
            }
        }
    }

    async fn connect(&mut self) {
        let broker = self.config.broker;
        info!("node: connecting to {:?}:{}", broker.addr.octets(), broker.port);
        if let Err(e) = self.client.connect(broker, self.config.device_id).await {
            warn!("node: broker connect failed: {}", e.kind());
        }
    }
}

fn log_event(event: MqttEvent) {
    match event {
        MqttEvent::Connected { session_present } => {
            info!("node: broker session up (present: {})", session_present);
        }
        MqttEvent::Refused(code) => warn!("node: broker refused session: {:?}", code),
        MqttEvent::Delivered { packet_id } => info!("node: reading {} delivered", packet_id),
        MqttEvent::DeliveryTimedOut { packet_id } => {
            warn!("node: reading {} was never acknowledged", packet_id);
        }
        MqttEvent::Pong => trace!("node: broker alive"),
        MqttEvent::Lost => warn!("node: broker session lost"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::ConnectionState;
    use crate::sensor::{Aht10, Bh1750, LightMode};
    use crate::testing::{BusLog, FakeClock, MockDelay, MockI2c, MockLink, MockTransport, Wire};
    use embassy_futures::block_on;
    use embassy_time::Duration;
    use std::cell::RefCell;
    use std::rc::Rc;

    type TestNode<'c> =
        SensorNode<MockI2c, MockDelay, MockI2c, MockDelay, MockTransport, &'c FakeClock, 512>;

    const CLIMATE_FRAME: [u8; 6] = [0x1C, 0x80, 0x00, 0x05, 0x00, 0x00];
    const LIGHT_FRAME: [u8; 2] = [0x01, 0x68];

    fn node(clock: &FakeClock, cycles: usize) -> (TestNode<'_>, Rc<RefCell<Wire>>) {
        let log = BusLog::default();
        let mut climate = MockI2c::new(log.clone());
        let mut light = MockI2c::new(log.clone());
        for _ in 0..cycles {
            climate = climate.respond(&CLIMATE_FRAME);
            light = light.respond(&LIGHT_FRAME);
        }
        let sensors = Sensors::new(
            Aht10::new(climate, MockDelay::new(log.clone())),
            Bh1750::new(light, MockDelay::new(log), LightMode::Continuous),
        );
        let (transport, wire) = MockTransport::new();
        (
            SensorNode::new(NodeConfig::default(), sensors, transport, clock),
            wire,
        )
    }

    #[test]
    fn radio_failure_is_fatal() {
        let clock = FakeClock::new();
        let (mut node, wire) = node(&clock, 0);
        let mut link = MockLink {
            fail_init: true,
            ..MockLink::default()
        };

        assert!(matches!(
            block_on(node.run(&mut link)),
            Err(NodeError::RadioInit("radio init failed"))
        ));
        assert!(link.joined.is_empty());
        assert!(wire.borrow().opened.is_empty());
    }

    #[test]
    fn association_failure_is_fatal() {
        let clock = FakeClock::new();
        let (mut node, wire) = node(&clock, 0);
        let mut link = MockLink {
            fail_join: true,
            ..MockLink::default()
        };

        assert!(matches!(
            block_on(node.run(&mut link)),
            Err(NodeError::Association(_))
        ));
        assert_eq!(
            link.joined,
            [(
                std::string::String::from("RENASCENCA_Cozinha_multilaser_"),
                Duration::from_secs(30)
            )]
        );
        assert!(wire.borrow().opened.is_empty());
    }

    #[test]
    fn silent_broker_bounds_the_initial_wait() {
        let clock = FakeClock::new();
        let (mut node, wire) = node(&clock, 0);

        block_on(node.start(&mut MockLink::default())).unwrap();
        assert_eq!(clock.sleeps(), std::vec![Duration::from_millis(500); 20]);
        assert_eq!(clock.elapsed_ms(), 10_000);
        assert_eq!(wire.borrow().opened.len(), 1);
        assert_eq!(node.client().state(), ConnectionState::Connecting);
    }

    #[test]
    fn superloop_reconnects_while_disconnected() {
        let clock = FakeClock::new();
        let (mut node, wire) = node(&clock, 0);
        block_on(node.start(&mut MockLink::default())).unwrap();

        block_on(node.step());
        block_on(node.step());
        assert_eq!(wire.borrow().opened.len(), 3);
        assert_eq!(wire.borrow().publishes(), 0);
        assert_eq!(clock.elapsed_ms(), 12_000);
        assert_eq!(
            clock.sleeps()[20..],
            [Duration::from_millis(1000), Duration::from_millis(1000)]
        );
    }

    #[test]
    fn connected_node_publishes_once_per_acknowledgement() {
        let clock = FakeClock::new();
        let (mut node, wire) = node(&clock, 3);
        wire.borrow_mut().auto_connack = Some(0);

        block_on(node.start(&mut MockLink::default())).unwrap();
        assert!(node.client().is_connected());
        assert!(clock.sleeps().is_empty());

        block_on(node.step());
        assert_eq!(wire.borrow().publishes(), 1);
        assert_eq!(clock.sleeps(), [Duration::from_millis(1000)]);

        // no PUBACK yet: the next reading is dropped
        block_on(node.step());
        assert_eq!(wire.borrow().publishes(), 1);

        wire.borrow_mut().puback_last();
        block_on(node.step());
        let published = wire.borrow().published();
        assert_eq!(published.len(), 2);
        assert_eq!(published[1].0, "Sensores/dados/json");
        assert_eq!(
            std::str::from_utf8(&published[1].1).unwrap(),
            r#"{"temperatura":12.50, "umidade":50.00, "luminosidade":300.00}"#
        );
        assert_eq!(wire.borrow().opened.len(), 1);
    }

    #[test]
    fn refused_session_is_retried_by_the_superloop() {
        let clock = FakeClock::new();
        let (mut node, wire) = node(&clock, 0);
        wire.borrow_mut().auto_connack = Some(5);

        block_on(node.start(&mut MockLink::default())).unwrap();
        assert!(!node.client().is_connected());

        wire.borrow_mut().auto_connack = Some(0);
        block_on(node.step());
        assert_eq!(wire.borrow().opened.len(), 2);
        block_on(node.step());
        assert!(node.client().is_connected());
    }
}
