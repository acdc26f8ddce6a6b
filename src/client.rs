//! # Publish-only MQTT session
//!
//! `MqttClient` owns one broker session: the transport, the connection
//! state, and a single slot for the publish that is waiting for its
//! acknowledgement.
//!
//! Nothing in here runs in the background. Completions that a callback-based
//! stack would deliver asynchronously (connection accepted, publish
//! acknowledged) are produced by [`MqttClient::poll`] as [`MqttEvent`]s, and
//! the caller decides when to poll.
//!
//! ## Delivery discipline
//!
//! Every publish uses QoS 1 and at most one may be unacknowledged at a time.
//! While the slot is taken, further publishes are skipped without touching
//! the transport. The slot is released when the matching `PUBACK` arrives,
//! when the acknowledgement times out, or when the session is torn down.
//! A released slot never triggers a retransmission.

use core::fmt::Write;

use embassy_time::{Duration, Instant};
use heapless::String;

use crate::error::MqttError;
use crate::packet::{Connect, EncodePacket, FrameBuffer, Incoming, PingReq, Publish, QoS};
use crate::time::Clock;
use crate::transport::{BrokerEndpoint, MqttTransport};

/// Maximum length of the derived client identifier.
pub const CLIENT_ID_CAPACITY: usize = 64;

/// Session tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct MqttOptions {
    /// Keep-alive announced in `CONNECT`; zero disables pings.
    pub keep_alive: Duration,
    /// How long a publish may wait for its `PUBACK` before it is written off.
    pub ack_timeout: Duration,
    /// Appended to the device id to form the client identifier.
    pub client_id_suffix: &'static str,
}

impl Default for MqttOptions {
    fn default() -> Self {
        Self {
            keep_alive: Duration::from_secs(60),
            ack_timeout: Duration::from_secs(30),
            client_id_suffix: "_client",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConnectionState {
    /// `connect` was never called.
    Uninitialized,
    /// `CONNECT` is written, `CONNACK` not yet seen.
    Connecting,
    Connected,
    /// Refused, lost, or abandoned. Only `connect` leaves this state.
    Disconnected,
}

/// Completions reported by [`MqttClient::poll`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum MqttEvent {
    /// The broker accepted the connection.
    Connected { session_present: bool },
    /// The broker refused the connection.
    Refused(crate::error::ConnectReasonCode),
    /// The pending publish was acknowledged.
    Delivered { packet_id: u16 },
    /// The pending publish was not acknowledged in time and was dropped.
    DeliveryTimedOut { packet_id: u16 },
    /// The broker answered a keep-alive ping.
    Pong,
    /// The broker went silent for longer than the keep-alive allows.
    Lost,
}

/// Why a publish request was not sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SkipReason {
    NoSession,
    NotConnected,
    InFlight,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PublishOutcome {
    /// Written to the transport; the acknowledgement is pending.
    Queued { packet_id: u16 },
    Skipped(SkipReason),
}

#[derive(Debug, Clone, Copy)]
struct InFlight {
    packet_id: u16,
    issued_at: Instant,
}

/// A publish-only MQTT v3.1.1 client.
///
/// `BUF_SIZE` sizes both the outbound packet buffer and the inbound
/// reassembly buffer.
pub struct MqttClient<T, C, const BUF_SIZE: usize> {
    transport: T,
    clock: C,
    options: MqttOptions,
    state: ConnectionState,
    in_flight: Option<InFlight>,
    next_packet_id: u16,
    last_tx: Instant,
    last_rx: Instant,
    rx: FrameBuffer<BUF_SIZE>,
    tx: [u8; BUF_SIZE],
}

impl<T, C, const BUF_SIZE: usize> MqttClient<T, C, BUF_SIZE>
where
    T: MqttTransport,
    C: Clock,
{
    pub fn new(transport: T, clock: C, options: MqttOptions) -> Self {
        let now = clock.now();
        Self {
            transport,
            clock,
            options,
            state: ConnectionState::Uninitialized,
            in_flight: None,
            next_packet_id: 1,
            last_tx: now,
            last_rx: now,
            rx: FrameBuffer::new(),
            tx: [0; BUF_SIZE],
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// `true` once the broker accepted the current session.
    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    /// Packet id of the publish awaiting acknowledgement, if any.
    pub fn pending_publish(&self) -> Option<u16> {
        self.in_flight.map(|p| p.packet_id)
    }

    /// Starts a new session, abandoning the current one.
    ///
    /// Opens the transport and writes `CONNECT` with client id
    /// `<device_id><suffix>`. Returns as soon as the request is written; the
    /// broker's answer is reported later by [`poll`](Self::poll).
    pub async fn connect(
        &mut self,
        endpoint: BrokerEndpoint,
        device_id: &str,
    ) -> Result<(), MqttError<T::Error>> {
        let mut client_id: String<CLIENT_ID_CAPACITY> = String::new();
        write!(client_id, "{}{}", device_id, self.options.client_id_suffix)
            .map_err(|_| MqttError::BufferTooSmall)?;
        let keep_alive = u16::try_from(self.options.keep_alive.as_secs()).unwrap_or(u16::MAX);

        if let Some(pending) = self.in_flight {
            debug!("mqtt: abandoning unacknowledged publish {}", pending.packet_id);
        }
        self.teardown();
        // any failure below leaves the client disconnected
        self.state = ConnectionState::Disconnected;

        self.transport
            .open(endpoint)
            .await
            .map_err(MqttError::Transport)?;
        self.send_packet(&Connect::new(&client_id, keep_alive, true))
            .await?;

        self.last_rx = self.clock.now();
        self.state = ConnectionState::Connecting;
        info!("mqtt: CONNECT sent as {}", client_id.as_str());
        Ok(())
    }

    /// Publishes `payload` on `topic` with QoS 1, no retain.
    ///
    /// Skips silently (no transport traffic) when there is no session, the
    /// session is not connected, or another publish is still unacknowledged.
    pub async fn publish(
        &mut self,
        topic: &str,
        payload: &[u8],
    ) -> Result<PublishOutcome, MqttError<T::Error>> {
        match self.state {
            ConnectionState::Connected => {}
            ConnectionState::Uninitialized => {
                return Ok(PublishOutcome::Skipped(SkipReason::NoSession));
            }
            ConnectionState::Connecting | ConnectionState::Disconnected => {
                return Ok(PublishOutcome::Skipped(SkipReason::NotConnected));
            }
        }
        if let Some(pending) = self.in_flight {
            debug!("mqtt: publish {} still in flight, skipping", pending.packet_id);
            return Ok(PublishOutcome::Skipped(SkipReason::InFlight));
        }

        let packet_id = self.take_packet_id();
        let publish = Publish {
            topic,
            payload,
            qos: QoS::AtLeastOnce,
            packet_id: Some(packet_id),
            retain: false,
        };
        self.send_packet(&publish).await?;

        self.in_flight = Some(InFlight {
            packet_id,
            issued_at: self.clock.now(),
        });
        Ok(PublishOutcome::Queued { packet_id })
    }

    /// Drives the session: timers first, then at most one inbound packet.
    ///
    /// Returns `Ok(None)` when nothing happened, so callers drain with
    /// `while let Ok(Some(event)) = client.poll().await`. Transport and
    /// protocol failures tear the session down before they are returned.
    pub async fn poll(&mut self) -> Result<Option<MqttEvent>, MqttError<T::Error>> {
        if matches!(
            self.state,
            ConnectionState::Uninitialized | ConnectionState::Disconnected
        ) {
            return Ok(None);
        }

        if let Some(event) = self.check_timers().await? {
            return Ok(Some(event));
        }
        if let Some(event) = self.buffered_event()? {
            return Ok(Some(event));
        }

        let received = match self.transport.recv(self.rx.spare_mut()).await {
            Ok(n) => n,
            Err(e) => {
                warn!("mqtt: connection lost");
                self.teardown();
                return Err(MqttError::Transport(e));
            }
        };
        if received == 0 {
            return Ok(None);
        }
        self.rx.commit(received);
        self.last_rx = self.clock.now();

        self.buffered_event()
    }

    async fn check_timers(&mut self) -> Result<Option<MqttEvent>, MqttError<T::Error>> {
        let now = self.clock.now();

        if let Some(pending) = self.in_flight
            && now.duration_since(pending.issued_at) >= self.options.ack_timeout
        {
            warn!("mqtt: publish {} not acknowledged, dropping it", pending.packet_id);
            self.in_flight = None;
            return Ok(Some(MqttEvent::DeliveryTimedOut {
                packet_id: pending.packet_id,
            }));
        }

        let keep_alive = self.options.keep_alive;
        if self.state != ConnectionState::Connected || keep_alive.as_ticks() == 0 {
            return Ok(None);
        }
        if now.duration_since(self.last_rx) >= keep_alive * 3 / 2 {
            warn!("mqtt: broker silent beyond keep-alive");
            self.teardown();
            return Ok(Some(MqttEvent::Lost));
        }
        if now.duration_since(self.last_tx) >= keep_alive {
            trace!("mqtt: PINGREQ");
            self.send_packet(&PingReq).await?;
        }
        Ok(None)
    }

    /// Handles buffered packets until one produces an event.
    fn buffered_event(&mut self) -> Result<Option<MqttEvent>, MqttError<T::Error>> {
        loop {
            match self.rx.next_packet() {
                Ok(Some(packet)) => {
                    if let Some(event) = self.handle(packet) {
                        return Ok(Some(event));
                    }
                }
                Ok(None) => return Ok(None),
                Err(e) => {
                    error!("mqtt: bad packet from broker: {:?}", e);
                    self.teardown();
                    return Err(MqttError::Protocol(e));
                }
            }
        }
    }

    fn handle(&mut self, packet: Incoming) -> Option<MqttEvent> {
        match packet {
            Incoming::ConnAck(ack) if self.state == ConnectionState::Connecting => {
                if ack.code == crate::error::ConnectReasonCode::Success {
                    info!("mqtt: connected to broker");
                    self.state = ConnectionState::Connected;
                    Some(MqttEvent::Connected {
                        session_present: ack.session_present,
                    })
                } else {
                    error!("mqtt: connection refused: {:?}", ack.code);
                    self.state = ConnectionState::Disconnected;
                    Some(MqttEvent::Refused(ack.code))
                }
            }
            Incoming::ConnAck(_) => {
                warn!("mqtt: unexpected CONNACK");
                None
            }
            Incoming::PubAck(ack) => match self.in_flight {
                Some(pending) if pending.packet_id == ack.packet_id => {
                    debug!("mqtt: publish {} acknowledged", ack.packet_id);
                    self.in_flight = None;
                    Some(MqttEvent::Delivered {
                        packet_id: ack.packet_id,
                    })
                }
                _ => {
                    warn!("mqtt: PUBACK for unknown packet {}", ack.packet_id);
                    None
                }
            },
            Incoming::PingResp => Some(MqttEvent::Pong),
            Incoming::Other { packet_type } => {
                debug!("mqtt: ignoring packet type {}", packet_type);
                None
            }
        }
    }

    async fn send_packet<P: EncodePacket>(
        &mut self,
        packet: &P,
    ) -> Result<(), MqttError<T::Error>> {
        let len = packet.encode(&mut self.tx)?;
        if let Err(e) = self.transport.send(&self.tx[..len]).await {
            warn!("mqtt: write failed, dropping session");
            self.teardown();
            return Err(MqttError::Transport(e));
        }
        self.last_tx = self.clock.now();
        Ok(())
    }

    /// Forgets the session. The pending publish, if any, counts as failed.
    fn teardown(&mut self) {
        if self.state != ConnectionState::Uninitialized {
            self.state = ConnectionState::Disconnected;
        }
        self.in_flight = None;
        self.rx.clear();
    }

    fn take_packet_id(&mut self) -> u16 {
        let id = self.next_packet_id;
        self.next_packet_id = self.next_packet_id.wrapping_add(1).max(1);
        id
    }
}
