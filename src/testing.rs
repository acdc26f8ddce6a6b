//! Test doubles shared by the unit tests.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;
use std::vec::Vec;

use embassy_time::{Duration, Instant};
use embedded_hal::i2c::{ErrorKind, ErrorType, NoAcknowledgeSource, Operation};

use crate::link::{WifiCredentials, WifiLink};
use crate::time::Clock;
use crate::transport::{BrokerEndpoint, MqttTransport};
use crate::util::read_variable_byte_integer;

/// Clock whose time only moves when something sleeps on it.
pub struct FakeClock {
    now_ms: Cell<u64>,
    sleeps: RefCell<Vec<Duration>>,
}

impl FakeClock {
    pub fn new() -> Self {
        Self {
            now_ms: Cell::new(0),
            sleeps: RefCell::new(Vec::new()),
        }
    }

    pub fn advance(&self, duration: Duration) {
        self.now_ms.set(self.now_ms.get() + duration.as_millis());
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.now_ms.get()
    }

    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps.borrow().clone()
    }
}

impl Clock for FakeClock {
    fn now(&self) -> Instant {
        Instant::from_millis(self.now_ms.get())
    }

    async fn sleep(&self, duration: Duration) {
        self.sleeps.borrow_mut().push(duration);
        self.advance(duration);
    }
}

/// Everything a sensor driver did, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BusEvent {
    Write(u8, Vec<u8>),
    Read(u8, usize),
    DelayMs(u32),
}

pub type BusLog = Rc<RefCell<Vec<BusEvent>>>;

/// Scripted I2C bus. Reads are served from `responses` in order; an empty
/// script or a `None` entry NACKs the read.
pub struct MockI2c {
    log: BusLog,
    responses: VecDeque<Option<Vec<u8>>>,
    nack_writes: bool,
}

impl MockI2c {
    pub fn new(log: BusLog) -> Self {
        Self {
            log,
            responses: VecDeque::new(),
            nack_writes: false,
        }
    }

    pub fn respond(mut self, bytes: &[u8]) -> Self {
        self.responses.push_back(Some(bytes.to_vec()));
        self
    }

    pub fn nack_read(mut self) -> Self {
        self.responses.push_back(None);
        self
    }

    pub fn nack_writes(mut self) -> Self {
        self.nack_writes = true;
        self
    }
}

impl ErrorType for MockI2c {
    type Error = ErrorKind;
}

impl embedded_hal_async::i2c::I2c for MockI2c {
    async fn transaction(
        &mut self,
        address: u8,
        operations: &mut [Operation<'_>],
    ) -> Result<(), Self::Error> {
        for op in operations {
            match op {
                Operation::Write(bytes) => {
                    if self.nack_writes {
                        return Err(ErrorKind::NoAcknowledge(NoAcknowledgeSource::Address));
                    }
                    self.log
                        .borrow_mut()
                        .push(BusEvent::Write(address, bytes.to_vec()));
                }
                Operation::Read(buf) => {
                    self.log.borrow_mut().push(BusEvent::Read(address, buf.len()));
                    match self.responses.pop_front().flatten() {
                        Some(bytes) if bytes.len() >= buf.len() => {
                            buf.copy_from_slice(&bytes[..buf.len()]);
                        }
                        // a device that stops clocking out data NACKs the read
                        _ => return Err(ErrorKind::NoAcknowledge(NoAcknowledgeSource::Data)),
                    }
                }
            }
        }
        Ok(())
    }
}

/// Delay that records into the bus log instead of waiting.
pub struct MockDelay {
    log: BusLog,
}

impl MockDelay {
    pub fn new(log: BusLog) -> Self {
        Self { log }
    }
}

impl embedded_hal_async::delay::DelayNs for MockDelay {
    async fn delay_ns(&mut self, ns: u32) {
        self.log.borrow_mut().push(BusEvent::DelayMs(ns / 1_000_000));
    }

    async fn delay_us(&mut self, us: u32) {
        self.log.borrow_mut().push(BusEvent::DelayMs(us / 1_000));
    }

    async fn delay_ms(&mut self, ms: u32) {
        self.log.borrow_mut().push(BusEvent::DelayMs(ms));
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireError {
    Refused,
    Reset,
}

/// Shared state of a [`MockTransport`], kept by the test after the
/// transport has been moved into a client.
#[derive(Default)]
pub struct Wire {
    pub opened: Vec<BrokerEndpoint>,
    pub sent: Vec<Vec<u8>>,
    pub inbox: VecDeque<Vec<u8>>,
    pub refuse_open: bool,
    pub fail_send: bool,
    pub reset_on_recv: bool,
    /// `CONNACK` code the broker answers every new connection with.
    pub auto_connack: Option<u8>,
}

impl Wire {
    /// Packets of the given MQTT type written so far.
    pub fn sent_of_type(&self, packet_type: u8) -> Vec<Vec<u8>> {
        self.sent
            .iter()
            .filter(|p| p[0] >> 4 == packet_type)
            .cloned()
            .collect()
    }

    pub fn publishes(&self) -> usize {
        self.sent_of_type(3).len()
    }

    /// `(topic, payload)` of every QoS 1 `PUBLISH` written so far.
    pub fn published(&self) -> Vec<(std::string::String, Vec<u8>)> {
        self.sent_of_type(3)
            .iter()
            .map(|p| {
                let (_, len_bytes) = read_variable_byte_integer(&p[1..]).unwrap().unwrap();
                let body = &p[1 + len_bytes..];
                let topic_len = u16::from_be_bytes([body[0], body[1]]) as usize;
                let topic = std::str::from_utf8(&body[2..2 + topic_len]).unwrap();
                (topic.into(), body[4 + topic_len..].to_vec())
            })
            .collect()
    }

    /// Queues a broker `CONNACK` with the given return code.
    pub fn connack(&mut self, code: u8) {
        self.inbox.push_back(std::vec![0x20, 0x02, 0x00, code]);
    }

    /// Queues a `PUBACK` for the most recent `PUBLISH`.
    pub fn puback_last(&mut self) {
        let publish = self.sent_of_type(3).pop().expect("no publish to acknowledge");
        let topic_len = u16::from_be_bytes([publish[2], publish[3]]) as usize;
        let id = &publish[4 + topic_len..6 + topic_len];
        self.inbox.push_back(std::vec![0x40, 0x02, id[0], id[1]]);
    }
}

pub struct MockTransport {
    wire: Rc<RefCell<Wire>>,
}

impl MockTransport {
    pub fn new() -> (Self, Rc<RefCell<Wire>>) {
        let wire = Rc::new(RefCell::new(Wire::default()));
        (Self { wire: wire.clone() }, wire)
    }
}

impl MqttTransport for MockTransport {
    type Error = WireError;

    async fn open(&mut self, endpoint: BrokerEndpoint) -> Result<(), Self::Error> {
        let mut wire = self.wire.borrow_mut();
        wire.opened.push(endpoint);
        wire.inbox.clear();
        if wire.refuse_open {
            return Err(WireError::Refused);
        }
        if let Some(code) = wire.auto_connack {
            wire.connack(code);
        }
        Ok(())
    }

    async fn send(&mut self, buf: &[u8]) -> Result<(), Self::Error> {
        let mut wire = self.wire.borrow_mut();
        if wire.fail_send {
            return Err(WireError::Reset);
        }
        wire.sent.push(buf.to_vec());
        Ok(())
    }

    async fn recv(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        let mut wire = self.wire.borrow_mut();
        if wire.reset_on_recv {
            return Err(WireError::Reset);
        }
        match wire.inbox.pop_front() {
            Some(bytes) => {
                buf[..bytes.len()].copy_from_slice(&bytes);
                Ok(bytes.len())
            }
            None => Ok(0),
        }
    }
}

/// Wi-Fi link that succeeds or fails on demand.
#[derive(Default)]
pub struct MockLink {
    pub fail_init: bool,
    pub fail_join: bool,
    pub joined: Vec<(std::string::String, Duration)>,
}

impl WifiLink for MockLink {
    type Error = &'static str;

    async fn init(&mut self) -> Result<(), Self::Error> {
        if self.fail_init {
            return Err("radio init failed");
        }
        Ok(())
    }

    async fn join(
        &mut self,
        credentials: &WifiCredentials,
        timeout: Duration,
    ) -> Result<(), Self::Error> {
        self.joined.push((credentials.ssid.into(), timeout));
        if self.fail_join {
            return Err("association timed out");
        }
        Ok(())
    }
}
