//! # Error Types
//!
//! Error types for every layer of the node: the MQTT session and its wire
//! codec, the I2C sensor drivers, and the bring-up sequence.
//!
//! Sensor and MQTT failures are never fatal. Drivers return them to the
//! acquisition cycle, which substitutes sentinel readings; the MQTT client
//! returns them so the caller can log and carry on. Only a failed Wi-Fi
//! bring-up ends the node (`NodeError`).

use embedded_hal::i2c::ErrorKind;

/// The primary error enum for the MQTT client.
///
/// It is generic over the transport error type `T`, allowing it to wrap
/// specific errors from the underlying network transport.
#[derive(Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum MqttError<T> {
    /// An error occurred in the underlying transport layer.
    Transport(T),
    /// The broker sent bytes that do not form a valid MQTT packet.
    Protocol(ProtocolError),
    /// A packet, topic or client identifier does not fit the fixed buffers.
    BufferTooSmall,
}

impl<T> MqttError<T> {
    /// A short, backend-independent label for log lines.
    ///
    /// Transport errors are generic, so they cannot be formatted by every
    /// logging backend; this keeps log call sites uniform.
    pub fn kind(&self) -> &'static str {
        match self {
            MqttError::Transport(_) => "transport failure",
            MqttError::Protocol(ProtocolError::MalformedPacket) => "malformed packet",
            MqttError::Protocol(ProtocolError::PayloadTooLarge) => "payload too large",
            MqttError::BufferTooSmall => "buffer too small",
        }
    }
}

/// Errors raised by the packet codec. They carry no transport error, so the
/// codec can stay independent of the transport in use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ProtocolError {
    /// A packet was received that was not correctly formed.
    MalformedPacket,
    /// A string or payload exceeds what the MQTT length fields can express.
    PayloadTooLarge,
}

/// Codec results are widened into `MqttError` at the client boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CodecError {
    Protocol(ProtocolError),
    BufferTooSmall,
}

impl<T> From<CodecError> for MqttError<T> {
    fn from(err: CodecError) -> Self {
        match err {
            CodecError::Protocol(p) => MqttError::Protocol(p),
            CodecError::BufferTooSmall => MqttError::BufferTooSmall,
        }
    }
}

impl From<ProtocolError> for CodecError {
    fn from(err: ProtocolError) -> Self {
        CodecError::Protocol(err)
    }
}

/// Return codes carried by a v3.1.1 `CONNACK`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConnectReasonCode {
    /// The connection was accepted.
    Success,
    /// The broker does not support the requested MQTT protocol version.
    UnacceptableProtocolVersion,
    /// The client identifier is not valid.
    IdentifierRejected,
    /// The broker is unavailable.
    ServerUnavailable,
    /// The username or password is not valid.
    BadUserNameOrPassword,
    /// The client is not authorized to connect.
    NotAuthorized,
    /// A code outside the v3.1.1 table.
    Other(u8),
}

impl From<u8> for ConnectReasonCode {
    fn from(val: u8) -> Self {
        match val {
            0 => Self::Success,
            1 => Self::UnacceptableProtocolVersion,
            2 => Self::IdentifierRejected,
            3 => Self::ServerUnavailable,
            4 => Self::BadUserNameOrPassword,
            5 => Self::NotAuthorized,
            _ => Self::Other(val),
        }
    }
}

/// Failure of a single sensor transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SensorError {
    /// The bus reported an error (typically a NACK from the device).
    Bus(ErrorKind),
    /// Fewer bytes than the frame requires were available.
    ShortRead { expected: usize, actual: usize },
    /// The AHT10 status byte reported busy or uncalibrated.
    NotReady { status: u8 },
}

impl SensorError {
    pub(crate) fn bus<E: embedded_hal::i2c::Error>(err: E) -> Self {
        SensorError::Bus(err.kind())
    }
}

/// Fatal bring-up failures. Anything listed here stops the node.
#[derive(Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum NodeError<E> {
    /// The radio could not be initialised.
    RadioInit(E),
    /// Station-mode association failed or timed out.
    Association(E),
}

/// A compile-time configuration override that could not be parsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConfigError {
    /// `BROKER_HOST` is not a dotted IPv4 address.
    InvalidBrokerHost,
    /// `BROKER_PORT` is not a number in `1..=65535`.
    InvalidBrokerPort,
}
