//! # MQTT Packet Structures and Serialization
//!
//! The node speaks a publish-only subset of MQTT v3.1.1. It encodes
//! `CONNECT`, `PUBLISH` and `PINGREQ`, and decodes the three packets a broker
//! sends back to such a client: `CONNACK`, `PUBACK` and `PINGRESP`. Anything
//! else that arrives is framed and skipped.

use crate::error::{CodecError, ConnectReasonCode, ProtocolError};
use crate::util::{
    read_variable_byte_integer, variable_byte_integer_len, write_bytes, write_utf8_string,
    write_variable_byte_integer,
};

/// Protocol level byte for MQTT 3.1.1.
pub const PROTOCOL_LEVEL: u8 = 4;

const CONNECT: u8 = 1;
const CONNACK: u8 = 2;
const PUBLISH: u8 = 3;
const PUBACK: u8 = 4;
const PINGREQ: u8 = 12;
const PINGRESP: u8 = 13;

/// Quality of Service levels the node can publish with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum QoS {
    AtMostOnce = 0,
    AtLeastOnce = 1,
}

/// A trait for packets that can be encoded into a byte buffer.
pub trait EncodePacket {
    /// Encodes the packet into `buf` and returns the number of bytes written.
    fn encode(&self, buf: &mut [u8]) -> Result<usize, CodecError>;
}

/// Writes the fixed header and returns the cursor positioned at the start of
/// the variable header.
fn write_fixed_header(
    buf: &mut [u8],
    first: u8,
    remaining_len: usize,
) -> Result<usize, CodecError> {
    if buf.len() < 1 + variable_byte_integer_len(remaining_len) + remaining_len {
        return Err(CodecError::BufferTooSmall);
    }
    buf[0] = first;
    let mut cursor = 1;
    write_variable_byte_integer(&mut cursor, buf, remaining_len)?;
    Ok(cursor)
}

// --- CONNECT Packet ---
#[derive(Debug)]
pub struct Connect<'a> {
    pub client_id: &'a str,
    /// Keep-alive interval in seconds; 0 disables it.
    pub keep_alive: u16,
    pub clean_session: bool,
}

impl<'a> Connect<'a> {
    pub fn new(client_id: &'a str, keep_alive: u16, clean_session: bool) -> Self {
        Self {
            client_id,
            keep_alive,
            clean_session,
        }
    }
}

impl EncodePacket for Connect<'_> {
    fn encode(&self, buf: &mut [u8]) -> Result<usize, CodecError> {
        // protocol name + level + flags + keep-alive + client id
        let remaining_len = (2 + 4) + 1 + 1 + 2 + (2 + self.client_id.len());
        let mut cursor = write_fixed_header(buf, CONNECT << 4, remaining_len)?;

        write_utf8_string(&mut cursor, buf, "MQTT")?;
        let flags = if self.clean_session { 0x02 } else { 0x00 };
        write_bytes(&mut cursor, buf, &[PROTOCOL_LEVEL, flags])?;
        write_bytes(&mut cursor, buf, &self.keep_alive.to_be_bytes())?;
        write_utf8_string(&mut cursor, buf, self.client_id)?;
        Ok(cursor)
    }
}

// --- PUBLISH Packet ---
#[derive(Debug)]
pub struct Publish<'a> {
    pub topic: &'a str,
    pub payload: &'a [u8],
    pub qos: QoS,
    /// Required when `qos` is above `AtMostOnce`.
    pub packet_id: Option<u16>,
    pub retain: bool,
}

impl EncodePacket for Publish<'_> {
    fn encode(&self, buf: &mut [u8]) -> Result<usize, CodecError> {
        let packet_id = match (self.qos, self.packet_id) {
            (QoS::AtMostOnce, _) => None,
            (_, Some(id)) if id != 0 => Some(id),
            _ => return Err(ProtocolError::MalformedPacket.into()),
        };

        let remaining_len = 2
            + self.topic.len()
            + packet_id.map_or(0, |_| 2)
            + self.payload.len();
        let first = (PUBLISH << 4) | ((self.qos as u8) << 1) | u8::from(self.retain);
        let mut cursor = write_fixed_header(buf, first, remaining_len)?;

        write_utf8_string(&mut cursor, buf, self.topic)?;
        if let Some(id) = packet_id {
            write_bytes(&mut cursor, buf, &id.to_be_bytes())?;
        }
        write_bytes(&mut cursor, buf, self.payload)?;
        Ok(cursor)
    }
}

// --- PINGREQ Packet ---
#[derive(Debug)]
pub struct PingReq;

impl EncodePacket for PingReq {
    fn encode(&self, buf: &mut [u8]) -> Result<usize, CodecError> {
        write_fixed_header(buf, PINGREQ << 4, 0)
    }
}

// --- Inbound packets ---

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ConnAck {
    pub session_present: bool,
    pub code: ConnectReasonCode,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PubAck {
    pub packet_id: u16,
}

/// A packet received from the broker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Incoming {
    ConnAck(ConnAck),
    PubAck(PubAck),
    PingResp,
    /// A well-framed packet a publish-only client has no use for.
    Other { packet_type: u8 },
}

impl Incoming {
    /// Decodes one complete frame, as delimited by [`frame_len`].
    pub fn decode(frame: &[u8]) -> Result<Self, ProtocolError> {
        let first = *frame.first().ok_or(ProtocolError::MalformedPacket)?;
        let (remaining_len, len_bytes) =
            read_variable_byte_integer(&frame[1..])?.ok_or(ProtocolError::MalformedPacket)?;
        let body = frame
            .get(1 + len_bytes..1 + len_bytes + remaining_len)
            .ok_or(ProtocolError::MalformedPacket)?;

        let packet = match first >> 4 {
            CONNACK => match body {
                [flags, code] => Incoming::ConnAck(ConnAck {
                    session_present: flags & 0x01 != 0,
                    code: ConnectReasonCode::from(*code),
                }),
                _ => return Err(ProtocolError::MalformedPacket),
            },
            PUBACK => match body {
                [hi, lo] => Incoming::PubAck(PubAck {
                    packet_id: u16::from_be_bytes([*hi, *lo]),
                }),
                _ => return Err(ProtocolError::MalformedPacket),
            },
            PINGRESP if body.is_empty() => Incoming::PingResp,
            PINGRESP => return Err(ProtocolError::MalformedPacket),
            packet_type => Incoming::Other { packet_type },
        };
        Ok(packet)
    }
}

/// Length of the complete packet at the start of `buf`, or `None` while
/// more bytes are needed.
pub fn frame_len(buf: &[u8]) -> Result<Option<usize>, ProtocolError> {
    if buf.is_empty() {
        return Ok(None);
    }
    let Some((remaining_len, len_bytes)) = read_variable_byte_integer(&buf[1..])? else {
        return Ok(None);
    };
    let total = 1 + len_bytes + remaining_len;
    Ok((buf.len() >= total).then_some(total))
}

/// Accumulates stream bytes and splits them into packets.
///
/// Transports deliver arbitrary chunks: half a packet, or several packets at
/// once. Bytes are appended into [`FrameBuffer::spare_mut`] and committed,
/// then complete packets are taken off the front with
/// [`FrameBuffer::next_packet`].
pub struct FrameBuffer<const N: usize> {
    buf: [u8; N],
    filled: usize,
}

impl<const N: usize> FrameBuffer<N> {
    pub const fn new() -> Self {
        Self {
            buf: [0; N],
            filled: 0,
        }
    }

    /// Free space that the next read should fill.
    pub fn spare_mut(&mut self) -> &mut [u8] {
        &mut self.buf[self.filled..]
    }

    /// Marks `n` bytes of the spare space as received.
    pub fn commit(&mut self, n: usize) {
        self.filled = (self.filled + n).min(N);
    }

    pub fn is_empty(&self) -> bool {
        self.filled == 0
    }

    pub fn clear(&mut self) {
        self.filled = 0;
    }

    /// Decodes and removes the first complete packet, if any.
    ///
    /// A packet that could never fit the buffer is reported as
    /// `PayloadTooLarge`; the caller is expected to drop the connection.
    pub fn next_packet(&mut self) -> Result<Option<Incoming>, ProtocolError> {
        let Some(len) = frame_len(&self.buf[..self.filled])? else {
            if self.filled == N {
                return Err(ProtocolError::PayloadTooLarge);
            }
            return Ok(None);
        };
        let packet = Incoming::decode(&self.buf[..len]);
        self.buf.copy_within(len..self.filled, 0);
        self.filled -= len;
        packet.map(Some)
    }
}

impl<const N: usize> Default for FrameBuffer<N> {
    fn default() -> Self {
        Self::new()
    }
}
