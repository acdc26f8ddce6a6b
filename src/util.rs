//! # MQTT Serialization Utilities
//!
//! Helpers for the two MQTT primitive encodings the node needs: the
//! variable-byte "remaining length" integer and the length-prefixed UTF-8
//! string.

use crate::error::{CodecError, ProtocolError};

/// Largest value a four-byte variable-byte integer can hold.
pub const MAX_REMAINING_LENGTH: usize = 268_435_455;

/// Reads a variable-byte integer starting at `buf[0]`.
///
/// Returns `Ok(None)` when `buf` ends before the integer does, which is the
/// normal case while a packet is still arriving. On success returns the
/// value and the number of bytes it occupied.
pub fn read_variable_byte_integer(buf: &[u8]) -> Result<Option<(usize, usize)>, ProtocolError> {
    let mut multiplier = 1;
    let mut value = 0;
    for (i, encoded_byte) in buf.iter().enumerate() {
        if i >= 4 {
            return Err(ProtocolError::MalformedPacket);
        }
        value += (encoded_byte & 127) as usize * multiplier;
        if (encoded_byte & 128) == 0 {
            return Ok(Some((value, i + 1)));
        }
        multiplier *= 128;
    }
    if buf.len() >= 4 {
        return Err(ProtocolError::MalformedPacket);
    }
    Ok(None)
}

/// Number of bytes `val` occupies as a variable-byte integer.
pub fn variable_byte_integer_len(val: usize) -> usize {
    match val {
        0..=127 => 1,
        128..=16_383 => 2,
        16_384..=2_097_151 => 3,
        _ => 4,
    }
}

/// Writes a variable-byte integer to the buffer, advancing the cursor.
pub fn write_variable_byte_integer(
    cursor: &mut usize,
    buf: &mut [u8],
    mut val: usize,
) -> Result<(), CodecError> {
    if val > MAX_REMAINING_LENGTH {
        return Err(ProtocolError::PayloadTooLarge.into());
    }
    loop {
        let mut encoded_byte = (val % 128) as u8;
        val /= 128;
        if val > 0 {
            encoded_byte |= 128;
        }
        *buf.get_mut(*cursor).ok_or(CodecError::BufferTooSmall)? = encoded_byte;
        *cursor += 1;
        if val == 0 {
            break;
        }
    }
    Ok(())
}

/// Writes a UTF-8 string prefixed with its 2-byte big-endian length,
/// advancing the cursor.
pub fn write_utf8_string(cursor: &mut usize, buf: &mut [u8], s: &str) -> Result<(), CodecError> {
    let len = s.len();
    if len > u16::MAX as usize {
        return Err(ProtocolError::PayloadTooLarge.into());
    }
    let slice = buf
        .get_mut(*cursor..*cursor + 2 + len)
        .ok_or(CodecError::BufferTooSmall)?;
    slice[0..2].copy_from_slice(&(len as u16).to_be_bytes());
    slice[2..].copy_from_slice(s.as_bytes());
    *cursor += 2 + len;
    Ok(())
}

/// Copies raw bytes into the buffer, advancing the cursor.
pub fn write_bytes(cursor: &mut usize, buf: &mut [u8], bytes: &[u8]) -> Result<(), CodecError> {
    buf.get_mut(*cursor..*cursor + bytes.len())
        .ok_or(CodecError::BufferTooSmall)?
        .copy_from_slice(bytes);
    *cursor += bytes.len();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remaining_length_boundaries() {
        let mut buf = [0u8; 4];
        for (val, expected) in [
            (0usize, &[0x00u8][..]),
            (127, &[0x7F]),
            (128, &[0x80, 0x01]),
            (16_383, &[0xFF, 0x7F]),
            (16_384, &[0x80, 0x80, 0x01]),
        ] {
            let mut cursor = 0;
            write_variable_byte_integer(&mut cursor, &mut buf, val).unwrap();
            assert_eq!(&buf[..cursor], expected);
            assert_eq!(cursor, variable_byte_integer_len(val));
            assert_eq!(read_variable_byte_integer(expected), Ok(Some((val, cursor))));
        }
    }

    #[test]
    fn incomplete_and_overlong_lengths() {
        assert_eq!(read_variable_byte_integer(&[]), Ok(None));
        assert_eq!(read_variable_byte_integer(&[0x80, 0x80]), Ok(None));
        assert_eq!(
            read_variable_byte_integer(&[0x80, 0x80, 0x80, 0x80, 0x01]),
            Err(ProtocolError::MalformedPacket)
        );
    }

    #[test]
    fn string_needs_room_for_prefix() {
        let mut buf = [0u8; 5];
        let mut cursor = 0;
        assert_eq!(
            write_utf8_string(&mut cursor, &mut buf, "MQTT"),
            Err(CodecError::BufferTooSmall)
        );
        assert_eq!(cursor, 0);

        let mut buf = [0u8; 6];
        write_utf8_string(&mut cursor, &mut buf, "MQTT").unwrap();
        assert_eq!(buf, [0x00, 0x04, b'M', b'Q', b'T', b'T']);
    }
}
