//! The subset of the protobuf wire format used by BIP70/BIP75.
//!
//! Field tags and types are fixed by the BIPs, so the full protobuf
//! machinery would be dead weight; this module is a minimal reader/writer
//! for the tag/wire-type encoding over [`Buf`]/[`BufMut`]. Parsers built on
//! it accept fields in any order and skip unknown fields; writers emit
//! fields in tag-ascending order only, so serialization is deterministic.

use bytes::{Buf, BufMut, Bytes};
use thiserror::Error;

/// Error associated with wire-level decoding.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// Buffer supplied was too short.
    #[error("message truncated")]
    TooShort,
    /// A varint ran past ten bytes.
    #[error("varint overflow")]
    VarIntOverflow,
    /// A key carried a wire type we don't speak.
    #[error("unsupported wire type {0}")]
    WireType(u8),
    /// A known field arrived with the wrong wire type.
    #[error("field {0} has the wrong wire type")]
    UnexpectedWireType(u32),
    /// A length prefix pointed past the end of the buffer.
    #[error("length prefix out of range")]
    LengthOutOfRange,
    /// A string field held invalid UTF-8.
    #[error("string field is not utf-8")]
    InvalidUtf8,
}

/// The protobuf wire types used by the payment protocol.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum WireType {
    Varint = 0,
    Fixed64 = 1,
    LengthDelimited = 2,
    Fixed32 = 5,
}

/// A field key: tag plus wire type.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Key {
    pub tag: u32,
    pub wire_type: WireType,
}

/// Read a base-128 varint.
pub fn read_varint<B: Buf>(buf: &mut B) -> Result<u64, DecodeError> {
    let mut value = 0u64;
    // Ten bytes carry up to 70 payload bits; anything longer is malformed.
    for shift in (0..64).step_by(7) {
        if !buf.has_remaining() {
            return Err(DecodeError::TooShort);
        }
        let byte = buf.get_u8();
        value |= u64::from(byte & 0x7f) << shift;
        if byte & 0x80 == 0 {
            return Ok(value);
        }
    }
    Err(DecodeError::VarIntOverflow)
}

/// Write a base-128 varint.
pub fn write_varint<B: BufMut>(mut value: u64, buf: &mut B) {
    loop {
        let byte = (value & 0x7f) as u8;
        value >>= 7;
        if value == 0 {
            buf.put_u8(byte);
            return;
        }
        buf.put_u8(byte | 0x80);
    }
}

/// The encoded size of a varint.
pub fn varint_len(value: u64) -> usize {
    let bits = 64 - u64::leading_zeros(value | 1) as usize;
    (bits + 6) / 7
}

/// Read a field key.
pub fn read_key<B: Buf>(buf: &mut B) -> Result<Key, DecodeError> {
    let raw = read_varint(buf)?;
    let wire_type = match (raw & 0x07) as u8 {
        0 => WireType::Varint,
        1 => WireType::Fixed64,
        2 => WireType::LengthDelimited,
        5 => WireType::Fixed32,
        other => return Err(DecodeError::WireType(other)),
    };
    Ok(Key {
        tag: (raw >> 3) as u32,
        wire_type,
    })
}

/// Write a field key.
pub fn write_key<B: BufMut>(tag: u32, wire_type: WireType, buf: &mut B) {
    write_varint(u64::from(tag) << 3 | wire_type as u64, buf);
}

/// Read a length-delimited value.
pub fn read_length_delimited<B: Buf>(buf: &mut B) -> Result<Bytes, DecodeError> {
    let len = read_varint(buf)?;
    if len > buf.remaining() as u64 {
        return Err(DecodeError::LengthOutOfRange);
    }
    Ok(buf.copy_to_bytes(len as usize))
}

/// Read a length-delimited UTF-8 string.
pub fn read_string<B: Buf>(buf: &mut B) -> Result<String, DecodeError> {
    let bytes = read_length_delimited(buf)?;
    String::from_utf8(bytes.to_vec()).map_err(|_| DecodeError::InvalidUtf8)
}

/// Read the varint value of a field already known to be [`WireType::Varint`].
pub fn expect_varint<B: Buf>(key: &Key, buf: &mut B) -> Result<u64, DecodeError> {
    if key.wire_type != WireType::Varint {
        return Err(DecodeError::UnexpectedWireType(key.tag));
    }
    read_varint(buf)
}

/// Read the bytes of a field already known to be
/// [`WireType::LengthDelimited`].
pub fn expect_bytes<B: Buf>(key: &Key, buf: &mut B) -> Result<Bytes, DecodeError> {
    if key.wire_type != WireType::LengthDelimited {
        return Err(DecodeError::UnexpectedWireType(key.tag));
    }
    read_length_delimited(buf)
}

/// Read the string of a field already known to be
/// [`WireType::LengthDelimited`].
pub fn expect_string<B: Buf>(key: &Key, buf: &mut B) -> Result<String, DecodeError> {
    if key.wire_type != WireType::LengthDelimited {
        return Err(DecodeError::UnexpectedWireType(key.tag));
    }
    read_string(buf)
}

/// Skip the value of an unknown field.
pub fn skip_value<B: Buf>(key: &Key, buf: &mut B) -> Result<(), DecodeError> {
    match key.wire_type {
        WireType::Varint => {
            read_varint(buf)?;
        }
        WireType::Fixed64 => {
            if buf.remaining() < 8 {
                return Err(DecodeError::TooShort);
            }
            buf.advance(8);
        }
        WireType::LengthDelimited => {
            read_length_delimited(buf)?;
        }
        WireType::Fixed32 => {
            if buf.remaining() < 4 {
                return Err(DecodeError::TooShort);
            }
            buf.advance(4);
        }
    }
    Ok(())
}

/// Write a varint field.
pub fn write_uint_field<B: BufMut>(tag: u32, value: u64, buf: &mut B) {
    write_key(tag, WireType::Varint, buf);
    write_varint(value, buf);
}

/// Write a length-delimited bytes field.
pub fn write_bytes_field<B: BufMut>(tag: u32, bytes: &[u8], buf: &mut B) {
    write_key(tag, WireType::LengthDelimited, buf);
    write_varint(bytes.len() as u64, buf);
    buf.put_slice(bytes);
}

/// Write a length-delimited string field.
pub fn write_string_field<B: BufMut>(tag: u32, value: &str, buf: &mut B) {
    write_bytes_field(tag, value.as_bytes(), buf);
}

/// Write a fixed 64-bit field.
pub fn write_fixed64_field<B: BufMut>(tag: u32, value: u64, buf: &mut B) {
    write_key(tag, WireType::Fixed64, buf);
    buf.put_u64_le(value);
}

/// Write a fixed 32-bit field.
pub fn write_fixed32_field<B: BufMut>(tag: u32, value: u32, buf: &mut B) {
    write_key(tag, WireType::Fixed32, buf);
    buf.put_u32_le(value);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode_varint(value: u64) -> Vec<u8> {
        let mut buf = Vec::with_capacity(varint_len(value));
        write_varint(value, &mut buf);
        buf
    }

    #[test]
    fn varint_boundaries() {
        assert_eq!(encode_varint(0), [0x00]);
        assert_eq!(encode_varint(0x7f), [0x7f]);
        assert_eq!(encode_varint(0x80), [0x80, 0x01]);
        assert_eq!(encode_varint(300), [0xac, 0x02]);
        assert_eq!(
            encode_varint(u64::max_value()),
            [0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0x01]
        );
    }

    #[test]
    fn varint_round_trip() {
        for &value in &[0u64, 1, 127, 128, 300, 1 << 21, 1 << 42, u64::max_value()] {
            let encoded = encode_varint(value);
            assert_eq!(encoded.len(), varint_len(value));
            let mut slice = &encoded[..];
            assert_eq!(read_varint(&mut slice).unwrap(), value);
            assert!(!slice.has_remaining());
        }
    }

    #[test]
    fn truncated_varint_is_rejected() {
        let mut slice = &[0x80u8, 0x80][..];
        assert_eq!(read_varint(&mut slice), Err(DecodeError::TooShort));
    }

    #[test]
    fn oversized_varint_is_rejected() {
        let bytes = [0xffu8; 11];
        let mut slice = &bytes[..];
        assert_eq!(read_varint(&mut slice), Err(DecodeError::VarIntOverflow));
    }

    #[test]
    fn keys_round_trip() {
        let mut buf = Vec::new();
        write_key(7, WireType::LengthDelimited, &mut buf);
        write_key(2000, WireType::Varint, &mut buf);
        let mut slice = &buf[..];
        assert_eq!(
            read_key(&mut slice).unwrap(),
            Key {
                tag: 7,
                wire_type: WireType::LengthDelimited
            }
        );
        assert_eq!(
            read_key(&mut slice).unwrap(),
            Key {
                tag: 2000,
                wire_type: WireType::Varint
            }
        );
    }

    #[test]
    fn length_prefix_past_end_is_rejected() {
        let mut buf = Vec::new();
        write_key(1, WireType::LengthDelimited, &mut buf);
        write_varint(10, &mut buf);
        buf.extend_from_slice(b"short");
        let mut slice = &buf[..];
        read_key(&mut slice).unwrap();
        assert_eq!(
            read_length_delimited(&mut slice),
            Err(DecodeError::LengthOutOfRange)
        );
    }

    proptest::proptest! {
        #[test]
        fn varint_round_trips_for_all_values(value in proptest::prelude::any::<u64>()) {
            let encoded = encode_varint(value);
            let mut slice = &encoded[..];
            proptest::prop_assert_eq!(read_varint(&mut slice).unwrap(), value);
            proptest::prop_assert!(!slice.has_remaining());
        }
    }

    #[test]
    fn skip_handles_every_wire_type() {
        let mut buf = Vec::new();
        write_uint_field(1, 300, &mut buf);
        write_fixed64_field(2, 0xdead_beef, &mut buf);
        write_bytes_field(3, b"opaque", &mut buf);
        write_fixed32_field(4, 7, &mut buf);
        write_uint_field(5, 1, &mut buf);

        let mut slice = &buf[..];
        for _ in 0..4 {
            let key = read_key(&mut slice).unwrap();
            skip_value(&key, &mut slice).unwrap();
        }
        let key = read_key(&mut slice).unwrap();
        assert_eq!(key.tag, 5);
        assert_eq!(expect_varint(&key, &mut slice).unwrap(), 1);
        assert!(!slice.has_remaining());
    }
}
