//! Bitcoin's variable-length integer, used to prefix strings and sequences
//! on the wire. Distinct from the protobuf varint.

use crate::serialization::{ReadBitcoinExt, WriteBitcoinExt};
use crate::{BitcoinDeserialize, BitcoinSerialize, SerializationError};

/// A typed wrapper for a wire-format length or count.
///
/// The encoding itself lives on [`WriteBitcoinExt::write_compact_size`] and
/// [`ReadBitcoinExt::read_compact_size`]; this type exists for structures
/// that carry a compact size as a field of their own.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompactInt(u64);

impl CompactInt {
    pub fn new() -> CompactInt {
        CompactInt(0)
    }

    pub fn from(value: usize) -> CompactInt {
        CompactInt(value as u64)
    }

    pub fn value(&self) -> u64 {
        self.0
    }

    /// The number of bytes the encoding of `value` occupies.
    pub fn size(value: usize) -> usize {
        if value < 0xfd {
            1
        } else if value <= 0xffff {
            3
        } else if value <= 0xffff_ffff {
            5
        } else {
            9
        }
    }
}

impl Default for CompactInt {
    fn default() -> Self {
        CompactInt::new()
    }
}

impl BitcoinSerialize for CompactInt {
    fn bitcoin_serialize<W>(&self, mut target: W) -> Result<(), std::io::Error>
    where
        W: std::io::Write,
    {
        target.write_compact_size(self.0)
    }
}

impl BitcoinDeserialize for CompactInt {
    fn bitcoin_deserialize<R: std::io::Read>(
        mut target: R,
    ) -> Result<CompactInt, SerializationError> {
        Ok(CompactInt(target.read_compact_size()?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn encode(value: u64) -> Vec<u8> {
        CompactInt(value)
            .bitcoin_serialize_to_vec()
            .expect("writing to a Vec never fails")
    }

    #[test]
    fn boundary_encodings() {
        assert_eq!(encode(0xfc), [0xfc]);
        assert_eq!(encode(0xfd), [0xfd, 0xfd, 0x00]);
        assert_eq!(encode(0xffff), [0xfd, 0xff, 0xff]);
        assert_eq!(encode(0x10000), [0xfe, 0x00, 0x00, 0x01, 0x00]);
        assert_eq!(
            encode(0x1_0000_0000),
            [0xff, 0x00, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00]
        );
    }

    #[test]
    fn encoded_size_matches() {
        for &value in &[0usize, 0xfc, 0xfd, 0xffff, 0x10000, 0xffff_ffff] {
            assert_eq!(encode(value as u64).len(), CompactInt::size(value));
        }
    }

    proptest! {
        #[test]
        fn round_trip(value in any::<u64>()) {
            let encoded = encode(value);
            let decoded = CompactInt::bitcoin_deserialize(&encoded[..]).unwrap();
            prop_assert_eq!(decoded.value(), value);
        }
    }
}
