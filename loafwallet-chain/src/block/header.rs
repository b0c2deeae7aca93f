use std::io;

use chrono::{DateTime, Utc};

use crate::{BitcoinDeserialize, BitcoinSerialize, CompactInt, SerializationError};

use super::{merkle, Hash};

/// A block header, containing metadata about a block.
///
/// Blocks are chained together via the backwards reference (previous header
/// hash) present in the block header. Each block points backwards to its
/// parent, all the way back to the genesis block.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Header {
    /// The block's version field.
    pub version: u32,

    /// The hash of the previous block, used to create a chain of blocks back
    /// to the genesis block.
    pub previous_block_hash: Hash,

    /// The root of the transaction Merkle tree, binding the block header to
    /// the transactions in the block.
    pub merkle_root: merkle::Root,

    /// The block timestamp is a Unix epoch time (UTC) when the miner started
    /// hashing the header (according to the miner).
    pub time: DateTime<Utc>,

    /// An encoded version of the target threshold this block's header hash
    /// must be less than or equal to, in the nBits format used by Bitcoin.
    pub bits: u32,

    /// An arbitrary field that miners change to modify the header hash in
    /// order to produce a hash under the target threshold.
    pub nonce: u32,
}

impl Header {
    /// Length of a serialized header in bytes.
    pub const fn len() -> usize {
        80
    }

    /// The SHA-256d hash of this header, which identifies the block.
    pub fn hash(&self) -> Hash {
        Hash::from(self)
    }
}

impl BitcoinSerialize for Header {
    fn bitcoin_serialize<W: io::Write>(&self, mut writer: W) -> Result<(), io::Error> {
        self.version.bitcoin_serialize(&mut writer)?;
        self.previous_block_hash.bitcoin_serialize(&mut writer)?;
        self.merkle_root.bitcoin_serialize(&mut writer)?;
        self.time.bitcoin_serialize(&mut writer)?;
        self.bits.bitcoin_serialize(&mut writer)?;
        self.nonce.bitcoin_serialize(&mut writer)
    }
}

impl BitcoinDeserialize for Header {
    fn bitcoin_deserialize<R: io::Read>(mut reader: R) -> Result<Self, SerializationError> {
        Ok(Header {
            version: u32::bitcoin_deserialize(&mut reader)?,
            previous_block_hash: Hash::bitcoin_deserialize(&mut reader)?,
            merkle_root: merkle::Root::bitcoin_deserialize(&mut reader)?,
            time: <DateTime<Utc>>::bitcoin_deserialize(&mut reader)?,
            bits: u32::bitcoin_deserialize(&mut reader)?,
            nonce: u32::bitcoin_deserialize(&mut reader)?,
        })
    }
}

/// A header with a count of the number of transactions in its block.
///
/// This structure is carried by `headers` messages; the count is always zero
/// on the wire (headers never include transactions) but remains part of the
/// encoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CountedHeader {
    pub header: Header,
    pub transaction_count: usize,
}

impl BitcoinSerialize for CountedHeader {
    fn bitcoin_serialize<W: io::Write>(&self, mut writer: W) -> Result<(), io::Error> {
        self.header.bitcoin_serialize(&mut writer)?;
        CompactInt::from(self.transaction_count).bitcoin_serialize(&mut writer)
    }
}

impl BitcoinDeserialize for CountedHeader {
    fn bitcoin_deserialize<R: io::Read>(mut reader: R) -> Result<Self, SerializationError> {
        Ok(CountedHeader {
            header: Header::bitcoin_deserialize(&mut reader)?,
            transaction_count: CompactInt::bitcoin_deserialize(&mut reader)?.value() as usize,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn test_header() -> Header {
        Header {
            version: 2,
            previous_block_hash: Hash([7u8; 32]),
            merkle_root: merkle::Root([9u8; 32]),
            time: Utc.timestamp(1_433_865_600, 0),
            bits: 0x1d00_ffff,
            nonce: 0x9962_e301,
        }
    }

    #[test]
    fn header_is_eighty_bytes() {
        let bytes = test_header().bitcoin_serialize_to_vec().unwrap();
        assert_eq!(bytes.len(), Header::len());
    }

    #[test]
    fn header_round_trip() {
        let header = test_header();
        let bytes = header.bitcoin_serialize_to_vec().unwrap();
        let parsed = Header::bitcoin_deserialize(&bytes[..]).unwrap();
        assert_eq!(parsed, header);
        assert_eq!(parsed.hash(), header.hash());
    }

    #[test]
    fn counted_header_round_trip() {
        let counted = CountedHeader {
            header: test_header(),
            transaction_count: 0,
        };
        let bytes = counted.bitcoin_serialize_to_vec().unwrap();
        assert_eq!(bytes.len(), Header::len() + 1);
        let parsed = CountedHeader::bitcoin_deserialize(&bytes[..]).unwrap();
        assert_eq!(parsed, counted);
    }
}
