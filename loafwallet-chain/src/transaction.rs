//! Transaction identity and raw transaction relay.
//!
//! The wallet's transaction model (inputs, outputs, scripts, signing) lives
//! upstream of this crate. The peer layer only needs to frame signed
//! transactions, compute their ids, and hand the bytes onward, so the
//! [`Transaction`] here owns an opaque serialized body.

use std::{fmt, io, io::Read};

use bytes::Bytes;

use crate::serialization::{sha256d, BitcoinDeserialize, BitcoinSerialize, SerializationError};

/// A transaction id: the SHA-256d hash of the serialized transaction.
///
/// Displayed in big-endian byte-order, following the u256 convention set by
/// Bitcoin.
#[derive(Copy, Clone, Eq, PartialEq, Hash)]
pub struct Hash(pub [u8; 32]);

impl Hash {
    /// The all-zero hash. Never a real txid; used as the end-of-batch
    /// sentinel in block download.
    pub const ZERO: Hash = Hash([0u8; 32]);
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let mut reversed_bytes = self.0;
        reversed_bytes.reverse();
        f.write_str(&hex::encode(&reversed_bytes))
    }
}

impl fmt::Debug for Hash {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let mut reversed_bytes = self.0;
        reversed_bytes.reverse();
        f.debug_tuple("transaction::Hash")
            .field(&hex::encode(&reversed_bytes))
            .finish()
    }
}

impl BitcoinSerialize for Hash {
    fn bitcoin_serialize<W: io::Write>(&self, mut writer: W) -> Result<(), io::Error> {
        self.0.bitcoin_serialize(&mut writer)
    }
}

impl BitcoinDeserialize for Hash {
    fn bitcoin_deserialize<R: io::Read>(mut reader: R) -> Result<Self, SerializationError> {
        Ok(Hash(<[u8; 32]>::bitcoin_deserialize(&mut reader)?))
    }
}

impl std::str::FromStr for Hash {
    type Err = SerializationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut bytes = [0; 32];
        if hex::decode_to_slice(s, &mut bytes[..]).is_err() {
            Err(SerializationError::Parse("hex decoding error"))
        } else {
            bytes.reverse();
            Ok(Hash(bytes))
        }
    }
}

/// A signed transaction in its serialized form.
///
/// The body is opaque to the peer layer; the id is computed once at
/// construction. Clones share the underlying buffer.
#[derive(Clone, Eq, PartialEq)]
pub struct Transaction {
    bytes: Bytes,
    hash: Hash,
}

impl Transaction {
    /// Wrap an already-serialized signed transaction.
    pub fn from_bytes(bytes: Bytes) -> Transaction {
        let hash = Hash(sha256d::digest(&bytes));
        Transaction { bytes, hash }
    }

    /// The transaction id.
    pub fn hash(&self) -> Hash {
        self.hash
    }

    /// The serialized transaction body.
    pub fn bytes(&self) -> &Bytes {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl fmt::Debug for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Transaction")
            .field("hash", &self.hash)
            .field("len", &self.bytes.len())
            .finish()
    }
}

impl BitcoinSerialize for Transaction {
    fn bitcoin_serialize<W: io::Write>(&self, mut writer: W) -> Result<(), io::Error> {
        writer.write_all(&self.bytes)
    }
}

// A transaction body occupies the remainder of its message frame; there is
// no length prefix of its own.
impl BitcoinDeserialize for Transaction {
    fn bitcoin_deserialize<R: io::Read>(mut reader: R) -> Result<Self, SerializationError> {
        let mut bytes = Vec::new();
        reader.read_to_end(&mut bytes)?;
        if bytes.is_empty() {
            return Err(SerializationError::Parse("empty transaction body"));
        }
        Ok(Transaction::from_bytes(Bytes::from(bytes)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn txid_is_sha256d_of_body() {
        let tx = Transaction::from_bytes(Bytes::from_static(b"dummy signed transaction"));
        assert_eq!(tx.hash(), Hash(sha256d::digest(b"dummy signed transaction")));
    }

    #[test]
    fn round_trip_preserves_bytes() {
        let tx = Transaction::from_bytes(Bytes::from_static(&[0x01, 0x00, 0x00, 0x00, 0x6a]));
        let encoded = tx.bitcoin_serialize_to_vec().unwrap();
        let parsed = Transaction::bitcoin_deserialize(&encoded[..]).unwrap();
        assert_eq!(parsed, tx);
    }

    #[test]
    fn empty_body_is_rejected() {
        assert!(Transaction::bitcoin_deserialize(&[][..]).is_err());
    }
}
