//! Serialization substrate and minimal chain data model for the loafwallet
//! SPV core.
//!
//! This crate provides the Bitcoin consensus serialization traits
//! ([`BitcoinSerialize`] and [`BitcoinDeserialize`]) together with the small
//! set of chain structures the peer layer relays: block headers, block and
//! transaction hashes, and raw signed transactions. Transaction *contents*
//! are deliberately opaque here; the wallet's transaction model lives
//! upstream and consumes these types through their byte representation.

pub mod block;
pub mod compactint;
pub mod serialization;
pub mod transaction;

pub use compactint::CompactInt;
pub use serialization::{
    BitcoinDeserialize, BitcoinDeserializeInto, BitcoinSerialize, ReadBitcoinExt,
    SerializationError, WriteBitcoinExt,
};
