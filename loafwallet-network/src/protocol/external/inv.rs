//! Inventory items for the Bitcoin protocol, and the wallet's view of
//! them.
//!
//! An SPV wallet cares about two of the advertised object types:
//! transactions, which it may request outright, and blocks, which it only
//! ever downloads in their filtered merkle form (BIP37). The conversion
//! and bookkeeping for that policy live here with the wire type, so the
//! session engine deals in intents rather than raw type codes.

use std::io::{Read, Write};

use loafwallet_chain::{
    block,
    serialization::{BitcoinDeserialize, BitcoinSerialize, SerializationError},
    transaction,
};

/// An inventory hash which refers to some advertised or requested data.
///
/// Bitcoin calls this an "inventory vector" but it is just a typed hash,
/// not a container, so we do not use that term to avoid confusion with
/// `Vec<T>`.
///
/// [Bitcoin reference](https://en.bitcoin.it/wiki/Protocol_documentation#Inventory_Vectors)
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum InventoryHash {
    /// An error entry; carries no hash worth keeping.
    Error,
    /// A hash of a transaction.
    Tx(transaction::Hash),
    /// A hash of a block.
    Block(block::Hash),
    /// A hash of a filtered block: valid only in `getdata`, where it asks
    /// the remote for a `merkleblock` instead of the full block. Requires
    /// a loaded bloom filter (BIP37).
    FilteredBlock(block::Hash),
}

impl InventoryHash {
    /// The form this item takes in one of our `getdata` requests. Block
    /// announcements are downgraded to their filtered form; a wallet that
    /// never validates full blocks must never fetch one.
    pub fn as_download_request(self) -> InventoryHash {
        match self {
            InventoryHash::Block(hash) => InventoryHash::FilteredBlock(hash),
            other => other,
        }
    }

    /// The request appended after a batch of filtered block requests: a
    /// transaction that cannot exist, so the remote's `notfound` answer
    /// marks the end of the batch.
    pub fn batch_sentinel() -> InventoryHash {
        InventoryHash::Tx(transaction::Hash::ZERO)
    }

    /// Whether this is the batch-end sentinel coming back in `notfound`.
    pub fn is_batch_sentinel(&self) -> bool {
        *self == InventoryHash::batch_sentinel()
    }

    /// The transaction hash, for transaction entries.
    pub fn tx_hash(&self) -> Option<transaction::Hash> {
        match self {
            InventoryHash::Tx(hash) => Some(*hash),
            _ => None,
        }
    }

    /// The block hash, for either flavor of block entry.
    pub fn block_hash(&self) -> Option<block::Hash> {
        match self {
            InventoryHash::Block(hash) | InventoryHash::FilteredBlock(hash) => Some(*hash),
            _ => None,
        }
    }

    fn type_code(&self) -> u32 {
        match self {
            InventoryHash::Error => 0,
            InventoryHash::Tx(_) => 1,
            InventoryHash::Block(_) => 2,
            InventoryHash::FilteredBlock(_) => 3,
        }
    }

    fn object_hash(&self) -> [u8; 32] {
        match self {
            InventoryHash::Error => [0; 32],
            InventoryHash::Tx(hash) => hash.0,
            InventoryHash::Block(hash) | InventoryHash::FilteredBlock(hash) => hash.0,
        }
    }
}

impl BitcoinSerialize for InventoryHash {
    fn bitcoin_serialize<W: Write>(&self, mut writer: W) -> Result<(), std::io::Error> {
        self.type_code().bitcoin_serialize(&mut writer)?;
        self.object_hash().bitcoin_serialize(&mut writer)
    }
}

impl BitcoinDeserialize for InventoryHash {
    fn bitcoin_deserialize<R: Read>(mut reader: R) -> Result<Self, SerializationError> {
        let code = u32::bitcoin_deserialize(&mut reader)?;
        let bytes = <[u8; 32]>::bitcoin_deserialize(&mut reader)?;
        match code {
            0 => Ok(InventoryHash::Error),
            1 => Ok(InventoryHash::Tx(transaction::Hash(bytes))),
            2 => Ok(InventoryHash::Block(block::Hash(bytes))),
            3 => Ok(InventoryHash::FilteredBlock(block::Hash(bytes))),
            _ => Err(SerializationError::Parse("invalid inventory code")),
        }
    }
}

/// An inventory body partitioned by object type, in arrival order.
///
/// The wallet handles transaction and block announcements on separate
/// paths, so `inv` and `notfound` processing both start here. Error
/// entries and the batch sentinel carry no payload and are dropped.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct SplitInventory {
    pub tx_hashes: Vec<transaction::Hash>,
    pub block_hashes: Vec<block::Hash>,
}

impl SplitInventory {
    pub fn from_items(items: &[InventoryHash]) -> SplitInventory {
        let mut split = SplitInventory::default();
        for item in items {
            if item.is_batch_sentinel() {
                continue;
            }
            if let Some(hash) = item.tx_hash() {
                split.tx_hashes.push(hash);
            } else if let Some(hash) = item.block_hash() {
                split.block_hashes.push(hash);
            }
        }
        split
    }

    pub fn is_empty(&self) -> bool {
        self.tx_hashes.is_empty() && self.block_hashes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_preserves_type_codes() {
        for item in [
            InventoryHash::Error,
            InventoryHash::Tx(transaction::Hash([0xaa; 32])),
            InventoryHash::Block(block::Hash([0xbb; 32])),
            InventoryHash::FilteredBlock(block::Hash([0xcc; 32])),
        ]
        .iter()
        {
            let bytes = item.bitcoin_serialize_to_vec().unwrap();
            assert_eq!(bytes.len(), 36);
            assert_eq!(InventoryHash::bitcoin_deserialize(&bytes[..]).unwrap(), *item);
        }
    }

    #[test]
    fn download_requests_never_name_full_blocks() {
        let hash = block::Hash([0x11; 32]);
        assert_eq!(
            InventoryHash::Block(hash).as_download_request(),
            InventoryHash::FilteredBlock(hash)
        );
        assert_eq!(
            InventoryHash::FilteredBlock(hash).as_download_request(),
            InventoryHash::FilteredBlock(hash)
        );
        let tx = InventoryHash::Tx(transaction::Hash([0x22; 32]));
        assert_eq!(tx.as_download_request(), tx);
    }

    #[test]
    fn sentinel_is_the_zero_txid_and_never_splits() {
        assert!(InventoryHash::batch_sentinel().is_batch_sentinel());
        assert!(!InventoryHash::Tx(transaction::Hash([1; 32])).is_batch_sentinel());

        let split = SplitInventory::from_items(&[InventoryHash::batch_sentinel()]);
        assert!(split.is_empty());
    }

    #[test]
    fn split_partitions_by_type_in_order() {
        let t1 = transaction::Hash([1; 32]);
        let t2 = transaction::Hash([2; 32]);
        let b1 = block::Hash([3; 32]);
        let split = SplitInventory::from_items(&[
            InventoryHash::Tx(t1),
            InventoryHash::FilteredBlock(b1),
            InventoryHash::Error,
            InventoryHash::Tx(t2),
        ]);
        assert_eq!(split.tx_hashes, vec![t1, t2]);
        assert_eq!(split.block_hashes, vec![b1]);
    }
}
