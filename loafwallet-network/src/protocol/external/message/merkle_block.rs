use std::io;

use loafwallet_chain::{
    block, serialization::sha256d, transaction, BitcoinDeserialize, BitcoinSerialize,
    SerializationError,
};

/// A `merkleblock` message body: a block header plus the partial merkle
/// tree proving inclusion of the transactions that matched the remote's
/// loaded bloom filter (BIP37).
///
/// Headers-only delivery (from a `headers` message) is represented by a
/// `MerkleBlock` with a zero transaction count and no proof data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MerkleBlock {
    pub block_header: block::Header,
    /// Number of transactions in the full block, including non-matches.
    pub transaction_count: u32,
    /// The pruned set of tree node hashes, depth-first.
    pub hashes: Vec<transaction::Hash>,
    /// The traversal flag bits, little-endian within each byte.
    pub flags: Vec<u8>,
}

// An implausible transaction count fails parsing before the tree walk
// allocates anything; a 1MB block cannot hold more transactions than this.
const MAX_TRANSACTION_COUNT: u32 = 1 << 24;

impl MerkleBlock {
    /// The hash of the underlying block.
    pub fn hash(&self) -> block::Hash {
        self.block_header.hash()
    }

    /// True when this carries no partial merkle tree, i.e. it was
    /// synthesized from a `headers` entry.
    pub fn is_header_only(&self) -> bool {
        self.transaction_count == 0
    }

    /// Walk the partial merkle tree, returning the txids that the remote
    /// flagged as matching our filter, in block order.
    ///
    /// Fails if the tree is malformed or its root does not match the block
    /// header's merkle root, in which case the remote is lying about the
    /// block's contents.
    pub fn extracted_hashes(&self) -> Result<Vec<transaction::Hash>, SerializationError> {
        if self.is_header_only() {
            return if self.hashes.is_empty() && self.flags.is_empty() {
                Ok(Vec::new())
            } else {
                Err(SerializationError::Parse(
                    "merkle proof data on a header-only block",
                ))
            };
        }
        if self.transaction_count > MAX_TRANSACTION_COUNT {
            return Err(SerializationError::Parse(
                "implausible merkleblock transaction count",
            ));
        }
        if self.hashes.len() as u64 > self.transaction_count as u64 {
            return Err(SerializationError::Parse(
                "more merkleblock hashes than transactions",
            ));
        }

        let mut height = 0;
        while self.row_width(height) > 1 {
            height += 1;
        }

        let mut walker = TreeWalker {
            tree: self,
            hash_index: 0,
            bit_index: 0,
            matched: Vec::new(),
        };
        let root = walker.descend(height, 0)?;

        if walker.hash_index != self.hashes.len() {
            return Err(SerializationError::Parse("unconsumed merkleblock hashes"));
        }
        // The remaining bits of the final flag byte are padding and must be
        // zero; whole trailing bytes of padding are not allowed.
        if (walker.bit_index + 7) / 8 != self.flags.len() {
            return Err(SerializationError::Parse("unconsumed merkleblock flags"));
        }
        for bit in walker.bit_index..self.flags.len() * 8 {
            if self.flags[bit / 8] >> (bit % 8) & 1 != 0 {
                return Err(SerializationError::Parse("nonzero merkleblock padding"));
            }
        }
        if root != self.block_header.merkle_root.0 {
            return Err(SerializationError::Parse(
                "merkleblock root does not match header",
            ));
        }

        Ok(walker.matched)
    }

    /// The number of nodes in the tree row `height` levels above the
    /// transactions.
    fn row_width(&self, height: u32) -> u32 {
        (self.transaction_count + (1 << height) - 1) >> height
    }
}

struct TreeWalker<'a> {
    tree: &'a MerkleBlock,
    hash_index: usize,
    bit_index: usize,
    matched: Vec<transaction::Hash>,
}

impl<'a> TreeWalker<'a> {
    fn next_bit(&mut self) -> Result<bool, SerializationError> {
        let byte = self
            .tree
            .flags
            .get(self.bit_index / 8)
            .ok_or(SerializationError::Parse("merkleblock flag bits exhausted"))?;
        let bit = byte >> (self.bit_index % 8) & 1 == 1;
        self.bit_index += 1;
        Ok(bit)
    }

    fn next_hash(&mut self) -> Result<[u8; 32], SerializationError> {
        let hash = self
            .tree
            .hashes
            .get(self.hash_index)
            .ok_or(SerializationError::Parse("merkleblock hashes exhausted"))?;
        self.hash_index += 1;
        Ok(hash.0)
    }

    fn descend(&mut self, height: u32, pos: u32) -> Result<[u8; 32], SerializationError> {
        let flag = self.next_bit()?;
        if height == 0 || !flag {
            let hash = self.next_hash()?;
            if height == 0 && flag {
                self.matched.push(transaction::Hash(hash));
            }
            return Ok(hash);
        }

        let left = self.descend(height - 1, pos * 2)?;
        let right = if pos * 2 + 1 < self.tree.row_width(height - 1) {
            let right = self.descend(height - 1, pos * 2 + 1)?;
            // Identical siblings allow forging the row above
            // (CVE-2012-2459), so an honest peer never sends them.
            if right == left {
                return Err(SerializationError::Parse("duplicate merkleblock sibling"));
            }
            right
        } else {
            left
        };

        let mut node = [0u8; 64];
        node[..32].copy_from_slice(&left);
        node[32..].copy_from_slice(&right);
        Ok(sha256d::digest(&node))
    }
}

impl BitcoinSerialize for MerkleBlock {
    fn bitcoin_serialize<W: io::Write>(&self, mut writer: W) -> Result<(), io::Error> {
        self.block_header.bitcoin_serialize(&mut writer)?;
        self.transaction_count.bitcoin_serialize(&mut writer)?;
        self.hashes.bitcoin_serialize(&mut writer)?;
        self.flags.bitcoin_serialize(&mut writer)
    }
}

impl BitcoinDeserialize for MerkleBlock {
    fn bitcoin_deserialize<R: io::Read>(mut reader: R) -> Result<Self, SerializationError> {
        Ok(MerkleBlock {
            block_header: block::Header::bitcoin_deserialize(&mut reader)?,
            transaction_count: u32::bitcoin_deserialize(&mut reader)?,
            hashes: Vec::bitcoin_deserialize(&mut reader)?,
            flags: Vec::bitcoin_deserialize(&mut reader)?,
        })
    }
}
