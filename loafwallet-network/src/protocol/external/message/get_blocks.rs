use loafwallet_chain::{
    block, compactint::CompactInt, BitcoinDeserialize, BitcoinSerialize, SerializationError,
};

/// The body of a `getblocks` message, sans the leading protocol version
/// (which the codec owns, since it is negotiation state).
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct GetBlocks {
    /// A list of the sender's best known block hashes, ordered from newest
    /// to oldest.
    pub block_locator_hashes: Vec<block::Hash>,
    /// The stop hash. Set to None if the observed stop hash is [0u8; 32],
    /// which signifies that the sender wants as many hashes as we can send
    /// (up to 500).
    pub stop_hash: Option<block::Hash>,
}

impl BitcoinDeserialize for GetBlocks {
    fn bitcoin_deserialize<R: std::io::Read>(mut reader: R) -> Result<Self, SerializationError>
    where
        Self: Sized,
    {
        let block_locator_hashes = Vec::bitcoin_deserialize(&mut reader)?;
        let raw_stop_hash = block::Hash::bitcoin_deserialize(&mut reader)?;
        let stop_hash = if raw_stop_hash == block::Hash::ZERO {
            None
        } else {
            Some(raw_stop_hash)
        };
        Ok(GetBlocks {
            block_locator_hashes,
            stop_hash,
        })
    }
}

impl BitcoinSerialize for GetBlocks {
    fn bitcoin_serialize<W: std::io::Write>(&self, mut target: W) -> Result<(), std::io::Error> {
        self.block_locator_hashes.bitcoin_serialize(&mut target)?;
        self.stop_hash
            .unwrap_or(block::Hash::ZERO)
            .bitcoin_serialize(&mut target)
    }
}

impl GetBlocks {
    fn serialized_size(&self) -> usize {
        // block locator hashes and stop_hash
        CompactInt::size(self.block_locator_hashes.len())
            + (self.block_locator_hashes.len() * 32)
            + 32
    }
}

#[test]
fn serial_size() {
    let int1 = block::Hash([0u8; 32]);
    let int2 = block::Hash([1u8; 32]);
    let int3 = block::Hash([3u8; 32]);
    let msg = GetBlocks {
        block_locator_hashes: vec![int1, int2, int3],
        stop_hash: Some(block::Hash([0xffu8; 32])),
    };
    let serial = msg
        .bitcoin_serialize_to_vec()
        .expect("Serializing into vec shouldn't fail");
    assert_eq!(serial.len(), msg.serialized_size());
}
