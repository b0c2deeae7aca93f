use loafwallet_chain::{
    block, compactint::CompactInt, BitcoinDeserialize, BitcoinSerialize, SerializationError,
};

/// The body of a `getheaders` message, sans the leading protocol version
/// (which the codec owns, since it is negotiation state).
#[derive(PartialEq, Eq, Debug, Clone)]
pub struct GetHeaders {
    /// A list of the sender's best known block hashes, ordered from newest
    /// to oldest.
    pub block_locator_hashes: Vec<block::Hash>,
    /// The stop hash. Set to None if the observed stop hash is [0u8; 32],
    /// which signifies that the sender wants as many headers as we can send
    /// (up to 2000).
    pub stop_hash: Option<block::Hash>,
}

impl BitcoinDeserialize for GetHeaders {
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
        Ok(GetHeaders {
            block_locator_hashes,
            stop_hash,
        })
    }
}

impl BitcoinSerialize for GetHeaders {
    fn bitcoin_serialize<W: std::io::Write>(&self, mut target: W) -> Result<(), std::io::Error> {
        self.block_locator_hashes.bitcoin_serialize(&mut target)?;
        self.stop_hash
            .unwrap_or(block::Hash::ZERO)
            .bitcoin_serialize(&mut target)
    }
}

impl GetHeaders {
    fn serialized_size(&self) -> usize {
        CompactInt::size(self.block_locator_hashes.len())
            + (self.block_locator_hashes.len() * 32)
            + 32
    }
}

#[test]
fn serial_size() {
    let int1 = block::Hash([0u8; 32]);
    let int2 = block::Hash([1u8; 32]);
    let msg = GetHeaders {
        block_locator_hashes: vec![int1, int2],
        stop_hash: None,
    };
    let serial = msg
        .bitcoin_serialize_to_vec()
        .expect("Serializing into vec shouldn't fail");
    assert_eq!(serial.len(), msg.serialized_size());
}
