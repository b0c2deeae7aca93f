use std::io;

use bitflags::bitflags;
use loafwallet_chain::{BitcoinDeserialize, BitcoinSerialize, SerializationError};

/// A magic number identifying the network a message frame belongs to.
///
/// The four bytes appear on the wire exactly as stored here, so the value
/// for a network whose magic is conventionally written `0xD9B4BEF9` is
/// `Magic([0xf9, 0xbe, 0xb4, 0xd9])`.
#[derive(Copy, Clone, Eq, PartialEq)]
pub struct Magic(pub [u8; 4]);

impl Magic {
    /// Bitcoin mainnet.
    pub const BITCOIN: Magic = Magic([0xf9, 0xbe, 0xb4, 0xd9]);
    /// Bitcoin testnet3.
    pub const BITCOIN_TESTNET: Magic = Magic([0x0b, 0x11, 0x09, 0x07]);
    /// Litecoin mainnet.
    pub const LITECOIN: Magic = Magic([0xfb, 0xc0, 0xb6, 0xdb]);
    /// Litecoin testnet4.
    pub const LITECOIN_TESTNET: Magic = Magic([0xfd, 0xd2, 0xc8, 0xf1]);

    /// Build a magic from the conventional u32 form, e.g. `0xD9B4BEF9` for
    /// Bitcoin mainnet.
    pub fn from_u32(magic: u32) -> Magic {
        Magic(magic.to_le_bytes())
    }
}

impl std::fmt::Debug for Magic {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_tuple("Magic").field(&hex::encode(&self.0)).finish()
    }
}

/// A protocol version number.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd)]
pub struct ProtocolVersion(pub u32);

impl BitcoinSerialize for ProtocolVersion {
    fn bitcoin_serialize<W: io::Write>(&self, mut writer: W) -> Result<(), io::Error> {
        self.0.bitcoin_serialize(&mut writer)
    }
}

impl BitcoinDeserialize for ProtocolVersion {
    fn bitcoin_deserialize<R: io::Read>(mut reader: R) -> Result<Self, SerializationError> {
        Ok(ProtocolVersion(u32::bitcoin_deserialize(&mut reader)?))
    }
}

bitflags! {
    /// The network services a peer advertises in its `version` message and
    /// `addr` entries.
    pub struct PeerServices: u64 {
        /// NODE_NETWORK: this node can serve full blocks.
        const NODE_NETWORK = 0x01;
        /// NODE_BLOOM (BIP111): this node supports BIP37 bloom filtering.
        const NODE_BLOOM = 0x04;
        /// NODE_BCASH: this node is on the Bitcoin Cash chain. Recorded
        /// here for the peer-manager; the session engine applies no policy.
        const NODE_BCASH = 0x20;

        // Bits we don't interpret still belong to the advertised mask and
        // must survive re-serialization of addr entries.
        #[doc(hidden)]
        const UNINTERPRETED = !0;
    }
}

impl BitcoinSerialize for PeerServices {
    fn bitcoin_serialize<W: io::Write>(&self, mut writer: W) -> Result<(), io::Error> {
        self.bits().bitcoin_serialize(&mut writer)
    }
}

impl BitcoinDeserialize for PeerServices {
    fn bitcoin_deserialize<R: io::Read>(mut reader: R) -> Result<Self, SerializationError> {
        // Unknown service bits are meaningful to other peers; keep them.
        Ok(PeerServices::from_bits_truncate(u64::bitcoin_deserialize(
            &mut reader,
        )?))
    }
}

/// A nonce used in the networking layer to identify messages.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct Nonce(pub u64);

impl Default for Nonce {
    fn default() -> Self {
        use rand::{thread_rng, Rng};
        Self(thread_rng().gen())
    }
}

impl BitcoinSerialize for Nonce {
    fn bitcoin_serialize<W: io::Write>(&self, mut writer: W) -> Result<(), io::Error> {
        self.0.bitcoin_serialize(&mut writer)
    }
}

impl BitcoinDeserialize for Nonce {
    fn bitcoin_deserialize<R: io::Read>(mut reader: R) -> Result<Self, SerializationError> {
        Ok(Nonce(u64::bitcoin_deserialize(&mut reader)?))
    }
}

/// A bloom filter bit field, opaque to the session engine; the wallet owns
/// filter construction (BIP37).
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Filter(pub Vec<u8>);

/// A randomization tweak for the bloom filter's hash functions.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Tweak(pub u32);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn magic_from_u32_matches_wire_order() {
        assert_eq!(Magic::from_u32(0xD9B4_BEF9), Magic::BITCOIN);
        assert_eq!(Magic::from_u32(0xDBB6_C0FB), Magic::LITECOIN);
    }

    #[test]
    fn unknown_service_bits_survive_round_trip() {
        let bytes = 0x0000_0000_0000_0425u64.to_le_bytes();
        let services = PeerServices::bitcoin_deserialize(&bytes[..]).unwrap();
        assert!(services.contains(PeerServices::NODE_NETWORK));
        assert!(services.contains(PeerServices::NODE_BLOOM));
        assert!(services.contains(PeerServices::NODE_BCASH));
        assert_eq!(services.bits(), 0x425);
        assert_eq!(
            services.bitcoin_serialize_to_vec().unwrap(),
            bytes.to_vec()
        );
    }
}
