//! Block headers and block identity.
//!
//! An SPV wallet never holds full blocks; the peer layer relays headers and
//! filtered (merkle) blocks, both of which hang off the types here.

mod hash;
mod header;

pub use hash::Hash;
pub use header::{CountedHeader, Header};

pub mod merkle {
    //! The root of a block's transaction merkle tree.

    use std::{fmt, io};

    use crate::{BitcoinDeserialize, BitcoinSerialize, SerializationError};

    /// The root of the transaction Merkle tree, binding a block header to
    /// the transactions in the block.
    #[derive(Copy, Clone, Eq, PartialEq, Hash)]
    pub struct Root(pub [u8; 32]);

    impl fmt::Debug for Root {
        fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
            let mut reversed_bytes = self.0;
            reversed_bytes.reverse();
            f.debug_tuple("merkle::Root")
                .field(&hex::encode(&reversed_bytes))
                .finish()
        }
    }

    impl BitcoinSerialize for Root {
        fn bitcoin_serialize<W: io::Write>(&self, mut writer: W) -> Result<(), io::Error> {
            self.0.bitcoin_serialize(&mut writer)
        }
    }

    impl BitcoinDeserialize for Root {
        fn bitcoin_deserialize<R: io::Read>(mut reader: R) -> Result<Self, SerializationError> {
            Ok(Root(<[u8; 32]>::bitcoin_deserialize(&mut reader)?))
        }
    }
}

/// The height of a block in the chain, as reported in `version` messages.
#[derive(Copy, Clone, Debug, Eq, PartialEq, PartialOrd, Ord, Hash)]
pub struct Height(pub u32);
