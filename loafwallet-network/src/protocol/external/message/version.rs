use std::io;
use std::net::SocketAddr;

use byteorder::{ReadBytesExt, WriteBytesExt};
use chrono::{DateTime, TimeZone, Utc};

use loafwallet_chain::{
    block, BitcoinDeserialize, BitcoinSerialize, ReadBitcoinExt, SerializationError,
    WriteBitcoinExt,
};

use super::super::types::{Nonce, PeerServices, ProtocolVersion};

// Longest accepted user agent, matching the reference client's subversion
// cap.
const MAX_USER_AGENT_LEN: usize = 256;

/// A `version` message.
///
/// Note that although this is called `version` in Bitcoin, its role is
/// really analogous to a `ClientHello` message in TLS, used to begin a
/// handshake, and is distinct from a simple version number.
///
/// [Bitcoin reference](https://en.bitcoin.it/wiki/Protocol_documentation#version)
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Version {
    /// The network version number supported by the sender.
    pub version: ProtocolVersion,

    /// The network services advertised by the sender.
    pub services: PeerServices,

    /// The time when the version message was sent.
    pub timestamp: DateTime<Utc>,

    /// The network address of the node receiving this message, and its
    /// advertised network services.
    pub address_recv: (PeerServices, SocketAddr),

    /// The network address of the node sending this message, and its
    /// advertised network services. All-zero values are allowed here.
    pub address_from: (PeerServices, SocketAddr),

    /// Node random nonce, randomly generated every time a version packet is
    /// sent. This nonce is used to detect connections to self.
    pub nonce: Nonce,

    /// The user agent advertised by the sender.
    pub user_agent: String,

    /// The last block received by the emitting node.
    pub best_block: block::Height,

    /// Whether the remote peer should announce relayed transactions or not,
    /// see [BIP 0037](https://github.com/bitcoin/bips/blob/master/bip-0037.mediawiki).
    /// A bloom-filtering wallet sends `false` and announces the filter
    /// afterwards.
    pub relay: bool,
}

impl Version {
    pub fn new(
        version: ProtocolVersion,
        their_ip: SocketAddr,
        their_services: PeerServices,
        our_services: PeerServices,
        our_ip: SocketAddr,
        nonce: Nonce,
        user_agent: String,
        best_block: block::Height,
        relay: bool,
    ) -> Version {
        // To try to stay within the range where bitcoin core will ignore
        // our clock skew, truncate the timestamp to the nearest 5 minutes.
        let now = Utc::now().timestamp();
        let timestamp = Utc.timestamp(now - now.rem_euclid(5 * 60), 0);
        Version {
            version,
            services: our_services,
            timestamp,
            address_recv: (their_services, their_ip),
            address_from: (our_services, our_ip),
            nonce,
            user_agent,
            best_block,
            relay,
        }
    }
}

impl BitcoinSerialize for Version {
    fn bitcoin_serialize<W: io::Write>(&self, mut writer: W) -> Result<(), io::Error> {
        self.version.bitcoin_serialize(&mut writer)?;
        self.services.bitcoin_serialize(&mut writer)?;
        // Unlike addr entries, the version timestamp is 64 bits wide.
        writer.write_i64::<byteorder::LittleEndian>(self.timestamp.timestamp())?;
        self.address_recv.bitcoin_serialize(&mut writer)?;
        self.address_from.bitcoin_serialize(&mut writer)?;
        self.nonce.bitcoin_serialize(&mut writer)?;
        writer.write_var_str(&self.user_agent)?;
        self.best_block.0.bitcoin_serialize(&mut writer)?;
        self.relay.bitcoin_serialize(&mut writer)
    }
}

impl BitcoinDeserialize for Version {
    fn bitcoin_deserialize<R: io::Read>(mut reader: R) -> Result<Self, SerializationError> {
        let version = ProtocolVersion::bitcoin_deserialize(&mut reader)?;
        let services = PeerServices::bitcoin_deserialize(&mut reader)?;
        let timestamp = Utc.timestamp(reader.read_i64::<byteorder::LittleEndian>()?, 0);
        let address_recv = <(PeerServices, SocketAddr)>::bitcoin_deserialize(&mut reader)?;
        let address_from = <(PeerServices, SocketAddr)>::bitcoin_deserialize(&mut reader)?;
        let nonce = Nonce::bitcoin_deserialize(&mut reader)?;
        let user_agent = reader.read_var_str(MAX_USER_AGENT_LEN)?;
        let best_block = block::Height(u32::bitcoin_deserialize(&mut reader)?);
        // The relay flag was added by BIP37; senders older than that omit
        // it, which means "relay everything".
        let relay = match reader.read_u8() {
            Ok(0) => false,
            _ => true,
        };
        Ok(Version {
            version,
            services,
            timestamp,
            address_recv,
            address_from,
            nonce,
            user_agent,
            best_block,
            relay,
        })
    }
}
