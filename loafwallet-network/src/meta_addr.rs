//! An address-with-metadata type used in the peer-to-peer protocol.

use std::{
    fmt,
    hash::{Hash, Hasher},
    io,
    net::{IpAddr, SocketAddr},
};

use chrono::{DateTime, Utc};

use loafwallet_chain::{BitcoinDeserialize, BitcoinSerialize, SerializationError};

use crate::protocol::external::types::PeerServices;

/// The identity of a peer, plus the metadata relayed about it in `addr`
/// messages.
///
/// Addresses are IPv6 on the wire; IPv4 peers use the `::ffff:a.b.c.d`
/// mapping. Equality and hashing use only the socket address, so the
/// peer-manager can keep one entry per endpoint however the metadata
/// changes.
#[derive(Copy, Clone, Debug)]
pub struct MetaAddr {
    /// The peer's address and port.
    pub addr: SocketAddr,

    /// The services advertised by the peer.
    pub services: PeerServices,

    /// When the peer was last seen, as relayed by whoever told us about it.
    pub last_seen: DateTime<Utc>,

    /// Scratch byte for peer-manager bookkeeping. Never serialized; the
    /// manager may only touch it while no session is active.
    pub flags: u8,
}

impl MetaAddr {
    /// A fresh identity for a peer we are about to dial.
    pub fn new(addr: SocketAddr, services: PeerServices) -> MetaAddr {
        MetaAddr {
            addr,
            services,
            last_seen: Utc::now(),
            flags: 0,
        }
    }

    /// The display form of the peer's address, without the port.
    pub fn host(&self) -> String {
        match self.addr.ip() {
            IpAddr::V6(v6) => match v6.to_ipv4() {
                Some(v4) if !v6.is_loopback() => v4.to_string(),
                _ => v6.to_string(),
            },
            v4 => v4.to_string(),
        }
    }
}

impl fmt::Display for MetaAddr {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}:{}", self.host(), self.addr.port())
    }
}

impl PartialEq for MetaAddr {
    fn eq(&self, other: &Self) -> bool {
        self.addr == other.addr
    }
}

impl Eq for MetaAddr {}

impl Hash for MetaAddr {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.addr.hash(state);
    }
}

// The 30-byte addr entry: u32 last-seen, u64 services, 16-byte address,
// big-endian port.
impl BitcoinSerialize for MetaAddr {
    fn bitcoin_serialize<W: io::Write>(&self, mut writer: W) -> Result<(), io::Error> {
        self.last_seen.bitcoin_serialize(&mut writer)?;
        self.services.bitcoin_serialize(&mut writer)?;
        self.addr.bitcoin_serialize(&mut writer)
    }
}

impl BitcoinDeserialize for MetaAddr {
    fn bitcoin_deserialize<R: io::Read>(mut reader: R) -> Result<Self, SerializationError> {
        Ok(MetaAddr {
            last_seen: <DateTime<Utc>>::bitcoin_deserialize(&mut reader)?,
            services: PeerServices::bitcoin_deserialize(&mut reader)?,
            addr: SocketAddr::bitcoin_deserialize(&mut reader)?,
            flags: 0,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn test_addr() -> MetaAddr {
        MetaAddr {
            addr: "203.0.113.6:8333".parse().unwrap(),
            services: PeerServices::NODE_NETWORK | PeerServices::NODE_BLOOM,
            last_seen: Utc.timestamp(1_573_680_222, 0),
            flags: 0,
        }
    }

    #[test]
    fn serialized_entry_is_thirty_bytes() {
        let bytes = test_addr().bitcoin_serialize_to_vec().unwrap();
        assert_eq!(bytes.len(), 30);
    }

    #[test]
    fn round_trip() {
        let addr = test_addr();
        let bytes = addr.bitcoin_serialize_to_vec().unwrap();
        let parsed = MetaAddr::bitcoin_deserialize(&bytes[..]).unwrap();
        assert_eq!(parsed, addr);
        assert_eq!(parsed.services, addr.services);
        assert_eq!(parsed.last_seen, addr.last_seen);
    }

    #[test]
    fn identity_ignores_metadata() {
        let mut a = test_addr();
        let mut b = test_addr();
        a.flags = 1;
        b.services = PeerServices::empty();
        assert_eq!(a, b);

        b.addr = "203.0.113.6:8334".parse().unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn ipv4_mapped_address_displays_as_ipv4() {
        let addr = MetaAddr::new(
            "[::ffff:203.0.113.6]:8333".parse().unwrap(),
            PeerServices::NODE_NETWORK,
        );
        assert_eq!(addr.host(), "203.0.113.6");
    }
}
