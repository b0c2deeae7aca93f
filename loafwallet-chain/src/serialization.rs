//! Consensus-critical serialization.
//!
//! Two layers live here. [`BitcoinSerialize`] and [`BitcoinDeserialize`]
//! are the typed layer, analogs of the Serde `Serialize` and `Deserialize`
//! traits but producing the Bitcoin wire formats. [`WriteBitcoinExt`] and
//! [`ReadBitcoinExt`] are extension traits over `io::Write`/`io::Read` for
//! the composite primitives those formats are built from: compact sizes
//! (varints), var-strings, and var-byte blobs. The read side is defensive,
//! since every length prefix on the wire is attacker-controlled: blob and
//! string reads take an explicit byte limit, and sequence reads never
//! preallocate more than a small bound up front.

mod deserialize;
mod error;

pub mod sha256d;

use std::convert::TryFrom;
use std::io;
use std::net::IpAddr;

use byteorder::{BigEndian, LittleEndian, WriteBytesExt};
use chrono::{DateTime, Utc};

pub use deserialize::{BitcoinDeserialize, BitcoinDeserializeInto, ReadBitcoinExt};
pub use error::SerializationError;

pub trait BitcoinSerialize {
    fn bitcoin_serialize<W: io::Write>(&self, target: W) -> Result<(), io::Error>;

    fn bitcoin_serialize_to_vec(&self) -> Result<Vec<u8>, io::Error> {
        let mut data = Vec::new();
        self.bitcoin_serialize(&mut data)?;
        Ok(data)
    }
}

/// Extension methods for writing the Bitcoin wire format's composite
/// primitives to any `io::Write`.
pub trait WriteBitcoinExt: io::Write {
    /// Write a Bitcoin variable-length integer (the `CompactSize` of the
    /// reference client): one byte below 0xfd, otherwise a width marker
    /// followed by the little-endian value.
    fn write_compact_size(&mut self, value: u64) -> Result<(), io::Error> {
        match value {
            0..=0xfc => self.write_u8(value as u8),
            0xfd..=0xffff => {
                self.write_u8(0xfd)?;
                self.write_u16::<LittleEndian>(value as u16)
            }
            0x1_0000..=0xffff_ffff => {
                self.write_u8(0xfe)?;
                self.write_u32::<LittleEndian>(value as u32)
            }
            _ => {
                self.write_u8(0xff)?;
                self.write_u64::<LittleEndian>(value)
            }
        }
    }

    /// Write a length-prefixed byte blob, e.g. a bloom filter bit field.
    fn write_var_bytes(&mut self, value: &[u8]) -> Result<(), io::Error> {
        self.write_compact_size(value.len() as u64)?;
        self.write_all(value)
    }

    /// Write a length-prefixed string, e.g. a `version` user agent.
    fn write_var_str(&mut self, value: &str) -> Result<(), io::Error> {
        self.write_var_bytes(value.as_bytes())
    }
}

impl<W: io::Write> WriteBitcoinExt for W {}

// The little-endian fixed-width integers. u8 deliberately has no impl:
// single bytes go through `write_u8`, and leaving it off the trait keeps
// the length-prefixed `Vec<u8>` impl below from overlapping the generic
// sequence impl.
macro_rules! impl_serializable_le_number {
    ($($number:ty => $write:ident),* $(,)?) => {$(
        impl BitcoinSerialize for $number {
            fn bitcoin_serialize<W: io::Write>(&self, mut target: W) -> Result<(), io::Error> {
                target.$write::<LittleEndian>(*self)
            }
        }
    )*};
}

impl_serializable_le_number!(
    u16 => write_u16,
    u32 => write_u32,
    u64 => write_u64,
    i32 => write_i32,
    i64 => write_i64,
);

impl BitcoinSerialize for bool {
    fn bitcoin_serialize<W: io::Write>(&self, mut target: W) -> Result<(), io::Error> {
        target.write_u8(*self as u8)
    }
}

// Wire timestamps outside the version message are 32-bit; saturate rather
// than wrap after 2106.
impl BitcoinSerialize for DateTime<Utc> {
    fn bitcoin_serialize<W: io::Write>(&self, mut target: W) -> Result<(), io::Error> {
        let time_u32 = u32::try_from(self.timestamp()).unwrap_or(std::u32::MAX);
        target.write_u32::<LittleEndian>(time_u32)
    }
}

impl BitcoinSerialize for std::net::Ipv6Addr {
    fn bitcoin_serialize<W: io::Write>(&self, mut target: W) -> Result<(), io::Error> {
        target.write_all(&self.octets())
    }
}

// Addresses are always 16 bytes on the wire; IPv4 travels in its
// `::ffff:a.b.c.d` mapped form.
impl BitcoinSerialize for IpAddr {
    fn bitcoin_serialize<W: io::Write>(&self, mut target: W) -> Result<(), io::Error> {
        match self {
            IpAddr::V4(addr) => addr.to_ipv6_mapped().bitcoin_serialize(&mut target),
            IpAddr::V6(addr) => addr.bitcoin_serialize(&mut target),
        }
    }
}

// Unlike every other integer on the wire, the port rides big-endian.
impl BitcoinSerialize for std::net::SocketAddr {
    fn bitcoin_serialize<W: io::Write>(&self, mut target: W) -> Result<(), io::Error> {
        self.ip().bitcoin_serialize(&mut target)?;
        target.write_u16::<BigEndian>(self.port())
    }
}

macro_rules! impl_serializable_byte_array {
    ($size:expr) => {
        impl BitcoinSerialize for [u8; $size] {
            fn bitcoin_serialize<W: io::Write>(&self, mut target: W) -> Result<(), io::Error> {
                target.write_all(self)
            }
        }
    };
}

impl_serializable_byte_array!(4);
impl_serializable_byte_array!(12);
impl_serializable_byte_array!(32);

impl BitcoinSerialize for Vec<u8> {
    fn bitcoin_serialize<W: io::Write>(&self, mut target: W) -> Result<(), io::Error> {
        target.write_var_bytes(self)
    }
}

impl<T> BitcoinSerialize for Vec<T>
where
    T: BitcoinSerialize,
{
    fn bitcoin_serialize<W: io::Write>(&self, mut target: W) -> Result<(), io::Error> {
        target.write_compact_size(self.len() as u64)?;
        for item in self.iter() {
            item.bitcoin_serialize(&mut target)?
        }
        Ok(())
    }
}

impl<T, U> BitcoinSerialize for (T, U)
where
    T: BitcoinSerialize,
    U: BitcoinSerialize,
{
    fn bitcoin_serialize<W: io::Write>(&self, mut target: W) -> Result<(), io::Error> {
        self.0.bitcoin_serialize(&mut target)?;
        self.1.bitcoin_serialize(&mut target)
    }
}

impl BitcoinSerialize for String {
    fn bitcoin_serialize<W: io::Write>(&self, mut target: W) -> Result<(), io::Error> {
        target.write_var_str(self)
    }
}
