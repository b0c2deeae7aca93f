use std::io;
use std::net::{IpAddr, Ipv6Addr, SocketAddr};

use byteorder::{BigEndian, LittleEndian, ReadBytesExt};
use chrono::{DateTime, TimeZone, Utc};

use super::SerializationError;

type Result<R> = std::result::Result<R, SerializationError>;

/// The most elements a sequence read will reserve ahead of parsing them.
/// Length prefixes come from the remote, so reserving what they claim
/// outright is a memory-exhaustion hole.
const BLIND_ALLOC_LIMIT: u64 = 1024;

/// Longest var-string accepted through the untyped [`String`] impl. The
/// longest strings any supported message carries are user agents and
/// reject reasons, both far below this.
const VAR_STRING_LIMIT: usize = 1024;

pub trait BitcoinDeserialize {
    fn bitcoin_deserialize<R: io::Read>(reader: R) -> Result<Self>
    where
        Self: Sized;
}

/// Helper for deserializing more succinctly via type inference
pub trait BitcoinDeserializeInto {
    /// Deserialize based on type inference
    fn bitcoin_deserialize_into<T>(self) -> Result<T>
    where
        T: BitcoinDeserialize;
}

impl<R: io::Read> BitcoinDeserializeInto for R {
    fn bitcoin_deserialize_into<T>(self) -> Result<T>
    where
        T: BitcoinDeserialize,
    {
        T::bitcoin_deserialize(self)
    }
}

/// Extension methods for reading the Bitcoin wire format's composite
/// primitives from any `io::Read`, with explicit bounds on
/// attacker-controlled lengths.
pub trait ReadBitcoinExt: io::Read {
    /// Read a Bitcoin variable-length integer. Non-minimal encodings are
    /// accepted; honest nodes emit only minimal forms.
    fn read_compact_size(&mut self) -> Result<u64> {
        let value = match self.read_u8()? {
            0xfd => u64::from(self.read_u16::<LittleEndian>()?),
            0xfe => u64::from(self.read_u32::<LittleEndian>()?),
            0xff => self.read_u64::<LittleEndian>()?,
            small => u64::from(small),
        };
        Ok(value)
    }

    /// Read a length-prefixed byte blob of at most `limit` bytes. A larger
    /// prefix is a protocol violation and fatal to the frame.
    fn read_var_bytes(&mut self, limit: usize) -> Result<Vec<u8>> {
        let len = self.read_compact_size()?;
        if len > limit as u64 {
            return Err(SerializationError::Parse("var-length field over limit"));
        }
        let mut value = vec![0u8; len as usize];
        self.read_exact(&mut value)?;
        Ok(value)
    }

    /// Read a length-prefixed UTF-8 string of at most `limit` bytes.
    fn read_var_str(&mut self, limit: usize) -> Result<String> {
        String::from_utf8(self.read_var_bytes(limit)?)
            .map_err(|_| SerializationError::Parse("invalid utf-8"))
    }
}

impl<R: io::Read> ReadBitcoinExt for R {}

macro_rules! impl_deserializable_le_number {
    ($($number:ty => $read:ident),* $(,)?) => {$(
        impl BitcoinDeserialize for $number {
            fn bitcoin_deserialize<R: io::Read>(mut reader: R) -> Result<$number> {
                Ok(reader.$read::<LittleEndian>()?)
            }
        }
    )*};
}

impl_deserializable_le_number!(
    u16 => read_u16,
    u32 => read_u32,
    u64 => read_u64,
    i32 => read_i32,
    i64 => read_i64,
);

impl BitcoinDeserialize for u8 {
    fn bitcoin_deserialize<R: io::Read>(mut reader: R) -> Result<u8> {
        Ok(reader.read_u8()?)
    }
}

impl BitcoinDeserialize for bool {
    fn bitcoin_deserialize<R: io::Read>(mut reader: R) -> Result<bool> {
        match reader.read_u8()? {
            0 => Ok(false),
            1 => Ok(true),
            _ => Err(SerializationError::Parse("invalid bool")),
        }
    }
}

impl BitcoinDeserialize for DateTime<Utc> {
    fn bitcoin_deserialize<R: io::Read>(mut reader: R) -> Result<DateTime<Utc>> {
        Ok(Utc.timestamp(reader.read_u32::<LittleEndian>()? as i64, 0))
    }
}

impl<T> BitcoinDeserialize for Vec<T>
where
    T: BitcoinDeserialize,
{
    fn bitcoin_deserialize<R: io::Read>(mut reader: R) -> Result<Vec<T>> {
        let len = reader.read_compact_size()?;
        let mut result = Vec::with_capacity(len.min(BLIND_ALLOC_LIMIT) as usize);
        for _ in 0..len {
            result.push(T::bitcoin_deserialize(&mut reader)?);
        }
        Ok(result)
    }
}

impl BitcoinDeserialize for String {
    fn bitcoin_deserialize<R: io::Read>(mut reader: R) -> Result<String> {
        reader.read_var_str(VAR_STRING_LIMIT)
    }
}

impl BitcoinDeserialize for SocketAddr {
    fn bitcoin_deserialize<R: io::Read>(mut reader: R) -> Result<SocketAddr> {
        let v6_addr = Ipv6Addr::from(<[u8; 16]>::bitcoin_deserialize(&mut reader)?);
        // Surface mapped IPv4 addresses in their native form.
        let ip = match v6_addr.to_ipv4() {
            Some(v4_addr) => IpAddr::V4(v4_addr),
            None => IpAddr::V6(v6_addr),
        };
        Ok(SocketAddr::from((ip, reader.read_u16::<BigEndian>()?)))
    }
}

impl<T, U> BitcoinDeserialize for (T, U)
where
    T: BitcoinDeserialize,
    U: BitcoinDeserialize,
{
    fn bitcoin_deserialize<R: io::Read>(mut reader: R) -> Result<(T, U)> {
        Ok((
            T::bitcoin_deserialize(&mut reader)?,
            U::bitcoin_deserialize(&mut reader)?,
        ))
    }
}

macro_rules! impl_deserializable_byte_array {
    ($size:expr) => {
        impl BitcoinDeserialize for [u8; $size] {
            fn bitcoin_deserialize<R: io::Read>(mut reader: R) -> Result<[u8; $size]> {
                let mut result = [0u8; $size];
                reader.read_exact(&mut result)?;
                Ok(result)
            }
        }
    };
}

impl_deserializable_byte_array!(4);
impl_deserializable_byte_array!(12);
impl_deserializable_byte_array!(16);
impl_deserializable_byte_array!(32);
