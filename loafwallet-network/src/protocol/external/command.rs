use std::{fmt, io};

use loafwallet_chain::{BitcoinDeserialize, BitcoinSerialize, SerializationError};

/// The 12-byte NUL-padded ASCII command field of a message frame.
///
/// Commands we don't speak are preserved as [`Command::Unknown`] so the
/// session can log and ignore them instead of dropping the connection.
#[derive(Copy, Clone, Eq, PartialEq)]
pub enum Command {
    Version,
    Verack,
    Addr,
    Inv,
    GetData,
    NotFound,
    GetBlocks,
    GetHeaders,
    Tx,
    Block,
    Headers,
    GetAddr,
    MemPool,
    Ping,
    Pong,
    FilterLoad,
    FilterAdd,
    FilterClear,
    MerkleBlock,
    Reject,
    FeeFilter,
    Unknown([u8; 12]),
}

impl Command {
    /// The wire form of this command.
    pub fn bytes(&self) -> [u8; 12] {
        match self {
            Command::Unknown(raw) => *raw,
            known => {
                let mut bytes = [0u8; 12];
                let name = known.name();
                bytes[..name.len()].copy_from_slice(name.as_bytes());
                bytes
            }
        }
    }

    fn name(&self) -> &'static str {
        match self {
            Command::Version => "version",
            Command::Verack => "verack",
            Command::Addr => "addr",
            Command::Inv => "inv",
            Command::GetData => "getdata",
            Command::NotFound => "notfound",
            Command::GetBlocks => "getblocks",
            Command::GetHeaders => "getheaders",
            Command::Tx => "tx",
            Command::Block => "block",
            Command::Headers => "headers",
            Command::GetAddr => "getaddr",
            Command::MemPool => "mempool",
            Command::Ping => "ping",
            Command::Pong => "pong",
            Command::FilterLoad => "filterload",
            Command::FilterAdd => "filteradd",
            Command::FilterClear => "filterclear",
            Command::MerkleBlock => "merkleblock",
            Command::Reject => "reject",
            Command::FeeFilter => "feefilter",
            Command::Unknown(_) => "unknown",
        }
    }
}

impl From<[u8; 12]> for Command {
    fn from(raw: [u8; 12]) -> Self {
        let end = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
        match &raw[..end] {
            b"version" => Command::Version,
            b"verack" => Command::Verack,
            b"addr" => Command::Addr,
            b"inv" => Command::Inv,
            b"getdata" => Command::GetData,
            b"notfound" => Command::NotFound,
            b"getblocks" => Command::GetBlocks,
            b"getheaders" => Command::GetHeaders,
            b"tx" => Command::Tx,
            b"block" => Command::Block,
            b"headers" => Command::Headers,
            b"getaddr" => Command::GetAddr,
            b"mempool" => Command::MemPool,
            b"ping" => Command::Ping,
            b"pong" => Command::Pong,
            b"filterload" => Command::FilterLoad,
            b"filteradd" => Command::FilterAdd,
            b"filterclear" => Command::FilterClear,
            b"merkleblock" => Command::MerkleBlock,
            b"reject" => Command::Reject,
            b"feefilter" => Command::FeeFilter,
            _ => Command::Unknown(raw),
        }
    }
}

impl fmt::Debug for Command {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Command::Unknown(raw) => {
                let end = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
                write!(f, "Command({:?})", String::from_utf8_lossy(&raw[..end]))
            }
            known => write!(f, "Command({:?})", known.name()),
        }
    }
}

impl BitcoinSerialize for Command {
    fn bitcoin_serialize<W: io::Write>(&self, mut writer: W) -> Result<(), io::Error> {
        self.bytes().bitcoin_serialize(&mut writer)
    }
}

impl BitcoinDeserialize for Command {
    fn bitcoin_deserialize<R: io::Read>(mut reader: R) -> Result<Self, SerializationError> {
        Ok(Command::from(<[u8; 12]>::bitcoin_deserialize(&mut reader)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_form_is_nul_padded() {
        assert_eq!(&Command::Verack.bytes(), b"verack\0\0\0\0\0\0");
        assert_eq!(&Command::FilterLoad.bytes(), b"filterload\0\0");
    }

    #[test]
    fn round_trips_through_wire_form() {
        for command in [
            Command::Version,
            Command::MerkleBlock,
            Command::FeeFilter,
            Command::MemPool,
        ]
        .iter()
        {
            assert_eq!(Command::from(command.bytes()), *command);
        }
    }

    #[test]
    fn unrecognized_commands_are_preserved() {
        let mut raw = [0u8; 12];
        raw[..5].copy_from_slice(b"alert");
        let command = Command::from(raw);
        assert_eq!(command, Command::Unknown(raw));
        assert_eq!(command.bytes(), raw);
    }
}
