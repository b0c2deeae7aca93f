use std::io;

use thiserror::Error;

/// Why a peer session ended.
///
/// The wallet learns of session failure exclusively through
/// [`PeerHandler::disconnected`](super::PeerHandler::disconnected); this
/// enum is the categorized errno of the original callback, one variant per
/// code.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Error)]
pub enum DisconnectReason {
    /// The caller asked for the disconnect (errno 0).
    #[error("orderly disconnect")]
    Orderly,

    /// The remote refused the TCP connection (ECONNREFUSED).
    #[error("connection refused")]
    ConnectionRefused,

    /// A deadline fired: connect, handshake, ping, or a scheduled
    /// disconnect (ETIMEDOUT).
    #[error("timed out")]
    TimedOut,

    /// The remote closed or reset the connection (ECONNRESET).
    #[error("connection reset by peer")]
    ConnectionReset,

    /// The remote violated the protocol: bad framing, checksum, nonce
    /// mismatch, or a malformed message (EPROTO).
    #[error("protocol violation")]
    Protocol,

    /// The remote is misbehaving on purpose: a tarpit node, or one that
    /// advertises NODE_BLOOM and then refuses our filter. The peer-manager
    /// should stop using the address (EPERM).
    #[error("misbehaving peer")]
    Misbehaving,

    /// The caller reported that networking is down (ENETUNREACH).
    #[error("network unreachable")]
    NetworkUnreachable,
}

impl DisconnectReason {
    /// Whether the peer-manager should drop this address rather than retry
    /// it.
    pub fn peer_is_unusable(&self) -> bool {
        matches!(self, DisconnectReason::Misbehaving)
    }

    pub(super) fn from_io(error: &io::Error) -> DisconnectReason {
        match error.kind() {
            io::ErrorKind::ConnectionRefused => DisconnectReason::ConnectionRefused,
            io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => DisconnectReason::TimedOut,
            _ => DisconnectReason::ConnectionReset,
        }
    }
}
