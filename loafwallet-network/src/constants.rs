//! Definitions of constants.

use std::time::Duration;

use crate::protocol::external::types::ProtocolVersion;

/// The protocol version advertised in our `version` messages. Covers BIP37
/// (bloom filtering) and BIP111 (NODE_BLOOM) semantics.
pub const CURRENT_VERSION: ProtocolVersion = ProtocolVersion(70013);

/// The oldest protocol version we will talk to. Anything below this cannot
/// serve filtered blocks.
pub const MIN_PEER_VERSION: ProtocolVersion = ProtocolVersion(70002);

/// The user agent advertised in our `version` messages.
pub const USER_AGENT: &str = "/litewallet-loafwallet-core:2.1/";

/// How long to wait for the TCP connection to be established.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// How long after the connection opens before a completed version/verack
/// exchange is required.
pub const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Base wait for a `pong` (or any sign of life after a keepalive ping); the
/// rolling round-trip estimate is added on top.
pub const PING_TIMEOUT: Duration = Duration::from_secs(30);

/// Silence on the wire for this long prompts a keepalive ping.
pub const IDLE_INTERVAL: Duration = Duration::from_secs(10 * 60);

/// How long a `mempool` request stays open waiting for the answering `inv`.
pub const MEMPOOL_TIMEOUT: Duration = Duration::from_secs(10);

/// Granularity of the session thread's deadline checks while blocked on the
/// socket.
pub const READ_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Maximum number of inventory entries in a single `inv`/`getdata`.
pub const MAX_GETDATA_HASHES: usize = 50_000;

/// A peer whose reported best height is this far below our own is stalling
/// us on purpose (a tarpit) and gets dropped.
pub const STUCK_PEER_HEIGHT_SLACK: u32 = 7;

/// Weight of the newest sample in the ping round-trip moving average.
pub const PING_RTT_ALPHA: f64 = 0.5;
