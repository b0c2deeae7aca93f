//! Networking code for the loafwallet SPV core.
//!
//! Two layers live here. The lower layer is the Bitcoin wire protocol:
//! message framing with checksums ([`protocol::external::Codec`]) and typed
//! encoders/decoders for every message the wallet speaks
//! ([`protocol::external::Message`]). The upper layer is the per-peer
//! session engine ([`peer::Peer`]): a state machine driving the TCP
//! connection lifecycle, version handshake, bloom-filtered block and
//! transaction relay, ping/pong liveness, and delivery of peer events to
//! the wallet's peer-manager through the [`peer::PeerHandler`] capability
//! trait.
//!
//! Each peer session runs on its own OS thread; sends happen on the
//! caller's thread. Events for one peer are totally ordered and fire only
//! from that peer's session thread.

pub mod constants;
mod meta_addr;
pub mod peer;
pub mod protocol;

pub use meta_addr::MetaAddr;
pub use peer::{DisconnectReason, Peer, PeerHandler, PeerStatus};
pub use protocol::external::{
    types::{Magic, PeerServices},
    Codec, GetBlocks, GetHeaders, InventoryHash, MerkleBlock, Message, RejectReason,
    SplitInventory, Version,
};
