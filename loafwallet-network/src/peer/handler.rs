use loafwallet_chain::{block, transaction};

use crate::meta_addr::MetaAddr;
use crate::protocol::external::{MerkleBlock, RejectReason};

use super::{DisconnectReason, Peer};

/// The capability interface a peer session drives its owner through.
///
/// One implementation, owned by the peer-manager, observes every peer; the
/// `peer` argument identifies the session an event came from. Every method
/// has a no-op default, except [`requested_tx`](PeerHandler::requested_tx)
/// which defaults to "we don't have it" and
/// [`network_is_reachable`](PeerHandler::network_is_reachable) which
/// defaults to `true`.
///
/// All methods are invoked from the peer's session thread, never
/// concurrently for the same peer, and in receive order. No method other
/// than `disconnected` and `thread_cleanup` is invoked before the session
/// reaches [`PeerStatus::Connected`](super::PeerStatus::Connected).
/// Re-entry into the session (for example calling
/// [`Peer::send_getdata`](super::Peer::send_getdata) from inside
/// [`has_tx`](PeerHandler::has_tx)) is allowed.
#[allow(unused_variables)]
pub trait PeerHandler: Send + Sync {
    /// The version/verack handshake completed successfully.
    fn connected(&self, peer: &Peer) {}

    /// The session ended. Fires exactly once per successful `connect`,
    /// after which the peer may be connected again.
    fn disconnected(&self, peer: &Peer, reason: DisconnectReason) {}

    /// An `addr` message delivered known peers.
    fn relayed_peers(&self, peer: &Peer, peers: &[MetaAddr]) {}

    /// A `tx` message delivered a transaction.
    fn relayed_tx(&self, peer: &Peer, tx: transaction::Transaction) {}

    /// An `inv` announced a transaction this session has already seen.
    fn has_tx(&self, peer: &Peer, hash: transaction::Hash) {}

    /// A `reject` message (BIP61) named one of our transactions.
    fn rejected_tx(&self, peer: &Peer, hash: transaction::Hash, reason: RejectReason) {}

    /// A `merkleblock` arrived, or one entry of a `headers` message
    /// (delivered as a block with no transactions).
    fn relayed_block(&self, peer: &Peer, block: MerkleBlock) {}

    /// The remote answered a `getdata` with `notfound`.
    fn notfound(
        &self,
        peer: &Peer,
        tx_hashes: &[transaction::Hash],
        block_hashes: &[block::Hash],
    ) {
    }

    /// The remote announced its fee floor via `feefilter` (BIP133).
    fn set_fee_per_kb(&self, peer: &Peer, fee_per_kb: u64) {}

    /// The remote asked for one of our transactions via `getdata`. Return
    /// the transaction to send it, or `None` to answer with `notfound`.
    fn requested_tx(&self, peer: &Peer, hash: transaction::Hash) -> Option<transaction::Transaction> {
        None
    }

    /// Return `false` to abort a connection attempt when the device has no
    /// network path.
    fn network_is_reachable(&self, peer: &Peer) -> bool {
        true
    }

    /// The session thread is about to exit; runs after `disconnected`.
    fn thread_cleanup(&self, peer: &Peer) {}
}

/// The do-nothing handler installed until the owner registers one.
pub(super) struct NoopHandler;

impl PeerHandler for NoopHandler {}
