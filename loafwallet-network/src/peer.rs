//! The per-peer session engine.
//!
//! A [`Peer`] owns one remote peer: the TCP connection, the version
//! handshake, the inventory dialog, liveness pings, and bloom filter
//! bookkeeping. Each session runs on a dedicated OS thread which performs
//! all reads and fires all [`PeerHandler`] events; sends happen on the
//! caller's thread under an internal lock. Any protocol violation tears the
//! session down with a categorized [`DisconnectReason`].

mod error;
mod handler;

#[cfg(test)]
mod tests;

pub use error::DisconnectReason;
pub use handler::PeerHandler;

use std::collections::{HashSet, VecDeque};
use std::io::{self, Read, Write};
use std::net::{Ipv6Addr, Shutdown, SocketAddr, TcpStream};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::thread;
use std::time::{Duration, Instant};

use bytes::BytesMut;
use tokio_util::codec::{Decoder, Encoder};
use tracing::{debug, error, info, trace, warn};

use loafwallet_chain::{block, transaction};

use crate::constants;
use crate::meta_addr::MetaAddr;
use crate::protocol::external::{
    types::{Filter, Magic, Nonce, PeerServices, ProtocolVersion, Tweak},
    Codec, InventoryHash, MerkleBlock, Message, RejectReason, SplitInventory, Version,
};

const LOCK_POISONED: &str = "peer lock poisoned";

/// The connection state of a peer session.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum PeerStatus {
    /// No session is active.
    Disconnected,
    /// The TCP connection or handshake is in progress.
    Connecting,
    /// The handshake completed; the session is live.
    Connected,
}

struct PendingPing {
    nonce: Nonce,
    sent_at: Instant,
    callback: Box<dyn FnOnce(bool) + Send>,
}

struct PendingMempool {
    deadline: Instant,
    callback: Box<dyn FnOnce(bool) + Send>,
}

/// What the remote told us about itself during the handshake.
struct RemoteInfo {
    version: ProtocolVersion,
    services: PeerServices,
    user_agent: String,
    last_block: u32,
}

#[derive(Default)]
struct State {
    status: Status,
    earliest_key_time: u32,
    current_block_height: u32,
    needs_filter_update: bool,
    sent_filter: bool,
    local_nonce: Option<Nonce>,
    remote: Option<RemoteInfo>,
    got_verack: bool,
    fee_per_kb: u64,
    ping_rtt: Option<f64>,
    pending_pings: VecDeque<PendingPing>,
    pending_mempool: Option<PendingMempool>,
    known_tx_hashes: HashSet<transaction::Hash>,
    requested_tx_hashes: HashSet<transaction::Hash>,
    // Ordered, so a filter update can re-request a suffix of it.
    requested_block_hashes: Vec<block::Hash>,
    disconnect_deadline: Option<Instant>,
    close_reason: Option<DisconnectReason>,
}

// Newtype so State can derive Default with Disconnected as the default.
struct Status(PeerStatus);

impl Default for Status {
    fn default() -> Self {
        Status(PeerStatus::Disconnected)
    }
}

impl State {
    /// Clear per-session fields, keeping caller configuration.
    fn reset_session(&mut self) {
        let earliest_key_time = self.earliest_key_time;
        let current_block_height = self.current_block_height;
        let needs_filter_update = self.needs_filter_update;
        *self = State::default();
        self.earliest_key_time = earliest_key_time;
        self.current_block_height = current_block_height;
        self.needs_filter_update = needs_filter_update;
    }
}

/// A single peer session: identity, connection lifecycle, and protocol
/// state machine.
///
/// Construct with [`Peer::new`], register a [`PeerHandler`], then call
/// [`connect`](Peer::connect). The session delivers everything it learns
/// through the handler, always from its own thread; the owner learns of
/// session death exclusively through
/// [`disconnected`](PeerHandler::disconnected).
pub struct Peer {
    meta: MetaAddr,
    magic: Magic,
    weak_self: Mutex<Weak<Peer>>,
    handler: Mutex<Arc<dyn PeerHandler>>,
    state: Mutex<State>,
    writer: Mutex<Option<TcpStream>>,
}

impl Peer {
    /// Create a peer for the given identity, speaking on the network
    /// identified by `magic`.
    pub fn new(meta: MetaAddr, magic: Magic) -> Arc<Peer> {
        let peer = Arc::new(Peer {
            meta,
            magic,
            weak_self: Mutex::new(Weak::new()),
            handler: Mutex::new(Arc::new(handler::NoopHandler)),
            state: Mutex::new(State::default()),
            writer: Mutex::new(None),
        });
        *peer.weak_self.lock().expect(LOCK_POISONED) = Arc::downgrade(&peer);
        peer
    }

    /// The identity this session was constructed with.
    pub fn meta(&self) -> &MetaAddr {
        &self.meta
    }

    /// Register the event handler. Must happen before `connect`; replacing
    /// the handler mid-session is not supported.
    pub fn set_handler(&self, handler: Arc<dyn PeerHandler>) {
        *self.handler.lock().expect(LOCK_POISONED) = handler;
    }

    /// Record the wallet's creation time, so remote peers can be told which
    /// blocks predate every key and can be bloom-skipped.
    pub fn set_earliest_key_time(&self, earliest_key_time: u32) {
        self.lock_state().earliest_key_time = earliest_key_time;
    }

    /// The configured wallet creation time.
    pub fn earliest_key_time(&self) -> u32 {
        self.lock_state().earliest_key_time
    }

    /// Update the local best block height. Advertised in our `version`
    /// message and used to detect tarpit nodes.
    pub fn set_current_block_height(&self, current_block_height: u32) {
        self.lock_state().current_block_height = current_block_height;
    }

    /// Current connection status.
    pub fn status(&self) -> PeerStatus {
        self.lock_state().status.0
    }

    /// Open the connection and start the handshake. No-op unless the peer
    /// is disconnected.
    pub fn connect(&self) {
        let this = match self.weak_self.lock().expect(LOCK_POISONED).upgrade() {
            Some(this) => this,
            None => return,
        };
        {
            let mut state = self.lock_state();
            if state.status.0 != PeerStatus::Disconnected {
                debug!("connect ignored, session already active");
                return;
            }
            state.reset_session();
            state.status = Status(PeerStatus::Connecting);
        }
        let spawned = thread::Builder::new()
            .name(format!("peer-{}", self.meta))
            .spawn(move || this.run());
        if let Err(err) = spawned {
            error!(%err, "failed to spawn peer session thread");
            self.finish(DisconnectReason::NetworkUnreachable);
        }
    }

    /// Close the connection. Idempotent; the `disconnected` event still
    /// fires exactly once, with [`DisconnectReason::Orderly`].
    pub fn disconnect(&self) {
        self.disconnect_with(DisconnectReason::Orderly);
    }

    /// (Re)arm a one-shot disconnect deadline, or cancel it with `None`.
    /// On expiry the session ends with [`DisconnectReason::TimedOut`].
    /// Useful as a sync timeout.
    pub fn schedule_disconnect(&self, timeout: Option<Duration>) {
        self.lock_state().disconnect_deadline = timeout.map(|t| Instant::now() + t);
    }

    /// Mark the bloom filter stale. While set, the session stops
    /// requesting filtered blocks (their matches would be incomplete);
    /// [`send_filterload`](Peer::send_filterload) clears it.
    pub fn set_needs_filter_update(&self, needs_filter_update: bool) {
        self.lock_state().needs_filter_update = needs_filter_update;
    }

    /// Display name of the peer address.
    pub fn host(&self) -> String {
        self.meta.host()
    }

    /// Connected peer version number, or 0 before the handshake.
    pub fn version(&self) -> u32 {
        self.lock_state()
            .remote
            .as_ref()
            .map(|r| r.version.0)
            .unwrap_or(0)
    }

    /// Connected peer user agent string.
    pub fn user_agent(&self) -> String {
        self.lock_state()
            .remote
            .as_ref()
            .map(|r| r.user_agent.clone())
            .unwrap_or_default()
    }

    /// Best block height reported by the connected peer.
    pub fn last_block(&self) -> u32 {
        self.lock_state()
            .remote
            .as_ref()
            .map(|r| r.last_block)
            .unwrap_or(0)
    }

    /// Minimum fee rate the peer will accept, from `feefilter`.
    pub fn fee_per_kb(&self) -> u64 {
        self.lock_state().fee_per_kb
    }

    /// Smoothed ping round-trip time in seconds, if any pong has arrived.
    pub fn ping_time(&self) -> Option<f64> {
        self.lock_state().ping_rtt
    }

    /// Send a protocol message to the peer.
    ///
    /// The typed `send_*` helpers cover the wallet's normal traffic; this
    /// entry point exists for anything else. Errors close the session.
    pub fn send(&self, message: Message) {
        let mut encoder = Codec::builder()
            .for_magic(self.magic)
            .with_label(self.meta.to_string())
            .finish();
        let mut frame = BytesMut::new();
        if let Err(err) = encoder.encode(message, &mut frame) {
            warn!(%err, "failed to encode outbound message");
            return;
        }
        let write_result = {
            let mut writer = self.writer.lock().expect(LOCK_POISONED);
            match writer.as_mut() {
                Some(stream) => stream.write_all(&frame).map(|_| true),
                None => Ok(false),
            }
        };
        match write_result {
            Ok(true) => {}
            Ok(false) => trace!("not connected, dropping outbound message"),
            Err(err) => {
                info!(%err, "write failed");
                self.disconnect_with(DisconnectReason::ConnectionReset);
            }
        }
    }

    /// Announce the wallet's bloom filter (BIP37). Clears the
    /// needs-filter-update flag.
    pub fn send_filterload(
        &self,
        filter: Filter,
        hash_functions_count: u32,
        tweak: Tweak,
        flags: u8,
    ) {
        {
            let mut state = self.lock_state();
            state.sent_filter = true;
            state.needs_filter_update = false;
        }
        self.send(Message::FilterLoad {
            filter,
            hash_functions_count,
            tweak,
            flags,
        });
    }

    /// Request the remote's mempool (BIP35), filtered through our bloom
    /// filter. `known_tx_hashes` are excluded from the resulting inventory
    /// dialog. The completion fires exactly once: with `true` when the
    /// answering `inv` arrives, with `false` on timeout or disconnect.
    pub fn send_mempool<F>(&self, known_tx_hashes: &[transaction::Hash], completion: F)
    where
        F: FnOnce(bool) + Send + 'static,
    {
        {
            let mut state = self.lock_state();
            if state.status.0 != PeerStatus::Connected || state.pending_mempool.is_some() {
                drop(state);
                debug!("mempool request already pending or not connected");
                completion(false);
                return;
            }
            state.known_tx_hashes.extend(known_tx_hashes.iter().copied());
            state.pending_mempool = Some(PendingMempool {
                deadline: Instant::now() + constants::MEMPOOL_TIMEOUT,
                callback: Box::new(completion),
            });
        }
        self.send(Message::Mempool);
    }

    /// Request headers along a locator (BIP130-era sync). `hash_stop`
    /// `None` asks for as many as the remote will give.
    pub fn send_getheaders(&self, locators: Vec<block::Hash>, stop_hash: Option<block::Hash>) {
        self.send(Message::GetHeaders(
            crate::protocol::external::GetHeaders {
                block_locator_hashes: locators,
                stop_hash,
            },
        ));
    }

    /// Request block inventories along a locator.
    pub fn send_getblocks(&self, locators: Vec<block::Hash>, stop_hash: Option<block::Hash>) {
        self.send(Message::GetBlocks(crate::protocol::external::GetBlocks {
            block_locator_hashes: locators,
            stop_hash,
        }));
    }

    /// Announce transactions. Hashes this session already knows are
    /// skipped.
    pub fn send_inv(&self, tx_hashes: &[transaction::Hash]) {
        let mut fresh = Vec::with_capacity(tx_hashes.len());
        {
            let mut state = self.lock_state();
            for hash in tx_hashes {
                if state.known_tx_hashes.insert(*hash) {
                    fresh.push(*hash);
                }
            }
        }
        if fresh.is_empty() {
            return;
        }
        self.send(Message::Inv(
            fresh.into_iter().map(InventoryHash::Tx).collect(),
        ));
    }

    /// Request transactions and filtered blocks by hash.
    pub fn send_getdata(&self, tx_hashes: &[transaction::Hash], block_hashes: &[block::Hash]) {
        if tx_hashes.len() + block_hashes.len() > constants::MAX_GETDATA_HASHES {
            warn!(
                count = tx_hashes.len() + block_hashes.len(),
                "dropping getdata request, too many items"
            );
            return;
        }
        {
            let mut state = self.lock_state();
            state.requested_tx_hashes.extend(tx_hashes.iter().copied());
            for hash in block_hashes {
                if !state.requested_block_hashes.contains(hash) {
                    state.requested_block_hashes.push(*hash);
                }
            }
        }
        let items: Vec<InventoryHash> = tx_hashes
            .iter()
            .copied()
            .map(InventoryHash::Tx)
            .chain(block_hashes.iter().copied().map(InventoryHash::FilteredBlock))
            .collect();
        if !items.is_empty() {
            self.send(Message::GetData(items));
        }
    }

    /// Ask the remote for addresses of other peers.
    pub fn send_getaddr(&self) {
        self.send(Message::GetAddr);
    }

    /// Send a ping. The callback fires exactly once: with `true` when the
    /// matching pong arrives, with `false` on disconnect. Pongs must come
    /// back in send order; anything else is a protocol violation.
    pub fn send_ping<F>(&self, pong_callback: F)
    where
        F: FnOnce(bool) + Send + 'static,
    {
        let nonce = Nonce::default();
        {
            let mut state = self.lock_state();
            if state.status.0 != PeerStatus::Connected {
                drop(state);
                debug!("not connected, failing ping immediately");
                pong_callback(false);
                return;
            }
            state.pending_pings.push_back(PendingPing {
                nonce,
                sent_at: Instant::now(),
                callback: Box::new(pong_callback),
            });
        }
        self.send(Message::Ping(nonce));
    }

    /// Re-request every filtered block from `from_block` onward, dropping
    /// the request log before it. Used after a bloom filter update to pick
    /// up transactions the stale filter missed.
    pub fn rerequest_blocks(&self, from_block: block::Hash) {
        let to_request: Vec<block::Hash> = {
            let mut state = self.lock_state();
            match state
                .requested_block_hashes
                .iter()
                .position(|hash| *hash == from_block)
            {
                Some(index) => {
                    state.requested_block_hashes.drain(..index);
                    state.requested_block_hashes.clone()
                }
                None => Vec::new(),
            }
        };
        if to_request.is_empty() {
            return;
        }
        debug!(count = to_request.len(), "re-requesting filtered blocks");
        self.send(Message::GetData(
            to_request
                .into_iter()
                .map(InventoryHash::FilteredBlock)
                .collect(),
        ));
        self.send_batch_sentinel();
    }

    // ======== Session internals ========

    fn lock_state(&self) -> MutexGuard<'_, State> {
        self.state.lock().expect(LOCK_POISONED)
    }

    fn handler(&self) -> Arc<dyn PeerHandler> {
        self.handler.lock().expect(LOCK_POISONED).clone()
    }

    fn disconnect_with(&self, reason: DisconnectReason) {
        {
            let mut state = self.lock_state();
            if state.status.0 == PeerStatus::Disconnected {
                return;
            }
            if state.close_reason.is_none() {
                state.close_reason = Some(reason);
            }
        }
        // Wake the session thread out of its blocking read.
        let writer = self.writer.lock().expect(LOCK_POISONED);
        if let Some(stream) = writer.as_ref() {
            stream.shutdown(Shutdown::Both).ok();
        }
    }

    /// A `getdata` for a transaction that cannot exist; the remote's
    /// `notfound` answer marks the end of the preceding block batch.
    fn send_batch_sentinel(&self) {
        self.send(Message::GetData(vec![InventoryHash::batch_sentinel()]));
    }

    fn run(self: Arc<Self>) {
        let span = tracing::info_span!("peer", addr = %self.meta);
        let _entered = span.enter();
        let reason = self.session();
        self.finish(reason);
        self.handler().thread_cleanup(&self);
    }

    /// The session thread body: connect, handshake, read loop, timers.
    /// Returns why the session ended.
    fn session(&self) -> DisconnectReason {
        let handler = self.handler();
        if !handler.network_is_reachable(self) {
            info!("network is not reachable, aborting connect");
            return DisconnectReason::NetworkUnreachable;
        }

        debug!("connecting");
        let mut stream = match TcpStream::connect_timeout(&self.meta.addr, constants::CONNECT_TIMEOUT)
        {
            Ok(stream) => stream,
            Err(err) => {
                info!(%err, "connect failed");
                return DisconnectReason::from_io(&err);
            }
        };
        stream.set_nodelay(true).ok();
        if stream
            .set_read_timeout(Some(constants::READ_POLL_INTERVAL))
            .is_err()
        {
            return DisconnectReason::ConnectionReset;
        }
        match stream.try_clone() {
            Ok(write_half) => {
                *self.writer.lock().expect(LOCK_POISONED) = Some(write_half);
            }
            Err(err) => {
                info!(%err, "failed to clone socket");
                return DisconnectReason::ConnectionReset;
            }
        }

        let local_nonce = Nonce::default();
        let best_block = {
            let mut state = self.lock_state();
            state.local_nonce = Some(local_nonce);
            block::Height(state.current_block_height)
        };
        // Services 0: we serve nothing. Relay off: we want only
        // filter-matched transactions (BIP37).
        let unspecified = SocketAddr::from((Ipv6Addr::UNSPECIFIED, 0));
        self.send(Message::Version(Version::new(
            constants::CURRENT_VERSION,
            self.meta.addr,
            self.meta.services,
            PeerServices::empty(),
            unspecified,
            local_nonce,
            constants::USER_AGENT.to_owned(),
            best_block,
            false,
        )));

        let handshake_deadline = Instant::now() + constants::HANDSHAKE_TIMEOUT;
        let mut codec = Codec::builder()
            .for_magic(self.magic)
            .with_label(self.meta.to_string())
            .finish();
        let mut buffer = BytesMut::with_capacity(8 * 1024);
        let mut chunk = [0u8; 8 * 1024];
        let mut last_recv = Instant::now();

        loop {
            if let Some(reason) = self.lock_state().close_reason.take() {
                return reason;
            }

            match stream.read(&mut chunk) {
                Ok(0) => {
                    // A remote that advertises NODE_BLOOM and hangs up
                    // right after our filterload is refusing to serve
                    // filtered blocks.
                    let mut state = self.lock_state();
                    if let Some(reason) = state.close_reason.take() {
                        return reason;
                    }
                    let refused_filter = state.sent_filter
                        && state
                            .remote
                            .as_ref()
                            .map(|r| r.services.contains(PeerServices::NODE_BLOOM))
                            .unwrap_or(false);
                    info!(refused_filter, "remote closed the connection");
                    return if refused_filter {
                        DisconnectReason::Misbehaving
                    } else {
                        DisconnectReason::ConnectionReset
                    };
                }
                Ok(n) => {
                    last_recv = Instant::now();
                    buffer.extend_from_slice(&chunk[..n]);
                    loop {
                        match codec.decode(&mut buffer) {
                            Ok(Some(message)) => {
                                if let Some(reason) = self.handle_message(message) {
                                    return reason;
                                }
                            }
                            Ok(None) => break,
                            Err(err) => {
                                warn!(%err, "dropping peer: malformed message");
                                return DisconnectReason::Protocol;
                            }
                        }
                    }
                }
                Err(ref err)
                    if err.kind() == io::ErrorKind::WouldBlock
                        || err.kind() == io::ErrorKind::TimedOut =>
                {
                    // Read timeout; just fall through to the deadline
                    // checks.
                }
                Err(err) => {
                    if let Some(reason) = self.lock_state().close_reason.take() {
                        return reason;
                    }
                    info!(%err, "socket error");
                    return DisconnectReason::from_io(&err);
                }
            }

            let now = Instant::now();
            {
                let state = self.lock_state();
                if state
                    .disconnect_deadline
                    .map(|deadline| now >= deadline)
                    .unwrap_or(false)
                {
                    info!("scheduled disconnect deadline reached");
                    return DisconnectReason::TimedOut;
                }
                if state.status.0 != PeerStatus::Connected && now >= handshake_deadline {
                    info!("handshake timed out");
                    return DisconnectReason::TimedOut;
                }
            }

            let expired_mempool = {
                let mut state = self.lock_state();
                if state
                    .pending_mempool
                    .as_ref()
                    .map(|pending| now >= pending.deadline)
                    .unwrap_or(false)
                {
                    state.pending_mempool.take()
                } else {
                    None
                }
            };
            if let Some(pending) = expired_mempool {
                debug!("mempool request timed out");
                (pending.callback)(false);
            }

            let send_keepalive = {
                let state = self.lock_state();
                if let Some(oldest) = state.pending_pings.front() {
                    let timeout = constants::PING_TIMEOUT
                        + Duration::from_secs_f64(state.ping_rtt.unwrap_or(0.0));
                    if now.duration_since(oldest.sent_at) >= timeout {
                        info!("ping timed out");
                        return DisconnectReason::TimedOut;
                    }
                    false
                } else {
                    state.status.0 == PeerStatus::Connected
                        && now.duration_since(last_recv) >= constants::IDLE_INTERVAL
                }
            };
            if send_keepalive {
                debug!("idle, sending keepalive ping");
                self.send_ping(|_success| {});
            }
        }
    }

    /// Tear the session down: flush pending callbacks with failure, fire
    /// `disconnected` exactly once, release the socket.
    fn finish(&self, reason: DisconnectReason) {
        let (pings, mempool) = {
            let mut state = self.lock_state();
            state.status = Status(PeerStatus::Disconnected);
            state.close_reason = None;
            state.disconnect_deadline = None;
            (
                std::mem::take(&mut state.pending_pings),
                state.pending_mempool.take(),
            )
        };
        {
            let mut writer = self.writer.lock().expect(LOCK_POISONED);
            if let Some(stream) = writer.take() {
                stream.shutdown(Shutdown::Both).ok();
            }
        }
        for ping in pings {
            (ping.callback)(false);
        }
        if let Some(pending) = mempool {
            (pending.callback)(false);
        }
        info!(%reason, "disconnected");
        self.handler().disconnected(self, reason);
    }

    // ======== Message dispatch ========

    /// Handle one received message. `Some(reason)` ends the session.
    fn handle_message(&self, message: Message) -> Option<DisconnectReason> {
        let status = self.status();
        match message {
            Message::Version(version) => self.handle_version(version),
            Message::Verack => self.handle_verack(),
            // No protocol event may reach the handler before the handshake
            // completes.
            other if status != PeerStatus::Connected => {
                debug!(msg = %other, "dropping message received before handshake completed");
                None
            }
            Message::Addr(addrs) => {
                debug!(count = addrs.len(), "got addr");
                self.handler().relayed_peers(self, &addrs);
                None
            }
            Message::Inv(items) => self.handle_inv(items),
            Message::Tx(tx) => self.handle_tx(tx),
            Message::Headers(headers) => self.handle_headers(headers),
            Message::MerkleBlock(block) => self.handle_merkle_block(block),
            Message::GetData(items) => self.handle_getdata(items),
            Message::NotFound(items) => self.handle_notfound(items),
            Message::Ping(nonce) => {
                self.send(Message::Pong(nonce));
                None
            }
            Message::Pong(nonce) => self.handle_pong(nonce),
            Message::Reject {
                message: rejected_command,
                ccode,
                reason,
                data,
            } => self.handle_reject(rejected_command, ccode, reason, data),
            Message::FeeFilter(fee_per_kb) => {
                debug!(fee_per_kb, "got feefilter");
                self.lock_state().fee_per_kb = fee_per_kb;
                self.handler().set_fee_per_kb(self, fee_per_kb);
                None
            }
            Message::Unknown { command } => {
                debug!(?command, "ignoring message with unknown command");
                None
            }
            // An SPV leecher serves no data and never requests full
            // blocks; these are valid protocol but nothing to us.
            other => {
                debug!(msg = %other, "ignoring message type we don't serve");
                None
            }
        }
    }

    fn handle_version(&self, version: Version) -> Option<DisconnectReason> {
        let mut state = self.lock_state();
        if state.remote.is_some() {
            debug!("ignoring duplicate version message");
            return None;
        }
        if version.version < constants::MIN_PEER_VERSION {
            info!(
                version = version.version.0,
                "dropping peer, protocol version below minimum"
            );
            return Some(DisconnectReason::Protocol);
        }
        if Some(version.nonce) == state.local_nonce {
            info!("dropping connection to self");
            return Some(DisconnectReason::Protocol);
        }
        let our_height = state.current_block_height;
        if our_height > version.best_block.0
            && our_height - version.best_block.0 > constants::STUCK_PEER_HEIGHT_SLACK
        {
            info!(
                our_height,
                their_height = version.best_block.0,
                "dropping tarpit node"
            );
            return Some(DisconnectReason::Misbehaving);
        }
        info!(
            version = version.version.0,
            user_agent = %version.user_agent,
            services = ?version.services,
            last_block = version.best_block.0,
            "got version"
        );
        state.remote = Some(RemoteInfo {
            version: version.version,
            services: version.services,
            user_agent: version.user_agent,
            last_block: version.best_block.0,
        });
        drop(state);
        self.send(Message::Verack);
        self.maybe_complete_handshake();
        None
    }

    fn handle_verack(&self) -> Option<DisconnectReason> {
        {
            let mut state = self.lock_state();
            if state.got_verack {
                debug!("ignoring duplicate verack");
                return None;
            }
            state.got_verack = true;
        }
        self.maybe_complete_handshake();
        None
    }

    fn maybe_complete_handshake(&self) {
        let completed = {
            let mut state = self.lock_state();
            if state.status.0 == PeerStatus::Connecting
                && state.got_verack
                && state.remote.is_some()
            {
                state.status = Status(PeerStatus::Connected);
                true
            } else {
                false
            }
        };
        if completed {
            info!("handshake complete");
            self.handler().connected(self);
        }
    }

    fn handle_inv(&self, items: Vec<InventoryHash>) -> Option<DisconnectReason> {
        if items.len() > constants::MAX_GETDATA_HASHES {
            debug!(count = items.len(), "dropping inv with too many items");
            return None;
        }
        debug!(count = items.len(), "got inv");

        // An inv is the answer to an outstanding mempool request.
        let completed_mempool = self.lock_state().pending_mempool.take();
        if let Some(pending) = completed_mempool {
            (pending.callback)(true);
        }

        let mut already_known = Vec::new();
        let mut request = Vec::new();
        let mut fresh_blocks = Vec::new();
        {
            let mut state = self.lock_state();
            for item in &items {
                if let Some(hash) = item.tx_hash() {
                    if state.known_tx_hashes.contains(&hash) {
                        already_known.push(hash);
                    } else {
                        state.known_tx_hashes.insert(hash);
                        state.requested_tx_hashes.insert(hash);
                        request.push(*item);
                    }
                } else if let Some(hash) = item.block_hash() {
                    if !state.requested_block_hashes.contains(&hash) {
                        fresh_blocks.push(hash);
                        // Blocks are only ever fetched in filtered form.
                        request.push(item.as_download_request());
                    }
                }
            }
            if state.needs_filter_update && !fresh_blocks.is_empty() {
                // A stale filter would miss wallet transactions in these
                // blocks; the peer-manager reloads the filter and walks the
                // chain again from its last processed block.
                debug!(
                    count = fresh_blocks.len(),
                    "filter is stale, deferring block requests"
                );
                request.retain(|item| item.block_hash().is_none());
                fresh_blocks.clear();
            }
            state
                .requested_block_hashes
                .extend(fresh_blocks.iter().copied());
        }

        // Announcements of transactions this session already knows, in inv
        // order.
        let handler = self.handler();
        for hash in already_known {
            handler.has_tx(self, hash);
        }

        let requested_blocks = !fresh_blocks.is_empty();
        if !request.is_empty() {
            self.send(Message::GetData(request));
        }
        if requested_blocks {
            self.send_batch_sentinel();
        }
        None
    }

    fn handle_tx(&self, tx: transaction::Transaction) -> Option<DisconnectReason> {
        let hash = tx.hash();
        debug!(%hash, "got tx");
        {
            let mut state = self.lock_state();
            state.requested_tx_hashes.remove(&hash);
            state.known_tx_hashes.insert(hash);
        }
        self.handler().relayed_tx(self, tx);
        None
    }

    fn handle_headers(&self, headers: Vec<block::CountedHeader>) -> Option<DisconnectReason> {
        debug!(count = headers.len(), "got headers");
        let handler = self.handler();
        for counted in headers {
            // Headers-only delivery: a block with no transactions.
            handler.relayed_block(
                self,
                MerkleBlock {
                    block_header: counted.header,
                    transaction_count: 0,
                    hashes: Vec::new(),
                    flags: Vec::new(),
                },
            );
        }
        None
    }

    fn handle_merkle_block(&self, block: MerkleBlock) -> Option<DisconnectReason> {
        // A merkleblock whose partial tree doesn't prove what it claims is
        // an attack, not noise.
        if let Err(err) = block.extracted_hashes() {
            warn!(%err, "dropping peer: invalid merkleblock");
            return Some(DisconnectReason::Protocol);
        }
        debug!(hash = %block.hash(), "got merkleblock");
        self.handler().relayed_block(self, block);
        None
    }

    fn handle_getdata(&self, items: Vec<InventoryHash>) -> Option<DisconnectReason> {
        debug!(count = items.len(), "got getdata");
        let handler = self.handler();
        let mut not_found = Vec::new();
        for item in items {
            match item.tx_hash().and_then(|hash| handler.requested_tx(self, hash)) {
                Some(tx) => self.send(Message::Tx(tx)),
                None => not_found.push(item),
            }
        }
        if !not_found.is_empty() {
            self.send(Message::NotFound(not_found));
        }
        None
    }

    fn handle_notfound(&self, items: Vec<InventoryHash>) -> Option<DisconnectReason> {
        if items.iter().any(InventoryHash::is_batch_sentinel) {
            // Our own batch-end sentinel coming back.
            debug!("block batch complete");
        }
        let missing = SplitInventory::from_items(&items);
        if missing.is_empty() {
            return None;
        }
        {
            let mut state = self.lock_state();
            for hash in &missing.tx_hashes {
                state.requested_tx_hashes.remove(hash);
                // Forget it entirely so a later inv can re-announce it.
                state.known_tx_hashes.remove(hash);
            }
            for hash in &missing.block_hashes {
                state.requested_block_hashes.retain(|h| h != hash);
            }
        }
        debug!(
            txs = missing.tx_hashes.len(),
            blocks = missing.block_hashes.len(),
            "got notfound"
        );
        self.handler()
            .notfound(self, &missing.tx_hashes, &missing.block_hashes);
        None
    }

    fn handle_pong(&self, nonce: Nonce) -> Option<DisconnectReason> {
        let (callback, rtt) = {
            let mut state = self.lock_state();
            match state.pending_pings.pop_front() {
                None => {
                    info!("dropping peer: pong without a pending ping");
                    return Some(DisconnectReason::Protocol);
                }
                Some(pending) if pending.nonce != nonce => {
                    info!("dropping peer: pong nonce mismatch");
                    return Some(DisconnectReason::Protocol);
                }
                Some(pending) => {
                    let rtt = pending.sent_at.elapsed().as_secs_f64();
                    state.ping_rtt = Some(match state.ping_rtt {
                        Some(old) => {
                            old * (1.0 - constants::PING_RTT_ALPHA)
                                + rtt * constants::PING_RTT_ALPHA
                        }
                        None => rtt,
                    });
                    (pending.callback, rtt)
                }
            }
        };
        trace!(rtt, "got pong");
        callback(true);
        None
    }

    fn handle_reject(
        &self,
        rejected_command: String,
        ccode: RejectReason,
        reason: String,
        data: Option<[u8; 32]>,
    ) -> Option<DisconnectReason> {
        warn!(
            command = %rejected_command,
            code = ?ccode,
            reason = %reason,
            "message rejected by peer"
        );
        if rejected_command == "filterload" {
            let advertises_bloom = self
                .lock_state()
                .remote
                .as_ref()
                .map(|r| r.services.contains(PeerServices::NODE_BLOOM))
                .unwrap_or(false);
            if advertises_bloom {
                // Advertising NODE_BLOOM and rejecting filterload makes the
                // peer useless to an SPV wallet.
                return Some(DisconnectReason::Misbehaving);
            }
        }
        if rejected_command == "tx" {
            if let Some(data) = data {
                self.handler()
                    .rejected_tx(self, transaction::Hash(data), ccode);
            }
        }
        None
    }
}
