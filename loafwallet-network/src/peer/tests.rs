//! Peer state machine tests against a scripted remote.
//!
//! Each test binds a local listener and plays the remote side of the
//! protocol on the test thread, while the peer session runs on its own
//! thread as in production.

use std::collections::HashMap;
use std::io::{Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use chrono::{TimeZone, Utc};
use tokio_util::codec::{Decoder, Encoder};

use loafwallet_chain::{block, transaction};

use super::*;
use crate::constants;
use crate::meta_addr::MetaAddr;
use crate::protocol::external::{
    types::{Magic, Nonce, PeerServices, ProtocolVersion},
    Codec, InventoryHash, MerkleBlock, Message, RejectReason, Version,
};

const EVENT_TIMEOUT: Duration = Duration::from_secs(10);

fn init() {
    use tracing_subscriber::fmt;
    fmt().with_test_writer().try_init().ok();
}

#[derive(Debug, Clone, PartialEq)]
enum Event {
    Connected,
    Disconnected(DisconnectReason),
    RelayedPeers(usize),
    HasTx(transaction::Hash),
    RelayedTx(transaction::Hash),
    RejectedTx(transaction::Hash, RejectReason),
    RelayedBlock(block::Hash, u32),
    NotFound(Vec<transaction::Hash>, Vec<block::Hash>),
    FeePerKb(u64),
}

/// Forwards every handler event into a channel the test thread drains.
struct ChannelHandler {
    events: Mutex<Sender<Event>>,
    // Transactions `requested_tx` will serve.
    serve: Mutex<HashMap<transaction::Hash, transaction::Transaction>>,
}

impl ChannelHandler {
    fn new() -> (Arc<ChannelHandler>, Receiver<Event>) {
        let (sender, receiver) = channel();
        (
            Arc::new(ChannelHandler {
                events: Mutex::new(sender),
                serve: Mutex::new(HashMap::new()),
            }),
            receiver,
        )
    }

    fn emit(&self, event: Event) {
        self.events.lock().unwrap().send(event).ok();
    }

    fn serve_tx(&self, tx: transaction::Transaction) {
        self.serve.lock().unwrap().insert(tx.hash(), tx);
    }
}

impl PeerHandler for ChannelHandler {
    fn connected(&self, _peer: &Peer) {
        self.emit(Event::Connected);
    }

    fn disconnected(&self, _peer: &Peer, reason: DisconnectReason) {
        self.emit(Event::Disconnected(reason));
    }

    fn relayed_peers(&self, _peer: &Peer, peers: &[MetaAddr]) {
        self.emit(Event::RelayedPeers(peers.len()));
    }

    fn relayed_tx(&self, _peer: &Peer, tx: transaction::Transaction) {
        self.emit(Event::RelayedTx(tx.hash()));
    }

    fn has_tx(&self, _peer: &Peer, hash: transaction::Hash) {
        self.emit(Event::HasTx(hash));
    }

    fn rejected_tx(&self, _peer: &Peer, hash: transaction::Hash, reason: RejectReason) {
        self.emit(Event::RejectedTx(hash, reason));
    }

    fn relayed_block(&self, _peer: &Peer, block: MerkleBlock) {
        self.emit(Event::RelayedBlock(block.hash(), block.transaction_count));
    }

    fn notfound(
        &self,
        _peer: &Peer,
        tx_hashes: &[transaction::Hash],
        block_hashes: &[block::Hash],
    ) {
        self.emit(Event::NotFound(tx_hashes.to_vec(), block_hashes.to_vec()));
    }

    fn set_fee_per_kb(&self, _peer: &Peer, fee_per_kb: u64) {
        self.emit(Event::FeePerKb(fee_per_kb));
    }

    fn requested_tx(
        &self,
        _peer: &Peer,
        hash: transaction::Hash,
    ) -> Option<transaction::Transaction> {
        self.serve.lock().unwrap().get(&hash).cloned()
    }
}

/// The scripted remote end of a peer connection.
struct Remote {
    stream: TcpStream,
    codec: Codec,
    buffer: BytesMut,
}

impl Remote {
    fn accept(listener: &TcpListener) -> Remote {
        let (stream, _) = listener.accept().expect("remote accept failed");
        stream
            .set_read_timeout(Some(Duration::from_secs(5)))
            .unwrap();
        Remote {
            stream,
            codec: Codec::builder().for_magic(Magic::BITCOIN).finish(),
            buffer: BytesMut::new(),
        }
    }

    fn read_message(&mut self) -> Message {
        let mut chunk = [0u8; 4096];
        loop {
            if let Some(message) = self.codec.decode(&mut self.buffer).unwrap() {
                return message;
            }
            let n = self
                .stream
                .read(&mut chunk)
                .expect("remote timed out waiting for a message");
            assert!(n > 0, "peer closed the connection mid-script");
            self.buffer.extend_from_slice(&chunk[..n]);
        }
    }

    fn send(&mut self, message: Message) {
        let mut frame = BytesMut::new();
        self.codec.encode(message, &mut frame).unwrap();
        self.stream.write_all(&frame).unwrap();
    }

    /// Play the remote's half of a successful handshake, returning the
    /// version message the peer sent.
    fn handshake(&mut self, services: PeerServices, best_block: u32) -> Version {
        let peer_version = match self.read_message() {
            Message::Version(version) => version,
            other => panic!("expected version, got {}", other),
        };
        self.send(remote_version(Nonce(0x5151_5151), services, best_block));
        self.send(Message::Verack);
        match self.read_message() {
            Message::Verack => {}
            other => panic!("expected verack, got {}", other),
        }
        peer_version
    }
}

fn remote_version(nonce: Nonce, services: PeerServices, best_block: u32) -> Message {
    Message::Version(Version::new(
        ProtocolVersion(70002),
        "127.0.0.1:0".parse().unwrap(),
        PeerServices::empty(),
        services,
        "127.0.0.1:0".parse().unwrap(),
        nonce,
        "/Satoshi:0.16.3/".to_owned(),
        block::Height(best_block),
        true,
    ))
}

fn peer_for(addr: SocketAddr) -> (Arc<Peer>, Receiver<Event>, Arc<ChannelHandler>) {
    let peer = Peer::new(
        MetaAddr::new(addr, PeerServices::NODE_NETWORK),
        Magic::BITCOIN,
    );
    let (handler, events) = ChannelHandler::new();
    peer.set_handler(handler.clone());
    (peer, events, handler)
}

fn expect_event(events: &Receiver<Event>) -> Event {
    events
        .recv_timeout(EVENT_TIMEOUT)
        .expect("timed out waiting for a peer event")
}

fn test_header(seed: u8) -> block::Header {
    block::Header {
        version: 2,
        previous_block_hash: block::Hash([seed; 32]),
        merkle_root: block::merkle::Root([seed.wrapping_add(1); 32]),
        time: Utc.timestamp(1_433_865_600, 0),
        bits: 0x1d00_ffff,
        nonce: seed as u32,
    }
}

#[test]
fn handshake_completes_and_records_remote() {
    init();
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let (peer, events, _) = peer_for(listener.local_addr().unwrap());

    peer.connect();
    let mut remote = Remote::accept(&listener);
    let peer_version =
        remote.handshake(PeerServices::NODE_NETWORK | PeerServices::NODE_BLOOM, 0);

    assert_eq!(peer_version.user_agent, constants::USER_AGENT);
    assert_eq!(peer_version.version, constants::CURRENT_VERSION);
    assert!(!peer_version.relay, "a filtering wallet must send relay=false");

    assert_eq!(expect_event(&events), Event::Connected);
    assert_eq!(peer.status(), PeerStatus::Connected);
    assert_eq!(peer.version(), 70002);
    assert_eq!(peer.user_agent(), "/Satoshi:0.16.3/");
    assert_eq!(peer.last_block(), 0);

    peer.disconnect();
    assert_eq!(
        expect_event(&events),
        Event::Disconnected(DisconnectReason::Orderly)
    );
    assert_eq!(peer.status(), PeerStatus::Disconnected);
}

#[test]
fn connection_refused_is_reported() {
    init();
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let (peer, events, _) = peer_for(addr);
    peer.connect();
    assert_eq!(
        expect_event(&events),
        Event::Disconnected(DisconnectReason::ConnectionRefused)
    );
}

#[test]
fn obsolete_protocol_version_is_dropped() {
    init();
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let (peer, events, _) = peer_for(listener.local_addr().unwrap());

    peer.connect();
    let mut remote = Remote::accept(&listener);
    let _peer_version = remote.read_message();
    remote.send(Message::Version(Version::new(
        ProtocolVersion(60001),
        "127.0.0.1:0".parse().unwrap(),
        PeerServices::empty(),
        PeerServices::NODE_NETWORK,
        "127.0.0.1:0".parse().unwrap(),
        Nonce(7),
        "/old:0.1/".to_owned(),
        block::Height(0),
        true,
    )));

    assert_eq!(
        expect_event(&events),
        Event::Disconnected(DisconnectReason::Protocol)
    );
}

#[test]
fn self_connection_is_dropped() {
    init();
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let (peer, events, _) = peer_for(listener.local_addr().unwrap());

    peer.connect();
    let mut remote = Remote::accept(&listener);
    let peer_version = match remote.read_message() {
        Message::Version(version) => version,
        other => panic!("expected version, got {}", other),
    };
    // Echo the peer's own nonce back, as a connection to self would.
    remote.send(remote_version(
        peer_version.nonce,
        PeerServices::NODE_NETWORK,
        0,
    ));

    assert_eq!(
        expect_event(&events),
        Event::Disconnected(DisconnectReason::Protocol)
    );
}

#[test]
fn tarpit_peer_is_dropped_as_misbehaving() {
    init();
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let (peer, events, _) = peer_for(listener.local_addr().unwrap());
    peer.set_current_block_height(1000);

    peer.connect();
    let mut remote = Remote::accept(&listener);
    let _peer_version = remote.read_message();
    // More than 7 blocks behind our tip.
    remote.send(remote_version(Nonce(9), PeerServices::NODE_NETWORK, 900));

    assert_eq!(
        expect_event(&events),
        Event::Disconnected(DisconnectReason::Misbehaving)
    );
}

#[test]
fn no_protocol_events_before_connected() {
    init();
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let (peer, events, _) = peer_for(listener.local_addr().unwrap());

    peer.connect();
    let mut remote = Remote::accept(&listener);
    let _peer_version = remote.read_message();
    // An early inv must not reach the handler.
    remote.send(Message::Inv(vec![InventoryHash::Tx(transaction::Hash(
        [0xaa; 32],
    ))]));
    remote.send(remote_version(Nonce(9), PeerServices::NODE_NETWORK, 0));
    remote.send(Message::Verack);

    assert_eq!(expect_event(&events), Event::Connected);
}

#[test]
fn ping_pong_callbacks_fire_in_fifo_order() {
    init();
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let (peer, events, _) = peer_for(listener.local_addr().unwrap());

    peer.connect();
    let mut remote = Remote::accept(&listener);
    remote.handshake(PeerServices::NODE_NETWORK, 0);
    assert_eq!(expect_event(&events), Event::Connected);

    let (pongs, pong_results) = channel();
    let first = pongs.clone();
    peer.send_ping(move |success| first.send(("first", success)).unwrap());
    let second = pongs;
    peer.send_ping(move |success| second.send(("second", success)).unwrap());

    let nonce1 = match remote.read_message() {
        Message::Ping(nonce) => nonce,
        other => panic!("expected ping, got {}", other),
    };
    let nonce2 = match remote.read_message() {
        Message::Ping(nonce) => nonce,
        other => panic!("expected ping, got {}", other),
    };
    remote.send(Message::Pong(nonce1));
    remote.send(Message::Pong(nonce2));

    assert_eq!(pong_results.recv_timeout(EVENT_TIMEOUT).unwrap(), ("first", true));
    assert_eq!(pong_results.recv_timeout(EVENT_TIMEOUT).unwrap(), ("second", true));
    // RTT estimator has a sample now.
    assert!(peer.ping_time().is_some());
}

#[test]
fn mismatched_pong_is_a_protocol_violation() {
    init();
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let (peer, events, _) = peer_for(listener.local_addr().unwrap());

    peer.connect();
    let mut remote = Remote::accept(&listener);
    remote.handshake(PeerServices::NODE_NETWORK, 0);
    assert_eq!(expect_event(&events), Event::Connected);

    let (pongs, pong_results) = channel();
    peer.send_ping(move |success| pongs.send(success).unwrap());
    let nonce = match remote.read_message() {
        Message::Ping(nonce) => nonce,
        other => panic!("expected ping, got {}", other),
    };
    remote.send(Message::Pong(Nonce(nonce.0.wrapping_add(1))));

    assert_eq!(
        expect_event(&events),
        Event::Disconnected(DisconnectReason::Protocol)
    );
    // The orphaned callback is flushed with failure.
    assert_eq!(pong_results.recv_timeout(EVENT_TIMEOUT).unwrap(), false);
}

#[test]
fn inv_getdata_tx_relay_flow() {
    init();
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let (peer, events, _) = peer_for(listener.local_addr().unwrap());

    peer.connect();
    let mut remote = Remote::accept(&listener);
    remote.handshake(PeerServices::NODE_NETWORK, 0);
    assert_eq!(expect_event(&events), Event::Connected);

    let tx = transaction::Transaction::from_bytes(Bytes::from_static(&[
        0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x6a,
    ]));
    let hash = tx.hash();

    remote.send(Message::Inv(vec![InventoryHash::Tx(hash)]));
    match remote.read_message() {
        Message::GetData(items) => assert_eq!(items, vec![InventoryHash::Tx(hash)]),
        other => panic!("expected getdata, got {}", other),
    }
    remote.send(Message::Tx(tx));
    assert_eq!(expect_event(&events), Event::RelayedTx(hash));

    // A second announcement of the same tx is a has-tx notification, not a
    // new request.
    remote.send(Message::Inv(vec![InventoryHash::Tx(hash)]));
    assert_eq!(expect_event(&events), Event::HasTx(hash));
}

#[test]
fn block_inv_requests_filtered_blocks_with_sentinel() {
    init();
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let (peer, events, _) = peer_for(listener.local_addr().unwrap());

    peer.connect();
    let mut remote = Remote::accept(&listener);
    remote.handshake(PeerServices::NODE_NETWORK | PeerServices::NODE_BLOOM, 0);
    assert_eq!(expect_event(&events), Event::Connected);

    let block_hash = block::Hash([9; 32]);
    remote.send(Message::Inv(vec![InventoryHash::Block(block_hash)]));

    match remote.read_message() {
        Message::GetData(items) => {
            assert_eq!(items, vec![InventoryHash::FilteredBlock(block_hash)])
        }
        other => panic!("expected getdata, got {}", other),
    }
    // The end-of-batch sentinel: a getdata for a tx that cannot exist.
    match remote.read_message() {
        Message::GetData(items) => {
            assert_eq!(items, vec![InventoryHash::batch_sentinel()])
        }
        other => panic!("expected sentinel getdata, got {}", other),
    }

    // The sentinel's notfound answer is swallowed...
    remote.send(Message::NotFound(vec![InventoryHash::batch_sentinel()]));
    // ...but a real notfound is delivered, partitioned by type.
    remote.send(Message::NotFound(vec![InventoryHash::FilteredBlock(
        block_hash,
    )]));
    assert_eq!(
        expect_event(&events),
        Event::NotFound(vec![], vec![block_hash])
    );
}

#[test]
fn stale_filter_defers_block_requests() {
    init();
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let (peer, events, _) = peer_for(listener.local_addr().unwrap());

    peer.connect();
    let mut remote = Remote::accept(&listener);
    remote.handshake(PeerServices::NODE_NETWORK | PeerServices::NODE_BLOOM, 0);
    assert_eq!(expect_event(&events), Event::Connected);

    peer.set_needs_filter_update(true);
    remote.send(Message::Inv(vec![InventoryHash::Block(block::Hash(
        [9; 32],
    ))]));
    // No getdata may arrive; the next message the remote sees is the ping
    // we trigger below.
    peer.send_ping(|_| {});
    match remote.read_message() {
        Message::Ping(_) => {}
        other => panic!("expected only a ping, got {}", other),
    }
}

#[test]
fn getdata_is_served_from_the_handler() {
    init();
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let (peer, events, handler) = peer_for(listener.local_addr().unwrap());

    peer.connect();
    let mut remote = Remote::accept(&listener);
    remote.handshake(PeerServices::NODE_NETWORK, 0);
    assert_eq!(expect_event(&events), Event::Connected);

    let tx = transaction::Transaction::from_bytes(Bytes::from_static(&[0x02, 0x00, 0x00, 0x6a]));
    let have = tx.hash();
    let missing = transaction::Hash([0xee; 32]);
    handler.serve_tx(tx.clone());

    remote.send(Message::GetData(vec![
        InventoryHash::Tx(have),
        InventoryHash::Tx(missing),
    ]));
    match remote.read_message() {
        Message::Tx(served) => assert_eq!(served, tx),
        other => panic!("expected tx, got {}", other),
    }
    match remote.read_message() {
        Message::NotFound(items) => assert_eq!(items, vec![InventoryHash::Tx(missing)]),
        other => panic!("expected notfound, got {}", other),
    }
}

#[test]
fn headers_are_delivered_as_empty_blocks_in_order() {
    init();
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let (peer, events, _) = peer_for(listener.local_addr().unwrap());

    peer.connect();
    let mut remote = Remote::accept(&listener);
    remote.handshake(PeerServices::NODE_NETWORK, 0);
    assert_eq!(expect_event(&events), Event::Connected);

    let first = test_header(1);
    let second = test_header(2);
    remote.send(Message::Headers(vec![
        block::CountedHeader {
            header: first,
            transaction_count: 0,
        },
        block::CountedHeader {
            header: second,
            transaction_count: 0,
        },
    ]));

    assert_eq!(expect_event(&events), Event::RelayedBlock(first.hash(), 0));
    assert_eq!(expect_event(&events), Event::RelayedBlock(second.hash(), 0));
}

#[test]
fn valid_merkleblock_is_relayed_and_forged_one_disconnects() {
    init();
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let (peer, events, _) = peer_for(listener.local_addr().unwrap());

    peer.connect();
    let mut remote = Remote::accept(&listener);
    remote.handshake(PeerServices::NODE_NETWORK | PeerServices::NODE_BLOOM, 0);
    assert_eq!(expect_event(&events), Event::Connected);

    // One-transaction block whose root is the txid itself.
    let txid = [0x77u8; 32];
    let mut header = test_header(3);
    header.merkle_root = block::merkle::Root(txid);
    let valid = MerkleBlock {
        block_header: header,
        transaction_count: 1,
        hashes: vec![transaction::Hash(txid)],
        flags: vec![0x01],
    };
    remote.send(Message::MerkleBlock(valid.clone()));
    assert_eq!(
        expect_event(&events),
        Event::RelayedBlock(valid.hash(), 1)
    );

    // Same proof against the wrong root: the peer is lying.
    let mut forged = valid;
    forged.block_header.merkle_root = block::merkle::Root([0x00; 32]);
    remote.send(Message::MerkleBlock(forged));
    assert_eq!(
        expect_event(&events),
        Event::Disconnected(DisconnectReason::Protocol)
    );
}

#[test]
fn feefilter_and_reject_are_surfaced() {
    init();
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let (peer, events, _) = peer_for(listener.local_addr().unwrap());

    peer.connect();
    let mut remote = Remote::accept(&listener);
    remote.handshake(PeerServices::NODE_NETWORK, 0);
    assert_eq!(expect_event(&events), Event::Connected);

    remote.send(Message::FeeFilter(12_345));
    assert_eq!(expect_event(&events), Event::FeePerKb(12_345));
    assert_eq!(peer.fee_per_kb(), 12_345);

    let rejected = transaction::Hash([0x42; 32]);
    remote.send(Message::Reject {
        message: "tx".to_owned(),
        ccode: RejectReason::Dust,
        reason: "dust".to_owned(),
        data: Some(rejected.0),
    });
    assert_eq!(
        expect_event(&events),
        Event::RejectedTx(rejected, RejectReason::Dust)
    );
}

#[test]
fn addr_entries_are_relayed() {
    init();
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let (peer, events, _) = peer_for(listener.local_addr().unwrap());

    peer.connect();
    let mut remote = Remote::accept(&listener);
    remote.handshake(PeerServices::NODE_NETWORK, 0);
    assert_eq!(expect_event(&events), Event::Connected);

    remote.send(Message::Addr(vec![
        MetaAddr {
            addr: "198.51.100.1:8333".parse().unwrap(),
            services: PeerServices::NODE_NETWORK,
            last_seen: Utc.timestamp(1_573_680_222, 0),
            flags: 0,
        },
        MetaAddr {
            addr: "198.51.100.2:8333".parse().unwrap(),
            services: PeerServices::NODE_NETWORK | PeerServices::NODE_BLOOM,
            last_seen: Utc.timestamp(1_573_680_223, 0),
            flags: 0,
        },
    ]));
    assert_eq!(expect_event(&events), Event::RelayedPeers(2));
}

#[test]
fn mempool_completes_on_inv() {
    init();
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let (peer, events, _) = peer_for(listener.local_addr().unwrap());

    peer.connect();
    let mut remote = Remote::accept(&listener);
    remote.handshake(PeerServices::NODE_NETWORK, 0);
    assert_eq!(expect_event(&events), Event::Connected);

    let (done, completions) = channel();
    peer.send_mempool(&[], move |success| done.send(success).unwrap());
    match remote.read_message() {
        Message::Mempool => {}
        other => panic!("expected mempool, got {}", other),
    }
    remote.send(Message::Inv(vec![]));
    assert_eq!(completions.recv_timeout(EVENT_TIMEOUT).unwrap(), true);
}

#[test]
fn scheduled_disconnect_fires() {
    init();
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let (peer, events, _) = peer_for(listener.local_addr().unwrap());

    peer.connect();
    let mut remote = Remote::accept(&listener);
    remote.handshake(PeerServices::NODE_NETWORK, 0);
    assert_eq!(expect_event(&events), Event::Connected);

    peer.schedule_disconnect(Some(Duration::from_millis(200)));
    assert_eq!(
        expect_event(&events),
        Event::Disconnected(DisconnectReason::TimedOut)
    );
}

#[test]
fn scheduled_disconnect_can_be_cancelled() {
    init();
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let (peer, events, _) = peer_for(listener.local_addr().unwrap());

    peer.connect();
    let mut remote = Remote::accept(&listener);
    remote.handshake(PeerServices::NODE_NETWORK, 0);
    assert_eq!(expect_event(&events), Event::Connected);

    peer.schedule_disconnect(Some(Duration::from_millis(300)));
    peer.schedule_disconnect(None);
    std::thread::sleep(Duration::from_millis(1200));
    assert_eq!(peer.status(), PeerStatus::Connected);
    assert!(events.try_recv().is_err(), "no disconnect may have fired");
}
