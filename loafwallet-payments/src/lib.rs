//! BIP70/BIP75 payment protocol codec for the loafwallet SPV core.
//!
//! [BIP70] defines signed payment requests a merchant serves over HTTP;
//! [BIP75] adds an invoice-request handshake and end-to-end encryption so
//! two wallets can run the protocol through an untrusted intermediary.
//! This crate is the message layer only: canonical serialization and
//! parsing, request digests and ECDSA signatures, X.509 certificate-chain
//! extraction, and the ECIES-style encryption of protocol messages.
//! Everything here is purely functional and reentrant; HTTP transport and
//! certificate-chain validation belong to the embedding application.
//!
//! Serialization is deterministic: fields are emitted in tag-ascending
//! order and default-valued optional fields are omitted, so
//! `parse(serialize(x)) == x` and `serialize` is byte-stable across runs.
//!
//! [BIP70]: https://github.com/bitcoin/bips/blob/master/bip-0070.mediawiki
//! [BIP75]: https://github.com/bitcoin/bips/blob/master/bip-0075.mediawiki

mod bip75;
mod crypto;
mod error;
mod payment;
mod pki;
pub mod proto;
mod request;

pub use bip75::{
    EncryptedProtocolMessage, InvoiceRequest, MessageType, ProtocolMessage, Role,
};
pub use error::ProtocolError;
pub use payment::{Payment, PaymentAck};
pub use pki::{PkiType, X509Certificates};
pub use request::{Output, PaymentDetails, PaymentRequest};

/// Content-Type of a serialized [`PaymentRequest`] served over HTTP.
pub const PAYMENT_REQUEST_MIME_TYPE: &str = "application/bitcoin-paymentrequest";
/// Content-Type of a serialized [`Payment`] POSTed to the payment URL.
pub const PAYMENT_MIME_TYPE: &str = "application/bitcoin-payment";
/// Content-Type of the serialized [`PaymentAck`] answering a payment.
pub const PAYMENT_ACK_MIME_TYPE: &str = "application/bitcoin-paymentack";
/// Content-Type of a serialized [`ProtocolMessage`] (BIP75).
pub const PAYMENT_PROTOCOL_MESSAGE_MIME_TYPE: &str =
    "application/bitcoin-paymentprotocol-message";
/// Content-Type of a serialized [`EncryptedProtocolMessage`] (BIP75).
pub const ENCRYPTED_PAYMENT_PROTOCOL_MESSAGE_MIME_TYPE: &str =
    "application/bitcoin-encrypted-paymentprotocol-message";
