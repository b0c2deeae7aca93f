use thiserror::Error;

use crate::proto;

/// Error associated with payment protocol parsing and cryptography.
///
/// Parse functions are fail-fast: the first structural or cryptographic
/// precondition failure aborts with one of these, and no partial value is
/// returned.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// The protobuf framing was truncated or malformed.
    #[error("malformed message: {0}")]
    Decode(#[from] proto::DecodeError),

    /// A field the BIP marks required was absent.
    #[error("missing required field `{0}`")]
    MissingField(&'static str),

    /// An enum field carried a value outside its domain.
    #[error("invalid {0} value")]
    InvalidEnum(&'static str),

    /// A certificate index was out of bounds.
    #[error("certificate index out of bounds")]
    CertIndex,

    /// Signing was requested but the pki type carries no signature.
    #[error("pki type carries no signature")]
    UnsignedPkiType,

    /// The supplied private key matches neither embedded party key.
    #[error("private key matches neither sender nor receiver")]
    WrongKey,

    /// The ciphertext MAC did not verify; the message was tampered with.
    #[error("ciphertext authentication failed")]
    Authentication,

    /// Authenticated ciphertext failed to decrypt (bad padding).
    #[error("decryption failed")]
    Decryption,

    /// An elliptic-curve operation failed (bad key or signature bytes).
    #[error("secp256k1: {0}")]
    Secp(#[from] secp256k1::Error),
}
