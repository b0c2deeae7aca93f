//! BIP75 extensions: invoice requests and the (encrypted) protocol message
//! envelope two wallets exchange over a store-and-forward server.
//!
//! This module only encodes, decodes, signs, verifies, encrypts, and
//! decrypts; transport is the embedding application's problem.

use bytes::Buf;
use secp256k1::{PublicKey, SecretKey};

use crate::crypto;
use crate::error::ProtocolError;
use crate::pki::PkiType;
use crate::proto;

/// What kind of payment protocol message an envelope carries.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum MessageType {
    Unknown,
    InvoiceRequest,
    Request,
    Payment,
    Ack,
}

impl MessageType {
    fn from_wire(value: u64) -> Option<MessageType> {
        Some(match value {
            0 => MessageType::Unknown,
            1 => MessageType::InvoiceRequest,
            2 => MessageType::Request,
            3 => MessageType::Payment,
            4 => MessageType::Ack,
            _ => return None,
        })
    }

    fn to_wire(self) -> u64 {
        match self {
            MessageType::Unknown => 0,
            MessageType::InvoiceRequest => 1,
            MessageType::Request => 2,
            MessageType::Payment => 3,
            MessageType::Ack => 4,
        }
    }
}

impl Default for MessageType {
    fn default() -> Self {
        MessageType::Unknown
    }
}

/// A customer's request to be sent a payment request (BIP75
/// `InvoiceRequest`).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InvoiceRequest {
    /// The customer's EC public key, identifying the exchange.
    pub sender_public_key: PublicKey,
    /// Requested amount in satoshis; zero lets the merchant pick.
    pub amount: u64,
    /// "none" or "x509+sha256"; the sha1 variant is not defined here.
    pub pki_type: PkiType,
    pub pki_data: Option<Vec<u8>>,
    /// Human-readable description of the invoice request for the receiver.
    pub memo: Option<String>,
    /// URL to notify when the encrypted payment request is ready.
    pub notify_url: Option<String>,
    pub signature: Option<Vec<u8>>,
}

impl InvoiceRequest {
    pub fn new(sender_public_key: PublicKey) -> InvoiceRequest {
        InvoiceRequest {
            sender_public_key,
            amount: 0,
            pki_type: PkiType::None,
            pki_data: None,
            memo: None,
            notify_url: None,
            signature: None,
        }
    }

    fn write_with_signature(&self, signature: Option<&[u8]>, buf: &mut Vec<u8>) {
        proto::write_bytes_field(1, &self.sender_public_key.serialize(), buf);
        if self.amount != 0 {
            proto::write_uint_field(2, self.amount, buf);
        }
        if self.pki_type != PkiType::None {
            proto::write_string_field(3, self.pki_type.as_str(), buf);
        }
        if let Some(pki_data) = &self.pki_data {
            proto::write_bytes_field(4, pki_data, buf);
        }
        if let Some(memo) = &self.memo {
            proto::write_string_field(5, memo, buf);
        }
        if let Some(notify_url) = &self.notify_url {
            proto::write_string_field(6, notify_url, buf);
        }
        if let Some(signature) = signature {
            proto::write_bytes_field(7, signature, buf);
        }
    }

    pub fn serialize(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        self.write_with_signature(self.signature.as_deref(), &mut buf);
        buf
    }

    pub fn parse(bytes: &[u8]) -> Result<InvoiceRequest, ProtocolError> {
        let mut buf = bytes;
        let mut sender_public_key = None;
        let mut amount = 0;
        let mut pki_type = PkiType::None;
        let mut pki_data = None;
        let mut memo = None;
        let mut notify_url = None;
        let mut signature = None;
        while buf.has_remaining() {
            let key = proto::read_key(&mut buf)?;
            match key.tag {
                1 => {
                    let raw = proto::expect_bytes(&key, &mut buf)?;
                    sender_public_key = Some(PublicKey::from_slice(&raw)?);
                }
                2 => amount = proto::expect_varint(&key, &mut buf)?,
                3 => {
                    let value = proto::expect_string(&key, &mut buf)?;
                    pki_type = match PkiType::from_wire(&value) {
                        // SHA-1 was never defined for invoice requests.
                        Some(PkiType::X509Sha1) | None => {
                            return Err(ProtocolError::InvalidEnum("pki_type"))
                        }
                        Some(pki_type) => pki_type,
                    };
                }
                4 => pki_data = Some(proto::expect_bytes(&key, &mut buf)?.to_vec()),
                5 => memo = Some(proto::expect_string(&key, &mut buf)?),
                6 => notify_url = Some(proto::expect_string(&key, &mut buf)?),
                7 => signature = Some(proto::expect_bytes(&key, &mut buf)?.to_vec()),
                _ => proto::skip_value(&key, &mut buf)?,
            }
        }
        Ok(InvoiceRequest {
            sender_public_key: sender_public_key
                .ok_or(ProtocolError::MissingField("sender_public_key"))?,
            amount,
            pki_type,
            pki_data,
            memo,
            notify_url,
            signature,
        })
    }

    /// The digest to sign or verify: the serialized request with a
    /// zero-length signature field. `None` when the pki type is "none".
    pub fn digest(&self) -> Option<Vec<u8>> {
        match self.pki_type {
            PkiType::None | PkiType::X509Sha1 => None,
            PkiType::X509Sha256 => {
                let mut buf = Vec::new();
                self.write_with_signature(Some(&[]), &mut buf);
                Some(crypto::sha256(&buf))
            }
        }
    }

    pub fn sign(&mut self, key: &SecretKey) -> Result<(), ProtocolError> {
        let digest = self.digest().ok_or(ProtocolError::UnsignedPkiType)?;
        self.signature = Some(crypto::sign_digest(&digest, key)?);
        Ok(())
    }

    pub fn verify(&self, key: &PublicKey) -> bool {
        let digest = match self.digest() {
            Some(digest) => digest,
            None => return false,
        };
        match &self.signature {
            Some(signature) => crypto::verify_digest(&digest, signature, key),
            None => false,
        }
    }
}

/// A cleartext payment protocol envelope (BIP75 `ProtocolMessage`).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProtocolMessage {
    pub msg_type: MessageType,
    /// The serialized inner message (an [`InvoiceRequest`],
    /// [`PaymentRequest`](crate::PaymentRequest), ...).
    pub message: Vec<u8>,
    pub status_code: Option<u64>,
    pub status_msg: Option<String>,
    /// Unique key identifying the whole exchange; by convention the
    /// SHA-256 of the opening invoice request.
    pub identifier: Option<Vec<u8>>,
}

impl ProtocolMessage {
    pub fn new(msg_type: MessageType, message: Vec<u8>) -> ProtocolMessage {
        ProtocolMessage {
            msg_type,
            message,
            status_code: None,
            status_msg: None,
            identifier: None,
        }
    }

    pub fn serialize(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        proto::write_uint_field(1, self.msg_type.to_wire(), &mut buf);
        proto::write_bytes_field(2, &self.message, &mut buf);
        if let Some(status_code) = self.status_code {
            proto::write_uint_field(3, status_code, &mut buf);
        }
        if let Some(status_msg) = &self.status_msg {
            proto::write_string_field(4, status_msg, &mut buf);
        }
        if let Some(identifier) = &self.identifier {
            proto::write_bytes_field(5, identifier, &mut buf);
        }
        buf
    }

    pub fn parse(bytes: &[u8]) -> Result<ProtocolMessage, ProtocolError> {
        let mut buf = bytes;
        let mut msg_type = None;
        let mut message = None;
        let mut status_code = None;
        let mut status_msg = None;
        let mut identifier = None;
        while buf.has_remaining() {
            let key = proto::read_key(&mut buf)?;
            match key.tag {
                1 => {
                    let raw = proto::expect_varint(&key, &mut buf)?;
                    msg_type = Some(
                        MessageType::from_wire(raw)
                            .ok_or(ProtocolError::InvalidEnum("msg_type"))?,
                    );
                }
                2 => message = Some(proto::expect_bytes(&key, &mut buf)?.to_vec()),
                3 => status_code = Some(proto::expect_varint(&key, &mut buf)?),
                4 => status_msg = Some(proto::expect_string(&key, &mut buf)?),
                5 => identifier = Some(proto::expect_bytes(&key, &mut buf)?.to_vec()),
                _ => proto::skip_value(&key, &mut buf)?,
            }
        }
        Ok(ProtocolMessage {
            msg_type: msg_type.ok_or(ProtocolError::MissingField("msg_type"))?,
            message: message.ok_or(ProtocolError::MissingField("message"))?,
            status_code,
            status_msg,
            identifier,
        })
    }
}

/// Which side of the exchange holds the local private key.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Role {
    Sender,
    Receiver,
}

/// An end-to-end encrypted envelope (BIP75 `EncryptedProtocolMessage`).
///
/// The scheme is ECIES-shaped: an ECDH agreement between the two embedded
/// keys seeds SHA-512, whose halves become an AES-256-CBC key and an
/// HMAC-SHA256 key. `message` holds the ciphertext followed by the 32-byte
/// MAC over it; the IV is the first 16 bytes of SHA-256 of the nonce as a
/// little-endian u64. On top of the encryption, the whole envelope is
/// ECDSA-signed by whichever party built it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EncryptedProtocolMessage {
    pub msg_type: MessageType,
    /// AES-256-CBC ciphertext followed by its HMAC-SHA256 tag.
    pub message: Vec<u8>,
    pub receiver_public_key: PublicKey,
    pub sender_public_key: PublicKey,
    /// Microseconds since the unix epoch; also pins the CBC IV, so reuse
    /// with the same key pair leaks.
    pub nonce: u64,
    /// DER ECDSA signature over the envelope with this field zero-length.
    pub signature: Option<Vec<u8>>,
    pub identifier: Option<Vec<u8>>,
    pub status_code: Option<u64>,
    pub status_msg: Option<String>,
}

impl EncryptedProtocolMessage {
    /// Encrypt and sign `plaintext` (a serialized [`ProtocolMessage`]
    /// body) for the exchange between the local key and
    /// `remote_public_key`. `local_role` states which of the two embedded
    /// key slots belongs to the local key.
    #[allow(clippy::too_many_arguments)]
    pub fn encrypt(
        msg_type: MessageType,
        plaintext: &[u8],
        local_key: &SecretKey,
        local_role: Role,
        remote_public_key: &PublicKey,
        nonce: u64,
        identifier: Option<Vec<u8>>,
        status_code: Option<u64>,
        status_msg: Option<String>,
    ) -> Result<EncryptedProtocolMessage, ProtocolError> {
        let local_public_key = PublicKey::from_secret_key(&crypto::SECP256K1, local_key);
        let (sender_public_key, receiver_public_key) = match local_role {
            Role::Sender => (local_public_key, *remote_public_key),
            Role::Receiver => (*remote_public_key, local_public_key),
        };

        let (cipher_key, mac_key) = crypto::derive_keys(local_key, remote_public_key)?;
        let iv = crypto::iv_from_nonce(nonce);
        let mut message = crypto::aes_cbc_encrypt(&cipher_key, &iv, plaintext)?;
        let tag = crypto::hmac_sha256(&mac_key, &message);
        message.extend_from_slice(&tag);

        let mut envelope = EncryptedProtocolMessage {
            msg_type,
            message,
            receiver_public_key,
            sender_public_key,
            nonce,
            signature: None,
            identifier,
            status_code,
            status_msg,
        };
        let digest = envelope.digest();
        envelope.signature = Some(crypto::sign_digest(&digest, local_key)?);
        Ok(envelope)
    }

    fn write_with_signature(&self, signature: Option<&[u8]>, buf: &mut Vec<u8>) {
        proto::write_uint_field(1, self.msg_type.to_wire(), buf);
        proto::write_bytes_field(2, &self.message, buf);
        proto::write_bytes_field(3, &self.receiver_public_key.serialize(), buf);
        proto::write_bytes_field(4, &self.sender_public_key.serialize(), buf);
        proto::write_uint_field(5, self.nonce, buf);
        if let Some(signature) = signature {
            proto::write_bytes_field(6, signature, buf);
        }
        if let Some(identifier) = &self.identifier {
            proto::write_bytes_field(7, identifier, buf);
        }
        if let Some(status_code) = self.status_code {
            proto::write_uint_field(8, status_code, buf);
        }
        if let Some(status_msg) = &self.status_msg {
            proto::write_string_field(9, status_msg, buf);
        }
    }

    pub fn serialize(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        self.write_with_signature(self.signature.as_deref(), &mut buf);
        buf
    }

    pub fn parse(bytes: &[u8]) -> Result<EncryptedProtocolMessage, ProtocolError> {
        let mut buf = bytes;
        let mut msg_type = None;
        let mut message = None;
        let mut receiver_public_key = None;
        let mut sender_public_key = None;
        let mut nonce = None;
        let mut signature = None;
        let mut identifier = None;
        let mut status_code = None;
        let mut status_msg = None;
        while buf.has_remaining() {
            let key = proto::read_key(&mut buf)?;
            match key.tag {
                1 => {
                    let raw = proto::expect_varint(&key, &mut buf)?;
                    msg_type = Some(
                        MessageType::from_wire(raw)
                            .ok_or(ProtocolError::InvalidEnum("msg_type"))?,
                    );
                }
                2 => message = Some(proto::expect_bytes(&key, &mut buf)?.to_vec()),
                3 => {
                    let raw = proto::expect_bytes(&key, &mut buf)?;
                    receiver_public_key = Some(PublicKey::from_slice(&raw)?);
                }
                4 => {
                    let raw = proto::expect_bytes(&key, &mut buf)?;
                    sender_public_key = Some(PublicKey::from_slice(&raw)?);
                }
                5 => nonce = Some(proto::expect_varint(&key, &mut buf)?),
                6 => signature = Some(proto::expect_bytes(&key, &mut buf)?.to_vec()),
                7 => identifier = Some(proto::expect_bytes(&key, &mut buf)?.to_vec()),
                8 => status_code = Some(proto::expect_varint(&key, &mut buf)?),
                9 => status_msg = Some(proto::expect_string(&key, &mut buf)?),
                _ => proto::skip_value(&key, &mut buf)?,
            }
        }
        Ok(EncryptedProtocolMessage {
            msg_type: msg_type.ok_or(ProtocolError::MissingField("msg_type"))?,
            message: message.ok_or(ProtocolError::MissingField("message"))?,
            receiver_public_key: receiver_public_key
                .ok_or(ProtocolError::MissingField("receiver_public_key"))?,
            sender_public_key: sender_public_key
                .ok_or(ProtocolError::MissingField("sender_public_key"))?,
            nonce: nonce.ok_or(ProtocolError::MissingField("nonce"))?,
            signature,
            identifier,
            status_code,
            status_msg,
        })
    }

    /// SHA-256 of the envelope serialized with a zero-length signature
    /// field.
    pub fn digest(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        self.write_with_signature(Some(&[]), &mut buf);
        crypto::sha256(&buf)
    }

    /// Recompute the digest and validate the embedded ECDSA signature
    /// against `key` (the counterparty checks whichever of the embedded
    /// keys built the envelope).
    pub fn verify(&self, key: &PublicKey) -> bool {
        match &self.signature {
            Some(signature) => crypto::verify_digest(&self.digest(), signature, key),
            None => false,
        }
    }

    /// Authenticate and decrypt the payload with the private key
    /// complementary to one of the embedded public keys.
    pub fn decrypt(&self, local_key: &SecretKey) -> Result<Vec<u8>, ProtocolError> {
        let local_public_key = PublicKey::from_secret_key(&crypto::SECP256K1, local_key);
        let remote_public_key = if local_public_key == self.receiver_public_key {
            &self.sender_public_key
        } else if local_public_key == self.sender_public_key {
            &self.receiver_public_key
        } else {
            return Err(ProtocolError::WrongKey);
        };

        let (cipher_key, mac_key) = crypto::derive_keys(local_key, remote_public_key)?;
        if self.message.len() < 32 {
            return Err(ProtocolError::Authentication);
        }
        let (ciphertext, tag) = self.message.split_at(self.message.len() - 32);
        if !crypto::hmac_sha256_verify(&mac_key, ciphertext, tag) {
            return Err(ProtocolError::Authentication);
        }
        crypto::aes_cbc_decrypt(&cipher_key, &crypto::iv_from_nonce(self.nonce), ciphertext)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_keypair(seed: u8) -> (SecretKey, PublicKey) {
        let secret = SecretKey::from_slice(&[seed; 32]).unwrap();
        let public = PublicKey::from_secret_key(&crypto::SECP256K1, &secret);
        (secret, public)
    }

    const TEST_NONCE: u64 = 1_700_000_000_000_000;

    #[test]
    fn invoice_request_round_trip() {
        let (_, sender_public) = test_keypair(0x21);
        let request = InvoiceRequest {
            amount: 50_000,
            memo: Some("coffee fund".to_owned()),
            notify_url: Some("https://wallet.example/notify".to_owned()),
            ..InvoiceRequest::new(sender_public)
        };
        let bytes = request.serialize();
        let parsed = InvoiceRequest::parse(&bytes).unwrap();
        assert_eq!(parsed, request);
        assert_eq!(parsed.serialize(), bytes);
    }

    #[test]
    fn invoice_request_requires_sender_key() {
        let mut bytes = Vec::new();
        proto::write_uint_field(2, 1000, &mut bytes);
        assert!(matches!(
            InvoiceRequest::parse(&bytes),
            Err(ProtocolError::MissingField("sender_public_key"))
        ));
    }

    #[test]
    fn invoice_request_rejects_sha1_pki() {
        let (_, sender_public) = test_keypair(0x21);
        let mut bytes = Vec::new();
        proto::write_bytes_field(1, &sender_public.serialize(), &mut bytes);
        proto::write_string_field(3, "x509+sha1", &mut bytes);
        assert!(matches!(
            InvoiceRequest::parse(&bytes),
            Err(ProtocolError::InvalidEnum("pki_type"))
        ));
    }

    #[test]
    fn invoice_request_sign_and_verify() {
        let (sender_secret, sender_public) = test_keypair(0x23);
        let mut request = InvoiceRequest::new(sender_public);
        request.pki_type = PkiType::X509Sha256;
        request.amount = 1_234;
        request.sign(&sender_secret).unwrap();
        assert!(request.verify(&sender_public));

        let mut tampered = InvoiceRequest::parse(&request.serialize()).unwrap();
        assert!(tampered.verify(&sender_public));
        tampered.amount += 1;
        assert!(!tampered.verify(&sender_public));
    }

    #[test]
    fn protocol_message_round_trip_and_required_fields() {
        let message = ProtocolMessage {
            status_code: Some(1),
            status_msg: Some("ok".to_owned()),
            identifier: Some(vec![0xaa; 32]),
            ..ProtocolMessage::new(MessageType::Payment, vec![1, 2, 3])
        };
        let bytes = message.serialize();
        let parsed = ProtocolMessage::parse(&bytes).unwrap();
        assert_eq!(parsed, message);
        assert_eq!(parsed.serialize(), bytes);

        let empty: [u8; 0] = [];
        assert!(matches!(
            ProtocolMessage::parse(&empty),
            Err(ProtocolError::MissingField(_))
        ));
    }

    #[test]
    fn protocol_message_rejects_unknown_type_values() {
        let mut bytes = Vec::new();
        proto::write_uint_field(1, 9, &mut bytes);
        proto::write_bytes_field(2, &[], &mut bytes);
        assert!(matches!(
            ProtocolMessage::parse(&bytes),
            Err(ProtocolError::InvalidEnum("msg_type"))
        ));
    }

    #[test]
    fn encrypted_message_round_trips_through_the_wire() {
        let (sender_secret, sender_public) = test_keypair(0x41);
        let (receiver_secret, receiver_public) = test_keypair(0x42);

        let inner = ProtocolMessage::new(MessageType::InvoiceRequest, b"inner bytes".to_vec());
        let plaintext = inner.serialize();

        let envelope = EncryptedProtocolMessage::encrypt(
            MessageType::InvoiceRequest,
            &plaintext,
            &sender_secret,
            Role::Sender,
            &receiver_public,
            TEST_NONCE,
            Some(vec![0x11; 32]),
            None,
            None,
        )
        .unwrap();
        assert_eq!(envelope.sender_public_key, sender_public);
        assert_eq!(envelope.receiver_public_key, receiver_public);

        let bytes = envelope.serialize();
        let parsed = EncryptedProtocolMessage::parse(&bytes).unwrap();
        assert_eq!(parsed, envelope);
        assert_eq!(parsed.serialize(), bytes);

        // The receiver authenticates the sender and recovers the payload.
        assert!(parsed.verify(&sender_public));
        let decrypted = parsed.decrypt(&receiver_secret).unwrap();
        assert_eq!(decrypted, plaintext);
        assert_eq!(
            ProtocolMessage::parse(&decrypted).unwrap().message,
            b"inner bytes".to_vec()
        );

        // The sender can decrypt its own envelope too.
        assert_eq!(parsed.decrypt(&sender_secret).unwrap(), plaintext);
    }

    #[test]
    fn decrypt_with_an_unrelated_key_fails() {
        let (sender_secret, _) = test_keypair(0x41);
        let (_, receiver_public) = test_keypair(0x42);
        let (unrelated_secret, _) = test_keypair(0x43);

        let envelope = EncryptedProtocolMessage::encrypt(
            MessageType::Payment,
            b"secret payment",
            &sender_secret,
            Role::Sender,
            &receiver_public,
            TEST_NONCE,
            None,
            None,
            None,
        )
        .unwrap();

        assert!(matches!(
            envelope.decrypt(&unrelated_secret),
            Err(ProtocolError::WrongKey)
        ));
    }

    #[test]
    fn tampering_is_detected() {
        let (sender_secret, sender_public) = test_keypair(0x41);
        let (receiver_secret, receiver_public) = test_keypair(0x42);

        let envelope = EncryptedProtocolMessage::encrypt(
            MessageType::Ack,
            b"paid in full",
            &sender_secret,
            Role::Sender,
            &receiver_public,
            TEST_NONCE,
            None,
            None,
            None,
        )
        .unwrap();

        // Flip one ciphertext bit: the MAC refuses it, and the outer
        // signature no longer covers the bytes either.
        let mut corrupted = envelope.clone();
        corrupted.message[0] ^= 0x01;
        assert!(matches!(
            corrupted.decrypt(&receiver_secret),
            Err(ProtocolError::Authentication)
        ));
        assert!(!corrupted.verify(&sender_public));

        // Flip one signature bit: verification fails, decryption is
        // unaffected.
        let mut bad_signature = envelope;
        if let Some(signature) = bad_signature.signature.as_mut() {
            let last = signature.len() - 1;
            signature[last] ^= 0x01;
        }
        assert!(!bad_signature.verify(&sender_public));
    }

    #[test]
    fn receiver_built_envelopes_sign_with_the_receiver_key() {
        let (receiver_secret, receiver_public) = test_keypair(0x52);
        let (_, sender_public) = test_keypair(0x51);

        // The merchant answers an invoice request: it is the receiver of
        // the exchange but the author of this envelope.
        let envelope = EncryptedProtocolMessage::encrypt(
            MessageType::Request,
            b"signed payment request bytes",
            &receiver_secret,
            Role::Receiver,
            &sender_public,
            TEST_NONCE + 1,
            None,
            Some(200),
            Some("ok".to_owned()),
        )
        .unwrap();

        assert_eq!(envelope.receiver_public_key, receiver_public);
        assert_eq!(envelope.sender_public_key, sender_public);
        assert!(envelope.verify(&receiver_public));
        assert!(!envelope.verify(&sender_public));
    }
}
