//! Shared cryptographic plumbing: digests, ECDSA over secp256k1, and the
//! ECDH/AES-CBC/HMAC construction used by encrypted protocol messages.

use aes::Aes256;
use block_modes::block_padding::Pkcs7;
use block_modes::{BlockMode, Cbc};
use lazy_static::lazy_static;
use ring::hmac;
use secp256k1::{All, Message, PublicKey, Secp256k1, SecretKey, Signature};
use sha1::Sha1;
use sha2::{Digest, Sha256, Sha512};

use crate::error::ProtocolError;

type Aes256Cbc = Cbc<Aes256, Pkcs7>;

lazy_static! {
    pub(crate) static ref SECP256K1: Secp256k1<All> = Secp256k1::new();
}

pub(crate) fn sha256(data: &[u8]) -> Vec<u8> {
    Sha256::digest(data).to_vec()
}

pub(crate) fn sha1(data: &[u8]) -> Vec<u8> {
    Sha1::digest(data).to_vec()
}

/// ECDSA-sign a digest, returning the DER signature.
///
/// The digest must be 32 bytes; a 20-byte SHA-1 digest cannot be signed
/// with an EC key and reports a key error.
pub(crate) fn sign_digest(digest: &[u8], key: &SecretKey) -> Result<Vec<u8>, ProtocolError> {
    let message = Message::from_slice(digest)?;
    Ok(SECP256K1.sign(&message, key).serialize_der().to_vec())
}

pub(crate) fn verify_digest(digest: &[u8], signature_der: &[u8], key: &PublicKey) -> bool {
    let message = match Message::from_slice(digest) {
        Ok(message) => message,
        Err(_) => return false,
    };
    let signature = match Signature::from_der(signature_der) {
        Ok(signature) => signature,
        Err(_) => return false,
    };
    SECP256K1.verify(&message, &signature, key).is_ok()
}

/// ECDH key agreement: SHA-512 of the shared point's x coordinate, split
/// into an AES-256 key and an HMAC-SHA256 key.
pub(crate) fn derive_keys(
    secret: &SecretKey,
    public: &PublicKey,
) -> Result<([u8; 32], [u8; 32]), ProtocolError> {
    let mut point = *public;
    point.mul_assign(&SECP256K1, &secret[..])?;
    let shared_x = &point.serialize()[1..33];
    let digest = Sha512::digest(shared_x);
    let mut cipher_key = [0u8; 32];
    let mut mac_key = [0u8; 32];
    cipher_key.copy_from_slice(&digest[..32]);
    mac_key.copy_from_slice(&digest[32..]);
    Ok((cipher_key, mac_key))
}

/// The CBC initialization vector pinned by the message nonce.
pub(crate) fn iv_from_nonce(nonce: u64) -> [u8; 16] {
    let digest = Sha256::digest(&nonce.to_le_bytes());
    let mut iv = [0u8; 16];
    iv.copy_from_slice(&digest[..16]);
    iv
}

pub(crate) fn aes_cbc_encrypt(
    key: &[u8; 32],
    iv: &[u8; 16],
    plaintext: &[u8],
) -> Result<Vec<u8>, ProtocolError> {
    let cipher = Aes256Cbc::new_var(key, iv).map_err(|_| ProtocolError::Decryption)?;
    Ok(cipher.encrypt_vec(plaintext))
}

pub(crate) fn aes_cbc_decrypt(
    key: &[u8; 32],
    iv: &[u8; 16],
    ciphertext: &[u8],
) -> Result<Vec<u8>, ProtocolError> {
    let cipher = Aes256Cbc::new_var(key, iv).map_err(|_| ProtocolError::Decryption)?;
    cipher
        .decrypt_vec(ciphertext)
        .map_err(|_| ProtocolError::Decryption)
}

pub(crate) fn hmac_sha256(key: &[u8; 32], data: &[u8]) -> [u8; 32] {
    let key = hmac::Key::new(hmac::HMAC_SHA256, key);
    let mut tag = [0u8; 32];
    tag.copy_from_slice(hmac::sign(&key, data).as_ref());
    tag
}

/// Constant-time MAC check.
pub(crate) fn hmac_sha256_verify(key: &[u8; 32], data: &[u8], tag: &[u8]) -> bool {
    let key = hmac::Key::new(hmac::HMAC_SHA256, key);
    hmac::verify(&key, data, tag).is_ok()
}
