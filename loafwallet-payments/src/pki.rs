//! PKI type dispatch and X.509 certificate-chain extraction (BIP70).

use std::fmt;

use bytes::{Buf, Bytes};

use crate::error::ProtocolError;
use crate::proto;

/// How a payment request is authenticated.
///
/// Selected at parse time from the canonical wire strings; serialization
/// emits the same strings back.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum PkiType {
    /// Unauthenticated; there is no digest and nothing to sign.
    None,
    /// An X.509 certificate chain over a SHA-256 request digest.
    X509Sha256,
    /// An X.509 certificate chain over a SHA-1 request digest. Legacy;
    /// accepted for payment requests only.
    X509Sha1,
}

impl PkiType {
    /// The canonical wire string.
    pub fn as_str(&self) -> &'static str {
        match self {
            PkiType::None => "none",
            PkiType::X509Sha256 => "x509+sha256",
            PkiType::X509Sha1 => "x509+sha1",
        }
    }

    pub(crate) fn from_wire(value: &str) -> Option<PkiType> {
        match value {
            "none" => Some(PkiType::None),
            "x509+sha256" => Some(PkiType::X509Sha256),
            "x509+sha1" => Some(PkiType::X509Sha1),
            _ => None,
        }
    }
}

impl Default for PkiType {
    fn default() -> Self {
        PkiType::None
    }
}

impl fmt::Display for PkiType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The pkiData payload for the X.509 pki types: a protobuf carrying the
/// certificate chain as DER blobs, leaf certificate first.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct X509Certificates {
    pub certificates: Vec<Bytes>,
}

const CERTIFICATE_TAG: u32 = 1;

impl X509Certificates {
    pub fn parse(bytes: &[u8]) -> Result<X509Certificates, ProtocolError> {
        let mut buf = bytes;
        let mut certificates = Vec::new();
        while buf.has_remaining() {
            let key = proto::read_key(&mut buf)?;
            match key.tag {
                CERTIFICATE_TAG => certificates.push(proto::expect_bytes(&key, &mut buf)?),
                _ => proto::skip_value(&key, &mut buf)?,
            }
        }
        Ok(X509Certificates { certificates })
    }

    pub fn serialize(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        for certificate in &self.certificates {
            proto::write_bytes_field(CERTIFICATE_TAG, certificate, &mut buf);
        }
        buf
    }
}
