//! BIP70 payment requests: what a merchant asks to be paid, and the
//! signature that proves who is asking.

use bytes::{Buf, Bytes};
use secp256k1::{PublicKey, SecretKey};

use crate::crypto;
use crate::error::ProtocolError;
use crate::pki::{PkiType, X509Certificates};
use crate::proto;

/// A requested payment output: where to send coins and how many.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Output {
    /// Amount in satoshis; zero leaves the amount to the payer.
    pub amount: u64,
    /// The scriptPubKey the payment must be sent to.
    pub script: Vec<u8>,
}

impl Output {
    pub fn new(script: Vec<u8>, amount: u64) -> Output {
        Output { amount, script }
    }

    pub(crate) fn serialize(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        if self.amount != 0 {
            proto::write_uint_field(1, self.amount, &mut buf);
        }
        proto::write_bytes_field(2, &self.script, &mut buf);
        buf
    }

    pub(crate) fn parse(bytes: &[u8]) -> Result<Output, ProtocolError> {
        let mut buf = bytes;
        let mut amount = 0;
        let mut script = None;
        while buf.has_remaining() {
            let key = proto::read_key(&mut buf)?;
            match key.tag {
                1 => amount = proto::expect_varint(&key, &mut buf)?,
                2 => script = Some(proto::expect_bytes(&key, &mut buf)?.to_vec()),
                _ => proto::skip_value(&key, &mut buf)?,
            }
        }
        Ok(Output {
            amount,
            script: script.ok_or(ProtocolError::MissingField("script"))?,
        })
    }
}

/// The body of a payment request (BIP70 `PaymentDetails`).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PaymentDetails {
    /// "main" or "test".
    pub network: String,
    /// Where to send payment, in order.
    pub outputs: Vec<Output>,
    /// Request creation time, seconds since the unix epoch.
    pub time: Option<u64>,
    /// When this request should be considered invalid.
    pub expires: Option<u64>,
    /// Human-readable description of the request for the customer.
    pub memo: Option<String>,
    /// Where to POST the Payment message and receive the PaymentACK.
    pub payment_url: Option<String>,
    /// Arbitrary merchant state, echoed back inside the Payment message.
    /// Opaque to the wallet; an empty-but-present value is distinct from an
    /// absent one and both survive round-trips.
    pub merchant_data: Option<Vec<u8>>,
}

impl Default for PaymentDetails {
    fn default() -> Self {
        PaymentDetails {
            network: "main".to_owned(),
            outputs: Vec::new(),
            time: None,
            expires: None,
            memo: None,
            payment_url: None,
            merchant_data: None,
        }
    }
}

impl PaymentDetails {
    pub fn serialize(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        if self.network != "main" {
            proto::write_string_field(1, &self.network, &mut buf);
        }
        for output in &self.outputs {
            proto::write_bytes_field(2, &output.serialize(), &mut buf);
        }
        if let Some(time) = self.time {
            proto::write_uint_field(3, time, &mut buf);
        }
        if let Some(expires) = self.expires {
            proto::write_uint_field(4, expires, &mut buf);
        }
        if let Some(memo) = &self.memo {
            proto::write_string_field(5, memo, &mut buf);
        }
        if let Some(payment_url) = &self.payment_url {
            proto::write_string_field(6, payment_url, &mut buf);
        }
        if let Some(merchant_data) = &self.merchant_data {
            proto::write_bytes_field(7, merchant_data, &mut buf);
        }
        buf
    }

    pub fn parse(bytes: &[u8]) -> Result<PaymentDetails, ProtocolError> {
        let mut buf = bytes;
        let mut details = PaymentDetails::default();
        while buf.has_remaining() {
            let key = proto::read_key(&mut buf)?;
            match key.tag {
                1 => details.network = proto::expect_string(&key, &mut buf)?,
                2 => details
                    .outputs
                    .push(Output::parse(&proto::expect_bytes(&key, &mut buf)?)?),
                3 => details.time = Some(proto::expect_varint(&key, &mut buf)?),
                4 => details.expires = Some(proto::expect_varint(&key, &mut buf)?),
                5 => details.memo = Some(proto::expect_string(&key, &mut buf)?),
                6 => details.payment_url = Some(proto::expect_string(&key, &mut buf)?),
                7 => details.merchant_data = Some(proto::expect_bytes(&key, &mut buf)?.to_vec()),
                _ => proto::skip_value(&key, &mut buf)?,
            }
        }
        Ok(details)
    }
}

/// A signed payment request (BIP70 `PaymentRequest`).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PaymentRequest {
    /// Payment details version; 1 is the only defined value.
    pub version: u32,
    pub pki_type: PkiType,
    /// For the X.509 pki types, a serialized [`X509Certificates`].
    pub pki_data: Option<Vec<u8>>,
    pub details: PaymentDetails,
    /// pki-dependent signature over the request digest.
    pub signature: Option<Vec<u8>>,
}

impl PaymentRequest {
    pub fn new(details: PaymentDetails) -> PaymentRequest {
        PaymentRequest {
            version: 1,
            pki_type: PkiType::None,
            pki_data: None,
            details,
            signature: None,
        }
    }

    fn write_with_signature(&self, signature: Option<&[u8]>, buf: &mut Vec<u8>) {
        if self.version != 1 {
            proto::write_uint_field(1, u64::from(self.version), buf);
        }
        if self.pki_type != PkiType::None {
            proto::write_string_field(2, self.pki_type.as_str(), buf);
        }
        if let Some(pki_data) = &self.pki_data {
            proto::write_bytes_field(3, pki_data, buf);
        }
        proto::write_bytes_field(4, &self.details.serialize(), buf);
        if let Some(signature) = signature {
            proto::write_bytes_field(5, signature, buf);
        }
    }

    pub fn serialize(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        self.write_with_signature(self.signature.as_deref(), &mut buf);
        buf
    }

    pub fn parse(bytes: &[u8]) -> Result<PaymentRequest, ProtocolError> {
        let mut buf = bytes;
        let mut version = 1;
        let mut pki_type = PkiType::None;
        let mut pki_data = None;
        let mut details = None;
        let mut signature = None;
        while buf.has_remaining() {
            let key = proto::read_key(&mut buf)?;
            match key.tag {
                1 => version = proto::expect_varint(&key, &mut buf)? as u32,
                2 => {
                    let value = proto::expect_string(&key, &mut buf)?;
                    pki_type = PkiType::from_wire(&value)
                        .ok_or(ProtocolError::InvalidEnum("pki_type"))?;
                }
                3 => pki_data = Some(proto::expect_bytes(&key, &mut buf)?.to_vec()),
                4 => {
                    details = Some(PaymentDetails::parse(&proto::expect_bytes(&key, &mut buf)?)?)
                }
                5 => signature = Some(proto::expect_bytes(&key, &mut buf)?.to_vec()),
                _ => proto::skip_value(&key, &mut buf)?,
            }
        }
        Ok(PaymentRequest {
            version,
            pki_type,
            pki_data,
            details: details.ok_or(ProtocolError::MissingField("details"))?,
            signature,
        })
    }

    /// The digest to sign or verify, per pki type: the serialized request
    /// with the signature field present but zero-length. `None` when the
    /// pki type is "none", which carries no signature at all.
    ///
    /// Verification always recomputes this from the parsed value; the
    /// received bytes are never patched in place.
    pub fn digest(&self) -> Option<Vec<u8>> {
        let hash: fn(&[u8]) -> Vec<u8> = match self.pki_type {
            PkiType::None => return None,
            PkiType::X509Sha256 => crypto::sha256,
            PkiType::X509Sha1 => crypto::sha1,
        };
        let mut buf = Vec::new();
        self.write_with_signature(Some(&[]), &mut buf);
        Some(hash(&buf))
    }

    /// Sign the request digest with the merchant key, storing the DER
    /// signature.
    pub fn sign(&mut self, key: &SecretKey) -> Result<(), ProtocolError> {
        let digest = self.digest().ok_or(ProtocolError::UnsignedPkiType)?;
        self.signature = Some(crypto::sign_digest(&digest, key)?);
        Ok(())
    }

    /// Recompute the digest and check the stored signature against the
    /// given public key (normally extracted from the leaf certificate).
    pub fn verify(&self, key: &PublicKey) -> bool {
        let digest = match self.digest() {
            Some(digest) => digest,
            None => return false,
        };
        let signature = match &self.signature {
            Some(signature) => signature,
            None => return false,
        };
        crypto::verify_digest(&digest, signature, key)
    }

    /// The certificate chain carried in pkiData, leaf first.
    pub fn certs(&self) -> Result<X509Certificates, ProtocolError> {
        match &self.pki_data {
            Some(pki_data) => X509Certificates::parse(pki_data),
            None => Ok(X509Certificates::default()),
        }
    }

    /// The `index`-th DER certificate, or an out-of-bounds error.
    pub fn cert(&self, index: usize) -> Result<Bytes, ProtocolError> {
        self.certs()?
            .certificates
            .get(index)
            .cloned()
            .ok_or(ProtocolError::CertIndex)
    }
}
