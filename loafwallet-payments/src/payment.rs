//! BIP70 payment and acknowledgement messages.

use bytes::{Buf, Bytes};

use crate::error::ProtocolError;
use crate::proto;
use crate::request::Output;

/// A customer's answer to a payment request (BIP70 `Payment`).
///
/// The signed transactions are wallet property with their own lifetime;
/// they are carried here as cheaply-cloned shared buffers, so dropping a
/// `Payment` never destroys a transaction.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Payment {
    /// Echoed from `PaymentDetails.merchant_data`, byte-exact.
    pub merchant_data: Option<Vec<u8>>,
    /// Signed transactions satisfying the request outputs, serialized.
    pub transactions: Vec<Bytes>,
    /// Where to send a refund, should one be necessary.
    pub refund_to: Vec<Output>,
    /// Human-readable note for the merchant.
    pub memo: Option<String>,
}

impl Payment {
    pub fn serialize(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        if let Some(merchant_data) = &self.merchant_data {
            proto::write_bytes_field(1, merchant_data, &mut buf);
        }
        for transaction in &self.transactions {
            proto::write_bytes_field(2, transaction, &mut buf);
        }
        for output in &self.refund_to {
            proto::write_bytes_field(3, &output.serialize(), &mut buf);
        }
        if let Some(memo) = &self.memo {
            proto::write_string_field(4, memo, &mut buf);
        }
        buf
    }

    pub fn parse(bytes: &[u8]) -> Result<Payment, ProtocolError> {
        let mut buf = bytes;
        let mut payment = Payment::default();
        while buf.has_remaining() {
            let key = proto::read_key(&mut buf)?;
            match key.tag {
                1 => payment.merchant_data = Some(proto::expect_bytes(&key, &mut buf)?.to_vec()),
                2 => payment
                    .transactions
                    .push(proto::expect_bytes(&key, &mut buf)?),
                3 => payment
                    .refund_to
                    .push(Output::parse(&proto::expect_bytes(&key, &mut buf)?)?),
                4 => payment.memo = Some(proto::expect_string(&key, &mut buf)?),
                _ => proto::skip_value(&key, &mut buf)?,
            }
        }
        Ok(payment)
    }
}

/// A merchant's receipt for a payment (BIP70 `PaymentACK`).
///
/// Owns the echoed payment outright.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PaymentAck {
    /// The payment message being acknowledged.
    pub payment: Payment,
    /// Human-readable note for the customer.
    pub memo: Option<String>,
}

impl PaymentAck {
    pub fn new(payment: Payment) -> PaymentAck {
        PaymentAck {
            payment,
            memo: None,
        }
    }

    pub fn serialize(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        proto::write_bytes_field(1, &self.payment.serialize(), &mut buf);
        if let Some(memo) = &self.memo {
            proto::write_string_field(2, memo, &mut buf);
        }
        buf
    }

    pub fn parse(bytes: &[u8]) -> Result<PaymentAck, ProtocolError> {
        let mut buf = bytes;
        let mut payment = None;
        let mut memo = None;
        while buf.has_remaining() {
            let key = proto::read_key(&mut buf)?;
            match key.tag {
                1 => payment = Some(Payment::parse(&proto::expect_bytes(&key, &mut buf)?)?),
                2 => memo = Some(proto::expect_string(&key, &mut buf)?),
                _ => proto::skip_value(&key, &mut buf)?,
            }
        }
        Ok(PaymentAck {
            payment: payment.ok_or(ProtocolError::MissingField("payment"))?,
            memo,
        })
    }
}
