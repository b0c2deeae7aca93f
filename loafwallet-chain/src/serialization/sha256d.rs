//! The SHA-256d (double SHA-256) hash used throughout the Bitcoin wire
//! format, both for object identity and for message checksums.

use std::io;

use sha2::{Digest, Sha256};

/// Compute the SHA-256d digest of `data`.
pub fn digest(data: &[u8]) -> [u8; 32] {
    let mut output = [0u8; 32];
    output.copy_from_slice(&Sha256::digest(&Sha256::digest(data)));
    output
}

/// The first four bytes of the SHA-256d digest of a message body, carried in
/// every message header.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Checksum(pub [u8; 4]);

impl<'a> From<&'a [u8]> for Checksum {
    fn from(bytes: &'a [u8]) -> Self {
        let hash = digest(bytes);
        let mut checksum = [0u8; 4];
        checksum.copy_from_slice(&hash[0..4]);
        Self(checksum)
    }
}

/// An incremental SHA-256d hasher usable as an `io::Write` sink, so that
/// structures can be hashed directly from their serializers without an
/// intermediate buffer.
#[derive(Default)]
pub struct Writer {
    hash: Sha256,
}

impl io::Write for Writer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.hash.update(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Writer {
    /// Consume the writer and produce the finished digest.
    pub fn finish(self) -> [u8; 32] {
        let first = self.hash.finalize();
        let mut output = [0u8; 32];
        output.copy_from_slice(&Sha256::digest(&first));
        output
    }
}
