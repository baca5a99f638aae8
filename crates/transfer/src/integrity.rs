use std::fmt;
use std::io::Read;
use std::path::Path;

use sha2::{Digest as _, Sha256};

use crate::TransferError;
use crate::types::ChunkSet;

/// Hex-encoded SHA-256 of a file's contents.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Digest(String);

impl Digest {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for Digest {
    fn from(hex: String) -> Self {
        Self(hex)
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Computes SHA-256 of `data`.
pub fn digest_bytes(data: &[u8]) -> Digest {
    let mut hasher = Sha256::new();
    hasher.update(data);
    Digest(hex::encode(hasher.finalize()))
}

/// Computes SHA-256 of an entire file.
pub fn digest_file(path: &Path) -> Result<Digest, TransferError> {
    let mut file = std::fs::File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 8192];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(Digest(hex::encode(hasher.finalize())))
}

/// Computes SHA-256 of the data chunks in sequence order.
///
/// Equals [`digest_file`] of the source when `chunks` is complete.
pub fn digest_chunks(chunks: &ChunkSet) -> Digest {
    let mut hasher = Sha256::new();
    for (_, payload) in chunks.iter().filter(|(_, p)| !p.is_end_marker()) {
        hasher.update(payload.as_bytes());
    }
    Digest(hex::encode(hasher.finalize()))
}

/// Returns `true` if the file at `path` hashes to `expected`.
pub fn verify(path: &Path, expected: &Digest) -> Result<bool, TransferError> {
    Ok(digest_file(path)? == *expected)
}
