//! Digest algorithm selection and the entry field-set hash.

use digest::{Digest, DynDigest};
use sha2::Sha256;
use sha3::Keccak256;

/// Length of every digest this protocol produces.
pub const HASH_LEN: usize = 32;

/// Digest algorithm used for field, field-set, and header hashes.
///
/// Threaded through constructors rather than read from a global so tests
/// can run the whole pipeline under an alternate algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HashKind {
    #[default]
    Keccak256,
    Sha256,
}

impl HashKind {
    /// Creates a fresh incremental hasher.
    pub fn hasher(self) -> Box<dyn DynDigest> {
        match self {
            HashKind::Keccak256 => Box::new(Keccak256::new()),
            HashKind::Sha256 => Box::new(Sha256::new()),
        }
    }

    /// One-shot digest.
    pub fn digest(self, data: &[u8]) -> Vec<u8> {
        match self {
            HashKind::Keccak256 => Keccak256::digest(data).to_vec(),
            HashKind::Sha256 => Sha256::digest(data).to_vec(),
        }
    }
}

/// Digest over the concatenation of field hashes.
///
/// The iterator must already be ordered by field name (byte-wise ascending
/// on the UTF-8 names); the entry model stores fields in a `BTreeMap`, so
/// its value iteration satisfies this by construction. The result must
/// equal the header's ENTRY_FLD_HASH for the entry to be accepted.
pub fn field_set_hash<'a>(kind: HashKind, hashes: impl Iterator<Item = &'a [u8]>) -> Vec<u8> {
    let mut hasher = kind.hasher();
    for hash in hashes {
        hasher.update(hash);
    }
    hasher.finalize().to_vec()
}
