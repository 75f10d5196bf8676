use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::protocol::{AccountId, Operation, PublicKey};

/// Hex-renderable 32-byte blake3 digest used for transaction identity and
/// dedup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TransactionDigest(pub [u8; 32]);

impl std::fmt::Display for TransactionDigest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for byte in self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

/// A transaction as signed by its authors.
///
/// `ref_block_num`/`ref_block_prefix` anchor the transaction to a recent
/// block (TaPoS): the transaction is only valid while that block remains in
/// the recent-block ring, which prevents replaying it on another fork.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignedTransaction {
    pub ref_block_num: u16,
    pub ref_block_prefix: u32,
    pub expiration: DateTime<Utc>,
    pub operations: Vec<Operation>,
    /// Keys attesting the transaction. Signature bytes themselves are a
    /// cryptographic primitive verified by the consensus collaborator; the
    /// core receives the recovered keys.
    pub signatures: SmallVec<[PublicKey; 2]>,
}

impl SignedTransaction {
    /// Digest over everything except the signatures.
    pub fn digest(&self) -> TransactionDigest {
        let mut hasher = blake3::Hasher::new();
        let body = (
            self.ref_block_num,
            self.ref_block_prefix,
            self.expiration,
            &self.operations,
        );
        let bytes = postcard::to_allocvec(&body).unwrap_or_default();
        hasher.update(&bytes);
        TransactionDigest(*hasher.finalize().as_bytes())
    }

    pub fn serialized_size(&self) -> usize {
        postcard::to_allocvec(self).map(|v| v.len()).unwrap_or(0)
    }

    /// Every account whose authority the contained operations require,
    /// deduplicated, split by level.
    pub fn required_authorities(
        &self,
    ) -> (SmallVec<[AccountId; 4]>, SmallVec<[AccountId; 2]>) {
        let mut active = SmallVec::new();
        let mut owner = SmallVec::new();
        for op in &self.operations {
            op.required_authorities(&mut active, &mut owner);
        }
        active.sort_unstable();
        active.dedup();
        owner.sort_unstable();
        owner.dedup();
        (active, owner)
    }
}
