use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::protocol::{PublicKey, SignedTransaction, WitnessId};

/// A block identifier: the blake3 digest of the header with the block number
/// packed into the first four bytes, so the number can be recovered from the
/// id alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BlockId(pub [u8; 32]);

impl BlockId {
    pub const ZERO: BlockId = BlockId([0; 32]);

    pub fn block_num(&self) -> u32 {
        u32::from_be_bytes([self.0[0], self.0[1], self.0[2], self.0[3]])
    }
}

impl std::fmt::Display for BlockId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for byte in self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

/// A block as delivered by the consensus collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignedBlock {
    pub previous: BlockId,
    pub timestamp: DateTime<Utc>,
    pub witness: WitnessId,
    pub transaction_merkle_root: [u8; 32],
    pub transactions: Vec<SignedTransaction>,
    /// Attestation by the witness's signing key; byte-level signature
    /// verification is delegated to the crypto primitive.
    pub witness_signature: PublicKey,
}

impl SignedBlock {
    pub fn block_num(&self) -> u32 {
        self.previous.block_num() + 1
    }

    pub fn id(&self) -> BlockId {
        let header = (
            &self.previous,
            self.timestamp,
            self.witness,
            &self.transaction_merkle_root,
        );
        let bytes = postcard::to_allocvec(&header).unwrap_or_default();
        let mut id = *blake3::hash(&bytes).as_bytes();
        id[..4].copy_from_slice(&self.block_num().to_be_bytes());
        BlockId(id)
    }

    /// Pairwise blake3 tree over the contained transaction digests. An odd
    /// trailing node is carried up unhashed, an empty block yields zeroes.
    pub fn compute_merkle_root(transactions: &[SignedTransaction]) -> [u8; 32] {
        let mut layer: Vec<[u8; 32]> = transactions.iter().map(|tx| tx.digest().0).collect();
        if layer.is_empty() {
            return [0; 32];
        }
        while layer.len() > 1 {
            layer = layer
                .chunks(2)
                .map(|pair| match pair {
                    [left, right] => {
                        let mut hasher = blake3::Hasher::new();
                        hasher.update(left);
                        hasher.update(right);
                        *hasher.finalize().as_bytes()
                    }
                    [odd] => *odd,
                    _ => unreachable!(),
                })
                .collect();
        }
        layer[0]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_embeds_the_block_number() {
        let block = SignedBlock {
            previous: BlockId::ZERO,
            timestamp: DateTime::<Utc>::MIN_UTC,
            witness: WitnessId(0),
            transaction_merkle_root: [0; 32],
            transactions: vec![],
            witness_signature: PublicKey::from("w"),
        };
        assert_eq!(block.block_num(), 1);
        assert_eq!(block.id().block_num(), 1);
    }

    #[test]
    fn empty_merkle_root_is_zero() {
        assert_eq!(SignedBlock::compute_merkle_root(&[]), [0; 32]);
    }
}
