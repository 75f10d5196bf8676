//! The block processor: the external surface the consensus layer drives.
//! Blocks arrive as a linear stream; each is applied in its own undo
//! session so a fork switch can pop back to the last agreed block and
//! replay the new branch.

mod genesis;
mod maintenance;
mod observer;

pub use maintenance::perform_maintenance;
pub use observer::{ChainObserver, block_impacted_accounts, operation_impacted_accounts};

use std::collections::BTreeSet;

use rayon::prelude::*;

use crate::{
    database::Database,
    entity::{BlockSummaryObject, TransactionDedupObject, WitnessObject},
    error::{ChainError, MeridianResult, ValidationError},
    evaluator::{self, EvalContext},
    protocol::{
        BlockSummaryId, ChainId, GenesisState, MAX_UNDO_HISTORY, MIN_UNDO_HISTORY, PublicKey,
        SignedBlock, SignedTransaction, WitnessId,
    },
};

/// Validation steps a trusted caller may skip, e.g. while replaying an
/// already-validated block log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SkipFlags(pub u32);

impl SkipFlags {
    pub const NOTHING: SkipFlags = SkipFlags(0);
    pub const WITNESS_SIGNATURE: SkipFlags = SkipFlags(0x01);
    pub const TRANSACTION_SIGNATURES: SkipFlags = SkipFlags(0x02);
    pub const TAPOS_CHECK: SkipFlags = SkipFlags(0x04);
    pub const MERKLE_CHECK: SkipFlags = SkipFlags(0x08);
    pub const WITNESS_SCHEDULE_CHECK: SkipFlags = SkipFlags(0x10);

    pub fn contains(self, flag: SkipFlags) -> bool {
        self.0 & flag.0 == flag.0
    }

    pub fn with(self, flag: SkipFlags) -> SkipFlags {
        SkipFlags(self.0 | flag.0)
    }
}

/// Confirms that a block attestation was produced by the expected signing
/// key. Real byte-level verification is a cryptographic primitive supplied
/// by the consensus collaborator; the default compares recovered keys.
pub trait SignatureVerifier: Send {
    fn verify_block(&self, block: &SignedBlock, expected: &PublicKey) -> bool;
}

struct KeyEquality;

impl SignatureVerifier for KeyEquality {
    fn verify_block(&self, block: &SignedBlock, expected: &PublicKey) -> bool {
        block.witness_signature == *expected
    }
}

pub struct Chain {
    db: Database,
    observers: Vec<Box<dyn ChainObserver>>,
    verifier: Box<dyn SignatureVerifier>,
}

impl Chain {
    /// Boots a chain from genesis. The resulting base state is
    /// irreversible.
    pub fn open(genesis: &GenesisState) -> MeridianResult<Self> {
        let mut db = Database::empty(genesis.chain_id());
        genesis::initialize(&mut db, genesis)?;
        db.clear_changes();
        Ok(Self {
            db,
            observers: Vec::new(),
            verifier: Box::new(KeyEquality),
        })
    }

    /// Restores a chain from a snapshot previously written with
    /// [`Chain::write_snapshot`].
    pub fn from_snapshot<R: std::io::Read>(
        chain_id: ChainId,
        input: R,
    ) -> MeridianResult<Self> {
        Ok(Self {
            db: Database::load_snapshot(chain_id, input)?,
            observers: Vec::new(),
            verifier: Box::new(KeyEquality),
        })
    }

    pub fn write_snapshot<W: std::io::Write>(&self, out: W) -> MeridianResult<()> {
        self.db.write_snapshot(out)
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    /// Direct mutable state access, for tooling and test fixtures. Block
    /// application never needs it.
    pub fn database_mut(&mut self) -> &mut Database {
        &mut self.db
    }

    pub fn add_observer(&mut self, observer: Box<dyn ChainObserver>) {
        self.observers.push(observer);
    }

    pub fn set_signature_verifier(&mut self, verifier: Box<dyn SignatureVerifier>) {
        self.verifier = verifier;
    }

    pub fn head_block_num(&self) -> u32 {
        self.db.head_block_num()
    }

    pub fn head_block_time(&self) -> chrono::DateTime<chrono::Utc> {
        self.db.head_block_time()
    }

    /// The witness scheduled for the slot `slots_ahead` after the head
    /// block. Round-robin over the active set by absolute slot number.
    pub fn scheduled_witness(&self, slots_ahead: u64) -> WitnessId {
        let dgp = self.db.dynamic_properties();
        let active = &self.db.global_properties().active_witnesses;
        let aslot = dgp.current_aslot + slots_ahead;
        active[(aslot % active.len() as u64) as usize]
    }

    /// Applies a signed block on top of the head. On any error the store is
    /// left exactly at the pre-block state.
    pub fn push_block(&mut self, block: &SignedBlock, skip: SkipFlags) -> MeridianResult<()> {
        let span = tracing::info_span!("block", num = block.block_num());
        let _enter = span.enter();

        self.validate_block_header(block, skip)?;

        // Stateless transaction pre-validation is the one parallel phase;
        // everything after runs strictly serialized.
        let max_size = self.db.parameters().maximum_transaction_size as usize;
        block
            .transactions
            .par_iter()
            .map(|tx| Self::prevalidate_transaction(tx, max_size))
            .collect::<MeridianResult<Vec<()>>>()?;

        self.db.begin_session();
        let result = self.apply_block_inner(block, skip);
        match result {
            Ok(()) => {
                // The block's session stays on the stack as its rollback
                // point until it passes beyond the undo horizon.
                let horizon = (MIN_UNDO_HISTORY
                    + self.db.dynamic_properties().recently_missed_count as usize)
                    .min(MAX_UNDO_HISTORY);
                self.db.trim_undo_history(horizon);
                let changes = self.db.changes().clone();
                observer::notify_all(&mut self.observers, block, &changes);
                self.db.clear_changes();
                Ok(())
            }
            Err(e) => {
                self.db.rollback_session();
                self.db.clear_changes();
                Err(e)
            }
        }
    }

    /// Unwinds the head block. Fails once the block has passed beyond the
    /// undo horizon and become irreversible.
    pub fn pop_block(&mut self) -> MeridianResult<()> {
        if self.db.session_depth() == 0 {
            return Err(ChainError::PopBeyondUndoHistory.into());
        }
        self.db.rollback_session();
        Ok(())
    }

    /// Validates and applies a standalone transaction on top of the head
    /// state, outside any block. Used by tests and by nodes accepting
    /// pending transactions.
    pub fn push_transaction(
        &mut self,
        tx: &SignedTransaction,
        skip: SkipFlags,
    ) -> MeridianResult<()> {
        let max_size = self.db.parameters().maximum_transaction_size as usize;
        Self::prevalidate_transaction(tx, max_size)?;
        let mark = self.db.changes_mark();
        self.db.begin_session();
        match self.apply_transaction(tx, skip) {
            Ok(()) => {
                self.db.commit_session();
                for observer in &mut self.observers {
                    observer.pending_transaction(tx);
                }
                Ok(())
            }
            Err(e) => {
                self.db.rollback_session();
                self.db.truncate_changes(mark);
                Err(e)
            }
        }
    }

    // ---- internals -----------------------------------------------------

    fn validate_block_header(&self, block: &SignedBlock, skip: SkipFlags) -> MeridianResult<()> {
        let dgp = self.db.dynamic_properties();
        if block.previous != dgp.head_block_id {
            return Err(if block.block_num() != dgp.head_block_number + 1 {
                ChainError::NonMonotonicBlock {
                    head: dgp.head_block_number,
                    got: block.block_num(),
                }
                .into()
            } else {
                ChainError::UnlinkableBlock.into()
            });
        }
        let interval = i64::from(self.db.parameters().block_interval);
        let elapsed = (block.timestamp - dgp.time).num_seconds();
        if elapsed <= 0 || elapsed % interval != 0 {
            return Err(ChainError::InvalidTimestamp.into());
        }
        if !skip.contains(SkipFlags::WITNESS_SCHEDULE_CHECK) {
            let scheduled = self.scheduled_witness((elapsed / interval) as u64);
            if scheduled != block.witness {
                return Err(ChainError::WrongWitness {
                    scheduled: scheduled.into(),
                    got: block.witness.into(),
                }
                .into());
            }
        }
        if !skip.contains(SkipFlags::MERKLE_CHECK)
            && SignedBlock::compute_merkle_root(&block.transactions)
                != block.transaction_merkle_root
        {
            return Err(ChainError::BadMerkleRoot.into());
        }
        if !skip.contains(SkipFlags::WITNESS_SIGNATURE) {
            let witness = self.db.get::<WitnessObject>(block.witness)?;
            if !self.verifier.verify_block(block, &witness.signing_key) {
                return Err(ChainError::InvalidWitnessSignature.into());
            }
        }
        Ok(())
    }

    fn prevalidate_transaction(tx: &SignedTransaction, max_size: usize) -> MeridianResult<()> {
        if tx.operations.is_empty() {
            return Err(ValidationError::EmptyTransaction.into());
        }
        let size = tx.serialized_size();
        if size > max_size {
            return Err(ValidationError::OversizedTransaction {
                size,
                max: max_size,
            }
            .into());
        }
        Ok(())
    }

    fn apply_block_inner(&mut self, block: &SignedBlock, skip: SkipFlags) -> MeridianResult<()> {
        let interval = i64::from(self.db.parameters().block_interval);
        let slot = ((block.timestamp - self.db.dynamic_properties().time).num_seconds()
            / interval) as u64;
        let missed = slot.saturating_sub(1) as u32;
        let block_id = block.id();
        let block_num = block.block_num();

        self.db.modify_dynamic_properties(|dgp| {
            dgp.head_block_number = block_num;
            dgp.head_block_id = block_id;
            dgp.time = block.timestamp;
            dgp.current_witness = block.witness;
            dgp.current_aslot += slot;
            if missed > 0 {
                dgp.recently_missed_count += 4 * missed;
            } else if dgp.recently_missed_count > 0 {
                dgp.recently_missed_count -= 1;
            }
            Ok(())
        })?;

        for tx in &block.transactions {
            self.db.begin_session();
            match self.apply_transaction(tx, skip) {
                Ok(()) => self.db.commit_session(),
                Err(e) => {
                    self.db.rollback_session();
                    tracing::warn!(error = %e, "transaction rejected, aborting block");
                    return Err(e);
                }
            }
        }

        // Witness pay for this block, bounded by the reserved budget.
        let pay = {
            let dgp = self.db.dynamic_properties();
            crate::protocol::Share(
                self.db
                    .parameters()
                    .witness_pay_per_block
                    .0
                    .min(dgp.witness_budget.0),
            )
        };
        if pay.is_positive() {
            let witness_account = self
                .db
                .get::<WitnessObject>(block.witness)?
                .witness_account;
            self.db.modify_dynamic_properties(|dgp| {
                dgp.witness_budget = dgp.witness_budget.checked_sub(pay)?;
                Ok(())
            })?;
            self.db.deposit_witness_pay(witness_account, pay)?;
        }
        self.db.modify::<WitnessObject>(block.witness, |witness| {
            witness.last_aslot += slot;
            Ok(())
        })?;

        // Maintenance sweep, atomic within the block session.
        let maintenance_due =
            block.timestamp >= self.db.dynamic_properties().next_maintenance_time;
        self.db.modify_dynamic_properties(|dgp| {
            dgp.maintenance_flag = maintenance_due;
            Ok(())
        })?;
        if maintenance_due {
            maintenance::perform_maintenance(&mut self.db, block.timestamp)?;
        }

        // TaPoS ring entry for this block.
        let summary_slot = BlockSummaryId(u64::from(block_num & 0xFFFF));
        if self.db.find::<BlockSummaryObject>(summary_slot).is_some() {
            self.db
                .modify::<BlockSummaryObject>(summary_slot, |summary| {
                    summary.block_id = block_id;
                    Ok(())
                })?;
        } else {
            let created = self.db.create(|id| BlockSummaryObject { id, block_id })?;
            debug_assert_eq!(created, summary_slot);
        }
        Ok(())
    }

    fn apply_transaction(&mut self, tx: &SignedTransaction, skip: SkipFlags) -> MeridianResult<()> {
        let now = self.db.head_block_time();
        let max_lifetime = chrono::Duration::seconds(i64::from(
            self.db.parameters().maximum_time_until_expiration,
        ));
        if tx.expiration <= now {
            return Err(ValidationError::ExpiredTransaction {
                expiration: tx.expiration,
                head_time: now,
            }
            .into());
        }
        if tx.expiration > now + max_lifetime {
            return Err(ValidationError::ExpirationTooFarInFuture.into());
        }

        if !skip.contains(SkipFlags::TAPOS_CHECK) {
            let summary = self
                .db
                .find::<BlockSummaryObject>(BlockSummaryId(u64::from(tx.ref_block_num)))
                .ok_or(ValidationError::TaposAnchorMismatch)?;
            if summary.prefix() != tx.ref_block_prefix {
                return Err(ValidationError::TaposAnchorMismatch.into());
            }
        }

        // Recording the digest doubles as the duplicate check; the row is
        // part of the transaction's session, so a failed transaction leaves
        // no trace of it.
        let digest = tx.digest();
        self.db.create(|id| TransactionDedupObject {
            id,
            digest,
            expiration: tx.expiration,
        })?;

        if !skip.contains(SkipFlags::TRANSACTION_SIGNATURES) {
            let (active, owner) = tx.required_authorities();
            let keys: BTreeSet<PublicKey> = tx.signatures.iter().cloned().collect();
            self.db.verify_authority(&active, &owner, &keys)?;
        }

        let ctx = EvalContext::at(now);
        for op in &tx.operations {
            evaluator::apply_operation(&mut self.db, &ctx, op)?;
        }
        Ok(())
    }
}
