use std::collections::BTreeSet;

use crate::{
    database::ChangeLog,
    protocol::{AccountId, ObjectId, Operation, SignedBlock, SignedTransaction},
};

/// Post-commit notification surface for history and indexer plugins.
///
/// Observers run after a block is committed, must not mutate core state,
/// and must tolerate being invoked in any order relative to each other.
pub trait ChainObserver: Send {
    fn applied_block(&mut self, _block: &SignedBlock) {}

    fn pending_transaction(&mut self, _tx: &SignedTransaction) {}

    fn objects_created(&mut self, _ids: &[ObjectId], _impacted: &BTreeSet<AccountId>) {}

    fn objects_changed(&mut self, _ids: &[ObjectId], _impacted: &BTreeSet<AccountId>) {}

    fn objects_removed(&mut self, _ids: &[ObjectId], _impacted: &BTreeSet<AccountId>) {}
}

/// Collects every account an operation references, for the "impacted
/// accounts" argument of observer callbacks.
pub fn operation_impacted_accounts(op: &Operation, impacted: &mut BTreeSet<AccountId>) {
    let mut active = smallvec::SmallVec::new();
    let mut owner = smallvec::SmallVec::new();
    op.required_authorities(&mut active, &mut owner);
    impacted.extend(active);
    impacted.extend(owner);
    impacted.insert(op.fee_payer());
    match op {
        Operation::Transfer(inner) => {
            impacted.insert(inner.to);
        }
        Operation::OverrideTransfer(inner) => {
            impacted.insert(inner.from);
            impacted.insert(inner.to);
        }
        Operation::AssetIssue(inner) => {
            impacted.insert(inner.issue_to_account);
        }
        Operation::AssetUpdateIssuer(inner) => {
            impacted.insert(inner.new_issuer);
        }
        Operation::AccountCreate(inner) => {
            impacted.insert(inner.registrar);
            impacted.insert(inner.referrer);
        }
        Operation::AccountWhitelist(inner) => {
            impacted.insert(inner.account_to_list);
        }
        Operation::VestingBalanceCreate(inner) => {
            impacted.insert(inner.owner);
        }
        Operation::ProposalCreate(inner) => {
            for proposed in &inner.proposed_ops {
                operation_impacted_accounts(proposed, impacted);
            }
        }
        _ => {}
    }
}

/// Impacted accounts of a whole block.
pub fn block_impacted_accounts(block: &SignedBlock) -> BTreeSet<AccountId> {
    let mut impacted = BTreeSet::new();
    for tx in &block.transactions {
        for op in &tx.operations {
            operation_impacted_accounts(op, &mut impacted);
        }
    }
    impacted
}

pub(crate) fn notify_all(
    observers: &mut [Box<dyn ChainObserver>],
    block: &SignedBlock,
    changes: &ChangeLog,
) {
    let impacted = block_impacted_accounts(block);
    for observer in observers.iter_mut() {
        observer.applied_block(block);
        if !changes.created.is_empty() {
            observer.objects_created(&changes.created, &impacted);
        }
        if !changes.changed.is_empty() {
            observer.objects_changed(&changes.changed, &impacted);
        }
        if !changes.removed.is_empty() {
            observer.objects_removed(&changes.removed, &impacted);
        }
    }
}
