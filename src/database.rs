//! The chain database: every table, the undo journal, and generic typed
//! access. All state mutation funnels through [`Database::create`],
//! [`Database::modify`] and [`Database::remove`], which journal their own
//! inverses into the open undo session.

mod authority;
mod balances;

use std::io::{Read, Write};

use crate::{
    entity::*,
    error::{MeridianResult, StateError},
    protocol::{
        AccountId, ChainId, ChainParameters, DynamicGlobalPropertyId, GlobalPropertyId, ObjectId,
    },
    store::{SecondaryIndexes, SnapshotReader, SnapshotWriter, StoredObject, Table, UndoStack},
};

/// Object-id sets accumulated while applying a block, drained into observer
/// notifications at commit.
#[derive(Debug, Default, Clone)]
pub struct ChangeLog {
    pub created: Vec<ObjectId>,
    pub changed: Vec<ObjectId>,
    pub removed: Vec<ObjectId>,
}

impl ChangeLog {
    fn mark(&self) -> (usize, usize, usize) {
        (self.created.len(), self.changed.len(), self.removed.len())
    }

    fn truncate(&mut self, mark: (usize, usize, usize)) {
        self.created.truncate(mark.0);
        self.changed.truncate(mark.1);
        self.removed.truncate(mark.2);
    }

    pub fn clear(&mut self) {
        self.created.clear();
        self.changed.clear();
        self.removed.clear();
    }
}

pub struct Database {
    chain_id: ChainId,
    pub(crate) undo: UndoStack<Database>,
    changes: ChangeLog,

    accounts: Table<AccountObject, AccountIndexes>,
    account_statistics: Table<AccountStatisticsObject>,
    assets: Table<AssetObject, AssetIndexes>,
    asset_dynamics: Table<AssetDynamicObject>,
    bitassets: Table<AssetBitassetObject>,
    balances: Table<AccountBalanceObject, BalanceIndexes>,
    limit_orders: Table<LimitOrderObject, LimitOrderIndexes>,
    call_orders: Table<CallOrderObject, CallOrderIndexes>,
    settlements: Table<ForceSettlementObject, SettlementIndexes>,
    collateral_bids: Table<CollateralBidObject, CollateralBidIndexes>,
    pools: Table<LiquidityPoolObject, LiquidityPoolIndexes>,
    proposals: Table<ProposalObject, ProposalIndexes>,
    witnesses: Table<WitnessObject, WitnessIndexes>,
    committee_members: Table<CommitteeMemberObject, CommitteeMemberIndexes>,
    vesting_balances: Table<VestingBalanceObject, VestingBalanceIndexes>,
    globals: Table<GlobalPropertyObject>,
    dynamics: Table<DynamicGlobalPropertyObject>,
    block_summaries: Table<BlockSummaryObject>,
    dedup: Table<TransactionDedupObject, DedupIndexes>,
}

/// Maps an entity type to its table inside the database. One impl per
/// entity, generated below.
pub trait HasTable<T: StoredObject>: Sized {
    type Indexes: SecondaryIndexes<T>;

    fn table(&self) -> &Table<T, Self::Indexes>;
    fn table_mut(&mut self) -> &mut Table<T, Self::Indexes>;
}

macro_rules! has_table {
    ($obj:ty, $idx:ty, $field:ident) => {
        impl HasTable<$obj> for Database {
            type Indexes = $idx;

            fn table(&self) -> &Table<$obj, $idx> {
                &self.$field
            }

            fn table_mut(&mut self) -> &mut Table<$obj, $idx> {
                &mut self.$field
            }
        }
    };
}

has_table!(AccountObject, AccountIndexes, accounts);
has_table!(AccountStatisticsObject, (), account_statistics);
has_table!(AssetObject, AssetIndexes, assets);
has_table!(AssetDynamicObject, (), asset_dynamics);
has_table!(AssetBitassetObject, (), bitassets);
has_table!(AccountBalanceObject, BalanceIndexes, balances);
has_table!(LimitOrderObject, LimitOrderIndexes, limit_orders);
has_table!(CallOrderObject, CallOrderIndexes, call_orders);
has_table!(ForceSettlementObject, SettlementIndexes, settlements);
has_table!(CollateralBidObject, CollateralBidIndexes, collateral_bids);
has_table!(LiquidityPoolObject, LiquidityPoolIndexes, pools);
has_table!(ProposalObject, ProposalIndexes, proposals);
has_table!(WitnessObject, WitnessIndexes, witnesses);
has_table!(CommitteeMemberObject, CommitteeMemberIndexes, committee_members);
has_table!(VestingBalanceObject, VestingBalanceIndexes, vesting_balances);
has_table!(GlobalPropertyObject, (), globals);
has_table!(DynamicGlobalPropertyObject, (), dynamics);
has_table!(BlockSummaryObject, (), block_summaries);
has_table!(TransactionDedupObject, DedupIndexes, dedup);

impl Database {
    pub fn empty(chain_id: ChainId) -> Self {
        Self {
            chain_id,
            undo: UndoStack::default(),
            changes: ChangeLog::default(),
            accounts: Table::new(),
            account_statistics: Table::new(),
            assets: Table::new(),
            asset_dynamics: Table::new(),
            bitassets: Table::new(),
            balances: Table::new(),
            limit_orders: Table::new(),
            call_orders: Table::new(),
            settlements: Table::new(),
            collateral_bids: Table::new(),
            pools: Table::new(),
            proposals: Table::new(),
            witnesses: Table::new(),
            committee_members: Table::new(),
            vesting_balances: Table::new(),
            globals: Table::new(),
            dynamics: Table::new(),
            block_summaries: Table::new(),
            dedup: Table::new(),
        }
    }

    pub fn chain_id(&self) -> ChainId {
        self.chain_id
    }

    // ---- generic typed access ------------------------------------------

    pub fn index<'a, T>(&'a self) -> &'a <Self as HasTable<T>>::Indexes
    where
        T: StoredObject + 'a,
        Self: HasTable<T>,
        <Self as HasTable<T>>::Indexes: 'a,
    {
        &HasTable::<T>::table(self).index
    }

    pub fn find<T>(&self, id: T::Id) -> Option<&T>
    where
        T: StoredObject,
        Self: HasTable<T>,
    {
        HasTable::<T>::table(self).find(id.into())
    }

    pub fn get<T>(&self, id: T::Id) -> MeridianResult<&T>
    where
        T: StoredObject,
        Self: HasTable<T>,
    {
        HasTable::<T>::table(self).get(id.into())
    }

    pub fn iter<'a, T>(&'a self) -> impl Iterator<Item = &'a T>
    where
        T: StoredObject + 'a,
        Self: HasTable<T>,
        <Self as HasTable<T>>::Indexes: 'a,
    {
        HasTable::<T>::table(self).iter()
    }

    /// Creates the next instance of `T`; the constructor receives the
    /// assigned typed id.
    pub fn create<T>(&mut self, ctor: impl FnOnce(T::Id) -> T) -> MeridianResult<T::Id>
    where
        T: StoredObject + Send + 'static,
        Self: HasTable<T>,
    {
        let instance = HasTable::<T>::table_mut(self).create(|i| ctor(T::Id::from(i)))?;
        self.undo
            .record(move |db: &mut Database| HasTable::<T>::table_mut(db).revert_create(instance));
        self.changes.created.push(ObjectId::new(T::TAG, instance));
        Ok(T::Id::from(instance))
    }

    pub fn modify<T>(
        &mut self,
        id: T::Id,
        mutator: impl FnOnce(&mut T) -> MeridianResult<()>,
    ) -> MeridianResult<()>
    where
        T: StoredObject + Send + 'static,
        Self: HasTable<T>,
    {
        let instance: u64 = id.into();
        let old = HasTable::<T>::table_mut(self).modify(instance, mutator)?;
        self.undo
            .record(move |db: &mut Database| HasTable::<T>::table_mut(db).revert_modify(old));
        self.changes.changed.push(ObjectId::new(T::TAG, instance));
        Ok(())
    }

    pub fn remove<T>(&mut self, id: T::Id) -> MeridianResult<T>
    where
        T: StoredObject + Send + 'static,
        Self: HasTable<T>,
    {
        let instance: u64 = id.into();
        let removed = HasTable::<T>::table_mut(self).remove(instance)?;
        let copy = removed.clone();
        self.undo
            .record(move |db: &mut Database| HasTable::<T>::table_mut(db).revert_remove(copy));
        self.changes.removed.push(ObjectId::new(T::TAG, instance));
        Ok(removed)
    }

    // ---- sessions ------------------------------------------------------

    pub fn begin_session(&mut self) {
        self.undo.begin();
    }

    /// Merges the innermost session into its parent (or the irreversible
    /// base).
    pub fn commit_session(&mut self) {
        self.undo.commit();
    }

    /// Rolls the innermost session back, restoring the state at its start.
    pub fn rollback_session(&mut self) {
        if let Some(session) = self.undo.take_top() {
            session.rollback(self);
        }
    }

    pub fn session_depth(&self) -> usize {
        self.undo.depth()
    }

    /// Drops the oldest sessions beyond `horizon`, making those blocks
    /// irreversible.
    pub fn trim_undo_history(&mut self, horizon: usize) {
        while self.undo.depth() > horizon {
            self.undo.discard_oldest();
        }
    }

    // ---- change tracking ----------------------------------------------

    pub fn changes(&self) -> &ChangeLog {
        &self.changes
    }

    pub fn changes_mark(&self) -> (usize, usize, usize) {
        self.changes.mark()
    }

    pub fn truncate_changes(&mut self, mark: (usize, usize, usize)) {
        self.changes.truncate(mark);
    }

    pub fn clear_changes(&mut self) {
        self.changes.clear();
    }

    // ---- singletons ----------------------------------------------------

    pub fn global_properties(&self) -> &GlobalPropertyObject {
        self.globals
            .find(0)
            .expect("global property singleton exists after genesis")
    }

    pub fn dynamic_properties(&self) -> &DynamicGlobalPropertyObject {
        self.dynamics
            .find(0)
            .expect("dynamic global property singleton exists after genesis")
    }

    pub fn parameters(&self) -> &ChainParameters {
        &self.global_properties().parameters
    }

    pub fn head_block_time(&self) -> chrono::DateTime<chrono::Utc> {
        self.dynamic_properties().time
    }

    pub fn head_block_num(&self) -> u32 {
        self.dynamic_properties().head_block_number
    }

    pub fn modify_global_properties(
        &mut self,
        mutator: impl FnOnce(&mut GlobalPropertyObject) -> MeridianResult<()>,
    ) -> MeridianResult<()> {
        self.modify(GlobalPropertyId(0), mutator)
    }

    pub fn modify_dynamic_properties(
        &mut self,
        mutator: impl FnOnce(&mut DynamicGlobalPropertyObject) -> MeridianResult<()>,
    ) -> MeridianResult<()> {
        self.modify(DynamicGlobalPropertyId(0), mutator)
    }

    // ---- common lookups ------------------------------------------------

    pub fn account_by_name(&self, name: &str) -> MeridianResult<&AccountObject> {
        let instance = self
            .accounts
            .index
            .by_name
            .get(name)
            .copied()
            .ok_or_else(|| StateError::UnknownAccountName(name.to_owned()))?;
        self.accounts.get(instance)
    }

    pub fn asset_by_symbol(&self, symbol: &str) -> Option<&AssetObject> {
        let instance = self.assets.index.by_symbol.get(symbol).copied()?;
        self.assets.find(instance)
    }

    pub fn account_statistics_of(
        &self,
        account: AccountId,
    ) -> MeridianResult<&AccountStatisticsObject> {
        let stats_id = self.get::<AccountObject>(account)?.statistics;
        self.get(stats_id)
    }

    // ---- snapshots -----------------------------------------------------

    /// Serializes every table in the canonical order.
    pub fn write_snapshot<W: Write>(&self, out: W) -> MeridianResult<()> {
        let mut writer = SnapshotWriter::new(out, self.chain_id)?;
        writer.section(&self.accounts)?;
        writer.section(&self.account_statistics)?;
        writer.section(&self.assets)?;
        writer.section(&self.asset_dynamics)?;
        writer.section(&self.bitassets)?;
        writer.section(&self.balances)?;
        writer.section(&self.limit_orders)?;
        writer.section(&self.call_orders)?;
        writer.section(&self.settlements)?;
        writer.section(&self.collateral_bids)?;
        writer.section(&self.pools)?;
        writer.section(&self.proposals)?;
        writer.section(&self.witnesses)?;
        writer.section(&self.committee_members)?;
        writer.section(&self.vesting_balances)?;
        writer.section(&self.globals)?;
        writer.section(&self.dynamics)?;
        writer.section(&self.block_summaries)?;
        writer.section(&self.dedup)?;
        writer.finish()
    }

    /// Rebuilds a database from a snapshot, replaying every record through
    /// the index pipeline so secondary indices are reconstructed.
    pub fn load_snapshot<R: Read>(chain_id: ChainId, input: R) -> MeridianResult<Self> {
        let mut db = Self::empty(chain_id);
        let mut reader = SnapshotReader::new(input, chain_id)?;
        reader.section(&mut db.accounts)?;
        reader.section(&mut db.account_statistics)?;
        reader.section(&mut db.assets)?;
        reader.section(&mut db.asset_dynamics)?;
        reader.section(&mut db.bitassets)?;
        reader.section(&mut db.balances)?;
        reader.section(&mut db.limit_orders)?;
        reader.section(&mut db.call_orders)?;
        reader.section(&mut db.settlements)?;
        reader.section(&mut db.collateral_bids)?;
        reader.section(&mut db.pools)?;
        reader.section(&mut db.proposals)?;
        reader.section(&mut db.witnesses)?;
        reader.section(&mut db.committee_members)?;
        reader.section(&mut db.vesting_balances)?;
        reader.section(&mut db.globals)?;
        reader.section(&mut db.dynamics)?;
        reader.section(&mut db.block_summaries)?;
        reader.section(&mut db.dedup)?;
        Ok(db)
    }
}
