use std::collections::BTreeMap;

use serde::{Serialize, de::DeserializeOwned};

use crate::{
    error::{MeridianResult, StateError},
    protocol::{MAX_INSTANCE, ObjectId, ObjectTag},
};

/// An entity type storable in a [`Table`]. Objects carry their own instance
/// number; the table guarantees it matches the primary key.
pub trait StoredObject: Clone + std::fmt::Debug + Serialize + DeserializeOwned {
    const TAG: ObjectTag;

    /// Schema identity folded into snapshot section digests. Bump the
    /// version suffix on any layout change.
    const SCHEMA: &'static str;

    /// The typed id wrapper for this entity.
    type Id: Copy + From<u64> + Into<u64> + std::fmt::Debug;

    fn instance(&self) -> u64;

    fn object_id(&self) -> ObjectId {
        ObjectId::new(Self::TAG, self.instance())
    }
}

/// Typed secondary indices attached to a table.
///
/// Implementations keep derived lookup structures (price ordering,
/// composite uniqueness, expiration ordering) in sync with the primary rows.
/// They are only ever driven through the table's mutation pipeline; a
/// failed insert aborts the primary mutation.
pub trait SecondaryIndexes<T>: Default {
    fn insert(&mut self, obj: &T) -> MeridianResult<()>;

    fn remove(&mut self, obj: &T);
}

impl<T> SecondaryIndexes<T> for () {
    fn insert(&mut self, _obj: &T) -> MeridianResult<()> {
        Ok(())
    }

    fn remove(&mut self, _obj: &T) {}
}

/// Primary storage for one entity type: rows by instance plus the type's
/// secondary indices. Mutations return enough information for the caller to
/// journal an inverse operation; the table itself knows nothing about undo.
#[derive(Debug, Default)]
pub struct Table<T: StoredObject, I: SecondaryIndexes<T> = ()> {
    rows: BTreeMap<u64, T>,
    next_instance: u64,
    pub index: I,
}

impl<T: StoredObject, I: SecondaryIndexes<T>> Table<T, I> {
    pub fn new() -> Self {
        Self {
            rows: BTreeMap::new(),
            next_instance: 0,
            index: I::default(),
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn next_instance(&self) -> u64 {
        self.next_instance
    }

    pub fn find(&self, instance: u64) -> Option<&T> {
        self.rows.get(&instance)
    }

    pub fn get(&self, instance: u64) -> MeridianResult<&T> {
        self.rows
            .get(&instance)
            .ok_or_else(|| StateError::UnknownObject(ObjectId::new(T::TAG, instance)).into())
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.rows.values()
    }

    /// Creates the next instance from `ctor`, which receives the assigned
    /// instance number and must store it on the object.
    pub fn create(&mut self, ctor: impl FnOnce(u64) -> T) -> MeridianResult<u64> {
        let instance = self.next_instance;
        if instance > MAX_INSTANCE {
            return Err(crate::error::ArithmeticError::Overflow("instance counter").into());
        }
        let obj = ctor(instance);
        debug_assert_eq!(obj.instance(), instance);
        self.index.insert(&obj)?;
        self.rows.insert(instance, obj);
        self.next_instance = instance + 1;
        Ok(instance)
    }

    /// Applies `mutator` to the row, keeping secondary indices in sync.
    /// Returns the pre-image for undo journaling. If reindexing the mutated
    /// row fails, the mutation is rolled back and the error surfaces.
    pub fn modify(
        &mut self,
        instance: u64,
        mutator: impl FnOnce(&mut T) -> MeridianResult<()>,
    ) -> MeridianResult<T> {
        let row = self
            .rows
            .get_mut(&instance)
            .ok_or(StateError::UnknownObject(ObjectId::new(T::TAG, instance)))?;
        let old = row.clone();
        if let Err(e) = mutator(row) {
            *row = old;
            return Err(e);
        }
        debug_assert_eq!(row.instance(), instance);
        self.index.remove(&old);
        let reindex = self.index.insert(row);
        if let Err(e) = reindex {
            // Restore the pre-image and its index entries; the old keys were
            // present moments ago, so reinsertion cannot fail.
            *row = old.clone();
            let _ = self.index.insert(&old);
            return Err(e);
        }
        Ok(old)
    }

    /// Removes and returns the row.
    pub fn remove(&mut self, instance: u64) -> MeridianResult<T> {
        let obj = self
            .rows
            .remove(&instance)
            .ok_or(StateError::UnknownObject(ObjectId::new(T::TAG, instance)))?;
        self.index.remove(&obj);
        Ok(obj)
    }

    // ---- undo/restore plumbing -----------------------------------------
    // These bypass journaling; they are only called while unwinding a
    // session or replaying a snapshot, where the operation is known valid.

    pub(crate) fn revert_create(&mut self, instance: u64) {
        if let Some(obj) = self.rows.remove(&instance) {
            self.index.remove(&obj);
        }
        self.next_instance = instance;
    }

    pub(crate) fn revert_modify(&mut self, old: T) {
        let instance = old.instance();
        if let Some(row) = self.rows.get_mut(&instance) {
            self.index.remove(row);
            if self.index.insert(&old).is_err() {
                tracing::error!(object = %old.object_id(), "undo reindex failed");
            }
            *row = old;
        }
    }

    pub(crate) fn revert_remove(&mut self, old: T) {
        let instance = old.instance();
        if self.index.insert(&old).is_err() {
            tracing::error!(object = %old.object_id(), "undo reinsert failed");
        }
        self.rows.insert(instance, old);
    }

    /// Inserts a snapshot record through the index pipeline.
    pub(crate) fn restore(&mut self, obj: T) -> MeridianResult<()> {
        self.index.insert(&obj)?;
        self.rows.insert(obj.instance(), obj);
        Ok(())
    }

    pub(crate) fn set_next_instance(&mut self, next: u64) {
        self.next_instance = next;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
    struct Row {
        id: u64,
        name: String,
    }

    impl StoredObject for Row {
        const TAG: ObjectTag = ObjectTag::Account;
        const SCHEMA: &'static str = "test-row-v1";
        type Id = crate::protocol::AccountId;

        fn instance(&self) -> u64 {
            self.id
        }
    }

    #[derive(Default)]
    struct UniqueName(std::collections::BTreeMap<String, u64>);

    impl SecondaryIndexes<Row> for UniqueName {
        fn insert(&mut self, obj: &Row) -> MeridianResult<()> {
            if self.0.contains_key(&obj.name) {
                return Err(StateError::NameTaken(obj.name.clone()).into());
            }
            self.0.insert(obj.name.clone(), obj.id);
            Ok(())
        }

        fn remove(&mut self, obj: &Row) {
            self.0.remove(&obj.name);
        }
    }

    fn row(id: u64, name: &str) -> Row {
        Row {
            id,
            name: name.to_owned(),
        }
    }

    #[test]
    fn create_assigns_monotonic_instances() {
        let mut table: Table<Row, UniqueName> = Table::new();
        let a = table.create(|id| row(id, "a")).unwrap();
        let b = table.create(|id| row(id, "b")).unwrap();
        assert_eq!((a, b), (0, 1));
        assert_eq!(table.index.0.len(), 2);
    }

    #[test]
    fn unique_violation_rolls_back_primary() {
        let mut table: Table<Row, UniqueName> = Table::new();
        table.create(|id| row(id, "a")).unwrap();
        assert!(table.create(|id| row(id, "a")).is_err());
        // The failed create must not leave a row or consume an instance.
        assert_eq!(table.len(), 1);
        assert_eq!(table.next_instance(), 1);
    }

    #[test]
    fn failed_modify_restores_old_index_entries() {
        let mut table: Table<Row, UniqueName> = Table::new();
        table.create(|id| row(id, "a")).unwrap();
        table.create(|id| row(id, "b")).unwrap();
        let err = table.modify(1, |r| {
            r.name = "a".to_owned();
            Ok(())
        });
        assert!(err.is_err());
        assert_eq!(table.get(1).unwrap().name, "b");
        assert_eq!(table.index.0.get("b"), Some(&1));
    }
}
