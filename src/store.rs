//! The transactional object store: typed tables with secondary indices,
//! nestable undo sessions, and sequential snapshots.

mod snapshot;
mod table;
mod undo;

pub use snapshot::{SnapshotReader, SnapshotWriter};
pub use table::{SecondaryIndexes, StoredObject, Table};
pub use undo::{UndoSession, UndoStack};
