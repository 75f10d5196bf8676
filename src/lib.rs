// === Public Modules (The Canonical Paths) ===
pub mod amm;
pub mod chain;
pub mod database;
pub mod entity;
pub mod error;
pub mod evaluator;
pub mod market;
pub mod protocol;
pub mod store;

// === Private Implementation Details ===
mod macros;

// === Facades (Re-exporting the working surface) ===
pub use crate::chain::{Chain, ChainObserver, SignatureVerifier, SkipFlags};
pub use crate::database::Database;
pub use crate::error::{MeridianError, MeridianResult};
pub use crate::protocol::{GenesisState, SignedBlock, SignedTransaction};
