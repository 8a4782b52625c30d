//! Replicated database access over a primary and a set of read secondaries.
//!
//! [`ReplicaDb`] is the entry point: it opens every configured replica
//! concurrently and routes work afterwards. Writes and transactions go to
//! the primary, listing reads rotate round-robin over the secondaries, and
//! administrative operations (ping, prepare, close) fan out to the whole
//! set. [`repository`] builds the resource repositories on top of it.

pub mod db;
pub mod error;
pub mod repository;
pub mod statement;
pub mod tx;

mod scatter;
#[cfg(test)]
mod test_util;

pub use db::{DbConfig, ReplicaDb};
pub use error::DbError;
pub use statement::{PreparedSet, PreparedTarget};
pub use tx::{Transaction, TxState};
