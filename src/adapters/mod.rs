//! LedgerStore implementations.

pub mod memory_ledger;
pub mod postgres_ledger;

pub use memory_ledger::MemoryLedger;
pub use postgres_ledger::PostgresLedger;
