//! Core domain logic for Coinroom.
//! This crate is the single source of truth for ledger invariants.

pub mod clock;
pub mod config;
pub mod db;
pub mod entropy;
pub mod import;
pub mod logging;
pub mod model;
pub mod notation;
pub mod policy;
pub mod service;
pub mod store;

pub use clock::{Clock, FixedClock, ManualClock, SystemClock};
pub use config::{ConfigError, EconomyConfig};
pub use entropy::{Entropy, RngEntropy, SequenceEntropy, ThreadEntropy};
pub use import::{import_legacy_dir, ImportError, ImportReport};
pub use logging::{default_log_level, init_logging, init_stderr_logging, logging_status};
pub use model::{
    Account, AccountId, AccountSnapshot, AttendanceState, Deposit, DepositId, DepositProduct,
    LedgerLimits, MiningState, Record, RecordKey, RecordKind, RecordValidationError,
    RoomOwnership, StockPosition, DEFAULT_ROOM_SKIN,
};
pub use notation::{decode, encode, format_balance, NotationError};
pub use service::{AccountMutator, EconomyError, EconomyResult, ErrorClass};
pub use store::{
    LedgerStore, MemoryLedgerStore, Mutation, SqliteLedgerStore, StoreError, StoreResult,
    WriteBatch,
};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::core_version;

    #[test]
    fn version_is_not_empty() {
        assert!(!core_version().is_empty());
    }
}
