//! Core use-case services.
//!
//! # Responsibility
//! - Orchestrate store reads, evaluators and guarded writes into use-case
//!   level APIs.
//! - Keep transport layers decoupled from storage details.

pub mod account_mutator;
pub mod error;

pub use account_mutator::{
    AccountMutator, ActiveDeposit, AttendanceInfo, CheckInOutcome, DepositInfo, IdentifyOutcome,
    JackpotOutcome, MiningInfo, MiningOutcome, OpenedDeposit, RoomPurchase, SettledDeposit,
    TradeOutcome,
};
pub use error::{EconomyError, EconomyResult, ErrorClass};
