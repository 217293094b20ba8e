//! Pure reward and limit evaluators.
//!
//! # Responsibility
//! - Decide what a mutation should do given current records, today's date
//!   and an entropy source.
//!
//! # Invariants
//! - No evaluator touches the store; each returns the next record state and
//!   the amounts to move, and the mutator persists them.
//! - All randomness is drawn from the injected `Entropy`.

pub mod attendance;
pub mod deposit;
pub mod jackpot;
pub mod mining;
