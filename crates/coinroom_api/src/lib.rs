//! Transport-free JSON endpoint layer over the Coinroom account mutator.

pub mod api;

pub use api::{ApiError, EconomyApi};
