//! Common types and helpers shared by the rampay crates.

#![cfg_attr(not(test), warn(unused_crate_dependencies))]

pub mod asset;
pub mod errors;
pub mod units;

pub use asset::{Asset, Fiat};
pub use errors::PaymentError;
