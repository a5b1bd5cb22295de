//! # rampay
//!
//! Fiat-to-crypto payments from a browser-style wallet.
//!
//! A [`PaymentApp`] owns one of each facet:
//! - the wallet [`SessionManager`](rampay_wallets::SessionManager)
//! - the [`QuoteService`], polling a [`PriceFeed`] for fiat rates
//! - the [`FeeEstimator`], pricing a transfer of the chosen asset
//! - the [`TransferExecutor`], submitting one transfer at a time

#![cfg_attr(not(test), warn(unused_crate_dependencies))]

#[macro_use]
extern crate tracing;

mod app;
pub use app::PaymentApp;

pub mod balances;
pub use balances::{Balances, fetch_balances};

pub mod fee;
pub use fee::{FeeEstimate, FeeEstimator, FeeRequest, FeeState, FeeTrigger};

pub mod quote;
pub use quote::{CoinGecko, FiatRates, PriceFeed, Quote, QuoteService, QuoteState};

pub mod transfer;
pub use transfer::{TransferAttempt, TransferExecutor, TransferStatus};
