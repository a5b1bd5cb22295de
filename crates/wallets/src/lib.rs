//! # rampay-wallets
//!
//! Wallet provider access for rampay.
//!
//! The crate follows [EIP-1193](https://eips.ethereum.org/EIPS/eip-1193) semantics:
//! - [`WalletProvider`] is the capability every payment facet is written against
//! - [`RpcWallet`] implements it over a JSON-RPC endpoint whose accounts live in the node or wallet
//! - [`SessionManager`] tracks the connected account and network and reacts to provider events

#![cfg_attr(not(test), warn(unused_crate_dependencies))]

#[macro_use]
extern crate tracing;

pub mod error;
pub use error::ProviderError;

mod provider;
pub use provider::{WalletEvent, WalletEvents, WalletProvider, WalletSigner};

mod rpc;
pub use rpc::RpcWallet;

pub mod session;
pub use session::{Session, SessionManager, SessionState};

#[cfg(any(test, feature = "mock"))]
pub mod mock;
