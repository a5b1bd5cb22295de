//! The wallet provider capability the payment facets are written against.

use crate::ProviderError;
use alloy_primitives::{Address, ChainId, TxHash, U256};
use async_trait::async_trait;
use std::fmt;
use tokio::{sync::mpsc, task::JoinHandle};

/// An account the provider has authorized to sign, bound to the chain it was derived on.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WalletSigner {
    pub address: Address,
    pub chain_id: ChainId,
}

impl WalletSigner {
    pub const fn new(address: Address, chain_id: ChainId) -> Self {
        Self { address, chain_id }
    }
}

/// A change pushed by the provider.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WalletEvent {
    /// The list of authorized accounts changed; empty when the wallet disconnected.
    AccountsChanged(Vec<Address>),
    ChainChanged(ChainId),
}

/// A live subscription to [`WalletEvent`]s.
///
/// Dropping it unregisters the listener and stops any background watcher feeding it.
#[derive(Debug)]
pub struct WalletEvents {
    rx: mpsc::UnboundedReceiver<WalletEvent>,
    watcher: Option<JoinHandle<()>>,
}

impl WalletEvents {
    /// A subscription fed by whoever holds the sending half.
    pub fn new(rx: mpsc::UnboundedReceiver<WalletEvent>) -> Self {
        Self { rx, watcher: None }
    }

    /// A subscription fed by `watcher`, which is aborted when the subscription is dropped.
    pub fn with_watcher(rx: mpsc::UnboundedReceiver<WalletEvent>, watcher: JoinHandle<()>) -> Self {
        Self { rx, watcher: Some(watcher) }
    }

    /// Waits for the next event. Returns `None` once the provider stopped emitting.
    pub async fn recv(&mut self) -> Option<WalletEvent> {
        self.rx.recv().await
    }

    /// Returns the next queued event without waiting.
    pub fn try_recv(&mut self) -> Option<WalletEvent> {
        self.rx.try_recv().ok()
    }
}

impl Drop for WalletEvents {
    fn drop(&mut self) {
        if let Some(watcher) = self.watcher.take() {
            watcher.abort();
        }
    }
}

/// An EIP-1193 style wallet: account access, chain management, reads and signing.
///
/// Transfers are signed and broadcast by the wallet in one step, the way injected browser
/// wallets handle `eth_sendTransaction`.
#[async_trait]
pub trait WalletProvider: Send + Sync + fmt::Debug {
    /// Requests account access, prompting the user if needed (`eth_requestAccounts`).
    async fn request_accounts(&self) -> Result<Vec<Address>, ProviderError>;

    /// Returns the already-authorized accounts without prompting (`eth_accounts`).
    async fn accounts(&self) -> Result<Vec<Address>, ProviderError>;

    async fn chain_id(&self) -> Result<ChainId, ProviderError>;

    /// Asks the wallet to switch to `chain_id` (`wallet_switchEthereumChain`).
    ///
    /// Fails with [`ProviderError::is_unrecognized_chain`] if the wallet doesn't know the chain.
    async fn switch_chain(&self, chain_id: ChainId) -> Result<(), ProviderError>;

    /// Revokes the account permissions granted to this application.
    async fn revoke_permissions(&self) -> Result<(), ProviderError>;

    /// Derives a signer for `account` on the current chain.
    async fn signer(&self, account: Address) -> Result<WalletSigner, ProviderError>;

    /// Registers a listener for account and chain changes.
    fn subscribe(&self) -> WalletEvents;

    /// Native balance of `account` in wei.
    async fn balance(&self, account: Address) -> Result<U256, ProviderError>;

    /// `balanceOf(owner)` on the `token` contract.
    async fn token_balance(&self, token: Address, owner: Address) -> Result<U256, ProviderError>;

    /// The current gas price in wei, `None` if the network's fee data has no usable gas price.
    async fn gas_price(&self) -> Result<Option<u128>, ProviderError>;

    /// Simulates `transfer(to, amount)` on `token` from `signer` and returns the gas it uses.
    async fn estimate_token_transfer(
        &self,
        signer: &WalletSigner,
        token: Address,
        to: Address,
        amount: U256,
    ) -> Result<u64, ProviderError>;

    /// Sends `value` wei to `to`, returning the transaction hash once broadcast.
    async fn send_value(
        &self,
        signer: &WalletSigner,
        to: Address,
        value: U256,
    ) -> Result<TxHash, ProviderError>;

    /// Calls `transfer(to, amount)` on `token`, returning the transaction hash once broadcast.
    async fn send_token(
        &self,
        signer: &WalletSigner,
        token: Address,
        to: Address,
        amount: U256,
    ) -> Result<TxHash, ProviderError>;

    /// Waits until `hash` is mined and succeeded.
    async fn wait_for_confirmation(&self, hash: TxHash) -> Result<(), ProviderError>;
}
