//! An in-memory [`WalletProvider`] for tests.

use crate::{ProviderError, WalletEvent, WalletEvents, WalletProvider, WalletSigner};
use alloy_primitives::{Address, ChainId, TxHash, U256};
use async_trait::async_trait;
use parking_lot::{Mutex, MutexGuard};
use std::{collections::HashMap, time::Duration};
use tokio::sync::{Notify, mpsc};

/// A transfer broadcast through the [`MockWallet`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SentTransfer {
    Value { from: Address, to: Address, value: U256 },
    Token { from: Address, token: Address, to: Address, amount: U256 },
}

/// Scriptable state of a [`MockWallet`]. Tests mutate it through [`MockWallet::state`].
#[derive(Debug)]
pub struct MockState {
    /// Accounts granted on the next `request_accounts`.
    pub wallet_accounts: Vec<Address>,
    /// Accounts currently authorized for this application.
    pub authorized: Vec<Address>,
    pub chain_id: ChainId,
    /// Chains `switch_chain` can move to.
    pub known_chains: Vec<ChainId>,
    pub request_error: Option<ProviderError>,
    pub signer_error: Option<ProviderError>,
    /// How long `signer` takes to answer.
    pub signer_delay: Option<Duration>,
    pub switch_error: Option<ProviderError>,
    pub revoke_error: Option<ProviderError>,
    pub gas_price: Option<u128>,
    pub gas_price_error: Option<ProviderError>,
    pub token_estimate: Result<u64, ProviderError>,
    pub send_error: Option<ProviderError>,
    pub confirm_error: Option<ProviderError>,
    /// Makes `wait_for_confirmation` block until [`MockWallet::confirm`] is called.
    pub hold_confirmations: bool,
    pub balances: HashMap<Address, U256>,
    pub token_balances: HashMap<Address, U256>,
    pub sent: Vec<SentTransfer>,
    pub request_count: usize,
    pub revoke_count: usize,
}

/// In-memory wallet provider.
#[derive(Debug)]
pub struct MockWallet {
    state: Mutex<MockState>,
    subscribers: Mutex<Vec<mpsc::UnboundedSender<WalletEvent>>>,
    confirmations: Notify,
}

impl MockWallet {
    /// A wallet on `chain_id` holding `accounts`, none of them authorized yet.
    pub fn new(chain_id: ChainId, accounts: Vec<Address>) -> Self {
        Self {
            state: Mutex::new(MockState {
                wallet_accounts: accounts,
                authorized: Vec::new(),
                chain_id,
                known_chains: vec![chain_id],
                request_error: None,
                signer_error: None,
                signer_delay: None,
                switch_error: None,
                revoke_error: None,
                gas_price: Some(1_000_000_000),
                gas_price_error: None,
                token_estimate: Ok(50_000),
                send_error: None,
                confirm_error: None,
                hold_confirmations: false,
                balances: HashMap::new(),
                token_balances: HashMap::new(),
                sent: Vec::new(),
                request_count: 0,
                revoke_count: 0,
            }),
            subscribers: Mutex::new(Vec::new()),
            confirmations: Notify::new(),
        }
    }

    /// Same as [`MockWallet::new`] with every account already authorized.
    pub fn authorized(chain_id: ChainId, accounts: Vec<Address>) -> Self {
        let wallet = Self::new(chain_id, accounts.clone());
        wallet.state().authorized = accounts;
        wallet
    }

    pub fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock()
    }

    /// Pushes `event` to every live subscription.
    pub fn emit(&self, event: WalletEvent) {
        self.subscribers.lock().retain(|tx| tx.send(event.clone()).is_ok());
    }

    /// Switches accounts from inside the wallet, notifying subscribers.
    pub fn change_accounts(&self, accounts: Vec<Address>) {
        self.state().authorized = accounts.clone();
        self.emit(WalletEvent::AccountsChanged(accounts));
    }

    /// Switches chain from inside the wallet, notifying subscribers.
    pub fn change_chain(&self, chain_id: ChainId) {
        self.state().chain_id = chain_id;
        self.emit(WalletEvent::ChainChanged(chain_id));
    }

    /// Number of subscriptions that are still alive.
    pub fn subscriber_count(&self) -> usize {
        let mut subscribers = self.subscribers.lock();
        subscribers.retain(|tx| !tx.is_closed());
        subscribers.len()
    }

    /// Releases one held confirmation.
    pub fn confirm(&self) {
        self.confirmations.notify_one();
    }

    fn next_hash(state: &MockState) -> TxHash {
        TxHash::with_last_byte(state.sent.len() as u8)
    }
}

#[async_trait]
impl WalletProvider for MockWallet {
    async fn request_accounts(&self) -> Result<Vec<Address>, ProviderError> {
        let mut state = self.state();
        state.request_count += 1;
        if let Some(err) = state.request_error.clone() {
            return Err(err);
        }
        state.authorized = state.wallet_accounts.clone();
        Ok(state.authorized.clone())
    }

    async fn accounts(&self) -> Result<Vec<Address>, ProviderError> {
        Ok(self.state().authorized.clone())
    }

    async fn chain_id(&self) -> Result<ChainId, ProviderError> {
        Ok(self.state().chain_id)
    }

    async fn switch_chain(&self, chain_id: ChainId) -> Result<(), ProviderError> {
        {
            let mut state = self.state();
            if let Some(err) = state.switch_error.clone() {
                return Err(err);
            }
            if !state.known_chains.contains(&chain_id) {
                return Err(ProviderError::unrecognized_chain(chain_id));
            }
            state.chain_id = chain_id;
        }
        self.emit(WalletEvent::ChainChanged(chain_id));
        Ok(())
    }

    async fn revoke_permissions(&self) -> Result<(), ProviderError> {
        let mut state = self.state();
        state.revoke_count += 1;
        if let Some(err) = state.revoke_error.clone() {
            return Err(err);
        }
        state.authorized.clear();
        Ok(())
    }

    async fn signer(&self, account: Address) -> Result<WalletSigner, ProviderError> {
        let delay = self.state().signer_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let state = self.state();
        match state.signer_error.clone() {
            Some(err) => Err(err),
            None => Ok(WalletSigner::new(account, state.chain_id)),
        }
    }

    fn subscribe(&self) -> WalletEvents {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.lock().push(tx);
        WalletEvents::new(rx)
    }

    async fn balance(&self, account: Address) -> Result<U256, ProviderError> {
        Ok(self.state().balances.get(&account).copied().unwrap_or_default())
    }

    async fn token_balance(&self, _token: Address, owner: Address) -> Result<U256, ProviderError> {
        Ok(self.state().token_balances.get(&owner).copied().unwrap_or_default())
    }

    async fn gas_price(&self) -> Result<Option<u128>, ProviderError> {
        let state = self.state();
        match state.gas_price_error.clone() {
            Some(err) => Err(err),
            None => Ok(state.gas_price),
        }
    }

    async fn estimate_token_transfer(
        &self,
        _signer: &WalletSigner,
        _token: Address,
        _to: Address,
        _amount: U256,
    ) -> Result<u64, ProviderError> {
        self.state().token_estimate.clone()
    }

    async fn send_value(
        &self,
        signer: &WalletSigner,
        to: Address,
        value: U256,
    ) -> Result<TxHash, ProviderError> {
        let mut state = self.state();
        if let Some(err) = state.send_error.clone() {
            return Err(err);
        }
        state.sent.push(SentTransfer::Value { from: signer.address, to, value });
        Ok(Self::next_hash(&state))
    }

    async fn send_token(
        &self,
        signer: &WalletSigner,
        token: Address,
        to: Address,
        amount: U256,
    ) -> Result<TxHash, ProviderError> {
        let mut state = self.state();
        if let Some(err) = state.send_error.clone() {
            return Err(err);
        }
        state.sent.push(SentTransfer::Token { from: signer.address, token, to, amount });
        Ok(Self::next_hash(&state))
    }

    async fn wait_for_confirmation(&self, _hash: TxHash) -> Result<(), ProviderError> {
        let hold = self.state().hold_confirmations;
        if hold {
            self.confirmations.notified().await;
        }
        match self.state().confirm_error.clone() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}
