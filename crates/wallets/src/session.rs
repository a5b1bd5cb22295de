//! Wallet session tracking.
//!
//! The [`SessionManager`] is the only writer of the [`Session`]. It reacts to user actions
//! ([`SessionManager::connect`], [`SessionManager::switch_network`],
//! [`SessionManager::disconnect`]) and to the account and chain changes pushed by the provider.

use crate::{ProviderError, WalletEvent, WalletEvents, WalletProvider, WalletSigner};
use alloy_primitives::{Address, ChainId};
use rampay_common::PaymentError;
use std::sync::Arc;
use tokio::sync::watch;

/// The locally held record of the connected account and network.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Session {
    pub address: Option<Address>,
    pub chain_id: Option<ChainId>,
    /// Set while a `connect` request is awaiting the wallet.
    pub connecting: bool,
    pub last_error: Option<PaymentError>,
}

impl Session {
    /// Where this session stands relative to the `supported` chain.
    pub fn state(&self, supported: ChainId) -> SessionState {
        if self.connecting {
            return SessionState::Connecting;
        }
        match self.address {
            None => SessionState::Disconnected,
            Some(_) if self.chain_id == Some(supported) => SessionState::ConnectedCorrectNetwork,
            Some(_) => SessionState::ConnectedWrongNetwork,
        }
    }
}

/// Connection states of a [`Session`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connecting,
    ConnectedCorrectNetwork,
    ConnectedWrongNetwork,
}

/// Owns the [`Session`] and the provider event subscription.
///
/// Mutations go through `&mut self`, so every transition is applied in full before the next one
/// starts. Observers follow the session through [`SessionManager::subscribe`].
#[derive(Debug)]
pub struct SessionManager {
    provider: Option<Arc<dyn WalletProvider>>,
    supported_chain: ChainId,
    session: watch::Sender<Session>,
    signer: Option<WalletSigner>,
    events: Option<WalletEvents>,
    accounts_seq: u64,
    chain_seq: u64,
    signer_generation: u64,
}

impl SessionManager {
    /// Creates an empty session. `provider` is `None` when no wallet is available.
    pub fn new(provider: Option<Arc<dyn WalletProvider>>, supported_chain: ChainId) -> Self {
        Self {
            provider,
            supported_chain,
            session: watch::Sender::new(Session::default()),
            signer: None,
            events: None,
            accounts_seq: 0,
            chain_seq: 0,
            signer_generation: 0,
        }
    }

    /// Subscribes to provider events and silently restores an already-authorized session.
    pub async fn start(&mut self) {
        if self.events.is_none()
            && let Some(provider) = &self.provider
        {
            self.events = Some(provider.subscribe());
        }
        if let Err(err) = self.restore().await {
            warn!(%err, "failed to restore wallet session");
        }
    }

    /// Releases the provider event subscription.
    pub fn stop(&mut self) {
        self.events = None;
    }

    /// Adopts the first already-authorized account without prompting the user.
    pub async fn restore(&mut self) -> Result<(), PaymentError> {
        let Some(provider) = self.provider.clone() else { return Ok(()) };

        let accounts = provider.accounts().await?;
        let Some(&address) = accounts.first() else {
            trace!("no authorized accounts to restore");
            return Ok(());
        };
        let chain_id = provider.chain_id().await?;
        let signer = provider.signer(address).await?;

        debug!(?address, chain_id, "restored wallet session");
        self.adopt(address, chain_id, signer);
        Ok(())
    }

    /// Requests account access from the wallet.
    ///
    /// Connecting on an unsupported network succeeds with a
    /// [`PaymentError::WrongNetwork`] attached to the session.
    pub async fn connect(&mut self) -> Result<Address, PaymentError> {
        let Some(provider) = self.provider.clone() else {
            let err = PaymentError::ProviderUnavailable;
            self.session.send_modify(|session| session.last_error = Some(err.clone()));
            return Err(err);
        };

        self.session.send_modify(|session| {
            session.connecting = true;
            session.last_error = None;
        });

        match Self::request_connection(provider.as_ref()).await {
            Ok((address, chain_id, signer)) => {
                debug!(?address, chain_id, "wallet connected");
                self.adopt(address, chain_id, signer);
                Ok(address)
            }
            Err(err) => {
                let err = if err.is_user_rejected() {
                    PaymentError::UserRejected
                } else {
                    PaymentError::Unknown(err.message)
                };
                warn!(%err, "failed to connect wallet");
                self.session.send_modify(|session| {
                    session.connecting = false;
                    session.last_error = Some(err.clone());
                });
                Err(err)
            }
        }
    }

    async fn request_connection(
        provider: &dyn WalletProvider,
    ) -> Result<(Address, ChainId, WalletSigner), ProviderError> {
        let accounts = provider.request_accounts().await?;
        let address = *accounts
            .first()
            .ok_or_else(|| ProviderError::other("wallet returned no accounts"))?;
        let chain_id = provider.chain_id().await?;
        let signer = provider.signer(address).await?;
        Ok((address, chain_id, signer))
    }

    /// Asks the wallet to move to the supported network.
    pub async fn switch_network(&mut self) -> Result<(), PaymentError> {
        let Some(provider) = self.provider.clone() else {
            return Err(PaymentError::ProviderUnavailable);
        };

        let chain_id = self.supported_chain;
        if let Err(err) = provider.switch_chain(chain_id).await {
            let err = if err.is_unrecognized_chain() {
                PaymentError::NetworkNotRegistered { chain_id }
            } else {
                PaymentError::SwitchFailed(err.message)
            };
            warn!(%err, chain_id, "failed to switch network");
            self.session.send_modify(|session| session.last_error = Some(err.clone()));
            return Err(err);
        }

        self.session.send_if_modified(|session| {
            let stale = matches!(
                session.last_error,
                Some(PaymentError::NetworkNotRegistered { .. } | PaymentError::SwitchFailed(_))
            );
            if stale {
                session.last_error = None;
            }
            stale
        });
        // The wallet also pushes a chain change; applying it twice is harmless.
        self.apply_chain(chain_id).await;
        Ok(())
    }

    /// Revokes the wallet permissions, best effort, and clears the local session.
    pub async fn disconnect(&mut self) {
        if let Some(provider) = &self.provider
            && let Err(err) = provider.revoke_permissions().await
        {
            warn!(%err, "failed to revoke wallet permissions");
        }

        self.set_signer(None);
        self.session.send_replace(Session::default());
        debug!("wallet disconnected");
    }

    /// Applies one provider event to the session.
    pub async fn handle_event(&mut self, event: WalletEvent) {
        trace!(?event, "wallet event");
        match event {
            WalletEvent::AccountsChanged(accounts) => self.apply_accounts(accounts).await,
            WalletEvent::ChainChanged(chain_id) => self.apply_chain(chain_id).await,
        }
    }

    /// Waits for the next provider event without applying it.
    ///
    /// Cancel safe: an event is never lost if the returned future is dropped, so this is the
    /// branch to `select!` on. Apply the event with [`SessionManager::handle_event`].
    pub async fn recv_event(&mut self) -> Option<WalletEvent> {
        self.events.as_mut()?.recv().await
    }

    /// Waits for the next provider event and applies it.
    ///
    /// Returns `None` when not subscribed or once the provider stopped emitting.
    pub async fn next_event(&mut self) -> Option<WalletEvent> {
        let event = self.recv_event().await?;
        self.handle_event(event.clone()).await;
        Some(event)
    }

    /// Applies every queued provider event, returning how many were applied.
    pub async fn drain_events(&mut self) -> usize {
        let mut applied = 0;
        while let Some(event) = self.events.as_mut().and_then(WalletEvents::try_recv) {
            self.handle_event(event).await;
            applied += 1;
        }
        applied
    }

    // The signer is derived before anything is published: a transition dropped mid-way leaves the
    // previous address and signer in place, never one without the other.
    async fn apply_accounts(&mut self, accounts: Vec<Address>) {
        let Some(&address) = accounts.first() else {
            self.accounts_seq += 1;
            self.set_signer(None);
            self.session.send_modify(|session| session.address = None);
            debug!("wallet accounts cleared");
            return;
        };

        let signer = self.derive_signer(address).await;
        self.accounts_seq += 1;
        self.set_signer(signer);
        self.session.send_modify(|session| session.address = Some(address));
    }

    async fn apply_chain(&mut self, chain_id: ChainId) {
        // Signers are bound to the chain they were derived on.
        let address = self.session.borrow().address;
        let signer = match address {
            Some(address) => Some(self.derive_signer(address).await),
            None => None,
        };

        self.chain_seq += 1;
        if let Some(signer) = signer {
            self.set_signer(signer);
        }
        let wrong_network = self.wrong_network(chain_id);
        self.session.send_modify(|session| {
            session.chain_id = Some(chain_id);
            match wrong_network {
                Some(err) => session.last_error = Some(err),
                None => {
                    if session.last_error.as_ref().is_some_and(PaymentError::is_wrong_network) {
                        session.last_error = None;
                    }
                }
            }
        });
    }

    async fn derive_signer(&self, address: Address) -> Option<WalletSigner> {
        let provider = self.provider.as_ref()?;
        provider
            .signer(address)
            .await
            .inspect_err(|err| error!(%err, ?address, "failed to derive signer"))
            .ok()
    }

    fn set_signer(&mut self, signer: Option<WalletSigner>) {
        self.signer = signer;
        self.signer_generation += 1;
    }

    fn adopt(&mut self, address: Address, chain_id: ChainId, signer: WalletSigner) {
        self.accounts_seq += 1;
        self.chain_seq += 1;
        self.set_signer(Some(signer));
        let wrong_network = self.wrong_network(chain_id);
        self.session.send_replace(Session {
            address: Some(address),
            chain_id: Some(chain_id),
            connecting: false,
            last_error: wrong_network,
        });
    }

    fn wrong_network(&self, chain_id: ChainId) -> Option<PaymentError> {
        (chain_id != self.supported_chain)
            .then_some(PaymentError::WrongNetwork { expected: self.supported_chain, actual: chain_id })
    }

    /// A snapshot of the current session.
    pub fn session(&self) -> Session {
        self.session.borrow().clone()
    }

    pub fn state(&self) -> SessionState {
        self.session.borrow().state(self.supported_chain)
    }

    /// The signer of the connected account, if one could be derived.
    pub fn signer(&self) -> Option<WalletSigner> {
        self.signer
    }

    /// Connected and on the supported network.
    pub fn is_ready(&self) -> bool {
        self.state() == SessionState::ConnectedCorrectNetwork
    }

    /// Follows session changes.
    pub fn subscribe(&self) -> watch::Receiver<Session> {
        self.session.subscribe()
    }

    pub fn provider(&self) -> Option<&Arc<dyn WalletProvider>> {
        self.provider.as_ref()
    }

    pub fn supported_chain(&self) -> ChainId {
        self.supported_chain
    }

    /// Whether the manager currently holds a provider event subscription.
    pub fn is_subscribed(&self) -> bool {
        self.events.is_some()
    }

    /// Number of account changes applied so far.
    pub fn accounts_seq(&self) -> u64 {
        self.accounts_seq
    }

    /// Number of chain changes applied so far.
    pub fn chain_seq(&self) -> u64 {
        self.chain_seq
    }

    /// Bumped every time the signer is replaced or cleared.
    pub fn signer_generation(&self) -> u64 {
        self.signer_generation
    }
}
