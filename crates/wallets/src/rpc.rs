//! A [`WalletProvider`] backed by a JSON-RPC endpoint whose accounts are managed by the node or
//! wallet behind it.

use crate::{ProviderError, WalletEvent, WalletEvents, WalletProvider, WalletSigner};
use alloy_network::{ReceiptResponse, TransactionBuilder};
use alloy_primitives::{Address, ChainId, TxHash, U256};
use alloy_provider::{DynProvider, PendingTransactionBuilder, Provider, ProviderBuilder};
use alloy_rpc_types::TransactionRequest;
use alloy_sol_types::sol;
use async_trait::async_trait;
use rampay_config::Config;
use std::time::Duration;
use tokio::{sync::mpsc, time::MissedTickBehavior};

sol! {
    #[sol(rpc)]
    interface IERC20 {
        function balanceOf(address owner) external view returns (uint256);
        function transfer(address to, uint256 amount) external returns (bool);
    }
}

/// JSON-RPC wallet provider.
#[derive(Clone, Debug)]
pub struct RpcWallet {
    provider: DynProvider,
    poll_interval: Duration,
    confirmations: u64,
    timeout: Duration,
}

impl RpcWallet {
    pub fn new(provider: DynProvider) -> Self {
        Self {
            provider,
            poll_interval: Duration::from_secs(1),
            confirmations: 1,
            timeout: Duration::from_secs(120),
        }
    }

    /// Connects to the configured `rpc_url` over HTTP.
    pub fn connect(config: &Config) -> Result<Self, ProviderError> {
        let url = config.rpc_url.parse::<url::Url>().map_err(|err| {
            ProviderError::other(format!("invalid rpc url {:?}: {err}", config.rpc_url))
        })?;
        let provider = ProviderBuilder::new().connect_http(url).erased();
        Ok(Self::new(provider)
            .with_poll_interval(config.event_poll_interval())
            .with_confirmations(config.confirmations)
            .with_timeout(config.transaction_timeout()))
    }

    /// How often the event watcher polls accounts and chain id.
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn with_confirmations(mut self, confirmations: u64) -> Self {
        self.confirmations = confirmations;
        self
    }

    /// Upper bound on [`WalletProvider::wait_for_confirmation`].
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl WalletProvider for RpcWallet {
    async fn request_accounts(&self) -> Result<Vec<Address>, ProviderError> {
        Ok(self.provider.raw_request("eth_requestAccounts".into(), ()).await?)
    }

    async fn accounts(&self) -> Result<Vec<Address>, ProviderError> {
        Ok(self.provider.get_accounts().await?)
    }

    async fn chain_id(&self) -> Result<ChainId, ProviderError> {
        Ok(self.provider.get_chain_id().await?)
    }

    async fn switch_chain(&self, chain_id: ChainId) -> Result<(), ProviderError> {
        self.provider
            .raw_request::<_, ()>(
                "wallet_switchEthereumChain".into(),
                [serde_json::json!({ "chainId": format!("{chain_id:#x}") })],
            )
            .await?;
        Ok(())
    }

    async fn revoke_permissions(&self) -> Result<(), ProviderError> {
        self.provider
            .raw_request::<_, ()>(
                "wallet_revokePermissions".into(),
                [serde_json::json!({ "eth_accounts": {} })],
            )
            .await?;
        Ok(())
    }

    async fn signer(&self, account: Address) -> Result<WalletSigner, ProviderError> {
        let chain_id = self.chain_id().await?;
        Ok(WalletSigner::new(account, chain_id))
    }

    fn subscribe(&self) -> WalletEvents {
        let (tx, rx) = mpsc::unbounded_channel();
        let provider = self.provider.clone();
        let poll_interval = self.poll_interval;

        let watcher = tokio::spawn(async move {
            let mut interval = tokio::time::interval(poll_interval);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

            // The first poll only records the baseline.
            let mut accounts: Option<Vec<Address>> = None;
            let mut chain_id: Option<ChainId> = None;
            loop {
                interval.tick().await;

                match provider.get_accounts().await {
                    Ok(current) => {
                        if accounts.as_ref().is_some_and(|prev| *prev != current)
                            && tx.send(WalletEvent::AccountsChanged(current.clone())).is_err()
                        {
                            break;
                        }
                        accounts = Some(current);
                    }
                    Err(err) => debug!(%err, "failed to poll accounts"),
                }

                match provider.get_chain_id().await {
                    Ok(current) => {
                        if chain_id.is_some_and(|prev| prev != current)
                            && tx.send(WalletEvent::ChainChanged(current)).is_err()
                        {
                            break;
                        }
                        chain_id = Some(current);
                    }
                    Err(err) => debug!(%err, "failed to poll chain id"),
                }

                if tx.is_closed() {
                    break;
                }
            }
            trace!("wallet event watcher stopped");
        });

        WalletEvents::with_watcher(rx, watcher)
    }

    async fn balance(&self, account: Address) -> Result<U256, ProviderError> {
        Ok(self.provider.get_balance(account).await?)
    }

    async fn token_balance(&self, token: Address, owner: Address) -> Result<U256, ProviderError> {
        Ok(IERC20::new(token, &self.provider).balanceOf(owner).call().await?)
    }

    async fn gas_price(&self) -> Result<Option<u128>, ProviderError> {
        match self.provider.get_gas_price().await {
            Ok(price) => Ok(Some(price)),
            Err(err) => {
                let err = ProviderError::from(err);
                if err.is_method_not_found() { Ok(None) } else { Err(err) }
            }
        }
    }

    async fn estimate_token_transfer(
        &self,
        signer: &WalletSigner,
        token: Address,
        to: Address,
        amount: U256,
    ) -> Result<u64, ProviderError> {
        Ok(IERC20::new(token, &self.provider)
            .transfer(to, amount)
            .from(signer.address)
            .estimate_gas()
            .await?)
    }

    async fn send_value(
        &self,
        signer: &WalletSigner,
        to: Address,
        value: U256,
    ) -> Result<TxHash, ProviderError> {
        let tx = TransactionRequest::default()
            .with_from(signer.address)
            .with_to(to)
            .with_value(value);
        let pending = self.provider.send_transaction(tx).await?;
        Ok(*pending.tx_hash())
    }

    async fn send_token(
        &self,
        signer: &WalletSigner,
        token: Address,
        to: Address,
        amount: U256,
    ) -> Result<TxHash, ProviderError> {
        let pending = IERC20::new(token, &self.provider)
            .transfer(to, amount)
            .from(signer.address)
            .send()
            .await?;
        Ok(*pending.tx_hash())
    }

    async fn wait_for_confirmation(&self, hash: TxHash) -> Result<(), ProviderError> {
        let receipt = PendingTransactionBuilder::new(self.provider.root().clone(), hash)
            .with_required_confirmations(self.confirmations)
            .with_timeout(Some(self.timeout))
            .get_receipt()
            .await?;
        if !receipt.status() {
            return Err(ProviderError::other(format!("transaction {hash} reverted")));
        }
        Ok(())
    }
}
