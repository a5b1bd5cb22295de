//! The composition root owning one instance of every payment facet.

use crate::{
    Balances, CoinGecko, FeeEstimate, FeeEstimator, FeeRequest, PriceFeed, QuoteService,
    TransferExecutor, fetch_balances,
};
use alloy_primitives::TxHash;
use rampay_common::{Asset, Fiat, PaymentError, units};
use rampay_config::Config;
use rampay_wallets::{RpcWallet, SessionManager, SessionState, WalletProvider, WalletSigner};
use std::sync::Arc;

/// A wallet session with its quote, fee and transfer facets.
///
/// The session is the only shared input: the other facets read it through this type and never
/// mutate it.
#[derive(Debug)]
pub struct PaymentApp {
    config: Config,
    session: SessionManager,
    quotes: QuoteService,
    fees: Option<FeeEstimator>,
    transfers: Option<TransferExecutor>,
    asset: Asset,
    fiat: Fiat,
}

impl PaymentApp {
    /// Wires the facets. Without a `provider` only quotes are available.
    pub fn new(
        config: Config,
        provider: Option<Arc<dyn WalletProvider>>,
        feed: Arc<dyn PriceFeed>,
    ) -> Self {
        let fees = provider.clone().map(|provider| FeeEstimator::new(provider, &config));
        let transfers = provider.clone().map(|provider| TransferExecutor::new(provider, &config));
        Self {
            session: SessionManager::new(provider, config.chain_id),
            quotes: QuoteService::new(feed, config.quote_interval()),
            fees,
            transfers,
            asset: Asset::default(),
            fiat: config.fiat,
            config,
        }
    }

    /// Connects to the configured JSON-RPC wallet and price feed.
    pub fn from_config(config: Config) -> Result<Self, PaymentError> {
        let provider = RpcWallet::connect(&config).map_err(PaymentError::from)?;
        let feed = CoinGecko::from_config(&config)?;
        Ok(Self::new(config, Some(Arc::new(provider)), Arc::new(feed)))
    }

    /// Restores the session, subscribes to wallet events and starts the quote timer.
    pub async fn start(&mut self) {
        self.session.start().await;
        self.quotes.start();
    }

    /// Releases the wallet subscription and stops the quote timer.
    pub fn stop(&mut self) {
        self.session.stop();
        self.quotes.stop();
    }

    /// Applies queued wallet events and recomputes the fee if its inputs changed.
    pub async fn sync(&mut self) {
        self.session.drain_events().await;
        self.update_fee().await;
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn session(&self) -> &SessionManager {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut SessionManager {
        &mut self.session
    }

    pub fn quotes(&self) -> &QuoteService {
        &self.quotes
    }

    pub fn fees(&self) -> Option<&FeeEstimator> {
        self.fees.as_ref()
    }

    pub fn transfers(&self) -> Option<&TransferExecutor> {
        self.transfers.as_ref()
    }

    pub fn asset(&self) -> Asset {
        self.asset
    }

    pub fn select_asset(&mut self, asset: Asset) {
        self.asset = asset;
    }

    pub fn fiat(&self) -> Fiat {
        self.fiat
    }

    pub fn select_fiat(&mut self, fiat: Fiat) {
        self.fiat = fiat;
    }

    /// Connected and on the supported network.
    pub fn is_ready(&self) -> bool {
        self.session.is_ready()
    }

    /// The signer, if the session is ready.
    fn ready_signer(&self) -> Result<WalletSigner, PaymentError> {
        let session = self.session.session();
        match session.state(self.config.chain_id) {
            SessionState::ConnectedCorrectNetwork => {}
            SessionState::ConnectedWrongNetwork => {
                return Err(PaymentError::WrongNetwork {
                    expected: self.config.chain_id,
                    actual: session.chain_id.unwrap_or_default(),
                });
            }
            SessionState::Disconnected | SessionState::Connecting => {
                return Err(PaymentError::NotConnected);
            }
        }
        self.session.signer().ok_or(PaymentError::NotConnected)
    }

    /// Balances of the connected account, `None` when not connected or on another network.
    pub async fn balances(&self) -> Result<Option<Balances>, PaymentError> {
        let session = self.session.session();
        let (Some(provider), Some(account), Some(chain_id)) =
            (self.session.provider(), session.address, session.chain_id)
        else {
            return Ok(None);
        };
        fetch_balances(provider.as_ref(), &self.config, account, chain_id).await
    }

    /// Fiat price of one unit of the selected asset, if a quote is available.
    pub fn rate(&self) -> Option<f64> {
        self.quotes.quote().map(|quote| quote.rate(self.asset, self.fiat))
    }

    /// Renders the selected-asset amount a fiat `amount` buys at the latest quote.
    pub fn estimate_crypto(&self, amount: &str) -> Option<String> {
        units::estimate_crypto(amount, self.rate()?)
    }

    fn fee_request(&self, signer: WalletSigner) -> FeeRequest {
        let quotes = self.quotes.state();
        FeeRequest {
            signer,
            signer_generation: self.session.signer_generation(),
            asset: self.asset,
            fiat: self.fiat,
            quote: quotes.quote,
            quote_seq: quotes.quote_seq,
        }
    }

    /// Recomputes the fee if the signer, account, asset, fiat currency or quote changed.
    pub async fn update_fee(&mut self) -> bool {
        let request = self.ready_signer().ok().map(|signer| self.fee_request(signer));
        match &mut self.fees {
            Some(fees) => fees.update(request).await,
            None => false,
        }
    }

    /// Recomputes the fee for the selected asset.
    pub async fn estimate_fee(&mut self) -> Result<FeeEstimate, PaymentError> {
        let request = self.fee_request(self.ready_signer()?);
        let fees = self.fees.as_mut().ok_or(PaymentError::ProviderUnavailable)?;
        fees.refresh(request).await
    }

    /// Sends `amount` of the selected asset to `recipient`.
    pub async fn send(&self, recipient: &str, amount: &str) -> Result<TxHash, PaymentError> {
        let transfers = self.transfers.as_ref().ok_or(PaymentError::ProviderUnavailable)?;
        let signer = self.ready_signer()?;
        transfers.send(Some(&signer), self.asset, recipient, amount).await
    }

    /// Sends the selected-asset equivalent of the fiat `amount` at the latest quote.
    pub async fn send_fiat(&self, recipient: &str, amount: &str) -> Result<TxHash, PaymentError> {
        let rate = self.rate().ok_or_else(|| PaymentError::invalid_input("no price quote yet"))?;
        let crypto = units::estimate_crypto(amount, rate)
            .ok_or_else(|| PaymentError::invalid_input(format!("invalid fiat amount `{amount}`")))?;
        debug!(%amount, %crypto, fiat = %self.fiat, asset = %self.asset, "converted fiat amount");
        self.send(recipient, &crypto).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{FiatRates, Quote, TransferStatus};
    use alloy_primitives::{Address, U256, address};
    use async_trait::async_trait;
    use rampay_wallets::mock::{MockWallet, SentTransfer};

    const ALICE: Address = address!("0x00000000000000000000000000000000000a11ce");
    const BOB: &str = "0x0000000000000000000000000000000000000b0b";
    const QUOTE: Quote = Quote {
        native: FiatRates { inr: 200_000.0, usd: 2_500.0 },
        token: FiatRates { inr: 80.0, usd: 1.0 },
    };

    #[derive(Debug)]
    struct FixedFeed;

    #[async_trait]
    impl PriceFeed for FixedFeed {
        async fn fetch(&self) -> Result<Quote, PaymentError> {
            Ok(QUOTE)
        }
    }

    async fn app(wallet: &Arc<MockWallet>) -> PaymentApp {
        let provider = wallet.clone() as Arc<dyn WalletProvider>;
        let mut app = PaymentApp::new(Config::default(), Some(provider), Arc::new(FixedFeed));
        app.start().await;
        app.quotes().refresh().await.unwrap();
        app
    }

    #[tokio::test]
    async fn gated_on_supported_network() {
        let wallet = Arc::new(MockWallet::authorized(1, vec![ALICE]));
        let mut app = app(&wallet).await;

        assert!(!app.is_ready());
        assert_eq!(
            app.send(BOB, "1").await,
            Err(PaymentError::WrongNetwork { expected: Config::SEPOLIA_CHAIN_ID, actual: 1 })
        );
        assert_eq!(app.balances().await, Ok(None));
        assert!(!app.update_fee().await);

        wallet.change_chain(Config::SEPOLIA_CHAIN_ID);
        app.sync().await;
        assert!(app.is_ready());
        assert!(app.fees().unwrap().state().estimate.is_some());
        assert!(app.balances().await.unwrap().is_some());
    }

    #[tokio::test]
    async fn disconnected_app() {
        let wallet = Arc::new(MockWallet::new(Config::SEPOLIA_CHAIN_ID, vec![ALICE]));
        let mut app = app(&wallet).await;

        assert_eq!(app.send(BOB, "1").await, Err(PaymentError::NotConnected));
        assert_eq!(app.estimate_fee().await, Err(PaymentError::NotConnected));

        let mut no_wallet = PaymentApp::new(Config::default(), None, Arc::new(FixedFeed));
        no_wallet.start().await;
        assert_eq!(no_wallet.session_mut().connect().await, Err(PaymentError::ProviderUnavailable));
        assert_eq!(no_wallet.send(BOB, "1").await, Err(PaymentError::ProviderUnavailable));
        assert_eq!(no_wallet.balances().await, Ok(None));
    }

    #[tokio::test]
    async fn converts_fiat_with_live_rate() {
        let wallet = Arc::new(MockWallet::authorized(Config::SEPOLIA_CHAIN_ID, vec![ALICE]));
        let mut app = app(&wallet).await;

        assert_eq!(app.estimate_crypto("200").as_deref(), Some("0.001000"));
        app.select_fiat(Fiat::Usd);
        assert_eq!(app.estimate_crypto("25").as_deref(), Some("0.010000"));
        app.select_asset(Asset::Token);
        assert_eq!(app.estimate_crypto("25").as_deref(), Some("25.000000"));
        assert_eq!(app.estimate_crypto("abc"), None);
    }

    #[tokio::test]
    async fn sends_from_fiat() {
        let wallet = Arc::new(MockWallet::authorized(Config::SEPOLIA_CHAIN_ID, vec![ALICE]));
        let mut app = app(&wallet).await;

        app.select_asset(Asset::Token);
        let hash = app.send_fiat(BOB, "800").await.unwrap();
        assert_eq!(
            wallet.state().sent,
            vec![SentTransfer::Token {
                from: ALICE,
                token: Config::SEPOLIA_USDC,
                to: BOB.parse().unwrap(),
                amount: U256::from(10_000_000u64),
            }]
        );
        let attempt = app.transfers().unwrap().attempt();
        assert_eq!(attempt.status, TransferStatus::Success);
        assert_eq!(attempt.hash, Some(hash));

        assert!(matches!(app.send_fiat(BOB, "-1").await, Err(PaymentError::InvalidInput(_))));
    }

    #[tokio::test]
    async fn fee_follows_asset_and_signer() {
        let wallet = Arc::new(MockWallet::authorized(Config::SEPOLIA_CHAIN_ID, vec![ALICE]));
        let mut app = app(&wallet).await;

        assert!(app.update_fee().await);
        assert!(!app.update_fee().await);
        assert_eq!(app.fees().unwrap().state().estimate.map(|e| e.gas_units), Some(21_000));

        app.select_asset(Asset::Token);
        assert!(app.update_fee().await);
        let estimate = app.fees().unwrap().state().estimate.unwrap();
        assert_eq!(estimate.gas_units, 50_000);
        assert!(estimate.cost_alternate.is_some());

        wallet.change_accounts(vec![]);
        app.sync().await;
        assert_eq!(app.fees().unwrap().state().estimate, None);

        wallet.state().gas_price = None;
        wallet.change_accounts(vec![ALICE]);
        app.sync().await;
        let state = app.fees().unwrap().state();
        assert_eq!(state.estimate, None);
        assert_eq!(state.error, Some(PaymentError::GasPriceUnavailable));
        assert_eq!(app.estimate_fee().await, Err(PaymentError::GasPriceUnavailable));
    }

    #[tokio::test]
    async fn fee_follows_quotes_and_fiat() {
        let wallet = Arc::new(MockWallet::authorized(Config::SEPOLIA_CHAIN_ID, vec![ALICE]));
        let provider = wallet.clone() as Arc<dyn WalletProvider>;
        let mut app = PaymentApp::new(Config::default(), Some(provider), Arc::new(FixedFeed));
        app.session_mut().start().await;

        assert!(app.update_fee().await);
        assert_eq!(app.fees().unwrap().state().estimate.unwrap().cost_fiat, None);

        app.quotes().refresh().await.unwrap();
        assert!(app.update_fee().await);
        let estimate = app.fees().unwrap().state().estimate.unwrap();
        assert_eq!(estimate.cost_fiat_display().as_deref(), Some("4.20"));

        app.select_fiat(Fiat::Usd);
        assert!(app.update_fee().await);
        let estimate = app.fees().unwrap().state().estimate.unwrap();
        assert_eq!(estimate.cost_fiat_display().as_deref(), Some("0.05"));
        assert!(!app.update_fee().await);
    }
}
