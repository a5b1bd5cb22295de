//! Network fee estimation for a transfer of the chosen asset.

use crate::Quote;
use alloy_primitives::{Address, U256};
use rampay_common::{
    Asset, Fiat, PaymentError,
    units::{CRYPTO_DISPLAY_DECIMALS, FIAT_DISPLAY_DECIMALS, format_fixed, to_decimal, wei_to_gwei},
};
use rampay_config::Config;
use rampay_wallets::{WalletProvider, WalletSigner};
use std::sync::Arc;
use tokio::sync::watch;

/// The cost of one transfer at the current gas price.
#[derive(Clone, Debug, PartialEq)]
pub struct FeeEstimate {
    pub gas_units: u64,
    pub gas_price_wei: u128,
    /// `gas_units * gas_price_wei`.
    pub cost_wei: U256,
    /// The cost in the native asset.
    pub cost_native: f64,
    /// `None` when the native asset's fiat price is unknown.
    pub cost_fiat: Option<f64>,
    /// The cost expressed in the chosen asset, when that is the token and both prices are known.
    pub cost_alternate: Option<f64>,
}

impl FeeEstimate {
    pub fn gas_price_gwei(&self) -> String {
        wei_to_gwei(self.gas_price_wei)
    }

    pub fn cost_native_display(&self) -> String {
        format_fixed(self.cost_native, CRYPTO_DISPLAY_DECIMALS)
    }

    pub fn cost_fiat_display(&self) -> Option<String> {
        self.cost_fiat.map(|cost| format_fixed(cost, FIAT_DISPLAY_DECIMALS))
    }

    pub fn cost_alternate_display(&self) -> Option<String> {
        self.cost_alternate.map(|cost| format_fixed(cost, CRYPTO_DISPLAY_DECIMALS))
    }
}

/// Observable state of the [`FeeEstimator`].
///
/// `estimate` and `error` are never both set.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FeeState {
    pub estimate: Option<FeeEstimate>,
    pub loading: bool,
    pub error: Option<PaymentError>,
}

/// Everything an estimate depends on.
#[derive(Clone, Copy, Debug)]
pub struct FeeRequest {
    pub signer: WalletSigner,
    /// Generation of `signer`, see [`rampay_wallets::SessionManager::signer_generation`].
    pub signer_generation: u64,
    pub asset: Asset,
    pub fiat: Fiat,
    pub quote: Option<Quote>,
    /// See [`crate::QuoteState::quote_seq`].
    pub quote_seq: u64,
}

impl FeeRequest {
    /// The inputs whose change triggers a recompute.
    pub const fn trigger(&self) -> FeeTrigger {
        FeeTrigger {
            account: self.signer.address,
            asset: self.asset,
            signer_generation: self.signer_generation,
            fiat: self.fiat,
            quote_seq: self.quote_seq,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FeeTrigger {
    pub account: Address,
    pub asset: Asset,
    pub signer_generation: u64,
    pub fiat: Fiat,
    pub quote_seq: u64,
}

/// Combines the live gas price with the gas a transfer of the chosen asset uses.
#[derive(Debug)]
pub struct FeeEstimator {
    provider: Arc<dyn WalletProvider>,
    token: Address,
    native_decimals: u8,
    native_transfer_gas: u64,
    token_transfer_gas: u64,
    state: watch::Sender<FeeState>,
    trigger: Option<FeeTrigger>,
}

impl FeeEstimator {
    pub fn new(provider: Arc<dyn WalletProvider>, config: &Config) -> Self {
        Self {
            provider,
            token: config.token_address,
            native_decimals: config.native.decimals,
            native_transfer_gas: config.native_transfer_gas,
            token_transfer_gas: config.token_transfer_gas,
            state: watch::Sender::new(FeeState::default()),
            trigger: None,
        }
    }

    /// Recomputes if the signer, account, asset, fiat currency or quote changed since the last
    /// estimate.
    ///
    /// Without a request (no signer) the state is cleared. Returns `true` if a recompute ran.
    pub async fn update(&mut self, request: Option<FeeRequest>) -> bool {
        let Some(request) = request else {
            if self.trigger.take().is_some() {
                self.state.send_replace(FeeState::default());
            }
            return false;
        };
        if self.trigger == Some(request.trigger()) {
            return false;
        }
        let _ = self.refresh(request).await;
        true
    }

    /// Recomputes unconditionally.
    pub async fn refresh(&mut self, request: FeeRequest) -> Result<FeeEstimate, PaymentError> {
        self.trigger = Some(request.trigger());
        self.state.send_modify(|state| {
            state.loading = true;
            state.error = None;
        });

        let result = self.estimate(&request).await;
        match &result {
            Ok(estimate) => {
                debug!(
                    gas_units = estimate.gas_units,
                    gas_price = estimate.gas_price_wei,
                    "estimated fee"
                );
                self.state.send_replace(FeeState {
                    estimate: Some(estimate.clone()),
                    loading: false,
                    error: None,
                });
            }
            Err(err) => {
                error!(%err, "failed to estimate fee");
                self.state.send_replace(FeeState {
                    estimate: None,
                    loading: false,
                    error: Some(err.clone()),
                });
            }
        }
        result
    }

    async fn estimate(&self, request: &FeeRequest) -> Result<FeeEstimate, PaymentError> {
        let gas_price = self
            .provider
            .gas_price()
            .await?
            .filter(|price| *price > 0)
            .ok_or(PaymentError::GasPriceUnavailable)?;
        let gas_units = self.gas_units(request).await;

        let cost_wei = U256::from(gas_units) * U256::from(gas_price);
        let cost_native = to_decimal(cost_wei, self.native_decimals);

        let price = |asset| {
            request.quote.map(|quote| quote.rate(asset, request.fiat)).filter(|rate| *rate > 0.0)
        };
        let native_price = price(Asset::Native);
        let cost_fiat = native_price.map(|rate| cost_native * rate);
        let cost_alternate = match (request.asset, native_price, price(Asset::Token)) {
            (Asset::Token, Some(native), Some(token)) => Some(cost_native * (native / token)),
            _ => None,
        };

        Ok(FeeEstimate {
            gas_units,
            gas_price_wei: gas_price,
            cost_wei,
            cost_native,
            cost_fiat,
            cost_alternate,
        })
    }

    async fn gas_units(&self, request: &FeeRequest) -> u64 {
        match request.asset {
            Asset::Native => self.native_transfer_gas,
            Asset::Token => {
                // One unit to self is enough to price the call.
                let signer = &request.signer;
                match self
                    .provider
                    .estimate_token_transfer(signer, self.token, signer.address, U256::from(1))
                    .await
                {
                    Ok(gas) => gas,
                    Err(err) => {
                        warn!(
                            %err,
                            fallback = self.token_transfer_gas,
                            "token transfer simulation failed"
                        );
                        self.token_transfer_gas
                    }
                }
            }
        }
    }

    pub fn state(&self) -> FeeState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<FeeState> {
        self.state.subscribe()
    }

    /// The inputs of the last estimate.
    pub fn trigger(&self) -> Option<FeeTrigger> {
        self.trigger
    }
}
