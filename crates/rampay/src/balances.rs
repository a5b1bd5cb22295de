use alloy_primitives::{Address, ChainId, U256};
use rampay_common::{
    PaymentError,
    units::{format_fixed, to_decimal},
};
use rampay_config::Config;
use rampay_wallets::WalletProvider;

/// Decimal places shown for the native balance.
pub const NATIVE_BALANCE_DECIMALS: usize = 8;

/// Decimal places shown for the token balance.
pub const TOKEN_BALANCE_DECIMALS: usize = 2;

/// Native and token holdings of an account, in smallest units.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Balances {
    pub native: U256,
    pub token: U256,
    native_decimals: u8,
    token_decimals: u8,
}

impl Balances {
    pub fn native_display(&self) -> String {
        format_fixed(to_decimal(self.native, self.native_decimals), NATIVE_BALANCE_DECIMALS)
    }

    pub fn token_display(&self) -> String {
        format_fixed(to_decimal(self.token, self.token_decimals), TOKEN_BALANCE_DECIMALS)
    }
}

/// Reads the balances of `account`.
///
/// Returns `None` without querying the provider when `chain_id` is not the supported chain, where
/// the token contract doesn't exist.
pub async fn fetch_balances(
    provider: &dyn WalletProvider,
    config: &Config,
    account: Address,
    chain_id: ChainId,
) -> Result<Option<Balances>, PaymentError> {
    if !config.is_supported_chain(chain_id) {
        trace!(chain_id, "skipping balances on unsupported chain");
        return Ok(None);
    }

    let native = provider.balance(account).await.inspect_err(|err| {
        error!(%err, ?account, "failed to fetch native balance");
    })?;
    let token = provider.token_balance(config.token_address, account).await.inspect_err(|err| {
        error!(%err, ?account, "failed to fetch token balance");
    })?;

    Ok(Some(Balances {
        native,
        token,
        native_decimals: config.native.decimals,
        token_decimals: config.token.decimals,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::address;
    use rampay_wallets::mock::MockWallet;

    const ALICE: Address = address!("0x00000000000000000000000000000000000a11ce");

    #[tokio::test]
    async fn reads_and_formats_balances() {
        let config = Config::default();
        let wallet = MockWallet::authorized(config.chain_id, vec![ALICE]);
        wallet.state().balances.insert(ALICE, U256::from(1_234_567_890_123_456_789u64));
        wallet.state().token_balances.insert(ALICE, U256::from(42_499_999u64));

        let balances = fetch_balances(&wallet, &config, ALICE, config.chain_id).await.unwrap();
        let balances = balances.unwrap();
        assert_eq!(balances.native_display(), "1.23456789");
        assert_eq!(balances.token_display(), "42.50");
    }

    #[tokio::test]
    async fn skips_unsupported_chain() {
        let config = Config::default();
        let wallet = MockWallet::authorized(1, vec![ALICE]);
        wallet.state().balances.insert(ALICE, U256::from(1u64));

        assert_eq!(fetch_balances(&wallet, &config, ALICE, 1).await, Ok(None));
    }
}
