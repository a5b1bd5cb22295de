//! Submission and tracking of a single asset transfer.

use alloy_primitives::{Address, TxHash, U256};
use rampay_common::{Asset, PaymentError, units::parse_amount};
use rampay_config::Config;
use rampay_wallets::{WalletProvider, WalletSigner};
use std::sync::Arc;
use tokio::sync::watch;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum TransferStatus {
    #[default]
    Idle,
    Pending,
    Success,
    Failed,
}

/// The one transfer tracked by a [`TransferExecutor`].
///
/// A pending attempt may not have a hash yet: it is recorded once the wallet broadcast the
/// transaction, before the confirmation wait completes.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TransferAttempt {
    pub status: TransferStatus,
    pub hash: Option<TxHash>,
    pub error: Option<PaymentError>,
}

impl TransferAttempt {
    pub fn is_pending(&self) -> bool {
        self.status == TransferStatus::Pending
    }

    /// Succeeded or failed.
    pub fn is_terminal(&self) -> bool {
        matches!(self.status, TransferStatus::Success | TransferStatus::Failed)
    }
}

/// Sends the native asset or the token and follows the transfer to a terminal outcome.
///
/// At most one transfer is in flight: [`TransferExecutor::send`] is rejected with
/// [`PaymentError::TransferPending`] while the current attempt is pending.
#[derive(Debug)]
pub struct TransferExecutor {
    provider: Arc<dyn WalletProvider>,
    token: Address,
    native_decimals: u8,
    token_decimals: u8,
    attempt: watch::Sender<TransferAttempt>,
}

impl TransferExecutor {
    pub fn new(provider: Arc<dyn WalletProvider>, config: &Config) -> Self {
        Self {
            provider,
            token: config.token_address,
            native_decimals: config.native.decimals,
            token_decimals: config.token.decimals,
            attempt: watch::Sender::new(TransferAttempt::default()),
        }
    }

    /// Sends `amount` (human-readable, in `asset` units) to `recipient`.
    ///
    /// Missing signer or invalid input are rejected without touching the current attempt.
    /// Otherwise the outcome is both returned and recorded on the attempt.
    pub async fn send(
        &self,
        signer: Option<&WalletSigner>,
        asset: Asset,
        recipient: &str,
        amount: &str,
    ) -> Result<TxHash, PaymentError> {
        let signer = signer.ok_or(PaymentError::NotConnected)?;
        let (to, value) = self.parse(asset, recipient, amount)?;

        let started = self.attempt.send_if_modified(|attempt| {
            if attempt.is_pending() {
                return false;
            }
            *attempt = TransferAttempt { status: TransferStatus::Pending, ..Default::default() };
            true
        });
        if !started {
            return Err(PaymentError::TransferPending);
        }
        let pending = PendingAttempt::new(&self.attempt);

        let submitted = match asset {
            Asset::Native => self.provider.send_value(signer, to, value).await,
            Asset::Token => self.provider.send_token(signer, self.token, to, value).await,
        };
        let hash = match submitted {
            Ok(hash) => hash,
            Err(err) => return Err(pending.fail(err.classify())),
        };
        debug!(%hash, %asset, ?to, %value, "transfer submitted");
        self.attempt.send_modify(|attempt| attempt.hash = Some(hash));

        if let Err(err) = self.provider.wait_for_confirmation(hash).await {
            return Err(pending.fail(err.classify()));
        }
        debug!(%hash, "transfer confirmed");
        pending.succeed();
        Ok(hash)
    }

    fn parse(
        &self,
        asset: Asset,
        recipient: &str,
        amount: &str,
    ) -> Result<(Address, U256), PaymentError> {
        let recipient = recipient.trim();
        if recipient.is_empty() || amount.trim().is_empty() {
            return Err(PaymentError::invalid_input("recipient and amount are required"));
        }
        let to = recipient
            .parse::<Address>()
            .map_err(|err| PaymentError::invalid_input(format!("invalid recipient: {err}")))?;

        let decimals = match asset {
            Asset::Native => self.native_decimals,
            Asset::Token => self.token_decimals,
        };
        let value = parse_amount(amount, decimals)?;
        if value.is_zero() {
            return Err(PaymentError::invalid_input("amount must be greater than zero"));
        }
        Ok((to, value))
    }

    /// Returns the attempt to idle. Fails while a transfer is pending.
    pub fn reset(&self) -> Result<(), PaymentError> {
        let mut result = Ok(());
        self.attempt.send_if_modified(|attempt| {
            if attempt.is_pending() {
                result = Err(PaymentError::TransferPending);
                return false;
            }
            let changed = *attempt != TransferAttempt::default();
            *attempt = TransferAttempt::default();
            changed
        });
        result
    }

    pub fn attempt(&self) -> TransferAttempt {
        self.attempt.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<TransferAttempt> {
        self.attempt.subscribe()
    }
}

/// Settles the pending attempt. Dropped unsettled, when the `send` future is cancelled, it marks
/// the attempt failed so the executor accepts new transfers.
struct PendingAttempt<'a> {
    attempt: &'a watch::Sender<TransferAttempt>,
    settled: bool,
}

impl<'a> PendingAttempt<'a> {
    fn new(attempt: &'a watch::Sender<TransferAttempt>) -> Self {
        Self { attempt, settled: false }
    }

    fn succeed(mut self) {
        self.settled = true;
        self.attempt.send_modify(|attempt| attempt.status = TransferStatus::Success);
    }

    fn fail(mut self, err: PaymentError) -> PaymentError {
        self.settled = true;
        error!(%err, "transfer failed");
        self.set_failed(err.clone());
        err
    }

    fn set_failed(&self, err: PaymentError) {
        self.attempt.send_modify(|attempt| {
            attempt.status = TransferStatus::Failed;
            attempt.error = Some(err);
        });
    }
}

impl Drop for PendingAttempt<'_> {
    fn drop(&mut self) {
        if !self.settled {
            warn!("transfer cancelled before it settled");
            self.set_failed(PaymentError::unknown("transfer cancelled"));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::address;
    use rampay_wallets::{
        ProviderError,
        mock::{MockWallet, SentTransfer},
    };
    use std::time::Duration;

    const ALICE: Address = address!("0x00000000000000000000000000000000000a11ce");
    const BOB: &str = "0x0000000000000000000000000000000000000b0b";

    fn setup() -> (Arc<MockWallet>, TransferExecutor, WalletSigner) {
        let config = Config::default();
        let wallet = Arc::new(MockWallet::authorized(config.chain_id, vec![ALICE]));
        let executor = TransferExecutor::new(wallet.clone(), &config);
        (wallet, executor, WalletSigner::new(ALICE, config.chain_id))
    }

    #[tokio::test]
    async fn rejects_without_touching_status() {
        let (wallet, executor, signer) = setup();

        assert_eq!(
            executor.send(None, Asset::Native, BOB, "0.1").await,
            Err(PaymentError::NotConnected)
        );
        for (recipient, amount) in [("", "0.1"), (BOB, ""), ("  ", "1"), ("bob", "1"), (BOB, "0")]
        {
            let err = executor.send(Some(&signer), Asset::Native, recipient, amount).await;
            assert!(matches!(err, Err(PaymentError::InvalidInput(_))), "{recipient:?} {amount:?}");
        }

        assert_eq!(executor.attempt(), TransferAttempt::default());
        assert!(wallet.state().sent.is_empty());
    }

    #[tokio::test]
    async fn sends_native_value() {
        let (wallet, executor, signer) = setup();

        let hash = executor.send(Some(&signer), Asset::Native, BOB, "0.001").await.unwrap();
        assert_eq!(
            executor.attempt(),
            TransferAttempt { status: TransferStatus::Success, hash: Some(hash), error: None }
        );
        assert_eq!(
            wallet.state().sent,
            vec![SentTransfer::Value {
                from: ALICE,
                to: BOB.parse().unwrap(),
                value: U256::from(1_000_000_000_000_000u64),
            }]
        );
    }

    #[tokio::test]
    async fn sends_token_in_smallest_unit() {
        let (wallet, executor, signer) = setup();

        executor.send(Some(&signer), Asset::Token, BOB, "12.5").await.unwrap();
        assert_eq!(
            wallet.state().sent,
            vec![SentTransfer::Token {
                from: ALICE,
                token: Config::SEPOLIA_USDC,
                to: BOB.parse().unwrap(),
                amount: U256::from(12_500_000u64),
            }]
        );
    }

    #[tokio::test]
    async fn classifies_failures() {
        let (wallet, executor, signer) = setup();

        wallet.state().send_error = Some(ProviderError::user_rejected());
        assert_eq!(
            executor.send(Some(&signer), Asset::Native, BOB, "1").await,
            Err(PaymentError::UserRejected)
        );
        let attempt = executor.attempt();
        assert_eq!(attempt.status, TransferStatus::Failed);
        assert_eq!(attempt.hash, None);
        assert_eq!(attempt.error, Some(PaymentError::UserRejected));

        wallet.state().send_error =
            Some(ProviderError::new(-32000, "insufficient funds for gas * price + value"));
        assert_eq!(
            executor.send(Some(&signer), Asset::Native, BOB, "1").await,
            Err(PaymentError::InsufficientFunds)
        );

        wallet.state().send_error = None;
        wallet.state().confirm_error = Some(ProviderError::other("transaction reverted"));
        let err = executor.send(Some(&signer), Asset::Token, BOB, "1").await.unwrap_err();
        assert_eq!(err, PaymentError::Unknown("transaction reverted".to_string()));
        let attempt = executor.attempt();
        assert_eq!(attempt.status, TransferStatus::Failed);
        assert!(attempt.hash.is_some());

        executor.reset().unwrap();
        assert_eq!(executor.attempt(), TransferAttempt::default());
    }

    #[tokio::test]
    async fn pending_attempt_exposes_hash() {
        let (wallet, executor, signer) = setup();
        wallet.state().hold_confirmations = true;
        let mut rx = executor.subscribe();

        let observe = async {
            let attempt = rx.wait_for(|attempt| attempt.hash.is_some()).await.unwrap().clone();
            assert!(attempt.is_pending());

            assert_eq!(
                executor.send(Some(&signer), Asset::Native, BOB, "1").await,
                Err(PaymentError::TransferPending)
            );
            assert_eq!(executor.reset(), Err(PaymentError::TransferPending));

            wallet.confirm();
            attempt.hash
        };
        let (sent, observed) =
            tokio::join!(executor.send(Some(&signer), Asset::Native, BOB, "1"), observe);

        assert_eq!(Some(sent.unwrap()), observed);
        assert!(executor.attempt().is_terminal());
        assert_eq!(wallet.state().sent.len(), 1);
    }

    #[tokio::test]
    async fn cancelled_send_does_not_stay_pending() {
        let (wallet, executor, signer) = setup();
        wallet.state().hold_confirmations = true;

        let sent = tokio::time::timeout(
            Duration::from_millis(20),
            executor.send(Some(&signer), Asset::Native, BOB, "1"),
        )
        .await;
        assert!(sent.is_err());

        let attempt = executor.attempt();
        assert_eq!(attempt.status, TransferStatus::Failed);
        assert!(attempt.hash.is_some());
        assert_eq!(attempt.error, Some(PaymentError::unknown("transfer cancelled")));

        executor.reset().unwrap();
        wallet.state().hold_confirmations = false;
        let hash = executor.send(Some(&signer), Asset::Native, BOB, "1").await.unwrap();
        assert_eq!(executor.attempt().hash, Some(hash));
        assert_eq!(executor.attempt().status, TransferStatus::Success);
        assert_eq!(wallet.state().sent.len(), 2);
    }
}
