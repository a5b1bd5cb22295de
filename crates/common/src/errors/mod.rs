//! Commonly used errors

use alloy_primitives::ChainId;

/// Every failure a payment facet can surface.
///
/// Facets never propagate these past their own boundary as panics: they are stored on the facet's
/// state snapshot (and returned from the operation that produced them), so the value is `Clone`
/// and comparable.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum PaymentError {
    #[error("no wallet provider is available; install a browser wallet to continue")]
    ProviderUnavailable,
    #[error("request rejected by user")]
    UserRejected,
    /// Soft condition: the session stays connected and the error clears once the chain matches.
    #[error("wrong network: connected to chain {actual}, switch to chain {expected}")]
    WrongNetwork { expected: ChainId, actual: ChainId },
    #[error("chain {chain_id} is not registered in the wallet")]
    NetworkNotRegistered { chain_id: ChainId },
    #[error("failed to switch network: {0}")]
    SwitchFailed(String),
    #[error("rate limited by the price feed; please wait")]
    RateLimited,
    #[error("failed to fetch prices: {0}")]
    FetchFailed(String),
    #[error("could not fetch gas price")]
    GasPriceUnavailable,
    #[error("insufficient balance")]
    InsufficientFunds,
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("wallet not connected")]
    NotConnected,
    #[error("a transfer is already pending")]
    TransferPending,
    #[error("{0}")]
    Unknown(String),
}

impl PaymentError {
    /// Creates an [`PaymentError::Unknown`] from anything displayable.
    pub fn unknown(msg: impl ToString) -> Self {
        Self::Unknown(msg.to_string())
    }

    pub fn invalid_input(msg: impl ToString) -> Self {
        Self::InvalidInput(msg.to_string())
    }

    /// Returns `true` for the soft wrong-network condition.
    pub const fn is_wrong_network(&self) -> bool {
        matches!(self, Self::WrongNetwork { .. })
    }
}

mod private {
    use eyre::Chain;
    use std::error::Error;

    pub trait ErrorChain {
        fn chain(&self) -> Chain<'_>;
    }

    impl ErrorChain for dyn Error + 'static {
        fn chain(&self) -> Chain<'_> {
            Chain::new(self)
        }
    }

    impl ErrorChain for eyre::Report {
        fn chain(&self) -> Chain<'_> {
            self.chain()
        }
    }
}

/// Deduplicates a chain of errors.
pub fn dedup_chain<E: private::ErrorChain + ?Sized>(error: &E) -> Vec<String> {
    let mut causes = all_sources(error);
    // Deduplicate the common pattern `msg1: msg2; msg2` -> `msg1: msg2`.
    causes.dedup_by(|b, a| a.contains(b.as_str()));
    causes
}

fn all_sources<E: private::ErrorChain + ?Sized>(err: &E) -> Vec<String> {
    err.chain().map(|cause| cause.to_string().trim().to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dedups_wrapped_payment_error() {
        #[derive(thiserror::Error, Debug)]
        #[error("send failed: {0}")]
        struct Send(#[from] PaymentError);

        let report = eyre::Report::from(Send(PaymentError::InsufficientFunds));
        assert_eq!(report.chain().count(), 2, "{report:?}");
        assert_eq!(
            all_sources(&report).join("; "),
            "send failed: insufficient balance; insufficient balance"
        );
        assert_eq!(dedup_chain(&report), ["send failed: insufficient balance"]);
    }

    #[test]
    fn wrong_network_message() {
        let err = PaymentError::WrongNetwork { expected: 11155111, actual: 1 };
        assert!(err.is_wrong_network());
        assert_eq!(
            err.to_string(),
            "wrong network: connected to chain 1, switch to chain 11155111"
        );
        assert!(!PaymentError::RateLimited.is_wrong_network());
    }
}
