use alloy_provider::PendingTransactionError;
use alloy_transport::TransportError;
use rampay_common::PaymentError;

/// EIP-1193 code returned when the user declines a request.
pub const USER_REJECTED_CODE: i64 = 4001;

/// EIP-1193 code returned when `wallet_switchEthereumChain` targets a chain the wallet doesn't know.
pub const UNRECOGNIZED_CHAIN_CODE: i64 = 4902;

/// JSON-RPC code for a method the endpoint doesn't implement.
pub const METHOD_NOT_FOUND_CODE: i64 = -32601;

/// A failed request to the wallet provider, as reported by the provider.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct ProviderError {
    /// The JSON-RPC / EIP-1193 error code, if the provider returned one.
    pub code: Option<i64>,
    pub message: String,
}

impl ProviderError {
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self { code: Some(code), message: message.into() }
    }

    /// An error without a provider error code.
    pub fn other(message: impl ToString) -> Self {
        Self { code: None, message: message.to_string() }
    }

    pub fn user_rejected() -> Self {
        Self::new(USER_REJECTED_CODE, "User rejected the request.")
    }

    pub fn unrecognized_chain(chain_id: u64) -> Self {
        Self::new(UNRECOGNIZED_CHAIN_CODE, format!("Unrecognized chain ID {chain_id:#x}."))
    }

    pub fn is_user_rejected(&self) -> bool {
        self.code == Some(USER_REJECTED_CODE) || self.message.contains("ACTION_REJECTED")
    }

    pub fn is_unrecognized_chain(&self) -> bool {
        self.code == Some(UNRECOGNIZED_CHAIN_CODE)
    }

    pub fn is_method_not_found(&self) -> bool {
        self.code == Some(METHOD_NOT_FOUND_CODE)
    }

    pub fn is_insufficient_funds(&self) -> bool {
        self.message.to_ascii_lowercase().contains("insufficient funds")
    }

    /// Maps the provider failure onto the payment error taxonomy.
    pub fn classify(&self) -> PaymentError {
        if self.is_user_rejected() {
            PaymentError::UserRejected
        } else if self.is_insufficient_funds() {
            PaymentError::InsufficientFunds
        } else {
            PaymentError::Unknown(self.message.clone())
        }
    }
}

impl From<ProviderError> for PaymentError {
    fn from(err: ProviderError) -> Self {
        err.classify()
    }
}

impl From<TransportError> for ProviderError {
    fn from(err: TransportError) -> Self {
        match err.as_error_resp() {
            Some(payload) => Self::new(payload.code, payload.message.to_string()),
            None => Self::other(err),
        }
    }
}

impl From<alloy_contract::Error> for ProviderError {
    fn from(err: alloy_contract::Error) -> Self {
        match err {
            alloy_contract::Error::TransportError(err) => err.into(),
            err => Self::other(err),
        }
    }
}

impl From<PendingTransactionError> for ProviderError {
    fn from(err: PendingTransactionError) -> Self {
        match err {
            PendingTransactionError::TransportError(err) => err.into(),
            err => Self::other(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_eip1193_errors() {
        assert_eq!(ProviderError::user_rejected().classify(), PaymentError::UserRejected);
        assert_eq!(
            ProviderError::other("ACTION_REJECTED: user denied").classify(),
            PaymentError::UserRejected
        );
        assert_eq!(
            ProviderError::new(-32000, "insufficient funds for gas * price + value").classify(),
            PaymentError::InsufficientFunds
        );
        assert_eq!(
            ProviderError::new(-32000, "nonce too low").classify(),
            PaymentError::Unknown("nonce too low".to_string())
        );
        assert!(ProviderError::unrecognized_chain(11155111).is_unrecognized_chain());
        assert!(!ProviderError::other("boom").is_unrecognized_chain());
    }
}
