use alloy::primitives::Address;
use thiserror::Error;

use crate::ports::PortError;

/// Failures while turning the injected wallet into a signer.
///
/// The reactive path stores the `Display` text in `connection_error`; the
/// manual reconnect path returns the value to its caller.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConnectionError {
    #[error("Wallet not connected")]
    NotConnected,
    #[error("Wrong network: wallet is on chain {}, expected {expected}", display_chain(.actual))]
    WrongNetwork { expected: u64, actual: Option<u64> },
    #[error("No accounts returned by wallet")]
    NoAccounts,
    #[error("Address mismatch between wallet and signer")]
    AddressMismatch { wallet: Address, signer: Address },
    #[error("No ethereum provider available")]
    NoProvider,
    #[error("RPC provider not initialized")]
    ProviderNotReady,
    #[error("Network switch in progress")]
    SwitchInProgress,
    #[error("Connection changed while reconnecting")]
    Superseded,
    #[error(transparent)]
    Port(#[from] PortError),
}

fn display_chain(chain_id: &Option<u64>) -> String {
    chain_id.map_or_else(|| "unknown".to_owned(), |id| id.to_string())
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BalanceError {
    #[error("Token not found: {0}")]
    TokenNotFound(Address),
}
