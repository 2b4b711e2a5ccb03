use alloy::primitives::{Address, Bytes, U256};
use thiserror::Error;

use crate::domain::NetworkParams;

pub const RPC_CODE_USER_REJECTED: i64 = 4001;
pub const RPC_CODE_UNKNOWN_CHAIN: i64 = 4902;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PortError {
    #[error("user rejected the request: {0}")]
    UserRejected(String),
    #[error("unrecognized chain: {0}")]
    UnknownChain(String),
    #[error("{message}")]
    Rpc { code: i64, message: String },
    #[error("port not implemented: {0}")]
    NotImplemented(&'static str),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("validation error: {0}")]
    Validation(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("policy error: {0}")]
    Policy(String),
}

impl PortError {
    /// Decodes a wallet `{code, message}` error into a closed variant.
    pub fn from_rpc(code: i64, message: impl Into<String>) -> Self {
        let message = message.into();
        match code {
            RPC_CODE_USER_REJECTED => Self::UserRejected(message),
            RPC_CODE_UNKNOWN_CHAIN => Self::UnknownChain(message),
            _ => Self::Rpc { code, message },
        }
    }

    /// Message surfaced to the user, without the variant prefix.
    pub fn raw_message(&self) -> String {
        match self {
            Self::UserRejected(m)
            | Self::UnknownChain(m)
            | Self::Transport(m)
            | Self::Validation(m)
            | Self::NotFound(m)
            | Self::Policy(m) => m.clone(),
            Self::Rpc { message, .. } => message.clone(),
            Self::NotImplemented(m) => (*m).to_owned(),
        }
    }
}

/// Injected wallet transaction provider (`window.ethereum` equivalent).
pub trait InjectedProviderPort {
    /// `eth_requestAccounts`: may prompt the user.
    fn request_accounts(&self) -> Result<Vec<Address>, PortError>;
    /// `eth_accounts`: the accounts the wallet already exposes.
    fn accounts(&self) -> Result<Vec<Address>, PortError>;
    fn chain_id(&self) -> Result<u64, PortError>;
    /// `wallet_switchEthereumChain` with `[{chainId}]`.
    fn switch_chain(&self, hex_chain_id: &str) -> Result<(), PortError>;
    /// `wallet_addEthereumChain` with the full chain definition.
    fn add_chain(&self, params: &NetworkParams) -> Result<(), PortError>;
}

/// Read-only JSON-RPC endpoint for the required network.
pub trait RpcPort {
    fn endpoint(&self) -> &str;
    fn chain_id(&self) -> Result<u64, PortError>;
    fn get_balance(&self, address: Address) -> Result<U256, PortError>;
    fn call(&self, from: Option<Address>, to: Address, data: &Bytes) -> Result<Bytes, PortError>;
    /// Attach a wallet signer to this endpoint. Fails when the endpoint cannot
    /// act for `signer`; callers fall back to the wallet-native handle.
    fn bind_signer(&self, signer: Address) -> Result<(), PortError>;
}

pub trait NameResolverPort {
    fn resolve(&self, name: &str) -> Result<Option<Address>, PortError>;
    fn reverse(&self, address: Address) -> Result<Option<String>, PortError>;
}

pub trait ClockPort {
    fn now_ms(&self) -> Result<u64, PortError>;
}
