pub mod catalog;
pub mod contracts;
pub mod domain;
pub mod errors;
pub mod manager;
pub mod ports;
pub mod state_machine;

pub use catalog::{Token, TokenCatalog, TOKEN_DECIMALS};
pub use contracts::{
    decode_balance_of, encode_balance_of, format_token_amount, CallRoute, ContractHandle,
    ContractKind, ContractRegistry,
};
pub use domain::{
    NativeCurrency, NetworkParams, Signer, SignerBinding, WalletSnapshot,
    BASE_SEPOLIA_CHAIN_ID,
};
pub use errors::{BalanceError, ConnectionError};
pub use manager::{
    CommandResult, ConnectionCommand, ConnectionManager, ConnectionState, ManagerConfig,
    ScheduledSwitch, DEFAULT_AUTO_SWITCH_DELAY_MS,
};
pub use ports::{
    ClockPort, InjectedProviderPort, NameResolverPort, PortError, RpcPort,
    RPC_CODE_UNKNOWN_CHAIN, RPC_CODE_USER_REJECTED,
};
pub use state_machine::{
    connection_transition, ConnectionAction, ConnectionPhase, PhaseTransition,
};
