pub mod clock;
pub mod config;
pub mod eip1193;
pub mod ens;
pub mod rpc;

pub use clock::SystemClockAdapter;
pub use config::{ConnectionConfig, RuntimeProfile, ENS_TIMEOUT_MS};
pub use eip1193::{Eip1193Adapter, ProviderEvent, ProviderEventKind};
pub use ens::EnsApiAdapter;
pub use rpc::HttpRpcAdapter;
