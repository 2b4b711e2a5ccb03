use std::path::{Path, PathBuf};
use std::str::FromStr;

use bondfi_connection_core::{
    ContractRegistry, ManagerConfig, NetworkParams, PortError, TokenCatalog,
    DEFAULT_AUTO_SWITCH_DELAY_MS,
};
use tracing::warn;

pub const ENS_TIMEOUT_MS: u64 = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuntimeProfile {
    Development,
    Production,
}

impl FromStr for RuntimeProfile {
    type Err = PortError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "development" | "dev" => Ok(Self::Development),
            "production" | "prod" => Ok(Self::Production),
            other => Err(PortError::Validation(format!(
                "unknown runtime profile: {other}"
            ))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    pub runtime_profile: RuntimeProfile,
    pub network: NetworkParams,
    pub rpc_url: String,
    pub rpc_timeout_ms: u64,
    pub eip1193_proxy_url: Option<String>,
    pub eip1193_timeout_ms: u64,
    pub ens_api_url: Option<String>,
    pub ens_timeout_ms: u64,
    pub auto_switch_delay_ms: u64,
    pub token_catalog_path: Option<PathBuf>,
    pub contract_registry_path: Option<PathBuf>,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        let network = NetworkParams::base_sepolia();
        Self {
            runtime_profile: RuntimeProfile::Development,
            rpc_url: network
                .rpc_urls
                .first()
                .cloned()
                .unwrap_or_else(|| "https://sepolia.base.org".to_owned()),
            network,
            rpc_timeout_ms: 15_000,
            eip1193_proxy_url: None,
            eip1193_timeout_ms: 60_000,
            ens_api_url: None,
            ens_timeout_ms: ENS_TIMEOUT_MS,
            auto_switch_delay_ms: DEFAULT_AUTO_SWITCH_DELAY_MS,
            token_catalog_path: None,
            contract_registry_path: None,
        }
    }
}

impl ConnectionConfig {
    /// Defaults overridden by `BONDFI_*` environment variables. Unparsable
    /// values are logged and ignored.
    pub fn from_env() -> Self {
        let mut cfg = Self::default();
        if let Some(profile) = env_parse::<RuntimeProfile>("BONDFI_RUNTIME_PROFILE") {
            cfg.runtime_profile = profile;
        }
        if let Some(url) = env_string("BONDFI_RPC_URL") {
            cfg.rpc_url = url;
        }
        if let Some(ms) = env_parse::<u64>("BONDFI_RPC_TIMEOUT_MS") {
            cfg.rpc_timeout_ms = ms;
        }
        cfg.eip1193_proxy_url = env_string("BONDFI_EIP1193_PROXY_URL");
        cfg.ens_api_url = env_string("BONDFI_ENS_API_URL");
        if let Some(ms) = env_parse::<u64>("BONDFI_AUTO_SWITCH_DELAY_MS") {
            cfg.auto_switch_delay_ms = ms;
        }
        cfg.token_catalog_path = env_string("BONDFI_TOKEN_CATALOG").map(PathBuf::from);
        cfg.contract_registry_path = env_string("BONDFI_CONTRACTS").map(PathBuf::from);
        cfg
    }

    pub fn strict_runtime_required(&self) -> bool {
        self.runtime_profile == RuntimeProfile::Production
    }

    pub fn manager_config(&self) -> ManagerConfig {
        ManagerConfig {
            network: self.network.clone(),
            auto_switch_delay_ms: self.auto_switch_delay_ms,
        }
    }

    pub fn load_token_catalog(&self) -> Result<TokenCatalog, PortError> {
        match &self.token_catalog_path {
            Some(path) => TokenCatalog::from_json(&read_file(path)?),
            None => Ok(TokenCatalog::base_sepolia()),
        }
    }

    pub fn load_contract_registry(&self) -> Result<ContractRegistry, PortError> {
        match &self.contract_registry_path {
            Some(path) => ContractRegistry::from_json(&read_file(path)?),
            None => ContractRegistry::new(Default::default()),
        }
    }
}

fn read_file(path: &Path) -> Result<String, PortError> {
    std::fs::read_to_string(path)
        .map_err(|e| PortError::NotFound(format!("{}: {e}", path.display())))
}

fn env_string(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_owned())
        .filter(|v| !v.is_empty())
}

fn env_parse<T>(key: &str) -> Option<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let raw = env_string(key)?;
    match raw.parse() {
        Ok(v) => Some(v),
        Err(e) => {
            warn!(key, value = %raw, error = %e, "ignoring invalid configuration value");
            None
        }
    }
}
