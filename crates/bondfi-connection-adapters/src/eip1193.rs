use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, MutexGuard};

use alloy::primitives::Address;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use bondfi_connection_core::{InjectedProviderPort, NetworkParams, PortError, WalletSnapshot};

use crate::ConnectionConfig;

const DETERMINISTIC_ACCOUNT: &str = "0x1000000000000000000000000000000000000001";
const MAINNET_CHAIN_ID: u64 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProviderEventKind {
    AccountsChanged,
    ChainChanged,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderEvent {
    pub sequence: u64,
    pub kind: ProviderEventKind,
    pub value: String,
}

/// Injected wallet provider.
///
/// Without a runtime it runs as a deterministic in-memory wallet that starts on
/// mainnet and only knows the chains it has been told about, which is enough
/// to walk the whole switch / add-chain protocol in development.
#[derive(Debug, Clone)]
pub struct Eip1193Adapter {
    mode: ProviderMode,
    state: Arc<Mutex<ProviderState>>,
}

#[derive(Debug, Clone)]
enum ProviderMode {
    Disabled(String),
    Deterministic,
    Proxy(ProxyRuntime),
}

#[derive(Debug, Clone)]
struct ProxyRuntime {
    base_url: String,
    client: reqwest::blocking::Client,
}

#[derive(Debug, Clone)]
struct ProviderState {
    accounts: Vec<Address>,
    chain_id: u64,
    known_chains: BTreeSet<u64>,
    reject_next_switch: bool,
    event_seq: u64,
    events: Vec<ProviderEvent>,
}

impl Default for ProviderState {
    fn default() -> Self {
        Self {
            accounts: DETERMINISTIC_ACCOUNT.parse().map(|a| vec![a]).unwrap_or_default(),
            chain_id: MAINNET_CHAIN_ID,
            known_chains: BTreeSet::from([MAINNET_CHAIN_ID]),
            reject_next_switch: false,
            event_seq: 0,
            events: Vec::new(),
        }
    }
}

impl ProviderState {
    fn push_event(&mut self, kind: ProviderEventKind, value: String) {
        self.event_seq = self.event_seq.saturating_add(1);
        let sequence = self.event_seq;
        self.events.push(ProviderEvent {
            sequence,
            kind,
            value,
        });
    }

    fn set_chain(&mut self, chain_id: u64) {
        if self.chain_id != chain_id {
            self.chain_id = chain_id;
            self.push_event(ProviderEventKind::ChainChanged, chain_id.to_string());
        }
    }

    fn set_accounts(&mut self, accounts: Vec<Address>) {
        if self.accounts != accounts {
            let payload = serde_json::to_string(
                &accounts.iter().map(|a| a.to_string()).collect::<Vec<_>>(),
            )
            .unwrap_or_else(|_| "[]".to_owned());
            self.accounts = accounts;
            self.push_event(ProviderEventKind::AccountsChanged, payload);
        }
    }
}

impl Eip1193Adapter {
    pub fn with_config(config: ConnectionConfig) -> Self {
        let mode = if let Some(ref base_url) = config.eip1193_proxy_url {
            let timeout = std::time::Duration::from_millis(config.eip1193_timeout_ms);
            match reqwest::blocking::Client::builder().timeout(timeout).build() {
                Ok(client) => ProviderMode::Proxy(ProxyRuntime {
                    base_url: base_url.clone(),
                    client,
                }),
                Err(e) => {
                    if config.strict_runtime_required() {
                        ProviderMode::Disabled(format!(
                            "failed to initialize EIP-1193 proxy client in production profile: {e}"
                        ))
                    } else {
                        ProviderMode::Deterministic
                    }
                }
            }
        } else if config.strict_runtime_required() {
            ProviderMode::Disabled(
                "EIP-1193 proxy URL not configured in production runtime profile".to_owned(),
            )
        } else {
            ProviderMode::Deterministic
        };

        Self {
            mode,
            state: Arc::new(Mutex::new(ProviderState::default())),
        }
    }

    /// Whether a wallet runtime is reachable at all.
    pub fn is_available(&self) -> bool {
        !matches!(self.mode, ProviderMode::Disabled(_))
    }

    fn check_mode(&self) -> Result<(), PortError> {
        if let ProviderMode::Disabled(reason) = &self.mode {
            return Err(PortError::Policy(reason.clone()));
        }
        Ok(())
    }

    fn lock(&self) -> Result<MutexGuard<'_, ProviderState>, PortError> {
        self.state
            .lock()
            .map_err(|e| PortError::Transport(format!("provider lock poisoned: {e}")))
    }

    /// What a wallet SDK would report right now: first account plus chain.
    pub fn snapshot(&self) -> Result<WalletSnapshot, PortError> {
        let accounts = self.accounts()?;
        let chain_id = self.chain_id()?;
        Ok(WalletSnapshot {
            account: accounts.first().copied(),
            wallet_present: true,
            chain_id: Some(chain_id),
        })
    }

    pub fn debug_inject_accounts_changed(&self, accounts: Vec<Address>) -> Result<(), PortError> {
        self.lock()?.set_accounts(accounts);
        Ok(())
    }

    pub fn debug_inject_chain_changed(&self, chain_id: u64) -> Result<(), PortError> {
        let mut g = self.lock()?;
        g.known_chains.insert(chain_id);
        g.set_chain(chain_id);
        Ok(())
    }

    /// The next deterministic switch fails as if the user dismissed the prompt.
    pub fn debug_reject_next_switch(&self) -> Result<(), PortError> {
        self.lock()?.reject_next_switch = true;
        Ok(())
    }

    pub fn drain_events(&self) -> Result<Vec<ProviderEvent>, PortError> {
        self.check_mode()?;
        Ok(std::mem::take(&mut self.lock()?.events))
    }

    fn proxy_call(&self, method: &str, params: Value) -> Result<Value, PortError> {
        let proxy = match &self.mode {
            ProviderMode::Proxy(proxy) => proxy,
            ProviderMode::Disabled(reason) => return Err(PortError::Policy(reason.clone())),
            ProviderMode::Deterministic => {
                return Err(PortError::NotImplemented(
                    "eip1193 proxy runtime not enabled",
                ))
            }
        };

        let payload = serde_json::json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": method,
            "params": params,
        });
        debug!(method, "eip1193 proxy request");
        let response = proxy
            .client
            .post(&proxy.base_url)
            .json(&payload)
            .send()
            .map_err(|e| PortError::Transport(format!("eip1193 proxy request failed: {e}")))?;
        let status = response.status();
        let body: Value = response
            .json()
            .map_err(|e| PortError::Transport(format!("eip1193 proxy json decode failed: {e}")))?;
        if let Some(err) = body.get("error") {
            return Err(decode_rpc_error(err));
        }
        if !status.is_success() {
            return Err(PortError::Transport(format!(
                "eip1193 proxy status {status}: {body}"
            )));
        }
        body.get("result")
            .cloned()
            .ok_or_else(|| PortError::Transport("eip1193 proxy missing result".to_owned()))
    }

    fn proxy_accounts(&self, method: &str) -> Result<Vec<Address>, PortError> {
        let result = self.proxy_call(method, serde_json::json!([]))?;
        let accounts = parse_accounts(&result, method)?;
        self.lock()?.set_accounts(accounts.clone());
        Ok(accounts)
    }
}

impl InjectedProviderPort for Eip1193Adapter {
    fn request_accounts(&self) -> Result<Vec<Address>, PortError> {
        self.check_mode()?;
        if matches!(self.mode, ProviderMode::Proxy(_)) {
            return self.proxy_accounts("eth_requestAccounts");
        }
        Ok(self.lock()?.accounts.clone())
    }

    fn accounts(&self) -> Result<Vec<Address>, PortError> {
        self.check_mode()?;
        if matches!(self.mode, ProviderMode::Proxy(_)) {
            return self.proxy_accounts("eth_accounts");
        }
        Ok(self.lock()?.accounts.clone())
    }

    fn chain_id(&self) -> Result<u64, PortError> {
        self.check_mode()?;
        if matches!(self.mode, ProviderMode::Proxy(_)) {
            let result = self.proxy_call("eth_chainId", serde_json::json!([]))?;
            let chain_id = json_chain_id_to_u64(&result)?;
            self.lock()?.set_chain(chain_id);
            return Ok(chain_id);
        }
        Ok(self.lock()?.chain_id)
    }

    fn switch_chain(&self, hex_chain_id: &str) -> Result<(), PortError> {
        self.check_mode()?;
        let chain_id = parse_chain_id_str(hex_chain_id)?;
        if matches!(self.mode, ProviderMode::Proxy(_)) {
            self.proxy_call(
                "wallet_switchEthereumChain",
                serde_json::json!([{ "chainId": hex_chain_id }]),
            )?;
            self.lock()?.set_chain(chain_id);
            return Ok(());
        }

        let mut g = self.lock()?;
        if std::mem::take(&mut g.reject_next_switch) {
            return Err(PortError::from_rpc(
                bondfi_connection_core::RPC_CODE_USER_REJECTED,
                "User rejected the request.",
            ));
        }
        if !g.known_chains.contains(&chain_id) {
            return Err(PortError::from_rpc(
                bondfi_connection_core::RPC_CODE_UNKNOWN_CHAIN,
                format!("Unrecognized chain ID \"{hex_chain_id}\". Try adding the chain using wallet_addEthereumChain first."),
            ));
        }
        g.set_chain(chain_id);
        Ok(())
    }

    fn add_chain(&self, params: &NetworkParams) -> Result<(), PortError> {
        self.check_mode()?;
        if matches!(self.mode, ProviderMode::Proxy(_)) {
            self.proxy_call(
                "wallet_addEthereumChain",
                serde_json::json!([params.add_chain_payload()]),
            )?;
            return Ok(());
        }
        self.lock()?.known_chains.insert(params.chain_id);
        Ok(())
    }
}

fn decode_rpc_error(err: &Value) -> PortError {
    let code = err.get("code").and_then(Value::as_i64);
    let message = err
        .get("message")
        .and_then(Value::as_str)
        .map(str::to_owned)
        .unwrap_or_else(|| err.to_string());
    match code {
        Some(code) => PortError::from_rpc(code, message),
        None => PortError::Transport(format!("eip1193 proxy returned error: {message}")),
    }
}

fn parse_accounts(result: &Value, method: &str) -> Result<Vec<Address>, PortError> {
    let arr = result
        .as_array()
        .ok_or_else(|| PortError::Transport(format!("{method}: array expected")))?;
    let mut accounts = Vec::with_capacity(arr.len());
    for item in arr {
        let raw = item
            .as_str()
            .ok_or_else(|| PortError::Transport(format!("{method}: string expected")))?;
        let parsed: Address = raw
            .parse()
            .map_err(|e| PortError::Validation(format!("invalid account address: {e}")))?;
        accounts.push(parsed);
    }
    Ok(accounts)
}

pub(crate) fn json_chain_id_to_u64(value: &Value) -> Result<u64, PortError> {
    if let Some(n) = value.as_u64() {
        return Ok(n);
    }
    let s = value
        .as_str()
        .ok_or_else(|| PortError::Validation("chain id must be string or number".to_owned()))?;
    parse_chain_id_str(s)
}

pub(crate) fn parse_chain_id_str(raw: &str) -> Result<u64, PortError> {
    if let Some(hex) = raw.strip_prefix("0x").or_else(|| raw.strip_prefix("0X")) {
        u64::from_str_radix(hex, 16)
            .map_err(|e| PortError::Validation(format!("invalid hex chain id: {e}")))
    } else {
        raw.parse()
            .map_err(|e| PortError::Validation(format!("invalid chain id: {e}")))
    }
}
