#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Mutex};

use alloy::primitives::{Address, Bytes, U256};
use serde_json::Value;

use bondfi_connection_core::{
    ClockPort, ConnectionManager, ContractKind, ContractRegistry, InjectedProviderPort,
    ManagerConfig, NetworkParams, PortError, RpcPort, TokenCatalog, WalletSnapshot,
    BASE_SEPOLIA_CHAIN_ID,
};

pub const USDC: &str = "0x036CbD53842c5426634e7929541eC2318f3dCF7e";

#[derive(Debug, Default)]
pub struct TestClock {
    now: AtomicU64,
}

impl ClockPort for TestClock {
    fn now_ms(&self) -> Result<u64, PortError> {
        Ok(self.now.fetch_add(1, Ordering::SeqCst) + 1_739_750_400_000)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WalletCall {
    RequestAccounts,
    Accounts,
    ChainId,
    Switch(String),
    AddChain(Value),
}

#[derive(Debug)]
struct FakeWalletState {
    accounts: Vec<Address>,
    chain_id: u64,
    switch_script: VecDeque<Result<(), PortError>>,
    add_chain_result: Result<(), PortError>,
    calls: Vec<WalletCall>,
}

/// Blocks `switch_chain` until the test releases it.
pub struct SwitchGate {
    entered: Mutex<mpsc::Sender<()>>,
    release: Mutex<mpsc::Receiver<()>>,
}

/// Scripted injected wallet.
pub struct FakeWallet {
    state: Mutex<FakeWalletState>,
    gate: Option<SwitchGate>,
}

impl FakeWallet {
    pub fn new(accounts: Vec<Address>, chain_id: u64) -> Self {
        Self {
            state: Mutex::new(FakeWalletState {
                accounts,
                chain_id,
                switch_script: VecDeque::new(),
                add_chain_result: Ok(()),
                calls: Vec::new(),
            }),
            gate: None,
        }
    }

    /// Returns the wallet plus `(entered, release)` channel ends for the test.
    pub fn gated(
        accounts: Vec<Address>,
        chain_id: u64,
    ) -> (Self, mpsc::Receiver<()>, mpsc::Sender<()>) {
        let (entered_tx, entered_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel();
        let mut wallet = Self::new(accounts, chain_id);
        wallet.gate = Some(SwitchGate {
            entered: Mutex::new(entered_tx),
            release: Mutex::new(release_rx),
        });
        (wallet, entered_rx, release_tx)
    }

    pub fn script_switch(&self, outcomes: Vec<Result<(), PortError>>) {
        self.state.lock().expect("wallet lock").switch_script = outcomes.into();
    }

    pub fn set_accounts(&self, accounts: Vec<Address>) {
        self.state.lock().expect("wallet lock").accounts = accounts;
    }

    pub fn set_chain(&self, chain_id: u64) {
        self.state.lock().expect("wallet lock").chain_id = chain_id;
    }

    pub fn calls(&self) -> Vec<WalletCall> {
        self.state.lock().expect("wallet lock").calls.clone()
    }

    pub fn switch_calls(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, WalletCall::Switch(_)))
            .count()
    }
}

impl InjectedProviderPort for FakeWallet {
    fn request_accounts(&self) -> Result<Vec<Address>, PortError> {
        let mut g = self.state.lock().expect("wallet lock");
        g.calls.push(WalletCall::RequestAccounts);
        Ok(g.accounts.clone())
    }

    fn accounts(&self) -> Result<Vec<Address>, PortError> {
        let mut g = self.state.lock().expect("wallet lock");
        g.calls.push(WalletCall::Accounts);
        Ok(g.accounts.clone())
    }

    fn chain_id(&self) -> Result<u64, PortError> {
        let mut g = self.state.lock().expect("wallet lock");
        g.calls.push(WalletCall::ChainId);
        Ok(g.chain_id)
    }

    fn switch_chain(&self, hex_chain_id: &str) -> Result<(), PortError> {
        self.state
            .lock()
            .expect("wallet lock")
            .calls
            .push(WalletCall::Switch(hex_chain_id.to_owned()));
        if let Some(gate) = &self.gate {
            gate.entered
                .lock()
                .expect("gate lock")
                .send(())
                .expect("signal switch entered");
            gate.release
                .lock()
                .expect("gate lock")
                .recv()
                .expect("wait for release");
        }
        let mut g = self.state.lock().expect("wallet lock");
        let outcome = g.switch_script.pop_front().unwrap_or(Ok(()));
        if outcome.is_ok() {
            let raw = hex_chain_id.trim_start_matches("0x");
            g.chain_id = u64::from_str_radix(raw, 16).expect("hex chain id");
        }
        outcome
    }

    fn add_chain(&self, params: &NetworkParams) -> Result<(), PortError> {
        let mut g = self.state.lock().expect("wallet lock");
        g.calls.push(WalletCall::AddChain(params.add_chain_payload()));
        g.add_chain_result.clone()
    }
}

/// In-memory read endpoint.
#[derive(Debug)]
pub struct FakeRpc {
    pub native_balance: U256,
    pub token_balances: HashMap<Address, U256>,
    pub bind_ok: bool,
    pub fail_calls: bool,
    pub calls: Mutex<Vec<String>>,
}

impl Default for FakeRpc {
    fn default() -> Self {
        Self {
            native_balance: U256::from(2_500_000_000_000_000_000u128),
            token_balances: HashMap::new(),
            bind_ok: true,
            fail_calls: false,
            calls: Mutex::new(Vec::new()),
        }
    }
}

impl FakeRpc {
    pub fn call_log(&self) -> Vec<String> {
        self.calls.lock().expect("rpc lock").clone()
    }

    fn record(&self, entry: String) {
        self.calls.lock().expect("rpc lock").push(entry);
    }
}

impl RpcPort for FakeRpc {
    fn endpoint(&self) -> &str {
        "memory://base-sepolia"
    }

    fn chain_id(&self) -> Result<u64, PortError> {
        Ok(BASE_SEPOLIA_CHAIN_ID)
    }

    fn get_balance(&self, address: Address) -> Result<U256, PortError> {
        self.record(format!("eth_getBalance:{address}"));
        Ok(self.native_balance)
    }

    fn call(&self, from: Option<Address>, to: Address, data: &Bytes) -> Result<Bytes, PortError> {
        self.record(format!("eth_call:{to}:from={from:?}"));
        if self.fail_calls {
            return Err(PortError::Transport("execution reverted".to_owned()));
        }
        let balance = self.token_balances.get(&to).copied().unwrap_or_default();
        assert_eq!(&data[..4], &[0x70, 0xa0, 0x82, 0x31], "balanceOf selector");
        Ok(Bytes::from(balance.to_be_bytes::<32>().to_vec()))
    }

    fn bind_signer(&self, signer: Address) -> Result<(), PortError> {
        self.record(format!("bind:{signer}"));
        if self.bind_ok {
            Ok(())
        } else {
            Err(PortError::Validation(
                "endpoint cannot sign for wallet account".to_owned(),
            ))
        }
    }
}

pub type TestManager = ConnectionManager<FakeWallet, FakeRpc, TestClock>;

pub fn registry() -> Arc<ContractRegistry> {
    let addresses = ContractKind::ALL
        .iter()
        .enumerate()
        .map(|(i, kind)| (*kind, Address::with_last_byte(0xa0 + i as u8)))
        .collect();
    Arc::new(ContractRegistry::new(addresses).expect("registry"))
}

pub fn new_manager(wallet: Option<FakeWallet>, rpc: Option<FakeRpc>) -> TestManager {
    ConnectionManager::new(
        wallet,
        rpc,
        TestClock::default(),
        Arc::new(TokenCatalog::base_sepolia()),
        registry(),
        ManagerConfig::default(),
    )
}

/// Manager with a wallet on `chain_id` exposing `account()`, and a ready RPC.
pub fn manager_on_chain(chain_id: u64) -> TestManager {
    new_manager(
        Some(FakeWallet::new(vec![account()], chain_id)),
        Some(FakeRpc::default()),
    )
}

pub fn wallet(manager: &TestManager) -> &FakeWallet {
    manager.injected.as_ref().expect("wallet configured")
}

pub fn rpc(manager: &TestManager) -> &FakeRpc {
    manager.rpc.as_ref().expect("rpc configured")
}

pub fn account() -> Address {
    "0x1000000000000000000000000000000000000001"
        .parse()
        .expect("valid account")
}

pub fn other_account() -> Address {
    "0x2000000000000000000000000000000000000002"
        .parse()
        .expect("valid account")
}

pub fn usdc() -> Address {
    USDC.parse().expect("valid usdc address")
}

pub fn connected_on(chain_id: u64) -> WalletSnapshot {
    WalletSnapshot::connected(account(), chain_id)
}
