use std::sync::{Arc, Mutex, MutexGuard};

use alloy::json_abi::JsonAbi;
use alloy::primitives::{Address, Bytes};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::catalog::{TokenCatalog, TOKEN_DECIMALS};
use crate::contracts::{
    decode_balance_of, encode_balance_of, format_token_amount, CallRoute, ContractHandle,
    ContractKind, ContractRegistry,
};
use crate::domain::{NetworkParams, Signer, SignerBinding, WalletSnapshot};
use crate::errors::{BalanceError, ConnectionError};
use crate::ports::{ClockPort, InjectedProviderPort, PortError, RpcPort};
use crate::state_machine::{
    connection_transition, ConnectionAction, ConnectionPhase, PhaseTransition,
};

pub const DEFAULT_AUTO_SWITCH_DELAY_MS: u64 = 1_000;

#[derive(Debug, Clone)]
pub struct ManagerConfig {
    pub network: NetworkParams,
    /// Debounce before the one automatic switch attempt, so wallet state can settle.
    pub auto_switch_delay_ms: u64,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            network: NetworkParams::base_sepolia(),
            auto_switch_delay_ms: DEFAULT_AUTO_SWITCH_DELAY_MS,
        }
    }
}

/// Process-wide connection state. Only the manager writes it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionState {
    pub wallet: WalletSnapshot,
    pub phase: ConnectionPhase,
    pub network_error: Option<String>,
    pub connection_error: Option<String>,
    pub is_switching_network: bool,
    pub auto_switch_attempted: bool,
    /// Generation in which the pending automatic switch was scheduled.
    pub pending_auto_switch: Option<u64>,
    pub signer: Option<Signer>,
    pub native_balance: Option<String>,
    pub generation: u64,
}

impl Default for ConnectionState {
    fn default() -> Self {
        Self {
            wallet: WalletSnapshot::disconnected(),
            phase: ConnectionPhase::Disconnected,
            network_error: None,
            connection_error: None,
            is_switching_network: false,
            auto_switch_attempted: false,
            pending_auto_switch: None,
            signer: None,
            native_balance: None,
            generation: 0,
        }
    }
}

impl ConnectionState {
    pub fn is_connected(&self) -> bool {
        self.wallet.is_connected()
    }

    pub fn is_correct_network(&self, required_chain_id: u64) -> bool {
        self.wallet.chain_id == Some(required_chain_id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduledSwitch {
    pub generation: u64,
    pub delay_ms: u64,
    pub due_at_ms: u64,
}

#[derive(Debug, Clone)]
pub enum ConnectionCommand {
    ObserveWallet(WalletSnapshot),
    RunScheduledSwitch(ScheduledSwitch),
    SwitchNetwork,
    DeriveSigner,
    RefreshNativeBalance,
}

#[derive(Debug, Clone, Default)]
pub struct CommandResult {
    pub transitions: Vec<PhaseTransition>,
    pub scheduled_switch: Option<ScheduledSwitch>,
    pub switched: Option<bool>,
    pub native_balance: Option<String>,
    /// Set when an async outcome was dropped because the state moved on.
    pub stale: bool,
}

impl CommandResult {
    fn empty() -> Self {
        Self::default()
    }

    fn merge(&mut self, other: CommandResult) {
        self.transitions.extend(other.transitions);
        self.scheduled_switch = self.scheduled_switch.or(other.scheduled_switch);
        self.native_balance = other.native_balance.or(self.native_balance.take());
        self.stale |= other.stale;
    }
}

/// Owns the connection state and mediates every change to it.
///
/// Port I/O never happens under the state lock. Async outcomes carry the
/// generation they were started in and are dropped when it no longer matches.
pub struct ConnectionManager<I, R, C>
where
    I: InjectedProviderPort,
    R: RpcPort,
    C: ClockPort,
{
    pub injected: Option<I>,
    pub rpc: Option<R>,
    pub clock: C,
    pub catalog: Arc<TokenCatalog>,
    pub contracts: Arc<ContractRegistry>,
    config: ManagerConfig,
    state: Mutex<ConnectionState>,
}

impl<I, R, C> ConnectionManager<I, R, C>
where
    I: InjectedProviderPort,
    R: RpcPort,
    C: ClockPort,
{
    pub fn new(
        injected: Option<I>,
        rpc: Option<R>,
        clock: C,
        catalog: Arc<TokenCatalog>,
        contracts: Arc<ContractRegistry>,
        config: ManagerConfig,
    ) -> Self {
        Self {
            injected,
            rpc,
            clock,
            catalog,
            contracts,
            config,
            state: Mutex::new(ConnectionState::default()),
        }
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }

    pub fn required_chain_id(&self) -> u64 {
        self.config.network.chain_id
    }

    pub fn state(&self) -> Result<ConnectionState, PortError> {
        Ok(self.lock()?.clone())
    }

    pub fn signer(&self) -> Option<Signer> {
        self.lock().ok().and_then(|g| g.signer.clone())
    }

    pub fn is_connected(&self) -> bool {
        self.lock().is_ok_and(|g| g.is_connected())
    }

    pub fn is_correct_network(&self) -> bool {
        let required = self.required_chain_id();
        self.lock().is_ok_and(|g| g.is_correct_network(required))
    }

    pub fn handle(&self, command: ConnectionCommand) -> Result<CommandResult, PortError> {
        match command {
            ConnectionCommand::ObserveWallet(snapshot) => self.observe_wallet(snapshot),
            ConnectionCommand::RunScheduledSwitch(scheduled) => {
                self.run_scheduled_switch(scheduled)
            }
            ConnectionCommand::SwitchNetwork => self.switch_network(),
            ConnectionCommand::DeriveSigner => {
                let generation = self.lock()?.generation;
                self.derive_signer(generation)
            }
            ConnectionCommand::RefreshNativeBalance => {
                let native_balance = self.refresh_native_balance()?;
                Ok(CommandResult {
                    native_balance,
                    ..CommandResult::empty()
                })
            }
        }
    }

    /// Wallet connect, disconnect, account change and chain change all land
    /// here. An unchanged snapshot is a no-op; any change recomputes the state.
    pub fn observe_wallet(&self, snapshot: WalletSnapshot) -> Result<CommandResult, PortError> {
        let required = self.required_chain_id();
        let mut result = CommandResult::empty();

        let generation = {
            let mut g = self.lock()?;
            if g.wallet == snapshot {
                debug!(?snapshot, "wallet snapshot unchanged");
                return Ok(result);
            }
            let was_connected = g.is_connected();
            g.wallet = snapshot;
            g.generation = g.generation.saturating_add(1);
            g.signer = None;
            let generation = g.generation;

            if !snapshot.is_connected() {
                g.network_error = None;
                g.connection_error = None;
                g.auto_switch_attempted = false;
                g.pending_auto_switch = None;
                g.native_balance = None;
                self.apply(&mut g, ConnectionAction::Disconnect, &mut result);
                return Ok(result);
            }

            if !g.is_correct_network(required) {
                g.native_balance = None;
                g.network_error = Some(mismatch_message(&self.config.network, snapshot.chain_id));
                if was_connected {
                    g.connection_error = Some(
                        ConnectionError::WrongNetwork {
                            expected: required,
                            actual: snapshot.chain_id,
                        }
                        .to_string(),
                    );
                }
                self.apply(&mut g, ConnectionAction::ChainMismatch, &mut result);

                self.schedule_auto_switch(&mut g, generation, &mut result)?;
                return Ok(result);
            }

            g.network_error = None;
            g.auto_switch_attempted = false;
            g.pending_auto_switch = None;
            let action = if was_connected {
                ConnectionAction::ChainMatched
            } else {
                ConnectionAction::Connect
            };
            self.apply(&mut g, action, &mut result);
            if g.is_switching_network {
                debug!("network switch in flight; signer derivation deferred");
                return Ok(result);
            }
            generation
        };

        result.merge(self.derive_signer(generation)?);
        Ok(result)
    }

    /// Fires the automatic attempt scheduled by `observe_wallet`. Superseded
    /// schedules and sessions that already tried are no-ops.
    pub fn run_scheduled_switch(
        &self,
        scheduled: ScheduledSwitch,
    ) -> Result<CommandResult, PortError> {
        {
            let mut g = self.lock()?;
            if g.pending_auto_switch != Some(scheduled.generation) {
                debug!(
                    generation = scheduled.generation,
                    "automatic switch superseded"
                );
                return Ok(CommandResult {
                    switched: Some(false),
                    ..CommandResult::empty()
                });
            }
            g.pending_auto_switch = None;
            if g.auto_switch_attempted
                || !g.is_connected()
                || g.is_correct_network(self.required_chain_id())
            {
                return Ok(CommandResult {
                    switched: Some(false),
                    ..CommandResult::empty()
                });
            }
        }
        self.switch_inner(true)
    }

    /// Manual network switch. Independent of the automatic one-shot but
    /// subject to the same in-flight guard.
    pub fn switch_network(&self) -> Result<CommandResult, PortError> {
        self.switch_inner(false)
    }

    fn switch_inner(&self, automatic: bool) -> Result<CommandResult, PortError> {
        let mut result = CommandResult::empty();
        let network = &self.config.network;

        let started = {
            let mut g = self.lock()?;
            if g.is_switching_network {
                debug!("network switch already in flight");
                result.switched = Some(false);
                return Ok(result);
            }
            if self.injected.is_none() {
                g.network_error = Some(ConnectionError::NoProvider.to_string());
                result.switched = Some(false);
                return Ok(result);
            }
            g.is_switching_network = true;
            if automatic {
                g.auto_switch_attempted = true;
            }
            self.apply(&mut g, ConnectionAction::SwitchStart, &mut result);
            g.generation
        };

        let outcome = match self.injected.as_ref() {
            Some(injected) => request_switch(injected, network),
            None => Err(PortError::NotFound("injected provider".to_owned())),
        };

        let generation = {
            let mut g = self.lock()?;
            g.is_switching_network = false;
            if g.generation != started {
                // The wallet moved on while the request was open; the latest
                // observation wins over the reply.
                debug!(started, current = g.generation, "discarding stale switch outcome");
                result.stale = true;
                result.switched = Some(false);
                if !g.is_connected() {
                    return Ok(result);
                }
                let in_switch = g.phase == ConnectionPhase::Switching;
                if !g.is_correct_network(self.required_chain_id()) {
                    if in_switch {
                        self.apply(&mut g, ConnectionAction::SwitchFailed, &mut result);
                    }
                    let generation = g.generation;
                    self.schedule_auto_switch(&mut g, generation, &mut result)?;
                    return Ok(result);
                }
                result.switched = Some(outcome.is_ok());
                if in_switch {
                    match outcome {
                        Ok(()) => {
                            self.apply(&mut g, ConnectionAction::SwitchSucceeded, &mut result)
                        }
                        Err(_) => {
                            self.apply(&mut g, ConnectionAction::SwitchFailed, &mut result);
                            self.apply(&mut g, ConnectionAction::ChainMatched, &mut result);
                        }
                    }
                }
                g.generation
            } else {
                match outcome {
                    Ok(()) => {
                        info!(chain_id = network.chain_id, "network switch succeeded");
                        g.network_error = None;
                        g.connection_error = None;
                        g.auto_switch_attempted = true;
                        g.pending_auto_switch = None;
                        if g.is_connected() {
                            g.wallet.chain_id = Some(network.chain_id);
                        }
                        g.generation = g.generation.saturating_add(1);
                        g.signer = None;
                        self.apply(&mut g, ConnectionAction::SwitchSucceeded, &mut result);
                        result.switched = Some(true);
                        g.generation
                    }
                    Err(err) => {
                        let message = match &err {
                            PortError::UserRejected(_) => format!(
                                "Network switch was rejected. Please switch to {} manually in your wallet.",
                                network.chain_name
                            ),
                            other => other.raw_message(),
                        };
                        warn!(error = %err, "network switch failed");
                        g.network_error = Some(message);
                        self.apply(&mut g, ConnectionAction::SwitchFailed, &mut result);
                        result.switched = Some(false);
                        return Ok(result);
                    }
                }
            }
        };

        result.merge(self.derive_signer(generation)?);
        Ok(result)
    }

    /// Reactive signer derivation for `generation`. Failures end up in
    /// `connection_error`, never in the returned `Result`.
    pub fn derive_signer(&self, generation: u64) -> Result<CommandResult, PortError> {
        let mut result = CommandResult::empty();

        let account = {
            let mut g = self.lock()?;
            if g.generation != generation {
                result.stale = true;
                return Ok(result);
            }
            if let Some(reason) = self.signer_blocker(&g) {
                debug!(reason, "signer preconditions not met");
                g.signer = None;
                return Ok(result);
            }
            match g.wallet.account {
                Some(account) => account,
                None => return Ok(result),
            }
        };

        let outcome = self.synthesize_signer(account, generation, false);

        {
            let mut g = self.lock()?;
            if g.generation != generation {
                debug!(generation, current = g.generation, "discarding stale signer derivation");
                result.stale = true;
                return Ok(result);
            }
            match outcome {
                Ok(signer) => {
                    info!(address = %signer.address, binding = ?signer.binding, "signer ready");
                    g.signer = Some(signer);
                    g.connection_error = None;
                    self.apply(&mut g, ConnectionAction::SignerDerived, &mut result);
                }
                Err(err) => {
                    error!(error = %err, "signer derivation failed");
                    g.signer = None;
                    g.connection_error = Some(err.to_string());
                    self.apply(&mut g, ConnectionAction::SignerFailed, &mut result);
                    return Ok(result);
                }
            }
        }

        result.native_balance = self.refresh_native_balance()?;
        Ok(result)
    }

    /// Forces signer derivation outside the reactive cycle, e.g. a user
    /// pressing "Reconnect". Errors go back to the caller.
    pub fn reconnect(&self) -> Result<Signer, ConnectionError> {
        let required = self.required_chain_id();
        let mut transitions = CommandResult::empty();

        let (account, generation) = {
            let mut g = self.lock()?;
            let Some(account) = g.wallet.account.filter(|_| g.is_connected()) else {
                return Err(ConnectionError::NotConnected);
            };
            if !g.is_correct_network(required) {
                return Err(ConnectionError::WrongNetwork {
                    expected: required,
                    actual: g.wallet.chain_id,
                });
            }
            if g.is_switching_network {
                return Err(ConnectionError::SwitchInProgress);
            }
            if self.rpc.is_none() {
                return Err(ConnectionError::ProviderNotReady);
            }
            self.apply(&mut g, ConnectionAction::Reconnect, &mut transitions);
            (account, g.generation)
        };

        let outcome = self.synthesize_signer(account, generation, true);

        let mut g = self.lock()?;
        if g.generation != generation {
            return Err(ConnectionError::Superseded);
        }
        match outcome {
            Ok(signer) => {
                g.signer = Some(signer.clone());
                g.connection_error = None;
                self.apply(&mut g, ConnectionAction::SignerDerived, &mut transitions);
                Ok(signer)
            }
            Err(err) => {
                g.signer = None;
                g.connection_error = Some(err.to_string());
                self.apply(&mut g, ConnectionAction::SignerFailed, &mut transitions);
                Err(err)
            }
        }
    }

    /// Updates the tracked native balance for the connected account.
    pub fn refresh_native_balance(&self) -> Result<Option<String>, PortError> {
        let (account, generation) = {
            let g = self.lock()?;
            match g.wallet.account {
                Some(account) if self.ready(&g) => (account, g.generation),
                _ => return Ok(None),
            }
        };
        let Some(rpc) = self.rpc.as_ref() else {
            return Ok(None);
        };

        let decimals = self.config.network.native_currency.decimals;
        let formatted = match rpc
            .get_balance(account)
            .and_then(|wei| format_token_amount(wei, decimals))
        {
            Ok(formatted) => formatted,
            Err(err) => {
                error!(error = %err, %account, "native balance refresh failed");
                return Ok(None);
            }
        };

        let mut g = self.lock()?;
        if g.generation != generation {
            debug!("discarding stale native balance");
            return Ok(None);
        }
        g.native_balance = Some(formatted.clone());
        Ok(Some(formatted))
    }

    /// Binds `abi` at `address` through the current signer, or read-only when
    /// there is none. `None` when not connected to the required network.
    pub fn create_instance(&self, address: Address, abi: Arc<JsonAbi>) -> Option<ContractHandle> {
        let g = match self.lock() {
            Ok(g) => g,
            Err(err) => {
                error!(error = %err, "contract instance unavailable");
                return None;
            }
        };
        if self.rpc.is_none() {
            warn!(%address, "provider not initialized; no contract instance");
            return None;
        }
        if !g.is_connected() {
            warn!(%address, "wallet not connected; no contract instance");
            return None;
        }
        if !g.is_correct_network(self.required_chain_id()) {
            warn!(%address, chain_id = ?g.wallet.chain_id, "wrong network; no contract instance");
            return None;
        }
        let route = g
            .signer
            .clone()
            .map_or(CallRoute::ReadOnly, CallRoute::Signer);
        Some(ContractHandle {
            address,
            abi,
            route,
            generation: g.generation,
        })
    }

    pub fn contract_instance(&self, kind: ContractKind) -> Option<ContractHandle> {
        let Some((address, abi)) = self.contracts.get(kind) else {
            warn!(?kind, "contract address not configured");
            return None;
        };
        self.create_instance(address, abi)
    }

    pub fn token_instance(&self, token: Address) -> Option<ContractHandle> {
        self.create_instance(token, self.contracts.erc20_abi())
    }

    /// `eth_call` through a handle. Handles from an earlier generation are rejected.
    pub fn call_contract(&self, handle: &ContractHandle, data: &Bytes) -> Result<Bytes, PortError> {
        let current = self.lock()?.generation;
        if handle.generation != current {
            return Err(PortError::Policy(format!(
                "stale contract handle for {} (generation {} != {current})",
                handle.address, handle.generation
            )));
        }
        let rpc = self
            .rpc
            .as_ref()
            .ok_or_else(|| PortError::NotFound("rpc provider".to_owned()))?;
        rpc.call(handle.from_address(), handle.address, data)
    }

    /// Balance of `token_address` for the connected account as a decimal string.
    ///
    /// `Ok(None)` when the connection is not ready or the lookup failed; only an
    /// address missing from the catalog is an error.
    pub fn fetch_balance(&self, token_address: Address) -> Result<Option<String>, BalanceError> {
        let (account, generation, native_balance) = {
            let g = match self.lock() {
                Ok(g) => g,
                Err(err) => {
                    error!(error = %err, "balance fetch unavailable");
                    return Ok(None);
                }
            };
            match g.wallet.account {
                Some(account) if self.ready(&g) => {
                    (account, g.generation, g.native_balance.clone())
                }
                _ => {
                    warn!(token = %token_address, "balance requested before connection is ready");
                    return Ok(None);
                }
            }
        };

        let token = self
            .catalog
            .find_by_address(token_address)
            .ok_or(BalanceError::TokenNotFound(token_address))?;
        if token.native {
            return Ok(native_balance);
        }

        let Some(handle) = self.token_instance(token.address) else {
            error!(token = %token.symbol, "token contract unavailable");
            return Ok(None);
        };
        let balance = self
            .call_contract(&handle, &encode_balance_of(account))
            .and_then(|raw| decode_balance_of(&raw))
            .and_then(|value| format_token_amount(value, TOKEN_DECIMALS));
        let formatted = match balance {
            Ok(formatted) => formatted,
            Err(err) => {
                error!(token = %token.symbol, error = %err, "balance fetch failed");
                return Ok(None);
            }
        };

        match self.lock() {
            Ok(g) if g.generation == generation => Ok(Some(formatted)),
            _ => {
                debug!(token = %token.symbol, "discarding stale balance");
                Ok(None)
            }
        }
    }

    fn synthesize_signer(
        &self,
        account: Address,
        generation: u64,
        request_accounts: bool,
    ) -> Result<Signer, ConnectionError> {
        let required = self.required_chain_id();
        let injected = self.injected.as_ref().ok_or(ConnectionError::NoProvider)?;
        let rpc = self.rpc.as_ref().ok_or(ConnectionError::ProviderNotReady)?;

        let wallet_chain = injected.chain_id()?;
        if wallet_chain != required {
            return Err(ConnectionError::WrongNetwork {
                expected: required,
                actual: Some(wallet_chain),
            });
        }

        let accounts = if request_accounts {
            injected.request_accounts()?
        } else {
            injected.accounts()?
        };
        let signer_address = accounts
            .into_iter()
            .next()
            .ok_or(ConnectionError::NoAccounts)?;
        if signer_address != account {
            return Err(ConnectionError::AddressMismatch {
                wallet: account,
                signer: signer_address,
            });
        }

        let binding = match rpc.bind_signer(signer_address) {
            Ok(()) => SignerBinding::RpcAttached,
            Err(err) => {
                debug!(error = %err, endpoint = rpc.endpoint(), "using wallet-native signer");
                SignerBinding::WalletNative
            }
        };

        Ok(Signer {
            address: signer_address,
            binding,
            generation,
        })
    }

    fn signer_blocker(&self, g: &ConnectionState) -> Option<&'static str> {
        if g.wallet.account.is_none() {
            return Some("no account");
        }
        if !g.wallet.wallet_present {
            return Some("no wallet");
        }
        if !g.is_correct_network(self.required_chain_id()) {
            return Some("wrong network");
        }
        if self.rpc.is_none() {
            return Some("provider not initialized");
        }
        if g.is_switching_network {
            return Some("network switch in flight");
        }
        None
    }

    /// Arms the one automatic attempt of this session, unless it already ran,
    /// is pending, or a switch is in flight.
    fn schedule_auto_switch(
        &self,
        g: &mut ConnectionState,
        generation: u64,
        result: &mut CommandResult,
    ) -> Result<(), PortError> {
        if g.auto_switch_attempted || g.pending_auto_switch.is_some() || g.is_switching_network {
            return Ok(());
        }
        let delay_ms = self.config.auto_switch_delay_ms;
        let now = self.clock.now_ms()?;
        g.pending_auto_switch = Some(generation);
        result.scheduled_switch = Some(ScheduledSwitch {
            generation,
            delay_ms,
            due_at_ms: now.saturating_add(delay_ms),
        });
        info!(
            chain_id = ?g.wallet.chain_id,
            delay_ms,
            "scheduled automatic network switch"
        );
        Ok(())
    }

    fn ready(&self, g: &ConnectionState) -> bool {
        self.rpc.is_some() && g.is_connected() && g.is_correct_network(self.required_chain_id())
    }

    fn apply(
        &self,
        g: &mut ConnectionState,
        action: ConnectionAction,
        result: &mut CommandResult,
    ) {
        match connection_transition(g.phase, action) {
            Ok((to, reason)) => {
                if to != g.phase {
                    debug!(from = ?g.phase, ?to, reason, "connection phase");
                }
                result.transitions.push(PhaseTransition {
                    from: g.phase,
                    to,
                    action,
                    reason,
                    generation: g.generation,
                });
                g.phase = to;
            }
            Err(err) => warn!(error = %err, "ignored connection action"),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, ConnectionState>, PortError> {
        self.state
            .lock()
            .map_err(|e| PortError::Transport(format!("connection state lock poisoned: {e}")))
    }
}

fn request_switch<I: InjectedProviderPort>(
    injected: &I,
    network: &NetworkParams,
) -> Result<(), PortError> {
    let hex_chain_id = network.hex_chain_id();
    match injected.switch_chain(&hex_chain_id) {
        Err(PortError::UnknownChain(message)) => {
            info!(%message, chain = %network.chain_name, "wallet does not know chain; adding it");
            injected.add_chain(network)?;
            injected.switch_chain(&hex_chain_id)
        }
        other => other,
    }
}

fn mismatch_message(network: &NetworkParams, actual: Option<u64>) -> String {
    match actual {
        Some(chain_id) => format!(
            "Wrong network. Please switch to {} (chain ID {}); wallet is on chain {chain_id}.",
            network.chain_name, network.chain_id
        ),
        None => format!(
            "Unknown network. Please switch to {} (chain ID {}).",
            network.chain_name, network.chain_id
        ),
    }
}
