//! bondfi-connect: drives one wallet connection pass against Base Sepolia and
//! prints the resulting connection state.

use std::sync::Arc;
use std::time::Duration;

use alloy::primitives::Address;
use eyre::WrapErr;
use tracing::{info, warn};

use bondfi_connection_adapters::{
    ConnectionConfig, Eip1193Adapter, EnsApiAdapter, HttpRpcAdapter, SystemClockAdapter,
};
use bondfi_connection_core::{
    CommandResult, ConnectionCommand, ConnectionManager, NameResolverPort, PortError,
};

type Manager = ConnectionManager<Eip1193Adapter, HttpRpcAdapter, SystemClockAdapter>;

/// Upper bound on wallet event rounds processed in one pass.
const MAX_EVENT_ROUNDS: usize = 8;

#[tokio::main]
async fn main() -> eyre::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    info!("Starting bondfi-connect");

    let config = ConnectionConfig::from_env();
    let ens_url = config.ens_api_url.clone();
    let ens_timeout_ms = config.ens_timeout_ms;

    // Blocking HTTP clients must be built and dropped off the async workers.
    let manager = Arc::new(
        tokio::task::spawn_blocking(move || build_manager(&config))
            .await
            .wrap_err("manager setup task failed")??,
    );

    let outcome = drive(&manager, ens_url, ens_timeout_ms).await;
    tokio::task::spawn_blocking(move || drop(manager))
        .await
        .wrap_err("manager teardown task failed")?;
    outcome
}

fn build_manager(config: &ConnectionConfig) -> eyre::Result<Manager> {
    let catalog = config
        .load_token_catalog()
        .wrap_err("failed to load token catalog")?;
    let contracts = config
        .load_contract_registry()
        .wrap_err("failed to load contract registry")?;

    let wallet = Eip1193Adapter::with_config(config.clone());
    let injected = if wallet.is_available() {
        Some(wallet)
    } else {
        warn!("no injected wallet runtime; running without a wallet");
        None
    };

    let rpc = match HttpRpcAdapter::new(config.rpc_url.clone(), config.rpc_timeout_ms) {
        Ok(rpc) => Some(rpc),
        Err(e) => {
            warn!(error = %e, url = %config.rpc_url, "rpc endpoint unavailable");
            None
        }
    };

    Ok(ConnectionManager::new(
        injected,
        rpc,
        SystemClockAdapter,
        Arc::new(catalog),
        Arc::new(contracts),
        config.manager_config(),
    ))
}

async fn blocking<T, F>(manager: &Arc<Manager>, f: F) -> eyre::Result<T>
where
    T: Send + 'static,
    F: FnOnce(&Manager) -> Result<T, PortError> + Send + 'static,
{
    let manager = Arc::clone(manager);
    let value = tokio::task::spawn_blocking(move || f(&manager))
        .await
        .wrap_err("blocking task failed")??;
    Ok(value)
}

async fn observe(manager: &Arc<Manager>) -> eyre::Result<Option<CommandResult>> {
    blocking(manager, |m| {
        let Some(wallet) = m.injected.as_ref() else {
            return Ok(None);
        };
        let snapshot = wallet.snapshot()?;
        m.handle(ConnectionCommand::ObserveWallet(snapshot)).map(Some)
    })
    .await
}

async fn drive(
    manager: &Arc<Manager>,
    ens_url: Option<String>,
    ens_timeout_ms: u64,
) -> eyre::Result<()> {
    let mut next = observe(manager).await?;

    for _ in 0..MAX_EVENT_ROUNDS {
        let Some(result) = next.take() else { break };
        for t in &result.transitions {
            info!(from = ?t.from, to = ?t.to, reason = t.reason, "connection transition");
        }
        if let Some(scheduled) = result.scheduled_switch {
            info!(delay_ms = scheduled.delay_ms, "waiting before automatic network switch");
            tokio::time::sleep(Duration::from_millis(scheduled.delay_ms)).await;
            let switched = blocking(manager, move |m| {
                m.handle(ConnectionCommand::RunScheduledSwitch(scheduled))
            })
            .await?;
            info!(switched = ?switched.switched, "automatic network switch finished");
        }

        let events = blocking(manager, |m| match m.injected.as_ref() {
            Some(wallet) => wallet.drain_events(),
            None => Ok(Vec::new()),
        })
        .await?;
        if events.is_empty() {
            break;
        }
        for event in &events {
            info!(sequence = event.sequence, kind = ?event.kind, value = %event.value, "wallet event");
        }
        next = observe(manager).await?;
    }

    let report = blocking(manager, move |m| {
        let state = m.state()?;
        let mut balances = serde_json::Map::new();
        for token in m.catalog.tokens() {
            let balance = m.fetch_balance(token.address).unwrap_or_else(|e| {
                warn!(error = %e, symbol = %token.symbol, "balance lookup failed");
                None
            });
            balances.insert(token.symbol.clone(), serde_json::json!(balance));
        }
        let ens_name = match (ens_url, state.wallet.account) {
            (Some(url), Some(account)) => reverse_lookup(&url, ens_timeout_ms, account),
            _ => None,
        };
        Ok(serde_json::json!({
            "state": state,
            "connected": m.is_connected(),
            "correctNetwork": m.is_correct_network(),
            "ensName": ens_name,
            "balances": balances,
        }))
    })
    .await?;

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn reverse_lookup(url: &str, timeout_ms: u64, account: Address) -> Option<String> {
    let lookup = EnsApiAdapter::with_timeout(url, timeout_ms).and_then(|ens| ens.reverse(account));
    match lookup {
        Ok(name) => name,
        Err(e) => {
            warn!(error = %e, %account, "ens reverse lookup failed");
            None
        }
    }
}
