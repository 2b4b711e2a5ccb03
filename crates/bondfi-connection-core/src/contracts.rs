use std::collections::BTreeMap;
use std::sync::Arc;

use alloy::json_abi::JsonAbi;
use alloy::primitives::{Address, Bytes, U256};
use alloy::sol_types::SolCall;
use serde::{Deserialize, Serialize};

use crate::domain::Signer;
use crate::ports::PortError;

alloy::sol! {
    interface IERC20 {
        function balanceOf(address account) external view returns (uint256);
    }
}

const ERC20_ABI: &str = include_str!("../abi/erc20.json");
const SAVINGS_CIRCLE_ABI: &str = include_str!("../abi/savings_circle.json");
const MARKETPLACE_ABI: &str = include_str!("../abi/marketplace.json");
const REMITTANCE_ABI: &str = include_str!("../abi/remittance.json");
const LIQUIDITY_POOL_ABI: &str = include_str!("../abi/liquidity_pool.json");
const FAUCET_ABI: &str = include_str!("../abi/faucet.json");
const NAME_REGISTRY_ABI: &str = include_str!("../abi/name_registry.json");

/// BondFi contracts deployed at a fixed address on the required network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContractKind {
    SavingsCircle,
    Marketplace,
    Remittance,
    LiquidityPool,
    Faucet,
    NameRegistry,
}

impl ContractKind {
    pub const ALL: [ContractKind; 6] = [
        ContractKind::SavingsCircle,
        ContractKind::Marketplace,
        ContractKind::Remittance,
        ContractKind::LiquidityPool,
        ContractKind::Faucet,
        ContractKind::NameRegistry,
    ];

    fn bundled_abi(self) -> &'static str {
        match self {
            ContractKind::SavingsCircle => SAVINGS_CIRCLE_ABI,
            ContractKind::Marketplace => MARKETPLACE_ABI,
            ContractKind::Remittance => REMITTANCE_ABI,
            ContractKind::LiquidityPool => LIQUIDITY_POOL_ABI,
            ContractKind::Faucet => FAUCET_ABI,
            ContractKind::NameRegistry => NAME_REGISTRY_ABI,
        }
    }
}

fn parse_abi(raw: &str, label: &str) -> Result<Arc<JsonAbi>, PortError> {
    serde_json::from_str::<JsonAbi>(raw)
        .map(Arc::new)
        .map_err(|e| PortError::Validation(format!("invalid bundled abi {label}: {e}")))
}

/// Fixed address + ABI pairs for the known contracts, plus the shared ERC-20 ABI.
#[derive(Debug, Clone)]
pub struct ContractRegistry {
    entries: BTreeMap<ContractKind, (Address, Arc<JsonAbi>)>,
    erc20: Arc<JsonAbi>,
}

impl ContractRegistry {
    pub fn new(addresses: BTreeMap<ContractKind, Address>) -> Result<Self, PortError> {
        let mut entries = BTreeMap::new();
        for (kind, address) in addresses {
            let abi = parse_abi(kind.bundled_abi(), &format!("{kind:?}"))?;
            entries.insert(kind, (address, abi));
        }
        Ok(Self {
            entries,
            erc20: parse_abi(ERC20_ABI, "erc20")?,
        })
    }

    /// Parses a `{"savings_circle": "0x..", ...}` address map.
    pub fn from_json(raw: &str) -> Result<Self, PortError> {
        let addresses: BTreeMap<ContractKind, Address> = serde_json::from_str(raw)
            .map_err(|e| PortError::Validation(format!("invalid contract registry: {e}")))?;
        Self::new(addresses)
    }

    pub fn get(&self, kind: ContractKind) -> Option<(Address, Arc<JsonAbi>)> {
        self.entries
            .get(&kind)
            .map(|(address, abi)| (*address, Arc::clone(abi)))
    }

    pub fn erc20_abi(&self) -> Arc<JsonAbi> {
        Arc::clone(&self.erc20)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallRoute {
    Signer(Signer),
    ReadOnly,
}

/// Contract binding valid only for the `(account, chain)` generation it was built in.
#[derive(Debug, Clone)]
pub struct ContractHandle {
    pub address: Address,
    pub abi: Arc<JsonAbi>,
    pub route: CallRoute,
    pub generation: u64,
}

impl ContractHandle {
    pub fn has_function(&self, name: &str) -> bool {
        self.abi.function(name).is_some_and(|f| !f.is_empty())
    }

    pub fn from_address(&self) -> Option<Address> {
        match &self.route {
            CallRoute::Signer(signer) => Some(signer.address),
            CallRoute::ReadOnly => None,
        }
    }
}

pub fn encode_balance_of(account: Address) -> Bytes {
    Bytes::from(IERC20::balanceOfCall { account }.abi_encode())
}

pub fn decode_balance_of(data: &[u8]) -> Result<U256, PortError> {
    IERC20::balanceOfCall::abi_decode_returns(data, true)
        .map(|ret| ret._0)
        .map_err(|e| PortError::Validation(format!("balanceOf decode failed: {e}")))
}

/// Base units to a decimal string, trimming trailing zeros but keeping one
/// fractional digit (`1500000000000000000` with 18 decimals is `1.5`).
pub fn format_token_amount(value: U256, decimals: u8) -> Result<String, PortError> {
    let formatted = alloy::primitives::utils::format_units(value, decimals)
        .map_err(|e| PortError::Validation(format!("format units failed: {e}")))?;
    let Some((whole, frac)) = formatted.split_once('.') else {
        return Ok(format!("{formatted}.0"));
    };
    let frac = frac.trim_end_matches('0');
    if frac.is_empty() {
        Ok(format!("{whole}.0"))
    } else {
        Ok(format!("{whole}.{frac}"))
    }
}
