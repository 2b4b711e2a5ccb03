use alloy::primitives::Address;
use serde::{Deserialize, Serialize};

pub const BASE_SEPOLIA_CHAIN_ID: u64 = 84_532;

/// What the wallet SDK currently reports. Read-only to the connection layer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletSnapshot {
    pub account: Option<Address>,
    pub wallet_present: bool,
    pub chain_id: Option<u64>,
}

impl WalletSnapshot {
    pub fn connected(account: Address, chain_id: u64) -> Self {
        Self {
            account: Some(account),
            wallet_present: true,
            chain_id: Some(chain_id),
        }
    }

    pub fn disconnected() -> Self {
        Self::default()
    }

    pub fn is_connected(&self) -> bool {
        self.account.is_some() && self.wallet_present
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NativeCurrency {
    pub name: String,
    pub symbol: String,
    pub decimals: u8,
}

/// Chain definition handed to `wallet_addEthereumChain`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkParams {
    #[serde(with = "hex_chain_id")]
    pub chain_id: u64,
    pub chain_name: String,
    pub native_currency: NativeCurrency,
    pub rpc_urls: Vec<String>,
    pub block_explorer_urls: Vec<String>,
}

impl NetworkParams {
    pub fn base_sepolia() -> Self {
        Self {
            chain_id: BASE_SEPOLIA_CHAIN_ID,
            chain_name: "Base Sepolia".to_owned(),
            native_currency: NativeCurrency {
                name: "Ethereum".to_owned(),
                symbol: "ETH".to_owned(),
                decimals: 18,
            },
            rpc_urls: vec!["https://sepolia.base.org".to_owned()],
            block_explorer_urls: vec!["https://sepolia.basescan.org".to_owned()],
        }
    }

    /// `0x`-prefixed, uppercase hex digits: 84532 renders as `0x14A34`.
    pub fn hex_chain_id(&self) -> String {
        format!("0x{:X}", self.chain_id)
    }

    /// Parameter object for `wallet_addEthereumChain`.
    pub fn add_chain_payload(&self) -> serde_json::Value {
        serde_json::json!({
            "chainId": self.hex_chain_id(),
            "chainName": self.chain_name,
            "nativeCurrency": {
                "name": self.native_currency.name,
                "symbol": self.native_currency.symbol,
                "decimals": self.native_currency.decimals,
            },
            "rpcUrls": self.rpc_urls,
            "blockExplorerUrls": self.block_explorer_urls,
        })
    }
}

/// `chainId` travels as a `0x` hex string on the wallet wire.
mod hex_chain_id {
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(chain_id: &u64, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format!("0x{chain_id:X}"))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
        let raw = String::deserialize(deserializer)?;
        let digits = raw
            .strip_prefix("0x")
            .or_else(|| raw.strip_prefix("0X"))
            .ok_or_else(|| D::Error::custom(format!("chain id must be 0x-prefixed: {raw}")))?;
        u64::from_str_radix(digits, 16).map_err(D::Error::custom)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SignerBinding {
    /// Rebound onto the long-lived read endpoint.
    RpcAttached,
    /// Fallback: the handle handed out by the injected wallet.
    WalletNative,
}

/// Transaction signing capability for one `(account, chain)` pair.
///
/// Never mutated; the manager swaps in a fresh value on every recomputation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signer {
    pub address: Address,
    pub binding: SignerBinding,
    pub generation: u64,
}

#[cfg(test)]
mod tests {
    use super::NetworkParams;

    #[test]
    fn base_sepolia_hex_chain_id_is_uppercase() {
        assert_eq!(NetworkParams::base_sepolia().hex_chain_id(), "0x14A34");
    }

    #[test]
    fn add_chain_payload_carries_chain_id() {
        let payload = NetworkParams::base_sepolia().add_chain_payload();
        assert_eq!(payload["chainId"], "0x14A34");
        assert_eq!(payload["nativeCurrency"]["decimals"], 18);
    }

    #[test]
    fn network_params_keep_chain_id_through_json() {
        let params = NetworkParams::base_sepolia();
        let value = serde_json::to_value(&params).expect("serialize");
        assert_eq!(value, params.add_chain_payload());
        let back: NetworkParams = serde_json::from_value(value).expect("deserialize");
        assert_eq!(back, params);
        assert_eq!(back.chain_id, 84_532);

        let bad = serde_json::json!({
            "chainId": "84532",
            "chainName": "Base Sepolia",
            "nativeCurrency": {"name": "Ethereum", "symbol": "ETH", "decimals": 18},
            "rpcUrls": [],
            "blockExplorerUrls": []
        });
        assert!(serde_json::from_value::<NetworkParams>(bad).is_err());
    }
}
