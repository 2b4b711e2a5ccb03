//! Static token reference data.

use alloy::primitives::{address, Address};
use serde::{Deserialize, Serialize};

use crate::ports::PortError;

/// Balances are formatted with this many decimals for every catalog token.
pub const TOKEN_DECIMALS: u8 = 18;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Token {
    pub id: u32,
    pub symbol: String,
    pub name: String,
    pub address: Address,
    /// Symbols of the tokens this one is paired with in the swap pools.
    #[serde(default)]
    pub pool_partners: Vec<String>,
    #[serde(default)]
    pub icon: Option<String>,
    #[serde(default)]
    pub native: bool,
}

/// Ordered, read-only list of known tokens.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenCatalog {
    tokens: Vec<Token>,
}

impl TokenCatalog {
    pub fn new(tokens: Vec<Token>) -> Result<Self, PortError> {
        let natives = tokens.iter().filter(|t| t.native).count();
        if natives > 1 {
            return Err(PortError::Validation(format!(
                "token catalog declares {natives} native assets"
            )));
        }
        for (i, token) in tokens.iter().enumerate() {
            if tokens[..i].iter().any(|t| t.address == token.address) {
                return Err(PortError::Validation(format!(
                    "duplicate token address in catalog: {}",
                    token.address
                )));
            }
        }
        Ok(Self { tokens })
    }

    pub fn from_json(raw: &str) -> Result<Self, PortError> {
        let tokens: Vec<Token> = serde_json::from_str(raw)
            .map_err(|e| PortError::Validation(format!("invalid token catalog: {e}")))?;
        Self::new(tokens)
    }

    /// Tokens tradable on Base Sepolia out of the box.
    pub fn base_sepolia() -> Self {
        Self {
            tokens: vec![
                Token {
                    id: 1,
                    symbol: "ETH".to_owned(),
                    name: "Ethereum".to_owned(),
                    address: Address::ZERO,
                    pool_partners: vec!["USDC".to_owned()],
                    icon: Some("/tokens/eth.svg".to_owned()),
                    native: true,
                },
                Token {
                    id: 2,
                    symbol: "USDC".to_owned(),
                    name: "USD Coin".to_owned(),
                    address: address!("036CbD53842c5426634e7929541eC2318f3dCF7e"),
                    pool_partners: vec!["ETH".to_owned()],
                    icon: Some("/tokens/usdc.svg".to_owned()),
                    native: false,
                },
            ],
        }
    }

    pub fn tokens(&self) -> &[Token] {
        &self.tokens
    }

    pub fn find_by_address(&self, address: Address) -> Option<&Token> {
        self.tokens.iter().find(|t| t.address == address)
    }

    pub fn find_by_symbol(&self, symbol: &str) -> Option<&Token> {
        self.tokens
            .iter()
            .find(|t| t.symbol.eq_ignore_ascii_case(symbol))
    }

    pub fn native(&self) -> Option<&Token> {
        self.tokens.iter().find(|t| t.native)
    }
}
