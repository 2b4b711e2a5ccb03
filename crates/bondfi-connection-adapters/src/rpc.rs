use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use alloy::primitives::{Address, Bytes, U256};
use serde_json::Value;
use tracing::debug;

use bondfi_connection_core::{PortError, RpcPort};

use crate::eip1193::json_chain_id_to_u64;

/// JSON-RPC client for the required network's public endpoint.
#[derive(Debug)]
pub struct HttpRpcAdapter {
    endpoint: String,
    client: reqwest::blocking::Client,
    next_id: AtomicU64,
}

impl HttpRpcAdapter {
    pub fn new(endpoint: impl Into<String>, timeout_ms: u64) -> Result<Self, PortError> {
        let endpoint = endpoint.into();
        if !endpoint.starts_with("http://") && !endpoint.starts_with("https://") {
            return Err(PortError::Validation(format!(
                "rpc endpoint must be http(s): {endpoint}"
            )));
        }
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_millis(timeout_ms))
            .build()
            .map_err(|e| PortError::Transport(format!("rpc client init failed: {e}")))?;
        Ok(Self {
            endpoint,
            client,
            next_id: AtomicU64::new(1),
        })
    }

    fn request(&self, method: &str, params: Value) -> Result<Value, PortError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let payload = serde_json::json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });
        debug!(method, id, endpoint = %self.endpoint, "rpc request");
        let response = self
            .client
            .post(&self.endpoint)
            .json(&payload)
            .send()
            .map_err(|e| PortError::Transport(format!("{method} request failed: {e}")))?;
        let status = response.status();
        if !status.is_success() {
            return Err(PortError::Transport(format!("{method}: http status {status}")));
        }
        let body: Value = response
            .json()
            .map_err(|e| PortError::Transport(format!("{method}: invalid json: {e}")))?;
        if let Some(err) = body.get("error") {
            let code = err.get("code").and_then(Value::as_i64).unwrap_or_default();
            let message = err
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("rpc error")
                .to_owned();
            return Err(PortError::Rpc { code, message });
        }
        body.get("result")
            .cloned()
            .ok_or_else(|| PortError::Transport(format!("{method}: missing result")))
    }
}

impl RpcPort for HttpRpcAdapter {
    fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn chain_id(&self) -> Result<u64, PortError> {
        let result = self.request("eth_chainId", serde_json::json!([]))?;
        json_chain_id_to_u64(&result)
    }

    fn get_balance(&self, address: Address) -> Result<U256, PortError> {
        let result = self.request(
            "eth_getBalance",
            serde_json::json!([address.to_string(), "latest"]),
        )?;
        parse_quantity(&result)
    }

    fn call(&self, from: Option<Address>, to: Address, data: &Bytes) -> Result<Bytes, PortError> {
        let mut tx = serde_json::json!({
            "to": to.to_string(),
            "data": data.to_string(),
        });
        if let (Some(from), Some(obj)) = (from, tx.as_object_mut()) {
            obj.insert("from".to_owned(), Value::String(from.to_string()));
        }
        let result = self.request("eth_call", serde_json::json!([tx, "latest"]))?;
        let raw = result
            .as_str()
            .ok_or_else(|| PortError::Validation("eth_call result must be hex".to_owned()))?;
        raw.parse()
            .map_err(|e| PortError::Validation(format!("invalid eth_call result: {e}")))
    }

    fn bind_signer(&self, signer: Address) -> Result<(), PortError> {
        let result = self.request("eth_accounts", serde_json::json!([]))?;
        let managed = result
            .as_array()
            .map(|accounts| {
                accounts
                    .iter()
                    .filter_map(Value::as_str)
                    .filter_map(|a| a.parse::<Address>().ok())
                    .any(|a| a == signer)
            })
            .unwrap_or(false);
        if managed {
            Ok(())
        } else {
            Err(PortError::NotFound(format!(
                "{signer} is not managed by {}",
                self.endpoint
            )))
        }
    }
}

fn parse_quantity(value: &Value) -> Result<U256, PortError> {
    let raw = value
        .as_str()
        .ok_or_else(|| PortError::Validation("quantity must be a hex string".to_owned()))?;
    let digits = raw
        .strip_prefix("0x")
        .ok_or_else(|| PortError::Validation(format!("quantity missing 0x prefix: {raw}")))?;
    if digits.is_empty() {
        return Ok(U256::ZERO);
    }
    U256::from_str_radix(digits, 16)
        .map_err(|e| PortError::Validation(format!("invalid quantity {raw}: {e}")))
}
