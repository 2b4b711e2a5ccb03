#![allow(dead_code)]

use std::io::Read;
use std::sync::{Arc, Mutex};
use std::thread;

use serde_json::{json, Value};
use tiny_http::{Method, Response, Server, StatusCode};

pub const ACCOUNT: &str = "0x1000000000000000000000000000000000000001";
pub const ENS_NAME: &str = "alice.eth";

/// State behind the mock wallet proxy and JSON-RPC node.
#[derive(Debug)]
pub struct MockChain {
    pub chain_id: u64,
    pub known_chains: Vec<u64>,
    pub reject_switch: bool,
    pub managed_accounts: Vec<String>,
    pub balance_hex: String,
    pub call_result: String,
    pub calls: Vec<String>,
    pub bodies: Vec<Value>,
}

impl Default for MockChain {
    fn default() -> Self {
        Self {
            chain_id: 1,
            known_chains: vec![1],
            reject_switch: false,
            managed_accounts: Vec::new(),
            // 2.5 ether
            balance_hex: "0x22b1c8c1227a0000".to_owned(),
            call_result: format!("0x{:064x}", 1_250_000_000_000_000_000u128),
            calls: Vec::new(),
            bodies: Vec::new(),
        }
    }
}

impl MockChain {
    fn dispatch(&mut self, method: &str, params: &Value) -> Value {
        match method {
            "eth_requestAccounts" => json!({"result": [ACCOUNT]}),
            "eth_accounts" => json!({"result": self.managed_accounts}),
            "eth_chainId" => json!({"result": format!("0x{:x}", self.chain_id)}),
            "eth_getBalance" => json!({"result": self.balance_hex}),
            "eth_call" => json!({"result": self.call_result}),
            "wallet_switchEthereumChain" => {
                let requested = params
                    .get(0)
                    .and_then(|p| p.get("chainId"))
                    .and_then(Value::as_str)
                    .and_then(|s| u64::from_str_radix(s.trim_start_matches("0x"), 16).ok());
                match requested {
                    _ if self.reject_switch => json!({
                        "error": {"code": 4001, "message": "User rejected the request."}
                    }),
                    Some(id) if self.known_chains.contains(&id) => {
                        self.chain_id = id;
                        json!({"result": null})
                    }
                    _ => json!({
                        "error": {"code": 4902, "message": "Unrecognized chain ID"}
                    }),
                }
            }
            "wallet_addEthereumChain" => {
                let added = params
                    .get(0)
                    .and_then(|p| p.get("chainId"))
                    .and_then(Value::as_str)
                    .and_then(|s| u64::from_str_radix(s.trim_start_matches("0x"), 16).ok());
                match added {
                    Some(id) => {
                        self.known_chains.push(id);
                        json!({"result": null})
                    }
                    None => json!({"error": {"code": -32602, "message": "Invalid params"}}),
                }
            }
            _ => json!({"error": {"code": -32601, "message": "Method not found"}}),
        }
    }
}

/// Serves JSON-RPC on `POST /` and the ENS gateway on `GET /resolve/*` and
/// `GET /reverse/*` until the listener is dropped.
pub fn spawn_mock_server(
    chain: Arc<Mutex<MockChain>>,
) -> (String, thread::JoinHandle<()>) {
    let server = Server::http("127.0.0.1:0").expect("start server");
    let addr = format!("http://{}", server.server_addr());

    let join = thread::spawn(move || {
        for _ in 0..64 {
            let mut req = match server.recv() {
                Ok(r) => r,
                Err(_) => break,
            };
            let method = req.method().clone();
            let path = req.url().to_owned();
            let mut body = String::new();
            let _ = req.as_reader().read_to_string(&mut body);

            let (code, payload) = match method {
                Method::Post => {
                    let request: Value = serde_json::from_str(&body).unwrap_or(Value::Null);
                    let rpc_method = request
                        .get("method")
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_owned();
                    let params = request.get("params").cloned().unwrap_or(Value::Null);
                    let mut g = chain.lock().expect("chain lock");
                    g.calls.push(rpc_method.clone());
                    g.bodies.push(request.clone());
                    let mut reply = g.dispatch(&rpc_method, &params);
                    if let Some(obj) = reply.as_object_mut() {
                        obj.insert("jsonrpc".to_owned(), json!("2.0"));
                        obj.insert(
                            "id".to_owned(),
                            request.get("id").cloned().unwrap_or(json!(1)),
                        );
                    }
                    (200, reply)
                }
                Method::Get => {
                    if let Ok(mut g) = chain.lock() {
                        g.calls.push(path.clone());
                    }
                    let lower = path.to_ascii_lowercase();
                    if lower == format!("/resolve/{ENS_NAME}") {
                        (200, json!({"address": ACCOUNT}))
                    } else if lower == format!("/reverse/{}", ACCOUNT.to_ascii_lowercase()) {
                        (200, json!({"name": ENS_NAME}))
                    } else if lower.starts_with("/broken/") {
                        (500, json!({"error": "upstream unavailable"}))
                    } else {
                        (404, json!({"error": "not found"}))
                    }
                }
                _ => (405, json!({"error": "method not allowed"})),
            };

            let response =
                Response::from_string(payload.to_string()).with_status_code(StatusCode(code));
            let _ = req.respond(response);
        }
    });

    (addr, join)
}

pub fn mock_chain() -> Arc<Mutex<MockChain>> {
    Arc::new(Mutex::new(MockChain::default()))
}

/// Accepts one request and answers only after `delay_ms`.
pub fn spawn_stalled_server(delay_ms: u64) -> (String, thread::JoinHandle<()>) {
    let server = Server::http("127.0.0.1:0").expect("start server");
    let addr = format!("http://{}", server.server_addr());
    let join = thread::spawn(move || {
        if let Ok(req) = server.recv() {
            thread::sleep(std::time::Duration::from_millis(delay_ms));
            let _ = req.respond(Response::from_string(json!({"address": ACCOUNT}).to_string()));
        }
    });
    (addr, join)
}
