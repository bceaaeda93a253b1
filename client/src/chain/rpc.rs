//! JSON-RPC 2.0 transport shared by the wallet provider and the contract
//! binding.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

use super::ProviderError;

#[derive(Debug, Serialize)]
struct RpcRequest<'a> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    params: serde_json::Value,
}

#[derive(Debug, Deserialize)]
#[allow(dead_code)] // Fields used for deserialization from RPC response
struct RpcResponse {
    jsonrpc: String,
    id: u64,
    #[serde(flatten)]
    result: RpcResult,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RpcResult {
    Success { result: serde_json::Value },
    Error { error: RpcErrorObject },
}

#[derive(Debug, Deserialize)]
struct RpcErrorObject {
    code: i64,
    message: String,
    #[serde(default)]
    data: Option<serde_json::Value>,
}

#[derive(Debug)]
pub struct JsonRpcClient {
    url: String,
    client: reqwest::Client,
    next_id: AtomicU64,
}

impl JsonRpcClient {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            client: reqwest::Client::new(),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Sends one request and decodes its `result` into `T`.
    pub async fn call<T>(&self, method: &str, params: serde_json::Value) -> Result<T, ProviderError>
    where
        T: for<'de> Deserialize<'de>,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let request = RpcRequest {
            jsonrpc: "2.0",
            id,
            method,
            params,
        };

        debug!(method = method, id = id, "JSON-RPC request");

        let response = self.client.post(&self.url).json(&request).send().await?;

        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            return Err(ProviderError::Rpc {
                code: status.as_u16() as i64,
                message: format!("HTTP {}: {}", status, text),
                data: None,
            });
        }

        parse_response(&text)
    }
}

fn parse_response<T>(text: &str) -> Result<T, ProviderError>
where
    T: for<'de> Deserialize<'de>,
{
    let rpc_response: RpcResponse = serde_json::from_str(text)?;

    match rpc_response.result {
        RpcResult::Success { result } => {
            serde_json::from_value(result).map_err(ProviderError::Serialization)
        }
        RpcResult::Error { error } => Err(ProviderError::Rpc {
            code: error.code,
            message: error.message,
            data: error.data,
        }),
    }
}
