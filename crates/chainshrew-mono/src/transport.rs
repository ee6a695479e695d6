//! HTTP transport for node RPC.
//!
//! Every request is a single POST with no retry; a failed request surfaces as
//! [`SyncError::Rpc`] and ends the run.

use async_trait::async_trait;
use chainshrew_sync::{
    BatchCall, JsonRpcError, JsonRpcRequest, JsonRpcResponse, RpcTransport, SyncError, SyncResult,
};
use log::debug;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use url::Url;

/// Basic-auth credentials.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: Option<String>,
}

impl Credentials {
    /// Parse `user:pass` (or a bare `user`).
    pub fn parse(auth: &str) -> Self {
        match auth.split_once(':') {
            Some((username, password)) => Self {
                username: username.to_string(),
                password: Some(password.to_string()),
            },
            None => Self {
                username: auth.to_string(),
                password: None,
            },
        }
    }
}

/// Split credentials embedded in `url` from the address itself.
pub fn split_credentials(url: &str) -> anyhow::Result<(String, Option<Credentials>)> {
    let mut parsed = Url::parse(url)?;
    if parsed.username().is_empty() {
        return Ok((url.trim_end_matches('/').to_string(), None));
    }
    let credentials = Credentials {
        username: parsed.username().to_string(),
        password: parsed.password().map(|s| s.to_string()),
    };
    parsed
        .set_username("")
        .map_err(|_| anyhow::anyhow!("cannot strip username from {}", url))?;
    parsed
        .set_password(None)
        .map_err(|_| anyhow::anyhow!("cannot strip password from {}", url))?;
    Ok((
        parsed.as_str().trim_end_matches('/').to_string(),
        Some(credentials),
    ))
}

pub fn create_http_client() -> anyhow::Result<reqwest::Client> {
    reqwest::ClientBuilder::new()
        .timeout(std::time::Duration::from_secs(60))
        .connect_timeout(std::time::Duration::from_secs(20))
        .pool_idle_timeout(std::time::Duration::from_secs(60))
        .pool_max_idle_per_host(10)
        .build()
        .map_err(|e| anyhow::anyhow!("Failed to create HTTP client: {}", e))
}

#[derive(Clone)]
pub struct HttpRpcTransport {
    client: reqwest::Client,
    url: String,
    credentials: Option<Credentials>,
    next_id: Arc<AtomicU64>,
}

impl HttpRpcTransport {
    /// `auth` (`user:pass`) takes precedence over credentials in the URL.
    pub fn new(url: &str, auth: Option<&str>) -> anyhow::Result<Self> {
        let (url, embedded) = split_credentials(url)?;
        Ok(Self {
            client: create_http_client()?,
            url,
            credentials: auth.map(Credentials::parse).or(embedded),
            next_id: Arc::new(AtomicU64::new(0)),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn credentials(&self) -> Option<&Credentials> {
        self.credentials.as_ref()
    }

    fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::SeqCst)
    }

    async fn send(&self, url: &str, body: &Value) -> SyncResult<Value> {
        let mut request = self.client.post(url).json(body);
        if let Some(credentials) = &self.credentials {
            request = request.basic_auth(&credentials.username, credentials.password.as_ref());
        }
        let response = request
            .send()
            .await
            .map_err(|e| SyncError::Rpc(format!("POST {}: {}", url, e)))?;
        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| SyncError::Rpc(format!("POST {}: {}", url, e)))?;
        // JSON-RPC servers report call errors with non-2xx codes and a JSON body
        serde_json::from_str(&text).map_err(|e| {
            SyncError::Rpc(format!("POST {} ({}): invalid JSON {}: {}", url, status, e, text))
        })
    }
}

fn into_result(response: JsonRpcResponse) -> Result<Value, JsonRpcError> {
    match response.error {
        Some(error) => Err(error),
        None => Ok(response.result.unwrap_or(Value::Null)),
    }
}

/// Order batch responses by request id.
pub fn match_batch_responses(
    ids: &[u64],
    responses: Vec<JsonRpcResponse>,
) -> SyncResult<Vec<Result<Value, JsonRpcError>>> {
    let mut by_id: HashMap<u64, JsonRpcResponse> = responses
        .into_iter()
        .filter_map(|response| response.id.as_u64().map(|id| (id, response)))
        .collect();
    ids.iter()
        .map(|id| {
            by_id
                .remove(id)
                .map(into_result)
                .ok_or_else(|| SyncError::Rpc(format!("batch response missing id {}", id)))
        })
        .collect()
}

#[async_trait]
impl RpcTransport for HttpRpcTransport {
    async fn call(&self, method: &str, params: Vec<Value>) -> SyncResult<Value> {
        let request = JsonRpcRequest::new(self.next_id(), method, params);
        let body = serde_json::to_value(&request)
            .map_err(|e| SyncError::Rpc(format!("{}: {}", method, e)))?;
        debug!("{} {}", method, body["params"]);
        let response: JsonRpcResponse = serde_json::from_value(self.send(&self.url, &body).await?)
            .map_err(|e| SyncError::Rpc(format!("{}: malformed response: {}", method, e)))?;
        into_result(response).map_err(|e| SyncError::Rpc(format!("{}: {}", method, e)))
    }

    async fn batch(&self, calls: Vec<BatchCall>) -> SyncResult<Vec<Result<Value, JsonRpcError>>> {
        let requests: Vec<JsonRpcRequest> = calls
            .into_iter()
            .map(|call| JsonRpcRequest::new(self.next_id(), &call.method, call.params))
            .collect();
        let ids: Vec<u64> = requests.iter().map(|request| request.id).collect();
        let body = serde_json::to_value(&requests)
            .map_err(|e| SyncError::Rpc(format!("batch: {}", e)))?;
        let responses: Vec<JsonRpcResponse> =
            serde_json::from_value(self.send(&self.url, &body).await?)
                .map_err(|e| SyncError::Rpc(format!("batch: malformed response: {}", e)))?;
        match_batch_responses(&ids, responses)
    }

    async fn post(&self, path: &str, body: Value) -> SyncResult<Value> {
        let url = format!("{}/{}", self.url, path.trim_start_matches('/'));
        debug!("POST {} {}", url, body);
        self.send(&url, &body).await
    }
}
