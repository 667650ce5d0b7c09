use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use tokio::sync::RwLock;

use crate::config::ToolServerConfig;
use crate::error::{AppError, Result};
use crate::gateway::protocol::{JsonRpcRequest, JsonRpcResponse, ToolCallResult, ToolDescriptor};

const SESSION_HEADER: &str = "mcp-session-id";
const PROTOCOL_VERSION: &str = "2025-03-26";

/// Connection to one tool server.
#[async_trait]
pub trait ToolTransport: Send + Sync {
    async fn initialize(&self) -> Result<()>;
    async fn list_tools(&self) -> Result<Vec<ToolDescriptor>>;
    async fn call_tool(
        &self,
        name: &str,
        arguments: serde_json::Value,
        timeout: Duration,
    ) -> Result<ToolCallResult>;
    async fn close(&self) -> Result<()>;
}

/// JSON-RPC over HTTP POST. The server may hand out a session id during
/// `initialize`; it is echoed on every later request and released with a
/// best-effort DELETE on close.
pub struct HttpTransport {
    client: reqwest::Client,
    url: String,
    extra_headers: HeaderMap,
    session_id: RwLock<Option<String>>,
    next_id: AtomicU64,
    default_timeout: Duration,
}

impl HttpTransport {
    pub fn new(name: &str, config: &ToolServerConfig) -> Result<Self> {
        let mut extra_headers = HeaderMap::new();
        for (key, value) in &config.headers {
            let key = HeaderName::from_bytes(key.as_bytes())
                .map_err(|e| AppError::Config(format!("bad header name for {name}: {e}")))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| AppError::Config(format!("bad header value for {name}: {e}")))?;
            extra_headers.insert(key, value);
        }

        Ok(Self {
            client: reqwest::Client::new(),
            url: config.url.clone(),
            extra_headers,
            session_id: RwLock::new(None),
            next_id: AtomicU64::new(1),
            default_timeout: Duration::from_secs(config.timeout_secs),
        })
    }

    async fn post_rpc(
        &self,
        method: &str,
        params: Option<serde_json::Value>,
        timeout: Duration,
    ) -> Result<reqwest::Response> {
        let request = JsonRpcRequest::new(self.next_id.fetch_add(1, Ordering::Relaxed), method, params);

        let mut builder = self
            .client
            .post(&self.url)
            .headers(self.extra_headers.clone())
            .timeout(timeout)
            .json(&request);

        if let Some(session) = self.session_id.read().await.as_deref() {
            builder = builder.header(SESSION_HEADER, session);
        }

        let response = builder.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Gateway(format!(
                "tool server returned {status}: {body}"
            )));
        }
        Ok(response)
    }

    async fn rpc(
        &self,
        method: &str,
        params: Option<serde_json::Value>,
        timeout: Duration,
    ) -> Result<serde_json::Value> {
        let response = self.post_rpc(method, params, timeout).await?;
        let parsed = response.json::<JsonRpcResponse>().await?;
        parsed.into_result()
    }
}

#[async_trait]
impl ToolTransport for HttpTransport {
    async fn initialize(&self) -> Result<()> {
        let params = serde_json::json!({
            "protocolVersion": PROTOCOL_VERSION,
            "capabilities": {},
            "clientInfo": { "name": "codemend", "version": env!("CARGO_PKG_VERSION") },
        });

        let response = self
            .post_rpc("initialize", Some(params), self.default_timeout)
            .await?;

        let session = response
            .headers()
            .get(SESSION_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        let parsed = response.json::<JsonRpcResponse>().await?;
        parsed.into_result()?;

        *self.session_id.write().await = session;
        Ok(())
    }

    async fn list_tools(&self) -> Result<Vec<ToolDescriptor>> {
        let result = self.rpc("tools/list", None, self.default_timeout).await?;
        let tools = result
            .get("tools")
            .cloned()
            .ok_or_else(|| AppError::Gateway("tools/list response missing `tools`".to_string()))?;
        Ok(serde_json::from_value(tools)?)
    }

    async fn call_tool(
        &self,
        name: &str,
        arguments: serde_json::Value,
        timeout: Duration,
    ) -> Result<ToolCallResult> {
        let params = serde_json::json!({ "name": name, "arguments": arguments });
        let result = self.rpc("tools/call", Some(params), timeout).await?;
        Ok(serde_json::from_value(result)?)
    }

    async fn close(&self) -> Result<()> {
        let session = self.session_id.write().await.take();
        let Some(session) = session else {
            return Ok(());
        };

        self.client
            .delete(&self.url)
            .headers(self.extra_headers.clone())
            .header(SESSION_HEADER, session)
            .timeout(self.default_timeout)
            .send()
            .await?;
        Ok(())
    }
}
