//! Tool gateway: lazily-established, cached sessions to named tool servers,
//! logical-operation-to-tool-name resolution, and result normalization.
//!
//! The gateway owns the only async context in the process. Stage code is
//! synchronous; every tool call is dispatched onto the gateway's private
//! tokio runtime and the caller blocks until it returns or times out.

pub mod protocol;
pub mod resolve;
pub mod transport;

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use serde_json::Value;

use crate::config::ToolServerConfig;
use crate::error::{AppError, Result};
use protocol::{normalize_result, ToolDescriptor};
use transport::{HttpTransport, ToolTransport};

const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

pub struct ToolGateway {
    servers: HashMap<String, ToolServerConfig>,
    runtime: tokio::runtime::Runtime,
    sessions: Mutex<HashMap<String, Arc<dyn ToolTransport>>>,
    tool_cache: Mutex<HashMap<String, Vec<ToolDescriptor>>>,
    closed: AtomicBool,
}

fn lock<'a, T>(mutex: &'a Mutex<T>) -> MutexGuard<'a, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl ToolGateway {
    pub fn new(servers: HashMap<String, ToolServerConfig>) -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .enable_all()
            .build()
            .map_err(|e| AppError::Gateway(format!("failed to start runtime: {e}")))?;

        tracing::info!(servers = servers.len(), "Tool gateway initialized");

        Ok(Self {
            servers,
            runtime,
            sessions: Mutex::new(HashMap::new()),
            tool_cache: Mutex::new(HashMap::new()),
            closed: AtomicBool::new(false),
        })
    }

    /// Blocking dispatch-and-wait primitive. Fails fast after shutdown.
    fn block_on<F: std::future::Future>(&self, fut: F) -> Result<F::Output> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(AppError::GatewayClosed);
        }
        Ok(self.runtime.block_on(fut))
    }

    /// Return the cached session for `name`, establishing one if absent.
    /// The session table lock is re-checked after acquisition so two racing
    /// callers never establish the same server twice.
    fn ensure_session(&self, name: &str) -> Result<Arc<dyn ToolTransport>> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(AppError::GatewayClosed);
        }

        if let Some(transport) = lock(&self.sessions).get(name) {
            return Ok(Arc::clone(transport));
        }

        let config = self
            .servers
            .get(name)
            .ok_or_else(|| AppError::Gateway(format!("unknown tool server: {name}")))?;

        let mut sessions = lock(&self.sessions);
        if let Some(transport) = sessions.get(name) {
            return Ok(Arc::clone(transport));
        }

        let transport: Arc<dyn ToolTransport> = Arc::new(HttpTransport::new(name, config)?);
        self.block_on(transport.initialize())??;
        tracing::info!(server = name, "Tool server session established");

        sessions.insert(name.to_string(), Arc::clone(&transport));
        Ok(transport)
    }

    /// Fetch and cache the tool listing for a server.
    pub fn list_tools(&self, server: &str) -> Result<Vec<ToolDescriptor>> {
        let transport = self.ensure_session(server)?;
        let tools = self.block_on(transport.list_tools())??;
        lock(&self.tool_cache).insert(server.to_string(), tools.clone());
        Ok(tools)
    }

    /// Resolve a logical operation to a concrete tool name: exact candidates
    /// first, then an all-keywords substring match, else an error listing
    /// what the server actually offers.
    pub fn resolve_tool_name(
        &self,
        server: &str,
        preferred: &[&str],
        keywords: &[&str],
    ) -> Result<String> {
        let cached = lock(&self.tool_cache).get(server).cloned();
        let tools = match cached {
            Some(tools) if !tools.is_empty() => tools,
            _ => self.list_tools(server)?,
        };

        let names: Vec<String> = tools.iter().map(|t| t.name.clone()).collect();
        resolve::resolve_tool_name(&names, preferred, keywords).ok_or_else(|| {
            let available = if names.is_empty() {
                "none".to_string()
            } else {
                names.join(", ")
            };
            AppError::Gateway(format!(
                "no matching tool on server {server}; available tools: {available}"
            ))
        })
    }

    /// Call a tool and normalize the result into a single JSON value.
    pub fn call_tool(
        &self,
        server: &str,
        tool: &str,
        arguments: Value,
        timeout: Duration,
    ) -> Result<Value> {
        let transport = self.ensure_session(server)?;
        tracing::debug!(server, tool, "Calling tool");
        let result = self.block_on(transport.call_tool(tool, arguments, timeout))??;
        normalize_result(result)
    }

    /// Close all sessions best-effort with a bounded wait. Idempotent, and
    /// safe to call from a thread other than the one running the pipeline;
    /// any call issued afterwards fails immediately.
    pub fn shutdown(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }

        let sessions: Vec<(String, Arc<dyn ToolTransport>)> =
            lock(&self.sessions).drain().collect();

        for (name, transport) in sessions {
            let outcome = self
                .runtime
                .block_on(tokio::time::timeout(SHUTDOWN_TIMEOUT, transport.close()));
            match outcome {
                Ok(Ok(())) => tracing::debug!(server = %name, "Tool server session closed"),
                Ok(Err(e)) => {
                    tracing::warn!(server = %name, error = %e, "Failed to close tool server session")
                }
                Err(_) => {
                    tracing::warn!(server = %name, "Timed out closing tool server session")
                }
            }
        }

        lock(&self.tool_cache).clear();
        tracing::info!("Tool gateway shut down");
    }
}

impl Drop for ToolGateway {
    fn drop(&mut self) {
        self.shutdown();
    }
}
