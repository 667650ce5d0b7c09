use std::collections::HashMap;
use std::path::PathBuf;

use serde::Deserialize;

use crate::error::{AppError, Result};

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub tracker: TrackerConfig,
    pub gateway: GatewayConfig,
    pub llm: LlmConfig,
    pub git: GitConfig,
    pub review: ReviewConfig,
    pub notify: NotifyConfig,
    #[serde(default)]
    pub paths: PathsConfig,
}

/// Query filter for the issue tracker (severities/types/status are fixed per
/// deployment; the finder controls paging explicitly).
#[derive(Debug, Deserialize, Clone)]
pub struct TrackerConfig {
    pub project_key: String,
    pub branch: String,
    #[serde(default = "default_severities")]
    pub severities: Vec<String>,
    #[serde(default = "default_types")]
    pub types: Vec<String>,
    #[serde(default = "default_page_size")]
    pub page_size: u32,
}

#[derive(Debug, Deserialize, Clone)]
pub struct GatewayConfig {
    /// Named tool servers, e.g. `tracker` and `review`.
    pub servers: HashMap<String, ToolServerConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ToolServerConfig {
    pub url: String,
    #[serde(default)]
    pub headers: HashMap<String, String>,
    #[serde(default = "default_server_timeout")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub disabled: bool,
}

#[derive(Deserialize, Clone)]
pub struct LlmConfig {
    pub base_url: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
}

// Manual Debug impl to avoid leaking the API key
impl std::fmt::Debug for LlmConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmConfig")
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .finish()
    }
}

#[derive(Deserialize, Clone)]
pub struct GitConfig {
    pub repo_path: PathBuf,
    #[serde(default = "default_mainline")]
    pub mainline: String,
    #[serde(default = "default_remote")]
    pub remote: String,
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default = "default_author_name")]
    pub author_name: String,
    #[serde(default = "default_author_email")]
    pub author_email: String,
}

// Manual Debug impl to avoid leaking the access token
impl std::fmt::Debug for GitConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitConfig")
            .field("repo_path", &self.repo_path)
            .field("mainline", &self.mainline)
            .field("remote", &self.remote)
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .field("author_name", &self.author_name)
            .field("author_email", &self.author_email)
            .finish()
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ReviewConfig {
    pub project: String,
    pub repository: String,
    #[serde(default = "default_target_branch")]
    pub target_branch: String,
    /// Work item to link on the review request; non-numeric values are
    /// tolerated by omitting the link.
    #[serde(default)]
    pub work_item_id: String,
    pub default_reviewer: String,
    /// User-facing URL template; `{id}` is replaced with the reference id.
    pub url_template: String,
}

#[derive(Deserialize, Clone)]
pub struct NotifyConfig {
    pub webhook_url: String,
    #[serde(default)]
    pub dm_api_url: Option<String>,
    #[serde(default)]
    pub dm_token: Option<String>,
    /// Shown in the broadcast payload when no email resolves for the assignee.
    #[serde(default = "default_fallback_owner")]
    pub fallback_owner: String,
}

impl std::fmt::Debug for NotifyConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotifyConfig")
            .field("webhook_url", &self.webhook_url)
            .field("dm_api_url", &self.dm_api_url)
            .field("dm_token", &self.dm_token.as_ref().map(|_| "[REDACTED]"))
            .field("fallback_owner", &self.fallback_owner)
            .finish()
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct PathsConfig {
    #[serde(default = "default_ledger_path")]
    pub processed_ledger: PathBuf,
    #[serde(default = "default_effort_path")]
    pub effort_ledger: PathBuf,
    #[serde(default = "default_email_to_guid")]
    pub email_to_guid: PathBuf,
    #[serde(default = "default_email_to_platform_id")]
    pub email_to_platform_id: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            processed_ledger: default_ledger_path(),
            effort_ledger: default_effort_path(),
            email_to_guid: default_email_to_guid(),
            email_to_platform_id: default_email_to_platform_id(),
        }
    }
}

fn default_severities() -> Vec<String> {
    vec!["INFO".to_string()]
}

fn default_types() -> Vec<String> {
    vec!["CODE_SMELL".to_string()]
}

fn default_page_size() -> u32 {
    50
}

fn default_server_timeout() -> u64 {
    30
}

fn default_model() -> String {
    "Kimi-K2".to_string()
}

fn default_temperature() -> f32 {
    0.3
}

fn default_mainline() -> String {
    "master".to_string()
}

fn default_remote() -> String {
    "origin".to_string()
}

fn default_author_name() -> String {
    "Codemend Bot".to_string()
}

fn default_author_email() -> String {
    "codemend[bot]@users.noreply.localhost".to_string()
}

fn default_target_branch() -> String {
    "refs/heads/master".to_string()
}

fn default_fallback_owner() -> String {
    "unassigned".to_string()
}

fn default_ledger_path() -> PathBuf {
    PathBuf::from("state/processed_findings.json")
}

fn default_effort_path() -> PathBuf {
    PathBuf::from("state/effort_state.json")
}

fn default_email_to_guid() -> PathBuf {
    PathBuf::from("state/email_to_guid.json")
}

fn default_email_to_platform_id() -> PathBuf {
    PathBuf::from("state/email_to_platform_id.json")
}

impl AppConfig {
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let mut builder = config::Config::builder();

        // Load from file if specified
        if let Some(path) = config_path {
            builder = builder.add_source(config::File::with_name(path));
        } else {
            // Try default paths
            builder = builder.add_source(config::File::with_name("codemend").required(false));
        }

        // Environment variable overrides with CODEMEND_ prefix
        builder = builder.add_source(
            config::Environment::with_prefix("CODEMEND")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder
            .build()
            .map_err(|e| AppError::Config(e.to_string()))?;

        config
            .try_deserialize()
            .map_err(|e| AppError::Config(e.to_string()))
    }

    /// Enabled tool servers by name.
    pub fn enabled_servers(&self) -> HashMap<String, ToolServerConfig> {
        self.gateway
            .servers
            .iter()
            .filter(|(_, cfg)| !cfg.disabled)
            .map(|(name, cfg)| (name.clone(), cfg.clone()))
            .collect()
    }
}
