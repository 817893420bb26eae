use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::errors::{DeskPilotError, DeskPilotResult};
use crate::llm::types::CallConfig;
use crate::protocol::guard::{DEFAULT_CLICK_RADIUS, DEFAULT_WAIT_SECONDS};

/// Built-in system prompt template, used when `[prompts].system_template` is unset.
pub const DEFAULT_SYSTEM_TEMPLATE: &str = include_str!("../prompts/system.md");

/// Slot in the system template replaced by the configured tool descriptors.
pub const TOOLS_SLOT: &str = "{{tools}}";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub llm: LlmConfig,
    #[serde(default)]
    pub decoding: DecodingConfig,
    #[serde(default)]
    pub agent: AgentConfig,
    #[serde(default)]
    pub prompts: PromptsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct LlmConfig {
    pub active_provider: String,
    pub providers: HashMap<String, ProviderEntry>,
}

impl LlmConfig {
    pub fn active_entry(&self) -> DeskPilotResult<&ProviderEntry> {
        self.providers.get(&self.active_provider).ok_or_else(|| {
            DeskPilotError::Config(format!(
                "Active provider '{}' not found under [llm.providers]",
                self.active_provider
            ))
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderEntry {
    pub display_name: String,
    /// Full chat-completions URL.
    pub api_base: String,
    pub model: String,
    /// Optional API key stored in config.toml (falls back to env var DESKPILOT_<ID>_API_KEY).
    #[serde(default)]
    pub api_key: Option<String>,
    /// Client-side request timeout. No timeout when absent.
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecodingConfig {
    #[serde(default)]
    pub temperature: f64,
    #[serde(default = "default_top_p")]
    pub top_p: f64,
    #[serde(default = "default_top_k")]
    pub top_k: i64,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_seed")]
    pub seed: u64,
    #[serde(default)]
    pub stream: bool,
}

impl Default for DecodingConfig {
    fn default() -> Self {
        Self {
            temperature: 0.0,
            top_p: default_top_p(),
            top_k: default_top_k(),
            max_tokens: default_max_tokens(),
            seed: default_seed(),
            stream: false,
        }
    }
}

impl DecodingConfig {
    pub fn call_config(&self, model: &str) -> CallConfig {
        CallConfig {
            model: model.to_string(),
            stream: self.stream,
            temperature: self.temperature,
            top_p: self.top_p,
            top_k: self.top_k,
            max_tokens: self.max_tokens,
            seed: self.seed,
        }
    }
}

fn default_top_p() -> f64 {
    1.0
}

fn default_top_k() -> i64 {
    -1
}

fn default_max_tokens() -> u32 {
    2048
}

fn default_seed() -> u64 {
    42
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Model calls per prediction cycle before giving up.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_click_radius")]
    pub duplicate_click_radius: f64,
    #[serde(default = "default_wait_seconds")]
    pub duplicate_wait_seconds: f64,
    #[serde(default = "default_true")]
    pub session_log: bool,
    /// Directory for session logs; the per-user data dir when absent.
    #[serde(default)]
    pub log_dir: Option<PathBuf>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            duplicate_click_radius: default_click_radius(),
            duplicate_wait_seconds: default_wait_seconds(),
            session_log: true,
            log_dir: None,
        }
    }
}

fn default_max_attempts() -> u32 {
    3
}

fn default_click_radius() -> f64 {
    DEFAULT_CLICK_RADIUS
}

fn default_wait_seconds() -> f64 {
    DEFAULT_WAIT_SECONDS
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PromptsConfig {
    /// Path to a system prompt template. Relative paths resolve against the config file.
    #[serde(default)]
    pub system_template: Option<PathBuf>,
    /// Tool descriptors rendered into the template's `{{tools}}` slot.
    #[serde(default)]
    pub tools: Vec<serde_json::Value>,
}

impl PromptsConfig {
    /// Load the template (or the built-in one) and fill the tools slot.
    pub fn render_system_prompt(&self, base_dir: Option<&Path>) -> DeskPilotResult<String> {
        let template = match &self.system_template {
            Some(path) => {
                let path = match base_dir {
                    Some(dir) if path.is_relative() => dir.join(path),
                    _ => path.clone(),
                };
                std::fs::read_to_string(&path).map_err(|e| {
                    DeskPilotError::Config(format!(
                        "cannot read system template {}: {e}",
                        path.display()
                    ))
                })?
            }
            None => DEFAULT_SYSTEM_TEMPLATE.to_string(),
        };
        render_template(&template, &self.tools)
    }
}

/// Replaces `{{tools}}` with one compact JSON descriptor per line.
pub fn render_template(template: &str, tools: &[serde_json::Value]) -> DeskPilotResult<String> {
    let lines = tools
        .iter()
        .map(serde_json::to_string)
        .collect::<Result<Vec<_>, _>>()?;
    Ok(template.replace(TOOLS_SLOT, &lines.join("\n")))
}

fn resolve_config_path() -> DeskPilotResult<PathBuf> {
    if let Ok(exe) = std::env::current_exe() {
        if let Some(parent) = exe.parent() {
            let candidate = parent.join("config.toml");
            if candidate.exists() {
                tracing::debug!(path = %candidate.display(), "config found next to executable");
                return Ok(candidate);
            }
        }
    }

    let cwd = std::env::current_dir()?;
    let candidate = cwd.join("config.toml");
    if candidate.exists() {
        tracing::debug!(path = %candidate.display(), "config found in working directory");
        return Ok(candidate);
    }

    Err(DeskPilotError::Config(
        "config.toml not found next to executable or in working directory".into(),
    ))
}

/// Load from `path`, or search the default locations when `None`.
/// Returns the config together with the file it came from.
pub fn load_config(path: Option<&Path>) -> DeskPilotResult<(AppConfig, PathBuf)> {
    let path = match path {
        Some(p) => p.to_path_buf(),
        None => resolve_config_path()?,
    };
    let content = std::fs::read_to_string(&path)?;
    let config = parse_config(&content)?;
    tracing::info!(path = %path.display(), provider = %config.llm.active_provider, "config loaded");
    Ok((config, path))
}

pub fn parse_config(content: &str) -> DeskPilotResult<AppConfig> {
    let config: AppConfig = toml::from_str(content)?;
    if config.agent.max_attempts == 0 {
        return Err(DeskPilotError::Config("agent.max_attempts must be at least 1".into()));
    }
    Ok(config)
}

pub fn save_config(config: &AppConfig, path: &Path) -> DeskPilotResult<()> {
    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content)?;
    tracing::info!(path = %path.display(), "config saved");
    Ok(())
}
