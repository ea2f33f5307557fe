//! Multi-tier TOML configuration for Vigil.
//!
//! Reads configuration from multiple sources with precedence:
//! CLI flags > env vars > `~/.vigil/config.toml` > defaults

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use vigil_mcp::McpConfig;
use vigil_types::ConfigError;

/// The default OpenAI-compatible API base URL.
pub const DEFAULT_API_BASE_URL: &str = "https://api.openai.com/v1";

/// The default model to use.
pub const DEFAULT_MODEL: &str = "gpt-4o";

/// The default max tokens per chat request.
pub const DEFAULT_MAX_TOKENS: u32 = 2000;

/// Resends after a transient chat endpoint failure. Zero sends once.
pub const DEFAULT_API_RETRIES: u32 = 2;

/// Responses longer than this many characters are analyzed in chunks.
pub const DEFAULT_MAX_CHUNK_SIZE: usize = 10_000;

/// Terms that require confirmation before a script tool runs.
pub const DEFAULT_BLACKLIST: &str = "del,rm,shutdown,restart,format";

/// Analysis prompt; `{REQUEST}` and `{RESPONSE}` are filled in per analysis.
pub const DEFAULT_PROMPT: &str = "Analyze this request and response for security vulnerabilities:\n\n\
                                  Request:\n{REQUEST}\n\nResponse:\n{RESPONSE}";

/// Resolved configuration for a Vigil run.
#[derive(Debug, Clone)]
pub struct VigilConfig {
    /// `None` until some source provides one; see [`VigilConfig::require_api_key`].
    pub api_key: Option<String>,
    pub model: String,
    pub max_tokens: u32,
    pub api_base_url: String,
    pub api_retries: u32,
    pub max_chunk_size: usize,
    pub prompt: String,
    pub system_prompt: Option<String>,
    pub tools_dir: Option<PathBuf>,
    pub blacklist: String,
    pub builtin_run_cmd: bool,
    pub mcp: McpConfig,
    pub config_dir: PathBuf,
}

/// Settings that can be read from a TOML config file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SettingsFile {
    #[serde(default)]
    pub api: ApiSettings,
    #[serde(default)]
    pub analysis: AnalysisSettings,
    #[serde(default)]
    pub tools: ToolsSettings,
    #[serde(default)]
    pub mcp: McpConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApiSettings {
    pub api_key: Option<String>,
    pub model: Option<String>,
    pub max_tokens: Option<u32>,
    pub base_url: Option<String>,
    pub retries: Option<u32>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AnalysisSettings {
    pub max_chunk_size: Option<usize>,
    pub prompt: Option<String>,
    pub system_prompt: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ToolsSettings {
    pub dir: Option<PathBuf>,
    pub blacklist: Option<String>,
    #[serde(default)]
    pub builtin_run_cmd: bool,
}

/// CLI overrides that take highest precedence.
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub api_key: Option<String>,
    pub model: Option<String>,
    pub max_tokens: Option<u32>,
    pub tools_dir: Option<PathBuf>,
}

impl VigilConfig {
    /// The API key, required by anything that talks to the chat endpoint.
    pub fn require_api_key(&self) -> Result<&str, ConfigError> {
        self.api_key.as_deref().ok_or_else(|| ConfigError::MissingKey {
            key: "api_key (set VIGIL_API_KEY or add to ~/.vigil/config.toml)".into(),
        })
    }

    /// Load configuration from all sources, applying precedence rules.
    pub fn load(overrides: CliOverrides) -> Result<Self, ConfigError> {
        let config_dir = config_dir();
        let settings = load_settings_file(&config_dir.join("config.toml"));
        Self::resolve(settings, overrides, config_dir, |key| std::env::var(key).ok())
    }

    /// Merge `settings`, environment lookups from `env`, and `overrides`.
    pub fn resolve<E>(
        settings: SettingsFile,
        overrides: CliOverrides,
        config_dir: PathBuf,
        env: E,
    ) -> Result<Self, ConfigError>
    where
        E: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| env(key).filter(|v| !v.trim().is_empty());

        // API key: CLI > VIGIL_API_KEY > OPENAI_API_KEY > config file
        let api_key = overrides
            .api_key
            .or_else(|| non_empty("VIGIL_API_KEY"))
            .or_else(|| non_empty("OPENAI_API_KEY"))
            .or(settings.api.api_key.filter(|k| !k.is_empty()));

        let model = overrides
            .model
            .or_else(|| non_empty("VIGIL_MODEL"))
            .or(settings.api.model)
            .unwrap_or_else(|| DEFAULT_MODEL.to_string());

        let max_tokens = overrides
            .max_tokens
            .or(settings.api.max_tokens)
            .unwrap_or(DEFAULT_MAX_TOKENS);

        let api_base_url = non_empty("VIGIL_API_BASE_URL")
            .or(settings.api.base_url)
            .unwrap_or_else(|| DEFAULT_API_BASE_URL.to_string());

        let max_chunk_size = match settings.analysis.max_chunk_size {
            Some(0) => {
                return Err(ConfigError::InvalidValue {
                    key: "analysis.max_chunk_size".into(),
                    message: "must be greater than zero".into(),
                });
            }
            Some(size) => size,
            None => DEFAULT_MAX_CHUNK_SIZE,
        };

        let tools_dir = overrides
            .tools_dir
            .or(settings.tools.dir)
            .filter(|d| !d.as_os_str().is_empty());

        Ok(VigilConfig {
            api_key,
            model,
            max_tokens,
            api_base_url,
            api_retries: settings.api.retries.unwrap_or(DEFAULT_API_RETRIES),
            max_chunk_size,
            prompt: settings
                .analysis
                .prompt
                .unwrap_or_else(|| DEFAULT_PROMPT.to_string()),
            system_prompt: settings.analysis.system_prompt,
            tools_dir,
            blacklist: settings
                .tools
                .blacklist
                .unwrap_or_else(|| DEFAULT_BLACKLIST.to_string()),
            builtin_run_cmd: settings.tools.builtin_run_cmd,
            mcp: settings.mcp,
            config_dir,
        })
    }
}

/// Get the Vigil config directory path (~/.vigil/).
pub fn config_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("VIGIL_CONFIG_DIR") {
        return PathBuf::from(dir);
    }
    dirs_next::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".vigil")
}

/// Load and parse a TOML settings file, returning defaults on any error.
pub fn load_settings_file(path: &Path) -> SettingsFile {
    match std::fs::read_to_string(path) {
        Ok(content) => toml::from_str(&content).unwrap_or_else(|e| {
            tracing::warn!("Failed to parse {}: {}", path.display(), e);
            SettingsFile::default()
        }),
        Err(_) => SettingsFile::default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use vigil_mcp::TransportKind;

    fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    fn with_key() -> SettingsFile {
        toml::from_str("[api]\napi_key = \"file-key\"\n").unwrap()
    }

    #[test]
    fn defaults_fill_everything_but_the_key() {
        let config =
            VigilConfig::resolve(with_key(), CliOverrides::default(), "/cfg".into(), env_of(&[]))
                .unwrap();
        assert_eq!(config.require_api_key().unwrap(), "file-key");
        assert_eq!(config.model, DEFAULT_MODEL);
        assert_eq!(config.api_base_url, DEFAULT_API_BASE_URL);
        assert_eq!(config.max_tokens, 2000);
        assert_eq!(config.api_retries, 2);
        assert_eq!(config.max_chunk_size, 10_000);
        assert_eq!(config.blacklist, DEFAULT_BLACKLIST);
        assert!(config.prompt.contains("{REQUEST}") && config.prompt.contains("{RESPONSE}"));
        assert!(config.tools_dir.is_none());
        assert!(!config.builtin_run_cmd);
        assert!(config.mcp.enabled);
        assert_eq!(config.mcp.timeout_ms, 30_000);
    }

    #[test]
    fn missing_key_is_an_error_only_when_required() {
        let config = VigilConfig::resolve(
            SettingsFile::default(),
            CliOverrides::default(),
            "/cfg".into(),
            env_of(&[("VIGIL_API_KEY", "  ")]),
        )
        .unwrap();
        assert!(config.api_key.is_none());
        let err = config.require_api_key().unwrap_err();
        assert!(matches!(err, ConfigError::MissingKey { .. }));
    }

    #[test]
    fn precedence_cli_over_env_over_file() {
        let env = env_of(&[
            ("OPENAI_API_KEY", "openai-key"),
            ("VIGIL_MODEL", "env-model"),
            ("VIGIL_API_BASE_URL", "http://localhost:8080/v1"),
        ]);
        let config = VigilConfig::resolve(
            with_key(),
            CliOverrides {
                model: Some("cli-model".into()),
                ..Default::default()
            },
            "/cfg".into(),
            env,
        )
        .unwrap();
        assert_eq!(config.api_key.as_deref(), Some("openai-key"));
        assert_eq!(config.model, "cli-model");
        assert_eq!(config.api_base_url, "http://localhost:8080/v1");
    }

    #[test]
    fn vigil_key_wins_over_openai_key() {
        let env = env_of(&[("VIGIL_API_KEY", "vigil"), ("OPENAI_API_KEY", "openai")]);
        let config =
            VigilConfig::resolve(with_key(), CliOverrides::default(), "/cfg".into(), env).unwrap();
        assert_eq!(config.api_key.as_deref(), Some("vigil"));
    }

    #[test]
    fn full_file_parses() {
        let toml_str = r#"
[api]
api_key = "k"
model = "deepseek-reasoner"
base_url = "api.deepseek.com"
retries = 0

[analysis]
max_chunk_size = 8000
prompt = "Look at {REQUEST} and {RESPONSE}"

[tools]
dir = "/opt/vigil/tools"
blacklist = "drop,truncate"
builtin_run_cmd = true

[mcp]
enabled = false
timeout_ms = 5000

[[mcp.servers]]
name = "fs"
command = "npx -y @modelcontextprotocol/server-filesystem /tmp"

[[mcp.servers]]
name = "remote"
command = "http://127.0.0.1:9000/sse"
transport = "sse"
"#;
        let settings: SettingsFile = toml::from_str(toml_str).unwrap();
        let config =
            VigilConfig::resolve(settings, CliOverrides::default(), "/cfg".into(), env_of(&[]))
                .unwrap();
        assert_eq!(config.model, "deepseek-reasoner");
        assert_eq!(config.api_retries, 0);
        assert_eq!(config.max_chunk_size, 8000);
        assert_eq!(config.tools_dir, Some(PathBuf::from("/opt/vigil/tools")));
        assert_eq!(config.blacklist, "drop,truncate");
        assert!(config.builtin_run_cmd);
        assert!(!config.mcp.enabled);
        assert_eq!(config.mcp.servers.len(), 2);
        assert_eq!(config.mcp.servers[0].transport, TransportKind::Stdio);
        assert_eq!(config.mcp.servers[1].transport, TransportKind::Sse);
    }

    #[test]
    fn zero_chunk_size_is_rejected() {
        let settings: SettingsFile =
            toml::from_str("[api]\napi_key = \"k\"\n[analysis]\nmax_chunk_size = 0\n").unwrap();
        let err = VigilConfig::resolve(settings, CliOverrides::default(), "/cfg".into(), env_of(&[]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }

    #[test]
    fn broken_file_degrades_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[api\nmodel = ").unwrap();
        let settings = load_settings_file(&path);
        assert!(settings.api.model.is_none());
        assert!(load_settings_file(&dir.path().join("absent.toml")).api.api_key.is_none());
    }

    #[test]
    fn cli_tools_dir_overrides_file() {
        let settings: SettingsFile =
            toml::from_str("[api]\napi_key = \"k\"\n[tools]\ndir = \"/from/file\"\n").unwrap();
        let config = VigilConfig::resolve(
            settings,
            CliOverrides {
                tools_dir: Some("/from/cli".into()),
                ..Default::default()
            },
            "/cfg".into(),
            env_of(&[]),
        )
        .unwrap();
        assert_eq!(config.tools_dir, Some(PathBuf::from("/from/cli")));
    }
}
