use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_INSTRUCTION: &str = "You are a helpful web browsing assistant that can interact with websites using puppeteer.
- Navigate to websites and perform browser actions (click, scroll, type)
- Extract information from web pages
- Take screenshots of page elements when useful
- Provide concise summaries of web content using markdown
- Follow multi-step browsing sequences to complete tasks";

/// Root of all on-disk state: `~/.webagent`
pub fn home() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".webagent")
}

/// Agent description: persona plus the servers it may use
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    pub name: String,
    pub instruction: String,
    pub server_names: Vec<String>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        AgentConfig {
            name: "browser".to_string(),
            instruction: DEFAULT_INSTRUCTION.to_string(),
            server_names: vec!["puppeteer".to_string()],
        }
    }
}

/// Language model settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub model: String,
    pub base_url: String,
    /// Name of the environment variable (or secrets.toml key) holding the API key
    pub api_key_env: String,
    pub max_retries: usize,
    pub max_iterations: usize,
    pub max_tool_calls: usize,
    pub use_history: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        LlmConfig {
            model: std::env::var("OPENAI_MODEL").unwrap_or_else(|_| "gpt-4o".to_string()),
            base_url: std::env::var("OPENAI_BASE_URL")
                .unwrap_or_else(|_| "https://api.openai.com/v1".to_string()),
            api_key_env: "OPENAI_API_KEY".to_string(),
            max_retries: 3,
            max_iterations: 10,
            max_tool_calls: 8,
            use_history: true,
            temperature: None,
            max_tokens: None,
        }
    }
}

/// How to launch one MCP server over stdio
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

impl ServerConfig {
    pub fn puppeteer() -> Self {
        ServerConfig {
            command: "npx".to_string(),
            args: vec![
                "-y".to_string(),
                "@modelcontextprotocol/server-puppeteer".to_string(),
            ],
            env: BTreeMap::new(),
        }
    }
}

/// Deadlines for each suspend point of a session
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub connect_timeout_secs: u64,
    pub attach_timeout_secs: u64,
    pub request_timeout_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfig {
            connect_timeout_secs: 60,
            attach_timeout_secs: 30,
            request_timeout_secs: 300,
        }
    }
}

impl SessionConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn attach_timeout(&self) -> Duration {
        Duration::from_secs(self.attach_timeout_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub agent: AgentConfig,
    pub llm: LlmConfig,
    pub session: SessionConfig,
    pub servers: BTreeMap<String, ServerConfig>,
}

impl Default for Config {
    fn default() -> Self {
        let mut servers = BTreeMap::new();
        servers.insert("puppeteer".to_string(), ServerConfig::puppeteer());

        Config {
            agent: AgentConfig::default(),
            llm: LlmConfig::default(),
            session: SessionConfig::default(),
            servers,
        }
    }
}

impl Config {
    /// Load from `path`; a missing file yields the defaults
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Config::default());
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("failed to parse config file {}", path.display()))?;

        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    pub fn default_path() -> PathBuf {
        home().join("config.toml")
    }

    pub fn load_default() -> Result<Self> {
        Self::load(&Self::default_path())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load(&dir.path().join("nope.toml")).unwrap();

        assert_eq!(config.agent.name, "browser");
        assert_eq!(config.agent.server_names, vec!["puppeteer".to_string()]);
        assert_eq!(config.servers["puppeteer"], ServerConfig::puppeteer());
        assert!(config.llm.use_history);
    }

    #[test]
    fn partial_file_keeps_remaining_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(
            &path,
            r#"
[llm]
model = "gpt-4o-mini"
max_iterations = 4

[session]
request_timeout_secs = 12
"#,
        )
        .unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.llm.model, "gpt-4o-mini");
        assert_eq!(config.llm.max_iterations, 4);
        assert_eq!(config.llm.api_key_env, "OPENAI_API_KEY");
        assert_eq!(config.session.request_timeout(), Duration::from_secs(12));
        assert_eq!(config.session.connect_timeout_secs, 60);
        assert!(config.servers.contains_key("puppeteer"));
    }

    #[test]
    fn save_then_load_preserves_servers() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = Config::default();
        config.servers.insert(
            "fetch".to_string(),
            ServerConfig {
                command: "uvx".to_string(),
                args: vec!["mcp-server-fetch".to_string()],
                env: BTreeMap::from([("LOG".to_string(), "1".to_string())]),
            },
        );
        config.save(&path).unwrap();

        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded.servers.len(), 2);
        assert_eq!(loaded.servers["fetch"].env["LOG"], "1");
    }

    #[test]
    fn malformed_file_reports_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[llm\nmodel = ").unwrap();

        let err = Config::load(&path).unwrap_err();
        assert!(format!("{:#}", err).contains("config.toml"));
    }
}
