use anyhow::{anyhow, Context, Result};
use hyperflow_core::{Backoff, JobOptions, DEFAULT_BACKOFF_DELAY_MS, DEFAULT_JOB_ATTEMPTS};
use llm::ChatClientConfig;
use orchestrator::EngineConfig;
use queue::WorkerConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_CONFIG_FILE: &str = "hyperflow.toml";
pub const DEFAULT_DATABASE_URL: &str = "sqlite:hyperflow.db";
pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_WORKER_CONCURRENCY: usize = 5;
pub const DEFAULT_LOG_LEVEL: &str = "info";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub log_level: String,
    pub database: DatabaseSettings,
    pub server: ServerSettings,
    pub worker: WorkerSettings,
    pub llm: LlmSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseSettings {
    pub url: String,
    /// Falls back to `url`.
    pub queue_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerSettings {
    pub concurrency: usize,
    pub retry_attempts: u32,
    pub retry_delay_ms: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmSettings {
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub model: Option<String>,
    pub timeout_secs: Option<u64>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_level: DEFAULT_LOG_LEVEL.to_string(),
            database: DatabaseSettings::default(),
            server: ServerSettings::default(),
            worker: WorkerSettings::default(),
            llm: LlmSettings::default(),
        }
    }
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            url: DEFAULT_DATABASE_URL.to_string(),
            queue_url: None,
        }
    }
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
        }
    }
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_WORKER_CONCURRENCY,
            retry_attempts: DEFAULT_JOB_ATTEMPTS,
            retry_delay_ms: DEFAULT_BACKOFF_DELAY_MS,
        }
    }
}

impl Settings {
    /// Defaults, then the TOML file, then the process environment.
    ///
    /// An explicit `path` must exist. Without one, `hyperflow.toml` in the
    /// working directory is read when present.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        Self::load_with(path, |key| std::env::var(key).ok())
    }

    pub fn load_with<F>(path: Option<&Path>, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut settings = match config_path(path) {
            Some(path) => {
                let content = std::fs::read_to_string(&path)
                    .with_context(|| format!("Failed to read config file {}", path.display()))?;
                Self::from_toml(&content)
                    .with_context(|| format!("Invalid config file {}", path.display()))?
            }
            None => Self::default(),
        };

        settings.apply_env(lookup)?;
        Ok(settings)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(url) = get("DATABASE_URL") {
            self.database.url = url;
        }
        if let Some(url) = get("QUEUE_DATABASE_URL") {
            self.database.queue_url = Some(url);
        }
        if let Some(host) = get("HOST") {
            self.server.host = host;
        }
        if let Some(port) = get("PORT") {
            self.server.port = parse_var("PORT", &port)?;
        }
        if let Some(concurrency) = get("WORKER_CONCURRENCY") {
            self.worker.concurrency = parse_var("WORKER_CONCURRENCY", &concurrency)?;
        }
        if let Some(attempts) = get("WORKFLOW_RETRY_ATTEMPTS") {
            self.worker.retry_attempts = parse_var("WORKFLOW_RETRY_ATTEMPTS", &attempts)?;
        }
        if let Some(delay) = get("WORKFLOW_RETRY_DELAY") {
            self.worker.retry_delay_ms = parse_var("WORKFLOW_RETRY_DELAY", &delay)?;
        }
        if let Some(key) = get("OPENAI_API_KEY") {
            self.llm.api_key = Some(key);
        }
        if let Some(url) = get("OPENAI_BASE_URL") {
            self.llm.base_url = Some(url);
        }
        if let Some(model) = get("LLM_MODEL") {
            self.llm.model = Some(model);
        }
        if let Some(timeout) = get("LLM_TIMEOUT_SECS") {
            self.llm.timeout_secs = Some(parse_var("LLM_TIMEOUT_SECS", &timeout)?);
        }
        if let Some(level) = get("LOG_LEVEL") {
            self.log_level = level;
        }

        Ok(())
    }

    pub fn with_port(mut self, port: Option<u16>) -> Self {
        if let Some(port) = port {
            self.server.port = port;
        }
        self
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    pub fn job_options(&self) -> JobOptions {
        JobOptions::default()
            .with_attempts(self.worker.retry_attempts)
            .with_backoff(Backoff::exponential(self.worker.retry_delay_ms))
    }

    pub fn engine_config(&self) -> EngineConfig {
        let llm = self.llm.api_key.as_ref().map(|key| {
            let mut config = ChatClientConfig::new(key.clone());
            if let Some(base_url) = &self.llm.base_url {
                config = config.with_base_url(base_url.clone());
            }
            if let Some(model) = &self.llm.model {
                config = config.with_model(model.clone());
            }
            if let Some(secs) = self.llm.timeout_secs {
                config = config.with_timeout(Duration::from_secs(secs));
            }
            config
        });

        EngineConfig {
            database_url: self.database.url.clone(),
            queue_database_url: self.database.queue_url.clone(),
            job_options: self.job_options(),
            llm,
        }
    }

    pub fn worker_config(&self) -> WorkerConfig {
        WorkerConfig::default().with_concurrency(self.worker.concurrency)
    }
}

fn config_path(explicit: Option<&Path>) -> Option<PathBuf> {
    match explicit {
        Some(path) => Some(path.to_path_buf()),
        None => {
            let default = PathBuf::from(DEFAULT_CONFIG_FILE);
            default.exists().then_some(default)
        }
    }
}

fn parse_var<T: FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| anyhow!("Invalid value for {}: {:?}", key, value))
}
