use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 8765;

/// Results per streamed chunk. Tuned to keep one response line well under
/// the message-size ceiling for (id, score) pairs.
const DEFAULT_CHUNK_SIZE: usize = 20_000;

/// Per-request client timeout in seconds
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 10;
/// How long the launcher waits for the daemon's init_completed signal.
/// Heavy loads are multi-minute; ten minutes is the documented ceiling.
const DEFAULT_INIT_TIMEOUT_SECS: u64 = 600;
/// Pause between init_completed and the daemon binding the service port
const DEFAULT_READY_GRACE_SECS: u64 = 5;
/// Timeout for embedding model download on first use
const DEFAULT_DOWNLOAD_TIMEOUT_SECS: u64 = 300;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Results per chunk when a response is streamed
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    #[serde(default = "default_init_timeout_secs")]
    pub init_timeout_secs: u64,

    #[serde(default = "default_ready_grace_secs")]
    pub ready_grace_secs: u64,

    #[serde(default = "default_download_timeout_secs")]
    pub download_timeout_secs: u64,

    #[serde(skip_serializing, skip_deserializing)]
    data_dir: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            chunk_size: DEFAULT_CHUNK_SIZE,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            init_timeout_secs: DEFAULT_INIT_TIMEOUT_SECS,
            ready_grace_secs: DEFAULT_READY_GRACE_SECS,
            download_timeout_secs: DEFAULT_DOWNLOAD_TIMEOUT_SECS,
            data_dir: PathBuf::new(),
        }
    }
}

fn default_host() -> String {
    DEFAULT_HOST.to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_chunk_size() -> usize {
    DEFAULT_CHUNK_SIZE
}

fn default_request_timeout_secs() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_SECS
}

fn default_init_timeout_secs() -> u64 {
    DEFAULT_INIT_TIMEOUT_SECS
}

fn default_ready_grace_secs() -> u64 {
    DEFAULT_READY_GRACE_SECS
}

fn default_download_timeout_secs() -> u64 {
    DEFAULT_DOWNLOAD_TIMEOUT_SECS
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("config is malformed: {0}")]
    Malformed(#[from] serde_yml::Error),

    #[error("invalid config: {0}")]
    Invalid(String),

    #[error("missing required metadata: {0}")]
    MissingMetadata(String),
}

impl Config {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.port == 0 {
            return Err(ConfigError::Invalid("port must be non-zero".into()));
        }
        if self.chunk_size == 0 {
            return Err(ConfigError::Invalid("chunk_size must be non-zero".into()));
        }
        if self.request_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "request_timeout_secs must be greater than 0".into(),
            ));
        }
        if self.init_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "init_timeout_secs must be greater than 0".into(),
            ));
        }
        Ok(())
    }

    /// Load config.yaml from the data directory, creating a default one
    /// on first run. Resaves when new fields gained defaults.
    pub fn load(data_dir: &Path) -> Result<Self, ConfigError> {
        std::fs::create_dir_all(data_dir)?;
        let path = data_dir.join("config.yaml");

        if !path.exists() {
            let config = Config {
                data_dir: data_dir.to_path_buf(),
                ..Default::default()
            };
            config.save()?;
            return Ok(config);
        }

        let config_str = std::fs::read_to_string(&path)?;
        let mut config: Self = serde_yml::from_str(&config_str)?;
        config.data_dir = data_dir.to_path_buf();
        config.validate()?;

        // resave in case config version needs an upgrade
        if config_str != serde_yml::to_string(&config)? {
            config.save()?;
        }

        Ok(config)
    }

    pub fn save(&self) -> Result<(), ConfigError> {
        let path = self.data_dir.join("config.yaml");
        let tmp = self.data_dir.join("config.yaml.tmp");
        std::fs::write(&tmp, serde_yml::to_string(self)?)?;
        std::fs::rename(&tmp, &path)?;
        Ok(())
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Path of the archive metadata file
    pub fn meta_path(&self) -> PathBuf {
        self.data_dir.join("meta.json")
    }

    /// Directory holding the per-space vector files
    pub fn vectors_dir(&self) -> PathBuf {
        self.data_dir.join("vectors")
    }

    /// Path of the optional tag sidecar
    pub fn tags_path(&self) -> PathBuf {
        self.data_dir.join("tags.jsonl")
    }

    /// Directory fastembed caches downloaded models in
    pub fn models_dir(&self) -> PathBuf {
        self.data_dir.join("models")
    }
}

/// Resolve the data directory: explicit flag, then SIFT_DATA, then ~/.sift
pub fn resolve_data_dir(flag: Option<PathBuf>) -> anyhow::Result<PathBuf> {
    if let Some(dir) = flag {
        return Ok(dir);
    }
    if let Ok(dir) = std::env::var("SIFT_DATA") {
        return Ok(PathBuf::from(dir));
    }
    let home = homedir::my_home()?
        .ok_or_else(|| anyhow::anyhow!("cannot determine home directory"))?;
    Ok(home.join(".sift"))
}

/// Archive metadata (meta.json). Produced by the offline vectorization
/// pipeline; consumed here read-only.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ArchiveMeta {
    /// Embedding model that produced the stored vectors
    #[serde(default)]
    pub model: String,

    /// Archive CSV path, relative to the data directory
    #[serde(default)]
    pub csv: String,
}

impl ArchiveMeta {
    /// Load meta.json. A missing file or an empty `model` field is a hard
    /// startup error: serving with unknown vector provenance would produce
    /// silently wrong rankings.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|err| {
            ConfigError::MissingMetadata(format!("cannot read {}: {err}", path.display()))
        })?;
        let meta: Self = serde_json::from_str(&raw).map_err(|err| {
            ConfigError::MissingMetadata(format!("cannot parse {}: {err}", path.display()))
        })?;

        if meta.model.is_empty() {
            return Err(ConfigError::MissingMetadata(format!(
                "{} has no \"model\" field",
                path.display()
            )));
        }
        if meta.csv.is_empty() {
            return Err(ConfigError::MissingMetadata(format!(
                "{} has no \"csv\" field",
                path.display()
            )));
        }

        Ok(meta)
    }
}
