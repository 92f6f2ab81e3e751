use std::fs;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_ENV_PREFIX: &str = "INKMILL_";
pub const DEFAULT_WORKSPACE: &str = "./millspace";
pub const DEFAULT_ENGINE_BINARY: &str = "inkscape";
const DEFAULT_MAX_FILE_SIZE: u64 = 50 * 1024 * 1024;
const DEFAULT_TIMEOUT_S: u64 = 60;
const DEFAULT_MAX_CONCURRENT: usize = 4;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value for {name}: `{value}`")]
    InvalidValue { name: String, value: String },
    #[error("failed to create workspace {path}: {source}")]
    CreateWorkspace {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to resolve workspace {path}: {source}")]
    ResolveWorkspace {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Process-wide configuration for the safety core. The workspace directory is
/// created if absent and canonicalized once at construction; it is immutable
/// for the process lifetime.
#[derive(Debug, Clone)]
pub struct MillConfig {
    pub workspace: PathBuf,
    pub max_file_size: u64,
    pub timeout_default: Duration,
    pub max_concurrent: usize,
    pub engine_binary: String,
}

impl MillConfig {
    pub fn new(workspace: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        Self::build(
            workspace.into(),
            DEFAULT_MAX_FILE_SIZE,
            DEFAULT_TIMEOUT_S,
            DEFAULT_MAX_CONCURRENT,
            DEFAULT_ENGINE_BINARY.to_string(),
        )
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_env_prefix(DEFAULT_ENV_PREFIX)
    }

    pub fn from_env_prefix(prefix: &str) -> Result<Self, ConfigError> {
        let workspace =
            env_string(prefix, "WORKSPACE").unwrap_or_else(|| DEFAULT_WORKSPACE.to_string());
        let max_file_size = env_parsed(prefix, "MAX_FILE", DEFAULT_MAX_FILE_SIZE)?;
        let timeout_s = env_parsed(prefix, "TIMEOUT", DEFAULT_TIMEOUT_S)?;
        let max_concurrent = env_parsed(prefix, "MAX_CONC", DEFAULT_MAX_CONCURRENT)?;
        let engine_binary =
            env_string(prefix, "ENGINE").unwrap_or_else(|| DEFAULT_ENGINE_BINARY.to_string());
        Self::build(
            PathBuf::from(workspace),
            max_file_size,
            timeout_s,
            max_concurrent,
            engine_binary,
        )
    }

    fn build(
        workspace: PathBuf,
        max_file_size: u64,
        timeout_s: u64,
        max_concurrent: usize,
        engine_binary: String,
    ) -> Result<Self, ConfigError> {
        if max_file_size == 0 {
            return Err(invalid("max_file_size", "0"));
        }
        if timeout_s == 0 {
            return Err(invalid("timeout_default", "0"));
        }
        if max_concurrent == 0 {
            return Err(invalid("max_concurrent", "0"));
        }
        if engine_binary.trim().is_empty() {
            return Err(invalid("engine_binary", &engine_binary));
        }

        fs::create_dir_all(&workspace).map_err(|source| ConfigError::CreateWorkspace {
            path: workspace.display().to_string(),
            source,
        })?;
        let workspace =
            fs::canonicalize(&workspace).map_err(|source| ConfigError::ResolveWorkspace {
                path: workspace.display().to_string(),
                source,
            })?;

        Ok(Self {
            workspace,
            max_file_size,
            timeout_default: Duration::from_secs(timeout_s),
            max_concurrent,
            engine_binary,
        })
    }

    pub fn with_engine_binary(mut self, binary: impl Into<String>) -> Self {
        self.engine_binary = binary.into();
        self
    }

    pub fn with_max_file_size(mut self, bytes: u64) -> Self {
        self.max_file_size = bytes;
        self
    }

    pub fn with_timeout_default(mut self, timeout: Duration) -> Self {
        self.timeout_default = timeout;
        self
    }

    pub fn with_max_concurrent(mut self, slots: usize) -> Self {
        self.max_concurrent = slots;
        self
    }
}

fn env_string(prefix: &str, name: &str) -> Option<String> {
    std::env::var(format!("{prefix}{name}"))
        .ok()
        .filter(|value| !value.trim().is_empty())
}

fn env_parsed<T: std::str::FromStr>(
    prefix: &str,
    name: &str,
    default: T,
) -> Result<T, ConfigError> {
    match env_string(prefix, name) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|_| ConfigError::InvalidValue {
                name: format!("{prefix}{name}"),
                value: raw,
            }),
        None => Ok(default),
    }
}

fn invalid(name: &str, value: &str) -> ConfigError {
    ConfigError::InvalidValue {
        name: name.to_string(),
        value: value.to_string(),
    }
}
