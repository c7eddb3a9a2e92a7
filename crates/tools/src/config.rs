//! Contract toolchain configuration
//!
//! This module loads the configuration record that tells a contract
//! toolchain which node to talk to and how to invoke the compiler.
//! The file is located in priority order:
//!
//! 1. An explicit path (e.g. `--config`)
//! 2. The `CONTRACT_TOOLS_CONFIG` environment variable (a `.env` file is read first)
//! 3. `toolchain.toml`, then `toolchain.json`, in the working directory
//! 4. Error if none of these exist
//!
//! The loaded record is never mutated afterwards.
//!
//! # Examples
//!
//! ```rust,no_run
//! use contract_tools::config::ToolchainConfig;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ToolchainConfig::load(None)?;
//! if let Some((name, network)) = config.default_network() {
//!     println!("{name}: {}", network.endpoint());
//! }
//! println!("solc {}", config.compilers().solc().version());
//! # Ok(())
//! # }
//! ```

use serde::Serialize;
use std::collections::BTreeMap;
use std::env;
use std::ffi::OsString;
use std::fmt;
use std::fs;
use std::path::{Component, Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::compiler::CompilersConfig;
use crate::document::{self, Format, Section};
use crate::network::NetworkProfile;

/// Environment variable that overrides the config path
pub const CONFIG_ENV_VAR: &str = "CONTRACT_TOOLS_CONFIG";
/// Files searched in the working directory, in order
pub const DEFAULT_CONFIG_FILES: &[&str] = &["toolchain.toml", "toolchain.json"];
/// Profile returned by [`ToolchainConfig::default_network`] when present
pub const DEFAULT_NETWORK: &str = "development";
/// Maximum configuration file size in bytes
pub const MAX_CONFIG_FILE_SIZE: usize = 1024 * 1024;

const ROOT_KEYS: &[&str] = &[
    "networks",
    "contracts_directory",
    "contracts_build_directory",
    "compilers",
];

/// Configuration error types
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{format} parse error: {message}")]
    Parse { format: Format, message: String },

    #[error("Unsupported config format: {}. Must be .toml or .json", .0.display())]
    UnsupportedFormat(PathBuf),

    #[error("No config file given, CONTRACT_TOOLS_CONFIG not set, and no toolchain.toml or toolchain.json found")]
    NotFound,

    #[error("Config file is {size} bytes, limit is {limit}")]
    TooLarge { size: usize, limit: usize },

    #[error("invalid config field `{field}`: {reason}")]
    Invalid { field: String, reason: String },

    #[error("Unknown network: {0}")]
    UnknownNetwork(String),

    #[error("Serialization error: {0}")]
    Serialize(String),
}

impl ConfigError {
    pub(crate) fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        ConfigError::Invalid {
            field: field.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn missing(field: impl Into<String>) -> Self {
        Self::invalid(field, "missing required field")
    }

    /// Dotted path of the offending field, for validation failures
    pub fn field(&self) -> Option<&str> {
        match self {
            ConfigError::Invalid { field, .. } => Some(field),
            _ => None,
        }
    }
}

/// The loaded configuration record
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ToolchainConfig {
    contracts_directory: PathBuf,
    contracts_build_directory: PathBuf,
    networks: BTreeMap<String, NetworkProfile>,
    compilers: CompilersConfig,
    #[serde(skip)]
    source: Option<PathBuf>,
    #[serde(skip)]
    ignored_keys: Vec<String>,
}

impl ToolchainConfig {
    /// Load configuration from `path`, the environment, or the working directory
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if:
    /// - No config file can be located
    /// - The file cannot be read or parsed
    /// - Any field is missing or malformed
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        // Load .env file if it exists (non-fatal)
        if let Err(err) = dotenvy::dotenv() {
            if !err.not_found() {
                warn!(error = %err, "failed to read .env file");
            }
        }

        let resolved = resolve_path(path, env::var_os(CONFIG_ENV_VAR), Path::new("."))?;
        Self::load_file(&resolved)
    }

    /// Load configuration from a specific file. The format follows the extension.
    pub fn load_file(path: &Path) -> Result<Self, ConfigError> {
        let format = Format::from_path(path)
            .ok_or_else(|| ConfigError::UnsupportedFormat(path.to_path_buf()))?;

        let bytes = fs::read(path)?;
        if bytes.len() > MAX_CONFIG_FILE_SIZE {
            return Err(ConfigError::TooLarge {
                size: bytes.len(),
                limit: MAX_CONFIG_FILE_SIZE,
            });
        }
        let text = String::from_utf8(bytes).map_err(|_| ConfigError::Parse {
            format,
            message: "file is not valid UTF-8".to_string(),
        })?;

        let mut config = Self::parse(&text, format)?;
        config.source = Some(path.to_path_buf());
        info!(
            path = %path.display(),
            networks = config.networks.len(),
            solc = %config.compilers.solc().version(),
            "loaded toolchain configuration"
        );
        Ok(config)
    }

    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Self::parse(text, Format::Toml)
    }

    pub fn from_json_str(text: &str) -> Result<Self, ConfigError> {
        Self::parse(text, Format::Json)
    }

    /// Parse and validate an in-memory document
    pub fn parse(text: &str, format: Format) -> Result<Self, ConfigError> {
        let document = document::parse(text, format)?;
        let config = Self::from_document(&document)?;
        config.validate()?;
        for key in &config.ignored_keys {
            warn!(key = %key, "ignoring unrecognised configuration key");
        }
        Ok(config)
    }

    fn from_document(document: &serde_json::Value) -> Result<Self, ConfigError> {
        let root = Section::root(document)?;
        let mut ignored = root.unknown_keys(ROOT_KEYS);

        let contracts_directory = PathBuf::from(root.required_non_empty("contracts_directory")?);
        let contracts_build_directory =
            PathBuf::from(root.required_non_empty("contracts_build_directory")?);

        let mut networks = BTreeMap::new();
        for (name, section) in root.section("networks")?.sections()? {
            if name.trim().is_empty() {
                return Err(ConfigError::invalid(
                    section.path(),
                    "network name must not be empty",
                ));
            }
            let profile = NetworkProfile::from_section(&section, &mut ignored)?;
            debug!(network = name, endpoint = %profile.endpoint(), "parsed network profile");
            networks.insert(name.to_string(), profile);
        }

        let compilers = CompilersConfig::from_section(&root.section("compilers")?, &mut ignored)?;

        Ok(ToolchainConfig {
            contracts_directory,
            contracts_build_directory,
            networks,
            compilers,
            source: None,
            ignored_keys: ignored,
        })
    }

    /// Cross-field validation
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.networks.is_empty() {
            return Err(ConfigError::invalid(
                "networks",
                "must declare at least one network profile",
            ));
        }

        if normalized(&self.contracts_directory) == normalized(&self.contracts_build_directory) {
            return Err(ConfigError::invalid(
                "contracts_build_directory",
                "must differ from contracts_directory",
            ));
        }

        Ok(())
    }

    pub fn networks(&self) -> &BTreeMap<String, NetworkProfile> {
        &self.networks
    }

    pub fn network(&self, name: &str) -> Option<&NetworkProfile> {
        self.networks.get(name)
    }

    /// The `development` profile if declared, otherwise the first by name
    pub fn default_network(&self) -> Option<(&str, &NetworkProfile)> {
        self.networks
            .get_key_value(DEFAULT_NETWORK)
            .or_else(|| self.networks.iter().next())
            .map(|(name, profile)| (name.as_str(), profile))
    }

    /// Look up `name`, or fall back to [`Self::default_network`]
    pub fn select_network(&self, name: Option<&str>) -> Result<(&str, &NetworkProfile), ConfigError> {
        match name {
            Some(name) => self
                .networks
                .get_key_value(name)
                .map(|(name, profile)| (name.as_str(), profile))
                .ok_or_else(|| ConfigError::UnknownNetwork(name.to_string())),
            None => self
                .default_network()
                .ok_or_else(|| ConfigError::UnknownNetwork(DEFAULT_NETWORK.to_string())),
        }
    }

    /// Contracts directory as written in the configuration
    pub fn contracts_directory(&self) -> &Path {
        &self.contracts_directory
    }

    /// Build directory as written in the configuration
    pub fn contracts_build_directory(&self) -> &Path {
        &self.contracts_build_directory
    }

    /// Contracts directory resolved against the config file's directory
    pub fn contracts_dir(&self) -> PathBuf {
        self.resolve(&self.contracts_directory)
    }

    /// Build directory resolved against the config file's directory
    pub fn build_dir(&self) -> PathBuf {
        self.resolve(&self.contracts_build_directory)
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        match self.source.as_deref().and_then(Path::parent) {
            Some(base) if path.is_relative() => base.join(path),
            _ => path.to_path_buf(),
        }
    }

    pub fn compilers(&self) -> &CompilersConfig {
        &self.compilers
    }

    /// File the configuration was loaded from, if any
    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    /// Dotted paths of keys present in the input but not recognised
    pub fn ignored_keys(&self) -> &[String] {
        &self.ignored_keys
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|err| ConfigError::Serialize(err.to_string()))
    }

    pub fn to_json(&self) -> Result<String, ConfigError> {
        serde_json::to_string_pretty(self).map_err(|err| ConfigError::Serialize(err.to_string()))
    }
}

impl fmt::Display for ToolchainConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "╔════════════════════════════════════════════════════════════════╗")?;
        writeln!(f, "║         CONTRACT TOOLCHAIN CONFIGURATION RESOLVED              ║")?;
        writeln!(f, "╚════════════════════════════════════════════════════════════════╝")?;
        if let Some(source) = &self.source {
            writeln!(f, "  Source:              {}", source.display())?;
        }
        writeln!(f, "  Contracts:           {}", self.contracts_directory.display())?;
        writeln!(f, "  Build Output:        {}", self.contracts_build_directory.display())?;

        for (name, network) in &self.networks {
            writeln!(f, "  Network {name}:")?;
            writeln!(f, "    Endpoint:          {}", network.endpoint())?;
            writeln!(f, "    Network ID:        {}", network.network_id())?;
            if let Some(gas) = network.gas() {
                writeln!(f, "    Gas:               {gas}")?;
            }
            if let Some(price) = network.gas_price() {
                writeln!(f, "    Gas Price:         {price}")?;
            }
        }

        let solc = self.compilers.solc();
        writeln!(f, "  Solc Version:        {}", solc.version())?;
        if let Some(evm) = solc.evm_version() {
            writeln!(f, "  EVM Version:         {evm}")?;
        }
        let optimizer = solc.optimizer();
        if optimizer.enable {
            writeln!(f, "  Optimizer:           ENABLED ({} runs)", optimizer.runs)?;
        } else {
            writeln!(f, "  Optimizer:           disabled")?;
        }
        write!(f, "╚════════════════════════════════════════════════════════════════╝")
    }
}

/// Pick the config file: explicit path, then `env_value`, then the first
/// default file that exists under `base`.
fn resolve_path(
    explicit: Option<&Path>,
    env_value: Option<OsString>,
    base: &Path,
) -> Result<PathBuf, ConfigError> {
    if let Some(path) = explicit {
        return Ok(path.to_path_buf());
    }
    if let Some(value) = env_value.filter(|v| !v.is_empty()) {
        debug!(var = CONFIG_ENV_VAR, "config path taken from environment");
        return Ok(PathBuf::from(value));
    }
    DEFAULT_CONFIG_FILES
        .iter()
        .map(|name| base.join(name))
        .find(|candidate| candidate.is_file())
        .ok_or(ConfigError::NotFound)
}

/// Drop `.` components so `./build` and `build/` compare equal.
fn normalized(path: &Path) -> PathBuf {
    path.components()
        .filter(|component| !matches!(component, Component::CurDir))
        .collect()
}
