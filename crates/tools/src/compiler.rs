//! Compiler settings
//!
//! Only `solc` is modelled. Other entries under `compilers` are reported as
//! ignored keys and otherwise left to the external toolchain.

use semver::{Version, VersionReq};
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use serde_json::json;
use std::fmt;

use crate::config::ConfigError;
use crate::document::Section;

/// Optimizer run count used by `solc` when none is configured
pub const DEFAULT_OPTIMIZER_RUNS: u32 = 200;

const COMPILERS_KEYS: &[&str] = &["solc"];
const SOLC_KEYS: &[&str] = &["version", "optimizer", "settings"];
const SETTINGS_KEYS: &[&str] = &["optimizer", "evmVersion"];
const OPTIMIZER_KEYS: &[&str] = &["enable", "enabled", "runs"];

/// Accepted spellings of the optimizer switch
const ENABLE_KEYS: &[&str] = &["enable", "enabled"];

/// The `compilers` table
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompilersConfig {
    solc: SolcConfig,
}

impl CompilersConfig {
    pub(crate) fn from_section(
        section: &Section<'_>,
        ignored: &mut Vec<String>,
    ) -> Result<Self, ConfigError> {
        let solc = SolcConfig::from_section(&section.section("solc")?, ignored)?;
        ignored.extend(section.unknown_keys(COMPILERS_KEYS));
        Ok(CompilersConfig { solc })
    }

    pub fn solc(&self) -> &SolcConfig {
        &self.solc
    }
}

/// `compilers.solc`
///
/// The optimizer may be given either directly as `compilers.solc.optimizer`
/// or in standard-json form as `compilers.solc.settings.optimizer`. The EVM
/// target lives at `compilers.solc.settings.evmVersion`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SolcConfig {
    version: SolcVersion,
    optimizer: OptimizerConfig,
    #[serde(
        rename = "settings",
        skip_serializing_if = "Option::is_none",
        serialize_with = "serialize_settings"
    )]
    evm_version: Option<EvmVersion>,
}

fn serialize_settings<S>(evm_version: &Option<EvmVersion>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    let mut settings = serializer.serialize_map(None)?;
    if let Some(evm) = evm_version {
        settings.serialize_entry("evmVersion", evm)?;
    }
    settings.end()
}

impl SolcConfig {
    fn from_section(section: &Section<'_>, ignored: &mut Vec<String>) -> Result<Self, ConfigError> {
        let raw_version = section.required_non_empty("version")?;
        let version = SolcVersion::parse(raw_version).map_err(|err| {
            ConfigError::invalid(
                section.field_path("version"),
                format!("invalid version range {raw_version:?}: {err}"),
            )
        })?;

        let settings = section.optional_section("settings")?;
        let nested = match &settings {
            Some(settings) => settings.optional_section("optimizer")?,
            None => None,
        };
        let optimizer = match (section.optional_section("optimizer")?, nested) {
            (Some(direct), Some(nested)) => {
                return Err(ConfigError::invalid(
                    nested.path(),
                    format!("conflicts with `{}`", direct.path()),
                ))
            }
            (Some(optimizer), None) | (None, Some(optimizer)) => {
                OptimizerConfig::from_section(&optimizer, ignored)?
            }
            (None, None) => OptimizerConfig::default(),
        };

        let mut evm_version = None;
        if let Some(settings) = &settings {
            if let Some(name) = settings.optional_str("evmVersion")? {
                evm_version = Some(EvmVersion::parse(name).ok_or_else(|| {
                    ConfigError::invalid(
                        settings.field_path("evmVersion"),
                        format!("unknown EVM version {name:?}"),
                    )
                })?);
            }
            ignored.extend(settings.unknown_keys(SETTINGS_KEYS));
        }

        ignored.extend(section.unknown_keys(SOLC_KEYS));

        Ok(SolcConfig {
            version,
            optimizer,
            evm_version,
        })
    }

    pub fn version(&self) -> &SolcVersion {
        &self.version
    }

    pub fn optimizer(&self) -> OptimizerConfig {
        self.optimizer
    }

    pub fn evm_version(&self) -> Option<EvmVersion> {
        self.evm_version
    }

    /// The `settings` object of a `solc --standard-json` input carrying the
    /// configured optimizer and EVM target.
    pub fn standard_json_settings(&self) -> serde_json::Value {
        let mut settings = json!({
            "optimizer": {
                "enabled": self.optimizer.enable,
                "runs": self.optimizer.runs,
            }
        });
        if let (Some(evm), Some(map)) = (self.evm_version, settings.as_object_mut()) {
            map.insert("evmVersion".to_string(), json!(evm.as_str()));
        }
        settings
    }
}

/// `compilers.solc.optimizer`; the switch may also be spelled `enabled`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct OptimizerConfig {
    pub enable: bool,
    pub runs: u32,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            enable: false,
            runs: DEFAULT_OPTIMIZER_RUNS,
        }
    }
}

impl OptimizerConfig {
    fn from_section(section: &Section<'_>, ignored: &mut Vec<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let enable = match section.alias(ENABLE_KEYS)? {
            Some(key) => section.optional_bool(key)?.unwrap_or(defaults.enable),
            None => defaults.enable,
        };
        let runs = section
            .optional_int::<u32>("runs", 0, u32::MAX)?
            .unwrap_or(defaults.runs);
        ignored.extend(section.unknown_keys(OPTIMIZER_KEYS));
        Ok(OptimizerConfig { enable, runs })
    }
}

/// A `solc` version constraint.
///
/// The text is kept exactly as configured. Parsing follows npm conventions:
///
/// - comparators may be separated by whitespace or commas
/// - a bare version such as `0.8.11` pins that exact release
/// - `A - B` is the inclusive range `>=A, <=B`
/// - `||` joins alternatives, any of which may match
/// - a `v` before a version number is dropped (`v0.8.11`)
///
/// The toolchain's non-semver values (`native`, `pragma`, file paths) are
/// rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SolcVersion {
    raw: String,
    alternatives: Vec<VersionReq>,
}

impl SolcVersion {
    pub fn parse(raw: &str) -> Result<Self, semver::Error> {
        let alternatives = raw
            .split("||")
            .map(|alternative| VersionReq::parse(&normalize_requirement(alternative)))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(SolcVersion {
            raw: raw.to_string(),
            alternatives,
        })
    }

    /// Constraint text as configured
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// The `||` alternatives, in order
    pub fn requirements(&self) -> &[VersionReq] {
        &self.alternatives
    }

    pub fn matches(&self, version: &Version) -> bool {
        self.alternatives.iter().any(|requirement| requirement.matches(version))
    }
}

impl fmt::Display for SolcVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.raw)
    }
}

impl Serialize for SolcVersion {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.raw)
    }
}

/// Rewrite one npm-style range alternative into the comma-separated form
/// `semver` parses. An empty alternative matches anything.
fn normalize_requirement(raw: &str) -> String {
    let tokens: Vec<&str> = raw
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|t| !t.is_empty())
        .collect();
    match tokens.as_slice() {
        [] => return "*".to_string(),
        [low, "-", high] => return format!(">={}, <={}", strip_v(low), strip_v(high)),
        _ => {}
    }

    let mut comparators: Vec<String> = Vec::new();
    let mut operator = String::new();
    for token in tokens {
        let split = token
            .find(|c: char| !matches!(c, '<' | '>' | '=' | '^' | '~'))
            .unwrap_or(token.len());
        let (op, version) = token.split_at(split);
        operator.push_str(op);
        if version.is_empty() {
            continue;
        }
        let version = strip_v(version);
        if operator.is_empty() && version.starts_with(|c: char| c.is_ascii_digit()) {
            operator.push('=');
        }
        comparators.push(format!("{operator}{version}"));
        operator.clear();
    }
    // A dangling operator is left for the parser to reject.
    if !operator.is_empty() {
        comparators.push(operator);
    }
    comparators.join(", ")
}

fn strip_v(version: &str) -> &str {
    match version.strip_prefix('v') {
        Some(rest) if rest.starts_with(|c: char| c.is_ascii_digit()) => rest,
        _ => version,
    }
}

/// EVM hard forks `solc` can target
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum EvmVersion {
    Homestead,
    TangerineWhistle,
    SpuriousDragon,
    Byzantium,
    Constantinople,
    Petersburg,
    Istanbul,
    Berlin,
    London,
    Paris,
    Shanghai,
    Cancun,
}

impl EvmVersion {
    /// Parse from the name `solc` uses (`evmVersion` in standard JSON)
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "homestead" => Some(EvmVersion::Homestead),
            "tangerineWhistle" => Some(EvmVersion::TangerineWhistle),
            "spuriousDragon" => Some(EvmVersion::SpuriousDragon),
            "byzantium" => Some(EvmVersion::Byzantium),
            "constantinople" => Some(EvmVersion::Constantinople),
            "petersburg" => Some(EvmVersion::Petersburg),
            "istanbul" => Some(EvmVersion::Istanbul),
            "berlin" => Some(EvmVersion::Berlin),
            "london" => Some(EvmVersion::London),
            "paris" => Some(EvmVersion::Paris),
            "shanghai" => Some(EvmVersion::Shanghai),
            "cancun" => Some(EvmVersion::Cancun),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EvmVersion::Homestead => "homestead",
            EvmVersion::TangerineWhistle => "tangerineWhistle",
            EvmVersion::SpuriousDragon => "spuriousDragon",
            EvmVersion::Byzantium => "byzantium",
            EvmVersion::Constantinople => "constantinople",
            EvmVersion::Petersburg => "petersburg",
            EvmVersion::Istanbul => "istanbul",
            EvmVersion::Berlin => "berlin",
            EvmVersion::London => "london",
            EvmVersion::Paris => "paris",
            EvmVersion::Shanghai => "shanghai",
            EvmVersion::Cancun => "cancun",
        }
    }
}

impl fmt::Display for EvmVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl Serialize for EvmVersion {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}
