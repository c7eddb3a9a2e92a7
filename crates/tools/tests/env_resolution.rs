//! End-to-end resolution of the configuration file through `load(None)`.
//!
//! These tests change the process environment and working directory, so
//! they run one at a time.

use contract_tools::config::CONFIG_ENV_VAR;
use contract_tools::{ConfigError, ToolchainConfig};
use serial_test::serial;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

fn fixture_text() -> String {
    let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("fixtures").join("toolchain.toml");
    fs::read_to_string(path).unwrap()
}

/// Run `f` with the working directory switched to `dir`.
fn in_dir<T>(dir: &Path, f: impl FnOnce() -> T) -> T {
    let previous = env::current_dir().unwrap();
    env::set_current_dir(dir).unwrap();
    let out = f();
    env::set_current_dir(previous).unwrap();
    out
}

#[test]
#[serial]
fn env_var_selects_the_config_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("custom.toml");
    fs::write(&path, fixture_text().replace("port = 7545", "port = 9545")).unwrap();

    env::set_var(CONFIG_ENV_VAR, &path);
    let result = ToolchainConfig::load(None);
    env::remove_var(CONFIG_ENV_VAR);

    let config = result.unwrap();
    assert_eq!(config.source(), Some(path.as_path()));
    assert_eq!(config.network("development").unwrap().port(), 9545);
}

#[test]
#[serial]
fn explicit_path_wins_over_env_var() {
    let dir = tempfile::tempdir().unwrap();
    let explicit = dir.path().join("explicit.toml");
    fs::write(&explicit, fixture_text()).unwrap();

    env::set_var(CONFIG_ENV_VAR, dir.path().join("absent.toml"));
    let result = ToolchainConfig::load(Some(explicit.as_path()));
    env::remove_var(CONFIG_ENV_VAR);

    assert_eq!(result.unwrap().source(), Some(explicit.as_path()));
}

#[test]
#[serial]
fn default_file_found_in_working_directory() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("toolchain.toml"), fixture_text()).unwrap();
    env::remove_var(CONFIG_ENV_VAR);

    let config = in_dir(dir.path(), || ToolchainConfig::load(None)).unwrap();
    assert_eq!(config.source(), Some(PathBuf::from("./toolchain.toml").as_path()));
    assert_eq!(config.network("development").unwrap().port(), 7545);
}

#[test]
#[serial]
fn nothing_to_load_is_not_found() {
    let dir = tempfile::tempdir().unwrap();
    env::remove_var(CONFIG_ENV_VAR);

    let err = in_dir(dir.path(), || ToolchainConfig::load(None)).unwrap_err();
    assert!(matches!(err, ConfigError::NotFound), "{err}");
    assert!(err.to_string().contains("CONTRACT_TOOLS_CONFIG"));
}
