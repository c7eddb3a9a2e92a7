//! Contract Tools Library
//!
//! Loads and validates the network and compiler configuration consumed by a
//! contract development toolchain.

pub mod compiler;
pub mod config;
pub mod document;
pub mod logging;
pub mod network;

pub use compiler::{CompilersConfig, EvmVersion, OptimizerConfig, SolcConfig, SolcVersion};
pub use config::{ConfigError, ToolchainConfig};
pub use document::Format;
pub use network::{NetworkId, NetworkProfile, ProbeOutcome};
