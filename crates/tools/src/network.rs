//! Network profiles
//!
//! A network profile names one node the toolchain talks to: its address,
//! port and the network id it expects to find there.

use serde::{Serialize, Serializer};
use std::fmt;
use std::future::Future;
use std::io;
use std::net::{IpAddr, SocketAddr};
use std::time::{Duration, Instant};
use tokio::net::TcpStream;
use tracing::debug;

use crate::config::ConfigError;
use crate::document::Section;

/// Keys recognised inside a `networks.<name>` table
const PROFILE_KEYS: &[&str] = &[
    "host",
    "port",
    "network_id",
    "websockets",
    "gas",
    "gasPrice",
    "gas_price",
];

/// Accepted spellings of the gas price field, toolchain spelling first
const GAS_PRICE_KEYS: &[&str] = &["gasPrice", "gas_price"];

/// Network identifier filter
///
/// The id keeps the form it was written in, so a quoted `"5777"` and a bare
/// `5777` serialize back the way they were read.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum NetworkId {
    /// `"*"`: accept whatever network the node reports
    Any,
    /// A specific network id written as a decimal string
    Exact(String),
    /// A specific network id written as an integer
    Numeric(u64),
}

impl NetworkId {
    /// Wildcard literal
    pub const WILDCARD: &'static str = "*";

    /// Parse from its textual form
    pub fn parse(raw: &str) -> Option<Self> {
        if raw == Self::WILDCARD {
            return Some(NetworkId::Any);
        }
        if !raw.is_empty() && raw.bytes().all(|b| b.is_ascii_digit()) {
            return Some(NetworkId::Exact(raw.to_string()));
        }
        None
    }

    /// Whether a node reporting `id` is acceptable
    pub fn matches(&self, id: u64) -> bool {
        match self {
            NetworkId::Any => true,
            NetworkId::Exact(expected) => expected.parse::<u64>().map_or(false, |v| v == id),
            NetworkId::Numeric(expected) => *expected == id,
        }
    }

    fn from_section(section: &Section<'_>, key: &str) -> Result<Self, ConfigError> {
        let reason = "must be \"*\" or a non-negative integer network id";
        match section.required(key)? {
            serde_json::Value::String(raw) => {
                Self::parse(raw).ok_or_else(|| ConfigError::invalid(section.field_path(key), reason))
            }
            serde_json::Value::Number(n) => n
                .as_u64()
                .map(NetworkId::Numeric)
                .ok_or_else(|| ConfigError::invalid(section.field_path(key), reason)),
            _ => Err(ConfigError::invalid(section.field_path(key), reason)),
        }
    }
}

impl fmt::Display for NetworkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NetworkId::Any => f.write_str(Self::WILDCARD),
            NetworkId::Exact(id) => f.write_str(id),
            NetworkId::Numeric(id) => write!(f, "{}", id),
        }
    }
}

impl Serialize for NetworkId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            NetworkId::Any => serializer.serialize_str(Self::WILDCARD),
            NetworkId::Exact(id) => serializer.serialize_str(id),
            NetworkId::Numeric(id) => serializer.serialize_u64(*id),
        }
    }
}

fn is_false(value: &bool) -> bool {
    !*value
}

/// Connection parameters for one named deployment target
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NetworkProfile {
    host: String,
    port: u16,
    network_id: NetworkId,
    #[serde(skip_serializing_if = "is_false")]
    websockets: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    gas: Option<u64>,
    #[serde(rename = "gasPrice", skip_serializing_if = "Option::is_none")]
    gas_price: Option<u64>,
    #[serde(skip)]
    address: IpAddr,
}

impl NetworkProfile {
    /// Extract a profile from its `networks.<name>` table, appending the
    /// paths of unrecognised keys to `ignored`.
    pub(crate) fn from_section(
        section: &Section<'_>,
        ignored: &mut Vec<String>,
    ) -> Result<Self, ConfigError> {
        let host = section.required_non_empty("host")?;
        let address: IpAddr = host.parse().map_err(|_| {
            ConfigError::invalid(
                section.field_path("host"),
                format!("must be an IP address literal, found {host:?}"),
            )
        })?;

        let port = section.required_int::<u16>("port", 1, u16::MAX)?;
        let network_id = NetworkId::from_section(section, "network_id")?;
        let websockets = section.optional_bool("websockets")?.unwrap_or(false);
        let gas = section.optional_int::<u64>("gas", 1, u64::MAX)?;
        let gas_price = match section.alias(GAS_PRICE_KEYS)? {
            Some(key) => section.optional_int::<u64>(key, 0, u64::MAX)?,
            None => None,
        };

        ignored.extend(section.unknown_keys(PROFILE_KEYS));

        Ok(NetworkProfile {
            host: host.to_string(),
            port,
            network_id,
            websockets,
            gas,
            gas_price,
            address,
        })
    }

    /// Host exactly as written in the configuration
    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn network_id(&self) -> &NetworkId {
        &self.network_id
    }

    pub fn websockets(&self) -> bool {
        self.websockets
    }

    /// Gas limit override
    pub fn gas(&self) -> Option<u64> {
        self.gas
    }

    /// Gas price override, in wei
    pub fn gas_price(&self) -> Option<u64> {
        self.gas_price
    }

    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.address, self.port)
    }

    /// RPC endpoint URL for this profile
    pub fn endpoint(&self) -> String {
        let scheme = if self.websockets { "ws" } else { "http" };
        match self.address {
            IpAddr::V4(_) => format!("{}://{}:{}", scheme, self.host, self.port),
            IpAddr::V6(_) => format!("{}://[{}]:{}", scheme, self.host, self.port),
        }
    }

    /// Check whether something accepts TCP connections at the profile's
    /// address. No chain protocol is spoken.
    pub async fn probe(&self, timeout: Duration) -> ProbeOutcome {
        let addr = self.socket_addr();
        let outcome = classify_connect(timeout, TcpStream::connect(addr)).await;
        debug!(%addr, ?outcome, "probed network endpoint");
        outcome
    }
}

/// Run a connection attempt bounded by `timeout`.
async fn classify_connect<F, T>(timeout: Duration, connect: F) -> ProbeOutcome
where
    F: Future<Output = io::Result<T>>,
{
    let started = Instant::now();
    match tokio::time::timeout(timeout, connect).await {
        Ok(Ok(_connection)) => ProbeOutcome::Reachable {
            latency: started.elapsed(),
        },
        Ok(Err(err)) => ProbeOutcome::Unreachable {
            reason: err.to_string(),
        },
        Err(_) => ProbeOutcome::TimedOut { after: timeout },
    }
}

/// Result of [`NetworkProfile::probe`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    Reachable { latency: Duration },
    Unreachable { reason: String },
    TimedOut { after: Duration },
}

impl ProbeOutcome {
    pub fn is_reachable(&self) -> bool {
        matches!(self, ProbeOutcome::Reachable { .. })
    }
}

impl fmt::Display for ProbeOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProbeOutcome::Reachable { latency } => {
                write!(f, "reachable ({}ms)", latency.as_millis())
            }
            ProbeOutcome::Unreachable { reason } => write!(f, "unreachable: {}", reason),
            ProbeOutcome::TimedOut { after } => {
                write!(f, "timed out after {}ms", after.as_millis())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn profile(value: serde_json::Value) -> Result<NetworkProfile, ConfigError> {
        let doc = json!({ "networks": { "development": value } });
        let root = Section::root(&doc)?;
        let section = root.section("networks")?.section("development")?;
        NetworkProfile::from_section(&section, &mut Vec::new())
    }

    #[test]
    fn test_network_id_parse() {
        assert_eq!(NetworkId::parse("*"), Some(NetworkId::Any));
        assert_eq!(NetworkId::parse("5777"), Some(NetworkId::Exact("5777".to_string())));
        assert_eq!(NetworkId::parse(""), None);
        assert_eq!(NetworkId::parse("-1"), None);
        assert_eq!(NetworkId::parse("any"), None);
    }

    #[test]
    fn test_network_id_matches() {
        assert!(NetworkId::Any.matches(1));
        assert!(NetworkId::Any.matches(5777));
        let exact = NetworkId::Exact("5777".to_string());
        assert!(exact.matches(5777));
        assert!(!exact.matches(1));
        assert!(NetworkId::Numeric(5777).matches(5777));
        assert!(!NetworkId::Numeric(5777).matches(5778));
    }

    #[test]
    fn test_wildcard_kept_verbatim() {
        let p = profile(json!({ "host": "127.0.0.1", "port": 7545, "network_id": "*" })).unwrap();
        assert_eq!(p.network_id(), &NetworkId::Any);
        assert_eq!(p.network_id().to_string(), "*");
        assert_eq!(serde_json::to_value(p.network_id()).unwrap(), json!("*"));
    }

    #[test]
    fn test_integer_network_id() {
        let p = profile(json!({ "host": "127.0.0.1", "port": 8545, "network_id": 1337 })).unwrap();
        assert_eq!(p.network_id(), &NetworkId::Numeric(1337));
        assert_eq!(p.network_id().to_string(), "1337");
        assert_eq!(serde_json::to_value(p.network_id()).unwrap(), json!(1337));
        assert!(p.network_id().matches(1337));

        let p = profile(json!({ "host": "127.0.0.1", "port": 8545, "network_id": "1337" })).unwrap();
        assert_eq!(p.network_id(), &NetworkId::Exact("1337".to_string()));
        assert_eq!(serde_json::to_value(p.network_id()).unwrap(), json!("1337"));

        let err = profile(json!({ "host": "127.0.0.1", "port": 8545, "network_id": -3 })).unwrap_err();
        assert_eq!(err.field(), Some("networks.development.network_id"));
    }

    #[test]
    fn test_gas_price_toolchain_spelling() {
        let p = profile(json!({
            "host": "127.0.0.1", "port": 7545, "network_id": "*", "gasPrice": 1000000000u64
        }))
        .unwrap();
        assert_eq!(p.gas_price(), Some(1_000_000_000));

        let err = profile(json!({
            "host": "127.0.0.1", "port": 7545, "network_id": "*", "gasPrice": 1, "gas_price": 2
        }))
        .unwrap_err();
        assert_eq!(err.field(), Some("networks.development.gas_price"));

        let err = profile(json!({
            "host": "127.0.0.1", "port": 7545, "network_id": "*", "gasPrice": "fast"
        }))
        .unwrap_err();
        assert_eq!(err.field(), Some("networks.development.gasPrice"));
    }

    #[test]
    fn test_endpoint() {
        let p = profile(json!({ "host": "127.0.0.1", "port": 7545, "network_id": "*" })).unwrap();
        assert_eq!(p.endpoint(), "http://127.0.0.1:7545");

        let p = profile(json!({ "host": "::1", "port": 8546, "network_id": "*", "websockets": true }))
            .unwrap();
        assert_eq!(p.endpoint(), "ws://[::1]:8546");
        assert_eq!(p.socket_addr(), "[::1]:8546".parse::<SocketAddr>().unwrap());
    }

    #[test]
    fn test_invalid_host() {
        let err = profile(json!({ "host": "localhost", "port": 7545, "network_id": "*" })).unwrap_err();
        assert_eq!(err.field(), Some("networks.development.host"));

        let err = profile(json!({ "host": "  ", "port": 7545, "network_id": "*" })).unwrap_err();
        assert!(err.to_string().contains("must not be empty"));
    }

    #[test]
    fn test_port_bounds() {
        for port in [json!(0), json!(-1), json!(70000), json!("7545")] {
            let err = profile(json!({ "host": "127.0.0.1", "port": port, "network_id": "*" }))
                .unwrap_err();
            assert_eq!(err.field(), Some("networks.development.port"));
        }
    }

    #[test]
    fn test_optional_gas_fields() {
        let p = profile(json!({
            "host": "127.0.0.1", "port": 7545, "network_id": "*",
            "gas": 6721975, "gas_price": 20000000000u64
        }))
        .unwrap();
        assert_eq!(p.gas(), Some(6_721_975));
        assert_eq!(p.gas_price(), Some(20_000_000_000));
        assert_eq!(serde_json::to_value(&p).unwrap()["gasPrice"], json!(20000000000u64));

        let err = profile(json!({ "host": "127.0.0.1", "port": 7545, "network_id": "*", "gas": 0 }))
            .unwrap_err();
        assert_eq!(err.field(), Some("networks.development.gas"));
    }

    #[tokio::test]
    async fn test_stalled_connect_times_out() {
        let after = Duration::from_millis(20);
        let outcome = classify_connect(after, std::future::pending::<io::Result<()>>()).await;
        assert_eq!(outcome, ProbeOutcome::TimedOut { after });
        assert!(!outcome.is_reachable());
        assert_eq!(outcome.to_string(), "timed out after 20ms");
    }

    #[tokio::test]
    async fn test_refused_connect_is_unreachable() {
        let refused = async { Err::<(), _>(io::Error::from(io::ErrorKind::ConnectionRefused)) };
        let outcome = classify_connect(Duration::from_secs(1), refused).await;
        assert!(matches!(outcome, ProbeOutcome::Unreachable { .. }));
        assert!(outcome.to_string().starts_with("unreachable: "));

        let outcome = classify_connect(Duration::from_secs(1), async { Ok::<_, io::Error>(()) }).await;
        assert!(outcome.is_reachable());
    }

    #[test]
    fn test_unknown_profile_keys_collected() {
        let doc = json!({ "networks": { "development": {
            "host": "127.0.0.1", "port": 7545, "network_id": "*", "from": "0xabc"
        } } });
        let root = Section::root(&doc).unwrap();
        let section = root.section("networks").unwrap().section("development").unwrap();
        let mut ignored = Vec::new();
        NetworkProfile::from_section(&section, &mut ignored).unwrap();
        assert_eq!(ignored, vec!["networks.development.from".to_string()]);
    }
}
