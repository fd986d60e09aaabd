use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Protocol and runtime defaults
pub mod defaults {
    /// Port the proxy listens on when neither the CLI nor the master URI names one
    pub const PROXY_PORT: u16 = 11311;

    /// Address the XML-RPC front end and rendezvous proxies bind to
    pub const LISTEN_ADDR: &str = "0.0.0.0";

    /// Route prefix impersonating the ROS master
    pub const MASTER_API_PATH: &str = "/master";

    /// Route prefix under which every node's slave API is exposed
    pub const NODE_API_PATH: &str = "/node";

    /// Route answering with the "could not resolve" fault
    pub const FAILURE_PATH: &str = "/fault";

    /// Housekeeping interval
    pub const HOUSEKEEPING_PERIOD_MS: u64 = 5000;

    /// Per-attempt timeout of a liveness probe
    pub const PROBE_TIMEOUT_MS: u64 = 1000;

    /// Attempts per liveness probe before a node counts as unreachable
    pub const PROBE_ATTEMPTS: u32 = 3;

    /// XML-RPC application error fault code
    pub const APPLICATION_ERROR: i32 = -32500;

    /// The only streaming transport the proxy can interpose on
    pub const TCPROS: &str = "TCPROS";
}

/// Inclusive range of ports rendezvous proxies may bind to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortRange {
    pub min: u16,
    pub max: u16,
}

impl PortRange {
    pub fn new(min: u16, max: u16) -> Result<Self, ConfigError> {
        if min == 0 || min > max {
            return Err(ConfigError::InvalidPortRange(format!("{}-{}", min, max)));
        }
        Ok(Self { min, max })
    }

    pub fn contains(&self, port: u16) -> bool {
        (self.min..=self.max).contains(&port)
    }

    /// Number of ports in the range
    #[allow(clippy::len_without_is_empty)]
    pub fn len(&self) -> usize {
        usize::from(self.max - self.min) + 1
    }
}

impl fmt::Display for PortRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.min, self.max)
    }
}

/// Accepts `min-max`, `min,max` and `min:max`
impl FromStr for PortRange {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ConfigError::InvalidPortRange(s.to_string());
        let (min, max) = [',', '-', ':']
            .iter()
            .find_map(|sep| s.split_once(*sep))
            .ok_or_else(invalid)?;
        let min = min.trim().parse().map_err(|_| invalid())?;
        let max = max.trim().parse().map_err(|_| invalid())?;
        Self::new(min, max)
    }
}

/// Proxy configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProxyConfig {
    /// URI of the real ROS master (`http://host:port/`)
    pub master_uri: Option<String>,

    /// Hostname advertised to nodes in rewritten addresses
    pub hostname: String,

    /// Listen address
    pub listen_addr: String,

    /// Port of the XML-RPC front end
    pub port: u16,

    /// Route prefix for master API calls
    pub master_api_path: String,

    /// Route prefix for node API calls
    pub node_api_path: String,

    /// Route answering with the failure fault
    pub failure_path: String,

    /// Ports rendezvous proxies may use; any free port when unset
    pub port_range: Option<PortRange>,

    /// Whether stale and dead nodes are dropped periodically
    pub housekeeping: bool,

    /// Housekeeping interval in milliseconds
    pub housekeeping_period_ms: u64,

    /// Per-attempt liveness probe timeout in milliseconds
    pub probe_timeout_ms: u64,

    /// Liveness probe attempts
    pub probe_attempts: u32,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            master_uri: None,
            hostname: "localhost".to_string(),
            listen_addr: defaults::LISTEN_ADDR.to_string(),
            port: defaults::PROXY_PORT,
            master_api_path: defaults::MASTER_API_PATH.to_string(),
            node_api_path: defaults::NODE_API_PATH.to_string(),
            failure_path: defaults::FAILURE_PATH.to_string(),
            port_range: None,
            housekeeping: true,
            housekeeping_period_ms: defaults::HOUSEKEEPING_PERIOD_MS,
            probe_timeout_ms: defaults::PROBE_TIMEOUT_MS,
            probe_attempts: defaults::PROBE_ATTEMPTS,
        }
    }
}

impl ProxyConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_master_uri(mut self, uri: impl Into<String>) -> Self {
        self.master_uri = Some(uri.into());
        self
    }

    pub fn with_hostname(mut self, hostname: impl Into<String>) -> Self {
        self.hostname = hostname.into();
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_port_range(mut self, range: PortRange) -> Self {
        self.port_range = Some(range);
        self
    }

    pub fn with_housekeeping(mut self, enabled: bool) -> Self {
        self.housekeeping = enabled;
        self
    }

    pub fn with_housekeeping_period_ms(mut self, period_ms: u64) -> Self {
        self.housekeeping_period_ms = period_ms;
        self
    }

    pub fn housekeeping_period(&self) -> Duration {
        Duration::from_millis(self.housekeeping_period_ms)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    /// Master URI; configuration without one cannot run
    pub fn master_uri(&self) -> Result<&str, ConfigError> {
        self.master_uri
            .as_deref()
            .filter(|uri| !uri.trim().is_empty())
            .ok_or(ConfigError::MissingMasterUri)
    }

    /// Port embedded in the master URI, if any
    pub fn master_port(&self) -> Option<u16> {
        let uri = self.master_uri.as_deref()?;
        let authority = uri.split("://").nth(1).unwrap_or(uri);
        let authority = authority.split('/').next()?;
        authority.rsplit_once(':')?.1.parse().ok()
    }

    /// Check the configuration and normalize route prefixes
    pub fn validate(mut self) -> Result<Self, ConfigError> {
        let uri = self.master_uri()?;
        if !(uri.starts_with("http://") || uri.starts_with("https://")) {
            return Err(ConfigError::InvalidMasterUri(uri.to_string()));
        }
        if self.hostname.trim().is_empty() {
            return Err(ConfigError::MissingHostname);
        }
        if let Some(range) = self.port_range {
            PortRange::new(range.min, range.max)?;
        }

        self.master_api_path = normalize_base_path(&self.master_api_path);
        self.node_api_path = normalize_base_path(&self.node_api_path);
        self.failure_path = normalize_base_path(&self.failure_path);
        if self.node_api_path == "/" {
            return Err(ConfigError::InvalidPath(self.node_api_path));
        }
        Ok(self)
    }

    /// Load configuration from a TOML file
    pub fn from_file(path: &PathBuf) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::ReadError(e.to_string()))?;

        toml::from_str(&contents).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// Save configuration to a TOML file
    pub fn to_file(&self, path: &PathBuf) -> Result<(), ConfigError> {
        let contents = toml::to_string_pretty(self)
            .map_err(|e| ConfigError::SerializeError(e.to_string()))?;

        std::fs::write(path, contents).map_err(|e| ConfigError::WriteError(e.to_string()))?;

        Ok(())
    }
}

/// `"node/"`, `"/node"` and `"//node//"` all become `"/node"`
pub fn normalize_base_path(path: &str) -> String {
    format!("/{}", path.trim_matches('/'))
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("ROS master URI not set and not present in environment")]
    MissingMasterUri,

    #[error("Invalid ROS master URI: {0}")]
    InvalidMasterUri(String),

    #[error("No hostname set")]
    MissingHostname,

    #[error("Invalid port range: {0}")]
    InvalidPortRange(String),

    #[error("Invalid route path: {0}")]
    InvalidPath(String),

    #[error("Failed to read config file: {0}")]
    ReadError(String),

    #[error("Failed to parse config: {0}")]
    ParseError(String),

    #[error("Failed to serialize config: {0}")]
    SerializeError(String),

    #[error("Failed to write config file: {0}")]
    WriteError(String),
}
