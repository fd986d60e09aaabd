/// ROS discovery proxy
///
/// Impersonates the ROS master towards nodes and rewrites every address
/// exchanged over the master and slave XML-RPC APIs so that all traffic,
/// TCPROS connections included, flows through this host.

use anyhow::Result;
use clap::Parser;
use rosproxy_common::{defaults, PortRange, ProxyConfig};
use rosproxy_daemon::RosProxy;
use std::path::PathBuf;
use tracing::{info, warn, Level};

#[derive(Parser, Debug)]
#[command(name = "rosproxy", version, about = "Transparent proxy for the ROS master and slave APIs")]
struct Cli {
    /// Port to listen on [default: port of the ROS master URI, else 11311]
    #[arg(value_name = "PORT")]
    port: Option<u16>,

    /// Port to listen on
    #[arg(short = 'p', long = "port", conflicts_with = "port")]
    port_flag: Option<u16>,

    /// URI of the real ROS master
    #[arg(short = 'm', long, env = "ROS_MASTER_URI")]
    ros_master_uri: Option<String>,

    /// Hostname advertised to nodes
    #[arg(short = 'n', long)]
    hostname: Option<String>,

    /// Port range for TCPROS proxies, as MIN-MAX, MIN,MAX or MIN:MAX
    #[arg(short = 'r', long)]
    port_range: Option<PortRange>,

    /// Only log errors
    #[arg(short, long, conflicts_with = "debug")]
    quiet: bool,

    /// Log debug output
    #[arg(short, long)]
    debug: bool,

    /// TOML configuration file
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Do not drop stale and dead nodes
    #[arg(long)]
    no_housekeeping: bool,

    /// Housekeeping period in milliseconds
    #[arg(long, value_name = "MS")]
    housekeeping_period: Option<u64>,
}

impl Cli {
    fn log_level(&self) -> Level {
        if self.quiet {
            Level::ERROR
        } else if self.debug {
            Level::DEBUG
        } else {
            Level::INFO
        }
    }

    /// Merge CLI and environment over the config file and defaults
    fn into_config(self) -> Result<ProxyConfig> {
        let mut config = match &self.config {
            Some(path) => {
                info!("Loading configuration from {:?}", path);
                ProxyConfig::from_file(path)?
            }
            None => ProxyConfig::default(),
        };

        if let Some(uri) = self.ros_master_uri {
            config.master_uri = Some(uri);
        }

        if let Some(hostname) = self.hostname.or_else(hostname_from_env) {
            config.hostname = hostname;
        } else if self.config.is_none() {
            warn!("No hostname set, advertising {}", config.hostname);
        }

        // The proxy stands in for the master, so it defaults to the master's port
        config.port = match self.port.or(self.port_flag) {
            Some(port) => port,
            None if self.config.is_some() => config.port,
            None => config.master_port().unwrap_or(defaults::PROXY_PORT),
        };

        if let Some(range) = self.port_range {
            config.port_range = Some(range);
        }
        if self.no_housekeeping {
            config.housekeeping = false;
        }
        if let Some(period) = self.housekeeping_period {
            config.housekeeping_period_ms = period;
        }

        Ok(config)
    }
}

fn hostname_from_env() -> Option<String> {
    ["ROS_HOSTNAME", "ROS_IP", "HOSTNAME"]
        .iter()
        .find_map(|var| std::env::var(var).ok().filter(|v| !v.trim().is_empty()))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_max_level(cli.log_level())
        .init();

    info!("Starting rosproxy v{}", env!("CARGO_PKG_VERSION"));

    let config = cli.into_config()?;
    let proxy = RosProxy::new(config)?;

    proxy
        .run(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("Failed to listen for shutdown signal: {}", e);
                std::future::pending::<()>().await;
            }
            info!("Shutdown signal received");
        })
        .await?;

    info!("rosproxy stopped");
    Ok(())
}
