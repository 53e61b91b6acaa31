use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "ipscope")]
#[command(about = "Dual-stack IP lookup and network diagnostics")]
#[command(version)]
pub struct Cli {
    /// Print JSON envelopes instead of the human-readable output
    #[arg(long, global = true)]
    pub json: bool,

    /// History file location
    #[arg(long, global = true, env = "IPSCOPE_HISTORY_FILE")]
    pub history_file: Option<PathBuf>,

    /// Per-provider lookup timeout in seconds
    #[arg(long, global = true)]
    pub provider_timeout: Option<u64>,

    /// Log file location
    #[arg(long, global = true, env = "IPSCOPE_LOG_FILE")]
    pub log_file: Option<PathBuf>,

    /// Log filter directives, e.g. `debug` or `ipscope=trace`
    #[arg(long, global = true, env = "RUST_LOG")]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Look up and reconcile geolocation data for one address
    Lookup {
        /// IPv4 or IPv6 address
        ip: String,

        /// Version hint (ipv4 or ipv6), inferred from the address when omitted
        #[arg(long = "ip-version")]
        ip_version: Option<String>,

        /// Save the result to history
        #[arg(long)]
        save: bool,
    },

    /// Detect this host's public IPv4/IPv6 addresses, look them up and save to history
    Detect {
        /// Skip writing the history entry
        #[arg(long)]
        no_save: bool,
    },

    /// Show saved lookups, newest first
    History {
        /// Delete all saved entries instead
        #[arg(long)]
        clear: bool,
    },

    /// Check connectivity to the domestic and foreign ping targets
    Ping,

    /// Measure download speed and latency
    Speedtest {
        /// Server id (see `servers`)
        #[arg(short, long)]
        server: Option<String>,

        /// Display unit: mbps, mb/s or kbps
        #[arg(short, long, default_value = "mbps")]
        unit: String,
    },

    /// List speed-test servers
    Servers {
        /// Print the download URL for one server id instead (unknown ids fall back to the default)
        #[arg(long = "url-for", value_name = "ID")]
        url_for: Option<String>,
    },
}
