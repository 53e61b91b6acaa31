use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_PROVIDER_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_DOWNLOAD_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_LATENCY_TIMEOUT_SECS: u64 = 3;
pub const DEFAULT_PROBE_GAP_MS: u64 = 500;
pub const DEFAULT_DETECTION_TIMEOUT_SECS: u64 = 10;
pub const USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

/// Runtime knobs shared by the lookup, history and measurement flows.
#[derive(Debug, Clone)]
pub struct Settings {
    pub provider_timeout: Duration,
    pub download_timeout: Duration,
    pub latency_timeout: Duration,
    pub probe_gap: Duration,
    pub detection_timeout: Duration,
    pub user_agent: String,
    pub history_file: PathBuf,
    pub log_file: PathBuf,
    /// `RUST_LOG`-style directives; `None` uses the logging defaults
    pub log_filters: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            provider_timeout: Duration::from_secs(DEFAULT_PROVIDER_TIMEOUT_SECS),
            download_timeout: Duration::from_secs(DEFAULT_DOWNLOAD_TIMEOUT_SECS),
            latency_timeout: Duration::from_secs(DEFAULT_LATENCY_TIMEOUT_SECS),
            probe_gap: Duration::from_millis(DEFAULT_PROBE_GAP_MS),
            detection_timeout: Duration::from_secs(DEFAULT_DETECTION_TIMEOUT_SECS),
            user_agent: USER_AGENT.to_string(),
            history_file: default_history_path(),
            log_file: default_log_path(),
            log_filters: None,
        }
    }
}

impl Settings {
    pub fn with_history_file(mut self, path: Option<PathBuf>) -> Self {
        if let Some(path) = path {
            self.history_file = path;
        }
        self
    }

    pub fn with_provider_timeout(mut self, secs: Option<u64>) -> Self {
        if let Some(secs) = secs {
            self.provider_timeout = Duration::from_secs(secs);
        }
        self
    }

    pub fn with_log_file(mut self, path: Option<PathBuf>) -> Self {
        if let Some(path) = path {
            self.log_file = path;
        }
        self
    }

    pub fn with_log_filters(mut self, filters: Option<String>) -> Self {
        self.log_filters = filters;
        self
    }

    pub fn http_client(&self) -> reqwest::Result<reqwest::Client> {
        reqwest::Client::builder().user_agent(&self.user_agent).build()
    }
}

pub fn default_history_path() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("ipscope")
        .join("history.json")
}

/// `~/Library/Logs/ipscope` on macOS, `/var/log/ipscope` for root on Linux,
/// the local data dir otherwise.
pub fn default_log_path() -> PathBuf {
    let dir = if cfg!(target_os = "macos") {
        dirs::home_dir().map(|home| home.join("Library").join("Logs").join("ipscope"))
    } else if cfg!(target_os = "linux") && nix::unistd::getuid().is_root() {
        Some(PathBuf::from("/var/log/ipscope"))
    } else {
        None
    };

    dir.unwrap_or_else(|| {
        dirs::data_local_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join("ipscope")
            .join("logs")
    })
    .join("ipscope.log")
}
