use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use tracing::debug;

use crate::error::ConfigError;

pub const DEFAULT_CONFIG_FILE: &str = "tailgate.yaml";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(5000);
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);
pub const DEFAULT_CHUNK_SIZE: usize = 2000;
/// Multiple of the timeout to wait after the collector refused a dial.
pub const REFUSED_BACKOFF_FACTOR: u32 = 5;

const REMOVE_LOGFILE_FLAG: &str = "removelogfile";

/// Resolved settings for one run.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub logfile: PathBuf,
    /// Normalized `ws://` / `wss://` URL of the collector.
    pub server: String,
    pub command: Vec<String>,
    /// Bounds each dial and handshake, the normal retry delay and the shutdown grace period.
    pub timeout: Duration,
    pub poll_interval: Duration,
    pub chunk_size: usize,
    pub remove_logfile: bool,
}

impl ClientConfig {
    pub fn new(logfile: impl Into<PathBuf>, server: &str, command: Vec<String>) -> Self {
        Self {
            logfile: logfile.into(),
            server: normalize_server_url(server),
            command,
            timeout: DEFAULT_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
            chunk_size: DEFAULT_CHUNK_SIZE,
            remove_logfile: false,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    pub fn with_remove_logfile(mut self, remove: bool) -> Self {
        self.remove_logfile = remove;
        self
    }

    pub fn refused_backoff(&self) -> Duration {
        self.timeout * REFUSED_BACKOFF_FACTOR
    }

    /// Merges the config file with command line overrides. Overrides win.
    pub fn resolve(file: FileConfig, overrides: ConfigOverrides) -> Result<Self, ConfigError> {
        let remove_logfile = overrides.remove_logfile || file.has_flag(REMOVE_LOGFILE_FLAG);
        for flag in file.flags().filter(|flag| *flag != REMOVE_LOGFILE_FLAG) {
            debug!(flag, "ignoring unknown config flag");
        }

        let logfile = overrides
            .logfile
            .or(file.logfile)
            .ok_or(ConfigError::Missing("logfile"))?;
        let server = overrides
            .server
            .or(file.server)
            .filter(|server| !server.trim().is_empty())
            .ok_or(ConfigError::Missing("server"))?;
        let command = if overrides.command.is_empty() {
            file.command
                .map(CommandLine::into_argv)
                .ok_or(ConfigError::Missing("command"))?
        } else {
            overrides.command
        };
        if command.first().map_or(true, |program| program.is_empty()) {
            return Err(ConfigError::EmptyCommand);
        }

        let timeout = overrides
            .timeout_ms
            .or(file.timeout.as_ref().and_then(TimeoutMs::millis))
            .filter(|ms| *ms > 0)
            .map(Duration::from_millis)
            .unwrap_or(DEFAULT_TIMEOUT);

        Ok(Self::new(logfile, &server, command)
            .with_timeout(timeout)
            .with_remove_logfile(remove_logfile))
    }
}

/// Shape of the YAML config file. Every key is optional here; [`ClientConfig::resolve`]
/// decides what is required.
#[derive(Debug, Default, Deserialize)]
pub struct FileConfig {
    pub logfile: Option<PathBuf>,
    pub server: Option<String>,
    pub command: Option<CommandLine>,
    /// Milliseconds.
    pub timeout: Option<TimeoutMs>,
    /// Whitespace separated switches, e.g. `removelogfile`.
    pub flags: Option<String>,
}

/// `timeout: 2500` or `timeout: "2500"`. Text that is not a whole number
/// counts as unset.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum TimeoutMs {
    Millis(u64),
    Text(String),
}

impl TimeoutMs {
    pub fn millis(&self) -> Option<u64> {
        match self {
            TimeoutMs::Millis(ms) => Some(*ms),
            TimeoutMs::Text(text) => text.trim().parse().ok(),
        }
    }
}

/// `command: make test` or `command: [make, test]`.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum CommandLine {
    Line(String),
    Argv(Vec<String>),
}

impl CommandLine {
    pub fn into_argv(self) -> Vec<String> {
        match self {
            CommandLine::Line(line) => line.split_whitespace().map(str::to_string).collect(),
            CommandLine::Argv(argv) => argv,
        }
    }
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn parse(text: &str) -> Result<Self, serde_yaml::Error> {
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(text)
    }

    pub fn flags(&self) -> impl Iterator<Item = &str> {
        self.flags.as_deref().unwrap_or_default().split_whitespace()
    }

    pub fn has_flag(&self, name: &str) -> bool {
        self.flags().any(|flag| flag == name)
    }
}

/// Reads `path` if given. Otherwise reads [`DEFAULT_CONFIG_FILE`] when it
/// exists and falls back to an empty config when it does not.
pub fn load_file_config(path: Option<&Path>) -> Result<FileConfig, ConfigError> {
    match path {
        Some(path) => FileConfig::load(path),
        None => {
            let default = Path::new(DEFAULT_CONFIG_FILE);
            if default.exists() {
                FileConfig::load(default)
            } else {
                debug!(path = DEFAULT_CONFIG_FILE, "no config file; using command line only");
                Ok(FileConfig::default())
            }
        }
    }
}

/// Command line values that take precedence over the config file.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub logfile: Option<PathBuf>,
    pub server: Option<String>,
    pub command: Vec<String>,
    pub timeout_ms: Option<u64>,
    pub remove_logfile: bool,
}

/// Turns `host:port`, `http(s)://` or `ws(s)://` addresses into a websocket URL.
pub fn normalize_server_url(server: &str) -> String {
    let server = server.trim();
    let url = if server.starts_with("ws://") || server.starts_with("wss://") {
        server.to_string()
    } else if let Some(rest) = server.strip_prefix("http://") {
        format!("ws://{rest}")
    } else if let Some(rest) = server.strip_prefix("https://") {
        format!("wss://{rest}")
    } else {
        format!("ws://{server}")
    };

    // Avoid resolving localhost to ::1 when the collector only listens on IPv4.
    url.replacen("://localhost", "://127.0.0.1", 1)
}
