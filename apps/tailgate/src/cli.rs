use clap::{Args, Parser};
use std::path::PathBuf;

use crate::config::ConfigOverrides;
use crate::telemetry::logging::{LogConfig, LogLevel};

#[derive(Parser, Debug)]
#[command(
    name = "tailgate",
    about = "Run a command and ship the growing tail of its log file to a collector",
    author,
    version
)]
pub struct Cli {
    #[arg(
        long,
        short = 'c',
        env = "TAILGATE_CONFIG",
        value_name = "PATH",
        help = "YAML config file (defaults to ./tailgate.yaml when present)"
    )]
    pub config: Option<PathBuf>,

    #[arg(
        long,
        env = "TAILGATE_SERVER",
        value_name = "URL",
        help = "Collector address, e.g. ws://logs.internal:8080/tail"
    )]
    pub server: Option<String>,

    #[arg(
        long,
        env = "TAILGATE_LOGFILE",
        value_name = "PATH",
        help = "Log file to tail; it may not exist yet"
    )]
    pub logfile: Option<PathBuf>,

    #[arg(
        long = "timeout-ms",
        env = "TAILGATE_TIMEOUT_MS",
        value_name = "MS",
        help = "Dial/handshake timeout, retry delay and shutdown grace period"
    )]
    pub timeout_ms: Option<u64>,

    #[arg(
        long = "remove-logfile",
        help = "Delete the log file once at startup before tailing"
    )]
    pub remove_logfile: bool,

    #[command(flatten)]
    pub logging: LoggingArgs,

    /// Command to supervise; everything after `--`.
    #[arg(trailing_var_arg = true, allow_hyphen_values = true, value_name = "COMMAND")]
    pub command: Vec<String>,
}

impl Cli {
    pub fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            logfile: self.logfile.clone(),
            server: self.server.clone(),
            command: self.command.clone(),
            timeout_ms: self.timeout_ms,
            remove_logfile: self.remove_logfile,
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct LoggingArgs {
    #[arg(
        long = "log-level",
        value_enum,
        env = "TAILGATE_LOG_LEVEL",
        default_value_t = LogLevel::Info,
        help = "Minimum log level (error, warn, info, debug, trace)"
    )]
    pub level: LogLevel,

    #[arg(
        long = "log-file",
        value_name = "PATH",
        env = "TAILGATE_LOG_FILE",
        help = "Write diagnostics to this file instead of stderr"
    )]
    pub file: Option<PathBuf>,
}

impl LoggingArgs {
    pub fn to_config(&self) -> LogConfig {
        LogConfig {
            level: self.level,
            file: self.file.clone(),
        }
    }
}
