use env_logger::fmt::Formatter;
use env_logger::{Builder, Target};
use log::{LevelFilter, Record};
use std::fs;
use std::io::Write;
use std::path::PathBuf;

/// Environment variable overriding the directory the log file is written to
pub const LOG_DIR_ENV: &str = "UNITY_MCP_BRIDGE_LOG_DIR";

const LOG_FILE_NAME: &str = "unity_mcp_bridge.log";

/// Initialize logging: stdout under test, the log file otherwise
///
/// Safe to call more than once; only the first call installs a logger.
pub fn init_logging() {
    if cfg!(test) {
        init_stdout_logging();
    } else {
        init_file_logging();
    }
}

/// Where the application writes its log
pub fn log_file_path() -> PathBuf {
    log_directory().join(LOG_FILE_NAME)
}

fn write_record(buf: &mut Formatter, record: &Record, timestamped: bool) -> std::io::Result<()> {
    if timestamped {
        write!(buf, "[{}] ", chrono::Utc::now().format("%Y-%m-%d %H:%M:%S%.3f UTC"))?;
    }
    writeln!(
        buf,
        "[{}] [{}:{}] {}",
        record.level(),
        record.file().unwrap_or("unknown"),
        record.line().unwrap_or(0),
        record.args()
    )
}

fn init_stdout_logging() {
    let mut builder = Builder::from_default_env();
    builder
        .target(Target::Stdout)
        .filter_level(LevelFilter::Debug)
        .format(|buf, record| write_record(buf, record, false));
    let _ = builder.try_init();
}

// stdout carries the MCP transport
fn init_file_logging() {
    let log_file = log_file_path();
    if let Some(dir) = log_file.parent() {
        if let Err(e) = fs::create_dir_all(dir) {
            eprintln!("Failed to create log directory {}: {}", dir.display(), e);
            return;
        }
    }

    let file = match fs::OpenOptions::new().create(true).append(true).open(&log_file) {
        Ok(file) => file,
        Err(e) => {
            eprintln!("Failed to open log file {}: {}", log_file.display(), e);
            return;
        }
    };

    // RUST_LOG still applies on top of the default level
    let mut builder = Builder::new();
    builder
        .filter_level(LevelFilter::Info)
        .parse_default_env()
        .target(Target::Pipe(Box::new(file)))
        .format(|buf, record| write_record(buf, record, true));

    if builder.try_init().is_ok() {
        log::info!("Logging initialized to file: {}", log_file.display());
    }
}

fn log_directory() -> PathBuf {
    if let Some(dir) = std::env::var_os(LOG_DIR_ENV).filter(|dir| !dir.is_empty()) {
        return PathBuf::from(dir);
    }
    dirs::data_local_dir()
        .map(|data_dir| data_dir.join("UnityMcpBridge"))
        .unwrap_or_else(|| PathBuf::from("./logs"))
}

/// Debug-level log line
#[macro_export]
macro_rules! debug_log {
    ($($arg:tt)*) => {
        log::debug!($($arg)*)
    };
}

#[macro_export]
macro_rules! info_log {
    ($($arg:tt)*) => {
        log::info!($($arg)*)
    };
}

#[macro_export]
macro_rules! warn_log {
    ($($arg:tt)*) => {
        log::warn!($($arg)*)
    };
}

#[macro_export]
macro_rules! error_log {
    ($($arg:tt)*) => {
        log::error!($($arg)*)
    };
}
