// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Logging setup for the firmware configuration tools
//!
//! Every binary initializes `tracing` through this crate so that the filter
//! syntax, the output formats and the log file locations stay the same. A
//! `RUST_LOG` value always takes precedence over the level chosen here.

use serde::{Deserialize, Serialize};
use std::io;
use std::path::{Path, PathBuf};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub use clap;
pub use tracing::Level;

/// Name used for log files and the default filter directive.
pub const DEFAULT_COMPONENT: &str = "fwcfg";

/// Output format for log messages
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, clap::ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable plaintext format
    #[default]
    Plaintext,
    /// One JSON object per event
    Json,
}

impl std::fmt::Display for LogFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogFormat::Plaintext => write!(f, "plaintext"),
            LogFormat::Json => write!(f, "json"),
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "plaintext" => Ok(LogFormat::Plaintext),
            "json" => Ok(LogFormat::Json),
            _ => Err(format!("Invalid log format: {s}. Use 'plaintext' or 'json'")),
        }
    }
}

/// Log level accepted on the command line and in settings files
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, clap::ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CliLogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

impl From<CliLogLevel> for Level {
    fn from(level: CliLogLevel) -> Self {
        match level {
            CliLogLevel::Error => Level::ERROR,
            CliLogLevel::Warn => Level::WARN,
            CliLogLevel::Info => Level::INFO,
            CliLogLevel::Debug => Level::DEBUG,
            CliLogLevel::Trace => Level::TRACE,
        }
    }
}

impl std::fmt::Display for CliLogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CliLogLevel::Error => write!(f, "error"),
            CliLogLevel::Warn => write!(f, "warn"),
            CliLogLevel::Info => write!(f, "info"),
            CliLogLevel::Debug => write!(f, "debug"),
            CliLogLevel::Trace => write!(f, "trace"),
        }
    }
}

impl std::str::FromStr for CliLogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "error" => Ok(CliLogLevel::Error),
            "warn" | "warning" => Ok(CliLogLevel::Warn),
            "info" => Ok(CliLogLevel::Info),
            "debug" => Ok(CliLogLevel::Debug),
            "trace" | "verbose" => Ok(CliLogLevel::Trace),
            _ => Err(format!(
                "Invalid log level: {s}. Use one of error, warn, info, debug, trace"
            )),
        }
    }
}

/// Logging flags shared by every binary
///
/// Use with `#[command(flatten)]`. Output goes to stderr unless `--log-file`
/// or `--log-dir` is given, so validated configuration printed on stdout
/// stays clean.
#[derive(Clone, Debug, Default, clap::Args, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct CliLoggingArgs {
    #[arg(long, value_enum, global = true, help = "Log verbosity level (default: info)")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_level: Option<CliLogLevel>,

    #[arg(long, value_enum, global = true, help = "Log output format (default: plaintext)")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_format: Option<LogFormat>,

    #[arg(long, global = true, help = "Directory for log files")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_dir: Option<String>,

    #[arg(long, global = true, help = "Log filename")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_file: Option<String>,

    /// Shorthand for `--log-level debug`.
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    #[serde(default)]
    pub verbose: bool,

    /// Only report warnings and errors.
    #[arg(short, long, global = true)]
    #[serde(default)]
    pub quiet: bool,

    /// Disable ANSI colors in plaintext output.
    #[arg(long, global = true)]
    #[serde(default)]
    pub no_color: bool,
}

impl CliLoggingArgs {
    /// The level to log at. An explicit `--log-level` wins over `--verbose`
    /// and `--quiet`, which win over `configured`.
    pub fn effective_level(&self, configured: Option<CliLogLevel>) -> CliLogLevel {
        if let Some(level) = self.log_level {
            return level;
        }
        if self.verbose {
            return CliLogLevel::Debug;
        }
        if self.quiet {
            return CliLogLevel::Warn;
        }
        configured.unwrap_or_default()
    }

    pub fn logs_to_file(&self) -> bool {
        self.log_file.is_some() || self.log_dir.is_some()
    }

    /// Initialize logging for `component` from the parsed flags.
    pub fn init(self, component: &str, configured: Option<CliLogLevel>) -> anyhow::Result<()> {
        let level = self.effective_level(configured).into();
        let format = self.log_format.unwrap_or_default();
        if self.logs_to_file() {
            let log_path = self.resolve_log_path(component);
            init_to_file(component, level, format, &log_path)
        } else {
            init_with_writer(component, level, format, !self.no_color, io::stderr)
        }
    }

    /// Absolute `--log-file` values are used as is. Relative ones are placed
    /// under `--log-dir` when given. Without a file name the log goes to
    /// `<component>.log` in the log directory or the platform location.
    pub fn resolve_log_path(&self, component: &str) -> PathBuf {
        match (&self.log_file, &self.log_dir) {
            (Some(file), _) if Path::new(file).is_absolute() => PathBuf::from(file),
            (Some(file), Some(dir)) => Path::new(dir).join(file),
            (Some(file), None) => PathBuf::from(file),
            (None, Some(dir)) => Path::new(dir).join(format!("{component}.log")),
            (None, None) => get_standard_log_path_for_component(component),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.log_level.is_none()
            && self.log_format.is_none()
            && self.log_dir.is_none()
            && self.log_file.is_none()
            && !self.verbose
            && !self.quiet
    }
}

/// Platform log directory joined with `<component>.log`.
pub fn get_standard_log_path_for_component(component: &str) -> PathBuf {
    let base_path = get_standard_log_path();
    let parent = base_path.parent().unwrap_or(Path::new("/tmp"));
    parent.join(format!("{component}.log"))
}

/// Default log file location for the current OS
///
/// - Windows: `%APPDATA%\fwcfg\fwcfg.log`
/// - macOS: `~/Library/Logs/fwcfg.log`
/// - Linux: `~/.local/share/fwcfg/fwcfg.log`
/// - Other: `~/fwcfg.log`
pub fn get_standard_log_path() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        let mut path =
            dirs::data_dir().unwrap_or_else(|| PathBuf::from("C:\\Users\\Default\\AppData\\Roaming"));
        path.push(DEFAULT_COMPONENT);
        path.push(format!("{DEFAULT_COMPONENT}.log"));
        path
    }

    #[cfg(target_os = "macos")]
    {
        let mut path = dirs::home_dir().unwrap_or_else(|| PathBuf::from("/tmp"));
        path.push("Library");
        path.push("Logs");
        path.push(format!("{DEFAULT_COMPONENT}.log"));
        path
    }

    #[cfg(target_os = "linux")]
    {
        let mut path =
            dirs::data_dir().unwrap_or_else(|| dirs::home_dir().unwrap_or_else(|| PathBuf::from("/tmp")));
        path.push(DEFAULT_COMPONENT);
        path.push(format!("{DEFAULT_COMPONENT}.log"));
        path
    }

    #[cfg(not(any(target_os = "windows", target_os = "macos", target_os = "linux")))]
    {
        let mut path = dirs::home_dir().unwrap_or_else(|| PathBuf::from("/tmp"));
        path.push(format!("{DEFAULT_COMPONENT}.log"));
        path
    }
}

/// Filter used when `RUST_LOG` is unset.
///
/// The workspace crates log at `default_level`; dependencies stay at `warn`.
pub fn default_directive(component: &str, default_level: Level) -> String {
    let component = component.replace('-', "_");
    format!(
        "warn,fw_config_core={default_level},fw_codegen={default_level},fw_core={default_level},fw_cli={default_level},{component}={default_level}"
    )
}

/// Initialize logging to stderr.
pub fn init(component: &str, default_level: Level, format: LogFormat) -> anyhow::Result<()> {
    init_with_writer(component, default_level, format, true, io::stderr)
}

/// Initialize logging to a file, appending when it exists.
pub fn init_to_file(
    component: &str,
    default_level: Level,
    format: LogFormat,
    log_path: &Path,
) -> anyhow::Result<()> {
    use std::fs;

    if let Some(parent) = log_path.parent() {
        fs::create_dir_all(parent)?;
    }
    let log_file = fs::OpenOptions::new().create(true).append(true).open(log_path)?;
    init_with_writer(component, default_level, format, false, log_file)
}

/// Initialize logging with a custom writer.
pub fn init_with_writer<W>(
    component: &str,
    default_level: Level,
    format: LogFormat,
    ansi: bool,
    writer: W,
) -> anyhow::Result<()>
where
    W: for<'writer> tracing_subscriber::fmt::MakeWriter<'writer> + Send + Sync + 'static,
{
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(component, default_level)));

    match format {
        LogFormat::Json => {
            let layer = tracing_subscriber::fmt::layer().with_writer(writer).json();
            #[cfg(debug_assertions)]
            let layer = layer.with_file(true).with_line_number(true);

            tracing_subscriber::registry().with(filter).with(layer).try_init()?;
        }
        LogFormat::Plaintext => {
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(ansi)
                .with_target(false);
            #[cfg(debug_assertions)]
            let layer = layer.with_file(true).with_line_number(true);

            tracing_subscriber::registry().with(filter).with(layer).try_init()?;
        }
    }

    Ok(())
}

/// Helpers for asserting on log output
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils {
    use std::io::Write;
    use std::sync::{Arc, Mutex, MutexGuard};
    use tracing_subscriber::fmt::MakeWriter;

    /// A `MakeWriter` collecting everything written into a shared buffer.
    #[derive(Clone, Default)]
    pub struct BufferWriter(Arc<Mutex<Vec<u8>>>);

    pub struct BufferGuard<'a>(MutexGuard<'a, Vec<u8>>);

    impl BufferWriter {
        pub fn contents(&self) -> String {
            let guard = self.0.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            String::from_utf8_lossy(&guard).into_owned()
        }
    }

    impl Write for BufferGuard<'_> {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl<'a> MakeWriter<'a> for BufferWriter {
        type Writer = BufferGuard<'a>;

        fn make_writer(&'a self) -> Self::Writer {
            BufferGuard(self.0.lock().unwrap_or_else(|poisoned| poisoned.into_inner()))
        }
    }

    /// Strip ANSI escape sequences.
    #[cfg(feature = "test-utils")]
    pub fn strip_ansi_codes(s: &str) -> String {
        let ansi_regex = regex::Regex::new(r"\x1b\[[0-9;]*[a-zA-Z]").expect("ANSI pattern is valid");
        ansi_regex.replace_all(s, "").to_string()
    }

    /// Strip ANSI escape sequences.
    #[cfg(not(feature = "test-utils"))]
    pub fn strip_ansi_codes(s: &str) -> String {
        let mut result = String::with_capacity(s.len());
        let mut chars = s.chars().peekable();

        while let Some(ch) = chars.next() {
            if ch == '\x1b' && chars.peek() == Some(&'[') {
                chars.next();
                for ch in chars.by_ref() {
                    if ch.is_ascii_alphabetic() {
                        break;
                    }
                }
            } else {
                result.push(ch);
            }
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct Args {
        #[command(flatten)]
        logging: CliLoggingArgs,
    }

    #[test]
    fn test_cli_log_level_conversion() {
        assert_eq!(Level::from(CliLogLevel::Error), Level::ERROR);
        assert_eq!(Level::from(CliLogLevel::Warn), Level::WARN);
        assert_eq!(Level::from(CliLogLevel::Info), Level::INFO);
        assert_eq!(Level::from(CliLogLevel::Debug), Level::DEBUG);
        assert_eq!(Level::from(CliLogLevel::Trace), Level::TRACE);
    }

    #[test]
    fn test_cli_log_level_parsing() {
        assert_eq!("WARNING".parse::<CliLogLevel>(), Ok(CliLogLevel::Warn));
        assert_eq!("verbose".parse::<CliLogLevel>(), Ok(CliLogLevel::Trace));
        assert_eq!("debug".parse::<CliLogLevel>(), Ok(CliLogLevel::Debug));
        assert!("loud".parse::<CliLogLevel>().is_err());
        assert_eq!(CliLogLevel::default().to_string(), "info");
    }

    #[test]
    fn test_effective_level_precedence() {
        let args = Args::parse_from(["fwcfg", "--verbose"]).logging;
        assert_eq!(args.effective_level(Some(CliLogLevel::Error)), CliLogLevel::Debug);

        let args = Args::parse_from(["fwcfg", "-q"]).logging;
        assert_eq!(args.effective_level(None), CliLogLevel::Warn);

        let args = Args::parse_from(["fwcfg", "--log-level", "trace", "-q"]).logging;
        assert_eq!(args.effective_level(None), CliLogLevel::Trace);

        let args = Args::parse_from(["fwcfg"]).logging;
        assert!(args.is_empty());
        assert_eq!(args.effective_level(Some(CliLogLevel::Error)), CliLogLevel::Error);
        assert_eq!(args.effective_level(None), CliLogLevel::Info);
    }

    #[test]
    fn test_verbose_and_quiet_conflict() {
        assert!(Args::try_parse_from(["fwcfg", "-v", "-q"]).is_err());
    }

    #[test]
    fn test_log_path_resolution() {
        let dir = tempfile::tempdir().unwrap();
        let dir_str = dir.path().to_string_lossy().to_string();

        let args = CliLoggingArgs {
            log_dir: Some(dir_str.clone()),
            ..Default::default()
        };
        assert!(args.logs_to_file());
        assert_eq!(args.resolve_log_path("fwcfg"), dir.path().join("fwcfg.log"));

        let args = CliLoggingArgs {
            log_dir: Some(dir_str.clone()),
            log_file: Some("run/compile.log".into()),
            ..Default::default()
        };
        assert_eq!(args.resolve_log_path("fwcfg"), dir.path().join("run/compile.log"));

        let absolute = dir.path().join("abs.log");
        let args = CliLoggingArgs {
            log_dir: Some("/elsewhere".into()),
            log_file: Some(absolute.to_string_lossy().to_string()),
            ..Default::default()
        };
        assert_eq!(args.resolve_log_path("fwcfg"), absolute);
    }

    #[test]
    fn test_standard_log_path_for_component() {
        let path = get_standard_log_path_for_component("fwcfg-test");
        let path_str = path.to_string_lossy();
        assert!(path_str.ends_with("fwcfg-test.log"));

        #[cfg(target_os = "macos")]
        assert!(path_str.contains("Library/Logs"));
    }

    #[test]
    fn test_default_directive_covers_workspace_crates() {
        let directive = default_directive("fw-probe", Level::DEBUG);
        assert!(directive.starts_with("warn,"));
        assert!(directive.contains("fw_core=DEBUG"));
        assert!(directive.contains("fw_cli=DEBUG"));
        assert!(directive.ends_with("fw_probe=DEBUG"));
        assert!(EnvFilter::try_new(&directive).is_ok());
    }

    #[test]
    fn test_strip_ansi_codes() {
        let colored = "\x1b[32mINFO\x1b[0m Validating configuration";
        assert_eq!(test_utils::strip_ansi_codes(colored), "INFO Validating configuration");
    }

    #[test]
    fn test_buffer_writer_captures_events() {
        let buffer = test_utils::BufferWriter::default();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(buffer.clone())
            .with_ansi(false)
            .finish();
        tracing::subscriber::with_default(subscriber, || {
            tracing::info!(component = "i2c", "Validating section");
        });
        let output = buffer.contents();
        assert!(output.contains("Validating section"), "{output}");
        assert!(output.contains("component=\"i2c\""), "{output}");
    }
}
