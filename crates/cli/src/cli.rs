//! CLI argument definitions using clap.

use clap::{Parser, Subcommand, ValueEnum};
use contracts::{Facing, Mode, Size};
use std::path::PathBuf;

/// Camera Session - drive a camera session engine against a simulated device
#[derive(Parser, Debug)]
#[command(
    name = "camera-session",
    author,
    version,
    about = "Camera session engine driver",
    long_about = "Drives the three-stage camera session engine (ENGINE, BIND, PREVIEW) \n\
                  against a simulated device described by a session config, and reports \n\
                  the negotiated capture and preview sizes."
)]
pub struct Cli {
    /// Increase logging verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true, env = "CAMERA_SESSION_VERBOSE")]
    pub verbose: u8,

    /// Suppress all output except warnings and errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Log output format
    #[arg(
        long,
        value_enum,
        default_value = "pretty",
        global = true,
        env = "CAMERA_SESSION_LOG_FORMAT"
    )]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a scripted session against the simulated device
    Run(RunArgs),

    /// Validate a configuration file without running
    Validate(ValidateArgs),

    /// Print negotiated sizes and orientation offsets per camera
    Info(InfoArgs),
}

/// Blueprint overrides shared by `run` and `info`
#[derive(Parser, Debug, Clone, Default)]
pub struct Overrides {
    /// Override the camera facing (front / back)
    #[arg(long, env = "CAMERA_SESSION_FACING")]
    pub facing: Option<Facing>,

    /// Override the capture mode (picture / video)
    #[arg(long, env = "CAMERA_SESSION_MODE")]
    pub mode: Option<Mode>,

    /// Override the delivery surface size, view frame (e.g. 1080x1920)
    #[arg(long, env = "CAMERA_SESSION_SURFACE")]
    pub surface: Option<Size>,
}

/// Arguments for the `run` command
#[derive(Parser, Debug, Clone)]
pub struct RunArgs {
    /// Path to configuration file (TOML or JSON). Defaults to the built-in
    /// phone profile when omitted.
    #[arg(short, long, env = "CAMERA_SESSION_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(flatten)]
    pub overrides: Overrides,

    /// Change the surface to this size once preview is running
    #[arg(long)]
    pub resize: Option<Size>,

    /// Switch to the opposite camera once preview is running
    #[arg(long)]
    pub switch_facing: bool,

    /// Simulate a device disconnect once preview is running
    #[arg(long)]
    pub disconnect: bool,

    /// Session timeout in seconds (0 = no timeout)
    #[arg(long, default_value = "0", env = "CAMERA_SESSION_TIMEOUT")]
    pub timeout: u64,

    /// Metrics server port (0 = disabled)
    #[arg(long, default_value = "0", env = "CAMERA_SESSION_METRICS_PORT")]
    pub metrics_port: u16,

    /// Print the session summary as JSON
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the `validate` command
#[derive(Parser, Debug)]
pub struct ValidateArgs {
    /// Path to configuration file to validate
    #[arg(short, long, default_value = "session.toml", env = "CAMERA_SESSION_CONFIG")]
    pub config: PathBuf,

    /// Output validation result as JSON
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the `info` command
#[derive(Parser, Debug)]
pub struct InfoArgs {
    /// Path to configuration file. Defaults to the built-in phone profile.
    #[arg(short, long, env = "CAMERA_SESSION_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(flatten)]
    pub overrides: Overrides,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

/// Log output format
#[derive(ValueEnum, Clone, Copy, Debug, Default)]
pub enum LogFormat {
    /// JSON structured logging
    Json,
    /// Human-readable pretty format
    #[default]
    Pretty,
    /// Compact single-line format
    Compact,
}

impl From<LogFormat> for observability::LogFormat {
    fn from(format: LogFormat) -> Self {
        match format {
            LogFormat::Json => Self::Json,
            LogFormat::Pretty => Self::Pretty,
            LogFormat::Compact => Self::Compact,
        }
    }
}
