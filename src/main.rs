#![forbid(unsafe_code)]

mod constants;
mod daemon;
mod ipc;
mod overlay;
mod settings;
mod types;
mod ui_handler;
mod window;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::{Level as TraceLevel, debug};
use tracing_subscriber::FmtSubscriber;

use ipc::{ControlClient, ControlRequest, ControlResponse};
use overlay::gravity::choose_overlay_gravity;
use overlay::parser::parse_overlay_setting;
use settings::{SettingsSource, SettingsStore};
use types::format_modes;

#[derive(Parser)]
#[command(name = "overlay-displays", version, about = "Simulated secondary displays driven by one setting string")]
struct Cli {
    /// Settings file (default: config dir/overlay-displays/settings.json)
    #[arg(long, global = true)]
    settings: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Cmd>,
}

#[derive(Subcommand)]
enum Cmd {
    /// Run the overlay display daemon (default)
    Daemon {
        /// Keep overlay windows in memory instead of on the X11 screen
        #[arg(long)]
        headless: bool,
    },
    /// Store a new overlay display setting, e.g. "1280x720/213;1920x1080/320,secure"
    Set { value: String },
    /// Remove the overlay display setting
    Clear,
    /// Print the stored overlay display setting
    Get,
    /// Show how a setting would be interpreted without applying it
    Parse { value: String },
    /// Print the registered devices as JSON
    Devices,
    /// Print the daemon's adapter state
    Dump,
    /// Switch a registered device to another mode
    Mode { unique_id: String, mode_id: i32 },
    /// Check that the daemon answers
    Ping,
    /// Stop the running daemon
    Stop,
}

fn init_logging() -> Result<()> {
    let log_level = match std::env::var("LOG_LEVEL")
        .unwrap_or_else(|_| "info".to_string())
        .to_lowercase()
        .as_str()
    {
        "trace" => TraceLevel::TRACE,
        "debug" => TraceLevel::DEBUG,
        "warn" => TraceLevel::WARN,
        "error" => TraceLevel::ERROR,
        _ => TraceLevel::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber).context("Failed to install tracing subscriber")
}

/// Send one request to the running daemon
fn daemon_request(request: ControlRequest) -> Result<ControlResponse> {
    let mut client = ControlClient::connect().context("Overlay display daemon is not running")?;
    match client.request(request)? {
        ControlResponse::Error(msg) => bail!("{msg}"),
        response => Ok(response),
    }
}

/// Write through the daemon when it is up, else straight to the file
fn store_setting(store: &SettingsStore, value: Option<String>) -> Result<()> {
    match ControlClient::connect() {
        Ok(mut client) => match client.request(ControlRequest::SetOverlayDisplays(value))? {
            ControlResponse::Error(msg) => bail!("{msg}"),
            _ => Ok(()),
        },
        Err(e) => {
            debug!(error = ?e, "Daemon unreachable, writing settings file directly");
            store.put_overlay_display_devices(value.as_deref())
        }
    }
}

fn print_parse(value: &str) {
    let parsed = parse_overlay_setting(value);
    for warning in &parsed.warnings {
        println!("warning: {warning}");
    }
    if parsed.specs.is_empty() {
        println!("no overlay displays");
    }
    for spec in &parsed.specs {
        println!(
            "{}: modes={}, secure={}, gravity={}",
            constants::device::display_name(spec.number),
            format_modes(&spec.modes),
            spec.secure,
            choose_overlay_gravity(spec.number),
        );
    }
}

fn main() -> Result<()> {
    init_logging()?;

    let cli = Cli::parse();
    let settings_path = cli.settings.unwrap_or_else(SettingsStore::default_path);
    let store = SettingsStore::open(&settings_path);

    match cli.command.unwrap_or(Cmd::Daemon { headless: false }) {
        Cmd::Daemon { headless } => daemon::run(daemon::DaemonOptions { settings_path, headless })?,
        Cmd::Set { value } => store_setting(&store, Some(value))?,
        Cmd::Clear => store_setting(&store, None)?,
        Cmd::Get => {
            let value = match ControlClient::connect() {
                Ok(mut client) => match client.request(ControlRequest::GetOverlayDisplays)? {
                    ControlResponse::OverlayDisplays(value) => value,
                    other => bail!("Unexpected response from daemon: {other:?}"),
                },
                Err(_) => store.overlay_display_devices()?,
            };
            println!("{}", value.unwrap_or_default());
        }
        Cmd::Parse { value } => print_parse(&value),
        Cmd::Devices => match daemon_request(ControlRequest::ListDevices)? {
            ControlResponse::Devices(infos) => {
                println!("{}", serde_json::to_string_pretty(&infos).context("Failed to serialize device info")?);
            }
            other => bail!("Unexpected response from daemon: {other:?}"),
        },
        Cmd::Dump => match daemon_request(ControlRequest::Dump)? {
            ControlResponse::Dump(text) => print!("{text}"),
            other => bail!("Unexpected response from daemon: {other:?}"),
        },
        Cmd::Mode { unique_id, mode_id } => {
            daemon_request(ControlRequest::RequestMode { unique_id, mode_id })?;
        }
        Cmd::Ping => match daemon_request(ControlRequest::Ping)? {
            ControlResponse::Pong => println!("pong"),
            other => bail!("Unexpected response from daemon: {other:?}"),
        },
        Cmd::Stop => {
            daemon_request(ControlRequest::Shutdown)?;
        }
    }
    Ok(())
}
