mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use kemeselot_core::RestoreReason;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "kemeselot")]
#[command(about = "Blocks distracting apps until a short prayer is completed", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the app monitor (launches the background daemon if needed)
    Start,
    /// Stop the app monitor; it stays stopped across restarts
    Stop,
    /// Show monitor, overlay and permission status
    Status,
    /// Login/boot hook: resume the monitor if it was left running
    Boot,
    /// Shut the background daemon down without changing the monitor setting
    Shutdown,
    /// Launch the daemon at login and relaunch it if it is killed
    Autostart {
        #[command(subcommand)]
        action: AutostartAction,
    },
    /// (Internal) Run the daemon process
    #[command(hide = true)]
    DaemonInternalStart {
        #[arg(long)]
        boot: bool,
    },
    /// Check or request the permissions the monitor needs
    Permissions {
        #[command(subcommand)]
        action: Option<PermissionAction>,
    },
    /// Manage blocked applications
    Block {
        #[command(subcommand)]
        action: BlockAction,
    },
    /// Prayer settings
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
    /// Dismiss the overlay (only works once the prayer is complete)
    Dismiss,
    /// Report voice activity by hand, overriding the microphone detector
    Speech {
        #[command(subcommand)]
        action: SpeechAction,
    },
    /// Print every overlay dismissal until interrupted
    Watch,
    /// Today's readings, chant and Ethiopian date
    Today {
        /// Psalter JSON file to print today's psalms from
        #[arg(long)]
        psalms: Option<PathBuf>,
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand, Debug)]
enum AutostartAction {
    /// Install and start the login service
    Enable,
    /// Remove the login service
    Disable,
}

#[derive(Subcommand, Debug)]
enum PermissionAction {
    /// Open the settings page for a permission
    Request {
        #[arg(value_enum)]
        permission: PermissionKind,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum PermissionKind {
    Overlay,
    Usage,
}

#[derive(Subcommand, Debug)]
enum BlockAction {
    /// List blocked applications
    List,
    /// Replace the blocked set
    Set { apps: Vec<String> },
    /// Block one more application
    Add { app: String },
    /// Unblock an application
    Remove { app: String },
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    /// Show current settings
    Show,
    /// Set a value (prayer_mode, timer_duration_seconds, overlay_command)
    Set { key: String, value: String },
}

#[derive(Subcommand, Debug, Clone, Copy)]
enum SpeechAction {
    /// Speech detected
    Start,
    /// Speech stopped
    End,
    /// Turn the microphone off
    Pause,
    /// Turn the microphone back on
    Resume,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if !matches!(cli.command, Commands::DaemonInternalStart { .. }) {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
            .format_timestamp_secs()
            .init();
    }

    match cli.command {
        Commands::Start => commands::daemon::start_monitor().await,
        Commands::Stop => commands::daemon::stop_monitor().await,
        Commands::Status => commands::daemon::show_status().await,
        Commands::Boot => commands::daemon::boot(),
        Commands::Shutdown => commands::daemon::stop_daemon().await,
        Commands::Autostart { action } => match action {
            AutostartAction::Enable => commands::autostart::enable(),
            AutostartAction::Disable => commands::autostart::disable(),
        },
        Commands::DaemonInternalStart { boot } => {
            let reason = if boot {
                RestoreReason::Boot
            } else {
                RestoreReason::ProcessRestart
            };
            commands::daemon::run_daemon_process(reason).await
        }
        Commands::Permissions { action } => match action {
            None => commands::permissions::show_permissions().await,
            Some(PermissionAction::Request { permission }) => {
                commands::permissions::request_permission(permission).await
            }
        },
        Commands::Block { action } => match action {
            BlockAction::List => commands::block::list().await,
            BlockAction::Set { apps } => commands::block::set(apps).await,
            BlockAction::Add { app } => commands::block::add(&app).await,
            BlockAction::Remove { app } => commands::block::remove(&app).await,
        },
        Commands::Config { action } => match action {
            ConfigAction::Show => commands::config::handle_config_show(),
            ConfigAction::Set { key, value } => commands::config::handle_config_set(&key, &value),
        },
        Commands::Dismiss => commands::ritual::dismiss().await,
        Commands::Speech { action } => commands::ritual::speech(action).await,
        Commands::Watch => commands::ritual::watch().await,
        Commands::Today { psalms, json } => commands::today::show_today(psalms.as_deref(), json),
    }
}
