//! The tatamiwm binary.
//!
//! Invoked plain, it runs the compositor. Invoked with a control flag
//! while a compositor is running, it talks to that instance through
//! the control channel (runtime files plus signals) and exits.

use std::env;
use std::path::PathBuf;
use std::process;
use std::str::FromStr;

use clap::{ArgAction, Parser};

use nix::sys::signal::Signal;
use nix::unistd::{geteuid, getuid};

use tracing::Level;
use tracing_subscriber::fmt as logger;

use tatamiwm::bindings::Toggle;
use tatamiwm::ctl::{self, CommandFamily};
use tatamiwm::types::Rect;
use tatamiwm::{Config, HeadlessConn, Result, Server};

use calloop::EventLoop;

#[derive(Parser, Debug)]
#[command(
    name = "tatamiwm",
    about = "A stacking-and-tiling Wayland compositor core",
    version,
    disable_version_flag = true
)]
struct Cli {
    /// Path to the config file.
    #[arg(short = 'c', long = "config", value_name = "file")]
    config: Option<PathBuf>,

    /// Path to the config directory.
    #[arg(short = 'C', long = "config-dir", value_name = "dir")]
    config_dir: Option<PathBuf>,

    /// Enable full logging.
    #[arg(short = 'd', long = "debug")]
    debug: bool,

    /// Exit the running compositor.
    #[arg(short = 'e', long = "exit")]
    exit: bool,

    /// Merge the config file over the config-dir defaults.
    #[arg(short = 'm', long = "merge-config")]
    merge_config: bool,

    /// Ask the running compositor to reconfigure.
    #[arg(short = 'r', long = "reconfigure")]
    reconfigure: bool,

    /// Command to run once at startup.
    #[arg(short = 's', long = "startup", value_name = "command")]
    startup: Option<String>,

    /// Primary session client; the compositor exits when it dies.
    #[arg(short = 'S', long = "session", value_name = "command")]
    session: Option<String>,

    /// Print the version and exit.
    #[arg(short = 'v', long = "version", action = ArgAction::Version)]
    version: Option<bool>,

    /// Enable informative logging.
    #[arg(short = 'V', long = "verbose")]
    verbose: bool,

    /// Enable the keybind with the given id.
    #[arg(long = "enable-keybind", value_name = "id")]
    enable_keybind: Option<String>,

    /// Disable the keybind with the given id.
    #[arg(long = "disable-keybind", value_name = "id")]
    disable_keybind: Option<String>,

    /// Toggle the keybind with the given id.
    #[arg(long = "toggle-keybind", value_name = "id")]
    toggle_keybind: Option<String>,

    /// Switch to a workspace by index or name.
    #[arg(long = "workspace-switch", value_name = "n-or-name")]
    workspace_switch: Option<String>,

    /// Switch to the next workspace.
    #[arg(long = "workspace-next")]
    workspace_next: bool,

    /// Switch to the previous workspace.
    #[arg(long = "workspace-prev")]
    workspace_prev: bool,

    /// Print the active workspace name.
    #[arg(long = "workspace-current")]
    workspace_current: bool,

    /// Turn the tiling engine on.
    #[arg(long = "enable-tiling")]
    enable_tiling: bool,

    /// Turn the tiling engine off.
    #[arg(long = "disable-tiling")]
    disable_tiling: bool,

    /// Flip the tiling engine.
    #[arg(long = "toggle-tiling")]
    toggle_tiling: bool,

    /// Change tiling grid mode.
    #[arg(long = "tiling-grid-mode", value_name = "on|off|toggle")]
    tiling_grid_mode: Option<String>,

    /// Recompute the tiled layout.
    #[arg(long = "recalculate-tiling")]
    recalculate_tiling: bool,

    /// Print the tiling status.
    #[arg(long = "tiling-status")]
    tiling_status: bool,
}

fn main() {
    let cli = Cli::parse();

    if let Some(outcome) = control_request(&cli) {
        match outcome {
            Ok(Some(output)) => println!("{}", output),
            Ok(None) => {}
            Err(e) => {
                eprintln!("tatamiwm: {}", e);
                process::exit(1);
            }
        }
        return;
    }

    if let Err(e) = run_compositor(cli) {
        eprintln!("tatamiwm: {}", e);
        process::exit(1);
    }
}

/// Handles the control-channel invocations of the binary. Returns
/// None when no control flag was given.
fn control_request(cli: &Cli) -> Option<Result<Option<String>>> {
    if cli.exit {
        return Some(ctl::send_signal(Signal::SIGTERM).map(|_| None));
    }
    if cli.reconfigure {
        return Some(ctl::send_signal(Signal::SIGHUP).map(|_| None));
    }

    if let Some(id) = &cli.enable_keybind {
        return Some(send(CommandFamily::Keybind, format!("enable {}", id)));
    }
    if let Some(id) = &cli.disable_keybind {
        return Some(send(CommandFamily::Keybind, format!("disable {}", id)));
    }
    if let Some(id) = &cli.toggle_keybind {
        return Some(send(CommandFamily::Keybind, format!("toggle {}", id)));
    }

    if let Some(target) = &cli.workspace_switch {
        return Some(send(CommandFamily::Workspace, format!("switch {}", target)));
    }
    if cli.workspace_next {
        return Some(send(CommandFamily::Workspace, "next".into()));
    }
    if cli.workspace_prev {
        return Some(send(CommandFamily::Workspace, "prev".into()));
    }
    if cli.workspace_current {
        return Some(ctl::read_workspace_current().map(Some));
    }

    if cli.enable_tiling {
        return Some(send(CommandFamily::Tiling, "enable".into()));
    }
    if cli.disable_tiling {
        return Some(send(CommandFamily::Tiling, "disable".into()));
    }
    if cli.toggle_tiling {
        return Some(send(CommandFamily::Tiling, "toggle".into()));
    }
    if let Some(setting) = &cli.tiling_grid_mode {
        // validate before bothering the server
        if let Err(e) = Toggle::from_str(setting) {
            return Some(Err(tatamiwm::TatamiError::Config(format!(
                "invalid grid-mode setting \"{}\": {}",
                setting, e
            ))));
        }
        return Some(send(CommandFamily::Tiling, format!("grid-mode {}", setting)));
    }
    if cli.recalculate_tiling {
        return Some(send(CommandFamily::Tiling, "recalculate".into()));
    }
    if cli.tiling_status {
        return Some(ctl::read_tiling_status().map(Some));
    }

    None
}

fn send(family: CommandFamily, line: String) -> Result<Option<String>> {
    ctl::send_command(family, &line).map(|_| None)
}

fn run_compositor(cli: Cli) -> Result<()> {
    if getuid() != geteuid() {
        return Err(tatamiwm::TatamiError::FatalInit(
            "refusing to run with a setuid binary".into(),
        ));
    }

    let level = if cli.debug {
        Level::DEBUG
    } else if cli.verbose {
        Level::INFO
    } else {
        Level::WARN
    };
    logger::fmt()
        .with_max_level(level)
        .without_time()
        .with_file(false)
        .with_line_number(false)
        .try_init()
        .map_err(|e| tatamiwm::TatamiError::FatalInit(e.to_string()))?;

    if env::var("XKB_DEFAULT_LAYOUT").map(|v| v.is_empty()).unwrap_or(true) {
        env::set_var("XKB_DEFAULT_LAYOUT", "us");
    }

    // config parsing lives outside the core; -c/-C/-m select what the
    // parser would read
    let _ = (&cli.config, &cli.config_dir, cli.merge_config, cli.version);
    let config = Config::default();

    let event_loop: EventLoop<'static, Server<HeadlessConn>> = EventLoop::try_new()
        .map_err(|e| tatamiwm::TatamiError::FatalInit(e.to_string()))?;
    let conn = HeadlessConn::with_output(Rect::new(0, 0, 1920, 1080));

    let mut server = Server::new(conn, config, &event_loop);

    if let Some(command) = cli.startup {
        server.spawn_startup(command);
    }
    if let Some(command) = &cli.session {
        server.set_session_command(command)?;
    }

    server.run(event_loop)
}
