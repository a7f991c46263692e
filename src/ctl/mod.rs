//! The out-of-band control channel.
//!
//! A running compositor exports its PID in `LABWC_PID`. Control
//! invocations of the same binary write a command line into a file in
//! `$XDG_RUNTIME_DIR` and signal the server with `SIGUSR1`; the
//! server reads each command file once, best-effort, and dispatches.
//! Query commands read status files the server keeps rewritten.
//!
//! The `labwc-*` file and variable names are the published script
//! interface of the compositor family this core descends from and are
//! kept verbatim so existing scripts continue to work.

use std::env;
use std::fs;
use std::path::PathBuf;
use std::str::FromStr;

use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;

use tracing::{debug, warn};

use crate::bindings::Toggle;
use crate::tiling::TilingStatus;
use crate::{Result, TatamiError};

/// Environment variable carrying the server's PID.
pub const PID_ENV: &str = "LABWC_PID";
/// Environment variable carrying the server's version string.
pub const VERSION_ENV: &str = "LABWC_VER";

const KEYBIND_CMD_FILE: &str = "labwc-keybind-cmd";
const WORKSPACE_CMD_FILE: &str = "labwc-workspace-cmd";
const TILING_CMD_FILE: &str = "labwc-tiling-cmd";
const WORKSPACE_STATUS_FILE: &str = "labwc-workspace-current";
const TILING_STATUS_FILE: &str = "labwc-tiling-status";

/// The three command files a control invocation can write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandFamily {
    Keybind,
    Workspace,
    Tiling,
}

impl CommandFamily {
    fn file_name(self) -> &'static str {
        match self {
            CommandFamily::Keybind => KEYBIND_CMD_FILE,
            CommandFamily::Workspace => WORKSPACE_CMD_FILE,
            CommandFamily::Tiling => TILING_CMD_FILE,
        }
    }
}

/// A parsed control-channel command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CtlCommand {
    Keybind(KeybindCmd),
    Workspace(WorkspaceCmd),
    Tiling(TilingCmd),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeybindCmd {
    Enable(String),
    Disable(String),
    Toggle(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkspaceCmd {
    Switch(String),
    Next,
    Prev,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TilingCmd {
    Enable,
    Disable,
    Toggle,
    GridMode(Toggle),
    Recalculate,
}

/// Parses one line of a command file. Returns None for lines the
/// server does not recognize; those are ignored.
pub fn parse_line(family: CommandFamily, line: &str) -> Option<CtlCommand> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    let mut words = line.split_whitespace();
    let verb = words.next()?;

    match family {
        CommandFamily::Keybind => {
            let id = words.next()?.to_string();
            match verb {
                "enable" => Some(CtlCommand::Keybind(KeybindCmd::Enable(id))),
                "disable" => Some(CtlCommand::Keybind(KeybindCmd::Disable(id))),
                "toggle" => Some(CtlCommand::Keybind(KeybindCmd::Toggle(id))),
                _ => None,
            }
        }
        CommandFamily::Workspace => match verb {
            "switch" => {
                let target = line["switch".len()..].trim();
                if target.is_empty() {
                    None
                } else {
                    Some(CtlCommand::Workspace(WorkspaceCmd::Switch(target.into())))
                }
            }
            "next" => Some(CtlCommand::Workspace(WorkspaceCmd::Next)),
            "prev" => Some(CtlCommand::Workspace(WorkspaceCmd::Prev)),
            _ => None,
        },
        CommandFamily::Tiling => match verb {
            "enable" => Some(CtlCommand::Tiling(TilingCmd::Enable)),
            "disable" => Some(CtlCommand::Tiling(TilingCmd::Disable)),
            "toggle" => Some(CtlCommand::Tiling(TilingCmd::Toggle)),
            "grid-mode" => {
                let setting = Toggle::from_str(words.next()?).ok()?;
                Some(CtlCommand::Tiling(TilingCmd::GridMode(setting)))
            }
            "recalculate" => Some(CtlCommand::Tiling(TilingCmd::Recalculate)),
            _ => None,
        },
    }
}

fn runtime_dir() -> Result<PathBuf> {
    env::var("XDG_RUNTIME_DIR")
        .map(PathBuf::from)
        .map_err(|_| TatamiError::Io("XDG_RUNTIME_DIR is not set".into()))
}

fn runtime_path(file: &str) -> Result<PathBuf> {
    Ok(runtime_dir()?.join(file))
}

//* Server side

/// Reads and removes every command file, returning the commands in
/// file order. Unreadable files and unrecognized lines are skipped.
pub fn drain_commands() -> Vec<CtlCommand> {
    let mut commands = Vec::new();
    for family in [
        CommandFamily::Keybind,
        CommandFamily::Workspace,
        CommandFamily::Tiling,
    ]
    .iter()
    {
        let path = match runtime_path(family.file_name()) {
            Ok(p) => p,
            Err(e) => {
                warn!("{}", e);
                return commands;
            }
        };
        let contents = match fs::read_to_string(&path) {
            Ok(c) => c,
            Err(_) => continue,
        };
        if let Err(e) = fs::remove_file(&path) {
            debug!("could not remove {}: {}", path.display(), e);
        }
        for line in contents.lines() {
            match parse_line(*family, line) {
                Some(cmd) => commands.push(cmd),
                None => {
                    if !line.trim().is_empty() {
                        warn!("ignoring unrecognized control command: {}", line);
                    }
                }
            }
        }
    }
    commands
}

/// Rewrites the active-workspace status file.
pub fn write_workspace_status(name: &str) -> Result<()> {
    let path = runtime_path(WORKSPACE_STATUS_FILE)?;
    fs::write(path, format!("{}\n", name))?;
    Ok(())
}

/// Rewrites the tiling status file.
pub fn write_tiling_status(status: TilingStatus) -> Result<()> {
    let path = runtime_path(TILING_STATUS_FILE)?;
    fs::write(path, format!("{}\n", status))?;
    Ok(())
}

//* Client side

/// The PID of the running server, from the environment.
pub fn server_pid() -> Result<i32> {
    let pid = env::var(PID_ENV)
        .map_err(|_| TatamiError::Io(format!("{} is not set; is the compositor running?", PID_ENV)))?;
    pid.trim()
        .parse()
        .map_err(|_| TatamiError::Io(format!("{} does not contain a PID", PID_ENV)))
}

/// Writes a command line into the family's file and signals the
/// server with `SIGUSR1`.
///
/// The file is written whole and closed before the signal is sent, so
/// the server never observes a partial command.
pub fn send_command(family: CommandFamily, line: &str) -> Result<()> {
    let pid = server_pid()?;
    let path = runtime_path(family.file_name())?;
    fs::write(&path, format!("{}\n", line))?;
    signal_server(pid, Signal::SIGUSR1)
}

/// Sends a bare signal to the server (`SIGHUP` for reconfigure,
/// `SIGTERM` for shutdown).
pub fn send_signal(signal: Signal) -> Result<()> {
    signal_server(server_pid()?, signal)
}

fn signal_server(pid: i32, signal: Signal) -> Result<()> {
    kill(Pid::from_raw(pid), signal)
        .map_err(|e| TatamiError::Io(format!("could not signal PID {}: {}", pid, e)))
}

/// Reads the active workspace name from the status file.
pub fn read_workspace_current() -> Result<String> {
    let path = runtime_path(WORKSPACE_STATUS_FILE)?;
    Ok(fs::read_to_string(path)?.trim_end().to_string())
}

/// Reads the tiling status from the status file.
pub fn read_tiling_status() -> Result<String> {
    let path = runtime_path(TILING_STATUS_FILE)?;
    Ok(fs::read_to_string(path)?.trim_end().to_string())
}

// the runtime dir comes from the environment, which is
// process-global; every test that touches it takes this lock
#[cfg(test)]
pub(crate) static ENV_LOCK: std::sync::Mutex<()> = std::sync::Mutex::new(());

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_keybind_lines() {
        assert_eq!(
            parse_line(CommandFamily::Keybind, "enable mute"),
            Some(CtlCommand::Keybind(KeybindCmd::Enable("mute".into())))
        );
        assert_eq!(
            parse_line(CommandFamily::Keybind, "toggle vol-up"),
            Some(CtlCommand::Keybind(KeybindCmd::Toggle("vol-up".into())))
        );
        assert_eq!(parse_line(CommandFamily::Keybind, "enable"), None);
        assert_eq!(parse_line(CommandFamily::Keybind, "frobnicate x"), None);
    }

    #[test]
    fn parse_workspace_lines() {
        assert_eq!(
            parse_line(CommandFamily::Workspace, "switch 2"),
            Some(CtlCommand::Workspace(WorkspaceCmd::Switch("2".into())))
        );
        assert_eq!(
            parse_line(CommandFamily::Workspace, "switch web mail"),
            Some(CtlCommand::Workspace(WorkspaceCmd::Switch("web mail".into())))
        );
        assert_eq!(
            parse_line(CommandFamily::Workspace, "next"),
            Some(CtlCommand::Workspace(WorkspaceCmd::Next))
        );
        assert_eq!(parse_line(CommandFamily::Workspace, "switch"), None);
    }

    #[test]
    fn parse_tiling_lines() {
        assert_eq!(
            parse_line(CommandFamily::Tiling, "grid-mode toggle"),
            Some(CtlCommand::Tiling(TilingCmd::GridMode(Toggle::Toggle)))
        );
        assert_eq!(
            parse_line(CommandFamily::Tiling, "recalculate"),
            Some(CtlCommand::Tiling(TilingCmd::Recalculate))
        );
        assert_eq!(parse_line(CommandFamily::Tiling, "grid-mode sideways"), None);
        assert_eq!(parse_line(CommandFamily::Tiling, ""), None);
    }

    #[test]
    fn drain_reads_once_and_removes() {
        let _guard = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        let dir = tempfile::tempdir().unwrap();
        std::env::set_var("XDG_RUNTIME_DIR", dir.path());

        let path = dir.path().join(KEYBIND_CMD_FILE);
        fs::write(&path, "enable mute\nbogus line\n").unwrap();

        let cmds = drain_commands();
        assert_eq!(
            cmds,
            vec![CtlCommand::Keybind(KeybindCmd::Enable("mute".into()))]
        );
        assert!(!path.exists());

        // a second drain sees nothing
        assert!(drain_commands().is_empty());
    }

    #[test]
    fn status_files_round_trip() {
        let _guard = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        let dir = tempfile::tempdir().unwrap();
        std::env::set_var("XDG_RUNTIME_DIR", dir.path());

        write_workspace_status("web").unwrap();
        assert_eq!(read_workspace_current().unwrap(), "web");

        write_tiling_status(TilingStatus::Smart).unwrap();
        assert_eq!(read_tiling_status().unwrap(), "smart");
        write_tiling_status(TilingStatus::Stacking).unwrap();
        assert_eq!(read_tiling_status().unwrap(), "stacking");
    }
}
