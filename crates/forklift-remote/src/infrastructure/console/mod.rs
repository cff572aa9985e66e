//! Line-oriented console shell: the text stand-in for the touch UI.
//!
//! # Commands
//!
//! ```text
//! connect [host] [port]   connect (defaults: the session's endpoint)
//! move <x> <y>            joystick sample, each axis in [-1, 1]
//! release                 joystick released: send the stop vector
//! fork up|down            one fork step
//! status                  connection state and last telemetry
//! disconnect              close the link or cancel a pending connect
//! help                    this text
//! quit                    leave the shell
//! ```
//!
//! Parsing is pure ([`parse_command`]); execution ([`execute`]) only calls
//! `ControlSession` operations and reports the result as a
//! [`CommandOutcome`], the same success/data/error envelope for every
//! command.  Like the touch UI, the shell owns no protocol knowledge.

use forklift_core::{ConnectionState, Endpoint, ForkDelta};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::application::ControlSession;
use crate::domain::errors::ConnectError;

pub const HELP: &str = "\
commands:
  connect [host] [port]   connect to the controller
  move <x> <y>            drive vector, each axis in [-1, 1]
  release                 stop (joystick released)
  fork up|down            one fork step
  status                  connection and telemetry
  disconnect              close the connection
  help                    show this text
  quit                    exit";

// ── Parsing ───────────────────────────────────────────────────────────────────

/// One parsed console line.
#[derive(Debug, Clone, PartialEq)]
pub enum ConsoleCommand {
    /// Host and port as typed; `None` means "use the session's endpoint".
    Connect {
        host: Option<String>,
        port: Option<String>,
    },
    Move {
        x: f64,
        y: f64,
    },
    Release,
    Fork(ForkDelta),
    Status,
    Disconnect,
    Help,
    Quit,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConsoleError {
    #[error("empty line")]
    Empty,

    #[error("unknown command '{0}' (try 'help')")]
    UnknownCommand(String),

    #[error("usage: {0}")]
    Usage(&'static str),

    #[error("'{0}' is not a number")]
    InvalidNumber(String),

    #[error("fork direction must be 'up' or 'down', got '{0}'")]
    InvalidForkDirection(String),
}

/// Parses one console line.  Command words are case-insensitive.
///
/// # Errors
///
/// Returns [`ConsoleError`] for blank lines, unknown words, wrong argument
/// counts and unparsable numbers.  Port text is validated later, when the
/// endpoint is built.
pub fn parse_command(line: &str) -> Result<ConsoleCommand, ConsoleError> {
    let mut words = line.split_whitespace();
    let Some(head) = words.next() else {
        return Err(ConsoleError::Empty);
    };
    let args: Vec<&str> = words.collect();

    match head.to_ascii_lowercase().as_str() {
        "connect" | "c" => match args.as_slice() {
            [] => Ok(ConsoleCommand::Connect {
                host: None,
                port: None,
            }),
            [host] => Ok(ConsoleCommand::Connect {
                host: Some((*host).to_string()),
                port: None,
            }),
            [host, port] => Ok(ConsoleCommand::Connect {
                host: Some((*host).to_string()),
                port: Some((*port).to_string()),
            }),
            _ => Err(ConsoleError::Usage("connect [host] [port]")),
        },
        "move" | "m" => match args.as_slice() {
            [x, y] => Ok(ConsoleCommand::Move {
                x: parse_axis(x)?,
                y: parse_axis(y)?,
            }),
            _ => Err(ConsoleError::Usage("move <x> <y>")),
        },
        "release" | "stop" => no_args(&args, ConsoleCommand::Release, "release"),
        "fork" | "f" => match args.as_slice() {
            [dir] => match dir.to_ascii_lowercase().as_str() {
                "up" | "+" => Ok(ConsoleCommand::Fork(ForkDelta::Up)),
                "down" | "-" => Ok(ConsoleCommand::Fork(ForkDelta::Down)),
                _ => Err(ConsoleError::InvalidForkDirection((*dir).to_string())),
            },
            _ => Err(ConsoleError::Usage("fork up|down")),
        },
        "status" | "s" => no_args(&args, ConsoleCommand::Status, "status"),
        "disconnect" | "d" => no_args(&args, ConsoleCommand::Disconnect, "disconnect"),
        "help" | "?" => Ok(ConsoleCommand::Help),
        "quit" | "exit" | "q" => Ok(ConsoleCommand::Quit),
        other => Err(ConsoleError::UnknownCommand(other.to_string())),
    }
}

fn parse_axis(text: &str) -> Result<f64, ConsoleError> {
    text.parse::<f64>()
        .map_err(|_| ConsoleError::InvalidNumber(text.to_string()))
}

fn no_args(
    args: &[&str],
    command: ConsoleCommand,
    usage: &'static str,
) -> Result<ConsoleCommand, ConsoleError> {
    if args.is_empty() {
        Ok(command)
    } else {
        Err(ConsoleError::Usage(usage))
    }
}

// ── Execution ─────────────────────────────────────────────────────────────────

/// Result envelope for every console command.
///
/// ```json
/// { "success": true,  "data": "connected to 192.168.4.1:81", "error": null }
/// { "success": false, "data": null, "error": "not connected to the controller" }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandOutcome {
    pub success: bool,
    pub data: Option<String>,
    pub error: Option<String>,
}

impl CommandOutcome {
    pub fn ok(data: impl Into<String>) -> Self {
        Self {
            success: true,
            data: Some(data.into()),
            error: None,
        }
    }

    pub fn err(msg: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(msg.into()),
        }
    }

    /// One line for the terminal.
    pub fn render(&self) -> String {
        match (&self.data, &self.error) {
            (_, Some(error)) => format!("error: {error}"),
            (Some(data), None) => data.clone(),
            (None, None) => String::new(),
        }
    }
}

/// Runs `command` against `session`.
///
/// [`ConsoleCommand::Quit`] is a no-op here; the shell loop handles it.
pub async fn execute(session: &dyn ControlSession, command: ConsoleCommand) -> CommandOutcome {
    match command {
        ConsoleCommand::Connect { host, port } => {
            let current = session.endpoint();
            let host = host.unwrap_or_else(|| current.host().to_string());
            let port = port.unwrap_or_else(|| current.port().to_string());
            let endpoint = match Endpoint::parse(&host, &port) {
                Ok(endpoint) => endpoint,
                Err(e) => return CommandOutcome::err(ConnectError::from(e).to_string()),
            };
            match session.connect(endpoint.host(), endpoint.port()).await {
                Ok(()) => CommandOutcome::ok(format!("connected to {endpoint}")),
                Err(e) => CommandOutcome::err(e.to_string()),
            }
        }
        ConsoleCommand::Move { x, y } => match session.send_movement(x, y) {
            Ok(()) => {
                let m = session.telemetry().movement;
                CommandOutcome::ok(format!("moving ({:.2}, {:.2})", m.x, m.y))
            }
            Err(e) => CommandOutcome::err(e.to_string()),
        },
        ConsoleCommand::Release => match session.release_movement() {
            Ok(()) => CommandOutcome::ok("stopped"),
            Err(e) => CommandOutcome::err(e.to_string()),
        },
        ConsoleCommand::Fork(delta) => match session.send_fork(delta) {
            Ok(()) => CommandOutcome::ok(format!(
                "fork {} (height {})",
                if delta == ForkDelta::Up { "up" } else { "down" },
                session.telemetry().fork_height
            )),
            Err(e) => CommandOutcome::err(e.to_string()),
        },
        ConsoleCommand::Status => CommandOutcome::ok(status_line(session)),
        ConsoleCommand::Disconnect => {
            let was = session.connection_state();
            session.disconnect();
            if was.is_disconnected() {
                CommandOutcome::ok("already disconnected")
            } else {
                CommandOutcome::ok("disconnected")
            }
        }
        ConsoleCommand::Help => CommandOutcome::ok(HELP),
        ConsoleCommand::Quit => CommandOutcome::ok("bye"),
    }
}

/// One-line summary of connection state and telemetry.
pub fn status_line(session: &dyn ControlSession) -> String {
    let t = session.telemetry();
    let link = match session.connection_state() {
        ConnectionState::Connected { endpoint, since } => {
            format!("connected to {endpoint} for {}s", since.elapsed().as_secs())
        }
        ConnectionState::Connecting { endpoint } => format!("connecting to {endpoint}"),
        ConnectionState::Failed { reason } => format!("failed: {reason}"),
        ConnectionState::Disconnected => match session.last_connection_loss() {
            Some(loss) => format!("disconnected (endpoint {}, {loss})", session.endpoint()),
            None => format!("disconnected (endpoint {})", session.endpoint()),
        },
    };
    format!(
        "{link} | movement ({:.2}, {:.2}) | fork height {}",
        t.movement.x, t.movement.y, t.fork_height
    )
}

// ── Tests ─────────────────────────────────────────────────────────────────────
