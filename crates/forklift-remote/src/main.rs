//! Forklift remote console entry point.
//!
//! Drives the forklift rig's controller from a terminal.  The binary builds
//! one control session at startup (real or simulated), registers logging
//! subscribers on it, and then reads operator commands from stdin until
//! `quit`, end of input, or Ctrl+C.
//!
//! # Usage
//!
//! ```text
//! forklift-remote [OPTIONS]
//!
//! Options:
//!   --config <PATH>              Config file [default: platform config dir]
//!   --host <HOST>                Controller host [default: 192.168.4.1]
//!   --port <PORT>                Controller WebSocket port [default: 81]
//!   --simulate                   Use the simulated session (no controller)
//!   --connect-timeout-ms <MS>    Handshake timeout [default: 5000]
//!   --log-level <LEVEL>          Level when RUST_LOG is unset [default: info]
//!   --connect                    Connect immediately at startup
//!   --write-config               Save the effective config and exit
//! ```
//!
//! # Environment variable overrides
//!
//! | Variable            | Flag          |
//! |---------------------|---------------|
//! | `FORKLIFT_CONFIG`   | `--config`    |
//! | `FORKLIFT_HOST`     | `--host`      |
//! | `FORKLIFT_PORT`     | `--port`      |
//! | `FORKLIFT_SIMULATE` | `--simulate`  |
//!
//! Precedence: flag, then environment, then config file, then built-in
//! default.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use forklift_core::Endpoint;
use forklift_remote::application::{ControlSession, Session, SimulatedSession};
use forklift_remote::domain::config::{config_file_path, load_config, save_config, RemoteConfig};
use forklift_remote::infrastructure::console::{
    execute, parse_command, status_line, ConsoleCommand, ConsoleError, HELP,
};
use forklift_remote::infrastructure::websocket::WsTransport;

// ── CLI argument definitions ──────────────────────────────────────────────────

/// Remote control for the forklift rig.
#[derive(Debug, Parser)]
#[command(
    name = "forklift-remote",
    about = "Console remote control for the forklift rig's WebSocket controller",
    version
)]
struct Cli {
    /// Config file to load instead of the platform default.
    #[arg(long, env = "FORKLIFT_CONFIG")]
    config: Option<PathBuf>,

    /// Controller host or IP address.
    #[arg(long, env = "FORKLIFT_HOST")]
    host: Option<String>,

    /// Controller WebSocket port.
    #[arg(long, env = "FORKLIFT_PORT")]
    port: Option<u16>,

    /// Run against the simulated session instead of a controller.
    #[arg(long, env = "FORKLIFT_SIMULATE")]
    simulate: bool,

    /// Upper bound on the WebSocket handshake, in milliseconds.
    #[arg(long)]
    connect_timeout_ms: Option<u64>,

    /// `tracing` level used when `RUST_LOG` is not set.
    #[arg(long)]
    log_level: Option<String>,

    /// Connect to the configured endpoint right after startup.
    #[arg(long)]
    connect: bool,

    /// Write the effective configuration to the config file and exit.
    #[arg(long)]
    write_config: bool,
}

impl Cli {
    /// Overlays the flags that were given onto `config`.
    fn apply_to(&self, config: &mut RemoteConfig) {
        if let Some(host) = &self.host {
            config.device.host = host.clone();
        }
        if let Some(port) = self.port {
            config.device.port = port;
        }
        if self.simulate {
            config.session.simulate = true;
        }
        if let Some(ms) = self.connect_timeout_ms {
            config.session.connect_timeout_ms = ms;
        }
        if let Some(level) = &self.log_level {
            config.logging.log_level = level.clone();
        }
    }
}

/// Builds the one session this process will use.
fn build_session(config: &RemoteConfig, endpoint: Endpoint) -> Arc<dyn ControlSession> {
    if config.session.simulate {
        Arc::new(SimulatedSession::with_suppression(
            endpoint,
            config.session.suppress_repeated_movement,
        ))
    } else {
        let session_config = config.session_config();
        let transport = Arc::new(WsTransport::new(session_config.outbound_capacity));
        Arc::new(Session::new(transport, session_config, endpoint))
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = load_config(cli.config.as_deref()).context("failed to load configuration")?;
    cli.apply_to(&mut config);

    // ── Logging setup ─────────────────────────────────────────────────────────
    //
    // `RUST_LOG` wins; otherwise the configured level applies.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.logging.log_level)),
        )
        .init();

    if cli.write_config {
        let path = match &cli.config {
            Some(path) => path.clone(),
            None => config_file_path().context("no config path available")?,
        };
        save_config(&config, &path)
            .with_context(|| format!("failed to write config to {}", path.display()))?;
        println!("wrote {}", path.display());
        return Ok(());
    }

    let endpoint = config
        .endpoint()
        .context("invalid controller endpoint in configuration")?;

    info!(
        "forklift remote starting: endpoint={endpoint}, simulate={}",
        config.session.simulate
    );

    let session = build_session(&config, endpoint);

    session.on_connection_change(Box::new(|connected| {
        if connected {
            info!("controller connected");
        } else {
            warn!("controller disconnected");
        }
    }));
    session.on_state_change(Box::new(|t| {
        info!(
            "telemetry: movement ({:.2}, {:.2}), fork height {}",
            t.movement.x, t.movement.y, t.fork_height
        );
    }));

    println!("{HELP}");
    if cli.connect {
        spawn_connect(&session, ConsoleCommand::Connect {
            host: None,
            port: None,
        });
    }

    // ── Shell loop ────────────────────────────────────────────────────────────
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                if let Err(e) = signal {
                    warn!("failed to listen for Ctrl+C: {e}");
                }
                info!("received Ctrl+C; shutting down");
                break;
            }
            line = lines.next_line() => {
                let Some(line) = line.context("failed to read stdin")? else {
                    break;
                };
                match parse_command(&line) {
                    Ok(ConsoleCommand::Quit) => break,
                    // Connect runs in the background so `disconnect` can cancel it.
                    Ok(command @ ConsoleCommand::Connect { .. }) => spawn_connect(&session, command),
                    Ok(command) => println!("{}", execute(session.as_ref(), command).await.render()),
                    Err(ConsoleError::Empty) => {}
                    Err(e) => println!("error: {e}"),
                }
            }
        }
    }

    shut_down(session.as_ref());
    println!("{}", status_line(session.as_ref()));
    info!("forklift remote stopped");
    Ok(())
}

/// Leaves the machine stopped and the link closed.
fn shut_down(session: &dyn ControlSession) {
    if session.is_connected() {
        if let Err(e) = session.release_movement() {
            warn!("stop command not sent before shutdown: {e}");
        }
    }
    session.disconnect();
}

fn spawn_connect(session: &Arc<dyn ControlSession>, command: ConsoleCommand) {
    let session = Arc::clone(session);
    tokio::spawn(async move {
        println!("{}", execute(session.as_ref(), command).await.render());
    });
}

// ── Tests ─────────────────────────────────────────────────────────────────────
