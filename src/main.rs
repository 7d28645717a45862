//! portgate - Firewall control plane
//!
//! Serves the port-management UI and API, and offers the same operations as
//! one-shot commands for operators on the host.
//!
//! # Usage
//!
//! ```bash
//! # Run the API server (default)
//! portgate
//! portgate --root /opt/firewall serve
//!
//! # One-shot commands
//! portgate status              # ONLINE / OFFLINE and controller phase
//! portgate ports               # Merged port list
//! portgate add 8080            # Open a port (firewall must be OFFLINE)
//! portgate del 8080            # Close a port
//! portgate start --iface eth0  # Start filtering
//! portgate stop                # Stop every filter instance
//! portgate init-config         # Write the default config file
//! ```

use clap::{Parser, Subcommand};
use portgate::api::{ApiServer, AppContext};
use portgate::config::{self, ControlConfig};
use portgate::core::ports::Port;
use portgate::core::well_known::service_name;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{info, warn};

shadow_rs::shadow!(build);

#[derive(Parser)]
#[command(name = "portgate")]
#[command(about = "Control plane for an eBPF/XDP port filter", long_about = None)]
#[command(version = build::PKG_VERSION, long_version = build::CLAP_LONG_VERSION)]
struct Cli {
    /// Config file (default: ~/.config/portgate/config.json if present)
    #[arg(short, long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Directory holding the filtering program, overriding `root_dir`
    #[arg(short, long, global = true, value_name = "DIR")]
    root: Option<PathBuf>,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP API server
    Serve,
    /// Show firewall status and controller phase
    Status,
    /// List the ports currently allowed
    Ports,
    /// Allow a port (firewall must be stopped)
    Add {
        /// Port number (1-65535)
        port: String,
    },
    /// Remove an allowed port (firewall must be stopped)
    Del {
        /// Port number (1-65535)
        port: String,
    },
    /// Start the filter on an interface
    Start {
        /// Network interface (default: `default_interface` from config)
        #[arg(short, long)]
        iface: Option<String>,
    },
    /// Stop every running filter instance
    Stop,
    /// Write the default configuration file
    InitConfig {
        /// Overwrite an existing file
        #[arg(short, long)]
        force: bool,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let command = cli.command.unwrap_or(Commands::Serve);

    let default_level = if matches!(command, Commands::Serve) {
        "info"
    } else {
        "warn"
    };
    init_tracing(cli.verbose, default_level);

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("Error: failed to create Tokio runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(handle_cli(command, cli.config, cli.root)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(verbose: u8, default_level: &str) {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    let filter = match verbose {
        0 => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        1 => EnvFilter::new("info"),
        2 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };

    // Ignore the error when a subscriber is already installed
    let _ = tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .try_init();
}

async fn load(
    config_path: Option<PathBuf>,
    root: Option<PathBuf>,
) -> Result<ControlConfig, Box<dyn std::error::Error>> {
    let mut config = config::load_config(config_path.as_deref()).await?;
    if let Some(root) = root {
        config.root_dir = root;
    }
    config.apply_env();
    Ok(config)
}

async fn handle_cli(
    command: Commands,
    config_path: Option<PathBuf>,
    root: Option<PathBuf>,
) -> Result<(), Box<dyn std::error::Error>> {
    if let Commands::InitConfig { force } = command {
        let path = config_path
            .or_else(config::default_config_path)
            .ok_or(config::ConfigError::ConfigDirUnavailable)?;
        let mut config = ControlConfig::default();
        if let Some(root) = root {
            config.root_dir = root;
        }
        config::save_config(&config, &path, force).await?;
        println!("✓ Wrote {}", path.display());
        return Ok(());
    }

    let ctx = Arc::new(AppContext::new(load(config_path, root).await?));

    match command {
        Commands::Serve => serve(ctx).await?,
        Commands::Status => {
            let status = ctx.controller.program().status().await;
            println!("Firewall: {status}");
            if let Some(iface) = ctx.controller.running_interface() {
                println!("Interface: {iface}");
            }
        }
        Commands::Ports => {
            let state = ctx.ports.merged_state().await;
            println!("Firewall: {}", state.status);
            println!("Allowed ports:");
            for port in state.ports {
                match service_name(port) {
                    Some(name) => println!("  {port:>5}  {name}"),
                    None => println!("  {port:>5}"),
                }
            }
        }
        Commands::Add { port } => {
            let port: Port = port.parse()?;
            let state = ctx.ports.add_port(port).await?;
            println!("✓ Port {port} allowed ({} ports open)", state.ports.len());
        }
        Commands::Del { port } => {
            let port: Port = port.parse()?;
            let state = ctx.ports.remove_port(port).await?;
            println!("✓ Port {port} removed ({} ports open)", state.ports.len());
        }
        Commands::Start { iface } => {
            let iface = iface.unwrap_or_else(|| ctx.config.default_interface.clone());
            let outcome = ctx.controller.start(&iface).await?;
            println!("✓ {} ({})", outcome.message, outcome.status);
        }
        Commands::Stop => {
            let outcome = ctx.controller.stop().await?;
            println!("{} ({})", outcome.message, outcome.status);
        }
        Commands::InitConfig { .. } => {}
    }
    Ok(())
}

async fn serve(ctx: Arc<AppContext>) -> Result<(), Box<dyn std::error::Error>> {
    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let server = ApiServer::bind(ctx.config.listen, ctx.clone(), shutdown_rx).await?;
    info!(
        "Managing {} from {}",
        ctx.config.program.display(),
        ctx.config.root_dir.display()
    );

    tokio::spawn(async move {
        wait_for_shutdown_signal().await;
        let _ = shutdown_tx.send(true);
    });

    server.run().await?;

    if ctx.controller.running_interface().is_some() {
        warn!("Exiting with the filter still running; `portgate stop` will find it");
    }
    Ok(())
}

async fn wait_for_shutdown_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    let mut terminate = match signal(SignalKind::terminate()) {
        Ok(s) => s,
        Err(e) => {
            warn!("Failed to install SIGTERM handler: {e}");
            let _ = tokio::signal::ctrl_c().await;
            return;
        }
    };

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = terminate.recv() => {}
    }
}
