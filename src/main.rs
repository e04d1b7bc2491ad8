use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use codeden_lib::config::{Config, DEFAULT_CONFIG_FILE};
use codeden_lib::services::supervisor::PASSWORD_ENV;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

/// Self-hosted code editor backend.
#[derive(Debug, Parser)]
#[command(name = "codeden", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Serve the editor API
    Serve(ServeArgs),
    /// Host interactive terminal sessions over WebSocket
    TerminalHost(TerminalHostArgs),
}

#[derive(Debug, Args)]
struct ServeArgs {
    /// Configuration file; missing means defaults
    #[arg(long, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// Directory to confine files and commands to
    #[arg(long)]
    root: Option<PathBuf>,

    /// Address to listen on
    #[arg(long)]
    listen: Option<SocketAddr>,
}

#[derive(Debug, Args)]
struct TerminalHostArgs {
    #[arg(long, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// Overrides terminal.port
    #[arg(long)]
    port: Option<u16>,

    /// Overrides terminal.shell
    #[arg(long)]
    shell: Option<String>,

    /// Token required on the upgrade query; overrides the configured password
    #[arg(long, env = PASSWORD_ENV, hide_env_values = true)]
    password: Option<String>,
}

fn load_config(path: &Path) -> anyhow::Result<Config> {
    Config::load(path).with_context(|| format!("failed to load {}", path.display()))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    match Cli::parse().command {
        Command::Serve(args) => {
            let mut config = load_config(&args.config)?;
            if let Some(root) = args.root {
                config.root = root;
            }
            if let Some(listen) = args.listen {
                config.listen = listen;
            }
            let config_path = args.config.canonicalize().ok();
            codeden_lib::run_server(config, config_path).await
        }
        Command::TerminalHost(args) => {
            let config = load_config(&args.config)?;
            let port = args.port.unwrap_or(config.terminal.port);
            let shell = args.shell.unwrap_or_else(|| config.terminal.shell_program());
            let password = args
                .password
                .filter(|p| !p.is_empty())
                .or_else(|| config.password().map(str::to_string));
            codeden_lib::run_terminal_host(config, port, shell, password).await
        }
    }
}
