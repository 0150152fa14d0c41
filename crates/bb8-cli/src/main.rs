use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use bb8_common::{APP_NAME, Config, HostRef, logging};
use bb8_core::{Rejection, chunk_output, resolve};
use bb8_discord::{DISCORD_MESSAGE_LIMIT, DiscordGateway};
use bb8_exec::SshExecutor;
use bb8_gateway::{BotRuntime, DiscordPoller};
use clap::{Parser, Subcommand};
use tracing::info;

const DISCORD_HTTP_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Parser)]
#[command(name = "bb8", about = "Chat bot that runs configured commands over ssh", version)]
struct Cli {
    /// Config path (defaults to $BB8_CONFIG or ~/.bb8/config.toml).
    #[arg(short = 'c', long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Connect to Discord and answer commands in the configured channels.
    Serve,
    /// Compile the configuration and print a summary.
    Check,
    /// Resolve an action without executing it.
    Resolve {
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        action: Vec<String>,
    },
    /// Split text from a file or stdin into chat messages.
    Chunk {
        #[arg(long)]
        file: Option<PathBuf>,
        #[arg(long, default_value_t = 0)]
        max_symbols: usize,
        #[arg(long, default_value_t = 0)]
        max_chunks: usize,
    },
    /// Discord integration commands.
    Discord {
        #[command(subcommand)]
        command: DiscordCommand,
    },
}

#[derive(Debug, Subcommand)]
enum DiscordCommand {
    /// Validate the configured bot token with the Discord API.
    Status,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Some(Command::Serve) => serve(cli.config.as_deref()),
        Some(Command::Check) => check(cli.config.as_deref()),
        Some(Command::Resolve { action }) => resolve_action(cli.config.as_deref(), &action),
        Some(Command::Chunk {
            file,
            max_symbols,
            max_chunks,
        }) => chunk(file.as_deref(), max_symbols, max_chunks),
        Some(Command::Discord { command }) => discord(cli.config.as_deref(), command),
        None => {
            println!("{APP_NAME} CLI");
            println!("Run `bb8 check` to validate the configuration, then `bb8 serve`.");
            Ok(())
        }
    }
}

fn load_initialized_config(path: Option<&Path>) -> Result<Config> {
    let path = path
        .map(Path::to_path_buf)
        .unwrap_or_else(Config::resolve_path);
    let config = Config::load(&path).with_context(|| format!("error parsing '{}'", path.display()))?;
    logging::init(&config.settings().log_level);
    info!(config = %path.display(), "configuration loaded");
    Ok(config)
}

fn discord_token(config: &Config) -> Result<String> {
    std::env::var("DISCORD_BOT_TOKEN")
        .ok()
        .filter(|token| !token.trim().is_empty())
        .or_else(|| Some(config.settings().token.clone()).filter(|t| !t.trim().is_empty()))
        .ok_or_else(|| {
            anyhow::anyhow!("discord token missing: set DISCORD_BOT_TOKEN or settings.token")
        })
}

fn serve(path: Option<&Path>) -> Result<()> {
    let config = load_initialized_config(path)?;
    let channels = config.settings().polled_channels();
    if channels.is_empty() {
        bail!("serve needs a channel to read: set settings.pollChannels or settings.channels");
    }
    let poll_interval = config.settings().poll_interval;

    let gateway = DiscordGateway::new(&discord_token(&config)?, DISCORD_HTTP_TIMEOUT)?;
    let me = gateway.current_user()?;
    info!(bot_id = %me.id, bot_username = %me.username, "connected to discord");

    let runtime = BotRuntime::new(Arc::new(config), SshExecutor::new())
        .with_transport_limit(DISCORD_MESSAGE_LIMIT);
    let mut poller = DiscordPoller::new(&gateway, &runtime, me.id, channels);
    poller.run(poll_interval)
}

fn check(path: Option<&Path>) -> Result<()> {
    let config = load_initialized_config(path)?;
    print!("{}", describe_config(&config));
    Ok(())
}

fn describe_config(config: &Config) -> String {
    let settings = config.settings();
    let mut out = String::new();
    out.push_str(&format!("{APP_NAME} check: OK\n"));
    out.push_str(&format!("hosts: {}\n", config.hosts().len()));
    out.push_str(&format!("groups: {}\n", config.groups().len()));
    out.push_str(&format!("default_timeout: {:?}\n", settings.timeout));
    out.push_str(&format!(
        "max_symbols_per_message: {}\n",
        settings.max_symbols_per_message
    ));
    out.push_str(&format!("max_messages: {}\n", settings.max_messages));
    for group in config.groups() {
        let hosts: Vec<String> = group
            .host_refs()
            .iter()
            .map(|host_ref| match host_ref {
                HostRef::Known(_) => host_ref.id(config).to_string(),
                HostRef::Dangling(id) => format!("{id} (undeclared)"),
            })
            .collect();
        out.push_str(&format!(
            "- {}: {} commands, hosts [{}]\n",
            group.id,
            group.commands().len(),
            hosts.join(", ")
        ));
    }
    out
}

fn resolve_action(path: Option<&Path>, action: &[String]) -> Result<()> {
    let config = load_initialized_config(path)?;
    let action = action.join(" ");
    match resolve(&action, &config) {
        Ok(invocation) => {
            println!("host: {} ({})", invocation.host.id, invocation.host.socket_addr());
            println!("auth: {}", invocation.host.auth.kind());
            println!("timeout: {:?}", invocation.command.timeout);
            println!("command: {}", invocation.raw_command);
        }
        Err(Rejection::Help { scope, text }) => {
            println!("scope: {}", scope.as_str());
            println!("{text}");
        }
        Err(err @ Rejection::Format(_)) => return Err(err.into()),
    }
    Ok(())
}

fn chunk(file: Option<&Path>, max_symbols: usize, max_chunks: usize) -> Result<()> {
    logging::init("info");
    let text = match file {
        Some(path) => {
            fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?
        }
        None => {
            let mut buf = String::new();
            io::stdin()
                .read_to_string(&mut buf)
                .with_context(|| "failed to read stdin")?;
            buf
        }
    };
    let chunked = chunk_output(&text, max_symbols, max_chunks);
    for (idx, chunk) in chunked.chunks.iter().enumerate() {
        println!("--- chunk {} ({} symbols) ---", idx + 1, chunk.chars().count());
        println!("{chunk}");
    }
    println!("chunks: {}", chunked.chunks.len());
    println!("truncated: {}", chunked.truncated);
    Ok(())
}

fn discord(path: Option<&Path>, command: DiscordCommand) -> Result<()> {
    let config = load_initialized_config(path)?;
    let gateway = DiscordGateway::new(&discord_token(&config)?, DISCORD_HTTP_TIMEOUT)?;
    match command {
        DiscordCommand::Status => {
            let me = gateway.current_user()?;
            println!("discord_status: ok");
            println!("bot_id: {}", me.id);
            println!("bot_username: {}", me.username);
        }
    }
    Ok(())
}
