//! Supervisor: loads config, wires up the store/topology/filter/platform
//! clients, and runs the Worker and delete poller to completion (spec.md
//! §5 "Concurrency & Lifecycle").

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use meshrelay::channel_id::{ChannelId, Platform};
use meshrelay::config::{resolve_config_path, BridgeConfig};
use meshrelay::filter::Filter;
use meshrelay::platform::discord::DiscordPlatform;
use meshrelay::platform::irc::IrcPlatform;
use meshrelay::platform::telegram::TelegramPlatform;
use meshrelay::platform::MessagingPlatform;
use meshrelay::queue;
use meshrelay::store::MessageStore;
use meshrelay::topology::Topology;
use meshrelay::worker::Worker;
use meshrelay::{filter::FilterConfig, poller};

#[derive(Parser, Debug)]
#[command(name = "meshrelay", about = "Relay engine for an IRC/Telegram/Discord chat bridge")]
struct Cli {
    /// Path to the bridge TOML config. Defaults to `bridge.toml` in the
    /// current directory, falling back to the XDG config directory if that
    /// doesn't exist.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Path to the filter rule document (spec.md §6.1). Same resolution
    /// rule as `--config`.
    #[arg(long)]
    filters: Option<PathBuf>,

    /// Overrides `Logging.level` from the config.
    #[arg(long)]
    log_level: Option<String>,
}

fn init_logging(level: &str) {
    use tracing_subscriber::{fmt, EnvFilter};
    let filter = EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).with_target(false).init();
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config_path = resolve_config_path(cli.config.as_deref(), "bridge.toml");
    let config = BridgeConfig::load(&config_path).context("loading bridge config")?;
    init_logging(cli.log_level.as_deref().unwrap_or(&config.logging.level));

    let filters_path = resolve_config_path(cli.filters.as_deref(), "filters.toml");
    let filter_config = FilterConfig::load(&filters_path).unwrap_or_default();

    let groups: Vec<Vec<ChannelId>> = config
        .bridge
        .groups
        .iter()
        .map(|group| {
            group
                .iter()
                .filter_map(|raw| ChannelId::parse(raw).map_err(|err| tracing::warn!(%raw, error = %err, "skipping unparsable channel id in bridge topology")).ok())
                .collect()
        })
        .collect();
    let topology = Arc::new(Topology::from_groups(&groups));

    let store = Arc::new(MessageStore::open(&config.store).context("opening message store")?);
    let filter = Arc::new(Filter::compile(&filter_config, config.spam_check.clone()).context("compiling filter rules")?);

    let (tx, rx) = queue::channel();

    let mut platforms: HashMap<Platform, Arc<dyn MessagingPlatform>> = HashMap::new();
    let mut irc_commands: Option<Arc<IrcPlatform>> = None;

    if let Some(irc_config) = &config.irc {
        let irc_groups: Vec<ChannelId> = groups.iter().flatten().filter(|c| c.platform() == Platform::Irc).cloned().collect();
        if !irc_groups.is_empty() {
            let irc = IrcPlatform::connect(irc_config.clone(), irc_groups, tx.clone())
                .await
                .context("connecting irc client")?;
            let irc = Arc::new(irc);
            irc_commands = Some(irc.clone());
            platforms.insert(Platform::Irc, irc as Arc<dyn MessagingPlatform>);
        }
    }

    let mut telegram_client: Option<Arc<TelegramPlatform>> = None;
    if let Some(telegram_config) = &config.telegram {
        let telegram = TelegramPlatform::connect(telegram_config.clone(), tx.clone(), store.clone())
            .await
            .context("connecting telegram client")?;
        let telegram = Arc::new(telegram);
        telegram_client = Some(telegram.clone());
        platforms.insert(Platform::Telegram, telegram as Arc<dyn MessagingPlatform>);
    }

    if let Some(discord_config) = &config.discord {
        let discord = DiscordPlatform::connect(discord_config.clone(), tx.clone(), store.clone())
            .await
            .context("connecting discord client")?;
        platforms.insert(Platform::Discord, Arc::new(discord));
    }

    let worker = Worker::new(topology.clone(), store.clone(), filter, platforms, irc_commands);
    let worker_handle = tokio::spawn(worker.run(rx));

    let poller_handle = telegram_client.map(|telegram| {
        let telegram_groups: Vec<ChannelId> = groups.iter().flatten().filter(|c| c.platform() == Platform::Telegram).cloned().collect();
        tokio::spawn(poller::run(telegram, store.clone(), tx.clone(), telegram_groups))
    });

    tracing::info!("meshrelay started");

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutdown signal received");
        }
        result = worker_handle => {
            if let Err(err) = result {
                tracing::error!(error = %err, "worker task panicked");
            }
        }
    }

    if let Some(handle) = poller_handle {
        handle.abort();
    }

    Ok(())
}
