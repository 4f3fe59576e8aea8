//! linkbot: URL titles, repost call-outs and weather for IRC channels.
//!
//! Reads `~/.config/linkbot/linkbot.toml` (see `--config`), connects, joins
//! the configured channels and reconnects on its own.
//!
//! Commands (default prefix `.`):
//!
//!   .weather [city]   Current weather
//!   .help             List commands

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use linkbot_sdk::bot::Bot;
use linkbot_sdk::client::{self, ClientHandle, ConnectConfig, ReconnectConfig};
use linkbot_sdk::event::Event;

use linkbot_plugins::config::Config;
use linkbot_plugins::links::{self, Classifier, Shortener};
use linkbot_plugins::pagetitle::{self, PageTitle};
use linkbot_plugins::registry::SqliteRegistry;
use linkbot_plugins::urlnazi::{self, UrlNazi};
use linkbot_plugins::weather::{self, Weather};

#[derive(Parser)]
#[command(name = "linkbot", about = "URL title, repost and weather bot for IRC")]
struct Args {
    /// Config file (default: ~/.config/linkbot/linkbot.toml)
    #[arg(long)]
    config: Option<PathBuf>,

    /// IRC server address (host:port)
    #[arg(long)]
    server: Option<String>,

    /// Bot nick
    #[arg(long)]
    nick: Option<String>,

    /// Channel to join (repeatable; replaces the configured list)
    #[arg(long = "channel")]
    channels: Vec<String>,

    /// Use TLS
    #[arg(long)]
    tls: bool,

    /// URL registry database path
    #[arg(long)]
    database: Option<PathBuf>,

    /// OpenWeatherMap API key
    #[arg(long, env = "OPENWEATHERMAP_API_KEY", hide_env_values = true)]
    weather_api_key: Option<String>,
}

impl Args {
    /// CLI flags win over the config file.
    fn apply(self, mut config: Config) -> Config {
        if let Some(server) = self.server {
            config.server = server;
        }
        if let Some(nick) = self.nick {
            config.nick = nick;
        }
        if !self.channels.is_empty() {
            config.channels = self.channels;
        }
        if self.tls {
            config.tls = true;
        }
        if let Some(database) = self.database {
            config.database = database;
        }
        if self.weather_api_key.is_some() {
            config.weather.api_key = self.weather_api_key;
        }
        config
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "linkbot=info,linkbot_plugins=info,linkbot_sdk=info".into()),
        )
        .init();

    let args = Args::parse();
    let config = Config::load(args.config.as_deref()).context("Failed to load config")?;
    let config = Arc::new(args.apply(config));

    let bot = Arc::new(build_bot(&config)?);

    tracing::info!(
        server = %config.server,
        nick = %config.nick,
        network = %config.network,
        channels = ?config.channels,
        hooks = bot.regex_hooks().len(),
        "Starting linkbot"
    );

    let connect = ConnectConfig {
        server_addr: config.server.clone(),
        nick: config.nick.clone(),
        user: config.nick.clone(),
        realname: config.realname.clone(),
        tls: config.tls,
        password: config.password.clone(),
    };
    let reconnect = ReconnectConfig {
        channels: config.channels.clone(),
        ..Default::default()
    };

    client::run_with_reconnect(connect, reconnect, move |handle: ClientHandle, event: Event| {
        let bot = bot.clone();
        Box::pin(async move {
            match &event {
                Event::Registered { nick } => tracing::info!(nick, "Registered"),
                Event::Joined { channel, nick } if *nick == bot.nick() => {
                    tracing::info!(channel, "Joined");
                }
                Event::Disconnected { reason } => tracing::warn!(reason, "Disconnected"),
                _ => {}
            }
            bot.handle_event(&handle, &event);
            Ok(())
        })
    })
    .await
}

/// Wire the enabled plugins into a bot.
fn build_bot(config: &Config) -> Result<Bot> {
    let mut bot = Bot::new(&config.command_prefix, &config.nick, &config.network);
    if config.plugins.url_plugins_overlap() {
        tracing::warn!("urlnazi and pagetitle are both enabled; they yield URLs to each other and neither will reply");
    }
    let http = links::http_client(&config.http).context("Failed to build HTTP client")?;
    let classifier = Classifier::new(http.clone(), config.http.max_body_bytes);
    let shortener = Shortener::new(http.clone(), &config.shortener);

    if config.plugins.urlnazi {
        if let Some(parent) = config.database.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let registry = SqliteRegistry::open(&config.database)
            .with_context(|| format!("Failed to open {}", config.database.display()))?;
        let plugin = UrlNazi::new(
            classifier.clone(),
            shortener.clone(),
            Arc::new(registry),
            config.shortener.fallback_to_long_url,
        );
        urlnazi::register(&mut bot, Arc::new(plugin))?;
        tracing::info!(database = %config.database.display(), "Loaded urlnazi");
    }

    if config.plugins.pagetitle {
        pagetitle::register(&mut bot, Arc::new(PageTitle::new(classifier, shortener)))?;
        tracing::info!("Loaded pagetitle");
    }

    if config.plugins.weather {
        if config.weather.api_key.is_none() {
            tracing::warn!("No weather API key configured; weather lookups will fail");
        }
        weather::register(&mut bot, Arc::new(Weather::new(http, config.weather.clone())));
        tracing::info!("Loaded weather");
    }

    Ok(bot)
}
