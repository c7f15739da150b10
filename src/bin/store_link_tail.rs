//! store-link-tail - follow the real-time event stream from a terminal
//!
//! # Usage
//!
//! ```bash
//! # Tail order and inventory events
//! store-link-tail -u https://api.shop.example/realtime --topic orders --topic inventory
//!
//! # Settings from a file, token from $STORE_LINK_TOKEN
//! store-link-tail --config store-link.toml --topic drop:summer-24
//! ```
//!
//! Every inbound event is printed to stdout as one JSON line. Logs go to
//! stderr.

use std::path::PathBuf;

use clap::Parser;
use serde_json::json;
use tracing_subscriber::EnvFilter;

use store_link::{
    EventHandlers, EventKind, LinkEvent, Result, StoreLinkClient, StoreLinkConfig, StoreLinkError,
    Topic, TopicFilter,
};

/// Events printed when no `--event` is given.
const DEFAULT_EVENTS: &[&str] = &[
    "session",
    "error",
    "order:created",
    "order:updated",
    "order:status",
    "drop:updated",
    "drop:stock",
    "drop:started",
    "drop:ended",
    "inventory:updated",
    "inventory:low_stock",
    "ticket:created",
    "ticket:updated",
    "ticket:message",
    "kpi:updated",
    "system:health",
    "notification",
    "shop:updated",
    "image:sync",
    "bot:stats",
    "bot:verification",
    "bot:invite_code",
];

/// Follow store-link events from a terminal
#[derive(Parser, Debug)]
#[command(name = "store-link-tail")]
#[command(version)]
#[command(about = "Follow store-link real-time events", long_about = None)]
struct Cli {
    /// Config file (TOML)
    #[arg(short = 'c', long = "config")]
    config: Option<PathBuf>,

    /// Server URL (overrides the config file)
    #[arg(short = 'u', long = "url")]
    url: Option<String>,

    /// Bearer token (default: read from the configured token variable)
    #[arg(long = "token")]
    token: Option<String>,

    /// Topic to subscribe to once connected, e.g. `orders` or `ticket:T-12`
    #[arg(short = 't', long = "topic")]
    topics: Vec<Topic>,

    /// Event name to print (default: all known domain events)
    #[arg(short = 'e', long = "event")]
    events: Vec<String>,

    /// Log level (overrides the config file)
    #[arg(long = "log-level")]
    log_level: Option<String>,

    /// Emit logs as JSON lines
    #[arg(long = "json")]
    json: bool,
}

fn init_logging(level: &str, json: bool) -> Result<()> {
    // Route the library's `log` records through tracing
    tracing_log::LogTracer::init().ok();

    let filter = EnvFilter::try_new(format!("{},tokio_tungstenite=warn,tungstenite=warn", level))
        .map_err(|e| {
            StoreLinkError::ConfigurationError(format!("Invalid log level '{}': {}", level, e))
        })?;

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.compact().init();
    }
    Ok(())
}

fn load_config(cli: &Cli) -> Result<StoreLinkConfig> {
    let mut config = match (&cli.config, &cli.url) {
        (Some(path), _) => StoreLinkConfig::from_file(path)?,
        (None, Some(url)) => StoreLinkConfig::new(url.clone()),
        (None, None) => {
            return Err(StoreLinkError::ConfigurationError(
                "either --config or --url is required".to_string(),
            ));
        },
    };
    config.apply_env_overrides()?;

    if let Some(url) = &cli.url {
        config.url = url.clone();
    }
    if let Some(level) = &cli.log_level {
        config.logging.level = level.clone();
    }
    if cli.json {
        config.logging.format = "json".to_string();
    }
    config.validate()?;
    Ok(config)
}

fn print_event(event: &LinkEvent) {
    if let LinkEvent::Server { kind, payload } = event {
        println!("{}", json!({ "event": kind.as_str(), "data": payload }));
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli)?;
    init_logging(&config.logging.level, config.logging.format == "json")?;

    let handlers = EventHandlers::new()
        .on_error(|err| tracing::warn!(recoverable = err.recoverable, "{}", err));

    let mut builder = StoreLinkClient::builder().from_config(&config).event_handlers(handlers);
    if let Some(token) = &cli.token {
        builder = builder.bearer_token(token.clone());
    }
    let client = builder.build()?;

    let events: Vec<EventKind> = if cli.events.is_empty() {
        DEFAULT_EVENTS.iter().map(|name| EventKind::from_name(name)).collect()
    } else {
        cli.events.iter().map(|name| EventKind::from_name(name)).collect()
    };
    for kind in events {
        client.on(kind, print_event);
    }

    // Topics already remembered are replayed by the client on reconnect.
    let subscriber = client.clone();
    let topics = cli.topics.clone();
    client.on_status(move |status| {
        tracing::info!("status: {}", status);
        if status.connected {
            for topic in &topics {
                if subscriber.active_topics().contains(&topic.key()) {
                    continue;
                }
                subscriber.topics().subscribe(topic.clone(), TopicFilter::new());
            }
        }
    });

    client.connect();

    tokio::signal::ctrl_c()
        .await
        .map_err(|e| StoreLinkError::InternalError(format!("Failed to wait for Ctrl-C: {}", e)))?;

    tracing::info!("Shutting down");
    client.disconnect();
    Ok(())
}
