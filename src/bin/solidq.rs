//! solidq CLI: run the queue server or operate on queues.
//!
//! Queue commands open the tenant files under `--root` directly, or talk to
//! a running server when `--server` is given. A running server holds its
//! files exclusively, so local commands against its root fail as locked.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use secrecy::ExposeSecret;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::info;

use solidq::address::{Address, ChannelAddress};
use solidq::client::Client;
use solidq::config::Config;
use solidq::model::{DEFAULT_TENANT, Payload, WorkItem, sortable_id};
use solidq::registry::Registry;
use solidq::server::{AuthChain, ServerState};
use solidq::telemetry::{TelemetryConfig, init_telemetry};

#[derive(Parser)]
#[command(name = "solidq", about = "Multi-tenant persistent work queue")]
struct Cli {
    /// TOML config file; environment variables are used when absent
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Data directory (overrides the configured root)
    #[arg(long, global = true)]
    root: Option<PathBuf>,
    /// Base URL of a running server, e.g. http://localhost:8080
    #[arg(long, global = true)]
    server: Option<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP server
    Serve {
        /// Listen port (overrides the configured port)
        #[arg(long)]
        port: Option<u16>,
        /// Bind address
        #[arg(long, default_value = "0.0.0.0")]
        host: std::net::IpAddr,
    },
    #[command(flatten)]
    Queue(QueueCommand),
}

#[derive(Subcommand)]
enum QueueCommand {
    /// Push an item to `tenant:channel:id`, `channel:id` or `id`
    Push {
        address: String,
        /// JSON payload
        #[arg(long)]
        payload: Option<String>,
        /// Generate a time-ordered id and push to the `tenant:channel` address
        #[arg(long)]
        auto_id: bool,
    },
    /// Pop items from `tenant:channel` or `channel`
    Pop {
        channel: String,
        #[arg(long, default_value_t = 1)]
        count: usize,
    },
    /// Count items in a channel
    Count { channel: String },
    /// Delete a channel and all of its items
    Reset { channel: String },
    /// List a tenant's channels with item counts
    Channels {
        #[arg(default_value = DEFAULT_TENANT)]
        tenant: String,
    },
    /// List tenants
    Tenants {
        /// Scan the data directory instead of listing opened tenants
        #[arg(long)]
        physical: bool,
    },
    /// Show a tenant's push/pop counters
    Stats {
        #[arg(default_value = DEFAULT_TENANT)]
        tenant: String,
    },
}

/// Where queue commands run.
enum Backend {
    Local(Registry),
    Remote(Client),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => Config::from_file(path)?,
        None => Config::from_env()?,
    };
    if let Some(root) = cli.root {
        config.root_path = root;
    }

    match cli.command {
        Command::Serve { port, host } => {
            if let Some(port) = port {
                config.port = port;
            }
            cmd_serve(config, host).await
        }
        Command::Queue(command) => {
            let backend = match cli.server {
                Some(url) => {
                    let mut builder = Client::builder(url);
                    if let Some(secret) = &config.secret {
                        builder = builder.secret(secret.expose_secret());
                    }
                    Backend::Remote(builder.build()?)
                }
                None => Backend::Local(Registry::new(&config.root_path)?),
            };
            run_queue_command(&backend, command).await
        }
    }
}

async fn run_queue_command(backend: &Backend, command: QueueCommand) -> anyhow::Result<()> {
    match command {
        QueueCommand::Push {
            address,
            payload,
            auto_id,
        } => cmd_push(backend, &address, payload, auto_id).await,
        QueueCommand::Pop { channel, count } => {
            let items = backend.pop(&channel, count).await?;
            if items.is_empty() {
                println!("No items.");
                return Ok(());
            }
            print_json(&items)
        }
        QueueCommand::Count { channel } => {
            println!("{}", backend.count(&channel).await?);
            Ok(())
        }
        QueueCommand::Reset { channel } => {
            backend.reset(&channel).await?;
            println!("Reset {channel}");
            Ok(())
        }
        QueueCommand::Channels { tenant } => print_json(&backend.channels(&tenant).await?),
        QueueCommand::Tenants { physical } => {
            for tenant in backend.tenants(physical).await? {
                println!("{tenant}");
            }
            Ok(())
        }
        QueueCommand::Stats { tenant } => print_json(&backend.stats(&tenant).await?),
    }
}

async fn cmd_serve(config: Config, host: std::net::IpAddr) -> anyhow::Result<()> {
    let _guard = init_telemetry(TelemetryConfig {
        endpoint: config.otel_endpoint.clone(),
        service_name: "solidq".to_string(),
        log_level: config.log_level.clone(),
    })?;

    let registry = Arc::new(Registry::new(&config.root_path)?);
    info!(root = %config.root_path.display(), "data directory ready");
    let state = ServerState::new(registry, AuthChain::from_secret(config.secret));

    let shutdown = CancellationToken::new();
    let signal = shutdown.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("interrupt received, shutting down");
        signal.cancel();
    });

    let addr = SocketAddr::new(host, config.port);
    solidq::server::serve(addr, state, config.cross_origin, shutdown).await?;
    Ok(())
}

async fn cmd_push(
    backend: &Backend,
    address: &str,
    payload: Option<String>,
    auto_id: bool,
) -> anyhow::Result<()> {
    let payload: Option<Payload> = payload.map(|json| serde_json::from_str(&json)).transpose()?;

    let wire = if auto_id {
        let ChannelAddress { tenant, channel } = ChannelAddress::parse(address);
        Address::new(tenant, channel, sortable_id()).encode()?
    } else {
        address.to_string()
    };

    backend.push(&wire, payload.as_ref()).await?;
    println!("Pushed {}", Address::parse(&wire));
    Ok(())
}

fn print_json(value: &impl Serialize) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

impl Backend {
    async fn push(&self, address: &str, payload: Option<&Payload>) -> solidq::error::Result<()> {
        match self {
            Backend::Local(registry) => {
                let Address {
                    tenant,
                    channel,
                    id,
                } = Address::parse(address);
                registry.ensure_engine(&tenant)?.push(&channel, &id, payload)
            }
            Backend::Remote(client) => client.push(address, payload).await,
        }
    }

    async fn pop(&self, channel: &str, count: usize) -> solidq::error::Result<Vec<WorkItem>> {
        match self {
            Backend::Local(registry) => {
                let ChannelAddress { tenant, channel } = ChannelAddress::parse(channel);
                registry.ensure_engine(&tenant)?.pop_many(&channel, count)
            }
            Backend::Remote(client) => client.pop(channel, count).await,
        }
    }

    async fn count(&self, channel: &str) -> solidq::error::Result<u64> {
        match self {
            Backend::Local(registry) => {
                let ChannelAddress { tenant, channel } = ChannelAddress::parse(channel);
                registry.ensure_engine(&tenant)?.count(&channel)
            }
            Backend::Remote(client) => client.count(channel).await,
        }
    }

    async fn reset(&self, channel: &str) -> solidq::error::Result<()> {
        match self {
            Backend::Local(registry) => {
                let ChannelAddress { tenant, channel } = ChannelAddress::parse(channel);
                registry.ensure_engine(&tenant)?.reset_channel(&channel)
            }
            Backend::Remote(client) => client.reset(channel).await,
        }
    }

    async fn channels(&self, tenant: &str) -> solidq::error::Result<BTreeMap<String, u64>> {
        match self {
            Backend::Local(registry) => registry.ensure_engine(tenant)?.list_channels_with_count(),
            Backend::Remote(client) => client.channels(tenant).await,
        }
    }

    async fn tenants(&self, physical: bool) -> solidq::error::Result<Vec<String>> {
        match self {
            // A fresh local registry has opened nothing, so always scan disk.
            Backend::Local(registry) => registry.list_tenants(true),
            Backend::Remote(client) => client.tenants(physical).await,
        }
    }

    async fn stats(&self, tenant: &str) -> solidq::error::Result<BTreeMap<String, u64>> {
        match self {
            Backend::Local(registry) => registry.ensure_engine(tenant)?.stats(),
            Backend::Remote(client) => client.stats(tenant).await,
        }
    }
}
