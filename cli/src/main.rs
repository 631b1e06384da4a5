//! chainproxy CLI — run the JSON-RPC failover proxy and inspect its setup.
//!
//! # Commands
//! ```
//! chainproxy serve  [--listen 0.0.0.0:3000] [--config proxy.json]
//! chainproxy routes --method eth_call [--type market|user]
//! chainproxy check  [--private-url <url>] [--public-url <url>...]
//! ```

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;

use chainproxy_core::{route::is_wallet_method, EndpointRole, RouteSelector, TrafficClass};
use chainproxy_server::{init_tracing, ProxyConfig};

mod cmd_check;

#[derive(Parser)]
#[command(
    name = "chainproxy",
    about = "Health-aware JSON-RPC failover proxy",
    long_about = "
ChainProxy: a single HTTP entry point in front of one private and several
public JSON-RPC endpoints, with backoff, failover and call-site routing.

ENVIRONMENT VARIABLES:
  PRIVATE_RPC_URL     Private (market) endpoint URL
  PUBLIC_RPC_URLS     Comma-separated public endpoint URLs
  CHAINPROXY_LISTEN   Listen address for `serve`
  CHAINPROXY_CONFIG   Path to a JSON config file
  RUST_LOG            Log filter, overrides the configured level
",
    version
)]
struct Cli {
    #[command(flatten)]
    endpoints: EndpointArgs,

    #[command(subcommand)]
    command: Commands,
}

/// Flags shared by every command. Applied on top of file and environment.
#[derive(Args)]
struct EndpointArgs {
    /// JSON config file
    #[arg(short, long, global = true, env = "CHAINPROXY_CONFIG")]
    config: Option<PathBuf>,
    /// Private endpoint URL
    #[arg(long, global = true)]
    private_url: Option<String>,
    /// Public endpoint URL (repeatable)
    #[arg(long = "public-url", global = true)]
    public_urls: Vec<String>,
    /// Per-attempt timeout in milliseconds
    #[arg(long, global = true)]
    timeout_ms: Option<u64>,
    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true)]
    log_level: Option<String>,
    /// Emit JSON logs
    #[arg(long, global = true)]
    json_logs: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the proxy
    Serve {
        /// Listen address, e.g. 127.0.0.1:3000
        #[arg(long)]
        listen: Option<SocketAddr>,
        /// Log a stats summary every N seconds
        #[arg(long)]
        stats_every: Option<u64>,
    },

    /// Print the candidate endpoint order for a method
    Routes {
        /// JSON-RPC method name
        #[arg(long)]
        method: String,
        /// Traffic class: market or user
        #[arg(long = "type", default_value = "user")]
        kind: String,
    },

    /// Send eth_blockNumber to every configured endpoint
    Check,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut config = load_config(&cli.endpoints)?;

    match cli.command {
        Commands::Serve { listen, stats_every } => {
            if let Some(listen) = listen {
                config.listen = listen;
            }
            if stats_every.is_some() {
                config.stats_log_interval_secs = stats_every;
            }
            init_tracing(&config.log);
            chainproxy_server::serve(config).await?;
            Ok(())
        }

        Commands::Routes { method, kind } => cmd_routes(&config, &method, &kind),

        Commands::Check => {
            init_tracing(&config.log);
            cmd_check::run(&config).await
        }
    }
}

/// Defaults, then the config file, then the environment, then flags.
fn load_config(args: &EndpointArgs) -> Result<ProxyConfig> {
    let mut config = match &args.config {
        Some(path) => ProxyConfig::from_file(path)
            .with_context(|| format!("loading config '{}'", path.display()))?,
        None => ProxyConfig::default(),
    };
    config.apply_env().context("reading environment")?;

    if let Some(url) = &args.private_url {
        config.private_url = url.clone();
    }
    if !args.public_urls.is_empty() {
        config.public_urls = args.public_urls.clone();
    }
    if let Some(ms) = args.timeout_ms {
        config.request_timeout_ms = ms;
    }
    if let Some(level) = &args.log_level {
        config.log.level = level.clone();
    }
    if args.json_logs {
        config.log.json = true;
    }

    config.validate()?;
    Ok(config)
}

// ─── Command implementations ─────────────────────────────────────────────────

fn cmd_routes(config: &ProxyConfig, method: &str, kind: &str) -> Result<()> {
    let registry = config.registry()?;
    let class = TrafficClass::from_query(Some(kind));
    let candidates = RouteSelector::new(&registry).select(method, class);

    println!("Method:  {method}");
    println!("Class:   {class}");
    if is_wallet_method(method) {
        println!("Wallet:  yes (private endpoint excluded)");
    }
    println!("Candidates:");
    for (rank, id) in candidates.iter().enumerate() {
        let endpoint = registry.get(*id);
        let role = match endpoint.role {
            EndpointRole::Private => "private",
            EndpointRole::Public => "public",
        };
        println!("  {}. {:8} {}", rank + 1, role, endpoint.url);
    }
    Ok(())
}
