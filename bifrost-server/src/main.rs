use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use bifrost::cache::{start_auto_cleanup, MemoryCache, MemoryCacheConfig};
use bifrost::{Bifrost, CallOptions, TracingLogger};
use bifrost_server::api::{ApiServer, ApiServerConfig, JwtAuth};
use bifrost_server::demo::acme_registry;

#[derive(Parser)]
#[command(name = "bifrost-server")]
#[command(about = "Serve bifrost functions over HTTP", long_about = None)]
struct Cli {
    /// JWT secret key (can also use JWT_SECRET env var)
    #[arg(long, global = true)]
    jwt_secret: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the API server
    Serve {
        /// Host to bind to (default: BIFROST_HOST or 127.0.0.1)
        #[arg(long)]
        host: Option<String>,

        /// Port to bind to (default: BIFROST_PORT or 8080)
        #[arg(short, long)]
        port: Option<u16>,

        /// Path prefix for function endpoints
        #[arg(long, default_value = "/api-functions")]
        api_prefix: String,

        /// Only functions guarded under this key are served
        #[arg(long, default_value = "web")]
        auth_key: String,
    },

    /// Mint a bearer token for the demo functions
    Token {
        /// Token subject
        #[arg(default_value = "demo")]
        subject: String,

        /// Hours until the token expires
        #[arg(long, default_value = "24")]
        hours: i64,
    },

    /// Call a demo function in-process and print the result
    Call {
        /// Function name
        function: String,

        /// JSON argument
        #[arg(default_value = "null")]
        payload: String,

        /// Accept a cached result younger than this many milliseconds
        #[arg(long)]
        within_ms: Option<u64>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "bifrost=info,bifrost_server=info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    let mut config = ApiServerConfig::from_env();
    if let Some(secret) = cli.jwt_secret.clone() {
        config.jwt_secret = secret;
    }
    let auth = Arc::new(JwtAuth::new(&config.jwt_secret));

    match cli.command {
        Commands::Serve {
            host,
            port,
            api_prefix,
            auth_key,
        } => {
            if let Some(host) = host {
                config.host = host;
            }
            if let Some(port) = port {
                config.port = port;
            }
            config.api_prefix = api_prefix;
            config.auth_key = auth_key;

            let registry = Arc::new(acme_registry(auth)?);
            let server = ApiServer::new(config, registry).with_logger(Arc::new(TracingLogger));
            server.start().await?;
        }

        Commands::Token { subject, hours } => {
            let token = auth.generate_token(&subject, Some(hours))?;
            println!("{}", token);
        }

        Commands::Call {
            function,
            payload,
            within_ms,
        } => {
            let arg: serde_json::Value =
                serde_json::from_str(&payload).context("payload must be valid JSON")?;

            let cache = Arc::new(MemoryCache::new(MemoryCacheConfig::small()));
            tokio::spawn(start_auto_cleanup(Arc::clone(&cache)));

            let bifrost = Bifrost::builder(acme_registry(auth)?)
                .cache(cache)
                .logger(Arc::new(TracingLogger))
                .build();

            let mut options = CallOptions::new();
            if let Some(ms) = within_ms {
                options = options.within_ms(ms);
            }

            let fetched = bifrost.handle(&function)?.fetch_client(arg, options).await?;
            println!("{}", serde_json::to_string_pretty(&fetched)?);
        }
    }

    Ok(())
}
