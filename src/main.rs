//! PinShare - Ephemeral PIN-Authenticated Sharing
//!
//! This is the main entry point for the PinShare server.
//! It sets up the stores, their sweepers, the services and the HTTP listener.

use pinshare::api::{router, AppState};
use pinshare::config::{CliAction, Config};
use pinshare::services::{FileService, LinkBuilder, TextService};
use pinshare::storage::{ExpiringStore, ExpiryConfig, ExpirySweeper, FileSet, PinAllocator};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

fn print_help() {
    println!(
        r#"
PinShare - Ephemeral PIN-Authenticated Sharing

USAGE:
    pinshare [OPTIONS]

OPTIONS:
    -h, --host <HOST>            Host to bind to (default: 0.0.0.0)
    -p, --port <PORT>            Port to listen on (default: 8000)
    -d, --upload-dir <DIR>       Where uploaded files are kept (default: uploads)
        --ttl <SECONDS>          How long a share lives (default: 300)
        --public-host <IP>       Address to put in share links (default: discovered LAN address)
        --max-upload-mb <MB>     Largest accepted upload (default: 100)
    -v, --version                Print version information
        --help                   Print this help message

EXAMPLES:
    pinshare                              # Start on 0.0.0.0:8000
    pinshare --port 9000                  # Start on port 9000
    pinshare --ttl 60 -d /tmp/pinshare    # One-minute shares kept in /tmp

SHARING:
    $ curl -d message=hello http://192.168.1.20:8000/api/text/share
    {{"pin":"042137","expires_in_min":5,"qr_code_base64":"..."}}
    $ curl http://192.168.1.20:8000/api/text/042137
    {{"message":"hello"}}
    $ curl -F files=@notes.txt http://192.168.1.20:8000/api/file/share
"#
    );
}

fn print_banner(config: &Config) {
    println!(
        r#"
   ____  _       ____  _
  |  _ \(_)_ __ / ___|| |__   __ _ _ __ ___
  | |_) | | '_ \\___ \| '_ \ / _` | '__/ _ \
  |  __/| | | | |___) | | | | (_| | | |  __/
  |_|   |_|_| |_|____/|_| |_|\__,_|_|  \___|

PinShare v{} - Ephemeral PIN-Authenticated Sharing
──────────────────────────────────────────────────────────────
Server started on {}
Shares expire after {}s, uploads kept in {}

Use Ctrl+C to shutdown gracefully.
"#,
        pinshare::VERSION,
        config.bind_address(),
        config.ttl.as_secs(),
        config.upload_dir.display()
    );
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse command-line arguments
    let config = match Config::parse(std::env::args().skip(1)) {
        Ok(CliAction::Run(config)) => config,
        Ok(CliAction::Help) => {
            print_help();
            return Ok(());
        }
        Ok(CliAction::Version) => {
            println!("PinShare version {}", pinshare::VERSION);
            return Ok(());
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            print_help();
            std::process::exit(1);
        }
    };

    // Set up logging (RUST_LOG overrides the default level)
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();

    print_banner(&config);

    // One store per content kind, each with its own sweeper
    let texts: Arc<ExpiringStore<String>> = Arc::new(ExpiringStore::new(config.ttl));
    let files: Arc<ExpiringStore<FileSet>> = Arc::new(ExpiringStore::new(config.ttl));

    let _text_sweeper = ExpirySweeper::start("text", Arc::clone(&texts), ExpiryConfig::default());
    let _file_sweeper = ExpirySweeper::start("file", Arc::clone(&files), ExpiryConfig::default());

    let links = LinkBuilder::new(config.port, config.public_host);
    match links.host().await {
        Ok(host) => info!("Share links will point at {}", host),
        Err(e) => error!("Share links unavailable until the network comes up: {}", e),
    }

    let text = TextService::new(texts, PinAllocator::new(), links.clone());
    let files = FileService::open(files, PinAllocator::new(), links, &config.upload_dir).await?;
    info!("Upload directory ready at {}", config.upload_dir.display());

    let app = router(AppState::new(text, files), config.max_upload_bytes);

    // Bind the TCP listener
    let listener = TcpListener::bind(config.bind_address()).await?;
    info!("Listening on {}", config.bind_address());

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shutdown complete");
    Ok(())
}

/// Resolves once Ctrl+C is received.
async fn shutdown_signal() {
    if let Err(e) = signal::ctrl_c().await {
        error!("Failed to listen for Ctrl+C: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received, stopping server...");
}
