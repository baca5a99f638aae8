//! `ferry` entry point: server and client front ends.

mod app;
mod config;
mod prompt;

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

/// Reliable file transfer over UDP with simulated loss.
#[derive(Parser)]
#[command(author, version, about)]
struct Cli {
    /// Configuration file (defaults to ./ferry.toml when present).
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    mode: Mode,
}

#[derive(Subcommand)]
enum Mode {
    /// Serve files until interrupted.
    Server {
        /// Local address to bind.
        #[arg(short, long)]
        bind: Option<SocketAddr>,
        /// Directory files are served from.
        #[arg(short, long)]
        root: Option<PathBuf>,
        #[arg(long)]
        chunk_size: Option<usize>,
        /// Datagrams processed concurrently.
        #[arg(short, long)]
        workers: Option<usize>,
        /// Seed for reproducible loss injection.
        #[arg(long)]
        seed: Option<u64>,
    },
    /// Fetch files, interactively unless --file is given.
    Client {
        /// Server address.
        #[arg(short, long)]
        server: Option<SocketAddr>,
        /// Directory received files are written under.
        #[arg(short, long)]
        root: Option<PathBuf>,
        /// Carry each chunk in a single datagram.
        #[arg(long)]
        framed: bool,
        /// Fetch this file and exit.
        #[arg(short, long)]
        file: Option<String>,
        /// Chunks the server should withhold.
        #[arg(short, long, default_value_t = 0)]
        discard: u64,
        /// Run one retransmission round if verification fails.
        #[arg(long)]
        retransmit: bool,
    },
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let mut config = config::Config::load(cli.config.as_deref())?;

    let rt = tokio::runtime::Runtime::new()?;
    match cli.mode {
        Mode::Server {
            bind,
            root,
            chunk_size,
            workers,
            seed,
        } => {
            let server = &mut config.server;
            server.bind = bind.unwrap_or(server.bind);
            if let Some(root) = root {
                server.root = root;
            }
            server.chunk_size = chunk_size.unwrap_or(server.chunk_size);
            server.workers = workers.unwrap_or(server.workers);
            server.loss_seed = seed.or(server.loss_seed);

            tracing::info!(version = env!("CARGO_PKG_VERSION"), "starting ferry server");
            rt.block_on(app::serve(config.server.to_server_config()))?;
        }
        Mode::Client {
            server,
            root,
            framed,
            file,
            discard,
            retransmit,
        } => {
            let client = &mut config.client;
            client.server = server.unwrap_or(client.server);
            if let Some(root) = root {
                client.root = root;
            }
            if framed {
                client.framing = ferry_protocol::Framing::Framed;
            }

            let request = file.map(|file_name| app::OneShot {
                file_name,
                discard,
                retransmit,
            });
            rt.block_on(app::fetch(config.client.to_client_config(), request))?;
        }
    }
    Ok(())
}
