//! Runs the server or the client with a resolved configuration.

use std::sync::Arc;

use ferry_client::{Client, ClientConfig, TransferOutcome};
use ferry_server::{Server, ServerConfig};

use crate::prompt;

/// A single non-interactive request.
#[derive(Debug, Clone)]
pub struct OneShot {
    pub file_name: String,
    pub discard: u64,
    pub retransmit: bool,
}

/// Serves until Ctrl-C.
pub async fn serve(config: ServerConfig) -> anyhow::Result<()> {
    let server = Server::bind(config).await?;
    let runner = Arc::clone(&server);
    let handle = tokio::spawn(async move { runner.run().await });

    tokio::signal::ctrl_c().await?;
    tracing::info!("interrupt received, shutting down");
    server.shutdown();
    handle.await??;
    Ok(())
}

/// Runs one request, or the interactive loop, then releases the session.
pub async fn fetch(config: ClientConfig, request: Option<OneShot>) -> anyhow::Result<()> {
    let mut client = Client::connect(config).await?;

    let result = match request {
        Some(request) => one_shot(&mut client, &request).await,
        None => prompt::run(&mut client, tokio::io::BufReader::new(tokio::io::stdin())).await,
    };

    client.finish().await?;
    result
}

async fn one_shot(client: &mut Client, request: &OneShot) -> anyhow::Result<()> {
    let mut outcome = client.request(&request.file_name, request.discard).await?;
    if request.retransmit && matches!(outcome, TransferOutcome::Mismatch { .. }) {
        outcome = client.retransmit().await?;
    }

    match outcome {
        TransferOutcome::Verified { path } => {
            println!("verified {}", path.display());
            Ok(())
        }
        TransferOutcome::Mismatch { path, missing } => anyhow::bail!(
            "{} failed verification, {} chunk(s) missing",
            path.display(),
            missing.len()
        ),
        TransferOutcome::NotFound => {
            anyhow::bail!("{} does not exist on the server", request.file_name)
        }
    }
}
