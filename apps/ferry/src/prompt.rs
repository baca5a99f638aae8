//! Interactive client loop.

use ferry_client::{Client, TransferOutcome};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, Lines};

/// Prompts for transfers until the user declines to continue or input ends.
///
/// Does not send `Finish connection`; the caller owns the client.
pub async fn run<R: AsyncBufRead + Unpin>(client: &mut Client, input: R) -> anyhow::Result<()> {
    let mut lines = input.lines();

    loop {
        let Some(file_name) = ask(&mut lines, "File name: ").await? else {
            break;
        };
        if file_name.is_empty() {
            continue;
        }

        let Some(discard) = ask_discard(&mut lines).await? else {
            break;
        };

        let outcome = client.request(&file_name, discard).await;
        let mut outcome = report(outcome);
        while let Some(TransferOutcome::Mismatch { .. }) = outcome {
            if !confirm(&mut lines, "Retransmit missing chunks? [y/N] ").await? {
                break;
            }
            outcome = report(client.retransmit().await);
        }

        if !confirm(&mut lines, "Request another file? [y/N] ").await? {
            break;
        }
    }
    Ok(())
}

/// Prints the outcome; transfer errors are reported and swallowed.
fn report(
    outcome: Result<TransferOutcome, ferry_client::ClientError>,
) -> Option<TransferOutcome> {
    let outcome = match outcome {
        Ok(outcome) => outcome,
        Err(e) => {
            tracing::warn!("transfer failed: {e}");
            println!("Transfer failed: {e}");
            return None;
        }
    };

    match &outcome {
        TransferOutcome::Verified { path } => {
            println!("File received and verified: {}", path.display());
        }
        TransferOutcome::Mismatch { path, missing } => println!(
            "Integrity check failed for {}: {} chunk(s) missing",
            path.display(),
            missing.len()
        ),
        TransferOutcome::NotFound => println!("File does not exist on the server"),
    }
    Some(outcome)
}

async fn ask<R: AsyncBufRead + Unpin>(
    lines: &mut Lines<R>,
    prompt: &str,
) -> anyhow::Result<Option<String>> {
    print!("{prompt}");
    std::io::Write::flush(&mut std::io::stdout())?;
    Ok(lines.next_line().await?.map(|line| line.trim().to_string()))
}

async fn ask_discard<R: AsyncBufRead + Unpin>(
    lines: &mut Lines<R>,
) -> anyhow::Result<Option<u64>> {
    loop {
        let Some(answer) = ask(lines, "Chunks to discard: ").await? else {
            return Ok(None);
        };
        match parse_discard(&answer) {
            Some(n) => return Ok(Some(n)),
            None => println!("Please enter a non-negative integer"),
        }
    }
}

async fn confirm<R: AsyncBufRead + Unpin>(
    lines: &mut Lines<R>,
    prompt: &str,
) -> anyhow::Result<bool> {
    Ok(ask(lines, prompt).await?.is_some_and(|a| is_yes(&a)))
}

/// Empty input means no discards.
fn parse_discard(answer: &str) -> Option<u64> {
    if answer.is_empty() {
        return Some(0);
    }
    answer.parse().ok()
}

fn is_yes(answer: &str) -> bool {
    matches!(answer.to_ascii_lowercase().as_str(), "y" | "yes")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    use ferry_client::ClientConfig;
    use ferry_server::{Server, ServerConfig};

    #[test]
    fn discard_answers() {
        assert_eq!(parse_discard(""), Some(0));
        assert_eq!(parse_discard("3"), Some(3));
        assert_eq!(parse_discard("-1"), None);
        assert_eq!(parse_discard("two"), None);
    }

    #[test]
    fn yes_answers() {
        assert!(is_yes("y"));
        assert!(is_yes("YES"));
        assert!(!is_yes(""));
        assert!(!is_yes("n"));
    }

    #[tokio::test]
    async fn scripted_session_recovers_lost_chunk() {
        let server_dir = tempfile::tempdir().unwrap();
        let client_dir = tempfile::tempdir().unwrap();
        std::fs::write(server_dir.path().join("a.txt"), b"AABBCCDDEE").unwrap();

        let server = Server::bind(ServerConfig {
            bind: "127.0.0.1:0".parse().unwrap(),
            root: server_dir.path().to_path_buf(),
            chunk_size: 4,
            loss_seed: Some(3),
            ..ServerConfig::default()
        })
        .await
        .unwrap();
        let runner = Arc::clone(&server);
        tokio::spawn(async move { runner.run().await });

        let mut client = Client::connect(ClientConfig {
            server: server.local_addr().unwrap(),
            root: client_dir.path().to_path_buf(),
            receive_timeout: Duration::from_secs(5),
            ..ClientConfig::default()
        })
        .await
        .unwrap();

        // Bad discard count, then 1; retransmit; another file that is missing; stop.
        let script: &[u8] = b"a.txt\nmany\n1\ny\ny\nmissing.bin\n0\nn\n";
        run(&mut client, script).await.unwrap();

        let received = client.output_dir().join("a.txt");
        assert_eq!(std::fs::read(received).unwrap(), b"AABBCCDDEE");
        assert!(!client.output_dir().join("missing.bin").exists());
        server.shutdown();
    }

    #[tokio::test]
    async fn end_of_input_stops_the_loop() {
        let dir = tempfile::tempdir().unwrap();
        let silent = tokio::net::UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let mut client = Client::connect(ClientConfig {
            server: silent.local_addr().unwrap(),
            root: dir.path().to_path_buf(),
            ..ClientConfig::default()
        })
        .await
        .unwrap();

        let script: &[u8] = b"";
        run(&mut client, script).await.unwrap();
    }
}
