//! Line-delimited JSON bridge between a [`DebugClient`] and a byte stream.
//!
//! Each event is written as one JSON object per line; each input line is
//! parsed as a command. Closing the input side drops the command channel,
//! which detaches the debugger.

use anyhow::{Context as _, Result};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader, BufWriter};
use tokio::net::TcpListener;
use tracing::{debug, info, warn};

use super::{DebugClient, DebugCommand, DebugEvent};

pub async fn serve<R, W>(client: DebugClient, reader: R, writer: W) -> Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let DebugClient {
        mut events,
        commands,
    } = client;
    let mut commands = Some(commands);
    let mut lines = BufReader::new(reader).lines();
    let mut writer = BufWriter::new(writer);

    loop {
        tokio::select! {
            event = events.recv() => {
                let Some(event) = event else { break };
                let json = serde_json::to_string(&event)?;
                writer.write_all(json.as_bytes()).await?;
                writer.write_all(b"\n").await?;
                writer.flush().await.context("Failed to write debug event")?;
                if matches!(event, DebugEvent::Exit { .. }) {
                    break;
                }
            }
            line = lines.next_line(), if commands.is_some() => {
                match line.context("Failed to read debug command")? {
                    Some(line) if line.trim().is_empty() => {}
                    Some(line) => match serde_json::from_str::<DebugCommand>(&line) {
                        Ok(command) => {
                            debug!(command = ?command, "debug command received");
                            let delivered = commands
                                .as_ref()
                                .is_some_and(|tx| tx.send(command).is_ok());
                            if !delivered {
                                break;
                            }
                        }
                        Err(e) => warn!(error = %e, line = %line, "invalid debug command"),
                    },
                    None => {
                        debug!("debug client closed its input");
                        commands = None;
                    }
                }
            }
        }
    }
    Ok(())
}

/// Accept one TCP connection on localhost and serve it
pub async fn listen(client: DebugClient, port: u16) -> Result<()> {
    let listener = TcpListener::bind(("127.0.0.1", port))
        .await
        .with_context(|| format!("Failed to bind debug port {}", port))?;
    info!(port, "debug server listening");

    let (stream, peer) = listener
        .accept()
        .await
        .context("Failed to accept debug connection")?;
    info!(peer = %peer, "debug client connected");

    let (reader, writer) = stream.into_split();
    serve(client, reader, writer).await
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

    use super::*;
    use crate::debugger::DebugManager;

    #[tokio::test(flavor = "multi_thread")]
    async fn test_bridges_handshake_and_exit() {
        let (manager, client) = DebugManager::new(Duration::from_secs(5));
        let (debuggee_side, client_side) = tokio::io::duplex(1024);
        let (reader, writer) = tokio::io::split(debuggee_side);
        let bridge = tokio::spawn(serve(client, reader, writer));

        let (remote_reader, mut remote_writer) = tokio::io::split(client_side);
        let mut remote_lines = BufReader::new(remote_reader).lines();

        let handshake = {
            let manager = manager.clone();
            tokio::spawn(async move { manager.wait_till_debuggee_responds().await })
        };

        let ready = remote_lines.next_line().await.unwrap().unwrap();
        assert_eq!(ready, r#"{"event":"ready"}"#);

        remote_writer.write_all(b"not json\n").await.unwrap();
        remote_writer
            .write_all(b"{\"command\":\"start\"}\n")
            .await
            .unwrap();
        handshake.await.unwrap().unwrap();

        manager.notify_exit(0);
        let exit = remote_lines.next_line().await.unwrap().unwrap();
        assert_eq!(exit, r#"{"event":"exit","status":0}"#);

        bridge.await.unwrap().unwrap();
    }
}
