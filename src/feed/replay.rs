//! Replay feed reading market events from a JSON-lines file

use super::{MarketEvent, MarketFeed};
use async_trait::async_trait;
use std::path::PathBuf;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

/// Replays one `MarketEvent` per line of a file, in file order
pub struct ReplayFeed {
    path: PathBuf,
}

impl ReplayFeed {
    /// Create a replay feed for the given file
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Parse one line; blank lines and `#` comments yield `None`
    pub fn parse_line(line: &str) -> Option<anyhow::Result<MarketEvent>> {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            return None;
        }
        Some(serde_json::from_str(trimmed).map_err(anyhow::Error::from))
    }
}

#[async_trait]
impl MarketFeed for ReplayFeed {
    async fn subscribe(&self) -> anyhow::Result<mpsc::Receiver<MarketEvent>> {
        let file = tokio::fs::File::open(&self.path).await?;
        let (event_tx, event_rx) = mpsc::channel(1024);
        let path = self.path.clone();

        tracing::info!(path = %path.display(), "Replaying market events");

        tokio::spawn(async move {
            let mut lines = BufReader::new(file).lines();
            let mut line_no = 0usize;
            loop {
                let line = match lines.next_line().await {
                    Ok(Some(line)) => line,
                    Ok(None) => break,
                    Err(e) => {
                        tracing::error!(error = %e, "Replay read failed");
                        break;
                    }
                };
                line_no += 1;
                match Self::parse_line(&line) {
                    None => continue,
                    Some(Ok(event)) => {
                        if event_tx.send(event).await.is_err() {
                            tracing::debug!("Event receiver dropped, stopping replay");
                            break;
                        }
                    }
                    Some(Err(e)) => {
                        tracing::warn!(line = line_no, error = %e, "Skipping malformed event");
                    }
                }
            }
            tracing::info!(lines = line_no, "Replay finished");
        });

        Ok(event_rx)
    }
}
