use crate::client::{GatewayClient, GatewayError};
use lattice_models::event::PlatformEvent;
use serde::Deserialize;
use std::time::Duration;
use tokio::sync::mpsc;

/// How long the gateway holds an empty long poll open.
const LONG_POLL_SECONDS: u32 = 25;
/// Pause before re-polling after a failed poll.
const POLL_RETRY_DELAY: Duration = Duration::from_secs(5);

#[derive(Debug, Deserialize)]
struct EventBatch {
    #[serde(default)]
    events: Vec<PlatformEvent>,
    cursor: i64,
}

impl GatewayClient {
    /// One long-poll round. Returns the delivered events and the cursor to
    /// resume from.
    pub async fn poll_events(
        &self,
        cursor: i64,
    ) -> Result<(Vec<PlatformEvent>, i64), GatewayError> {
        let url = self.events_url(cursor);
        let resp = self.get_with_retry(&url).await?;
        let batch: EventBatch = resp
            .json()
            .await
            .map_err(|e| GatewayError::Http(format!("invalid event batch: {e}")))?;
        Ok((batch.events, batch.cursor))
    }

    fn events_url(&self, cursor: i64) -> String {
        self.url(&format!("/events?after={cursor}&timeout={LONG_POLL_SECONDS}"))
    }
}

/// Pull events forever and feed them into the channel. Returns when the
/// receiving side is dropped.
pub async fn run_event_pump(client: GatewayClient, tx: mpsc::Sender<PlatformEvent>) {
    let mut cursor = 0;
    loop {
        match client.poll_events(cursor).await {
            Ok((events, next_cursor)) => {
                cursor = next_cursor;
                for event in events {
                    if tx.send(event).await.is_err() {
                        tracing::info!(target: "gateway", "event consumer gone, pump stopping");
                        return;
                    }
                }
            }
            Err(e) => {
                tracing::warn!(target: "gateway", "event poll failed: {e}");
                tokio::time::sleep(POLL_RETRY_DELAY).await;
            }
        }
    }
}
