//! Realtime feed connection.
//!
//! Connects to the collaborator's WebSocket feed, parses frames into
//! [`RealtimeEvent`]s, and republishes them on a broadcast channel for the
//! session loop. Reconnects with exponential backoff on disconnect or error
//! (reset on a successful connect); while disconnected the session simply
//! shows locally known state — degraded freshness, never a crash.

use std::time::Duration;

use futures_util::{SinkExt as _, StreamExt as _};
use tokio::sync::broadcast;
use tokio_tungstenite::tungstenite::protocol::Message as WsMessage;

use crate::config::{FEED_BACKOFF_INITIAL_SECS, FEED_BACKOFF_MAX_SECS};
use crate::rlog;
use crate::types::RealtimeEvent;

/// Run the feed listener until the process shuts down (abort the task to
/// stop it). Events that fail to parse are logged and skipped — a bad frame
/// must not take down the connection.
pub async fn feed_listen_loop(feed_url: String, events: broadcast::Sender<RealtimeEvent>) {
    let mut backoff_secs = FEED_BACKOFF_INITIAL_SECS;

    loop {
        match tokio_tungstenite::connect_async(&feed_url).await {
            Ok((ws_stream, _response)) => {
                backoff_secs = FEED_BACKOFF_INITIAL_SECS;
                rlog!("feed: connected to {feed_url}");

                let (mut write, mut read) = ws_stream.split();

                while let Some(frame) = read.next().await {
                    match frame {
                        Ok(WsMessage::Text(text)) => {
                            match serde_json::from_str::<RealtimeEvent>(&text) {
                                Ok(event) => {
                                    // Send fails only with no receivers; fine.
                                    let _ = events.send(event);
                                }
                                Err(e) => rlog!("feed: unparseable event skipped: {e}"),
                            }
                        }
                        Ok(WsMessage::Ping(payload)) => {
                            let _ = write.send(WsMessage::Pong(payload)).await;
                        }
                        Ok(WsMessage::Close(_)) => break,
                        Err(e) => {
                            rlog!("feed: connection error: {e}");
                            break;
                        }
                        _ => {}
                    }
                }

                rlog!("feed: disconnected, reconnecting in {backoff_secs}s");
            }
            Err(e) => {
                rlog!("feed: connect failed (retry in {backoff_secs}s): {e}");
            }
        }

        tokio::time::sleep(Duration::from_secs(backoff_secs)).await;
        backoff_secs = (backoff_secs * 2).min(FEED_BACKOFF_MAX_SECS);
    }
}
