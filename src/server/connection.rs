//! Per-connection WebSocket handlers
//!
//! Each socket is split: a writer task drains the connection's registry
//! channel into the socket while the handler reads from it. The connection
//! ends when the client closes, the registry drops the subscriber, or the
//! relay shuts down.

use std::net::SocketAddr;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures::stream::SplitStream;
use futures::{SinkExt, StreamExt};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::signaling::SignalMessage;

use super::listener::AppState;

/// Stream frames to a viewer, one binary message per frame
pub async fn serve_viewer(socket: WebSocket, peer: SocketAddr, state: AppState) {
    let (mut sender, receiver) = socket.split();
    let (id, mut frames) = state.hub.subscribe_channel(state.config.viewer_queue).await;

    tracing::info!(conn = %id, peer = %peer, "Viewer connected");

    let writer = tokio::spawn(async move {
        while let Some(frame) = frames.recv().await {
            if sender.send(Message::Binary(frame.data)).await.is_err() {
                return;
            }
        }
        let _ = sender.send(Message::Close(None)).await;
    });

    // Viewers have nothing to say; anything but a close is ignored
    let writer = read_until_closed(receiver, writer, state.shutdown.clone(), |_| async {}).await;

    state.hub.unsubscribe(id).await;
    finish_writer(writer, state.config.close_timeout).await;

    tracing::info!(conn = %id, peer = %peer, "Viewer disconnected");
}

/// Exchange signaling messages with a peer
pub async fn serve_peer(socket: WebSocket, peer: SocketAddr, state: AppState) {
    let (mut sender, receiver) = socket.split();
    let (id, mut messages) = state.relay.subscribe_channel(state.config.peer_queue).await;

    tracing::info!(conn = %id, peer = %peer, "Signaling peer connected");

    let writer = tokio::spawn(async move {
        while let Some(message) = messages.recv().await {
            let text = match message.to_json() {
                Ok(text) => text,
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to serialize signaling message");
                    continue;
                }
            };
            if sender.send(Message::Text(text.into())).await.is_err() {
                return;
            }
        }
        let _ = sender.send(Message::Close(None)).await;
    });

    let relay = state.relay.clone();
    let stats = state.stats.clone();
    let writer = read_until_closed(receiver, writer, state.shutdown.clone(), |text| {
        let relay = relay.clone();
        let stats = stats.clone();
        async move {
            match SignalMessage::from_json(&text) {
                Ok(message) => {
                    let report = relay.relay(id, message).await;
                    stats.record_signal(&report);
                }
                Err(e) => {
                    tracing::debug!(conn = %id, error = %e, "Ignoring malformed signaling message");
                    stats.record_malformed_signal();
                }
            }
        }
    })
    .await;

    state.relay.unsubscribe(id).await;
    finish_writer(writer, state.config.close_timeout).await;

    tracing::info!(conn = %id, peer = %peer, "Signaling peer disconnected");
}

/// Read text messages into `on_text` until the connection should end
///
/// Returns the writer if it is still running.
async fn read_until_closed<F, Fut>(
    mut receiver: SplitStream<WebSocket>,
    mut writer: JoinHandle<()>,
    mut shutdown: watch::Receiver<bool>,
    mut on_text: F,
) -> Option<JoinHandle<()>>
where
    F: FnMut(String) -> Fut,
    Fut: std::future::Future<Output = ()>,
{
    loop {
        tokio::select! {
            _ = &mut writer => return None,
            _ = shutdown.changed() => return Some(writer),
            msg = receiver.next() => match msg {
                Some(Ok(Message::Text(text))) => on_text(text.to_string()).await,
                Some(Ok(Message::Close(_))) | None => return Some(writer),
                Some(Err(e)) => {
                    tracing::debug!(error = %e, "WebSocket read failed");
                    return Some(writer);
                }
                // axum answers pings itself
                Some(Ok(_)) => {}
            },
        }
    }
}

/// Give the writer a moment to flush its close frame, then stop it
async fn finish_writer(writer: Option<JoinHandle<()>>, timeout: Duration) {
    let Some(mut writer) = writer else {
        return;
    };

    if tokio::time::timeout(timeout, &mut writer).await.is_err() {
        writer.abort();
    }
}
