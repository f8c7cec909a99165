//! Desktop WebSocket connector using tokio-tungstenite

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message};

use crate::infrastructure::websocket::shared::OUTGOING_BUFFER;
use crate::ports::outbound::{SocketConnection, SocketConnector, SocketEvent, TransportError};

/// Opens game sockets with tokio-tungstenite.
///
/// Each socket gets a read task and a write task. Dropping the returned
/// `outgoing` sender sends a close frame and ends both tasks.
#[derive(Debug, Clone, Copy, Default)]
pub struct TungsteniteConnector;

impl TungsteniteConnector {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl SocketConnector for TungsteniteConnector {
    async fn connect(&self, url: &str) -> Result<SocketConnection, TransportError> {
        let (ws_stream, _) = connect_async(url)
            .await
            .map_err(|e| TransportError::ConnectFailed(e.to_string()))?;
        tracing::info!("Connected to game server at {}", url);

        let (mut write, mut read) = ws_stream.split();
        let (outgoing_tx, mut outgoing_rx) = mpsc::channel::<String>(OUTGOING_BUFFER);
        let (incoming_tx, incoming_rx) = mpsc::channel::<SocketEvent>(OUTGOING_BUFFER);

        tokio::spawn(async move {
            while let Some(msg) = read.next().await {
                let event = match msg {
                    Ok(Message::Text(text)) => SocketEvent::Text(text),
                    Ok(Message::Close(frame)) => {
                        tracing::info!(?frame, "Server closed connection");
                        break;
                    }
                    Ok(_) => continue,
                    Err(e) => {
                        tracing::error!("WebSocket error: {}", e);
                        // Receiver gone means the transport already forgot this socket
                        let _ = incoming_tx.send(SocketEvent::Error(e.to_string())).await;
                        break;
                    }
                };
                if incoming_tx.send(event).await.is_err() {
                    return;
                }
            }
            let _ = incoming_tx.send(SocketEvent::Closed).await;
        });

        tokio::spawn(async move {
            while let Some(json) = outgoing_rx.recv().await {
                if let Err(e) = write.send(Message::Text(json)).await {
                    tracing::error!("Failed to send message: {}", e);
                    return;
                }
            }
            tracing::debug!("Outgoing channel dropped, closing socket");
            let _ = write.close().await;
        });

        Ok(SocketConnection {
            outgoing: outgoing_tx,
            incoming: incoming_rx,
        })
    }
}
