use async_trait::async_trait;
use axum::extract::ws::{Message, WebSocket};
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use gateway_core::broadcast::ClientSink;
use gateway_types::wire::ClientMessage;

/// Adapts an axum WebSocket to [`ClientSink`] so the broadcast loop in
/// `gateway-core` never needs to know about axum's message types.
pub struct AxumClientSink {
    write: SplitSink<WebSocket, Message>,
    read: SplitStream<WebSocket>,
    closed: bool,
}

impl AxumClientSink {
    pub fn new(socket: WebSocket) -> Self {
        let (write, read) = socket.split();
        Self { write, read, closed: false }
    }
}

#[async_trait]
impl ClientSink for AxumClientSink {
    async fn send_text(&mut self, text: String) -> bool {
        self.write.send(Message::Text(text)).await.is_ok()
    }

    async fn try_recv_client_message(&mut self) -> Option<ClientMessage> {
        if self.closed {
            // The stream has already ended; never resolve again so the
            // caller's select! does not spin polling a dead source.
            futures::future::pending::<()>().await;
            return None;
        }

        match self.read.next().await {
            Some(Ok(Message::Text(text))) => serde_json::from_str(&text).ok(),
            Some(Ok(_)) => None,
            Some(Err(_)) | None => {
                self.closed = true;
                None
            }
        }
    }
}
