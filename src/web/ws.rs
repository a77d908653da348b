use crate::realtime::RealtimeService;
use futures::{SinkExt, StreamExt};
use log::{debug, warn};
use warp::ws::{Message, WebSocket};

/// Pumps hub events out to the socket and feeds inbound text frames to the service.
pub async fn handle_socket(socket: WebSocket, service: RealtimeService) {
    let (mut sink, mut stream) = socket.split();
    let (id, mut events) = service.on_connect().await;

    let writer = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            let text = match serde_json::to_string(&event) {
                Ok(text) => text,
                Err(e) => {
                    warn!("Failed to encode {} event: {}", event.name(), e);
                    continue;
                }
            };
            if sink.send(Message::text(text)).await.is_err() {
                break;
            }
        }
        // Best effort; the peer may already be gone.
        let _ = sink.close().await;
    });

    while let Some(frame) = stream.next().await {
        match frame {
            Ok(msg) if msg.is_close() => break,
            Ok(msg) => {
                if let Ok(text) = msg.to_str() {
                    service.handle_message(id, text).await;
                }
            }
            Err(e) => {
                debug!("Socket error on {}: {}", id, e);
                break;
            }
        }
    }

    service.on_disconnect(id).await;
    if let Err(e) = writer.await {
        warn!("Socket writer for {} ended abnormally: {}", id, e);
    }
}
