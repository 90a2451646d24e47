//! ---
//! irri_section: "07-networking-interfaces"
//! irri_subsection: "module"
//! irri_type: "source"
//! irri_scope: "code"
//! irri_description: "Network transports bridging the engine to the outside."
//! irri_version: "v0.1.0-alpha"
//! irri_owner: "tbd"
//! ---
use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::routing::get;
use axum::Router;
use irri_common::ObserverConfig;
use irri_core::notify::LiveNotifier;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

struct WsState {
    notifier: Arc<LiveNotifier>,
}

/// WebSocket server streaming live updates to connected observers.
///
/// Each accepted connection registers one observer with the engine's
/// notifier; the membership heals itself when a connection dies.
pub struct ObserverServer;

impl ObserverServer {
    /// Bind the configured address and start serving `/ws`.
    pub async fn spawn(
        config: &ObserverConfig,
        notifier: Arc<LiveNotifier>,
    ) -> anyhow::Result<ObserverServerHandle> {
        let listener = TcpListener::bind(config.listen).await?;
        let local_addr = listener.local_addr()?;
        info!(address = %local_addr, "observer server listening");

        let state = Arc::new(WsState { notifier });
        let app = Router::new()
            .route("/ws", get(upgrade_handler))
            .with_state(state);

        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(async move {
            let server = axum::serve(listener, app).with_graceful_shutdown(async move {
                let _ = shutdown_rx.changed().await;
            });
            if let Err(err) = server.await {
                warn!(error = %err, "observer server exited with error");
            }
        });

        Ok(ObserverServerHandle {
            address: local_addr,
            shutdown: shutdown_tx,
            task,
        })
    }
}

/// Handle for the running observer server.
pub struct ObserverServerHandle {
    address: SocketAddr,
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl ObserverServerHandle {
    /// Bound listening address.
    pub fn local_addr(&self) -> SocketAddr {
        self.address
    }

    /// Trigger graceful shutdown and await completion.
    pub async fn shutdown(self) -> anyhow::Result<()> {
        let _ = self.shutdown.send(true);
        match self.task.await {
            Ok(()) => Ok(()),
            Err(err) => Err(anyhow::anyhow!(err)),
        }
    }
}

async fn upgrade_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<WsState>>,
) -> axum::response::Response {
    ws.on_upgrade(|socket| client_loop(socket, state))
}

async fn client_loop(mut socket: WebSocket, state: Arc<WsState>) {
    let mut handle = state.notifier.register();
    let observer_id = handle.id();

    loop {
        tokio::select! {
            frame = handle.recv() => {
                let Some(frame) = frame else {
                    // The notifier evicted this observer.
                    break;
                };
                let Ok(text) = serde_json::to_string(&frame) else {
                    warn!(observer = %observer_id, "failed to serialise live update");
                    continue;
                };
                if socket.send(Message::Text(text)).await.is_err() {
                    break;
                }
            }
            message = socket.recv() => {
                let Some(Ok(message)) = message else {
                    break;
                };
                match message {
                    // Inbound observer frames are accepted but drive nothing.
                    Message::Text(text) => {
                        debug!(observer = %observer_id, bytes = text.len(), "observer frame accepted");
                    }
                    Message::Binary(_) => {
                        debug!(observer = %observer_id, "binary observer frame ignored");
                    }
                    Message::Ping(payload) => {
                        if socket.send(Message::Pong(payload)).await.is_err() {
                            break;
                        }
                    }
                    Message::Pong(_) => {}
                    Message::Close(_) => break,
                }
            }
        }
    }

    state.notifier.unregister(observer_id);
    debug!(observer = %observer_id, "observer connection closed");
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::{SinkExt, StreamExt};
    use irri_msg::LiveUpdate;
    use serde_json::json;
    use tokio::time::{sleep, timeout, Duration};
    use tokio_tungstenite::{connect_async, tungstenite::protocol::Message as WsMessage};

    async fn wait_for_observers(notifier: &LiveNotifier, expected: usize) {
        for _ in 0..100 {
            if notifier.observer_count() == expected {
                return;
            }
            sleep(Duration::from_millis(10)).await;
        }
        panic!(
            "observer count never reached {expected}, at {}",
            notifier.observer_count()
        );
    }

    #[tokio::test]
    async fn connected_observer_receives_broadcasts() {
        let notifier = Arc::new(LiveNotifier::new(16));
        let config = ObserverConfig {
            enabled: true,
            listen: "127.0.0.1:0".parse().unwrap(),
            queue_depth: 16,
        };
        let handle = ObserverServer::spawn(&config, notifier.clone()).await.unwrap();
        let url = format!("ws://{}/ws", handle.local_addr());

        let (mut socket, _response) = connect_async(&url).await.unwrap();
        wait_for_observers(&notifier, 1).await;

        notifier.broadcast(LiveUpdate::mqtt_update(
            "irricore/d1/status",
            json!({"valves": []}),
        ));

        let received = timeout(Duration::from_secs(1), socket.next())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        match received {
            WsMessage::Text(payload) => {
                let value: serde_json::Value = serde_json::from_str(&payload).unwrap();
                assert_eq!(value["type"], json!("mqtt_update"));
                assert_eq!(value["topic"], json!("irricore/d1/status"));
            }
            other => panic!("unexpected message: {other:?}"),
        }

        // Inbound frames are accepted without side effects.
        socket
            .send(WsMessage::Text("{\"hello\":true}".to_owned()))
            .await
            .unwrap();

        socket.close(None).await.unwrap();
        wait_for_observers(&notifier, 0).await;

        handle.shutdown().await.unwrap();
    }
}
