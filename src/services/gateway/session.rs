use crate::config::WsConfig;
use crate::domain::gateway::{ClientCommand, DeleteFailed, Joined, MessageError, ServerEvent};
use crate::error::AppError;
use crate::services::delivery_service::DeliveryService;
use crate::services::gateway::Metrics;
use crate::services::presence::{ConnectionHandle, PresenceRegistry};
use axum::extract::ws::{Message as WsMessage, WebSocket};
use futures::{SinkExt, StreamExt};
use tokio::sync::{mpsc, watch};
use tracing::Instrument;
use uuid::Uuid;

pub(crate) struct Session {
    pub(crate) request_id: String,
    pub(crate) socket: WebSocket,
    pub(crate) delivery: DeliveryService,
    pub(crate) presence: PresenceRegistry,
    pub(crate) metrics: Metrics,
    pub(crate) config: WsConfig,
    pub(crate) shutdown_rx: watch::Receiver<bool>,
}

/// Per-connection command state, owned by the connection's command task.
struct Commands {
    delivery: DeliveryService,
    presence: PresenceRegistry,
    metrics: Metrics,
    handle: ConnectionHandle,
    user_id: Option<Uuid>,
}

impl Commands {
    /// Handles frames in arrival order until the socket loop hangs up.
    async fn run(mut self, mut inbound_rx: mpsc::Receiver<String>, reply_tx: mpsc::Sender<ServerEvent>) {
        while let Some(text) = inbound_rx.recv().await {
            let reply = self.handle_text(&text).await;
            if reply_tx.send(reply).await.is_err() {
                break;
            }
        }
    }

    async fn handle_text(&mut self, text: &str) -> ServerEvent {
        match serde_json::from_str::<ClientCommand>(text) {
            Ok(command) => self.handle(command).await,
            Err(e) => {
                tracing::debug!(error = %e, "Rejected malformed frame");
                self.metrics.rejected_frames_total.add(1, &[]);
                ServerEvent::MessageError(MessageError {
                    client_token: None,
                    code: "invalid-request".to_string(),
                    message: "Malformed frame".to_string(),
                })
            }
        }
    }

    async fn handle(&mut self, command: ClientCommand) -> ServerEvent {
        match command {
            ClientCommand::Join(join) => {
                // Rebinding a connection to another user drops its old binding first.
                self.presence.unregister(self.handle.connection_id());
                self.presence.register(join.user_id, self.handle.clone());
                self.user_id = Some(join.user_id);
                tracing::Span::current().record("user_id", tracing::field::display(join.user_id));
                tracing::info!(user.id = %join.user_id, "User joined");
                ServerEvent::Joined(Joined { user_id: join.user_id })
            }
            ClientCommand::SendMessage(send) => {
                let client_token = send.client_token.clone();
                if let Some(bound) = self.user_id
                    && bound != send.sender_id
                {
                    return Self::send_error(client_token, &AppError::Forbidden);
                }
                match self.delivery.send(send.into()).await {
                    Ok(receipt) => ServerEvent::MessageSent(receipt.into()),
                    Err(e) => Self::send_error(client_token, &e),
                }
            }
            ClientCommand::DeleteMessage(delete) => {
                let message_id = delete.message_id;
                let Some(requester_id) = self.user_id else {
                    let err = AppError::Validation("join before deleting messages".into());
                    return Self::delete_error(message_id, &err);
                };
                match self.delivery.delete_message(delete.into_request(requester_id)).await {
                    Ok(receipt) => ServerEvent::DeleteSucceeded(receipt.into()),
                    Err(e) => Self::delete_error(message_id, &e),
                }
            }
        }
    }

    fn send_error(client_token: Option<String>, err: &AppError) -> ServerEvent {
        ServerEvent::MessageError(MessageError {
            client_token,
            code: err.code().to_string(),
            message: err.client_message(),
        })
    }

    fn delete_error(message_id: Uuid, err: &AppError) -> ServerEvent {
        ServerEvent::DeleteFailed(DeleteFailed {
            message_id,
            code: err.code().to_string(),
            message: err.client_message(),
        })
    }
}

fn encode(event: &ServerEvent) -> Option<WsMessage> {
    match serde_json::to_string(event) {
        Ok(json) => Some(WsMessage::Text(json.into())),
        Err(e) => {
            tracing::error!(error = %e, "Failed to encode server event");
            None
        }
    }
}

impl Session {
    #[tracing::instrument(
        name = "websocket_session",
        skip(self),
        fields(
            request_id = %self.request_id,
            user_id = tracing::field::Empty,
            otel.kind = "server",
            ws.session_id = %Uuid::new_v4()
        )
    )]
    pub(crate) async fn run(self) {
        let Self { socket, delivery, presence, metrics, config, mut shutdown_rx, .. } = self;

        metrics.active_connections.add(1, &[]);
        tracing::info!("WebSocket connected");

        let (mut ws_sink, mut ws_stream) = socket.split();
        let (outbound_tx, mut outbound_rx) = mpsc::channel(config.outbound_buffer_size.max(1));
        let (inbound_tx, inbound_rx) = mpsc::channel::<String>(config.outbound_buffer_size.max(1));
        let (reply_tx, mut reply_rx) = mpsc::channel(config.outbound_buffer_size.max(1));

        let handle = ConnectionHandle::new(outbound_tx);
        let connection_id = handle.connection_id();
        let commands = Commands {
            delivery,
            presence: presence.clone(),
            metrics: metrics.clone(),
            handle,
            user_id: None,
        };
        // Commands run off the socket loop so pushed events keep draining during slow store writes.
        let command_task = tokio::spawn(commands.run(inbound_rx, reply_tx).instrument(tracing::Span::current()));

        loop {
            if *shutdown_rx.borrow() {
                tracing::info!("Shutdown signal received, closing WebSocket");
                let _ = ws_sink
                    .send(WsMessage::Close(Some(axum::extract::ws::CloseFrame {
                        code: axum::extract::ws::close_code::AWAY,
                        reason: "Server shutting down".into(),
                    })))
                    .await;
                break;
            }

            tokio::select! {
                biased;

                _ = shutdown_rx.changed() => {}

                reply = reply_rx.recv() => {
                    let Some(reply) = reply else { break };
                    if let Some(frame) = encode(&reply)
                        && ws_sink.send(frame).await.is_err()
                    {
                        break;
                    }
                }

                event = outbound_rx.recv() => {
                    let Some(event) = event else { break };
                    if let Some(frame) = encode(&event)
                        && ws_sink.send(frame).await.is_err()
                    {
                        break;
                    }
                }

                // Stop reading while the command queue is full; the client sees TCP backpressure.
                msg = ws_stream.next(), if inbound_tx.capacity() > 0 => {
                    match msg {
                        Some(Ok(WsMessage::Text(text))) => {
                            if inbound_tx.try_send(text.as_str().to_owned()).is_err() {
                                break;
                            }
                        }
                        Some(Ok(WsMessage::Binary(_))) => {
                            tracing::warn!("Received unexpected binary message");
                            metrics.rejected_frames_total.add(1, &[]);
                        }
                        Some(Ok(WsMessage::Ping(_))) => {
                            tracing::debug!("Received heartbeat ping from client");
                        }
                        Some(Ok(WsMessage::Pong(_))) => {
                            tracing::debug!("Received heartbeat pong from client");
                        }
                        Some(Ok(WsMessage::Close(_)) | Err(_)) | None => break,
                    }
                }
            }
        }

        // Let an in-flight command finish so its writes and pushes are not cut in half.
        drop(inbound_tx);
        drop(reply_rx);
        if let Err(e) = command_task.await {
            tracing::error!(error = %e, "WebSocket command task failed");
        }
        presence.unregister(connection_id);
        let _ = ws_sink.close().await;

        metrics.active_connections.add(-1, &[]);
        tracing::info!("WebSocket disconnected");
    }
}
