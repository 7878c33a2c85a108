pub(crate) mod session;

use crate::config::WsConfig;
use crate::services::delivery_service::DeliveryService;
use crate::services::gateway::session::Session;
use crate::services::presence::PresenceRegistry;
use axum::extract::ws::WebSocket;
use opentelemetry::{
    global,
    metrics::{Counter, UpDownCounter},
};
use tokio::sync::watch;

#[derive(Clone, Debug)]
pub(crate) struct Metrics {
    pub(crate) active_connections: UpDownCounter<i64>,
    pub(crate) rejected_frames_total: Counter<u64>,
}

impl Metrics {
    #[must_use]
    pub(crate) fn new() -> Self {
        let meter = global::meter("courier-server");
        Self {
            active_connections: meter
                .i64_up_down_counter("websocket_active_connections")
                .with_description("Number of active WebSocket connections")
                .build(),
            rejected_frames_total: meter
                .u64_counter("websocket_rejected_frames_total")
                .with_description("Inbound frames that could not be parsed")
                .build(),
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Clone, Debug)]
pub struct GatewayService {
    delivery: DeliveryService,
    presence: PresenceRegistry,
    config: WsConfig,
    metrics: Metrics,
}

impl GatewayService {
    #[must_use]
    pub fn new(delivery: DeliveryService, presence: PresenceRegistry, config: WsConfig) -> Self {
        Self { delivery, presence, config, metrics: Metrics::new() }
    }

    pub async fn handle_socket(&self, socket: WebSocket, request_id: String, shutdown_rx: watch::Receiver<bool>) {
        let session = Session {
            request_id,
            socket,
            delivery: self.delivery.clone(),
            presence: self.presence.clone(),
            metrics: self.metrics.clone(),
            config: self.config.clone(),
            shutdown_rx,
        };

        session.run().await;
    }
}
