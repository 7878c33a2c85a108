use crate::domain::gateway::ServerEvent;
use dashmap::DashMap;
use opentelemetry::{
    KeyValue, global,
    metrics::{Counter, UpDownCounter},
};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use uuid::Uuid;

#[derive(Clone, Debug)]
pub(crate) struct Metrics {
    pub(crate) online_users: UpDownCounter<i64>,
    pub(crate) pushes_total: Counter<u64>,
}

impl Metrics {
    fn new() -> Self {
        let meter = global::meter("courier-server");
        Self {
            online_users: meter
                .i64_up_down_counter("courier_online_users")
                .with_description("Number of users bound to a live connection")
                .build(),
            pushes_total: meter
                .u64_counter("courier_pushes_total")
                .with_description("Events pushed to live connections, by outcome")
                .build(),
        }
    }
}

/// Sending half of one live connection's outbound queue.
#[derive(Clone, Debug)]
pub struct ConnectionHandle {
    connection_id: Uuid,
    tx: mpsc::Sender<ServerEvent>,
}

impl ConnectionHandle {
    #[must_use]
    pub fn new(tx: mpsc::Sender<ServerEvent>) -> Self {
        Self { connection_id: Uuid::new_v4(), tx }
    }

    #[must_use]
    pub const fn connection_id(&self) -> Uuid {
        self.connection_id
    }

    /// Queues an event without waiting. Returns `false` if the connection is gone or its buffer
    /// is full, in which case the event is dropped.
    pub fn push(&self, event: ServerEvent) -> bool {
        match self.tx.try_send(event) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                tracing::warn!(connection.id = %self.connection_id, "Outbound buffer full, dropping event");
                false
            }
            Err(TrySendError::Closed(_)) => false,
        }
    }
}

#[derive(Debug, Default)]
struct Bindings {
    by_user: DashMap<Uuid, ConnectionHandle>,
    by_connection: DashMap<Uuid, Uuid>,
}

/// In-memory map from user to their current connection. Last `register` wins.
#[derive(Clone, Debug)]
pub struct PresenceRegistry {
    bindings: Arc<Bindings>,
    metrics: Metrics,
}

impl Default for PresenceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl PresenceRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self { bindings: Arc::new(Bindings::default()), metrics: Metrics::new() }
    }

    /// Binds `user_id` to `handle`, replacing any previous binding. The replaced connection
    /// stays open but is no longer reachable through the registry.
    pub fn register(&self, user_id: Uuid, handle: ConnectionHandle) {
        self.bindings.by_connection.insert(handle.connection_id, user_id);
        match self.bindings.by_user.insert(user_id, handle) {
            Some(previous) => {
                self.bindings.by_connection.remove(&previous.connection_id);
                tracing::debug!(user.id = %user_id, "Replaced existing connection binding");
            }
            None => self.metrics.online_users.add(1, &[]),
        }
    }

    #[must_use]
    pub fn lookup(&self, user_id: Uuid) -> Option<ConnectionHandle> {
        self.bindings.by_user.get(&user_id).map(|entry| entry.value().clone())
    }

    /// Removes whichever binding points at `connection_id`. Idempotent; returns the user that
    /// was unbound, if any.
    pub fn unregister(&self, connection_id: Uuid) -> Option<Uuid> {
        let (_, user_id) = self.bindings.by_connection.remove(&connection_id)?;
        let removed = self.bindings.by_user.remove_if(&user_id, |_, handle| handle.connection_id == connection_id);
        if removed.is_some() {
            self.metrics.online_users.add(-1, &[]);
            Some(user_id)
        } else {
            None
        }
    }

    /// Pushes to the user's current connection. Returns `false` when the user is offline or
    /// the push was dropped.
    pub fn push_to(&self, user_id: Uuid, event: ServerEvent) -> bool {
        let delivered = self.lookup(user_id).is_some_and(|handle| handle.push(event));
        let outcome = if delivered { "delivered" } else { "unreachable" };
        self.metrics.pushes_total.add(1, &[KeyValue::new("outcome", outcome)]);
        delivered
    }

    #[must_use]
    pub fn online_count(&self) -> usize {
        self.bindings.by_user.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::gateway::Joined;

    fn handle(capacity: usize) -> (ConnectionHandle, mpsc::Receiver<ServerEvent>) {
        let (tx, rx) = mpsc::channel(capacity);
        (ConnectionHandle::new(tx), rx)
    }

    fn joined(user_id: Uuid) -> ServerEvent {
        ServerEvent::Joined(Joined { user_id })
    }

    #[test]
    fn last_register_wins() {
        let registry = PresenceRegistry::new();
        let user = Uuid::new_v4();
        let (first, _rx1) = handle(1);
        let (second, _rx2) = handle(1);

        registry.register(user, first);
        registry.register(user, second.clone());

        assert_eq!(registry.lookup(user).map(|h| h.connection_id()), Some(second.connection_id()));
        assert_eq!(registry.online_count(), 1);
    }

    #[test]
    fn unregistering_a_replaced_connection_keeps_the_new_binding() {
        let registry = PresenceRegistry::new();
        let user = Uuid::new_v4();
        let (old, _rx1) = handle(1);
        let (new, _rx2) = handle(1);
        let old_id = old.connection_id();

        registry.register(user, old);
        registry.register(user, new);

        assert_eq!(registry.unregister(old_id), None);
        assert!(registry.lookup(user).is_some());
    }

    #[test]
    fn unregister_is_idempotent() {
        let registry = PresenceRegistry::new();
        let user = Uuid::new_v4();
        let (h, _rx) = handle(1);
        let id = h.connection_id();
        registry.register(user, h);

        assert_eq!(registry.unregister(id), Some(user));
        assert_eq!(registry.unregister(id), None);
        assert!(registry.lookup(user).is_none());
        assert_eq!(registry.online_count(), 0);
    }

    #[tokio::test]
    async fn push_reaches_the_bound_connection() {
        let registry = PresenceRegistry::new();
        let user = Uuid::new_v4();
        let (h, mut rx) = handle(4);
        registry.register(user, h);

        assert!(registry.push_to(user, joined(user)));
        assert_eq!(rx.recv().await, Some(joined(user)));
        assert!(!registry.push_to(Uuid::new_v4(), joined(user)), "offline users are unreachable");
    }

    #[test]
    fn full_buffer_counts_as_failed_push() {
        let registry = PresenceRegistry::new();
        let user = Uuid::new_v4();
        let (h, _rx) = handle(1);
        registry.register(user, h);

        assert!(registry.push_to(user, joined(user)));
        assert!(!registry.push_to(user, joined(user)));
    }
}
