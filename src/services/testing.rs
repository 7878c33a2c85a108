//! Service wiring over the in-memory store for unit tests.

use crate::adapters::memory::MemoryStore;
use crate::adapters::store::{ConversationStore, MessageStore};
use crate::config::{LifecycleConfig, MessagingConfig};
use crate::domain::conversation::Conversation;
use crate::domain::gateway::ServerEvent;
use crate::domain::group::Group;
use crate::domain::message::{Message, NewMessage, SendRequest};
use crate::domain::user::User;
use crate::error::{AppError, Result};
use crate::services::delivery_service::DeliveryService;
use crate::services::history_service::HistoryService;
use crate::services::lifecycle_service::LifecycleService;
use crate::services::presence::{ConnectionHandle, PresenceRegistry};
use crate::services::projector::ConversationProjector;
use async_trait::async_trait;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use time::OffsetDateTime;
use tokio::sync::mpsc;
use uuid::Uuid;

pub(crate) struct Harness {
    pub(crate) store: Arc<MemoryStore>,
    pub(crate) presence: PresenceRegistry,
    pub(crate) delivery: DeliveryService,
    pub(crate) lifecycle: LifecycleService,
    pub(crate) history: HistoryService,
    pub(crate) now: OffsetDateTime,
}

impl Harness {
    pub(crate) fn new() -> Self {
        let store = Arc::new(MemoryStore::new());
        Self::with_stores(Arc::clone(&store), store.clone(), store)
    }

    /// Same wiring, but conversation and message persistence go through the given stores.
    pub(crate) fn with_stores(
        store: Arc<MemoryStore>,
        conversations: Arc<dyn ConversationStore>,
        messages: Arc<dyn MessageStore>,
    ) -> Self {
        let presence = PresenceRegistry::new();
        let projector = ConversationProjector::new(Arc::clone(&conversations));
        let delivery = DeliveryService::new(
            store.clone(),
            Arc::clone(&conversations),
            Arc::clone(&messages),
            presence.clone(),
            projector.clone(),
            None,
            MessagingConfig::default(),
        );
        let lifecycle = LifecycleService::new(
            store.clone(),
            Arc::clone(&messages),
            delivery.clone(),
            presence.clone(),
            projector.clone(),
            LifecycleConfig::default(),
        );
        let history = HistoryService::new(store.clone(), conversations, messages, projector);

        Self { store, presence, delivery, lifecycle, history, now: OffsetDateTime::now_utc() }
    }

    /// Registers a user whose email is `<name>@example.com`.
    pub(crate) fn user(&self, name: &str) -> Uuid {
        let id = Uuid::new_v4();
        self.store.insert_user(User::new(id, format!("{name}@example.com"), name));
        id
    }

    pub(crate) fn group(&self, creator: Uuid, others: &[Uuid], admins: &[Uuid]) -> Uuid {
        let id = Uuid::new_v4();
        let mut members = vec![creator];
        members.extend_from_slice(others);
        self.store.insert_group(Group::new(id, "group", creator, members, admins.to_vec()));
        id
    }

    pub(crate) fn connect(&self, user_id: Uuid) -> mpsc::Receiver<ServerEvent> {
        let (tx, rx) = mpsc::channel(32);
        self.presence.register(user_id, ConnectionHandle::new(tx));
        rx
    }

    pub(crate) fn direct(sender_id: Uuid, recipient: &str, text: &str) -> SendRequest {
        SendRequest {
            sender_id,
            recipient_email: Some(format!("{recipient}@example.com")),
            group_id: None,
            text: text.to_string(),
            scheduled_at: None,
            expire_at: None,
            client_token: Some("tmp-1".to_string()),
        }
    }

    pub(crate) fn to_group(sender_id: Uuid, group_id: Uuid, text: &str) -> SendRequest {
        SendRequest {
            sender_id,
            recipient_email: None,
            group_id: Some(group_id),
            text: text.to_string(),
            scheduled_at: None,
            expire_at: None,
            client_token: None,
        }
    }

    pub(crate) async fn message(&self, id: Uuid) -> Message {
        MessageStore::find(self.store.as_ref(), id).await.expect("store read").expect("message exists")
    }

    pub(crate) async fn last_message_id(&self, conversation_id: Uuid) -> Option<Uuid> {
        ConversationStore::find(self.store.as_ref(), conversation_id)
            .await
            .expect("store read")
            .expect("conversation exists")
            .last_message_id()
    }
}

/// Everything currently queued on a test connection.
pub(crate) fn drain(rx: &mut mpsc::Receiver<ServerEvent>) -> Vec<ServerEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

/// Store wrapper whose individual operations can be made to fail like an unreachable database.
#[derive(Debug)]
pub(crate) struct FlakyStore {
    inner: Arc<MemoryStore>,
    fail_claims: AtomicBool,
    fail_expiry_selection: AtomicBool,
    fail_refresh: AtomicBool,
}

impl FlakyStore {
    pub(crate) fn new(inner: Arc<MemoryStore>) -> Self {
        Self {
            inner,
            fail_claims: AtomicBool::new(false),
            fail_expiry_selection: AtomicBool::new(false),
            fail_refresh: AtomicBool::new(false),
        }
    }

    pub(crate) fn fail_claims(&self, failing: bool) {
        self.fail_claims.store(failing, Ordering::SeqCst);
    }

    pub(crate) fn fail_expiry_selection(&self, failing: bool) {
        self.fail_expiry_selection.store(failing, Ordering::SeqCst);
    }

    pub(crate) fn fail_refresh(&self, failing: bool) {
        self.fail_refresh.store(failing, Ordering::SeqCst);
    }

    fn check(flag: &AtomicBool) -> Result<()> {
        if flag.load(Ordering::SeqCst) {
            return Err(AppError::Database(sqlx::Error::PoolTimedOut));
        }
        Ok(())
    }
}

#[async_trait]
impl ConversationStore for FlakyStore {
    async fn find_or_create_direct(&self, a: Uuid, b: Uuid, now: OffsetDateTime) -> Result<Conversation> {
        self.inner.find_or_create_direct(a, b, now).await
    }

    async fn find_or_create_group(&self, group: &Group, now: OffsetDateTime) -> Result<Conversation> {
        self.inner.find_or_create_group(group, now).await
    }

    async fn find(&self, conversation_id: Uuid) -> Result<Option<Conversation>> {
        ConversationStore::find(self.inner.as_ref(), conversation_id).await
    }

    async fn find_direct(&self, a: Uuid, b: Uuid) -> Result<Option<Conversation>> {
        self.inner.find_direct(a, b).await
    }

    async fn find_for_group(&self, group_id: Uuid) -> Result<Option<Conversation>> {
        self.inner.find_for_group(group_id).await
    }

    async fn list_for_user(&self, user_id: Uuid) -> Result<Vec<Conversation>> {
        self.inner.list_for_user(user_id).await
    }

    async fn refresh_last_message(&self, conversation_id: Uuid, now: OffsetDateTime) -> Result<Option<Uuid>> {
        Self::check(&self.fail_refresh)?;
        self.inner.refresh_last_message(conversation_id, now).await
    }
}

#[async_trait]
impl MessageStore for FlakyStore {
    async fn insert(&self, message: NewMessage) -> Result<Message> {
        self.inner.insert(message).await
    }

    async fn find(&self, message_id: Uuid) -> Result<Option<Message>> {
        MessageStore::find(self.inner.as_ref(), message_id).await
    }

    async fn mark_delivered(&self, message_id: Uuid) -> Result<()> {
        self.inner.mark_delivered(message_id).await
    }

    async fn due_scheduled(&self, now: OffsetDateTime, limit: i64) -> Result<Vec<Message>> {
        self.inner.due_scheduled(now, limit).await
    }

    async fn due_expired(&self, now: OffsetDateTime, limit: i64) -> Result<Vec<Message>> {
        Self::check(&self.fail_expiry_selection)?;
        self.inner.due_expired(now, limit).await
    }

    async fn claim_scheduled(&self, message_id: Uuid, now: OffsetDateTime) -> Result<Option<Message>> {
        Self::check(&self.fail_claims)?;
        self.inner.claim_scheduled(message_id, now).await
    }

    async fn expire(&self, message_id: Uuid, now: OffsetDateTime) -> Result<Option<Message>> {
        self.inner.expire(message_id, now).await
    }

    async fn redact(&self, message_id: Uuid, placeholder: &str, now: OffsetDateTime) -> Result<Option<Message>> {
        self.inner.redact(message_id, placeholder, now).await
    }

    async fn history(&self, conversation_id: Uuid, viewer: Uuid, now: OffsetDateTime) -> Result<Vec<Message>> {
        self.inner.history(conversation_id, viewer, now).await
    }
}
