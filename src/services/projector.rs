use crate::adapters::store::ConversationStore;
use crate::error::Result;
use std::sync::Arc;
use time::OffsetDateTime;
use uuid::Uuid;

/// Recomputes a conversation's preview pointer from current message state.
///
/// Always a full recompute: messages drift in and out of eligibility with time alone, so the
/// cached pointer cannot be patched incrementally. The store selects and writes in one step, so
/// concurrent projections of the same conversation cannot land out of order.
#[derive(Clone, Debug)]
pub struct ConversationProjector {
    conversations: Arc<dyn ConversationStore>,
}

impl ConversationProjector {
    #[must_use]
    pub fn new(conversations: Arc<dyn ConversationStore>) -> Self {
        Self { conversations }
    }

    /// Points the conversation at its newest previewable message, or clears the pointer.
    ///
    /// # Errors
    /// Returns `AppError::Database` if the store fails.
    #[tracing::instrument(level = "debug", skip(self), fields(last_message_id = tracing::field::Empty))]
    pub async fn project(&self, conversation_id: Uuid, now: OffsetDateTime) -> Result<Option<Uuid>> {
        let latest = self.conversations.refresh_last_message(conversation_id, now).await?;

        if let Some(id) = latest {
            tracing::Span::current().record("last_message_id", tracing::field::display(id));
        }
        Ok(latest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::MemoryStore;
    use crate::adapters::store::MessageStore;
    use crate::domain::message::{DeliveryTiming, Destination, NewMessage};
    use time::Duration;

    struct Fixture {
        store: Arc<MemoryStore>,
        projector: ConversationProjector,
        conversation_id: Uuid,
        sender: Uuid,
        recipient: Uuid,
        now: OffsetDateTime,
    }

    async fn fixture() -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let now = OffsetDateTime::now_utc();
        let sender = Uuid::new_v4();
        let recipient = Uuid::new_v4();
        let conversation = store.find_or_create_direct(sender, recipient, now).await.expect("conversation");
        let projector = ConversationProjector::new(store.clone());
        Fixture { store, projector, conversation_id: conversation.id(), sender, recipient, now }
    }

    impl Fixture {
        async fn insert(&self, timing: DeliveryTiming, created_at: OffsetDateTime) -> Uuid {
            let message = NewMessage::new(
                self.conversation_id,
                self.sender,
                Destination::Direct { recipient_id: self.recipient },
                "hello".to_string(),
                timing,
                created_at,
            );
            self.store.insert(message).await.expect("insert").id()
        }

        async fn pointer(&self) -> Option<Uuid> {
            ConversationStore::find(self.store.as_ref(), self.conversation_id)
                .await
                .expect("find")
                .and_then(|c| c.last_message_id())
        }
    }

    #[tokio::test]
    async fn future_scheduled_message_is_never_the_preview() {
        let f = fixture().await;
        let visible = f.insert(DeliveryTiming::default(), f.now).await;
        f.insert(DeliveryTiming { scheduled_at: Some(f.now + Duration::minutes(5)), expire_at: None }, f.now)
            .await;

        assert_eq!(f.projector.project(f.conversation_id, f.now).await.expect("project"), Some(visible));
        assert_eq!(f.pointer().await, Some(visible));
    }

    #[tokio::test]
    async fn expired_burnout_message_drops_out_of_the_preview() {
        let f = fixture().await;
        let older = f.insert(DeliveryTiming::default(), f.now - Duration::seconds(30)).await;
        let expire_at = f.now + Duration::seconds(10);
        let burnout = f.insert(DeliveryTiming { scheduled_at: None, expire_at: Some(expire_at) }, f.now).await;

        assert_eq!(f.projector.project(f.conversation_id, f.now).await.expect("project"), Some(burnout));
        assert_eq!(f.projector.project(f.conversation_id, expire_at).await.expect("project"), Some(older));
    }

    #[tokio::test]
    async fn pointer_is_cleared_when_nothing_qualifies() {
        let f = fixture().await;
        let id = f.insert(DeliveryTiming::default(), f.now).await;
        f.projector.project(f.conversation_id, f.now).await.expect("project");
        assert_eq!(f.pointer().await, Some(id));

        f.store.redact(id, "message deleted", f.now).await.expect("redact");
        assert_eq!(f.projector.project(f.conversation_id, f.now).await.expect("project"), None);
        assert_eq!(f.pointer().await, None);
    }

    #[tokio::test]
    async fn projecting_twice_yields_the_same_pointer() {
        let f = fixture().await;
        f.insert(DeliveryTiming::default(), f.now - Duration::seconds(1)).await;
        f.insert(DeliveryTiming::default(), f.now).await;

        let first = f.projector.project(f.conversation_id, f.now).await.expect("first");
        let second = f.projector.project(f.conversation_id, f.now).await.expect("second");
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn released_schedule_orders_by_its_instant() {
        let f = fixture().await;
        let at = f.now + Duration::minutes(1);
        let scheduled = f.insert(DeliveryTiming { scheduled_at: Some(at), expire_at: None }, f.now).await;
        // Sent after the scheduled one was created but effective earlier than its instant.
        f.insert(DeliveryTiming::default(), f.now + Duration::seconds(1)).await;

        f.store.claim_scheduled(scheduled, at).await.expect("claim");
        assert_eq!(f.projector.project(f.conversation_id, at).await.expect("project"), Some(scheduled));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_projections_never_restore_a_deleted_message() {
        let f = fixture().await;
        let older = f.insert(DeliveryTiming::default(), f.now - Duration::seconds(5)).await;
        let newest = f.insert(DeliveryTiming::default(), f.now).await;
        f.projector.project(f.conversation_id, f.now).await.expect("project");

        let mut tasks = Vec::new();
        for _ in 0..32 {
            let projector = f.projector.clone();
            let (conversation_id, now) = (f.conversation_id, f.now);
            tasks.push(tokio::spawn(async move { projector.project(conversation_id, now).await }));
        }
        f.store.redact(newest, "message deleted", f.now).await.expect("redact");
        f.projector.project(f.conversation_id, f.now).await.expect("project after delete");

        for task in tasks {
            task.await.expect("join").expect("project");
        }
        assert_eq!(f.pointer().await, Some(older));
    }
}
