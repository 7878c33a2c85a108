use crate::adapters::store::{ConversationStore, Directory, MessageStore};
use crate::config::MessagingConfig;
use crate::domain::gateway::{MessageDeleted, MessagePush, ServerEvent};
use crate::domain::message::{
    DeleteReceipt, DeleteRequest, DeliveryTiming, Destination, Message, NewMessage, SendReceipt, SendRequest,
};
use crate::domain::user::User;
use crate::error::{AppError, Result};
use crate::services::presence::PresenceRegistry;
use crate::services::projector::ConversationProjector;
use crate::services::timers::LifecycleTimers;
use opentelemetry::{KeyValue, global, metrics::Counter};
use std::sync::Arc;
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Clone, Debug)]
struct Metrics {
    sent_total: Counter<u64>,
    deleted_total: Counter<u64>,
}

impl Metrics {
    fn new() -> Self {
        let meter = global::meter("courier-server");
        Self {
            sent_total: meter
                .u64_counter("courier_messages_sent_total")
                .with_description("Send requests handled, by status and mode")
                .build(),
            deleted_total: meter
                .u64_counter("courier_messages_deleted_total")
                .with_description("Messages redacted by their sender or a group admin")
                .build(),
        }
    }
}

enum Target<'a> {
    Direct { email: &'a str },
    Group { group_id: Uuid },
}

/// Validates, persists and routes messages, and redacts them on request.
#[derive(Clone, Debug)]
pub struct DeliveryService {
    directory: Arc<dyn Directory>,
    conversations: Arc<dyn ConversationStore>,
    messages: Arc<dyn MessageStore>,
    presence: PresenceRegistry,
    projector: ConversationProjector,
    timers: Option<LifecycleTimers>,
    config: MessagingConfig,
    metrics: Metrics,
}

impl DeliveryService {
    #[must_use]
    pub fn new(
        directory: Arc<dyn Directory>,
        conversations: Arc<dyn ConversationStore>,
        messages: Arc<dyn MessageStore>,
        presence: PresenceRegistry,
        projector: ConversationProjector,
        timers: Option<LifecycleTimers>,
        config: MessagingConfig,
    ) -> Self {
        Self { directory, conversations, messages, presence, projector, timers, config, metrics: Metrics::new() }
    }

    /// Sends a message on behalf of `request.sender_id`.
    ///
    /// # Errors
    /// See [`Self::send_at`].
    pub async fn send(&self, request: SendRequest) -> Result<SendReceipt> {
        self.send_at(request, OffsetDateTime::now_utc()).await
    }

    /// Sends a message as of `now`. Immediate messages are pushed to every reachable recipient
    /// and projected; scheduled ones are only persisted and left to the lifecycle worker.
    ///
    /// # Errors
    /// Returns `AppError::Validation` for an empty or oversized text or an ambiguous destination.
    /// Returns `AppError::NotFound` if the sender, recipient or group cannot be resolved.
    /// Returns `AppError::Database` if persistence fails.
    #[tracing::instrument(
        err(level = "warn"),
        skip(self, request, now),
        fields(sender.id = %request.sender_id, message.id = tracing::field::Empty)
    )]
    pub async fn send_at(&self, request: SendRequest, now: OffsetDateTime) -> Result<SendReceipt> {
        let result = self.route(request, now).await;
        let (status, mode) = match &result {
            Ok(receipt) if receipt.is_scheduled => ("success", "scheduled"),
            Ok(_) => ("success", "immediate"),
            Err(_) => ("failure", "none"),
        };
        self.metrics.sent_total.add(1, &[KeyValue::new("status", status), KeyValue::new("mode", mode)]);
        result
    }

    async fn route(&self, request: SendRequest, now: OffsetDateTime) -> Result<SendReceipt> {
        if request.text.trim().is_empty() {
            return Err(AppError::Validation("text must not be empty".into()));
        }
        if request.text.len() > self.config.max_text_bytes {
            return Err(AppError::Validation(format!("text exceeds {} bytes", self.config.max_text_bytes)));
        }
        let target = match (request.recipient_email.as_deref(), request.group_id) {
            (Some(email), None) => Target::Direct { email },
            (None, Some(group_id)) => Target::Group { group_id },
            _ => return Err(AppError::Validation("exactly one of recipientEmail or groupId is required".into())),
        };

        let sender = self.directory.find_user(request.sender_id).await?.ok_or(AppError::NotFound("sender"))?;
        let timing = DeliveryTiming::resolve(request.scheduled_at, request.expire_at, now);

        let (conversation, destination, audience) = match target {
            Target::Direct { email } => {
                let recipient =
                    self.directory.find_user_by_email(email).await?.ok_or(AppError::NotFound("recipient"))?;
                let conversation = self.conversations.find_or_create_direct(sender.id(), recipient.id(), now).await?;
                (conversation, Destination::Direct { recipient_id: recipient.id() }, vec![recipient.id()])
            }
            Target::Group { group_id } => {
                let group = self.directory.find_group(group_id).await?.ok_or(AppError::NotFound("group"))?;
                let conversation = self.conversations.find_or_create_group(&group, now).await?;
                let audience = group.recipients_excluding(sender.id()).collect();
                (conversation, Destination::Group { group_id }, audience)
            }
        };

        let new_message = NewMessage::new(conversation.id(), sender.id(), destination, request.text, timing, now);
        let message = self.messages.insert(new_message).await?;
        tracing::Span::current().record("message.id", tracing::field::display(message.id()));

        if message.is_scheduled {
            tracing::debug!(scheduled_at = ?message.scheduled_at, "Message deferred until its scheduled time");
        } else {
            self.push_to(&message, &sender, &audience).await;
            if let Err(e) = self.projector.project(message.conversation_id(), now).await {
                tracing::warn!(error = %e, "Failed to update conversation preview");
            }
        }

        if let Some(timers) = &self.timers {
            timers.arm_for(&message, now);
        }

        Ok(SendReceipt {
            client_token: request.client_token,
            message_id: message.id(),
            conversation_id: message.conversation_id(),
            group_id: message.destination.group_id(),
            time: message.effective_time(),
            is_scheduled: message.is_scheduled,
            scheduled_at: message.scheduled_at,
            is_burnout: message.is_burnout,
            expire_at: message.expire_at,
        })
    }

    /// Pushes a message that just left the scheduled state, resolving its sender and audience
    /// from current directory state. Returns how many recipients were reached.
    ///
    /// # Errors
    /// Returns `AppError::NotFound` if the sender or group no longer exists.
    /// Returns `AppError::Database` if the directory lookup fails.
    pub(crate) async fn release(&self, message: &Message) -> Result<usize> {
        let sender = self.directory.find_user(message.sender_id).await?.ok_or(AppError::NotFound("sender"))?;
        let audience = match message.destination {
            Destination::Direct { recipient_id } => vec![recipient_id],
            Destination::Group { group_id } => {
                let group = self.directory.find_group(group_id).await?.ok_or(AppError::NotFound("group"))?;
                group.recipients_excluding(message.sender_id).collect()
            }
        };
        Ok(self.push_to(message, &sender, &audience).await)
    }

    /// Pushes `message` to every reachable user in `audience`, flagging it delivered when at
    /// least one push went through. A failed flag write is logged; the push already happened.
    async fn push_to(&self, message: &Message, sender: &User, audience: &[Uuid]) -> usize {
        let push = MessagePush::new(message, &sender.full_name);
        let reached = audience
            .iter()
            .filter(|user_id| self.presence.push_to(**user_id, ServerEvent::MessageReceived(push.clone())))
            .count();

        tracing::debug!(audience = audience.len(), reached, "Message pushed");
        if reached > 0
            && let Err(e) = self.messages.mark_delivered(message.id()).await
        {
            tracing::warn!(error = %e, message.id = %message.id(), "Failed to flag message as delivered");
        }
        reached
    }

    /// Deletes a message on behalf of `request.requester_id`.
    ///
    /// # Errors
    /// See [`Self::delete_message_at`].
    pub async fn delete_message(&self, request: DeleteRequest) -> Result<DeleteReceipt> {
        self.delete_message_at(request, OffsetDateTime::now_utc()).await
    }

    /// Redacts a message and tells every other reachable participant about it.
    ///
    /// # Errors
    /// Returns `AppError::NotFound` if the message does not exist or is already deleted.
    /// Returns `AppError::Validation` if a supplied group id does not match the message.
    /// Returns `AppError::Forbidden` if the requester is neither the sender nor a group admin.
    /// Returns `AppError::Database` if persistence fails.
    #[tracing::instrument(
        err(level = "warn"),
        skip(self, request, now),
        fields(message.id = %request.message_id, requester.id = %request.requester_id)
    )]
    pub async fn delete_message_at(&self, request: DeleteRequest, now: OffsetDateTime) -> Result<DeleteReceipt> {
        let message = self
            .messages
            .find(request.message_id)
            .await?
            .filter(|m| m.deleted_at.is_none())
            .ok_or(AppError::NotFound("message"))?;

        if let Some(group_id) = request.group_id
            && message.destination.group_id() != Some(group_id)
        {
            return Err(AppError::Validation("groupId does not match the message".into()));
        }

        let is_sender = message.sender_id == request.requester_id;
        let (is_admin, mut participants) = match message.destination {
            Destination::Direct { recipient_id } => (false, vec![message.sender_id, recipient_id]),
            Destination::Group { group_id } => {
                let group = self.directory.find_group(group_id).await?.ok_or(AppError::NotFound("group"))?;
                let mut participants = group.members.clone();
                participants.push(message.sender_id);
                (group.is_admin(request.requester_id), participants)
            }
        };
        if !is_sender && !is_admin {
            return Err(AppError::Forbidden);
        }

        let redacted = self
            .messages
            .redact(message.id(), &self.config.deleted_placeholder, now)
            .await?
            .ok_or(AppError::NotFound("message"))?;

        let deleted_by_admin = !is_sender;
        let event = MessageDeleted {
            message_id: redacted.id(),
            group_id: redacted.destination.group_id(),
            deleted_by: request.requester_id,
            deleted_by_admin,
            deleted_at: now,
        };
        // Nobody else has seen a message that is still waiting for its scheduled instant.
        if redacted.is_scheduled {
            participants = vec![redacted.sender_id];
        }
        participants.sort_unstable();
        participants.dedup();
        for user_id in participants.into_iter().filter(|id| *id != request.requester_id) {
            self.presence.push_to(user_id, ServerEvent::MessageDeleted(event.clone()));
        }

        if let Err(e) = self.projector.project(redacted.conversation_id(), now).await {
            tracing::warn!(error = %e, "Failed to update conversation preview");
        }

        self.metrics.deleted_total.add(1, &[KeyValue::new("by_admin", deleted_by_admin)]);
        tracing::info!(by_admin = deleted_by_admin, "Message deleted");
        Ok(DeleteReceipt { message_id: redacted.id(), deleted_at: now, deleted_by_admin })
    }
}
