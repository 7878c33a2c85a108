use time::OffsetDateTime;
use uuid::Uuid;

/// Where a message goes. Exactly one of a direct recipient or a group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Destination {
    Direct { recipient_id: Uuid },
    Group { group_id: Uuid },
}

impl Destination {
    /// Rebuilds a destination from the two nullable storage columns.
    #[must_use]
    pub const fn from_columns(recipient_id: Option<Uuid>, group_id: Option<Uuid>) -> Option<Self> {
        match (recipient_id, group_id) {
            (Some(recipient_id), None) => Some(Self::Direct { recipient_id }),
            (None, Some(group_id)) => Some(Self::Group { group_id }),
            _ => None,
        }
    }

    #[must_use]
    pub const fn recipient_id(&self) -> Option<Uuid> {
        match self {
            Self::Direct { recipient_id } => Some(*recipient_id),
            Self::Group { .. } => None,
        }
    }

    #[must_use]
    pub const fn group_id(&self) -> Option<Uuid> {
        match self {
            Self::Direct { .. } => None,
            Self::Group { group_id } => Some(*group_id),
        }
    }
}

/// Where a message is in its life, derived from the flat persisted flags at a given instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    /// Scheduled for a future instant.
    PendingSend { scheduled_at: OffsetDateTime },
    /// Scheduled instant has passed but no sweep or timer has released it yet.
    DueForSend { scheduled_at: OffsetDateTime },
    /// Visible. Burnout messages carry their expiry.
    Live { expire_at: Option<OffsetDateTime> },
    /// Burnout window has closed but the message has not been retired yet.
    DueForExpiry { expire_at: OffsetDateTime },
    /// Soft-deleted, either by a user or by expiry.
    Retired { deleted_at: OffsetDateTime },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub(crate) id: Uuid,
    pub(crate) conversation_id: Uuid,
    pub(crate) sender_id: Uuid,
    pub(crate) destination: Destination,
    pub(crate) body: String,
    pub(crate) is_edited: bool,
    pub(crate) delivered: bool,
    pub(crate) is_scheduled: bool,
    pub(crate) scheduled_at: Option<OffsetDateTime>,
    pub(crate) is_burnout: bool,
    pub(crate) expire_at: Option<OffsetDateTime>,
    pub(crate) deleted_at: Option<OffsetDateTime>,
    pub(crate) created_at: OffsetDateTime,
}

impl Message {
    #[must_use]
    pub const fn id(&self) -> Uuid {
        self.id
    }

    #[must_use]
    pub const fn conversation_id(&self) -> Uuid {
        self.conversation_id
    }

    /// Time the message surfaces to readers: the scheduled instant if it had one.
    #[must_use]
    pub fn effective_time(&self) -> OffsetDateTime {
        self.scheduled_at.unwrap_or(self.created_at)
    }

    #[must_use]
    pub fn lifecycle_at(&self, now: OffsetDateTime) -> Lifecycle {
        if let Some(deleted_at) = self.deleted_at {
            return Lifecycle::Retired { deleted_at };
        }
        if self.is_scheduled
            && let Some(scheduled_at) = self.scheduled_at
        {
            return if scheduled_at > now {
                Lifecycle::PendingSend { scheduled_at }
            } else {
                Lifecycle::DueForSend { scheduled_at }
            };
        }
        match self.burnout_deadline() {
            Some(expire_at) if expire_at <= now => Lifecycle::DueForExpiry { expire_at },
            expire_at => Lifecycle::Live { expire_at },
        }
    }

    /// Whether this message may be a conversation's preview at `now`.
    #[must_use]
    pub fn is_previewable_at(&self, now: OffsetDateTime) -> bool {
        match self.lifecycle_at(now) {
            Lifecycle::Live { .. } => true,
            Lifecycle::DueForSend { .. } => !self.is_burnt_out_at(now),
            Lifecycle::PendingSend { .. } | Lifecycle::DueForExpiry { .. } | Lifecycle::Retired { .. } => false,
        }
    }

    /// Whether `viewer` may see this message in a history listing at `now`.
    /// Senders still see their own pending scheduled messages.
    #[must_use]
    pub fn is_visible_to(&self, viewer: Uuid, now: OffsetDateTime) -> bool {
        match self.lifecycle_at(now) {
            Lifecycle::Live { .. } => true,
            Lifecycle::PendingSend { .. } => self.sender_id == viewer,
            Lifecycle::DueForSend { .. } => !self.is_burnt_out_at(now),
            Lifecycle::DueForExpiry { .. } | Lifecycle::Retired { .. } => false,
        }
    }

    #[must_use]
    pub fn is_burnt_out_at(&self, now: OffsetDateTime) -> bool {
        self.burnout_deadline().is_some_and(|expire_at| expire_at <= now)
    }

    const fn burnout_deadline(&self) -> Option<OffsetDateTime> {
        if self.is_burnout { self.expire_at } else { None }
    }
}

/// Scheduling and burnout instants after the past-timestamp fallbacks have been applied.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeliveryTiming {
    pub scheduled_at: Option<OffsetDateTime>,
    pub expire_at: Option<OffsetDateTime>,
}

impl DeliveryTiming {
    /// A schedule that is not strictly in the future means "send now"; a burnout instant that
    /// is not strictly in the future is dropped and the message never expires.
    #[must_use]
    pub fn resolve(
        requested_schedule: Option<OffsetDateTime>,
        requested_expiry: Option<OffsetDateTime>,
        now: OffsetDateTime,
    ) -> Self {
        let scheduled_at = requested_schedule.filter(|at| *at > now);
        if let Some(at) = requested_schedule
            && scheduled_at.is_none()
        {
            tracing::warn!(scheduled_at = %at, "Schedule time is not in the future, sending now");
        }

        let expire_at = requested_expiry.filter(|at| *at > now);
        if let Some(at) = requested_expiry
            && expire_at.is_none()
        {
            tracing::warn!(expire_at = %at, "Burnout time is not in the future, ignoring burnout");
        }

        if let (Some(scheduled), Some(expires)) = (scheduled_at, expire_at)
            && expires < scheduled
        {
            tracing::warn!(
                scheduled_at = %scheduled,
                expire_at = %expires,
                "Burnout deadline precedes the scheduled send"
            );
        }

        Self { scheduled_at, expire_at }
    }

    #[must_use]
    pub const fn is_scheduled(&self) -> bool {
        self.scheduled_at.is_some()
    }

    #[must_use]
    pub const fn is_burnout(&self) -> bool {
        self.expire_at.is_some()
    }
}

/// A validated message ready to be persisted.
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub(crate) id: Uuid,
    pub(crate) conversation_id: Uuid,
    pub(crate) sender_id: Uuid,
    pub(crate) destination: Destination,
    pub(crate) body: String,
    pub(crate) timing: DeliveryTiming,
    pub(crate) created_at: OffsetDateTime,
}

impl NewMessage {
    #[must_use]
    pub fn new(
        conversation_id: Uuid,
        sender_id: Uuid,
        destination: Destination,
        body: String,
        timing: DeliveryTiming,
        created_at: OffsetDateTime,
    ) -> Self {
        Self { id: Uuid::now_v7(), conversation_id, sender_id, destination, body, timing, created_at }
    }

    /// The row as it looks right after insertion.
    #[must_use]
    pub fn into_message(self) -> Message {
        Message {
            id: self.id,
            conversation_id: self.conversation_id,
            sender_id: self.sender_id,
            destination: self.destination,
            body: self.body,
            is_edited: false,
            delivered: false,
            is_scheduled: self.timing.is_scheduled(),
            scheduled_at: self.timing.scheduled_at,
            is_burnout: self.timing.is_burnout(),
            expire_at: self.timing.expire_at,
            deleted_at: None,
            created_at: self.created_at,
        }
    }
}

/// Inbound send command as handed over by the gateway.
#[derive(Debug, Clone)]
pub struct SendRequest {
    pub sender_id: Uuid,
    pub recipient_email: Option<String>,
    pub group_id: Option<Uuid>,
    pub text: String,
    pub scheduled_at: Option<OffsetDateTime>,
    pub expire_at: Option<OffsetDateTime>,
    pub client_token: Option<String>,
}

/// Acknowledgment returned to the sender so the client can reconcile its optimistic copy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendReceipt {
    pub client_token: Option<String>,
    pub message_id: Uuid,
    pub conversation_id: Uuid,
    pub group_id: Option<Uuid>,
    pub time: OffsetDateTime,
    pub is_scheduled: bool,
    pub scheduled_at: Option<OffsetDateTime>,
    pub is_burnout: bool,
    pub expire_at: Option<OffsetDateTime>,
}

#[derive(Debug, Clone)]
pub struct DeleteRequest {
    pub message_id: Uuid,
    pub requester_id: Uuid,
    pub group_id: Option<Uuid>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteReceipt {
    pub message_id: Uuid,
    pub deleted_at: OffsetDateTime,
    pub deleted_by_admin: bool,
}
