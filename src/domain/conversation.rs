use time::OffsetDateTime;
use uuid::Uuid;

/// Who a conversation binds. Direct pairs are stored in a fixed order so that the pair
/// `(a, b)` and `(b, a)` map to the same conversation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Participants {
    Direct { pair: [Uuid; 2] },
    Group { group_id: Uuid, members: Vec<Uuid> },
}

impl Participants {
    #[must_use]
    pub fn direct(a: Uuid, b: Uuid) -> Self {
        let pair = if a <= b { [a, b] } else { [b, a] };
        Self::Direct { pair }
    }

    #[must_use]
    pub const fn is_group(&self) -> bool {
        matches!(self, Self::Group { .. })
    }

    #[must_use]
    pub const fn group_id(&self) -> Option<Uuid> {
        match self {
            Self::Direct { .. } => None,
            Self::Group { group_id, .. } => Some(*group_id),
        }
    }

    #[must_use]
    pub fn members(&self) -> &[Uuid] {
        match self {
            Self::Direct { pair } => pair.as_slice(),
            Self::Group { members, .. } => members.as_slice(),
        }
    }

    #[must_use]
    pub fn contains(&self, user_id: Uuid) -> bool {
        self.members().contains(&user_id)
    }

    /// For a direct conversation, the participant that is not `user_id`.
    #[must_use]
    pub fn peer_of(&self, user_id: Uuid) -> Option<Uuid> {
        match self {
            Self::Direct { pair: [a, b] } if *a == user_id => Some(*b),
            Self::Direct { pair: [a, b] } if *b == user_id => Some(*a),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conversation {
    pub(crate) id: Uuid,
    pub(crate) participants: Participants,
    /// Preview cache maintained by the projector. Never trusted without re-checking eligibility.
    pub(crate) last_message_id: Option<Uuid>,
    pub(crate) created_at: OffsetDateTime,
    pub(crate) updated_at: OffsetDateTime,
}

impl Conversation {
    #[must_use]
    pub fn new(participants: Participants, now: OffsetDateTime) -> Self {
        Self { id: Uuid::now_v7(), participants, last_message_id: None, created_at: now, updated_at: now }
    }

    #[must_use]
    pub const fn id(&self) -> Uuid {
        self.id
    }

    #[must_use]
    pub const fn last_message_id(&self) -> Option<Uuid> {
        self.last_message_id
    }
}
