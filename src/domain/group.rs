use uuid::Uuid;

/// Group membership as seen by the delivery core. Membership administration lives elsewhere.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Group {
    pub(crate) id: Uuid,
    pub(crate) name: String,
    pub(crate) creator_id: Uuid,
    pub(crate) members: Vec<Uuid>,
    pub(crate) admins: Vec<Uuid>,
}

impl Group {
    #[must_use]
    pub fn new(id: Uuid, name: impl Into<String>, creator_id: Uuid, members: Vec<Uuid>, admins: Vec<Uuid>) -> Self {
        Self { id, name: name.into(), creator_id, members, admins }
    }

    #[must_use]
    pub const fn id(&self) -> Uuid {
        self.id
    }

    #[must_use]
    pub fn is_member(&self, user_id: Uuid) -> bool {
        self.members.contains(&user_id)
    }

    /// The creator always counts as an admin.
    #[must_use]
    pub fn is_admin(&self, user_id: Uuid) -> bool {
        self.creator_id == user_id || self.admins.contains(&user_id)
    }

    /// Everyone who should receive a message from `sender_id`.
    pub fn recipients_excluding(&self, sender_id: Uuid) -> impl Iterator<Item = Uuid> + '_ {
        self.members.iter().copied().filter(move |id| *id != sender_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn creator_is_admin_without_being_listed() {
        let creator = Uuid::new_v4();
        let member = Uuid::new_v4();
        let group = Group::new(Uuid::new_v4(), "family", creator, vec![creator, member], vec![]);

        assert!(group.is_admin(creator));
        assert!(!group.is_admin(member));
        assert!(group.is_member(member));
    }

    #[test]
    fn recipients_exclude_the_sender() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let c = Uuid::new_v4();
        let group = Group::new(Uuid::new_v4(), "trio", a, vec![a, b, c], vec![]);

        let recipients: Vec<_> = group.recipients_excluding(b).collect();
        assert_eq!(recipients, vec![a, c]);
    }
}
