use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub(crate) id: Uuid,
    pub(crate) email: String,
    pub(crate) full_name: String,
    #[allow(dead_code)]
    pub(crate) created_at: Option<OffsetDateTime>,
}

impl User {
    #[must_use]
    pub fn new(id: Uuid, email: impl Into<String>, full_name: impl Into<String>) -> Self {
        Self { id, email: email.into(), full_name: full_name.into(), created_at: None }
    }

    #[must_use]
    pub const fn id(&self) -> Uuid {
        self.id
    }
}
