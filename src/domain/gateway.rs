//! Frames exchanged over the gateway socket.
//!
//! Every frame is a JSON object `{"event": "<name>", "data": {...}}`.

use crate::domain::message::{DeleteReceipt, DeleteRequest, Message, SendReceipt, SendRequest};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ClientCommand {
    Join(JoinCommand),
    SendMessage(SendMessageCommand),
    DeleteMessage(DeleteMessageCommand),
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinCommand {
    pub user_id: Uuid,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessageCommand {
    pub sender_id: Uuid,
    #[serde(default)]
    pub recipient_email: Option<String>,
    #[serde(default)]
    pub group_id: Option<Uuid>,
    pub text: String,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub scheduled_at: Option<OffsetDateTime>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub expire_at: Option<OffsetDateTime>,
    #[serde(default)]
    pub client_token: Option<String>,
}

impl From<SendMessageCommand> for SendRequest {
    fn from(cmd: SendMessageCommand) -> Self {
        Self {
            sender_id: cmd.sender_id,
            recipient_email: cmd.recipient_email,
            group_id: cmd.group_id,
            text: cmd.text,
            scheduled_at: cmd.scheduled_at,
            expire_at: cmd.expire_at,
            client_token: cmd.client_token,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteMessageCommand {
    pub message_id: Uuid,
    #[serde(default)]
    pub group_id: Option<Uuid>,
}

impl DeleteMessageCommand {
    #[must_use]
    pub const fn into_request(self, requester_id: Uuid) -> DeleteRequest {
        DeleteRequest { message_id: self.message_id, requester_id, group_id: self.group_id }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ServerEvent {
    Joined(Joined),
    MessageReceived(MessagePush),
    MessageSent(MessageAck),
    MessageError(MessageError),
    MessageExpired(MessageExpired),
    MessageDeleted(MessageDeleted),
    DeleteSucceeded(DeleteSucceeded),
    DeleteFailed(DeleteFailed),
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Joined {
    pub user_id: Uuid,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessagePush {
    pub id: Uuid,
    pub conversation_id: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_id: Option<Uuid>,
    pub sender_id: Uuid,
    pub sender_name: String,
    pub text: String,
    #[serde(with = "time::serde::rfc3339")]
    pub time: OffsetDateTime,
    pub is_burnout: bool,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "time::serde::rfc3339::option")]
    pub expire_at: Option<OffsetDateTime>,
    pub is_scheduled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "time::serde::rfc3339::option")]
    pub scheduled_at: Option<OffsetDateTime>,
}

impl MessagePush {
    #[must_use]
    pub fn new(message: &Message, sender_name: &str) -> Self {
        Self {
            id: message.id,
            conversation_id: message.conversation_id,
            group_id: message.destination.group_id(),
            sender_id: message.sender_id,
            sender_name: sender_name.to_string(),
            text: message.body.clone(),
            time: message.effective_time(),
            is_burnout: message.is_burnout,
            expire_at: message.expire_at,
            is_scheduled: message.is_scheduled,
            scheduled_at: message.scheduled_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageAck {
    #[serde(default)]
    pub client_token: Option<String>,
    pub message_id: Uuid,
    pub conversation_id: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_id: Option<Uuid>,
    #[serde(with = "time::serde::rfc3339")]
    pub time: OffsetDateTime,
    pub is_scheduled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "time::serde::rfc3339::option")]
    pub scheduled_at: Option<OffsetDateTime>,
    pub is_burnout: bool,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "time::serde::rfc3339::option")]
    pub expire_at: Option<OffsetDateTime>,
}

impl From<SendReceipt> for MessageAck {
    fn from(receipt: SendReceipt) -> Self {
        Self {
            client_token: receipt.client_token,
            message_id: receipt.message_id,
            conversation_id: receipt.conversation_id,
            group_id: receipt.group_id,
            time: receipt.time,
            is_scheduled: receipt.is_scheduled,
            scheduled_at: receipt.scheduled_at,
            is_burnout: receipt.is_burnout,
            expire_at: receipt.expire_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageError {
    #[serde(default)]
    pub client_token: Option<String>,
    pub code: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageExpired {
    pub message_id: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_id: Option<Uuid>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageDeleted {
    pub message_id: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_id: Option<Uuid>,
    pub deleted_by: Uuid,
    pub deleted_by_admin: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub deleted_at: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteSucceeded {
    pub message_id: Uuid,
}

impl From<DeleteReceipt> for DeleteSucceeded {
    fn from(receipt: DeleteReceipt) -> Self {
        Self { message_id: receipt.message_id }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteFailed {
    pub message_id: Uuid,
    pub code: String,
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn send_command_parses_with_optional_fields_missing() {
        let sender = Uuid::new_v4();
        let raw = json!({
            "event": "send-message",
            "data": { "senderId": sender, "recipientEmail": "bob@example.com", "text": "hi" }
        });

        let cmd: ClientCommand = serde_json::from_value(raw).expect("valid command");
        let ClientCommand::SendMessage(send) = cmd else {
            unreachable!("parsed into the wrong variant");
        };
        assert_eq!(send.sender_id, sender);
        assert_eq!(send.group_id, None);
        assert_eq!(send.scheduled_at, None);
        assert_eq!(send.client_token, None);
    }

    #[test]
    fn send_command_accepts_rfc3339_instants() {
        let raw = json!({
            "event": "send-message",
            "data": {
                "senderId": Uuid::new_v4(),
                "groupId": Uuid::new_v4(),
                "text": "later",
                "scheduledAt": "2030-01-01T10:00:00Z",
                "clientToken": "tmp-1"
            }
        });

        let ClientCommand::SendMessage(send) = serde_json::from_value(raw).expect("valid command") else {
            unreachable!("parsed into the wrong variant");
        };
        assert_eq!(send.scheduled_at.map(OffsetDateTime::year), Some(2030));
        assert_eq!(send.client_token.as_deref(), Some("tmp-1"));
    }

    #[test]
    fn server_events_use_kebab_case_tags() {
        let event = ServerEvent::MessageExpired(MessageExpired { message_id: Uuid::new_v4(), group_id: None });
        let value = serde_json::to_value(&event).expect("serializable");

        assert_eq!(value["event"], "message-expired");
        assert!(value["data"].get("groupId").is_none());
    }
}
