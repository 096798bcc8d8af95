//! Chat messages and the inbound chat operation.
//!
//! Clients send one of two shapes under the `chat message` event:
//! - a plain message: `{id, text, replyTo?, userId?}`
//! - a mutation: `{type: "edit", id, text}`, `{type: "delete", id}` or
//!   `{type: "reaction", messageId, reaction}`
//!
//! Both are resolved into a [`ChatOp`] during deserialization, so the
//! rest of the crate never inspects the raw payload again.

use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::id::{MessageId, UserId};

/// Snapshot of the message being replied to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplyRef {
    pub id: MessageId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<UserId>,
    #[serde(default)]
    pub text: String,
}

/// A reaction attached to a message (an emoji on the wire).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Reaction(String);

impl Reaction {
    pub fn new(emoji: impl Into<String>) -> Self {
        Self(emoji.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// One entry of a session's message log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: MessageId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<UserId>,
    #[serde(default)]
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<ReplyRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reaction: Option<Reaction>,
}

impl Message {
    pub fn new(id: impl Into<MessageId>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            user_id: None,
            text: text.into(),
            reply_to: None,
            reaction: None,
        }
    }
}

/// An inbound chat operation against the session log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "WireChat", into = "WireChat")]
pub enum ChatOp {
    Send(Message),
    Edit { id: MessageId, text: String },
    Delete { id: MessageId },
    React { message_id: MessageId, reaction: Reaction },
}

impl ChatOp {
    /// The message id this operation targets.
    pub fn target(&self) -> &MessageId {
        match self {
            ChatOp::Send(message) => &message.id,
            ChatOp::Edit { id, .. } | ChatOp::Delete { id } => id,
            ChatOp::React { message_id, .. } => message_id,
        }
    }
}

/// Flat wire shape covering every chat payload variant.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireChat {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    id: Option<MessageId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    message_id: Option<MessageId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    reply_to: Option<ReplyRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    user_id: Option<UserId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    reaction: Option<Reaction>,
}

fn required_id(id: Option<MessageId>) -> Result<MessageId, Error> {
    id.filter(|id| !id.is_empty()).ok_or(Error::MissingMessageId)
}

impl TryFrom<WireChat> for ChatOp {
    type Error = Error;

    fn try_from(wire: WireChat) -> Result<Self, Self::Error> {
        match wire.kind.as_deref() {
            None | Some("message") => Ok(ChatOp::Send(Message {
                id: required_id(wire.id)?,
                user_id: wire.user_id,
                text: wire.text.unwrap_or_default(),
                reply_to: wire.reply_to,
                reaction: wire.reaction,
            })),
            Some("edit") => Ok(ChatOp::Edit {
                id: required_id(wire.id)?,
                text: wire
                    .text
                    .ok_or_else(|| Error::MalformedChat("edit without text".to_string()))?,
            }),
            Some("delete") => Ok(ChatOp::Delete {
                id: required_id(wire.id)?,
            }),
            Some("reaction") => Ok(ChatOp::React {
                message_id: required_id(wire.message_id.or(wire.id))?,
                reaction: wire
                    .reaction
                    .ok_or_else(|| Error::MalformedChat("reaction without emoji".to_string()))?,
            }),
            Some(other) => Err(Error::MalformedChat(format!("unknown type '{other}'"))),
        }
    }
}

impl From<ChatOp> for WireChat {
    fn from(op: ChatOp) -> Self {
        match op {
            ChatOp::Send(message) => WireChat {
                id: Some(message.id),
                user_id: message.user_id,
                text: Some(message.text),
                reply_to: message.reply_to,
                reaction: message.reaction,
                ..Default::default()
            },
            ChatOp::Edit { id, text } => WireChat {
                kind: Some("edit".to_string()),
                id: Some(id),
                text: Some(text),
                ..Default::default()
            },
            ChatOp::Delete { id } => WireChat {
                kind: Some("delete".to_string()),
                id: Some(id),
                ..Default::default()
            },
            ChatOp::React { message_id, reaction } => WireChat {
                kind: Some("reaction".to_string()),
                message_id: Some(message_id),
                reaction: Some(reaction),
                ..Default::default()
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn plain_payload_is_a_send() {
        let op: ChatOp = serde_json::from_value(json!({
            "id": "1",
            "text": "hi",
            "userId": "u-a",
            "replyTo": {"id": "0", "userId": "u-b", "text": "hello?"}
        }))
        .unwrap();

        let ChatOp::Send(message) = op else {
            panic!("expected a send");
        };
        assert_eq!(message.id.as_str(), "1");
        assert_eq!(message.text, "hi");
        assert_eq!(message.user_id, Some(UserId::from("u-a")));
        assert_eq!(message.reply_to.unwrap().text, "hello?");
    }

    #[test]
    fn typed_payloads_resolve_to_mutations() {
        let edit: ChatOp = serde_json::from_value(json!({"type": "edit", "id": "1", "text": "hey"})).unwrap();
        assert_eq!(edit, ChatOp::Edit { id: "1".into(), text: "hey".to_string() });

        let delete: ChatOp = serde_json::from_value(json!({"type": "delete", "id": "1"})).unwrap();
        assert_eq!(delete, ChatOp::Delete { id: "1".into() });

        let react: ChatOp =
            serde_json::from_value(json!({"type": "reaction", "messageId": "1", "reaction": "👍"})).unwrap();
        assert_eq!(
            react,
            ChatOp::React { message_id: "1".into(), reaction: Reaction::new("👍") }
        );
    }

    #[test]
    fn send_without_id_is_rejected() {
        let err = serde_json::from_value::<ChatOp>(json!({"text": "no id"})).unwrap_err();
        assert!(err.to_string().contains("message has no id"));

        let err = serde_json::from_value::<ChatOp>(json!({"id": "", "text": "blank"})).unwrap_err();
        assert!(err.to_string().contains("message has no id"));
    }

    #[test]
    fn unknown_type_is_malformed() {
        let err = serde_json::from_value::<ChatOp>(json!({"type": "pin", "id": "1"})).unwrap_err();
        assert!(err.to_string().contains("unknown type 'pin'"));
    }

    #[test]
    fn mutations_serialize_back_to_the_client_shape() {
        let value = serde_json::to_value(ChatOp::React {
            message_id: "1".into(),
            reaction: Reaction::new("👍"),
        })
        .unwrap();
        assert_eq!(value, json!({"type": "reaction", "messageId": "1", "reaction": "👍"}));

        let value = serde_json::to_value(ChatOp::Send(Message::new("7", "yo"))).unwrap();
        assert_eq!(value, json!({"id": "7", "text": "yo"}));
    }
}
