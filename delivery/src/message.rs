use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::connection::{ConnectionId, UserId};

/// Trait for getting the wire event type name
pub trait EventType {
    fn event_type(&self) -> &'static str;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    // Dialog messages
    NewMessage,
    NewMessageSilent,
    GroupMessage,
    GroupMessageSilent,

    // Relations
    FriendRequest,
    FriendAccepted,

    // Groups
    GroupCreated,
    GroupMemberJoined,

    // Ephemeral
    Presence,
}

impl EventKind {
    /// The kind emitted to a recipient that muted the relation or group.
    /// Kinds without a silent counterpart are returned unchanged.
    pub fn silenced(self) -> Self {
        match self {
            EventKind::NewMessage => EventKind::NewMessageSilent,
            EventKind::GroupMessage => EventKind::GroupMessageSilent,
            other => other,
        }
    }
}

impl EventType for EventKind {
    fn event_type(&self) -> &'static str {
        match self {
            EventKind::NewMessage => "new_message",
            EventKind::NewMessageSilent => "new_message_silent",
            EventKind::GroupMessage => "group_message",
            EventKind::GroupMessageSilent => "group_message_silent",
            EventKind::FriendRequest => "friend_request",
            EventKind::FriendAccepted => "friend_accepted",
            EventKind::GroupCreated => "group_created",
            EventKind::GroupMemberJoined => "group_member_joined",
            EventKind::Presence => "presence",
        }
    }
}

/// Envelope payload. The tag lets a consumer tell sealed payloads from
/// plaintext without trying to decrypt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "encoding", rename_all = "snake_case")]
pub enum Payload {
    Plain { data: Value },
    Sealed { ciphertext: String },
}

impl Payload {
    pub fn is_sealed(&self) -> bool {
        matches!(self, Payload::Sealed { .. })
    }
}

/// The routed unit of a real-time event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub target_user_id: UserId,
    pub kind: EventKind,
    pub payload: Payload,
    /// User that caused the event, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender_id: Option<UserId>,
    /// Connection the event originated from; never echoed back to it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin_connection: Option<ConnectionId>,
    /// Filled in per handle during fan-out so the device can correlate.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connection_id: Option<ConnectionId>,
    pub sent_at: DateTime<Utc>,
    /// Recipient muted the relation/group; selects the silent kind variant.
    #[serde(default)]
    pub silent: bool,
}

impl Envelope {
    pub fn new(target_user_id: impl Into<UserId>, kind: EventKind, data: Value) -> Self {
        Self {
            target_user_id: target_user_id.into(),
            kind,
            payload: Payload::Plain { data },
            sender_id: None,
            origin_connection: None,
            connection_id: None,
            sent_at: Utc::now(),
            silent: false,
        }
    }

    pub fn from_sender(mut self, sender_id: impl Into<UserId>) -> Self {
        self.sender_id = Some(sender_id.into());
        self
    }

    pub fn from_connection(mut self, origin: Option<ConnectionId>) -> Self {
        self.origin_connection = origin;
        self
    }

    pub fn silent(mut self, silent: bool) -> Self {
        self.silent = silent;
        self
    }

    /// Kind that should actually be emitted to the recipient.
    pub fn effective_kind(&self) -> EventKind {
        if self.silent {
            self.kind.silenced()
        } else {
            self.kind
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn silenced_only_substitutes_message_kinds() {
        assert_eq!(EventKind::NewMessage.silenced(), EventKind::NewMessageSilent);
        assert_eq!(
            EventKind::GroupMessage.silenced(),
            EventKind::GroupMessageSilent
        );
        assert_eq!(EventKind::FriendRequest.silenced(), EventKind::FriendRequest);
        assert_eq!(EventKind::Presence.silenced(), EventKind::Presence);
    }

    #[test]
    fn effective_kind_follows_silent_flag() {
        let loud = Envelope::new("bob", EventKind::NewMessage, json!({}));
        assert_eq!(loud.effective_kind(), EventKind::NewMessage);
        assert_eq!(loud.silent(true).effective_kind(), EventKind::NewMessageSilent);
    }

    #[test]
    fn payload_is_tagged_on_the_wire() {
        let plain = serde_json::to_value(Payload::Plain { data: json!(1) }).unwrap();
        assert_eq!(plain, json!({ "encoding": "plain", "data": 1 }));

        let sealed = serde_json::to_value(Payload::Sealed {
            ciphertext: "abc".to_string(),
        })
        .unwrap();
        assert_eq!(sealed, json!({ "encoding": "sealed", "ciphertext": "abc" }));
    }

    #[test]
    fn event_type_names_match_serde_names() {
        for kind in [
            EventKind::NewMessage,
            EventKind::GroupMessageSilent,
            EventKind::FriendAccepted,
            EventKind::GroupMemberJoined,
        ] {
            let serialized = serde_json::to_value(kind).unwrap();
            assert_eq!(serialized, json!(kind.event_type()));
        }
    }

    #[test]
    fn only_emitted_kinds_are_accepted() {
        assert!(serde_json::from_value::<EventKind>(json!("presence")).is_ok());
        assert!(serde_json::from_value::<EventKind>(json!("group_invite")).is_err());
    }
}
