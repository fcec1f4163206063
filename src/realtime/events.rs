//! Relay frames and the user events they carry

use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;

use crate::error::{Result, UsercastError};
use crate::types::{User, UserId};

/// Named event streams multiplexed over one relay connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    UserUpdate,
    NewUser,
}

impl Channel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::UserUpdate => "user_update",
            Channel::NewUser => "new_user",
        }
    }

    /// Channel an event is conventionally published on
    pub fn for_event(event: &UserEvent) -> Self {
        match event {
            UserEvent::NewUser(_) => Channel::NewUser,
            _ => Channel::UserUpdate,
        }
    }
}

impl std::fmt::Display for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Channel {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "user_update" => Ok(Channel::UserUpdate),
            "new_user" => Ok(Channel::NewUser),
            _ => Err(format!("Unknown channel: {}", s)),
        }
    }
}

/// A frame as it travels over `/cable`, in either direction.
///
/// The payload is kept as raw JSON so the relay forwards exactly the bytes it
/// was given.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayFrame {
    pub channel: String,
    pub payload: Box<RawValue>,
}

impl RelayFrame {
    /// Build a frame for a known channel
    pub fn new(channel: Channel, payload: Box<RawValue>) -> Self {
        Self {
            channel: channel.as_str().to_string(),
            payload,
        }
    }

    /// Build a frame carrying a user event
    pub fn from_event(channel: Channel, event: &UserEvent) -> Result<Self> {
        Ok(Self::new(channel, serde_json::value::to_raw_value(event)?))
    }

    /// Parse a text frame
    pub fn parse(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|e| UsercastError::MalformedFrame(e.to_string()))
    }

    /// Encode for the wire
    pub fn encode(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// The channel, if it is one the relay knows
    pub fn known_channel(&self) -> Option<Channel> {
        self.channel.parse().ok()
    }

    /// Decode the payload as a user event
    pub fn event(&self) -> Result<UserEvent> {
        UserEvent::decode(self.payload.get())
    }
}

/// Kinds of user events understood by the reconciler
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    NewUser,
    SyncStatusUpdate,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::NewUser => "new_user",
            EventKind::SyncStatusUpdate => "sync_status_update",
        }
    }
}

impl std::str::FromStr for EventKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "new_user" => Ok(EventKind::NewUser),
            "sync_status_update" => Ok(EventKind::SyncStatusUpdate),
            _ => Err(format!("Unknown event type: {}", s)),
        }
    }
}

/// User fields as they appear in an event; any of them may be missing
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<UserId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_of_birth: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub synced_at: Option<String>,
}

impl UserPayload {
    /// Require the fields of a full record
    pub fn into_user(self) -> Result<User> {
        fn require<T>(value: Option<T>, field: &str) -> Result<T> {
            value.ok_or_else(|| UsercastError::MalformedEvent(format!("missing field `{}`", field)))
        }

        Ok(User {
            id: require(self.id, "id")?,
            first_name: require(self.first_name, "first_name")?,
            last_name: require(self.last_name, "last_name")?,
            email: require(self.email, "email")?,
            date_of_birth: require(self.date_of_birth, "date_of_birth")?,
            synced_at: self.synced_at,
        })
    }
}

impl From<User> for UserPayload {
    fn from(user: User) -> Self {
        Self {
            id: Some(user.id),
            first_name: Some(user.first_name),
            last_name: Some(user.last_name),
            email: Some(user.email),
            date_of_birth: Some(user.date_of_birth),
            synced_at: user.synced_at,
        }
    }
}

/// An event carried in a relay frame payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserEvent {
    /// A record to prepend
    NewUser(UserPayload),
    /// A partial record; only `synced_at` is applied
    SyncStatusUpdate(UserPayload),
    /// Any other `type`; ignored by consumers
    Other(String),
}

#[derive(Deserialize)]
struct Envelope {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    user: Option<serde_json::Value>,
}

#[derive(Serialize)]
struct EnvelopeRef<'a> {
    #[serde(rename = "type")]
    kind: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    user: Option<&'a UserPayload>,
}

impl UserEvent {
    /// Announce a new user
    pub fn new_user(user: User) -> Self {
        UserEvent::NewUser(user.into())
    }

    /// Announce a sync confirmation for `id`
    pub fn sync_status(id: UserId, synced_at: impl Into<String>) -> Self {
        UserEvent::SyncStatusUpdate(UserPayload {
            id: Some(id),
            synced_at: Some(synced_at.into()),
            ..Default::default()
        })
    }

    /// Decode a JSON payload
    pub fn decode(json: &str) -> Result<Self> {
        let envelope: Envelope =
            serde_json::from_str(json).map_err(|e| UsercastError::MalformedEvent(e.to_string()))?;

        let kind = match envelope.kind.parse::<EventKind>() {
            Ok(kind) => kind,
            Err(_) => return Ok(UserEvent::Other(envelope.kind)),
        };
        let user = match envelope.user {
            Some(value) if !value.is_null() => serde_json::from_value::<UserPayload>(value)
                .map_err(|e| UsercastError::MalformedEvent(e.to_string()))?,
            _ => {
                return Err(UsercastError::MalformedEvent(format!(
                    "{} event without `user`",
                    kind.as_str()
                )))
            }
        };

        Ok(match kind {
            EventKind::NewUser => UserEvent::NewUser(user),
            EventKind::SyncStatusUpdate => UserEvent::SyncStatusUpdate(user),
        })
    }

    /// The `type` discriminator
    pub fn type_name(&self) -> &str {
        match self {
            UserEvent::NewUser(_) => EventKind::NewUser.as_str(),
            UserEvent::SyncStatusUpdate(_) => EventKind::SyncStatusUpdate.as_str(),
            UserEvent::Other(kind) => kind.as_str(),
        }
    }

    /// Id of the user the event refers to, if any
    pub fn user_id(&self) -> Option<UserId> {
        match self {
            UserEvent::NewUser(user) | UserEvent::SyncStatusUpdate(user) => user.id,
            UserEvent::Other(_) => None,
        }
    }
}

impl Serialize for UserEvent {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let user = match self {
            UserEvent::NewUser(user) | UserEvent::SyncStatusUpdate(user) => Some(user),
            UserEvent::Other(_) => None,
        };
        EnvelopeRef {
            kind: self.type_name(),
            user,
        }
        .serialize(serializer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NEW_USER: &str = r#"{"type":"new_user","user":{"id":7,"first_name":"A","last_name":"B","email":"a@b.com","date_of_birth":"2000-01-01"}}"#;

    #[test]
    fn test_decode_new_user() {
        let event = UserEvent::decode(NEW_USER).unwrap();
        assert_eq!(event.type_name(), "new_user");
        assert_eq!(event.user_id(), Some(7));

        let UserEvent::NewUser(payload) = event else {
            panic!("expected new_user");
        };
        let user = payload.into_user().unwrap();
        assert_eq!(user.email, "a@b.com");
        assert!(user.synced_at.is_none());
    }

    #[test]
    fn test_unknown_type_is_other() {
        let event = UserEvent::decode(r#"{"type":"user_deleted","user":{"id":"u-1"}}"#).unwrap();
        assert_eq!(event, UserEvent::Other("user_deleted".to_string()));
        assert_eq!(event.user_id(), None);
    }

    #[test]
    fn test_missing_fields_are_reported() {
        let event = UserEvent::decode(r#"{"type":"new_user","user":{"id":1,"first_name":"A"}}"#)
            .unwrap();
        let UserEvent::NewUser(payload) = event else {
            panic!("expected new_user");
        };
        let err = payload.into_user().unwrap_err();
        assert!(err.to_string().contains("last_name"));

        assert!(UserEvent::decode(r#"{"type":"sync_status_update"}"#).is_err());
        assert!(UserEvent::decode("not json").is_err());
    }

    #[test]
    fn test_event_serializes_to_wire_shape() {
        let event = UserEvent::sync_status(2, "2024-01-01T00:00:00Z");
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "type": "sync_status_update",
                "user": {"id": 2, "synced_at": "2024-01-01T00:00:00Z"}
            })
        );
        assert_eq!(Channel::for_event(&event), Channel::UserUpdate);
    }

    #[test]
    fn test_frame_keeps_payload_bytes() {
        let text = r#"{"channel":"new_user","payload":{ "type" : "new_user" , "extra": [1, 2] }}"#;
        let frame = RelayFrame::parse(text).unwrap();
        assert_eq!(frame.known_channel(), Some(Channel::NewUser));
        assert_eq!(
            frame.payload.get(),
            r#"{ "type" : "new_user" , "extra": [1, 2] }"#
        );

        let again = RelayFrame::parse(&frame.encode().unwrap()).unwrap();
        assert_eq!(again.payload.get(), frame.payload.get());
    }

    #[test]
    fn test_frame_with_unknown_channel() {
        let frame = RelayFrame::parse(r#"{"channel":"chat","payload":1}"#).unwrap();
        assert_eq!(frame.known_channel(), None);
        assert!(RelayFrame::parse(r#"{"payload":1}"#).is_err());
    }
}
