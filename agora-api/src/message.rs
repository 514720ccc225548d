use chrono::Utc;
use uuid::Uuid;

use crate::{Time, STUB_UUID};

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct MessageId(pub Uuid);

impl MessageId {
    pub fn stub() -> MessageId {
        MessageId(STUB_UUID)
    }
}

/// Delivery status of a message, advanced by the *receiving* clients.
///
/// The ordering is meaningful: a message only ever moves forward through
/// Sent -> Delivered -> Seen, never backward.
#[derive(
    Clone, Copy, Debug, Eq, Ord, PartialEq, PartialOrd, serde::Deserialize, serde::Serialize,
)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryState {
    Sent,
    Delivered,
    Seen,
}

impl Default for DeliveryState {
    fn default() -> DeliveryState {
        DeliveryState::Sent
    }
}

impl DeliveryState {
    /// Monotonic advance: returns true if the state actually moved.
    pub fn advance_to(&mut self, target: DeliveryState) -> bool {
        if target > *self {
            *self = target;
            true
        } else {
            false
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct Reaction {
    pub emoji: String,
    pub user: String,
}

/// One chat message as stored under `messages/{id}`.
///
/// `reactions`, `status` and `reply_to` were added across iterations of the
/// stored schema, so they default explicitly when absent from a snapshot.
#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct Message {
    pub id: MessageId,
    pub author: String,
    pub text: String,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub created_at: Time,
    #[serde(default)]
    pub reply_to: Option<MessageId>,
    #[serde(default)]
    pub status: DeliveryState,
    #[serde(default)]
    pub reactions: Vec<Reaction>,
}

impl Message {
    pub fn now(author: String, text: String, reply_to: Option<MessageId>) -> Message {
        Message {
            id: MessageId(Uuid::new_v4()),
            author,
            text,
            created_at: Utc::now(),
            reply_to,
            status: DeliveryState::Sent,
            reactions: Vec::new(),
        }
    }

    /// Toggles the (emoji, user) pair: removes it when present, appends it
    /// when absent.
    pub fn toggle_reaction(&mut self, emoji: &str, user: &str) {
        match self
            .reactions
            .iter()
            .position(|r| r.emoji == emoji && r.user == user)
        {
            Some(idx) => {
                self.reactions.remove(idx);
            }
            None => self.reactions.push(Reaction {
                emoji: String::from(emoji),
                user: String::from(user),
            }),
        }
    }

    pub fn has_reaction(&self, emoji: &str, user: &str) -> bool {
        self.reactions
            .iter()
            .any(|r| r.emoji == emoji && r.user == user)
    }
}
