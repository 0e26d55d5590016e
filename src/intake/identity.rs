//! Sender identity resolution for forwarded messages.

use crate::channels::ForwardedMessage;

/// Stable identity of a forward's original sender, used to key batches.
///
/// `Anonymous` carries the forwarding message id and is therefore never
/// shared between messages — every fully anonymous forward starts its own
/// batch.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SenderIdentity {
    /// Original sender's account is visible.
    KnownId(i64),
    /// Account hidden, but Telegram exposes a free-text name.
    KnownName(String),
    /// Nothing known about the sender.
    Anonymous(i64),
}

/// Display information about the original sender, captured from the first
/// message of a batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SenderInfo {
    pub telegram_id: Option<i64>,
    pub name: Option<String>,
    pub username: Option<String>,
}

impl SenderInfo {
    /// Whether this sender can be matched against existing leads at all.
    pub fn is_anonymous(&self) -> bool {
        self.telegram_id.is_none() && self.name.is_none()
    }
}

/// Derive identity and display info from a forwarded-message envelope.
///
/// Total — every envelope resolves to exactly one of the three variants.
pub fn resolve(envelope: &ForwardedMessage) -> (SenderIdentity, SenderInfo) {
    if let Some(user) = &envelope.sender_user {
        let name = user.full_name();
        return (
            SenderIdentity::KnownId(user.id),
            SenderInfo {
                telegram_id: Some(user.id),
                name: (!name.is_empty()).then_some(name),
                username: user.username.clone(),
            },
        );
    }

    if let Some(name) = &envelope.sender_name {
        return (
            SenderIdentity::KnownName(name.clone()),
            SenderInfo {
                telegram_id: None,
                name: Some(name.clone()),
                username: None,
            },
        );
    }

    (
        SenderIdentity::Anonymous(envelope.message_id),
        SenderInfo::default(),
    )
}
