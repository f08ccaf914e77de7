use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::error::{ChatError, Result};

/// The message payload exchanged between chat participants.
///
/// Envelopes are immutable once built: the sender assigns the timestamp at
/// publish time and nothing downstream rewrites any field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    pub user: String,
    pub text: String,
    /// Epoch milliseconds, sender-assigned. Not server-authoritative.
    pub timestamp: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub photo: Option<String>,
}

impl Envelope {
    /// Builds an envelope for sending now, trimming `text` first.
    ///
    /// Fails on empty sender id or empty/whitespace-only text; callers treat
    /// that as "refuse the send locally", never as something to transmit.
    pub fn compose(user: &str, text: &str, photo: Option<String>) -> Result<Envelope> {
        let user = user.trim();
        if user.is_empty() {
            return Err(ChatError::InvalidMessage("missing user"));
        }
        let text = text.trim();
        if text.is_empty() {
            return Err(ChatError::InvalidMessage("empty text"));
        }
        Ok(Envelope {
            user: user.to_owned(),
            text: text.to_owned(),
            timestamp: Utc::now().timestamp_millis(),
            photo,
        })
    }

    /// True when the fields would have passed [`Envelope::compose`].
    /// Used to screen envelopes received off the wire.
    pub fn is_valid(&self) -> bool {
        !self.user.trim().is_empty() && !self.text.trim().is_empty()
    }

    /// Identity of an envelope for duplicate suppression: sender id plus
    /// sender timestamp plus text. Two legitimate messages can only collide
    /// if one sender publishes identical text twice within the same
    /// millisecond, which we accept.
    pub fn dedupe_key(&self) -> (String, i64, String) {
        (self.user.clone(), self.timestamp, self.text.clone())
    }
}
