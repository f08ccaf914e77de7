use chrono::{Local, TimeZone};

use crate::envelope::Envelope;
use crate::identity::DEFAULT_PHOTO;

/// One message bubble, ready for display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedMessage {
    /// `"You"` for the session's own messages, the sender's id otherwise.
    pub author: String,
    pub text: String,
    /// Local wall-clock time of the sender timestamp, `HH:MM`.
    pub time: String,
    pub photo: String,
    pub is_self: bool,
}

/// Projects an envelope into its display form for the given session id.
pub fn render_message(envelope: &Envelope, self_id: &str) -> RenderedMessage {
    let is_self = envelope.user == self_id;
    RenderedMessage {
        author: if is_self {
            "You".to_owned()
        } else {
            envelope.user.clone()
        },
        text: envelope.text.clone(),
        time: format_time(envelope.timestamp),
        photo: envelope
            .photo
            .clone()
            .unwrap_or_else(|| DEFAULT_PHOTO.to_owned()),
        is_self,
    }
}

/// Renders the whole ordered list, preserving list order.
pub fn render_list(messages: &[Envelope], self_id: &str) -> Vec<RenderedMessage> {
    messages
        .iter()
        .map(|envelope| render_message(envelope, self_id))
        .collect()
}

fn format_time(timestamp_ms: i64) -> String {
    match Local.timestamp_millis_opt(timestamp_ms).single() {
        Some(dt) => dt.format("%H:%M").to_string(),
        None => "--:--".to_owned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn envelope(user: &str) -> Envelope {
        Envelope {
            user: user.to_owned(),
            text: "hello".to_owned(),
            timestamp: 1_700_000_000_000,
            photo: None,
        }
    }

    #[test]
    fn own_messages_render_as_self() {
        let rendered = render_message(&envelope("alice"), "alice");
        assert!(rendered.is_self);
        assert_eq!(rendered.author, "You");
    }

    #[test]
    fn other_senders_keep_their_name() {
        let rendered = render_message(&envelope("alice"), "bob");
        assert!(!rendered.is_self);
        assert_eq!(rendered.author, "alice");
    }

    #[test]
    fn missing_photo_falls_back_to_placeholder() {
        let rendered = render_message(&envelope("alice"), "bob");
        assert_eq!(rendered.photo, DEFAULT_PHOTO);
    }

    #[test]
    fn time_is_hour_minute() {
        let rendered = render_message(&envelope("alice"), "bob");
        assert_eq!(rendered.time.len(), 5);
        assert_eq!(rendered.time.as_bytes()[2], b':');
    }

    #[test]
    fn list_order_is_preserved() {
        let mut first = envelope("alice");
        first.text = "one".to_owned();
        let mut second = envelope("bob");
        second.text = "two".to_owned();
        let rendered = render_list(&[first, second], "alice");
        assert_eq!(rendered[0].text, "one");
        assert!(rendered[0].is_self);
        assert_eq!(rendered[1].text, "two");
        assert!(!rendered[1].is_self);
    }
}
