use crate::error::{ChatError, Result};

/// The shared room every client lands in by default.
pub const ROOM_CHANNEL: &str = "chat";

/// Namespace prefix all channel names live under; the capability granted by
/// the token issuer covers `chat:*` plus the bare room name.
pub const CHANNEL_NAMESPACE: &str = "chat";

const PAIRWISE_PREFIX: &str = "chat:private";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelMode {
    Room,
    Pairwise,
}

/// Canonical name for the private channel between two participants.
///
/// Both endpoints must derive the identical name no matter who initiates, so
/// the two ids are ordered lexicographically before joining. Pure function,
/// no side effects. `a == b` (self-chat) is allowed and yields a valid name.
pub fn pairwise_channel_name(a: &str, b: &str) -> String {
    let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
    format!("{}:{}-{}", PAIRWISE_PREFIX, lo, hi)
}

/// Resolves the channel to subscribe and publish on for this session.
///
/// Room mode ignores the peer. Pairwise mode requires both identifiers to be
/// non-empty.
pub fn resolve_channel_name(mode: ChannelMode, self_id: &str, peer_id: Option<&str>) -> Result<String> {
    match mode {
        ChannelMode::Room => Ok(ROOM_CHANNEL.to_owned()),
        ChannelMode::Pairwise => {
            if self_id.is_empty() {
                return Err(ChatError::EmptyIdentifier("self"));
            }
            match peer_id {
                Some(peer) if !peer.is_empty() => Ok(pairwise_channel_name(self_id, peer)),
                _ => Err(ChatError::EmptyIdentifier("peer")),
            }
        }
    }
}

/// True when `channel` is covered by the `chat:*` capability namespace.
pub fn in_namespace(channel: &str) -> bool {
    channel == CHANNEL_NAMESPACE || channel.starts_with("chat:")
}
