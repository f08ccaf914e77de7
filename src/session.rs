use std::collections::HashSet;

use crate::envelope::Envelope;
use crate::error::{ChatError, Result};
use crate::identity::Identity;

/// Where a chat session is in its startup sequence. Each phase is gated on
/// the previous one completing: the connection must not be established
/// before the identity is known (it would authenticate as a placeholder),
/// and nothing may publish before the channel subscription is acknowledged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Uninitialized,
    IdentityResolved,
    Connected,
    ChannelAttached,
}

impl SessionPhase {
    fn name(self) -> &'static str {
        match self {
            SessionPhase::Uninitialized => "uninitialized",
            SessionPhase::IdentityResolved => "identity-resolved",
            SessionPhase::Connected => "connected",
            SessionPhase::ChannelAttached => "channel-attached",
        }
    }
}

/// Client-side view of one mounted chat surface.
///
/// Owns the ordered message list exclusively; every mutation goes through
/// the methods here, on the caller's single thread. The session does no IO
/// itself: the transport hands received envelopes to [`receive`] and takes
/// composed envelopes from [`compose`] for publishing.
///
/// Echo policy: the relay never echoes a publish back to its publisher, so
/// [`compose`] appends optimistically with no duplicate risk. Received
/// envelopes are still deduped by key to absorb the history/live boundary
/// overlap.
///
/// [`receive`]: ChatSession::receive
/// [`compose`]: ChatSession::compose
#[derive(Debug)]
pub struct ChatSession {
    phase: SessionPhase,
    identity: Option<Identity>,
    channel: Option<String>,
    messages: Vec<Envelope>,
    seen: HashSet<(String, i64, String)>,
}

impl ChatSession {
    pub fn new() -> ChatSession {
        ChatSession {
            phase: SessionPhase::Uninitialized,
            identity: None,
            channel: None,
            messages: Vec::new(),
            seen: HashSet::new(),
        }
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn identity(&self) -> Option<&Identity> {
        self.identity.as_ref()
    }

    pub fn channel(&self) -> Option<&str> {
        self.channel.as_deref()
    }

    /// Whether the send control should be enabled.
    pub fn can_send(&self) -> bool {
        self.phase == SessionPhase::ChannelAttached
    }

    /// First transition: identity must be resolved before anything connects.
    /// An anonymous identity is not accepted here; the caller redirects to
    /// login instead of mounting the chat surface.
    pub fn resolve_identity(&mut self, identity: Identity) -> Result<()> {
        self.expect_phase(SessionPhase::Uninitialized, "uninitialized")?;
        if identity.is_anonymous() {
            return Err(ChatError::NotLoggedIn);
        }
        self.identity = Some(identity);
        self.phase = SessionPhase::IdentityResolved;
        Ok(())
    }

    /// Second transition: the authenticated realtime connection is up. Until
    /// this fires the UI shows its blocking "connecting…" state; a failed
    /// token fetch simply never fires it.
    pub fn connected(&mut self) -> Result<()> {
        self.expect_phase(SessionPhase::IdentityResolved, "identity-resolved")?;
        self.phase = SessionPhase::Connected;
        Ok(())
    }

    /// Final transition: the channel subscription is acknowledged. `history`
    /// is the backfill snapshot, oldest first; it lands before any live
    /// message and is deduped at the boundary.
    pub fn attached(&mut self, channel: String, history: Vec<Envelope>) -> Result<()> {
        self.expect_phase(SessionPhase::Connected, "connected")?;
        self.channel = Some(channel);
        self.phase = SessionPhase::ChannelAttached;
        for envelope in history {
            self.append_unseen(envelope);
        }
        Ok(())
    }

    /// Builds and locally appends an outgoing message, returning the
    /// envelope for the transport to publish.
    ///
    /// Empty or whitespace-only text is silently refused: no envelope, no
    /// publish, no list mutation. Composing while the channel is not
    /// attached is a phase error (the send control should be disabled).
    pub fn compose(&mut self, text: &str) -> Result<Option<Envelope>> {
        self.expect_phase(SessionPhase::ChannelAttached, "channel-attached")?;
        if text.trim().is_empty() {
            return Ok(None);
        }
        let identity = self
            .identity
            .as_ref()
            .ok_or(ChatError::NotLoggedIn)?;
        let envelope = Envelope::compose(
            &identity.client_id,
            text,
            Some(identity.display_photo.clone()),
        )?;
        // Optimistic local append; the relay will not echo this back.
        self.append_unseen(envelope.clone());
        Ok(Some(envelope))
    }

    /// One live delivery from the subscription: appends exactly one envelope
    /// in arrival order, unless it duplicates one already listed.
    pub fn receive(&mut self, envelope: Envelope) -> Result<()> {
        self.expect_phase(SessionPhase::ChannelAttached, "channel-attached")?;
        self.append_unseen(envelope);
        Ok(())
    }

    /// The ordered message list, receipt order, append-only.
    pub fn messages(&self) -> &[Envelope] {
        &self.messages
    }

    fn append_unseen(&mut self, envelope: Envelope) {
        if self.seen.insert(envelope.dedupe_key()) {
            self.messages.push(envelope);
        }
    }

    fn expect_phase(&self, required: SessionPhase, label: &'static str) -> Result<()> {
        if self.phase != required {
            return Err(ChatError::OutOfPhase {
                required: label,
                actual: self.phase.name(),
            });
        }
        Ok(())
    }
}

impl Default for ChatSession {
    fn default() -> Self {
        ChatSession::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::DEFAULT_PHOTO;

    fn alice() -> Identity {
        Identity {
            client_id: "alice".to_owned(),
            display_photo: DEFAULT_PHOTO.to_owned(),
        }
    }

    fn attached_session() -> ChatSession {
        let mut session = ChatSession::new();
        session.resolve_identity(alice()).unwrap();
        session.connected().unwrap();
        session.attached("chat".to_owned(), Vec::new()).unwrap();
        session
    }

    #[test]
    fn phases_advance_in_order_only() {
        let mut session = ChatSession::new();
        assert!(session.connected().is_err());
        assert!(session.attached("chat".to_owned(), Vec::new()).is_err());

        session.resolve_identity(alice()).unwrap();
        assert!(session.attached("chat".to_owned(), Vec::new()).is_err());

        session.connected().unwrap();
        session.attached("chat".to_owned(), Vec::new()).unwrap();
        assert_eq!(session.phase(), SessionPhase::ChannelAttached);
        assert!(session.can_send());
    }

    #[test]
    fn anonymous_identity_is_redirected_not_resolved() {
        let mut session = ChatSession::new();
        let err = session.resolve_identity(Identity::anonymous()).unwrap_err();
        assert!(matches!(err, ChatError::NotLoggedIn));
        assert_eq!(session.phase(), SessionPhase::Uninitialized);
    }

    #[test]
    fn compose_before_attach_is_a_phase_error() {
        let mut session = ChatSession::new();
        session.resolve_identity(alice()).unwrap();
        assert!(!session.can_send());
        assert!(session.compose("hello").is_err());
        assert!(session.messages().is_empty());
    }

    #[test]
    fn empty_text_never_publishes_and_never_mutates() {
        let mut session = attached_session();
        assert!(session.compose("").unwrap().is_none());
        assert!(session.compose("   \t").unwrap().is_none());
        assert!(session.messages().is_empty());
    }

    #[test]
    fn compose_appends_optimistically_with_sender_fields() {
        let mut session = attached_session();
        let envelope = session.compose("  hello  ").unwrap().unwrap();
        assert_eq!(envelope.user, "alice");
        assert_eq!(envelope.text, "hello");
        assert_eq!(envelope.photo.as_deref(), Some(DEFAULT_PHOTO));
        assert_eq!(session.messages(), &[envelope]);
    }

    #[test]
    fn boundary_duplicate_between_history_and_live_is_absorbed() {
        let overlap = Envelope {
            user: "bob".to_owned(),
            text: "hi".to_owned(),
            timestamp: 7,
            photo: None,
        };
        let mut session = ChatSession::new();
        session.resolve_identity(alice()).unwrap();
        session.connected().unwrap();
        session
            .attached("chat".to_owned(), vec![overlap.clone()])
            .unwrap();
        session.receive(overlap.clone()).unwrap();
        assert_eq!(session.messages(), &[overlap]);
    }

    #[test]
    fn history_lands_before_live_messages() {
        let old = Envelope {
            user: "bob".to_owned(),
            text: "earlier".to_owned(),
            timestamp: 1,
            photo: None,
        };
        let mut session = ChatSession::new();
        session.resolve_identity(alice()).unwrap();
        session.connected().unwrap();
        session.attached("chat".to_owned(), vec![old]).unwrap();
        session
            .receive(Envelope {
                user: "bob".to_owned(),
                text: "later".to_owned(),
                timestamp: 2,
                photo: None,
            })
            .unwrap();
        let texts: Vec<_> = session.messages().iter().map(|m| m.text.as_str()).collect();
        assert_eq!(texts, ["earlier", "later"]);
    }

    #[test]
    fn receive_appends_in_arrival_order() {
        let mut session = attached_session();
        for i in 0..3 {
            session
                .receive(Envelope {
                    user: "bob".to_owned(),
                    text: format!("m{}", i),
                    timestamp: 100 - i, // arrival order wins, not timestamps
                    photo: None,
                })
                .unwrap();
        }
        let texts: Vec<_> = session.messages().iter().map(|m| m.text.as_str()).collect();
        assert_eq!(texts, ["m0", "m1", "m2"]);
    }
}
