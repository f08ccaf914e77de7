//! End-to-end flow: persisted identity bootstrap, pairwise channel
//! resolution, token-authenticated attach, publish, and receipt on the
//! other side, driven through the client session state machine.

use std::time::Duration;

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chat_relay::{
    api, resolve_channel_name, view, AppState, ChannelMode, ChatSession, Envelope, ProfileStore,
    TokenSigner,
};

fn attach_path(signer: &TokenSigner, client_id: &str, channel: &str) -> String {
    let token = signer.mint(client_id);
    let encoded = URL_SAFE_NO_PAD.encode(serde_json::to_string(&token).unwrap());
    format!("/chat/{}?clientId={}&token={}", channel, client_id, encoded)
}

#[tokio::test]
async fn two_clients_exchange_one_message() {
    let state = AppState::new(Some(TokenSigner::from_key("appkey:s3cret").unwrap()));
    let signer = state.signer.clone().unwrap();
    let filters = api::build_filters(state);

    // Alice's identity comes from her persisted profile.
    let dir = tempfile::tempdir().unwrap();
    let profile = ProfileStore::new(dir.path().join("profile.json"));
    profile.login("alice", None).unwrap();
    let identity = profile.load().expect("persisted identity must not redirect");

    // Both ends derive the same pairwise channel independently.
    let channel = resolve_channel_name(ChannelMode::Pairwise, "alice", Some("bob")).unwrap();
    assert_eq!(
        channel,
        resolve_channel_name(ChannelMode::Pairwise, "bob", Some("alice")).unwrap()
    );

    let mut alice = ChatSession::new();
    alice.resolve_identity(identity).unwrap();
    assert!(!alice.can_send(), "send stays disabled until attached");

    let mut alice_ws = warp::test::ws()
        .path(&attach_path(&signer, "alice", &channel))
        .handshake(filters.clone())
        .await
        .unwrap();
    alice.connected().unwrap();
    alice.attached(channel.clone(), Vec::new()).unwrap();
    assert!(alice.can_send());

    let mut bob_ws = warp::test::ws()
        .path(&attach_path(&signer, "bob", &channel))
        .handshake(filters)
        .await
        .unwrap();
    let mut bob = ChatSession::new();
    bob.resolve_identity(chat_relay::Identity {
        client_id: "bob".to_owned(),
        display_photo: "/default-profile.png".to_owned(),
    })
    .unwrap();
    bob.connected().unwrap();
    bob.attached(channel, Vec::new()).unwrap();

    // Empty input publishes nothing and mutates nothing.
    assert!(alice.compose("   ").unwrap().is_none());
    assert!(alice.messages().is_empty());

    // Compose appends optimistically and hands the envelope to the wire.
    let sent = alice.compose("hello").unwrap().unwrap();
    alice_ws
        .send(warp::ws::Message::text(
            serde_json::to_string(&sent).unwrap(),
        ))
        .await;

    let frame = bob_ws.recv().await.unwrap();
    let received: Envelope = serde_json::from_str(frame.to_str().unwrap()).unwrap();
    assert_eq!(received, sent, "no field loss in transit");
    bob.receive(received).unwrap();

    // Alice sees exactly one self bubble, Bob one other-sender bubble.
    let alice_view = view::render_list(alice.messages(), "alice");
    assert_eq!(alice_view.len(), 1);
    assert!(alice_view[0].is_self);
    assert_eq!(alice_view[0].author, "You");

    let bob_view = view::render_list(bob.messages(), "bob");
    assert_eq!(bob_view.len(), 1);
    assert!(!bob_view[0].is_self);
    assert_eq!(bob_view[0].author, "alice");

    // The relay never echoes the publish back to Alice.
    let echo = tokio::time::timeout(Duration::from_millis(200), alice_ws.recv()).await;
    assert!(echo.is_err());
}
