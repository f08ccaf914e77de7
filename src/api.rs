use std::convert::Infallible;

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::Utc;
use serde::Deserialize;
use warp::http::StatusCode;
use warp::Filter;

use crate::auth::{TokenRequest, TokenSigner, ANONYMOUS_CLIENT_ID};
use crate::envelope::Envelope;
use crate::hub::{self, ChannelRegistry};
use crate::store::MessageStore;

static LOGIN_HTML: &str = r#"<!DOCTYPE html>
<html lang="en">
    <head>
        <title>Chat Relay</title>
    </head>
    <body>
        <h1>Login</h1>
        <form id="login">
            <input type="text" id="name" placeholder="Enter your name" />
            <input type="text" id="photo" placeholder="Profile photo URL (optional)" />
            <button type="submit">Login</button>
        </form>
        <script type="text/javascript">
        document.getElementById('login').onsubmit = function(e) {
            e.preventDefault();
            const name = document.getElementById('name').value.trim();
            if (!name) return;
            localStorage.setItem('chatUsername', name);
            localStorage.setItem('chatUserPhoto',
                document.getElementById('photo').value.trim() || '/default-profile.png');
            location.href = '/chat';
        };
        </script>
    </body>
</html>
"#;

static CHAT_HTML: &str = r#"<!DOCTYPE html>
<html lang="en">
    <head>
        <title>Chat Relay</title>
    </head>
    <body>
        <h1>Chat</h1>
        <div id="chat">
            <p><em>Connecting...</em></p>
        </div>
        <input type="text" id="text" />
        <button type="button" id="send" disabled>Send</button>
        <script type="text/javascript">
        const chat = document.getElementById('chat');
        const text = document.getElementById('text');
        const send = document.getElementById('send');
        const username = localStorage.getItem('chatUsername');
        const photo = localStorage.getItem('chatUserPhoto') || '/default-profile.png';
        if (!username || username === 'anonymous-user') {
            // No token fetch for unauthenticated sessions, just the redirect.
            location.replace('/');
        } else {
            const room = location.pathname.split('/')[1] || 'chat';
            const seen = new Set();
            function message(env) {
                const key = env.user + ' ' + env.timestamp + ' ' + env.text;
                if (seen.has(key)) return;
                seen.add(key);
                const time = new Date(env.timestamp)
                    .toLocaleTimeString([], { hour: '2-digit', minute: '2-digit' });
                const who = env.user === username ? 'You' : env.user;
                const line = document.createElement('p');
                line.innerText = '[' + time + '] <' + who + '>: ' + env.text;
                chat.appendChild(line);
                line.scrollIntoView();
            }
            fetch('/auth?clientId=' + encodeURIComponent(username))
                .then(function(r) {
                    if (!r.ok) throw new Error('auth failed');
                    return r.json();
                })
                .then(function(tok) {
                    const token = btoa(JSON.stringify(tok))
                        .replace(/\+/g, '-').replace(/\//g, '_').replace(/=+$/, '');
                    const uri = 'ws://' + location.host + '/chat/' + room
                        + '?clientId=' + encodeURIComponent(username) + '&token=' + token;
                    const ws = new WebSocket(uri);
                    ws.onopen = function() {
                        chat.innerHTML = '';
                        send.disabled = false;
                    };
                    ws.onmessage = function(msg) {
                        message(JSON.parse(msg.data));
                    };
                    ws.onclose = function() {
                        send.disabled = true;
                    };
                    send.onclick = function() {
                        const body = text.value.trim();
                        if (!body) return;
                        const env = { user: username, text: body, timestamp: Date.now(), photo: photo };
                        ws.send(JSON.stringify(env));
                        message(env); // the relay never echoes our own publish back
                        text.value = '';
                    };
                });
                // A failed token fetch leaves the page parked on Connecting...
        }
        </script>
    </body>
</html>
"#;

/// Shared state handed to every route.
#[derive(Clone)]
pub struct AppState {
    pub channels: ChannelRegistry,
    pub store: MessageStore,
    pub signer: Option<TokenSigner>,
}

impl AppState {
    pub fn new(signer: Option<TokenSigner>) -> AppState {
        AppState {
            channels: ChannelRegistry::default(),
            store: MessageStore::new(),
            signer,
        }
    }
}

#[derive(Debug)]
struct Unauthorized(String);

impl warp::reject::Reject for Unauthorized {}

#[derive(Debug, Deserialize)]
struct AuthQuery {
    #[serde(rename = "clientId")]
    client_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AttachQuery {
    #[serde(rename = "clientId")]
    client_id: String,
    /// URL-safe base64 of the token request JSON minted by `/auth`.
    token: String,
}

/// Loosely typed `/messages` POST body so validation failures answer 400
/// instead of a deserialization rejection.
#[derive(Debug, Deserialize)]
struct IncomingMessage {
    user: Option<String>,
    text: Option<String>,
    timestamp: Option<i64>,
    photo: Option<String>,
}

// GET / -> login surface
fn login() -> impl warp::Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    warp::path::end().map(|| warp::reply::html(LOGIN_HTML))
}

// GET /{room: str} -> chat page for that room
fn room() -> impl warp::Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    warp::path!(String).map(|_| warp::reply::html(CHAT_HTML))
}

fn with_state(
    state: AppState,
) -> impl warp::Filter<Extract = (AppState,), Error = Infallible> + Clone {
    warp::any().map(move || state.clone())
}

async fn issue_token(query: AuthQuery, state: AppState) -> Result<impl warp::Reply, Infallible> {
    let reply = match &state.signer {
        Some(signer) => {
            let client_id = query.client_id.as_deref().unwrap_or(ANONYMOUS_CLIENT_ID);
            let token = signer.mint(client_id);
            warp::reply::with_status(warp::reply::json(&token), StatusCode::OK)
        }
        None => warp::reply::with_status(
            warp::reply::json(&serde_json::json!({
                "error": "CHAT_SIGNING_KEY environment variable not set"
            })),
            StatusCode::INTERNAL_SERVER_ERROR,
        ),
    };
    Ok(reply)
}

// GET /auth?clientId={id} -> capability token request, or 500 when the
// signing credential is not configured
fn auth(
    state: AppState,
) -> impl warp::Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    warp::path!("auth")
        .and(warp::get())
        .and(warp::query::<AuthQuery>())
        .and(with_state(state))
        .and_then(issue_token)
}

async fn list_messages(state: AppState) -> Result<impl warp::Reply, Infallible> {
    Ok(warp::reply::json(&state.store.all().await))
}

async fn post_message(
    body: IncomingMessage,
    state: AppState,
) -> Result<impl warp::Reply, Infallible> {
    let user = body.user.as_deref().unwrap_or("").trim();
    let text = body.text.as_deref().unwrap_or("").trim();
    if user.is_empty() || text.is_empty() {
        return Ok(warp::reply::with_status(
            warp::reply::json(&serde_json::json!({ "error": "Invalid message" })),
            StatusCode::BAD_REQUEST,
        ));
    }
    let envelope = Envelope {
        user: user.to_owned(),
        text: text.to_owned(),
        timestamp: body
            .timestamp
            .unwrap_or_else(|| Utc::now().timestamp_millis()),
        photo: body.photo,
    };
    let stored = state.store.append(envelope).await;
    Ok(warp::reply::with_status(
        warp::reply::json(&stored),
        StatusCode::OK,
    ))
}

// GET /messages -> stored envelopes, most-recent-last
// POST /messages -> validate and store one envelope
fn messages(
    state: AppState,
) -> impl warp::Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    let list = warp::path!("messages")
        .and(warp::get())
        .and(with_state(state.clone()))
        .and_then(list_messages);
    let post = warp::path!("messages")
        .and(warp::post())
        .and(warp::body::json())
        .and(with_state(state))
        .and_then(post_message);
    list.or(post)
}

fn decode_token(raw: &str) -> Result<TokenRequest, warp::Rejection> {
    let bytes = URL_SAFE_NO_PAD
        .decode(raw)
        .map_err(|_| warp::reject::custom(Unauthorized("undecodable token".to_owned())))?;
    serde_json::from_slice(&bytes)
        .map_err(|_| warp::reject::custom(Unauthorized("malformed token".to_owned())))
}

async fn upgrade_connection(
    channel_name: String,
    query: AttachQuery,
    ws: warp::ws::Ws,
    state: AppState,
) -> Result<impl warp::Reply, warp::Rejection> {
    let signer = state.signer.as_ref().ok_or_else(|| {
        warp::reject::custom(Unauthorized("signing key not configured".to_owned()))
    })?;
    let token = decode_token(&query.token)?;
    signer
        .verify(&token, &query.client_id, &channel_name)
        .map_err(|e| warp::reject::custom(Unauthorized(e.to_string())))?;

    let channel = hub::get_channel(&channel_name, state.channels.clone()).await;
    // This will call our function if the handshake succeeds.
    Ok(ws.on_upgrade(move |socket| hub::subscriber_connected(socket, channel, query.client_id)))
}

// GET /chat/{channel: str}?clientId={id}&token={b64} -> websocket upgrade
fn ws_attach(
    state: AppState,
) -> impl warp::Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    warp::path!("chat" / String)
        .and(warp::query::<AttachQuery>())
        // The `ws()` filter will prepare the websocket handshake...
        .and(warp::ws())
        .and(with_state(state))
        .and_then(upgrade_connection)
}

async fn handle_rejection(err: warp::Rejection) -> Result<impl warp::Reply, warp::Rejection> {
    if let Some(Unauthorized(message)) = err.find::<Unauthorized>() {
        Ok(warp::reply::with_status(
            warp::reply::json(&serde_json::json!({ "error": message })),
            StatusCode::UNAUTHORIZED,
        ))
    } else {
        Err(err)
    }
}

pub fn build_filters(
    state: AppState,
) -> impl warp::Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    login()
        .or(auth(state.clone()))
        .or(messages(state.clone()))
        .or(ws_attach(state))
        .or(room())
        .recover(handle_rejection)
}
