use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use chrono::Utc;
use hmac::{Hmac, Mac};
use rand::{distributions::Alphanumeric, Rng};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use crate::error::{ChatError, Result};
use crate::naming;

type HmacSha256 = Hmac<Sha256>;

/// Token lifetime. Renewal is the client transport's problem, not ours.
pub const TOKEN_TTL_MS: i64 = 60 * 60 * 1000;

/// Client id used when a token is requested without one.
pub const ANONYMOUS_CLIENT_ID: &str = "anonymous-user";

/// Operations granted on the `chat:*` namespace.
const CAPABILITY: &str = r#"{"chat:*":["publish","subscribe","presence","history"]}"#;

/// A short-lived, capability-scoped credential bound to one client id.
///
/// The shape mirrors a hosted pub/sub provider's token request: the `mac`
/// field authenticates every other field against the server's signing key.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenRequest {
    pub key_name: String,
    pub client_id: String,
    pub capability: String,
    /// Lifetime in milliseconds from `timestamp`.
    pub ttl: i64,
    /// Issue time, epoch milliseconds.
    pub timestamp: i64,
    pub nonce: String,
    pub mac: String,
}

/// Mints and verifies [`TokenRequest`]s from the server-side signing key.
#[derive(Debug, Clone)]
pub struct TokenSigner {
    key_name: String,
    key_secret: String,
}

impl TokenSigner {
    /// Parses a `keyName:keySecret` credential string, the form the
    /// `CHAT_SIGNING_KEY` environment variable carries.
    pub fn from_key(key: &str) -> Result<TokenSigner> {
        let (name, secret) = key
            .split_once(':')
            .ok_or(ChatError::SigningKeyMalformed)?;
        if name.is_empty() || secret.is_empty() {
            return Err(ChatError::SigningKeyMalformed);
        }
        Ok(TokenSigner {
            key_name: name.to_owned(),
            key_secret: secret.to_owned(),
        })
    }

    /// Reads the signing key from the environment. `None` means the route
    /// must answer 500: a missing credential is a configuration error, not
    /// something to retry around.
    pub fn from_env(var: &str) -> Option<TokenSigner> {
        std::env::var(var).ok().and_then(|k| TokenSigner::from_key(&k).ok())
    }

    /// Creates a token request bound to `client_id`, scoped to the `chat:*`
    /// capability, valid for [`TOKEN_TTL_MS`].
    pub fn mint(&self, client_id: &str) -> TokenRequest {
        let client_id = if client_id.is_empty() {
            ANONYMOUS_CLIENT_ID
        } else {
            client_id
        };
        let nonce: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(16)
            .map(char::from)
            .collect();
        let timestamp = Utc::now().timestamp_millis();
        let mac = self.sign(client_id, TOKEN_TTL_MS, timestamp, &nonce);
        TokenRequest {
            key_name: self.key_name.clone(),
            client_id: client_id.to_owned(),
            capability: CAPABILITY.to_owned(),
            ttl: TOKEN_TTL_MS,
            timestamp,
            nonce,
            mac,
        }
    }

    /// Checks a presented token: key name, mac, expiry, client id binding,
    /// and that `channel` falls inside the granted namespace.
    pub fn verify(&self, token: &TokenRequest, client_id: &str, channel: &str) -> Result<()> {
        if token.key_name != self.key_name {
            return Err(ChatError::InvalidToken("unknown key name"));
        }
        let presented = BASE64
            .decode(&token.mac)
            .map_err(|_| ChatError::InvalidToken("bad mac"))?;
        // Constant-time comparison via the hmac crate.
        self.mac_for(&token.client_id, token.ttl, token.timestamp, &token.nonce)
            .verify_slice(&presented)
            .map_err(|_| ChatError::InvalidToken("bad mac"))?;
        if token.timestamp + token.ttl < Utc::now().timestamp_millis() {
            return Err(ChatError::InvalidToken("expired"));
        }
        if token.client_id != client_id {
            return Err(ChatError::InvalidToken("client id mismatch"));
        }
        if !naming::in_namespace(channel) {
            return Err(ChatError::InvalidToken("channel outside capability"));
        }
        Ok(())
    }

    fn sign(&self, client_id: &str, ttl: i64, timestamp: i64, nonce: &str) -> String {
        let mac = self.mac_for(client_id, ttl, timestamp, nonce);
        BASE64.encode(mac.finalize().into_bytes())
    }

    fn mac_for(&self, client_id: &str, ttl: i64, timestamp: i64, nonce: &str) -> HmacSha256 {
        let canonical = format!(
            "{}\n{}\n{}\n{}\n{}\n{}\n",
            self.key_name, ttl, CAPABILITY, client_id, timestamp, nonce
        );
        let mut mac = HmacSha256::new_from_slice(self.key_secret.as_bytes())
            .expect("hmac accepts keys of any length");
        mac.update(canonical.as_bytes());
        mac
    }
}
