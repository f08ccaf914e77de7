use std::path::{Path, PathBuf};

use rand::{distributions::Alphanumeric, Rng};
use serde::{Deserialize, Serialize};

use crate::error::{ChatError, Result};

/// Avatar used when the user never set one.
pub const DEFAULT_PHOTO: &str = "/default-profile.png";

/// Sentinel id for sessions that never logged in.
pub const ANONYMOUS_SENTINEL: &str = "anonymous-user";

/// Who this session is. Resolved once at bootstrap and read at every
/// connection establishment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub client_id: String,
    pub display_photo: String,
}

impl Identity {
    /// A throwaway identity for sessions with no persisted profile, e.g.
    /// token requests made before login.
    pub fn anonymous() -> Identity {
        let suffix: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(8)
            .map(char::from)
            .collect();
        Identity {
            client_id: format!("anonymous-{}", suffix),
            display_photo: DEFAULT_PHOTO.to_owned(),
        }
    }

    pub fn is_anonymous(&self) -> bool {
        self.client_id == ANONYMOUS_SENTINEL || self.client_id.starts_with("anonymous-")
    }
}

/// On-disk shape of the persisted profile. Key names match the browser
/// localStorage keys the web pages use.
#[derive(Debug, Serialize, Deserialize)]
struct Profile {
    #[serde(rename = "chatUsername")]
    username: String,
    #[serde(rename = "chatUserPhoto", skip_serializing_if = "Option::is_none")]
    photo: Option<String>,
}

/// Durable profile storage backing the identity bootstrap. One JSON file,
/// no expiry, cleared only by [`ProfileStore::clear`].
#[derive(Debug, Clone)]
pub struct ProfileStore {
    path: PathBuf,
}

impl ProfileStore {
    pub fn new(path: impl AsRef<Path>) -> ProfileStore {
        ProfileStore {
            path: path.as_ref().to_owned(),
        }
    }

    /// Resolves the persisted identity. `None` means "not logged in": the
    /// caller redirects to the login surface. A missing file, unreadable
    /// storage, or an anonymous sentinel all land there; storage trouble is
    /// degraded to unauthenticated, never treated as fatal.
    pub fn load(&self) -> Option<Identity> {
        let raw = std::fs::read_to_string(&self.path).ok()?;
        let profile: Profile = serde_json::from_str(&raw).ok()?;
        let identity = Identity {
            client_id: profile.username,
            display_photo: profile.photo.unwrap_or_else(|| DEFAULT_PHOTO.to_owned()),
        };
        if identity.client_id.is_empty() || identity.is_anonymous() {
            return None;
        }
        Some(identity)
    }

    /// Persists a login. The name is trimmed and must be non-empty; an empty
    /// submission changes nothing. No uniqueness check across profiles, two
    /// sessions may pick the same name.
    pub fn login(&self, name: &str, photo: Option<&str>) -> Result<Identity> {
        let name = name.trim();
        if name.is_empty() {
            return Err(ChatError::EmptyIdentifier("display name"));
        }
        let photo = photo.map(str::trim).filter(|p| !p.is_empty());
        let profile = Profile {
            username: name.to_owned(),
            photo: photo.map(str::to_owned),
        };
        let json = serde_json::to_string_pretty(&profile)
            .expect("profile serialization is infallible");
        std::fs::write(&self.path, json)?;
        Ok(Identity {
            client_id: name.to_owned(),
            display_photo: photo.unwrap_or(DEFAULT_PHOTO).to_owned(),
        })
    }

    /// Explicit logout.
    pub fn clear(&self) -> Result<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
