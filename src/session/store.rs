//! On-disk persistence for session artifacts.
//!
//! StoreOnce Gen 3 appliances throttle logins aggressively, so the cookie
//! jar from a successful login is worth keeping across process runs. The
//! store writes one JSON file per device under a configurable directory
//! and treats every failure as a cache miss: a corrupt or unreadable file
//! means logging in again, never an error.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Envelope wrapping a persisted artifact with its save time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredSession<T> {
    pub data: T,
    pub saved_at: DateTime<Utc>,
}

/// File-per-device session store rooted at a directory.
#[derive(Debug, Clone)]
pub struct SessionStore {
    dir: PathBuf,
}

impl SessionStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Platform cache directory for this crate, when one is known.
    pub fn default_dir() -> Option<PathBuf> {
        dirs::cache_dir().map(|dir| dir.join("storrest"))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn file_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", key))
    }

    /// Load a previously saved artifact, or `None` on any failure.
    pub fn load<T: DeserializeOwned>(&self, key: &str) -> Option<StoredSession<T>> {
        let path = self.file_path(key);
        let raw = match fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(err) => {
                debug!(path = %path.display(), error = %err, "no stored session");
                return None;
            }
        };
        match serde_json::from_str::<StoredSession<T>>(&raw) {
            Ok(stored) => {
                debug!(path = %path.display(), saved_at = %stored.saved_at, "loaded stored session");
                Some(stored)
            }
            Err(err) => {
                warn!(path = %path.display(), error = %err, "discarding unreadable session file");
                None
            }
        }
    }

    /// Save an artifact, returning whether the write succeeded.
    pub fn save<T: Serialize>(&self, key: &str, data: &T) -> bool {
        if let Err(err) = fs::create_dir_all(&self.dir) {
            warn!(dir = %self.dir.display(), error = %err, "cannot create session store directory");
            return false;
        }
        let stored = StoredSession {
            data,
            saved_at: Utc::now(),
        };
        let json = match serde_json::to_string_pretty(&stored) {
            Ok(json) => json,
            Err(err) => {
                warn!(key = key, error = %err, "cannot serialize session");
                return false;
            }
        };
        let path = self.file_path(key);
        match fs::write(&path, json) {
            Ok(()) => {
                debug!(path = %path.display(), "session saved");
                true
            }
            Err(err) => {
                warn!(path = %path.display(), error = %err, "cannot write session file");
                false
            }
        }
    }

    /// Delete a saved artifact. Missing files are not an error.
    pub fn clear(&self, key: &str) {
        let path = self.file_path(key);
        if let Err(err) = fs::remove_file(&path) {
            if err.kind() != std::io::ErrorKind::NotFound {
                warn!(path = %path.display(), error = %err, "cannot remove session file");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::CookieMap;

    #[test]
    fn test_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::new(dir.path());

        let mut cookies = CookieMap::new();
        cookies.insert("atlas", "SID-1");
        assert!(store.save("10.0.0.1_443", &cookies));

        let loaded = store.load::<CookieMap>("10.0.0.1_443").unwrap();
        assert_eq!(loaded.data, cookies);
    }

    #[test]
    fn test_missing_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::new(dir.path());
        assert!(store.load::<CookieMap>("10.0.0.1_443").is_none());
    }

    #[test]
    fn test_corrupt_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::new(dir.path());
        fs::create_dir_all(dir.path()).unwrap();
        fs::write(dir.path().join("host_443.json"), "{not json").unwrap();
        assert!(store.load::<CookieMap>("host_443").is_none());
    }

    #[test]
    fn test_clear_removes_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::new(dir.path());
        let mut cookies = CookieMap::new();
        cookies.insert("k", "v");
        store.save("host_443", &cookies);
        store.clear("host_443");
        assert!(store.load::<CookieMap>("host_443").is_none());
        // Clearing again is fine
        store.clear("host_443");
    }
}
