//! Durable token storage.
//!
//! The token is the only state that survives a restart. It lives under the
//! single key [`TOKEN_KEY`] in whichever backend the config selects.

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use crate::error::{ClientError, ClientResult};

pub const TOKEN_KEY: &str = "jwt_token";

pub(crate) const SERVICE_NAME: &str = "taskdeck";

#[async_trait]
pub trait TokenStorage: Send + Sync {
    async fn load(&self) -> ClientResult<Option<String>>;

    /// Must not return before the token is durable.
    async fn save(&self, token: &str) -> ClientResult<()>;

    async fn clear(&self) -> ClientResult<()>;
}

/// A small JSON key-value file, the desktop stand-in for browser local storage.
pub struct FileStorage {
    path: PathBuf,
}

impl FileStorage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_map(&self) -> ClientResult<BTreeMap<String, String>> {
        match std::fs::read_to_string(&self.path) {
            Ok(content) if content.trim().is_empty() => Ok(BTreeMap::new()),
            Ok(content) => serde_json::from_str(&content).map_err(|e| {
                ClientError::Storage(format!("{} is not valid JSON: {}", self.path.display(), e))
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(e) => Err(ClientError::Storage(format!(
                "failed to read {}: {}",
                self.path.display(),
                e
            ))),
        }
    }

    fn remove_file(&self) -> ClientResult<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(ClientError::Storage(format!(
                "failed to remove {}: {}",
                self.path.display(),
                e
            ))),
        }
    }

    fn write_map(&self, map: &BTreeMap<String, String>) -> ClientResult<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                ClientError::Storage(format!("failed to create {}: {}", parent.display(), e))
            })?;
        }
        let json = serde_json::to_string_pretty(map)
            .map_err(|e| ClientError::Storage(e.to_string()))?;
        // Written beside the target then renamed, so a crash never leaves half a file.
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, json).map_err(|e| {
            ClientError::Storage(format!("failed to write {}: {}", tmp.display(), e))
        })?;
        std::fs::rename(&tmp, &self.path).map_err(|e| {
            let _ = std::fs::remove_file(&tmp);
            ClientError::Storage(format!("failed to replace {}: {}", self.path.display(), e))
        })
    }
}

#[async_trait]
impl TokenStorage for FileStorage {
    async fn load(&self) -> ClientResult<Option<String>> {
        Ok(self.read_map()?.remove(TOKEN_KEY))
    }

    async fn save(&self, token: &str) -> ClientResult<()> {
        // A corrupt file is replaced rather than blocking login.
        let mut map = self.read_map().unwrap_or_default();
        map.insert(TOKEN_KEY.to_string(), token.to_string());
        self.write_map(&map)
    }

    async fn clear(&self) -> ClientResult<()> {
        let mut map = match self.read_map() {
            Ok(map) => map,
            Err(e) => {
                log::warn!("Discarding unreadable token storage: {}", e);
                return self.remove_file();
            }
        };
        if map.remove(TOKEN_KEY).is_none() {
            return Ok(());
        }
        if map.is_empty() {
            return self.remove_file();
        }
        self.write_map(&map)
    }
}

/// Token kept in the system keyring via Secret Service.
pub struct KeyringStorage {
    server: String,
}

impl KeyringStorage {
    /// `server` scopes the secret, normally the API base URL.
    pub fn new(server: impl Into<String>) -> Self {
        Self {
            server: server.into(),
        }
    }

    async fn keyring() -> ClientResult<oo7::Keyring> {
        oo7::Keyring::new()
            .await
            .map_err(|e| ClientError::Storage(format!("failed to connect to keyring: {}", e)))
    }

    fn attributes(&self) -> HashMap<&str, &str> {
        let mut attrs = HashMap::new();
        attrs.insert("service", SERVICE_NAME);
        attrs.insert("server", self.server.as_str());
        attrs.insert("key", TOKEN_KEY);
        attrs
    }
}

#[async_trait]
impl TokenStorage for KeyringStorage {
    async fn load(&self) -> ClientResult<Option<String>> {
        let keyring = Self::keyring().await?;
        let items = keyring
            .search_items(&self.attributes())
            .await
            .map_err(|e| ClientError::Storage(format!("failed to search keyring: {}", e)))?;

        let Some(item) = items.first() else {
            return Ok(None);
        };
        let secret = item
            .secret()
            .await
            .map_err(|e| ClientError::Storage(format!("failed to read secret: {}", e)))?;
        let token = String::from_utf8(secret.to_vec())
            .map_err(|e| ClientError::Storage(format!("invalid UTF-8 in secret: {}", e)))?;
        Ok(Some(token))
    }

    async fn save(&self, token: &str) -> ClientResult<()> {
        let keyring = Self::keyring().await?;
        keyring
            .create_item(
                &format!("Taskdeck session ({})", self.server),
                &self.attributes(),
                token.as_bytes(),
                true, // replace existing
            )
            .await
            .map_err(|e| ClientError::Storage(format!("failed to store token: {}", e)))
    }

    async fn clear(&self) -> ClientResult<()> {
        let keyring = Self::keyring().await?;
        let items = keyring
            .search_items(&self.attributes())
            .await
            .map_err(|e| ClientError::Storage(format!("failed to search keyring: {}", e)))?;
        for item in items {
            item.delete()
                .await
                .map_err(|e| ClientError::Storage(format!("failed to delete token: {}", e)))?;
        }
        Ok(())
    }
}

/// Process-lifetime storage. Nothing survives a restart.
#[derive(Default)]
pub struct MemoryStorage {
    token: Mutex<Option<String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token(token: impl Into<String>) -> Self {
        Self {
            token: Mutex::new(Some(token.into())),
        }
    }

    pub fn peek(&self) -> Option<String> {
        self.token.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

#[async_trait]
impl TokenStorage for MemoryStorage {
    async fn load(&self) -> ClientResult<Option<String>> {
        Ok(self.peek())
    }

    async fn save(&self, token: &str) -> ClientResult<()> {
        *self.token.lock().unwrap_or_else(PoisonError::into_inner) = Some(token.to_string());
        Ok(())
    }

    async fn clear(&self) -> ClientResult<()> {
        *self.token.lock().unwrap_or_else(PoisonError::into_inner) = None;
        Ok(())
    }
}
