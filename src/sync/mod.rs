pub mod collections;
pub mod session;
pub mod storage;
pub mod transport;

#[cfg(test)]
pub(crate) mod testing;

use std::sync::Arc;

use crate::config::{ClientConfig, StorageBackend};
use crate::error::ClientResult;
use collections::CollectionStore;
use session::SessionStore;
use storage::{FileStorage, KeyringStorage, MemoryStorage, TokenStorage};
use transport::{HttpTransport, Transport};

/// Builds the token storage selected in `config`.
pub fn storage_from_config(config: &ClientConfig) -> Arc<dyn TokenStorage> {
    match config.storage {
        StorageBackend::File => Arc::new(FileStorage::new(config.storage_path.clone())),
        StorageBackend::Keyring => Arc::new(KeyringStorage::new(config.api_base_url.clone())),
        StorageBackend::Memory => Arc::new(MemoryStorage::new()),
    }
}

/// Wires transport, storage and both stores for one API.
///
/// The session is restored from storage before this returns.
pub async fn connect(config: &ClientConfig) -> ClientResult<CollectionStore> {
    config.validate()?;
    let transport: Arc<dyn Transport> = Arc::new(HttpTransport::new(&config.api_base_url)?);
    let storage = storage_from_config(config);
    let session = SessionStore::open(transport, storage).await;
    log::info!(
        "Connected to {} ({})",
        config.api_base_url,
        if session.is_authenticated() {
            "session restored"
        } else {
            "anonymous"
        }
    );
    Ok(CollectionStore::new(session))
}
