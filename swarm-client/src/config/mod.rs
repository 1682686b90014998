//! Configuration for the swarm client.
//!
//! [`ConfigStore`] owns the persisted TOML document; [`RuntimeConfig`] is the
//! typed snapshot every component reads. Reloading builds a new snapshot and
//! swaps it in atomically, so readers never observe a half-updated config.

mod runtime;
mod store;

pub use runtime::{
    COPTERS, CopterConfig, FILETRANSFER, FileTransferConfig, ID_GENERATE, ID_HOSTNAME,
    IdentitySource, NTP, NodeIdentity, NtpConfig, PRIVATE, PrivateConfig, RuntimeConfig, SERVER,
    ServerConfig, hostname,
};
pub use store::ConfigStore;

use crate::error::Result;
use arc_swap::ArcSwap;
use parking_lot::Mutex;
use std::path::PathBuf;
use std::sync::Arc;

/// Store handle shared by the dispatcher and the connection manager.
pub type SharedStore = Arc<Mutex<ConfigStore>>;

/// Current runtime snapshot; `load_full()` hands out a stable `Arc`.
pub type SharedConfig = Arc<ArcSwap<RuntimeConfig>>;

/// Open the store and derive the initial snapshot.
pub fn load(path: impl Into<PathBuf>) -> Result<(SharedStore, SharedConfig)> {
    let mut store = ConfigStore::open(path)?;
    let config = store.reload()?;
    Ok((
        Arc::new(Mutex::new(store)),
        Arc::new(ArcSwap::from_pointee(config)),
    ))
}

/// Reload from disk and publish the new snapshot.
///
/// On failure the previous snapshot stays active.
pub fn reload(store: &SharedStore, config: &SharedConfig) -> Result<Arc<RuntimeConfig>> {
    let next = Arc::new(store.lock().reload()?);
    config.store(Arc::clone(&next));
    Ok(next)
}
