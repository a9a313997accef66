use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use tokio::sync::mpsc::UnboundedSender;
use tracing::debug;

use crate::errors::Result;
use crate::{Direction, TransferResult, Transferable};

/// Name of the adapter every client is expected to support, used when the server does not
/// name one or names one that is not registered.
pub const BASIC_ADAPTER_NAME: &str = "basic";

/// Byte progress reported by adapters: `(name, total_size, bytes_read_so_far, increment)`.
/// Reporting progress cannot fail a transfer, so the callback returns nothing.
pub type ProgressCallback = Arc<dyn Fn(&str, u64, u64, u64) + Send + Sync>;

/// Performs the actual byte transfer for accepted objects.
///
/// The queue calls `begin` once before the first `add`, then `add` for each object, and
/// finally `end` exactly once.  Every added object must produce exactly one
/// `TransferResult` on the results channel given to `begin`.
#[async_trait]
pub trait TransferAdapter: Send + Sync {
    fn name(&self) -> &str;

    fn direction(&self) -> Direction;

    async fn begin(
        &self,
        max_concurrency: usize,
        progress: ProgressCallback,
        results: UnboundedSender<TransferResult>,
    ) -> Result<()>;

    /// Queues one object.  Must not block.
    fn add(&self, transfer: Transferable);

    /// Waits for every queued object to finish and releases the adapter's resources.
    async fn end(&self);
}

/// Constructs a fresh adapter for a (name, direction) pair.
pub type NewAdapterFn = Arc<dyn Fn(&str, Direction) -> Arc<dyn TransferAdapter> + Send + Sync>;

/// Registry of the transfer adapters this client supports.
pub struct AdapterManifest {
    basic_transfers_only: bool,
    uploaders: RwLock<HashMap<String, NewAdapterFn>>,
    downloaders: RwLock<HashMap<String, NewAdapterFn>>,
}

impl std::fmt::Debug for AdapterManifest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdapterManifest")
            .field("basic_transfers_only", &self.basic_transfers_only)
            .field("uploaders", &self.uploaders.read().keys().collect::<Vec<_>>())
            .field("downloaders", &self.downloaders.read().keys().collect::<Vec<_>>())
            .finish()
    }
}

impl Default for AdapterManifest {
    fn default() -> Self {
        Self::new(false)
    }
}

impl AdapterManifest {
    pub fn new(basic_transfers_only: bool) -> Self {
        Self {
            basic_transfers_only,
            uploaders: RwLock::new(HashMap::new()),
            downloaders: RwLock::new(HashMap::new()),
        }
    }

    pub fn from_config(config: &lfs_config::TransferConfig) -> Self {
        Self::new(config.basic_transfers_only)
    }

    fn registry(&self, direction: Direction) -> &RwLock<HashMap<String, NewAdapterFn>> {
        match direction {
            Direction::Upload => &self.uploaders,
            Direction::Download => &self.downloaders,
        }
    }

    /// Registers (or replaces) the constructor for `name` in `direction`.
    pub fn register_adapter(&self, name: impl Into<String>, direction: Direction, new_adapter: NewAdapterFn) {
        self.registry(direction).write().insert(name.into(), new_adapter);
    }

    pub fn unregister_adapter(&self, name: &str, direction: Direction) {
        self.registry(direction).write().remove(name);
    }

    /// The adapter names to advertise to the server, sorted.
    pub fn adapter_names(&self, direction: Direction) -> Vec<String> {
        if self.basic_transfers_only {
            return vec![BASIC_ADAPTER_NAME.to_owned()];
        }
        let mut names: Vec<String> = self.registry(direction).read().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn new_adapter(&self, name: &str, direction: Direction) -> Option<Arc<dyn TransferAdapter>> {
        // Clone the constructor out so it does not run under the registry lock.
        let new_adapter = self.registry(direction).read().get(name).cloned()?;
        Some(new_adapter(name, direction))
    }

    fn is_registered(&self, name: &str, direction: Direction) -> bool {
        self.registry(direction).read().contains_key(name)
    }

    /// The name of the adapter to use when the server asks for `name`: `name` itself if it
    /// is registered and allowed, otherwise the basic adapter.  `None` if neither is
    /// registered.
    pub fn resolve_adapter_name(&self, name: Option<&str>, direction: Direction) -> Option<String> {
        let name = name.filter(|n| !n.is_empty()).unwrap_or(BASIC_ADAPTER_NAME);

        if name != BASIC_ADAPTER_NAME {
            if !self.basic_transfers_only && self.is_registered(name, direction) {
                return Some(name.to_owned());
            }
            debug!("Transfer adapter {name:?} unavailable for {direction}; using {BASIC_ADAPTER_NAME:?}");
        }

        self.is_registered(BASIC_ADAPTER_NAME, direction)
            .then(|| BASIC_ADAPTER_NAME.to_owned())
    }

    /// The named adapter, or the basic one when `name` is empty, unknown, or excluded
    /// by `basic_transfers_only`.
    pub fn new_adapter_or_default(&self, name: Option<&str>, direction: Direction) -> Option<Arc<dyn TransferAdapter>> {
        let name = self.resolve_adapter_name(name, direction)?;
        self.new_adapter(&name, direction)
    }
}
