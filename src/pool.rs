//! Host pool collaborator
//!
//! The pool is the authoritative registry of host records. It is shared by
//! the whole platform, so it owns its own concurrency control:
//!
//! - **Per-record locks**: `get` hands out a [`HostGuard`] that holds the
//!   record's exclusive lock. Dropping the guard releases it, on every path.
//! - **Persistence**: `update` writes the record back; `dump` serializes the
//!   persisted view and never touches record locks.
//!
//! The information manager depends only on the [`HostPool`] trait.
//! [`MemoryHostPool`] is the in-process implementation.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicI32, AtomicU64, Ordering};

use parking_lot::{Mutex, RwLock};
use serde_json::{Value, json};
use tracing::{debug, trace};

use crate::host::{Host, HostState};

/// Exclusive lock on one host record
pub type HostGuard = parking_lot::lock_api::ArcMutexGuard<parking_lot::RawMutex, Host>;

/// Result type alias for pool operations
pub type PoolResult<T> = Result<T, PoolError>;

/// Errors that can occur during pool operations
#[derive(Debug)]
pub enum PoolError {
    /// The record does not exist (anymore)
    NotFound(i32),

    /// The record could not be serialized
    SerializationError(String),
}

impl fmt::Display for PoolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PoolError::NotFound(oid) => write!(f, "host {} does not exist", oid),
            PoolError::SerializationError(msg) => write!(f, "host serialization error: {}", msg),
        }
    }
}

impl std::error::Error for PoolError {}

impl From<serde_json::Error> for PoolError {
    fn from(err: serde_json::Error) -> Self {
        PoolError::SerializationError(err.to_string())
    }
}

/// Selection applied by [`HostPool::dump`]
///
/// The default filter selects every host, ordered by ascending id.
#[derive(Debug, Clone, Default)]
pub struct DumpFilter {
    /// Only dump hosts in this state
    pub state: Option<HostState>,

    /// Order by descending id
    pub descending: bool,
}

/// Shared registry of host records
///
/// Implementations must be `Send + Sync`: the control loop and the rest of
/// the platform use the pool concurrently.
pub trait HostPool: Send + Sync {
    /// Fetch a host and lock it
    ///
    /// Returns `None` when the host does not exist, e.g. because it was
    /// deleted concurrently.
    fn get(&self, oid: i32) -> Option<HostGuard>;

    /// Persist the current contents of a (locked) host
    fn update(&self, host: &Host) -> PoolResult<()>;

    /// Serialize all hosts matching `filter`
    ///
    /// The document is `{"HOST_POOL":{"HOST":[...]}}`, also when empty.
    fn dump(&self, filter: &DumpFilter) -> PoolResult<String>;
}

/// Persisted view of one host
struct Snapshot {
    state: HostState,
    body: Value,
}

/// In-memory host pool
pub struct MemoryHostPool {
    /// Live records, each behind its own lock
    hosts: RwLock<BTreeMap<i32, Arc<Mutex<Host>>>>,

    /// Last persisted contents of every record
    ///
    /// Written only while `hosts` is locked, always in that order.
    snapshots: RwLock<BTreeMap<i32, Snapshot>>,

    next_oid: AtomicI32,

    /// Number of successful `update` calls
    update_count: AtomicU64,
}

impl MemoryHostPool {
    pub fn new() -> Self {
        Self {
            hosts: RwLock::new(BTreeMap::new()),
            snapshots: RwLock::new(BTreeMap::new()),
            next_oid: AtomicI32::new(0),
            update_count: AtomicU64::new(0),
        }
    }

    /// Register a new host and return its id
    pub fn allocate(&self, name: &str, im_mad: &str, vm_mad: &str) -> PoolResult<i32> {
        let oid = self.next_oid.fetch_add(1, Ordering::SeqCst);
        let host = Host::new(oid, name, im_mad, vm_mad);

        let mut hosts = self.hosts.write();
        self.persist(&host)?;
        hosts.insert(oid, Arc::new(Mutex::new(host)));
        drop(hosts);

        debug!("allocated host {name} ({oid})");
        Ok(oid)
    }

    /// Drop a host from the pool
    ///
    /// Guards already handed out stay valid; later `get` calls return `None`.
    pub fn remove(&self, oid: i32) -> bool {
        let mut hosts = self.hosts.write();
        self.snapshots.write().remove(&oid);
        hosts.remove(&oid).is_some()
    }

    pub fn update_count(&self) -> u64 {
        self.update_count.load(Ordering::SeqCst)
    }

    /// Last persisted document of a host
    pub fn persisted(&self, oid: i32) -> Option<Value> {
        self.snapshots.read().get(&oid).map(|s| s.body.clone())
    }

    pub fn len(&self) -> usize {
        self.hosts.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.hosts.read().is_empty()
    }

    fn persist(&self, host: &Host) -> PoolResult<()> {
        let snapshot = Snapshot {
            state: host.state,
            body: serde_json::to_value(host)?,
        };
        self.snapshots.write().insert(host.oid(), snapshot);
        Ok(())
    }
}

impl Default for MemoryHostPool {
    fn default() -> Self {
        Self::new()
    }
}

impl HostPool for MemoryHostPool {
    fn get(&self, oid: i32) -> Option<HostGuard> {
        // release the map lock before waiting on the record
        let record = self.hosts.read().get(&oid).cloned()?;
        Some(Mutex::lock_arc(&record))
    }

    fn update(&self, host: &Host) -> PoolResult<()> {
        // `remove` cannot run between the check and the write
        let hosts = self.hosts.read();
        if !hosts.contains_key(&host.oid()) {
            return Err(PoolError::NotFound(host.oid()));
        }

        self.persist(host)?;
        drop(hosts);
        self.update_count.fetch_add(1, Ordering::SeqCst);

        trace!("persisted host {} ({})", host.name, host.oid());
        Ok(())
    }

    fn dump(&self, filter: &DumpFilter) -> PoolResult<String> {
        let snapshots = self.snapshots.read();

        let mut hosts: Vec<&Value> = snapshots
            .values()
            .filter(|s| filter.state.is_none_or(|state| s.state == state))
            .map(|s| &s.body)
            .collect();

        if filter.descending {
            hosts.reverse();
        }

        Ok(json!({ "HOST_POOL": { "HOST": hosts } }).to_string())
    }
}
