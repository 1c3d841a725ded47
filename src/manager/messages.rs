//! Requests handled by the control loop and events it publishes

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::oneshot;

use crate::message::Message;

/// Unit of work queued to the control loop
#[derive(Debug)]
pub enum ActionRequest {
    /// Inbound driver message to dispatch
    Message(Message),

    /// Wake-up without payload; broadcasts the full host list
    ///
    /// Triggered once at start-up, and on demand.
    Wake,

    /// Snapshot of the loop counters
    GetStats {
        respond_to: oneshot::Sender<ManagerStats>,
    },

    /// Stop the loop after the current request
    Shutdown,
}

/// Counters maintained by the control loop
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ManagerStats {
    /// Inbound messages handed to the dispatch table
    pub messages_dispatched: u64,

    /// Messages handled by the undefined handler
    pub undefined_messages: u64,

    /// Payloads that could not be decoded
    pub decode_failures: u64,

    /// Reports dropped because the host is offline
    pub offline_drops: u64,

    /// Reports for hosts that no longer exist
    pub missing_hosts: u64,

    /// Successful host pool updates
    pub pool_updates: u64,

    pub timer_ticks: u64,

    pub host_list_broadcasts: u64,
}

/// VM state reported by a driver
///
/// Published for the subsystem that owns VM state; this core does not act
/// on it.
#[derive(Debug, Clone, Serialize)]
pub struct VmStateEvent {
    /// Host the report came from
    pub host_id: i32,

    pub vm_id: i32,

    /// Hypervisor-side name of the VM
    pub deploy_id: Option<String>,

    pub state: String,

    pub timestamp: DateTime<Utc>,
}
