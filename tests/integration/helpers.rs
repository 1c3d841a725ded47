//! Helper functions for integration tests

use std::sync::Arc;

use host_monitor::{
    HostPool, HostState, InformationManager, ManagerHandle, MemoryHostPool, Message,
    config::ManagerConfig,
    driver::{DriverHandle, DriverRegistry},
};
use tokio::sync::mpsc;

pub struct TestSystem {
    pub manager: ManagerHandle,
    pub pool: Arc<MemoryHostPool>,
    pub driver_rx: mpsc::UnboundedReceiver<Message>,
}

/// Start a manager with an in-process "monitord" driver
pub fn start_system() -> TestSystem {
    let pool = Arc::new(MemoryHostPool::new());
    let registry = Arc::new(DriverRegistry::new());
    let (handle, driver_rx) = DriverHandle::channel("monitord");
    registry.register(handle);

    let manager =
        InformationManager::with_registry(ManagerConfig::default(), pool.clone(), registry)
            .start()
            .unwrap();

    TestSystem {
        manager,
        pool,
        driver_rx,
    }
}

/// Start a manager without any driver
pub fn start_system_without_driver() -> (ManagerHandle, Arc<MemoryHostPool>) {
    let pool = Arc::new(MemoryHostPool::new());
    let manager = InformationManager::new(ManagerConfig::default(), pool.clone())
        .start()
        .unwrap();

    (manager, pool)
}

/// Allocate a host and move it to `state`
pub fn create_host(pool: &MemoryHostPool, name: &str, state: HostState) -> i32 {
    let oid = pool.allocate(name, "kvm", "kvm").unwrap();

    let mut host = pool.get(oid).unwrap();
    host.state = state;
    pool.update(&host).unwrap();

    oid
}

/// Drain every message the driver received so far
pub fn drain(rx: &mut mpsc::UnboundedReceiver<Message>) -> Vec<Message> {
    let mut messages = vec![];
    while let Ok(message) = rx.try_recv() {
        messages.push(message);
    }
    messages
}

pub const SYSTEM_HOST_REPORT: &str = r#"
HYPERVISOR = "kvm"
TOTALCPU = 800
TOTALMEMORY = 16318888
DS = [ ID = "0", FREE_MB = "40193" ]
"#;
