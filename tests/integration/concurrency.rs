//! Concurrency tests
//!
//! These tests verify that the control loop and the rest of the platform can
//! share the pool and the driver:
//! - Commands issued from many tasks while reports are dispatched
//! - Host locks held outside the loop delay, but do not lose, reports

use std::time::Duration;

use host_monitor::{HostPool, HostState, Message, MessageType};
use pretty_assertions::assert_eq;

use crate::helpers::*;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_commands_and_reports() {
    let mut system = start_system();
    let hosts: Vec<i32> = (0..10)
        .map(|i| create_host(&system.pool, &format!("node{i}"), HostState::Init))
        .collect();

    let mut tasks = vec![];
    for &oid in &hosts {
        let manager = system.manager.clone();
        tasks.push(tokio::spawn(async move {
            manager.commands().delete_host(oid);
            manager
                .dispatch(Message::new(MessageType::HostState, oid, "ACTIVE"))
                .await
                .unwrap();
        }));
    }

    for task in tasks {
        task.await.unwrap();
    }

    let stats = system.manager.get_stats().await.unwrap();
    assert_eq!(stats.messages_dispatched, 10);
    assert_eq!(stats.pool_updates, 10);

    for oid in hosts {
        assert_eq!(system.pool.get(oid).unwrap().state, HostState::Active);
    }

    let deletes = drain(&mut system.driver_rx)
        .into_iter()
        .filter(|m| m.message_type == MessageType::DelHost)
        .count();
    assert_eq!(deletes, 10);

    system.manager.shutdown().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_report_waits_for_host_lock() {
    let system = start_system();
    let oid = create_host(&system.pool, "node", HostState::Active);

    let pool = system.pool.clone();
    let holder = std::thread::spawn(move || {
        let mut host = pool.get(oid).unwrap();
        std::thread::sleep(Duration::from_millis(100));
        host.name = "renamed".to_string();
        pool.update(&host).unwrap();
    });

    // let the other thread take the lock first
    tokio::time::sleep(Duration::from_millis(20)).await;

    system
        .manager
        .dispatch(Message::new(MessageType::HostState, oid, "ERROR"))
        .await
        .unwrap();
    system.manager.get_stats().await.unwrap();
    holder.join().unwrap();

    let host = system.pool.get(oid).unwrap().clone();
    assert_eq!(host.state, HostState::Error);
    assert_eq!(host.name, "renamed");

    system.manager.shutdown().await.unwrap();
}
