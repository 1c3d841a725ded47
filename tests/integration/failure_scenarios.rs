//! Failure tests for the control loop
//!
//! Malformed input and missing collaborators must never stop the loop:
//! - Undecodable payloads
//! - Unknown message types
//! - Hosts deleted while reports are in flight
//! - No driver registered

use assert_matches::assert_matches;
use host_monitor::{HostPool, HostState, ImError, Message, MessageType};
use pretty_assertions::assert_eq;

use crate::helpers::*;

#[tokio::test]
async fn test_invalid_state_name_is_dropped() {
    let system = start_system();
    let oid = create_host(&system.pool, "node", HostState::Active);
    let updates = system.pool.update_count();

    system
        .manager
        .dispatch(Message::new(MessageType::HostState, oid, "ON_FIRE"))
        .await
        .unwrap();
    let stats = system.manager.get_stats().await.unwrap();

    assert_eq!(system.pool.get(oid).unwrap().state, HostState::Active);
    assert_eq!(system.pool.update_count(), updates);
    assert_eq!(stats.decode_failures, 1);
    assert!(system.manager.is_running());

    system.manager.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_malformed_system_host_attaches_diagnostic() {
    let system = start_system();
    let oid = create_host(&system.pool, "node", HostState::Active);

    system
        .manager
        .dispatch(Message::new(MessageType::SystemHost, oid, "TOTALCPU = [ 800"))
        .await
        .unwrap();
    system.manager.get_stats().await.unwrap();

    let host = system.pool.get(oid).unwrap().clone();
    assert!(
        host.error
            .as_deref()
            .unwrap()
            .starts_with("Error parsing monitoring template:")
    );
    assert_eq!(host.state, HostState::Active);
    assert!(host.monitoring.is_empty());

    let persisted = system.pool.persisted(oid).unwrap();
    assert_eq!(persisted["ERROR"], host.error.unwrap().as_str());

    system.manager.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_unregistered_type_goes_to_undefined_handler() {
    let system = start_system();
    let oid = create_host(&system.pool, "node", HostState::Active);
    let updates = system.pool.update_count();

    system
        .manager
        .dispatch(Message::new(MessageType::UpdateHost, oid, "{}"))
        .await
        .unwrap();
    let stats = system.manager.get_stats().await.unwrap();

    assert_eq!(stats.undefined_messages, 1);
    assert_eq!(stats.messages_dispatched, 1);
    assert_eq!(system.pool.update_count(), updates);

    system.manager.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_report_for_deleted_host() {
    let system = start_system();
    let oid = create_host(&system.pool, "node", HostState::Active);
    system.pool.remove(oid);

    system
        .manager
        .dispatch(Message::new(MessageType::HostState, oid, "ERROR"))
        .await
        .unwrap();
    system
        .manager
        .dispatch(Message::new(MessageType::SystemHost, oid, SYSTEM_HOST_REPORT))
        .await
        .unwrap();
    let stats = system.manager.get_stats().await.unwrap();

    assert_eq!(stats.missing_hosts, 2);
    assert_eq!(stats.pool_updates, 0);

    system.manager.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_start_monitor_without_driver() {
    let (manager, pool) = start_system_without_driver();
    let oid = pool.allocate("node", "kvm", "kvm").unwrap();

    let mut host = pool.get(oid).unwrap();
    let result = manager.commands().start_monitor(&mut host, true);

    assert_matches!(result, Err(ImError::DriverNotFound(_)));
    assert_eq!(host.error.as_deref(), Some("Cannot find driver: 'monitord'"));
    drop(host);

    let stats = manager.get_stats().await.unwrap();
    assert_eq!(stats.host_list_broadcasts, 0);
    assert!(manager.is_running());

    manager.shutdown().await.unwrap();
}
