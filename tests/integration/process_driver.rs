//! Tests with a real driver process
//!
//! Each driver is a small shell script speaking the line protocol, run
//! through `sh`.

use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use host_monitor::{
    HostPool, HostState, InformationManager, MemoryHostPool, Message, MessageType,
    config::{DriverConfig, ManagerConfig},
};
use pretty_assertions::assert_eq;

const DRIVER_SCRIPT: &str = r#"while read -r type oid payload; do
    if [ "$type" = "START_MONITOR" ]; then
        printf '%s\n' "HOST_STATE $oid \"ACTIVE\""
        printf '%s\n' "SYSTEM_HOST $oid \"TOTALCPU=400\\nHYPERVISOR=\\\"kvm\\\"\""
        printf '%s\n' "this line is not a message"
    fi
done
"#;

/// Reports for START_MONITOR, preceded by a line that is not UTF-8
const GARBLED_DRIVER_SCRIPT: &str = r#"while read -r type oid payload; do
    if [ "$type" = "START_MONITOR" ]; then
        printf '\377\n'
        printf '%s\n' "HOST_STATE $oid \"ACTIVE\""
    fi
done
"#;

/// Reports host 0 as ACTIVE right away, then records the first command
/// it receives in the file given as its argument
const EAGER_DRIVER_SCRIPT: &str = r#"printf '%s\n' "HOST_STATE 0 \"ACTIVE\""
read -r line
printf '%s\n' "$line" > "$1"
while read -r line; do :; done
"#;

fn write_driver(dir: &tempfile::TempDir, script: &str) -> std::path::PathBuf {
    let path = dir.path().join("monitord.sh");
    let mut file = std::fs::File::create(&path).unwrap();
    file.write_all(script.as_bytes()).unwrap();
    path
}

fn driver_config(arguments: Vec<String>) -> ManagerConfig {
    ManagerConfig {
        drivers: vec![DriverConfig {
            name: "monitord".to_string(),
            executable: "sh".into(),
            arguments,
        }],
        ..Default::default()
    }
}

async fn wait_for_state(pool: &MemoryHostPool, oid: i32, state: HostState) -> bool {
    for _ in 0..50 {
        if pool.get(oid).unwrap().state == state {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    false
}

#[tokio::test]
async fn test_reports_from_driver_process() {
    let dir = tempfile::tempdir().unwrap();
    let script = write_driver(&dir, DRIVER_SCRIPT);

    let pool = Arc::new(MemoryHostPool::new());
    let oid = pool.allocate("node", "kvm", "kvm").unwrap();

    let config = driver_config(vec![script.to_string_lossy().into_owned()]);

    let manager = InformationManager::new(config, pool.clone()).start().unwrap();

    {
        let mut host = pool.get(oid).unwrap();
        manager.commands().start_monitor(&mut host, false).unwrap();
    }

    // reports arrive asynchronously
    let mut monitored = false;
    for _ in 0..50 {
        let host = pool.get(oid).unwrap().clone();
        if host.state == HostState::Active && host.monitoring.get_str("TOTALCPU").is_some() {
            monitored = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    assert!(monitored, "host should have been monitored by the driver");

    let host = pool.get(oid).unwrap().clone();
    assert_eq!(host.monitoring.get_str("HYPERVISOR"), Some("kvm"));

    let stats = manager.get_stats().await.unwrap();
    assert_eq!(stats.messages_dispatched, 2);

    manager.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_non_utf8_line_does_not_stop_reports() {
    let dir = tempfile::tempdir().unwrap();
    let script = write_driver(&dir, GARBLED_DRIVER_SCRIPT);

    let pool = Arc::new(MemoryHostPool::new());
    let oid = pool.allocate("node", "kvm", "kvm").unwrap();

    let config = driver_config(vec![script.to_string_lossy().into_owned()]);
    let manager = InformationManager::new(config, pool.clone()).start().unwrap();

    {
        let mut host = pool.get(oid).unwrap();
        manager.commands().start_monitor(&mut host, false).unwrap();
    }

    assert!(
        wait_for_state(&pool, oid, HostState::Active).await,
        "report after the garbled line should have been applied"
    );

    let stats = manager.get_stats().await.unwrap();
    assert_eq!(stats.messages_dispatched, 1);

    manager.shutdown().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_host_list_precedes_early_driver_reports() {
    let dir = tempfile::tempdir().unwrap();
    let script = write_driver(&dir, EAGER_DRIVER_SCRIPT);
    let first_command = dir.path().join("first_command");

    let pool = Arc::new(MemoryHostPool::new());
    let oid = pool.allocate("node", "kvm", "kvm").unwrap();
    assert_eq!(oid, 0);

    let config = driver_config(vec![
        script.to_string_lossy().into_owned(),
        first_command.to_string_lossy().into_owned(),
    ]);
    let manager = InformationManager::new(config, pool.clone()).start().unwrap();

    assert!(wait_for_state(&pool, oid, HostState::Active).await);

    let mut line = String::new();
    for _ in 0..50 {
        line = std::fs::read_to_string(&first_command).unwrap_or_default();
        if line.ends_with('\n') {
            break;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }

    let message = Message::from_line(&line).unwrap();
    assert_eq!(message.message_type, MessageType::HostList);

    // the list was taken before the early report was applied
    let doc: serde_json::Value = serde_json::from_str(&message.payload).unwrap();
    assert_eq!(doc["HOST_POOL"]["HOST"][0]["STATE"], "INIT");

    manager.shutdown().await.unwrap();
}
