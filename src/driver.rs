//! Driver handles and the driver registry
//!
//! A driver is an external worker that probes hosts and reports back
//! asynchronously. The core only needs two things from it:
//!
//! 1. **Outbound**: a write channel. `write` enqueues and returns at once;
//!    nothing waits for an acknowledgement.
//! 2. **Inbound**: whatever the driver reports is turned into
//!    [`ActionRequest::Message`] and queued for the control loop.
//!
//! Replies are not correlated with the commands that provoked them.
//!
//! ```text
//! MonitorCommands ──write──► DriverHandle ──mpsc──► writer task ──stdin──► process
//!                                                                            │
//! control loop ◄──ActionRequest── reader task ◄──────────stdout─────────────┘
//! ```

use std::collections::HashMap;
use std::process::Stdio;

use parking_lot::RwLock;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tracing::{debug, error, info, instrument, trace, warn};

use crate::config::DriverConfig;
use crate::error::{ImError, ImResult};
use crate::manager::messages::ActionRequest;
use crate::message::Message;

/// Write side of a live driver
#[derive(Debug, Clone)]
pub struct DriverHandle {
    name: String,
    sender: mpsc::UnboundedSender<Message>,
}

impl DriverHandle {
    pub fn new(name: impl Into<String>, sender: mpsc::UnboundedSender<Message>) -> Self {
        Self {
            name: name.into(),
            sender,
        }
    }

    /// Create an in-process driver
    ///
    /// The receiver yields every message written to the handle.
    pub fn channel(name: impl Into<String>) -> (Self, mpsc::UnboundedReceiver<Message>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(name, tx), rx)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Enqueue a message for the driver without waiting
    pub fn write(&self, message: Message) {
        trace!(driver = %self.name, "writing {} message for {}", message.message_type, message.oid);

        if let Err(e) = self.sender.send(message) {
            warn!(
                driver = %self.name,
                "driver channel closed, dropping {} message",
                e.0.message_type
            );
        }
    }

    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}

/// Named driver handles
///
/// Handles are registered once at start-up and resolved concurrently
/// afterwards.
#[derive(Debug, Default)]
pub struct DriverRegistry {
    drivers: RwLock<HashMap<String, DriverHandle>>,
}

impl DriverRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handle, replacing any handle with the same name
    pub fn register(&self, handle: DriverHandle) -> Option<DriverHandle> {
        debug!("registering driver '{}'", handle.name);
        self.drivers.write().insert(handle.name.clone(), handle)
    }

    /// Look up a driver by name
    ///
    /// Absence is not an error here; callers decide how to report it.
    pub fn resolve(&self, name: &str) -> Option<DriverHandle> {
        self.drivers.read().get(name).cloned()
    }

    /// Drop the handle registered under `name`
    pub fn remove(&self, name: &str) -> Option<DriverHandle> {
        self.drivers.write().remove(name)
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.drivers.read().keys().cloned().collect();
        names.sort();
        names
    }
}

/// Driver running as a child process speaking the line protocol
pub struct ProcessDriver;

impl ProcessDriver {
    /// Spawn the driver process and its reader/writer tasks
    ///
    /// Must be called from within a Tokio runtime.
    #[instrument(skip_all, fields(driver = %config.name))]
    pub fn spawn(
        config: &DriverConfig,
        inbound: mpsc::Sender<ActionRequest>,
    ) -> ImResult<DriverHandle> {
        let mut child = Command::new(&config.executable)
            .args(&config.arguments)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                ImError::Startup(format!(
                    "cannot start driver '{}' ({}): {e}",
                    config.name,
                    config.executable.display()
                ))
            })?;

        let (Some(mut stdin), Some(stdout)) = (child.stdin.take(), child.stdout.take()) else {
            return Err(ImError::Startup(format!(
                "driver '{}' has no stdio pipes",
                config.name
            )));
        };

        let (handle, mut outbound) = DriverHandle::channel(config.name.clone());
        let name = config.name.clone();

        // the writer task owns the child; the process lives as long as the queue
        tokio::spawn(async move {
            while let Some(message) = outbound.recv().await {
                let mut line = message.to_line();
                line.push('\n');

                let written = match stdin.write_all(line.as_bytes()).await {
                    Ok(()) => stdin.flush().await,
                    Err(e) => Err(e),
                };

                if let Err(e) = written {
                    error!(driver = %name, "failed to write to driver: {e}");
                    break;
                }
            }

            debug!(driver = %name, "driver writer stopped");
            drop(stdin);
            if let Err(e) = child.kill().await {
                trace!(driver = %name, "driver already gone: {e}");
            }
        });

        let name = config.name.clone();
        tokio::spawn(async move {
            let mut reader = BufReader::new(stdout);
            let mut buf = Vec::new();

            loop {
                buf.clear();
                match reader.read_until(b'\n', &mut buf).await {
                    Ok(0) => {
                        warn!(driver = %name, "driver closed its output");
                        break;
                    }
                    Ok(_) => {}
                    Err(e) => {
                        error!(driver = %name, "failed to read from driver: {e}");
                        break;
                    }
                }

                // a bad line only loses itself
                let Ok(line) = std::str::from_utf8(&buf) else {
                    warn!(driver = %name, "dropping driver line that is not UTF-8");
                    continue;
                };

                if line.trim().is_empty() {
                    continue;
                }

                match Message::from_line(line) {
                    Ok(message) => {
                        if inbound.send(ActionRequest::Message(message)).await.is_err() {
                            debug!(driver = %name, "control loop gone, stop reading");
                            break;
                        }
                    }
                    Err(e) => warn!(driver = %name, "dropping driver line: {e}"),
                }
            }
        });

        info!("driver '{}' started", config.name);
        Ok(handle)
    }
}

/// Starts the configured drivers
pub struct DriverManager;

impl DriverManager {
    /// Start every driver and register its handle
    ///
    /// Any failure aborts start-up. Handles registered by this call are
    /// rolled back, so the processes already started are reaped.
    pub fn start(
        configs: &[DriverConfig],
        registry: &DriverRegistry,
        inbound: &mpsc::Sender<ActionRequest>,
    ) -> ImResult<()> {
        let mut started: Vec<(String, Option<DriverHandle>)> = vec![];

        for config in configs {
            match ProcessDriver::spawn(config, inbound.clone()) {
                Ok(handle) => {
                    let replaced = registry.register(handle);
                    started.push((config.name.clone(), replaced));
                }
                Err(e) => {
                    for (name, replaced) in started.into_iter().rev() {
                        debug!("rolling back driver '{name}'");
                        match replaced {
                            Some(previous) => {
                                registry.register(previous);
                            }
                            None => {
                                registry.remove(&name);
                            }
                        }
                    }
                    return Err(e);
                }
            }
        }
        Ok(())
    }
}
