//! Information manager: the monitoring coordination core
//!
//! A single control loop owns every host state transition triggered by
//! driver reports. It runs as one Tokio task and serializes all work:
//!
//! ```text
//!   driver reports ──► ActionRequest::Message ─┐
//!   start-up / on demand ──► ActionRequest::Wake ┼──► request queue ──► control loop
//!   timer tick (interval) ─────────────────────────────────────────────────┘
//!                                                       │
//!                          ┌────────────────────────────┼──────────────────┐
//!                          ▼                            ▼                  ▼
//!                   DispatchTable              host-list broadcast    timer action
//!                   (synchronizer)             (MonitorCommands)
//! ```
//!
//! Requests are handled in arrival order; between a timer tick and a
//! queued request whichever is ready first goes first. A handler always
//! runs to completion.
//!
//! The rest of the platform talks to drivers through [`MonitorCommands`],
//! which never goes through the loop.

pub mod commands;
pub mod dispatch;
pub mod messages;
pub mod synchronizer;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::time::{Instant, interval_at};
use tracing::{debug, error, info, instrument, trace, warn};

use crate::config::ManagerConfig;
use crate::driver::{DriverManager, DriverRegistry};
use crate::error::{ImError, ImResult};
use crate::message::{Message, MessageType};
use crate::pool::HostPool;

pub use commands::MonitorCommands;
pub use dispatch::{ActionHandler, DispatchTable};
pub use messages::{ActionRequest, ManagerStats, VmStateEvent};

/// Capacity of the control loop's request queue
const REQUEST_QUEUE_SIZE: usize = 256;

/// Capacity of the VM state broadcast channel
const VM_STATE_CHANNEL_SIZE: usize = 256;

/// State shared by all handlers running on the control loop
pub struct ActionContext {
    pub pool: Arc<dyn HostPool>,
    pub commands: MonitorCommands,
    pub stats: ManagerStats,
    pub vm_state_tx: broadcast::Sender<VmStateEvent>,
}

/// Builder for the control loop
pub struct InformationManager {
    config: ManagerConfig,
    pool: Arc<dyn HostPool>,
    registry: Arc<DriverRegistry>,
    vm_state_tx: broadcast::Sender<VmStateEvent>,
}

impl InformationManager {
    pub fn new(config: ManagerConfig, pool: Arc<dyn HostPool>) -> Self {
        Self::with_registry(config, pool, Arc::new(DriverRegistry::new()))
    }

    /// Use a registry that may already hold in-process drivers
    pub fn with_registry(
        config: ManagerConfig,
        pool: Arc<dyn HostPool>,
        registry: Arc<DriverRegistry>,
    ) -> Self {
        let (vm_state_tx, _) = broadcast::channel(VM_STATE_CHANNEL_SIZE);

        Self {
            config,
            pool,
            registry,
            vm_state_tx,
        }
    }

    pub fn registry(&self) -> Arc<DriverRegistry> {
        self.registry.clone()
    }

    /// Receive VM state reports published by the loop
    pub fn subscribe_vm_states(&self) -> broadcast::Receiver<VmStateEvent> {
        self.vm_state_tx.subscribe()
    }

    fn dispatch_table() -> DispatchTable {
        let mut table = DispatchTable::new();

        table.register(MessageType::Undefined, synchronizer::undefined);
        table.register(MessageType::HostState, synchronizer::host_state);
        table.register(MessageType::SystemHost, synchronizer::system_host);
        table.register(MessageType::VmState, synchronizer::vm_state);

        table
    }

    /// Start the drivers and the control loop
    ///
    /// Must be called from within a Tokio runtime. A zero timer period or a
    /// driver that cannot be started aborts start-up. On success the loop is running and a wake-up
    /// is queued ahead of any driver report so the driver receives the full
    /// host list first.
    pub fn start(self) -> ImResult<ManagerHandle> {
        if self.config.timer_period == 0 {
            let e = ImError::Startup("timer period must be at least one second".to_string());
            error!("Error starting Information Manager: {e}");
            return Err(e);
        }

        let (request_tx, request_rx) = mpsc::channel(REQUEST_QUEUE_SIZE);

        // queued before any driver can report, so the queue has room
        if request_tx.try_send(ActionRequest::Wake).is_err() {
            warn!("could not queue start-up wake-up");
        }

        if let Err(e) = DriverManager::start(&self.config.drivers, &self.registry, &request_tx) {
            error!("Error starting Information Manager: {e}");
            return Err(e);
        }

        info!("starting information manager");

        let commands = MonitorCommands::new(
            self.registry.clone(),
            self.pool.clone(),
            self.config.monitor_driver.clone(),
        );

        let actor = ControlLoop {
            table: Self::dispatch_table(),
            ctx: ActionContext {
                pool: self.pool,
                commands: commands.clone(),
                stats: ManagerStats::default(),
                vm_state_tx: self.vm_state_tx,
            },
            request_rx,
            timer_period: self.config.timer_period(),
        };

        tokio::spawn(actor.run());

        Ok(ManagerHandle {
            sender: request_tx,
            commands,
        })
    }
}

/// The single worker executing handlers and timer ticks
struct ControlLoop {
    table: DispatchTable,
    ctx: ActionContext,
    request_rx: mpsc::Receiver<ActionRequest>,
    timer_period: Duration,
}

impl ControlLoop {
    #[instrument(skip(self), name = "information_manager")]
    async fn run(mut self) {
        info!("information manager started");

        let mut ticker = interval_at(Instant::now() + self.timer_period, self.timer_period);

        loop {
            tokio::select! {
                _ = ticker.tick() => self.timer_action(),

                request = self.request_rx.recv() => match request {
                    Some(ActionRequest::Message(message)) => {
                        self.table.dispatch(&mut self.ctx, message);
                    }

                    Some(ActionRequest::Wake) => self.user_action(),

                    Some(ActionRequest::GetStats { respond_to }) => {
                        let _ = respond_to.send(self.ctx.stats.clone());
                    }

                    Some(ActionRequest::Shutdown) => {
                        debug!("received shutdown command");
                        break;
                    }

                    None => {
                        warn!("request channel closed, shutting down");
                        break;
                    }
                }
            }
        }

        info!("information manager stopped");
    }

    /// Periodic hook, currently without work of its own
    fn timer_action(&mut self) {
        self.ctx.stats.timer_ticks += 1;
        trace!("timer tick");
    }

    /// Broadcast the host list to the monitoring driver
    fn user_action(&mut self) {
        match self.ctx.commands.host_list() {
            Ok(()) => self.ctx.stats.host_list_broadcasts += 1,
            Err(e) => error!("failed to send host list: {e}"),
        }
    }
}

/// Handle for controlling the information manager
///
/// It can be cloned and shared across tasks.
#[derive(Clone)]
pub struct ManagerHandle {
    sender: mpsc::Sender<ActionRequest>,
    commands: MonitorCommands,
}

impl ManagerHandle {
    /// Outbound commands to the monitoring driver
    pub fn commands(&self) -> &MonitorCommands {
        &self.commands
    }

    /// Queue for inbound driver messages
    ///
    /// Drivers living inside the process push their reports here.
    pub fn inbound(&self) -> mpsc::Sender<ActionRequest> {
        self.sender.clone()
    }

    /// Queue an inbound driver message
    pub async fn dispatch(&self, message: Message) -> Result<()> {
        self.sender
            .send(ActionRequest::Message(message))
            .await
            .context("failed to queue driver message")?;
        Ok(())
    }

    /// Wake the loop up, broadcasting the host list again
    pub async fn wake(&self) -> Result<()> {
        self.sender
            .send(ActionRequest::Wake)
            .await
            .context("failed to send wake-up")?;
        Ok(())
    }

    /// Get the loop counters
    ///
    /// Answered after every request queued before it.
    pub async fn get_stats(&self) -> Result<ManagerStats> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(ActionRequest::GetStats { respond_to: tx })
            .await
            .context("failed to send GetStats command")?;

        rx.await.context("failed to receive response")
    }

    /// Stop the loop and wait until it has exited
    pub async fn shutdown(&self) -> Result<()> {
        self.sender
            .send(ActionRequest::Shutdown)
            .await
            .context("failed to send Shutdown command")?;

        self.sender.closed().await;
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        !self.sender.is_closed()
    }
}
