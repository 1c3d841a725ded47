//! Commands sent from the platform to the monitoring driver
//!
//! All commands are best-effort notifications: the message is built, handed
//! to the driver's queue and the call returns. Nothing waits for a reply.

use std::sync::Arc;

use tracing::{debug, error, instrument};

use crate::driver::{DriverHandle, DriverRegistry};
use crate::error::{ImError, ImResult};
use crate::host::Host;
use crate::message::{Message, MessageType, NO_OID};
use crate::pool::{DumpFilter, HostPool};
use crate::template::Template;

/// Outbound command API
///
/// Cheap to clone and safe to use from any task or thread.
#[derive(Clone)]
pub struct MonitorCommands {
    registry: Arc<DriverRegistry>,
    pool: Arc<dyn HostPool>,
    driver_name: String,
}

impl MonitorCommands {
    pub fn new(
        registry: Arc<DriverRegistry>,
        pool: Arc<dyn HostPool>,
        driver_name: impl Into<String>,
    ) -> Self {
        Self {
            registry,
            pool,
            driver_name: driver_name.into(),
        }
    }

    pub fn driver_name(&self) -> &str {
        &self.driver_name
    }

    fn driver(&self) -> Option<DriverHandle> {
        self.registry.resolve(&self.driver_name)
    }

    /// Ask the driver to start monitoring a host
    ///
    /// Without a driver the failure is recorded on the host and returned.
    #[instrument(skip_all, fields(host = host.oid()))]
    pub fn start_monitor(&self, host: &mut Host, update_remotes: bool) -> ImResult<()> {
        debug!("monitoring host {} ({})", host.name, host.oid());

        let Some(driver) = self.driver() else {
            host.error(format!("Cannot find driver: '{}'", self.driver_name));
            return Err(ImError::DriverNotFound(self.driver_name.clone()));
        };

        let payload = if update_remotes { "1" } else { "0" };
        driver.write(Message::new(MessageType::StartMonitor, host.oid(), payload));

        Ok(())
    }

    /// Ask the driver to stop monitoring a host
    pub fn stop_monitor(&self, hid: i32, name: &str, im_mad: &str) {
        let Some(driver) = self.driver() else {
            error!("could not find information driver '{}'", self.driver_name);
            return;
        };

        let mut data = Template::new();
        data.add("NAME", name);
        data.add("IM_MAD", im_mad);

        driver.write(Message::new(MessageType::StopMonitor, hid, data.to_string()));
    }

    /// Push the current definition of a host to the driver
    pub fn update_host(&self, host: &Host) {
        let Some(driver) = self.driver() else {
            return;
        };

        match host.to_document() {
            Ok(document) => {
                driver.write(Message::new(MessageType::UpdateHost, host.oid(), document));
            }
            Err(e) => error!("cannot serialize host {}: {e}", host.oid()),
        }
    }

    /// Tell the driver a host was deleted
    pub fn delete_host(&self, hid: i32) {
        let Some(driver) = self.driver() else {
            return;
        };

        driver.write(Message::new(MessageType::DelHost, hid, ""));
    }

    /// Send the whole host pool to the driver
    pub fn host_list(&self) -> ImResult<()> {
        let Some(driver) = self.driver() else {
            error!("could not find information driver '{}'", self.driver_name);
            return Err(ImError::DriverNotFound(self.driver_name.clone()));
        };

        let hosts = self.pool.dump(&DumpFilter::default())?;
        driver.write(Message::new(MessageType::HostList, NO_OID, hosts));

        Ok(())
    }
}
