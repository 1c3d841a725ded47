//! Host records and the host state machine

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::warn;

use crate::error::ImError;
use crate::template::Template;

/// Lifecycle state of a monitored host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HostState {
    /// Registered, not yet monitored
    Init,

    /// Monitored and in good standing
    Active,

    /// Monitoring failed, see the host's diagnostic
    Error,

    /// Administratively excluded; monitoring reports are ignored
    Offline,

    Disabled,
}

impl HostState {
    pub const ALL: [HostState; 5] = [
        HostState::Init,
        HostState::Active,
        HostState::Error,
        HostState::Offline,
        HostState::Disabled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            HostState::Init => "INIT",
            HostState::Active => "ACTIVE",
            HostState::Error => "ERROR",
            HostState::Offline => "OFFLINE",
            HostState::Disabled => "DISABLED",
        }
    }
}

impl fmt::Display for HostState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HostState {
    type Err = ImError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        HostState::ALL
            .into_iter()
            .find(|state| state.as_str() == s)
            .ok_or_else(|| ImError::Decode(format!("unknown host state '{s}'")))
    }
}

/// A monitored physical machine
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct Host {
    #[serde(rename = "ID")]
    oid: i32,

    pub name: String,

    pub state: HostState,

    /// Information driver used to monitor this host
    pub im_mad: String,

    /// Virtualization driver of this host
    pub vm_mad: String,

    /// Attributes reported by the monitoring probes
    #[serde(rename = "MONITORING")]
    pub monitoring: Template,

    #[serde(rename = "ERROR")]
    pub error: Option<String>,

    pub last_monitored: Option<DateTime<Utc>>,
}

impl Host {
    pub fn new(
        oid: i32,
        name: impl Into<String>,
        im_mad: impl Into<String>,
        vm_mad: impl Into<String>,
    ) -> Self {
        Self {
            oid,
            name: name.into(),
            state: HostState::Init,
            im_mad: im_mad.into(),
            vm_mad: vm_mad.into(),
            monitoring: Template::new(),
            error: None,
            last_monitored: None,
        }
    }

    pub fn oid(&self) -> i32 {
        self.oid
    }

    /// Merge freshly reported attributes into the monitoring data
    pub fn update_info(&mut self, info: Template) {
        self.monitoring.merge(info);
        self.last_monitored = Some(Utc::now());
    }

    /// Attach a diagnostic to the host
    pub fn error(&mut self, message: impl Into<String>) {
        let message = message.into();
        warn!(host = self.oid, name = %self.name, "{message}");
        self.error = Some(message);
    }

    /// Serialize the host as a JSON document
    pub fn to_document(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(&serde_json::json!({ "HOST": self }))
    }
}
