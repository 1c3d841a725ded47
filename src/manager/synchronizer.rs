//! Handlers applying driver reports to host records
//!
//! Every handler follows the same discipline: fetch the host with its lock,
//! check it, mutate it, persist only on change. The lock is the guard
//! returned by the pool, so it is released on every return path.
//!
//! Hosts in `OFFLINE` are never touched: an operator took them out of
//! monitoring and only an explicit administrative action may bring them
//! back.

use chrono::Utc;
use tracing::{debug, error, info, instrument, trace, warn};

use crate::host::{Host, HostState};
use crate::message::Message;
use crate::pool::HostGuard;
use crate::template::{Attribute, Template};

use super::ActionContext;
use super::messages::VmStateEvent;

/// Messages of unknown or unregistered type are logged and dropped
pub fn undefined(ctx: &mut ActionContext, message: Message) {
    ctx.stats.undefined_messages += 1;
    warn!("received undefined message: {}", message.payload);
}

/// `HOST_STATE`: the payload is the new state name
#[instrument(skip_all, fields(host = message.oid))]
pub fn host_state(ctx: &mut ActionContext, message: Message) {
    debug!("received HOST_STATE message: {}", message.payload);

    let new_state = match message.payload.trim().parse::<HostState>() {
        Ok(state) => state,
        Err(_) => {
            ctx.stats.decode_failures += 1;
            warn!("unable to decode host state: {}", message.payload);
            return;
        }
    };

    let Some(mut host) = fetch_monitorable(ctx, message.oid) else {
        return;
    };

    if host.state != new_state {
        debug!("host {} changes state {} -> {}", host.name, host.state, new_state);
        host.state = new_state;
        ctx.persist(&host);
    }
}

/// `SYSTEM_HOST`: the payload is an attribute document with host information
#[instrument(skip_all, fields(host = message.oid))]
pub fn system_host(ctx: &mut ActionContext, message: Message) {
    debug!("received SYSTEM_HOST message id: {}", message.oid);

    let Some(mut host) = fetch_monitorable(ctx, message.oid) else {
        return;
    };

    let info = match Template::parse(&message.payload) {
        Ok(info) => info,
        Err(e) => {
            ctx.stats.decode_failures += 1;
            host.error(format!("Error parsing monitoring template: {e}"));
            ctx.persist(&host);
            return;
        }
    };

    host.update_info(info);
    ctx.persist(&host);

    debug!("host {} ({}) successfully monitored", host.name, host.oid());
}

/// `STATE_VM`: the payload lists VM state changes seen on a host
///
/// VM state belongs to another subsystem; the reports are logged and
/// published, nothing is mutated here.
#[instrument(skip_all, fields(host = message.oid))]
pub fn vm_state(ctx: &mut ActionContext, message: Message) {
    debug!("received STATE_VM message id: {}", message.oid);

    let report = match Template::parse(&message.payload) {
        Ok(report) => report,
        Err(e) => {
            ctx.stats.decode_failures += 1;
            error!("error parsing state vm: {e}");
            return;
        }
    };

    info!("VM states reported:\n{report}");

    for vm in report.get_all("VM").filter_map(Attribute::as_vector) {
        let Some(vm_id) = vm.get("ID").and_then(|id| id.parse::<i32>().ok()) else {
            warn!("ignoring VM state without valid ID: {vm:?}");
            continue;
        };

        let event = VmStateEvent {
            host_id: message.oid,
            vm_id,
            deploy_id: vm.get("DEPLOY_ID").cloned(),
            state: vm.get("STATE").cloned().unwrap_or_default(),
            timestamp: Utc::now(),
        };

        // no subscribers is fine
        if ctx.vm_state_tx.send(event).is_err() {
            trace!("no receivers for VM state event");
        }
    }
}

/// Lock a host that may receive monitoring information
///
/// `None` when the host is gone or offline; an offline host is unlocked
/// before returning.
fn fetch_monitorable(ctx: &mut ActionContext, oid: i32) -> Option<HostGuard> {
    let Some(host) = ctx.pool.get(oid) else {
        ctx.stats.missing_hosts += 1;
        trace!("host {oid} not found, dropping message");
        return None;
    };

    if host.state == HostState::Offline {
        ctx.stats.offline_drops += 1;
        trace!("host {oid} is offline, dropping message");
        return None;
    }

    Some(host)
}

impl ActionContext {
    /// Write a host back to the pool, logging failures
    pub(crate) fn persist(&mut self, host: &Host) {
        match self.pool.update(host) {
            Ok(()) => self.stats.pool_updates += 1,
            Err(e) => error!("failed to update host {}: {e}", host.oid()),
        }
    }
}
