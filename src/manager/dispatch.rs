//! Message type → handler table

use std::collections::HashMap;

use tracing::{trace, warn};

use crate::message::{Message, MessageType};

use super::ActionContext;

/// Handler for one message type
///
/// Runs on the control loop, one at a time, and must not block.
pub type ActionHandler = fn(&mut ActionContext, Message);

#[derive(Default)]
pub struct DispatchTable {
    handlers: HashMap<MessageType, ActionHandler>,
}

impl DispatchTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `handler` to `message_type`
    ///
    /// A later registration for the same type replaces the earlier one; the
    /// replaced handler is returned.
    pub fn register(
        &mut self,
        message_type: MessageType,
        handler: ActionHandler,
    ) -> Option<ActionHandler> {
        self.handlers.insert(message_type, handler)
    }

    /// Run the handler for the message type
    ///
    /// Types without a handler go to the `Undefined` handler.
    pub fn dispatch(&self, ctx: &mut ActionContext, message: Message) {
        let handler = self
            .handlers
            .get(&message.message_type)
            .or_else(|| self.handlers.get(&MessageType::Undefined));

        ctx.stats.messages_dispatched += 1;

        match handler {
            Some(handler) => {
                trace!("dispatching {} message for {}", message.message_type, message.oid);
                handler(ctx, message);
            }
            None => warn!("no handler for {} message, dropping it", message.message_type),
        }
    }
}
