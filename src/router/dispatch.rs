//! # Command dispatch loop of one worker instance.
//!
//! ```text
//! Subscription(<ns>/<id>/cmd)
//!     │ recv (delivery order)
//!     ▼
//! Command::parse ──Err──► status/error + DispatchFailed
//!     │
//! HandlerTable::get ──None──► status/error "unknown action '<a>'" + DispatchFailed
//!     │
//!     ▼
//! scope.spawn("cmd:<a>") ──► handler(call) ──Err/panic──► status/error + DispatchFailed
//! ```
//!
//! ## Rules
//! - Handler failures never escape the router; the instance stays Running.
//! - Handlers are spawned in delivery order and run concurrently with the loop.
//! - The loop ends when the instance scope is cancelled or the transport closes.

use std::sync::Arc;

use tracing::{debug, warn};

use super::{Call, Command, HandlerTable};
use crate::core::catch_panic;
use crate::error::DispatchError;
use crate::events::{Event, EventKind};
use crate::transport::{Message, Subscription};
use crate::worker::WorkerContext;

/// Routes command messages of one instance to its handlers.
#[derive(Clone)]
pub struct CommandRouter {
    ctx: WorkerContext,
    handlers: Arc<HandlerTable>,
}

impl CommandRouter {
    pub fn new(ctx: WorkerContext, handlers: Arc<HandlerTable>) -> Self {
        Self { ctx, handlers }
    }

    /// Dispatches one message.
    ///
    /// Returns once the handler has been spawned; its outcome is reported
    /// asynchronously. Every `Err` returned here has already been published
    /// on `status/error`.
    pub async fn dispatch(&self, msg: &Message) -> Result<(), DispatchError> {
        let cmd = match Command::parse(self.ctx.id(), msg) {
            Ok(cmd) => cmd,
            Err(err) => {
                self.ctx.report_dispatch(None, &err).await;
                return Err(err);
            }
        };

        let Some(handler) = self.handlers.get(&cmd.action).cloned() else {
            let err = DispatchError::UnknownAction {
                action: cmd.action.clone(),
            };
            self.ctx.report_dispatch(Some(&cmd.action), &err).await;
            return Err(err);
        };

        debug!(worker = %self.ctx.id(), action = %cmd.action, "dispatching command");
        self.ctx.bus().publish(
            Event::new(EventKind::CommandDispatched)
                .with_worker(self.ctx.id())
                .with_action(cmd.action.as_str()),
        );

        let action = cmd.action.clone();
        let call = Call {
            action: cmd.action,
            args: cmd.args,
            correlation_id: cmd.correlation_id,
            ctx: self.ctx.clone(),
        };
        let ctx = self.ctx.clone();
        self.ctx
            .scope()
            .spawn(format!("cmd:{action}"), async move {
                let failure = match catch_panic(handler(call)).await {
                    Ok(Ok(())) => return,
                    Ok(Err(err)) => DispatchError::HandlerFailed {
                        action: action.clone(),
                        error: err.to_string(),
                    },
                    Err(info) => DispatchError::HandlerPanicked {
                        action: action.clone(),
                        info,
                    },
                };
                ctx.report_dispatch(Some(&action), &failure).await;
            });
        Ok(())
    }

    /// Receives and dispatches until cancellation or end of stream.
    pub async fn run(self, mut sub: Subscription) {
        let token = self.ctx.token();
        loop {
            let msg = tokio::select! {
                _ = token.cancelled() => break,
                msg = sub.recv() => msg,
            };
            let Some(msg) = msg else {
                warn!(worker = %self.ctx.id(), "command subscription closed");
                break;
            };
            // Errors are already reported on status/error.
            let _ = self.dispatch(&msg).await;
        }
        debug!(worker = %self.ctx.id(), "command router stopped");
    }
}
