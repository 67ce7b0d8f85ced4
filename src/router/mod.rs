//! # Command routing.
//!
//! - [`Command`] parsed command (text or JSON payload)
//! - [`HandlerTable`] explicit action → handler map built at construction
//! - [`Call`] what a handler receives
//! - [`CommandRouter`] per-instance dispatch loop with failure isolation

mod command;
mod dispatch;
mod handlers;

pub use command::Command;
pub use dispatch::CommandRouter;
pub use handlers::{Bound, Call, Handler, HandlerTable};
