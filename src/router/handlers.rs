//! # Explicit action → handler registration.
//!
//! A worker builds its [`HandlerTable`] once, at construction, by naming each
//! action it serves. Nothing is discovered by reflection.
//!
//! ## Example
//! ```rust
//! use std::sync::Arc;
//! use propvisor::{Call, HandlerError, HandlerTable};
//!
//! struct Fog;
//!
//! impl Fog {
//!     async fn burst(self: Arc<Self>, call: Call) -> Result<(), HandlerError> {
//!         call.ctx.telemetry("burst", call.arg_str().unwrap_or("1")).await;
//!         Ok(())
//!     }
//! }
//!
//! let fog = Arc::new(Fog);
//! let table = HandlerTable::bound(&fog).on("burst", Fog::burst).build();
//! assert!(table.contains("burst"));
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures::FutureExt;
use futures::future::BoxFuture;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::HandlerError;
use crate::worker::WorkerContext;

/// One dispatched command as seen by its handler.
#[derive(Clone)]
pub struct Call {
    pub action: String,
    pub args: Option<Value>,
    pub correlation_id: Option<Value>,
    pub ctx: WorkerContext,
}

impl Call {
    /// The argument as a string slice, if it is a JSON string.
    pub fn arg_str(&self) -> Option<&str> {
        self.args.as_ref().and_then(Value::as_str)
    }

    /// The argument as an unsigned integer; numeric strings are accepted.
    pub fn arg_u64(&self) -> Option<u64> {
        match self.args.as_ref()? {
            Value::Number(n) => n.as_u64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Deserializes the argument; `Ok(None)` when there is none.
    pub fn arg<T: DeserializeOwned>(&self) -> Result<Option<T>, HandlerError> {
        self.args
            .clone()
            .map(serde_json::from_value)
            .transpose()
            .map_err(|e| HandlerError::invalid_argument(e.to_string()))
    }
}

impl fmt::Debug for Call {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Call")
            .field("worker", &self.ctx.id())
            .field("action", &self.action)
            .field("args", &self.args)
            .field("correlation_id", &self.correlation_id)
            .finish()
    }
}

/// Type-erased handler.
pub type Handler = Arc<dyn Fn(Call) -> BoxFuture<'static, Result<(), HandlerError>> + Send + Sync>;

/// Immutable action → handler map.
#[derive(Clone, Default)]
pub struct HandlerTable {
    handlers: BTreeMap<String, Handler>,
}

impl HandlerTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts a table whose handlers are methods of `target`.
    pub fn bound<W>(target: &Arc<W>) -> Bound<W>
    where
        W: Send + Sync + 'static,
    {
        Bound {
            target: Arc::clone(target),
            table: HandlerTable::new(),
        }
    }

    /// Registers a free-standing handler. A later registration of the same
    /// action replaces the earlier one.
    #[must_use]
    pub fn on<F, Fut>(mut self, action: &str, f: F) -> Self
    where
        F: Fn(Call) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), HandlerError>> + Send + 'static,
    {
        let handler: Handler = Arc::new(move |call: Call| f(call).boxed());
        self.handlers.insert(action.to_owned(), handler);
        self
    }

    pub fn get(&self, action: &str) -> Option<&Handler> {
        self.handlers.get(action)
    }

    pub fn contains(&self, action: &str) -> bool {
        self.handlers.contains_key(action)
    }

    /// Registered actions in sorted order.
    pub fn actions(&self) -> impl Iterator<Item = &str> {
        self.handlers.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl fmt::Debug for HandlerTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.actions()).finish()
    }
}

/// Builder binding handlers to a shared worker object.
pub struct Bound<W> {
    target: Arc<W>,
    table: HandlerTable,
}

impl<W> Bound<W>
where
    W: Send + Sync + 'static,
{
    /// Registers `f(target, call)` for `action`.
    #[must_use]
    pub fn on<F, Fut>(mut self, action: &str, f: F) -> Self
    where
        F: Fn(Arc<W>, Call) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), HandlerError>> + Send + 'static,
    {
        let target = Arc::clone(&self.target);
        self.table = self.table.on(action, move |call| f(Arc::clone(&target), call));
        self
    }

    pub fn build(self) -> HandlerTable {
        self.table
    }
}

impl<W> From<Bound<W>> for HandlerTable {
    fn from(bound: Bound<W>) -> Self {
        bound.table
    }
}
