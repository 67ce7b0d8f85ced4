//! Error types used by the worker host runtime, transports and workers.
//!
//! Each component owns one enum:
//!
//! - [`RuntimeError`]: failures of the host itself (fatal startup, grace exceeded).
//! - [`DiscoveryError`]: a worker candidate could not be loaded; only that candidate is skipped.
//! - [`ConfigError`]: a worker configuration could not be used; the worker runs with an empty config.
//! - [`DispatchError`]: a command could not be dispatched; reported on `status/error`.
//! - [`TransportError`]: broker communication failures.
//! - [`RegistryError`]: registry invariants (unique identifiers).
//! - [`WorkerError`], [`HandlerError`], [`TaskError`]: raised by worker-authored code.
//!
//! All types provide `as_label` for logs/metrics.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// # Errors produced by the host runtime.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// Shutdown grace period was exceeded; the listed tasks were abandoned.
    #[error("shutdown timeout {grace:?} exceeded; abandoned: {stuck:?}")]
    GraceExceeded {
        /// The configured grace duration.
        grace: Duration,
        /// `worker/task` names that did not stop in time.
        stuck: Vec<String>,
    },

    /// Unrecoverable startup resource failure; the process should exit non-zero.
    #[error("fatal host error: {reason}")]
    Fatal {
        /// What could not be set up.
        reason: String,
    },
}

impl RuntimeError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use propvisor::RuntimeError;
    /// use std::time::Duration;
    ///
    /// let err = RuntimeError::GraceExceeded { grace: Duration::from_secs(5), stuck: vec![] };
    /// assert_eq!(err.as_label(), "runtime_grace_exceeded");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            RuntimeError::GraceExceeded { .. } => "runtime_grace_exceeded",
            RuntimeError::Fatal { .. } => "runtime_fatal",
        }
    }

    /// True for errors the process cannot continue after.
    pub fn is_fatal(&self) -> bool {
        matches!(self, RuntimeError::Fatal { .. })
    }
}

/// # A worker candidate that could not be loaded.
///
/// Discovery never aborts on these; the candidate is skipped and the error
/// recorded in the [`LoadReport`](crate::LoadReport).
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum DiscoveryError {
    /// The manifest file exists but could not be read.
    #[error("cannot read manifest {path}: {source}")]
    ManifestUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The manifest is not valid JSON or misses required fields.
    #[error("invalid manifest {path}: {reason}")]
    ManifestInvalid { path: PathBuf, reason: String },

    /// The manifest names a worker kind the catalog does not provide.
    #[error("{path}: no worker implementation registered for kind '{kind}'")]
    UnknownKind { path: PathBuf, kind: String },

    /// The identifier cannot be used as a topic segment.
    #[error("{path}: invalid worker id '{id}': {reason}")]
    InvalidIdentifier {
        path: PathBuf,
        id: String,
        reason: &'static str,
    },

    /// Another candidate already claimed this identifier (first discovered wins).
    #[error("duplicate worker id '{id}': {rejected} ignored, already provided by {first}")]
    Duplicate {
        id: String,
        first: PathBuf,
        rejected: PathBuf,
    },

    /// The factory refused to construct the worker.
    #[error("worker '{id}' could not be constructed: {source}")]
    Construct {
        id: String,
        #[source]
        source: WorkerError,
    },
}

impl DiscoveryError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            DiscoveryError::ManifestUnreadable { .. } => "discovery_manifest_unreadable",
            DiscoveryError::ManifestInvalid { .. } => "discovery_manifest_invalid",
            DiscoveryError::UnknownKind { .. } => "discovery_unknown_kind",
            DiscoveryError::InvalidIdentifier { .. } => "discovery_invalid_id",
            DiscoveryError::Duplicate { .. } => "discovery_duplicate_id",
            DiscoveryError::Construct { .. } => "discovery_construct_failed",
        }
    }
}

/// # A worker configuration that could not be used.
///
/// The policy is lenient: the worker proceeds with an empty configuration.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot parse {path} as {format}: {reason}")]
    Parse {
        path: PathBuf,
        format: &'static str,
        reason: String,
    },

    #[error("{path}: top level must be a mapping")]
    NotAMapping { path: PathBuf },

    #[error("schema validation failed: {reason}")]
    Schema { reason: String },
}

impl ConfigError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            ConfigError::Read { .. } => "config_read",
            ConfigError::Parse { .. } => "config_parse",
            ConfigError::NotAMapping { .. } => "config_not_a_mapping",
            ConfigError::Schema { .. } => "config_schema",
        }
    }
}

/// # A command that could not be dispatched.
///
/// Never propagates past the router; published as `status/error`.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DispatchError {
    #[error("empty command payload")]
    EmptyPayload,

    #[error("invalid command payload: {reason}")]
    InvalidPayload { reason: String },

    #[error("unknown action '{action}'")]
    UnknownAction { action: String },

    #[error("action '{action}' failed: {error}")]
    HandlerFailed { action: String, error: String },

    #[error("action '{action}' panicked: {info}")]
    HandlerPanicked { action: String, info: String },
}

impl DispatchError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            DispatchError::EmptyPayload => "dispatch_empty_payload",
            DispatchError::InvalidPayload { .. } => "dispatch_invalid_payload",
            DispatchError::UnknownAction { .. } => "dispatch_unknown_action",
            DispatchError::HandlerFailed { .. } => "dispatch_handler_failed",
            DispatchError::HandlerPanicked { .. } => "dispatch_handler_panicked",
        }
    }
}

/// # Broker communication failures.
#[non_exhaustive]
#[derive(Error, Debug, Clone)]
pub enum TransportError {
    #[error("invalid transport options: {reason}")]
    Options { reason: String },

    #[error("publish to '{topic}' failed: {reason}")]
    Publish { topic: String, reason: String },

    #[error("subscribe to '{filter}' failed: {reason}")]
    Subscribe { filter: String, reason: String },

    #[error("publish to '{topic}' timed out after {timeout:?}")]
    Timeout { topic: String, timeout: Duration },

    #[error("transport is closed")]
    Closed,
}

impl TransportError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            TransportError::Options { .. } => "transport_options",
            TransportError::Publish { .. } => "transport_publish",
            TransportError::Subscribe { .. } => "transport_subscribe",
            TransportError::Timeout { .. } => "transport_timeout",
            TransportError::Closed => "transport_closed",
        }
    }
}

/// # Registry invariant violations.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("worker '{id}' is already registered")]
    AlreadyRegistered { id: String },
}

/// # Errors raised by a worker while being constructed or started.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("construction failed: {reason}")]
    Build { reason: String },

    #[error("start failed: {reason}")]
    Start { reason: String },

    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl WorkerError {
    /// Convenience constructor for start failures.
    pub fn start(reason: impl Into<String>) -> Self {
        WorkerError::Start {
            reason: reason.into(),
        }
    }

    /// Convenience constructor for construction failures.
    pub fn build(reason: impl Into<String>) -> Self {
        WorkerError::Build {
            reason: reason.into(),
        }
    }
}

/// # Errors returned by command handlers.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum HandlerError {
    #[error("invalid argument: {reason}")]
    InvalidArgument { reason: String },

    #[error("{error}")]
    Fail { error: String },

    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl HandlerError {
    /// Convenience constructor for generic failures.
    pub fn fail(error: impl Into<String>) -> Self {
        HandlerError::Fail {
            error: error.into(),
        }
    }

    /// Convenience constructor for bad arguments.
    pub fn invalid_argument(reason: impl Into<String>) -> Self {
        HandlerError::InvalidArgument {
            reason: reason.into(),
        }
    }
}

/// # Errors produced by tracked background tasks.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum TaskError {
    /// Non-recoverable error; the task ends and the failure is reported.
    #[error("fatal error: {error}")]
    Fatal {
        /// The underlying error message.
        error: String,
    },

    /// Task execution failed.
    #[error("execution failed: {error}")]
    Fail {
        /// The underlying error message.
        error: String,
    },

    /// Task observed cancellation and unwound.
    #[error("context cancelled")]
    Canceled,
}

impl TaskError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use propvisor::TaskError;
    ///
    /// let err = TaskError::Fail { error: "boom".into() };
    /// assert_eq!(err.as_label(), "task_failed");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            TaskError::Fatal { .. } => "task_fatal",
            TaskError::Fail { .. } => "task_failed",
            TaskError::Canceled => "task_canceled",
        }
    }

    /// True when the task ended because it was asked to.
    pub fn is_canceled(&self) -> bool {
        matches!(self, TaskError::Canceled)
    }
}
