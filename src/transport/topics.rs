//! Canonical topic grammar.
//!
//! ```text
//! <ns>/<id>/cmd                    in   commands
//! <ns>/<id>/state                  out  retained current state
//! <ns>/<id>/status/<key>           out  human-readable status (incl. `error`)
//! <ns>/<id>/telemetry/<key>        out  observational values
//! <ns>/<id>/status/availability    out  retained online/offline
//! <ns>/worker_host/uptime          out  host uptime seconds
//! <ns>/worker_host/availability    out  retained host online/offline
//! ```

use std::sync::Arc;

/// Identifier used for the host's own topics.
pub const HOST_ID: &str = "worker_host";

/// Topic builder for one identifier.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Topics {
    namespace: Arc<str>,
    id: Arc<str>,
}

impl Topics {
    pub fn new(namespace: impl Into<Arc<str>>, id: impl Into<Arc<str>>) -> Self {
        Self {
            namespace: namespace.into(),
            id: id.into(),
        }
    }

    /// Topics of the host itself.
    pub fn host(namespace: impl Into<Arc<str>>) -> Self {
        Self::new(namespace, HOST_ID)
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Same namespace, another identifier.
    pub fn sibling(&self, id: &str) -> Topics {
        Topics::new(Arc::clone(&self.namespace), id)
    }

    pub fn cmd(&self) -> String {
        format!("{}/{}/cmd", self.namespace, self.id)
    }

    pub fn state(&self) -> String {
        format!("{}/{}/state", self.namespace, self.id)
    }

    pub fn status(&self, key: &str) -> String {
        format!("{}/{}/status/{key}", self.namespace, self.id)
    }

    pub fn telemetry(&self, key: &str) -> String {
        format!("{}/{}/telemetry/{key}", self.namespace, self.id)
    }

    pub fn availability(&self) -> String {
        self.status("availability")
    }

    /// `<ns>/worker_host/uptime`
    pub fn host_uptime(namespace: &str) -> String {
        format!("{namespace}/{HOST_ID}/uptime")
    }

    /// `<ns>/worker_host/availability` (the connection-level last-will topic).
    pub fn host_availability(namespace: &str) -> String {
        format!("{namespace}/{HOST_ID}/availability")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derives_canonical_topics() {
        let t = Topics::new("halloween", "coffin_jumper");
        assert_eq!(t.cmd(), "halloween/coffin_jumper/cmd");
        assert_eq!(t.state(), "halloween/coffin_jumper/state");
        assert_eq!(t.status("error"), "halloween/coffin_jumper/status/error");
        assert_eq!(t.telemetry("tick"), "halloween/coffin_jumper/telemetry/tick");
        assert_eq!(
            t.availability(),
            "halloween/coffin_jumper/status/availability"
        );
    }

    #[test]
    fn sibling_keeps_namespace() {
        let t = Topics::new("ns", "a").sibling("b");
        assert_eq!(t.cmd(), "ns/b/cmd");
    }

    #[test]
    fn host_topics() {
        assert_eq!(Topics::host_uptime("halloween"), "halloween/worker_host/uptime");
        assert_eq!(
            Topics::host_availability("halloween"),
            "halloween/worker_host/availability"
        );
        assert_eq!(Topics::host("h").status("warn"), "h/worker_host/status/warn");
    }
}
