//! # Which discovered workers are admitted.
//!
//! Precedence, first match decides:
//!
//! ```text
//! disable_all          → nobody
//! allow non-empty      → only listed ids
//! disable non-empty    → everyone except listed ids
//! otherwise            → everyone
//! ```
//!
//! The disable list is only consulted when the allow list is empty, so an id
//! present in both is admitted.

use std::collections::BTreeSet;

/// Allow/disable filtering applied before instances are built.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct WorkerFilter {
    pub disable_all: bool,
    pub allow: BTreeSet<String>,
    pub disable: BTreeSet<String>,
}

impl WorkerFilter {
    /// Admits everyone.
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn disable_all(mut self, on: bool) -> Self {
        self.disable_all = on;
        self
    }

    #[must_use]
    pub fn allow<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allow.extend(ids.into_iter().map(Into::into));
        self
    }

    #[must_use]
    pub fn disable<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.disable.extend(ids.into_iter().map(Into::into));
        self
    }

    pub fn admits(&self, id: &str) -> bool {
        self.exclusion(id).is_none()
    }

    /// Why `id` is excluded, or `None` when admitted.
    pub fn exclusion(&self, id: &str) -> Option<&'static str> {
        if self.disable_all {
            Some("all workers disabled")
        } else if !self.allow.is_empty() {
            (!self.allow.contains(id)).then_some("not in allow list")
        } else if self.disable.contains(id) {
            Some("in disable list")
        } else {
            None
        }
    }

    /// Splits a comma separated id list, ignoring blanks.
    pub fn parse_list(raw: &str) -> BTreeSet<String> {
        raw.split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_owned)
            .collect()
    }
}
