//! Pipeline configuration loaded from the environment.

/// Default bound on domain events published by one propagation pass.
pub const DEFAULT_MAX_CASCADE_EVENTS: usize = 1_000;

/// Default bound on nested dispatches within one request scope.
pub const DEFAULT_MAX_DISPATCH_DEPTH: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineConfig {
    /// Events one propagation pass may publish before it gives up on a
    /// runaway cascade.
    pub max_cascade_events: usize,
    /// In-flight dispatches allowed in one scope before a nested dispatch is
    /// refused.
    pub max_dispatch_depth: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_cascade_events: DEFAULT_MAX_CASCADE_EVENTS,
            max_dispatch_depth: DEFAULT_MAX_DISPATCH_DEPTH,
        }
    }
}

impl PipelineConfig {
    /// Read `KEYSTONE_MAX_CASCADE_EVENTS` and `KEYSTONE_MAX_DISPATCH_DEPTH`.
    ///
    /// Missing or invalid values fall back to the defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Like `from_env`, reading variables through `lookup`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            max_cascade_events: read_limit(
                &lookup,
                "KEYSTONE_MAX_CASCADE_EVENTS",
                defaults.max_cascade_events,
            ),
            max_dispatch_depth: read_limit(
                &lookup,
                "KEYSTONE_MAX_DISPATCH_DEPTH",
                defaults.max_dispatch_depth,
            ),
        }
    }

    pub fn with_max_cascade_events(mut self, limit: usize) -> Self {
        self.max_cascade_events = limit;
        self
    }

    pub fn with_max_dispatch_depth(mut self, limit: usize) -> Self {
        self.max_dispatch_depth = limit;
        self
    }
}

fn read_limit(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: usize) -> usize {
    let Some(raw) = lookup(key) else {
        return default;
    };
    match raw.trim().parse::<usize>() {
        Ok(limit) if limit > 0 => limit,
        _ => {
            tracing::warn!(%key, value = %raw, default, "ignoring invalid pipeline limit");
            default
        }
    }
}
