//! Render lifecycle tracking.

use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Lifecycle phases of a server render.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderPhase {
    /// Render started, app instance created.
    Start,
    /// Router resolved the requested path.
    RouteResolved,
    /// All registered prefetch tasks resolved.
    PrefetchDone,
    /// UI rendered to a string.
    Rendered,
    /// Store state and head tags written to the context.
    Serialized,
    /// The render failed.
    Error(String),
}

impl RenderPhase {
    /// Mark name used in the timing context.
    pub fn mark_name(&self) -> &str {
        match self {
            Self::Start => "start",
            Self::RouteResolved => "route_resolved",
            Self::PrefetchDone => "prefetch_done",
            Self::Rendered => "rendered",
            Self::Serialized => "serialized",
            Self::Error(_) => "error",
        }
    }
}

/// Timing context for one render.
#[derive(Debug, Clone)]
pub struct TimingContext {
    start: Instant,
    marks: HashMap<String, Instant>,
}

impl TimingContext {
    /// Create a new timing context.
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
            marks: HashMap::new(),
        }
    }

    /// Record a timing mark.
    pub fn mark(&mut self, name: &str) {
        self.marks.insert(name.to_string(), Instant::now());
    }

    /// Record that a phase was reached.
    pub fn enter(&mut self, phase: &RenderPhase) {
        self.mark(phase.mark_name());
    }

    /// Get elapsed time since start.
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Time from start to a named mark.
    pub fn since_start(&self, name: &str) -> Option<Duration> {
        self.marks.get(name).map(|t| t.duration_since(self.start))
    }

    /// Time spent waiting on prefetch tasks.
    pub fn prefetch_time(&self) -> Option<Duration> {
        let resolved = self.marks.get(RenderPhase::RouteResolved.mark_name())?;
        let done = self.marks.get(RenderPhase::PrefetchDone.mark_name())?;
        Some(done.duration_since(*resolved))
    }
}

impl Default for TimingContext {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timing_marks_phases() {
        let mut timing = TimingContext::new();
        timing.enter(&RenderPhase::RouteResolved);
        timing.enter(&RenderPhase::PrefetchDone);

        assert!(timing.since_start("route_resolved").is_some());
        assert!(timing.prefetch_time().is_some());
        assert!(timing.since_start("rendered").is_none());
    }

    #[test]
    fn test_prefetch_time_requires_both_marks() {
        let mut timing = TimingContext::new();
        timing.enter(&RenderPhase::PrefetchDone);
        assert!(timing.prefetch_time().is_none());
    }

    #[test]
    fn test_error_phase_mark_name() {
        assert_eq!(RenderPhase::Error("boom".into()).mark_name(), "error");
    }
}
