//! The `ITerminal` logging port
//!
//! The dispatcher never writes to stdout/stderr/tracing directly for
//! operator-facing output; it calls a host-supplied `ITerminal`. Hosts
//! implement this trait over whatever sink they like (file, remote,
//! colorized console).

use std::fmt;

/// Log severities, ordered from most to least urgent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Severity {
    Critical,
    Error,
    Warning,
    Milestone,
    Info,
    Debug,
    Verbose,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Severity::Critical => "critical",
            Severity::Error => "error",
            Severity::Warning => "warning",
            Severity::Milestone => "milestone",
            Severity::Info => "info",
            Severity::Debug => "debug",
            Severity::Verbose => "verbose",
        };
        f.write_str(s)
    }
}

/// Opaque handle returned by `begin_section`; consumers pair it with the
/// matching `end_section` call. Sections may nest arbitrarily but must be
/// balanced by the caller — the port itself does not enforce nesting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SectionHandle(pub u64);

/// The logging capability the dispatcher consumes.
pub trait ITerminal: Send + Sync {
    fn log(&self, severity: Severity, message: &str);

    fn begin_section(&self, title: &str) -> SectionHandle;

    fn end_section(&self, handle: SectionHandle);

    fn log_error(&self, message: &str, error: &dyn std::error::Error);

    fn flush(&self);
}

/// An `ITerminal` that forwards everything to `tracing`, for hosts that
/// don't need a dedicated sink. This is sample glue, not the one true
/// implementation — any host can supply its own.
#[derive(Debug, Default)]
pub struct TracingTerminal {
    next_section: std::sync::atomic::AtomicU64,
}

impl TracingTerminal {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ITerminal for TracingTerminal {
    fn log(&self, severity: Severity, message: &str) {
        match severity {
            Severity::Critical | Severity::Error => tracing::error!("{message}"),
            Severity::Warning => tracing::warn!("{message}"),
            Severity::Milestone | Severity::Info => tracing::info!("{message}"),
            Severity::Debug => tracing::debug!("{message}"),
            Severity::Verbose => tracing::trace!("{message}"),
        }
    }

    fn begin_section(&self, title: &str) -> SectionHandle {
        let id = self
            .next_section
            .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        tracing::info!(section = id, "begin: {title}");
        SectionHandle(id)
    }

    fn end_section(&self, handle: SectionHandle) {
        tracing::info!(section = handle.0, "end");
    }

    fn log_error(&self, message: &str, error: &dyn std::error::Error) {
        tracing::error!("{message}: {error}");
    }

    fn flush(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sections_hand_out_distinct_ids() {
        let term = TracingTerminal::new();
        let a = term.begin_section("outer");
        let b = term.begin_section("inner");
        assert_ne!(a, b);
        term.end_section(b);
        term.end_section(a);
    }

    #[test]
    fn severity_orders_critical_first() {
        assert!(Severity::Critical < Severity::Verbose);
    }
}
