//! Core of an interactive administrative terminal embedded in long-running
//! host processes: a binding registry, a command-line parser/dispatcher, an
//! input editor with history, and lock-free statistics/profiler engines.
//! Hosts embed this crate, supply an [`terminal::ITerminal`] sink, and
//! register their own commands and variables through
//! [`registry::provider::ProviderDescriptor`].

pub mod convert;
pub mod dispatch;
pub mod editor;
pub mod error;
pub mod parser;
pub mod persistence;
pub mod registry;
pub mod stats;
pub mod terminal;

pub use dispatch::Dispatcher;
pub use error::{DispatchError, RegistryError};
pub use registry::Registry;
pub use terminal::{ITerminal, Severity};

/// Host-tunable knobs that don't belong to any one module: history
/// capacity, the statistics/profiler interval set, and whether a debugger
/// is attached (the debugger-mode flag starts here before being handed to
/// the [`Dispatcher`]).
#[derive(Debug, Clone)]
pub struct TerminalOptions {
    pub history_capacity: usize,
    pub intervals: Vec<(String, std::time::Duration)>,
    pub debugger_attached: bool,
}

impl Default for TerminalOptions {
    fn default() -> Self {
        Self {
            history_capacity: 4096,
            intervals: vec![
                ("1m".into(), std::time::Duration::from_secs(60)),
                ("5m".into(), std::time::Duration::from_secs(5 * 60)),
                ("15m".into(), std::time::Duration::from_secs(15 * 60)),
            ],
            debugger_attached: false,
        }
    }
}

impl TerminalOptions {
    pub fn interval_specs(&self) -> Vec<stats::IntervalSpec> {
        self.intervals.iter().map(|(label, duration)| stats::IntervalSpec::new(label.clone(), *duration)).collect()
    }
}
