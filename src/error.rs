//! Error taxonomy
//!
//! Error *kinds* for the terminal core, not exception types: every failure
//! the dispatcher can produce maps to exactly one variant here, each with
//! its own logging severity and recovery policy.

use thiserror::Error;

/// Failures that can occur while resolving and invoking one command line.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DispatchError {
    #[error("unknown command or variable '{0}'")]
    UnknownName(String),

    #[error("no overload of '{name}' accepts {given} argument(s)")]
    BadArity { name: String, given: usize },

    #[error("cannot convert '{argument}' to {expected_type} for '{name}'")]
    ConversionFailed {
        name: String,
        argument: String,
        expected_type: String,
    },

    #[error("'{name}' failed: {message}")]
    InvocationFailed { name: String, message: String },

    #[error("'{name}' was cancelled")]
    Cancelled { name: String },

    #[error("instance for kind '{kind}' has expired")]
    InstanceExpired { kind: String, instance_name: Option<String> },

    #[error("variable '{0}' is read-only")]
    ReadOnlyVariable(String),
}

impl DispatchError {
    /// Severity this kind should be logged at.
    pub fn severity(&self) -> crate::terminal::Severity {
        use crate::terminal::Severity;
        match self {
            DispatchError::ConversionFailed { .. } => Severity::Debug,
            DispatchError::UnknownName(_) | DispatchError::BadArity { .. } => Severity::Warning,
            DispatchError::Cancelled { .. } => Severity::Warning,
            DispatchError::InvocationFailed { .. }
            | DispatchError::InstanceExpired { .. }
            | DispatchError::ReadOnlyVariable(_) => Severity::Error,
        }
    }

    /// Whether the dispatcher should auto-display `help <name>` for this failure.
    pub fn wants_help(&self) -> bool {
        matches!(self, DispatchError::UnknownName(_) | DispatchError::BadArity { .. })
    }
}

/// Failures that can occur while registering a provider descriptor.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("duplicate static variable '{0}'")]
    DuplicateStaticVariable(String),

    #[error("kind '{0}' already has a default type registered")]
    DuplicateDefaultType(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conversion_failed_recovers_silently() {
        let err = DispatchError::ConversionFailed {
            name: "MaxSize".into(),
            argument: "abc".into(),
            expected_type: "int32".into(),
        };
        assert_eq!(err.severity(), crate::terminal::Severity::Debug);
        assert!(!err.wants_help());
    }

    #[test]
    fn unknown_name_wants_help() {
        let err = DispatchError::UnknownName("frobnicate".into());
        assert!(err.wants_help());
        assert_eq!(err.severity(), crate::terminal::Severity::Warning);
    }
}
