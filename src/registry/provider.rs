//! Provider descriptors
//!
//! The host-authored input surface to [`super::Registry::register_type`].
//! Hosts declare bindings in code instead of via a reflection scan.

use std::sync::Arc;

use super::binding::{Binding, ClearFn, GetFn, Parameter, SetFn};

/// One command overload as declared by a host.
pub struct CommandSpec {
    pub name: String,
    pub description: String,
    pub parameters: Vec<Parameter>,
    pub is_async: bool,
    pub handler: Arc<dyn super::binding::CommandHandler>,
}

impl CommandSpec {
    pub(crate) fn into_binding(self) -> Binding {
        Binding {
            name: self.name,
            description: self.description,
            parameters: self.parameters,
            is_async: self.is_async,
            handler: self.handler,
        }
    }
}

/// One variable as declared by a host.
pub struct VariableSpec {
    pub name: String,
    pub description: String,
    pub type_name: String,
    pub persist: bool,
    pub get: GetFn,
    pub set: Option<SetFn>,
    pub clear: Option<ClearFn>,
}

/// A single type's worth of bindings. `is_static` hoists
/// `commands`/`variables` into the process-global namespace; otherwise
/// they become instance members of `kind_name`. `is_default` marks this
/// descriptor as the canonical contributor for its kind when more than one
/// descriptor shares a `kind_name`; at most one default is allowed per
/// kind.
pub struct ProviderDescriptor {
    pub kind_name: String,
    pub is_default: bool,
    pub is_static: bool,
    pub commands: Vec<CommandSpec>,
    pub variables: Vec<VariableSpec>,
}

impl ProviderDescriptor {
    pub fn new(kind_name: impl Into<String>) -> Self {
        Self {
            kind_name: kind_name.into(),
            is_default: false,
            is_static: false,
            commands: Vec::new(),
            variables: Vec::new(),
        }
    }

    pub fn is_default(mut self, value: bool) -> Self {
        self.is_default = value;
        self
    }

    pub fn is_static(mut self, value: bool) -> Self {
        self.is_static = value;
        self
    }

    pub fn with_command(mut self, command: CommandSpec) -> Self {
        self.commands.push(command);
        self
    }

    pub fn with_variable(mut self, variable: VariableSpec) -> Self {
        self.variables.push(variable);
        self
    }
}
