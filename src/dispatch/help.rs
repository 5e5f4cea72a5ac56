//! `help <name>` auto-display, shown whenever a name was found but no
//! overload fit, or the name was never found at all.

use std::fmt::Write as _;

use crate::registry::{Registry, Resolved};

pub fn format_help(registry: &Registry, name: &str) -> String {
    match registry.lookup(name) {
        Some(Resolved::Command { set, .. }) => {
            let mut out = format!("help: {name}\n");
            for binding in set.iter() {
                let params = binding
                    .parameters
                    .iter()
                    .map(|p| format!("{}:{}", p.name, p.type_name))
                    .collect::<Vec<_>>()
                    .join(", ");
                let _ = writeln!(out, "  {name}({params}) - {}", binding.description);
            }
            out
        }
        Some(Resolved::Variable { binding, .. }) => {
            format!("help: {name}:{} - {}\n", binding.type_name, binding.description)
        }
        None => format!("help: no such command or variable '{name}'\n"),
    }
}
