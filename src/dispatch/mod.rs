//! Command-line parser and dispatcher
//!
//! Resolves one typed-in line to a binding, converts its arguments, and
//! invokes the matching overload. The dispatcher runs on the caller's
//! thread; it only suspends inside an async command body.

mod help;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::convert::ConverterRegistry;
use crate::error::DispatchError;
use crate::registry::binding::{Binding, BindingSet, Value};
use crate::registry::{Registry, Resolved};
use crate::terminal::ITerminal;

/// Per-line state machine: `Idle -> Parsing -> Resolving ->
/// {Converting -> Invoking}* -> {Completed | Failed} -> Idle`. Re-entrant
/// only between lines; sequential within one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchState {
    Idle,
    Parsing,
    Resolving,
    Converting,
    Invoking,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Delimiter {
    Equals,
    Space,
    None,
}

fn split_name_and_remainder(line: &str) -> (Delimiter, &str, &str) {
    let eq_pos = line.find('=');
    let space_pos = line.find(' ');
    let use_eq = match (eq_pos, space_pos) {
        (Some(e), Some(s)) => e < s && e > 0,
        (Some(e), None) => e > 0,
        _ => false,
    };
    if use_eq {
        let e = eq_pos.unwrap();
        (Delimiter::Equals, &line[..e], &line[e + 1..])
    } else if let Some(s) = space_pos {
        (Delimiter::Space, &line[..s], &line[s + 1..])
    } else {
        (Delimiter::None, line, "")
    }
}

fn try_convert_all(converters: &ConverterRegistry, binding: &Binding, tokens: &[String]) -> Option<Vec<Value>> {
    let mut values = Vec::with_capacity(tokens.len());
    for (param, token) in binding.parameters.iter().zip(tokens) {
        values.push(converters.convert(&param.type_name, token)?);
    }
    Some(values)
}

/// Overload-resolution algorithm: exact-arity match first, trying each
/// overload in declaration order, falling back to a single-parameter
/// overload fed the whole remainder as one argument. Conversion
/// failures on non-selected overloads are silent (retried, never
/// surfaced) — only the final "nothing matched" case becomes a reported
/// error, at the call site.
fn select_overload(converters: &ConverterRegistry, set: &BindingSet, remainder: &str) -> Option<(Binding, Vec<Value>)> {
    if remainder.is_empty() {
        if let Some(binding) = set.iter().find(|b| b.arity() == 0) {
            return Some((binding.clone(), Vec::new()));
        }
    }

    let tokens = crate::parser::tokenize(remainder);
    for binding in set.iter() {
        if binding.arity() != tokens.len() {
            continue;
        }
        if let Some(values) = try_convert_all(converters, binding, &tokens) {
            return Some((binding.clone(), values));
        }
    }

    if !remainder.is_empty() {
        for binding in set.iter() {
            if binding.arity() != 1 {
                continue;
            }
            if let Some(value) = converters.convert(&binding.parameters[0].type_name, remainder) {
                return Some((binding.clone(), vec![value]));
            }
        }
    }

    None
}

/// Resolves and invokes command lines against a [`Registry`].
pub struct Dispatcher {
    registry: Arc<Registry>,
    converters: Arc<ConverterRegistry>,
    /// When set, `InvocationFailed` propagates to the caller instead of
    /// being caught, logged, and turned into a `help` display.
    pub debugger_attached: AtomicBool,
}

impl Dispatcher {
    pub fn new(registry: Arc<Registry>, converters: Arc<ConverterRegistry>) -> Self {
        Self { registry, converters, debugger_attached: AtomicBool::new(false) }
    }

    /// Dispatch one typed-in line. Returns `Ok(())` on success; on
    /// failure, the error-handling policy has already been applied (the
    /// error logged at its severity, and `help <name>` auto-displayed when
    /// warranted) *unless* `debugger_attached` is set and the failure is
    /// `InvocationFailed`, in which case neither happens and the error is
    /// simply returned for the host to handle.
    pub async fn dispatch_line(
        &self,
        line: &str,
        terminal: &dyn ITerminal,
        cancel: CancellationToken,
    ) -> Result<(), DispatchError> {
        let trimmed = line.trim_start();
        if trimmed.is_empty() {
            return Ok(());
        }

        let (delimiter, name, remainder) = split_name_and_remainder(trimmed);

        let result = match delimiter {
            Delimiter::Equals => self.dispatch_assignment(name, remainder, terminal),
            Delimiter::Space | Delimiter::None => self.dispatch_command_or_read(name, remainder, terminal, cancel).await,
        };

        if let Err(err) = &result {
            self.report(err, name, terminal);
        }
        result
    }

    fn dispatch_assignment(&self, name: &str, remainder: &str, terminal: &dyn ITerminal) -> Result<(), DispatchError> {
        match self.registry.lookup(name) {
            Some(Resolved::Variable { binding, receiver }) => {
                let receiver = receiver.resolve()?;
                let Some(value) = self.converters.convert(&binding.type_name, remainder) else {
                    return Err(DispatchError::ConversionFailed {
                        name: name.to_string(),
                        argument: remainder.to_string(),
                        expected_type: binding.type_name.clone(),
                    });
                };
                let Some(setter) = &binding.set else {
                    return Err(DispatchError::ReadOnlyVariable(name.to_string()));
                };
                setter(receiver, value).map_err(|message| DispatchError::InvocationFailed {
                    name: name.to_string(),
                    message,
                })?;
                terminal.log(crate::terminal::Severity::Info, &format!("{name} set"));
                Ok(())
            }
            _ => Err(DispatchError::UnknownName(name.to_string())),
        }
    }

    async fn dispatch_command_or_read(
        &self,
        name: &str,
        remainder: &str,
        terminal: &dyn ITerminal,
        cancel: CancellationToken,
    ) -> Result<(), DispatchError> {
        match self.registry.lookup(name) {
            Some(Resolved::Command { set, receiver }) => {
                let receiver = receiver.resolve()?;
                let Some((binding, args)) = select_overload(&self.converters, &set, remainder) else {
                    return Err(DispatchError::BadArity { name: name.to_string(), given: crate::parser::tokenize(remainder).len() });
                };
                if cancel.is_cancelled() {
                    return Err(DispatchError::Cancelled { name: name.to_string() });
                }
                let invocation = binding.handler.invoke(receiver, &args, cancel.clone());
                let outcome = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => Err(DispatchError::Cancelled { name: name.to_string() }),
                    result = invocation => result.map_err(|message| DispatchError::InvocationFailed { name: name.to_string(), message }),
                };
                outcome
            }
            Some(Resolved::Variable { binding, receiver }) => {
                let receiver = receiver.resolve()?;
                let value = (binding.get)(receiver);
                terminal.log(crate::terminal::Severity::Info, &value.to_string());
                Ok(())
            }
            None => Err(DispatchError::UnknownName(name.to_string())),
        }
    }

    fn report(&self, err: &DispatchError, name: &str, terminal: &dyn ITerminal) {
        let propagate_uncaught = self.debugger_attached.load(Ordering::Relaxed)
            && matches!(err, DispatchError::InvocationFailed { .. });
        if propagate_uncaught {
            return;
        }
        terminal.log(err.severity(), &err.to_string());
        if err.wants_help() {
            terminal.log(crate::terminal::Severity::Info, &help::format_help(&self.registry, name));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::binding::{Parameter, SyncFn};
    use crate::registry::provider::{CommandSpec, ProviderDescriptor, VariableSpec};
    use crate::terminal::{Severity, TracingTerminal};
    use parking_lot::Mutex;
    use std::sync::atomic::AtomicI32;

    fn dispatcher_with(registry: Registry) -> Dispatcher {
        Dispatcher::new(Arc::new(registry), Arc::new(ConverterRegistry::new()))
    }

    #[tokio::test]
    async fn simple_command_receives_quoted_argument() {
        let received: Arc<Mutex<Option<String>>> = Arc::new(Mutex::new(None));
        let captured = received.clone();
        let registry = Registry::new();
        registry
            .register_type(ProviderDescriptor::new("").is_static(true).with_command(CommandSpec {
                name: "Echo".into(),
                description: String::new(),
                parameters: vec![Parameter::new("text", "string")],
                is_async: false,
                handler: Arc::new(SyncFn(move |_, args| {
                    if let Value::Str(s) = &args[0] {
                        *captured.lock() = Some(s.clone());
                    }
                    Ok(())
                })),
            }))
            .unwrap();
        let dispatcher = dispatcher_with(registry);
        let terminal = TracingTerminal::new();
        dispatcher
            .dispatch_line("Echo \"hello world\"", &terminal, CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(received.lock().as_deref(), Some("hello world"));
    }

    #[tokio::test]
    async fn overload_picked_by_arity() {
        let which = Arc::new(AtomicI32::new(-1));
        let w0 = which.clone();
        let w1 = which.clone();
        let registry = Registry::new();
        registry
            .register_type(
                ProviderDescriptor::new("")
                    .is_static(true)
                    .with_command(CommandSpec {
                        name: "Help".into(),
                        description: String::new(),
                        parameters: vec![],
                        is_async: false,
                        handler: Arc::new(SyncFn(move |_, _| {
                            w0.store(0, Ordering::SeqCst);
                            Ok(())
                        })),
                    })
                    .with_command(CommandSpec {
                        name: "Help".into(),
                        description: String::new(),
                        parameters: vec![Parameter::new("name", "string")],
                        is_async: false,
                        handler: Arc::new(SyncFn(move |_, _| {
                            w1.store(1, Ordering::SeqCst);
                            Ok(())
                        })),
                    }),
            )
            .unwrap();
        let dispatcher = dispatcher_with(registry);
        let terminal = TracingTerminal::new();
        dispatcher.dispatch_line("Help", &terminal, CancellationToken::new()).await.unwrap();
        assert_eq!(which.load(Ordering::SeqCst), 0);
        dispatcher.dispatch_line("Help Echo", &terminal, CancellationToken::new()).await.unwrap();
        assert_eq!(which.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn variable_set_then_get() {
        let stored = Arc::new(AtomicI32::new(0));
        let for_get = stored.clone();
        let for_set = stored.clone();
        let registry = Registry::new();
        registry
            .register_type(ProviderDescriptor::new("").is_static(true).with_variable(VariableSpec {
                name: "MaxSize".into(),
                description: String::new(),
                type_name: "i32".into(),
                persist: false,
                get: Arc::new(move |_| Value::I32(for_get.load(Ordering::SeqCst))),
                set: Some(Arc::new(move |_, value| {
                    if let Value::I32(v) = value {
                        for_set.store(v, Ordering::SeqCst);
                        Ok(())
                    } else {
                        Err("wrong type".into())
                    }
                })),
                clear: None,
            }))
            .unwrap();
        let dispatcher = dispatcher_with(registry);
        let terminal = TracingTerminal::new();
        dispatcher.dispatch_line("MaxSize=1024", &terminal, CancellationToken::new()).await.unwrap();
        assert_eq!(stored.load(Ordering::SeqCst), 1024);
        dispatcher.dispatch_line("MaxSize", &terminal, CancellationToken::new()).await.unwrap();
    }

    #[tokio::test]
    async fn bad_value_leaves_prior_value_unchanged() {
        let stored = Arc::new(AtomicI32::new(7));
        let for_get = stored.clone();
        let for_set = stored.clone();
        let registry = Registry::new();
        registry
            .register_type(ProviderDescriptor::new("").is_static(true).with_variable(VariableSpec {
                name: "MaxSize".into(),
                description: String::new(),
                type_name: "i32".into(),
                persist: false,
                get: Arc::new(move |_| Value::I32(for_get.load(Ordering::SeqCst))),
                set: Some(Arc::new(move |_, value| {
                    if let Value::I32(v) = value {
                        for_set.store(v, Ordering::SeqCst);
                        Ok(())
                    } else {
                        Err("wrong type".into())
                    }
                })),
                clear: None,
            }))
            .unwrap();
        let dispatcher = dispatcher_with(registry);
        let terminal = TracingTerminal::new();
        let err = dispatcher
            .dispatch_line("MaxSize=abc", &terminal, CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::ConversionFailed { .. }));
        assert_eq!(stored.load(Ordering::SeqCst), 7);
    }

    #[tokio::test]
    async fn debugger_mode_propagates_invocation_failures() {
        let registry = Registry::new();
        registry
            .register_type(ProviderDescriptor::new("").is_static(true).with_command(CommandSpec {
                name: "Boom".into(),
                description: String::new(),
                parameters: vec![],
                is_async: false,
                handler: Arc::new(SyncFn(|_, _| Err("kaboom".into()))),
            }))
            .unwrap();
        let dispatcher = dispatcher_with(registry);
        dispatcher.debugger_attached.store(true, Ordering::SeqCst);
        let terminal = TracingTerminal::new();
        let err = dispatcher.dispatch_line("Boom", &terminal, CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, DispatchError::InvocationFailed { .. }));
    }

    #[tokio::test]
    async fn cancellation_short_circuits_async_invocation() {
        use crate::registry::binding::AsyncFn;
        let registry = Registry::new();
        registry
            .register_type(ProviderDescriptor::new("").is_static(true).with_command(CommandSpec {
                name: "Sleep".into(),
                description: String::new(),
                parameters: vec![],
                is_async: true,
                handler: Arc::new(AsyncFn(|_, _, _| {
                    Box::pin(async {
                        tokio::time::sleep(std::time::Duration::from_secs(3600)).await;
                        Ok(())
                    })
                })),
            }))
            .unwrap();
        let dispatcher = dispatcher_with(registry);
        let terminal = TracingTerminal::new();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = dispatcher.dispatch_line("Sleep", &terminal, cancel).await.unwrap_err();
        assert!(matches!(err, DispatchError::Cancelled { .. }));
    }

    #[tokio::test]
    async fn expired_instance_is_reported_without_invoking_the_handler() {
        let invoked = Arc::new(AtomicBool::new(false));
        let for_handler = invoked.clone();
        let registry = Registry::new();
        registry
            .register_type(ProviderDescriptor::new("Cache").is_default(true).with_command(CommandSpec {
                name: "Flush".into(),
                description: String::new(),
                parameters: vec![],
                is_async: false,
                handler: Arc::new(SyncFn(move |_, _| {
                    for_handler.store(true, Ordering::SeqCst);
                    Ok(())
                })),
            }))
            .unwrap();
        let dispatcher = dispatcher_with(registry);
        let terminal = TracingTerminal::new();
        let err = dispatcher
            .dispatch_line("Cache.Flush", &terminal, CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::InstanceExpired { kind, .. } if kind == "Cache"));
        assert!(!invoked.load(Ordering::SeqCst));
    }

    #[test]
    fn severity_default_is_used_as_documented() {
        // sanity check that `DispatchError::severity` is exercised via `report`
        assert_eq!(DispatchError::UnknownName("x".into()).severity(), Severity::Warning);
    }
}
