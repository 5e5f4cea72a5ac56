//! Binding Metadata
//!
//! The shapes the registry hands out to the dispatcher: commands (overload
//! sets of [`Binding`]), variables ([`VariableBinding`]), and the converted
//! [`Value`] an argument token becomes once a converter accepts it.

use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use super::instance::InstanceHandle;

/// A single converted argument or variable value. One variant per
/// converter the core ships; hosts extend the set of convertible *type
/// names*, not this enum, by registering enum converters that resolve to
/// `Value::Enum`.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    I8(i8),
    I16(i16),
    I32(i32),
    I64(i64),
    U8(u8),
    U16(u16),
    U32(u32),
    U64(u64),
    F32(f32),
    F64(f64),
    Bool(bool),
    Str(String),
    Uuid(uuid::Uuid),
    DateTime(chrono::DateTime<chrono::Utc>),
    /// A case-insensitive enum match, carrying the canonical variant name.
    Enum(String),
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::I8(v) => write!(f, "{v}"),
            Value::I16(v) => write!(f, "{v}"),
            Value::I32(v) => write!(f, "{v}"),
            Value::I64(v) => write!(f, "{v}"),
            Value::U8(v) => write!(f, "{v}"),
            Value::U16(v) => write!(f, "{v}"),
            Value::U32(v) => write!(f, "{v}"),
            Value::U64(v) => write!(f, "{v}"),
            Value::F32(v) => write!(f, "{v}"),
            Value::F64(v) => write!(f, "{v}"),
            Value::Bool(v) => write!(f, "{v}"),
            Value::Str(v) => write!(f, "{v}"),
            Value::Uuid(v) => write!(f, "{v}"),
            Value::DateTime(v) => write!(f, "{}", v.to_rfc3339()),
            Value::Enum(v) => write!(f, "{v}"),
        }
    }
}

/// A declared command parameter. `type_name` keys into the converter
/// registry; the framework-injected terminal handle and trailing
/// cancellation token are never represented here, since the dispatcher
/// supplies those positions itself.
#[derive(Debug, Clone)]
pub struct Parameter {
    pub name: String,
    pub type_name: String,
}

impl Parameter {
    pub fn new(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self { name: name.into(), type_name: type_name.into() }
    }
}

/// One callable overload. Sync and async handlers share this single trait;
/// `is_async` is just an informational bit on the binding, since sync
/// handlers simply never await inside `invoke`.
#[async_trait]
pub trait CommandHandler: Send + Sync {
    async fn invoke(
        &self,
        receiver: Option<InstanceHandle>,
        args: &[Value],
        cancel: CancellationToken,
    ) -> Result<(), String>;
}

/// Adapts a plain synchronous closure into a [`CommandHandler`].
pub struct SyncFn<F>(pub F)
where
    F: Fn(Option<InstanceHandle>, &[Value]) -> Result<(), String> + Send + Sync;

#[async_trait]
impl<F> CommandHandler for SyncFn<F>
where
    F: Fn(Option<InstanceHandle>, &[Value]) -> Result<(), String> + Send + Sync,
{
    async fn invoke(
        &self,
        receiver: Option<InstanceHandle>,
        args: &[Value],
        _cancel: CancellationToken,
    ) -> Result<(), String> {
        (self.0)(receiver, args)
    }
}

/// Adapts an async closure returning a boxed future into a [`CommandHandler`].
pub struct AsyncFn<F>(pub F)
where
    F: Fn(
            Option<InstanceHandle>,
            Vec<Value>,
            CancellationToken,
        ) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<(), String>> + Send>>
        + Send
        + Sync;

#[async_trait]
impl<F> CommandHandler for AsyncFn<F>
where
    F: Fn(
            Option<InstanceHandle>,
            Vec<Value>,
            CancellationToken,
        ) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<(), String>> + Send>>
        + Send
        + Sync,
{
    async fn invoke(
        &self,
        receiver: Option<InstanceHandle>,
        args: &[Value],
        cancel: CancellationToken,
    ) -> Result<(), String> {
        (self.0)(receiver, args.to_vec(), cancel).await
    }
}

/// One overload of a command name.
#[derive(Clone)]
pub struct Binding {
    pub name: String,
    pub description: String,
    pub parameters: Vec<Parameter>,
    pub is_async: bool,
    pub handler: Arc<dyn CommandHandler>,
}

impl Binding {
    /// External arity: the count of declared, non-injected parameters.
    pub fn arity(&self) -> usize {
        self.parameters.len()
    }
}

/// The overload set sharing one case-insensitive command name. Declaration
/// order is preserved, since ties between otherwise-matching overloads are
/// broken by declaration order.
#[derive(Clone, Default)]
pub struct BindingSet {
    pub name: String,
    pub overloads: Vec<Binding>,
}

impl BindingSet {
    pub fn push(&mut self, binding: Binding) {
        self.overloads.push(binding);
    }

    pub fn iter(&self) -> impl Iterator<Item = &Binding> {
        self.overloads.iter()
    }
}

pub type GetFn = Arc<dyn Fn(Option<InstanceHandle>) -> Value + Send + Sync>;
pub type SetFn = Arc<dyn Fn(Option<InstanceHandle>, Value) -> Result<(), String> + Send + Sync>;
pub type ClearFn = Arc<dyn Fn(Option<InstanceHandle>) -> Result<(), String> + Send + Sync>;

/// A single observable, optionally mutable, host variable.
#[derive(Clone)]
pub struct VariableBinding {
    pub name: String,
    pub description: String,
    pub type_name: String,
    pub persist: bool,
    pub get: GetFn,
    pub set: Option<SetFn>,
    pub clear: Option<ClearFn>,
}

impl VariableBinding {
    pub fn is_read_only(&self) -> bool {
        self.set.is_none()
    }
}
