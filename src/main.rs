//! Sample host wiring for `opsterm`. Registers a couple of example
//! commands/variables, reads lines from stdin, and dispatches them — not
//! part of the library's public contract, just a runnable demonstration of
//! how a host would wire the pieces together.

use std::io::BufRead;
use std::sync::Arc;

use clap::Parser;
use tokio_util::sync::CancellationToken;

use opsterm::convert::ConverterRegistry;
use opsterm::registry::binding::{Parameter, SyncFn, Value};
use opsterm::registry::provider::{CommandSpec, ProviderDescriptor, VariableSpec};
use opsterm::registry::Registry;
use opsterm::terminal::TracingTerminal;
use opsterm::{Dispatcher, TerminalOptions};

#[derive(Parser)]
#[command(name = "opsterm-demo")]
#[command(about = "Demo host embedding the opsterm administrative terminal core")]
#[command(version)]
struct Cli {
    /// Enable debugger mode (InvocationFailed propagates instead of being caught)
    #[arg(long)]
    debugger: bool,
}

fn build_registry() -> (Registry, Arc<std::sync::atomic::AtomicI32>) {
    let registry = Registry::new();
    let max_size = Arc::new(std::sync::atomic::AtomicI32::new(100));

    let get_cell = max_size.clone();
    let set_cell = max_size.clone();
    registry
        .register_type(ProviderDescriptor::new("").is_static(true).with_variable(VariableSpec {
            name: "MaxSize".into(),
            description: "maximum accepted request size".into(),
            type_name: "i32".into(),
            persist: true,
            get: Arc::new(move |_| Value::I32(get_cell.load(std::sync::atomic::Ordering::SeqCst))),
            set: Some(Arc::new(move |_, value| {
                if let Value::I32(v) = value {
                    set_cell.store(v, std::sync::atomic::Ordering::SeqCst);
                    Ok(())
                } else {
                    Err("expected an i32".to_string())
                }
            })),
            clear: None,
        }))
        .expect("static registration cannot fail for a single variable");

    registry
        .register_type(ProviderDescriptor::new("").is_static(true).with_command(CommandSpec {
            name: "Echo".into(),
            description: "print its argument back".into(),
            parameters: vec![Parameter::new("text", "string")],
            is_async: false,
            handler: Arc::new(SyncFn(|_, args: &[Value]| {
                if let Value::Str(text) = &args[0] {
                    println!("{text}");
                }
                Ok(())
            })),
        }))
        .expect("static registration cannot fail for a single command");

    (registry, max_size)
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();
    let cli = Cli::parse();

    let options = TerminalOptions { debugger_attached: cli.debugger, ..Default::default() };
    let (registry, _max_size) = build_registry();
    let dispatcher = Dispatcher::new(Arc::new(registry), Arc::new(ConverterRegistry::new()));
    dispatcher.debugger_attached.store(options.debugger_attached, std::sync::atomic::Ordering::SeqCst);

    let terminal = TracingTerminal::new();
    let cancel = CancellationToken::new();

    let stdin = std::io::stdin();
    for line in stdin.lock().lines() {
        let Ok(line) = line else { break };
        if let Err(err) = dispatcher.dispatch_line(&line, &terminal, cancel.clone()).await {
            eprintln!("{err}");
        }
    }
}
