// session.rs - One initialized view of a host: resolved addresses, hooks and runtime.
//
// Flow (SessionSlot::init, once per slot):
//   signatures.resolve(scanner)  -> Addresses, any miss is fatal
//   EntryPoint::install x2       -> trampolines, hooks still disabled
//   host.bind(addresses, tramps) -> Natives; Runtime over the two tables
//   EntryPoint::enable x2        -> host calls reach the detours, which pass straight
//                                   through to the trampolines until the session is found
//   publish                      -> host calls start going through the chains
//
// A failure at any step drops the half-built session, which uninstalls its hooks.

use crate::console::Console;
use crate::dispatch::{CallFunctionContext, ProcessEventContext};
use crate::error::Result;
use crate::game::{Addresses, HostVersion, Trampolines};
use crate::hook::{EntryPoint, HookBackend};
use crate::intercept;
use crate::scanner::Scanner;
use crate::unreal::Runtime;
use once_cell::sync::OnceCell;
use std::sync::{Arc, Mutex};

pub struct Session {
    host: &'static str,
    addresses: Addresses,
    process_event: EntryPoint<ProcessEventContext>,
    call_function: EntryPoint<CallFunctionContext>,
    runtime: Runtime,
    console: Console,
}

impl Session {
    /// Resolve, hook (disabled) and bind. Nothing is published or enabled yet.
    pub fn initialize(
        host: &dyn HostVersion,
        scanner: &dyn Scanner,
        backend: Arc<dyn HookBackend>,
    ) -> Result<Self> {
        tracing::info!("initializing for {}", host.name());
        let addresses = host.signatures()?.resolve(scanner)?;

        let process_event = EntryPoint::new(
            "ProcessEvent",
            addresses.process_event,
            intercept::process_event_detour as usize,
            backend.clone(),
        );
        let call_function = EntryPoint::new(
            "CallFunction",
            addresses.call_function,
            intercept::call_function_detour as usize,
            backend,
        );
        process_event.install()?;
        call_function.install()?;

        let trampolines = Trampolines {
            process_event: process_event.original().unwrap_or(addresses.process_event),
            call_function: call_function.original().unwrap_or(addresses.call_function),
        };
        intercept::set_originals(trampolines.process_event, trampolines.call_function);
        let natives = host.bind(&addresses, &trampolines);
        let runtime = Runtime::new(host.offsets(), addresses.gnames, addresses.gobjects, natives);
        tracing::debug!(
            "GNames {:#x} ({} names), GObjects {:#x} ({} objects)",
            addresses.gnames,
            runtime.names().size(),
            addresses.gobjects,
            runtime.objects().size()
        );

        Ok(Self {
            host: host.name(),
            addresses,
            process_event,
            call_function,
            runtime,
            console: Console::new(),
        })
    }

    pub fn host(&self) -> &'static str {
        self.host
    }

    pub fn addresses(&self) -> &Addresses {
        &self.addresses
    }

    pub fn runtime(&self) -> &Runtime {
        &self.runtime
    }

    /// The host's in-game console.
    pub fn console(&self) -> &Console {
        &self.console
    }

    /// `UObject::ProcessEvent` interception and its hook chain.
    pub fn process_event(&self) -> &EntryPoint<ProcessEventContext> {
        &self.process_event
    }

    /// `UObject::CallFunction` interception and its hook chain.
    pub fn call_function(&self) -> &EntryPoint<CallFunctionContext> {
        &self.call_function
    }

    fn enable_hooks(&self) -> Result<()> {
        self.process_event.enable()?;
        self.call_function.enable()
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("host", &self.host)
            .field("process_event", &self.process_event)
            .field("call_function", &self.call_function)
            .field("runtime", &self.runtime)
            .finish()
    }
}

/// Holds at most one session; initialization runs at most once.
#[derive(Default)]
pub struct SessionSlot {
    lock: Mutex<()>,
    session: OnceCell<Arc<Session>>,
}

impl SessionSlot {
    pub const fn new() -> Self {
        Self {
            lock: Mutex::new(()),
            session: OnceCell::new(),
        }
    }

    /// Initialize unless already done. Returns false, without scanning, on later calls.
    pub fn init(
        &self,
        host: &dyn HostVersion,
        scanner: &dyn Scanner,
        backend: Arc<dyn HookBackend>,
    ) -> Result<bool> {
        let _guard = self.lock.lock().unwrap_or_else(|p| p.into_inner());
        if self.session.get().is_some() {
            tracing::debug!("already initialized, skipping");
            return Ok(false);
        }

        let session = Session::initialize(host, scanner, backend)?;
        session.enable_hooks()?;
        let session = Arc::new(session);
        if self.session.set(session.clone()).is_err() {
            return Ok(false);
        }
        tracing::info!("{} hooks enabled", session.host());
        Ok(true)
    }

    pub fn get(&self) -> Option<&Arc<Session>> {
        self.session.get()
    }

    pub fn is_initialized(&self) -> bool {
        self.session.get().is_some()
    }
}
