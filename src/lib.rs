// lib.rs - In-process reflection and function interception for Unreal Engine 4 hosts.
//
// Loaded into the host process (by an injector or a plugin loader), the crate:
//   1. Scans the main module for each engine function and global the host version names
//   2. Hooks UObject::ProcessEvent and UObject::CallFunction behind ordered callback chains
//   3. Exposes the name and object tables, the class model and typed property access
//
// Nothing happens on load. A consumer calls `init` (or the `unreal_hook_init_bl3` export)
// once; later calls are no-ops. Everything after that goes through `session()`.

pub mod capi;
pub mod config;
pub mod console;
pub mod dispatch;
pub mod error;
pub mod game;
pub mod hook;
pub mod intercept;
pub mod logging;
pub mod memory;
pub mod scanner;
pub mod session;
pub mod unreal;

#[cfg(test)]
mod testing;

pub use error::{Error, Result};
pub use logging::VERSION;

use crate::game::HostVersion;
use crate::hook::HookBackend;
use crate::scanner::Scanner;
use crate::session::{Session, SessionSlot};
use std::sync::Arc;

/// The process-wide session the detours and C exports use.
static SESSION: SessionSlot = SessionSlot::new();

/// Initialize against the main module with the MinHook backend. Reads the config file,
/// starts logging and routes log output to the in-game console.
///
/// Returns false when already initialized.
#[cfg(windows)]
pub fn init(host: Arc<dyn HostVersion>) -> Result<bool> {
    if SESSION.is_initialized() {
        return Ok(false);
    }
    let config = config::Config::load()?;
    logging::init(&config)?;
    console::route_logs();

    let host: Arc<dyn HostVersion> = if config.signatures.is_empty() {
        host
    } else {
        Arc::new(game::Overridden::new(host, &config.signatures)?)
    };
    let scanner = scanner::ModuleScanner::main_module()?;
    let backend = Arc::new(hook::MinHookBackend::new()?);
    init_with(host.as_ref(), &scanner, backend).map_err(|e| {
        tracing::error!("initialization failed: {}", e);
        e
    })
}

/// Initialize the global session with an explicit scanner and hook backend.
///
/// Returns false, without scanning, when already initialized.
pub fn init_with(
    host: &dyn HostVersion,
    scanner: &dyn Scanner,
    backend: Arc<dyn HookBackend>,
) -> Result<bool> {
    SESSION.init(host, scanner, backend)
}

pub fn is_initialized() -> bool {
    SESSION.is_initialized()
}

/// The global session, once initialized.
pub fn session() -> Option<Arc<Session>> {
    SESSION.get().cloned()
}
