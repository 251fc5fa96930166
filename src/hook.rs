// hook.rs - Detour lifecycle for intercepted engine entry points.
//
// The actual byte patching lives behind `HookBackend`. On Windows that is MinHook; tests plug
// in a recording backend. Each intercepted function gets an `EntryPoint`, which tracks where
// the hook is in its lifecycle and owns the ordered callback chain consulted by the detour.
//
// Flow:
//   EntryPoint::new()  -> Uninstalled
//   install()          -> backend.create(target, detour), keeps the trampoline -> Installed
//   enable()/disable() -> Installed <-> Enabled
//   uninstall()        -> disable if needed, backend.remove(target) -> Uninstalled
//   invoke()           -> chain.dispatch(ctx), then the original unless a callback handled it

use crate::dispatch::HookChain;
use crate::error::{Error, Result};
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Where an entry point is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookState {
    Uninstalled,
    /// Trampoline built, prologue not redirected yet
    Installed,
    Enabled,
}

impl fmt::Display for HookState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            HookState::Uninstalled => "uninstalled",
            HookState::Installed => "installed but disabled",
            HookState::Enabled => "enabled",
        })
    }
}

// ============================================================
// Backend
// ============================================================

/// Byte-patching mechanism. Errors carry the backend's own description.
pub trait HookBackend: Send + Sync {
    /// Build a trampoline for `target` that jumps to `detour`; returns the address that
    /// runs the original function.
    ///
    /// # Safety
    /// `target` must be the start of a function and `detour` must share its ABI.
    unsafe fn create(&self, target: usize, detour: usize) -> std::result::Result<usize, String>;

    /// Redirect the target's prologue to the detour.
    unsafe fn enable(&self, target: usize) -> std::result::Result<(), String>;

    /// Restore the original prologue, keeping the trampoline.
    unsafe fn disable(&self, target: usize) -> std::result::Result<(), String>;

    /// Free the trampoline.
    unsafe fn remove(&self, target: usize) -> std::result::Result<(), String>;
}

/// MinHook-backed inline patching.
#[cfg(windows)]
pub struct MinHookBackend;

#[cfg(windows)]
mod minhook {
    use super::HookBackend;
    use minhook_sys::{
        MH_CreateHook, MH_DisableHook, MH_EnableHook, MH_Initialize, MH_RemoveHook, MH_OK,
    };
    use std::ffi::c_void;
    use std::ptr;

    const MH_ERROR_ALREADY_INITIALIZED: i32 = 1;

    fn check(status: i32, what: &str) -> Result<(), String> {
        if status == MH_OK {
            Ok(())
        } else {
            Err(format!("{what} returned MH_STATUS {status}"))
        }
    }

    impl super::MinHookBackend {
        /// Initialize MinHook. Another module having initialized it already is fine.
        pub fn new() -> crate::Result<Self> {
            let s = unsafe { MH_Initialize() };
            if s != MH_OK && s != MH_ERROR_ALREADY_INITIALIZED {
                return Err(crate::Error::HookInstall {
                    name: "MinHook",
                    reason: format!("MH_Initialize returned MH_STATUS {s}"),
                });
            }
            Ok(Self)
        }
    }

    impl HookBackend for super::MinHookBackend {
        unsafe fn create(&self, target: usize, detour: usize) -> Result<usize, String> {
            let mut original = ptr::null_mut::<c_void>();
            check(
                MH_CreateHook(target as *mut c_void, detour as *mut c_void, &mut original),
                "MH_CreateHook",
            )?;
            Ok(original as usize)
        }

        unsafe fn enable(&self, target: usize) -> Result<(), String> {
            check(MH_EnableHook(target as *mut c_void), "MH_EnableHook")
        }

        unsafe fn disable(&self, target: usize) -> Result<(), String> {
            check(MH_DisableHook(target as *mut c_void), "MH_DisableHook")
        }

        unsafe fn remove(&self, target: usize) -> Result<(), String> {
            check(MH_RemoveHook(target as *mut c_void), "MH_RemoveHook")
        }
    }
}

// ============================================================
// Entry Point
// ============================================================

/// One intercepted engine function: its hook state, trampoline and callback chain.
pub struct EntryPoint<C> {
    name: &'static str,
    target: usize,
    detour: usize,
    /// Trampoline to the original body, 0 until installed
    original: AtomicUsize,
    state: Mutex<HookState>,
    backend: Arc<dyn HookBackend>,
    chain: HookChain<C>,
}

impl<C> EntryPoint<C> {
    pub fn new(
        name: &'static str,
        target: usize,
        detour: usize,
        backend: Arc<dyn HookBackend>,
    ) -> Self {
        Self {
            name,
            target,
            detour,
            original: AtomicUsize::new(0),
            state: Mutex::new(HookState::Uninstalled),
            backend,
            chain: HookChain::new(),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn target(&self) -> usize {
        self.target
    }

    pub fn state(&self) -> HookState {
        *self.lock()
    }

    /// Address that runs the unhooked function, if installed.
    pub fn original(&self) -> Option<usize> {
        match self.original.load(Ordering::Acquire) {
            0 => None,
            addr => Some(addr),
        }
    }

    /// Callbacks consulted on every intercepted call.
    pub fn chain(&self) -> &HookChain<C> {
        &self.chain
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HookState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn refuse(&self, action: &'static str, state: HookState) -> Error {
        Error::HookState {
            name: self.name,
            action,
            state,
        }
    }

    fn backend_error(&self, reason: String) -> Error {
        Error::HookInstall {
            name: self.name,
            reason,
        }
    }

    /// Build the trampoline. The hook starts out disabled.
    pub fn install(&self) -> Result<()> {
        let mut state = self.lock();
        if *state != HookState::Uninstalled {
            return Err(self.refuse("install", *state));
        }
        let original = unsafe { self.backend.create(self.target, self.detour) }
            .map_err(|reason| self.backend_error(reason))?;
        self.original.store(original, Ordering::Release);
        *state = HookState::Installed;
        tracing::debug!(
            "{}: trampoline {:#x} for target {:#x}",
            self.name,
            original,
            self.target
        );
        Ok(())
    }

    pub fn enable(&self) -> Result<()> {
        let mut state = self.lock();
        if *state != HookState::Installed {
            return Err(self.refuse("enable", *state));
        }
        unsafe { self.backend.enable(self.target) }.map_err(|reason| self.backend_error(reason))?;
        *state = HookState::Enabled;
        Ok(())
    }

    pub fn disable(&self) -> Result<()> {
        let mut state = self.lock();
        if *state != HookState::Enabled {
            return Err(self.refuse("disable", *state));
        }
        unsafe { self.backend.disable(self.target) }
            .map_err(|reason| self.backend_error(reason))?;
        *state = HookState::Installed;
        Ok(())
    }

    /// Disable if needed, then free the trampoline.
    pub fn uninstall(&self) -> Result<()> {
        let mut state = self.lock();
        match *state {
            HookState::Uninstalled => return Err(self.refuse("uninstall", *state)),
            HookState::Enabled => {
                unsafe { self.backend.disable(self.target) }
                    .map_err(|reason| self.backend_error(reason))?;
                *state = HookState::Installed;
            }
            HookState::Installed => {}
        }
        unsafe { self.backend.remove(self.target) }.map_err(|reason| self.backend_error(reason))?;
        self.original.store(0, Ordering::Release);
        *state = HookState::Uninstalled;
        Ok(())
    }

    /// Run the chain, then `original` unless a callback handled the call.
    /// Returns true if the original was suppressed.
    pub fn invoke(&self, ctx: &mut C, original: impl FnOnce(&mut C)) -> bool {
        let handled = self.chain.dispatch(ctx);
        if !handled {
            original(ctx);
        }
        handled
    }
}

impl<C> Drop for EntryPoint<C> {
    fn drop(&mut self) {
        if self.state() != HookState::Uninstalled {
            if let Err(e) = self.uninstall() {
                tracing::error!("{}", e);
            }
        }
    }
}

impl<C> fmt::Debug for EntryPoint<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntryPoint")
            .field("name", &self.name)
            .field("target", &format_args!("{:#x}", self.target))
            .field("state", &self.state())
            .field("callbacks", &self.chain.len())
            .finish()
    }
}
