// intercept.rs - The two detours the hook backend redirects the host into.
//
// Each detour rebuilds its arguments into a context, runs the entry point's chain, and calls
// through the trampoline unless a callback handled the call. With no session published
// (yet, or any more) the call goes straight to the trampoline recorded at install. The
// detours only find the session through the global slot; everything after that is in plain
// functions the tests drive directly.

use crate::dispatch::{CallFunctionContext, ProcessEventContext};
use crate::session::Session;
use crate::unreal::{UFunction, UObject};
use std::sync::atomic::{AtomicUsize, Ordering};

type ProcessEventFn = unsafe extern "system" fn(object: usize, function: usize, params: usize);
type CallFunctionFn =
    unsafe extern "system" fn(object: usize, frame: usize, result: usize, function: usize);

static PROCESS_EVENT_ORIGINAL: AtomicUsize = AtomicUsize::new(0);
static CALL_FUNCTION_ORIGINAL: AtomicUsize = AtomicUsize::new(0);

/// Record the trampolines. Must happen before either hook is enabled.
pub(crate) fn set_originals(process_event: usize, call_function: usize) {
    PROCESS_EVENT_ORIGINAL.store(process_event, Ordering::Release);
    CALL_FUNCTION_ORIGINAL.store(call_function, Ordering::Release);
}

/// The session's trampoline, else the one recorded at install.
fn trampoline(live: Option<usize>, recorded: &AtomicUsize) -> Option<usize> {
    live.or_else(|| Some(recorded.load(Ordering::Acquire)).filter(|&addr| addr != 0))
}

/// Run the chain when there is a session, otherwise call `original` directly.
/// Returns true if the original was suppressed.
pub fn dispatch_process_event(
    session: Option<&Session>,
    ctx: &mut ProcessEventContext,
    original: impl FnOnce(&mut ProcessEventContext),
) -> bool {
    match session {
        Some(session) => process_event(session, ctx, original),
        None => {
            original(ctx);
            false
        }
    }
}

pub fn dispatch_call_function(
    session: Option<&Session>,
    ctx: &mut CallFunctionContext,
    original: impl FnOnce(&mut CallFunctionContext),
) -> bool {
    match session {
        Some(session) => call_function(session, ctx, original),
        None => {
            original(ctx);
            false
        }
    }
}

/// Run the ProcessEvent chain, then `original` unless handled.
pub fn process_event(
    session: &Session,
    ctx: &mut ProcessEventContext,
    original: impl FnOnce(&mut ProcessEventContext),
) -> bool {
    session.process_event().invoke(ctx, original)
}

/// Run the CallFunction chain, then `original` unless handled.
pub fn call_function(
    session: &Session,
    ctx: &mut CallFunctionContext,
    original: impl FnOnce(&mut CallFunctionContext),
) -> bool {
    session.call_function().invoke(ctx, original)
}

/// `void UObject::ProcessEvent(UFunction* Function, void* Parms)`
pub(crate) unsafe extern "system" fn process_event_detour(
    object: usize,
    function: usize,
    params: usize,
) {
    let session = crate::session();
    let live = session.as_deref().and_then(|s| s.process_event().original());
    let Some(trampoline) = trampoline(live, &PROCESS_EVENT_ORIGINAL) else {
        tracing::error!("ProcessEvent intercepted without a trampoline");
        return;
    };
    let original: ProcessEventFn = std::mem::transmute(trampoline);
    let mut ctx = ProcessEventContext {
        object: UObject::from_addr(object),
        function: UFunction::from_addr(function),
        params,
    };
    dispatch_process_event(session.as_deref(), &mut ctx, |ctx| {
        original(ctx.object.addr(), ctx.function.addr(), ctx.params)
    });
}

/// `void UObject::CallFunction(FFrame& Stack, void* Result, UFunction* Function)`
pub(crate) unsafe extern "system" fn call_function_detour(
    object: usize,
    frame: usize,
    result: usize,
    function: usize,
) {
    let session = crate::session();
    let live = session.as_deref().and_then(|s| s.call_function().original());
    let Some(trampoline) = trampoline(live, &CALL_FUNCTION_ORIGINAL) else {
        tracing::error!("CallFunction intercepted without a trampoline");
        return;
    };
    let original: CallFunctionFn = std::mem::transmute(trampoline);
    let mut ctx = CallFunctionContext {
        object: UObject::from_addr(object),
        frame,
        result,
        function: UFunction::from_addr(function),
    };
    dispatch_call_function(session.as_deref(), &mut ctx, |ctx| {
        original(ctx.object.addr(), ctx.frame, ctx.result, ctx.function.addr())
    });
}
