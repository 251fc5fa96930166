// dispatch.rs - Ordered hook chains and the context handed to each callback.
//
// A chain is a copy-on-write list: add/remove swap in a new Arc<Vec<_>>, dispatch clones the
// Arc once and walks that snapshot. A callback removed mid-call still runs for invocations
// that already took their snapshot.
//
// The first callback returning Flow::Handled stops the chain and suppresses the original
// function. A callback that errors or panics is logged and counts as Flow::Continue.

use crate::unreal::{UFunction, UObject};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, RwLock};

/// What a callback wants done with the intercepted call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    /// Let later callbacks and the original function run
    Continue,
    /// Skip later callbacks and the original function
    Handled,
}

pub type CallbackError = Box<dyn std::error::Error + Send + Sync>;

/// A registered hook callback.
pub type Callback<C> = Arc<dyn Fn(&mut C) -> Result<Flow, CallbackError> + Send + Sync>;

/// Arguments of an intercepted `UObject::ProcessEvent` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessEventContext {
    pub object: UObject,
    pub function: UFunction,
    /// Parameter block, laid out per the function's properties
    pub params: usize,
}

/// Arguments of an intercepted `UObject::CallFunction` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallFunctionContext {
    pub object: UObject,
    /// `FFrame*` of the calling script
    pub frame: usize,
    pub result: usize,
    pub function: UFunction,
}

pub struct HookChain<C> {
    entries: RwLock<Arc<Vec<(String, Callback<C>)>>>,
}

impl<C> Default for HookChain<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C> HookChain<C> {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(Arc::new(Vec::new())),
        }
    }

    fn snapshot(&self) -> Arc<Vec<(String, Callback<C>)>> {
        match self.entries.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn update<R>(&self, f: impl FnOnce(&mut Vec<(String, Callback<C>)>) -> R) -> R {
        let mut guard = self
            .entries
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let mut next = Vec::clone(&guard);
        let r = f(&mut next);
        *guard = Arc::new(next);
        r
    }

    /// Register a callback at the end of the chain. False if `id` is already taken.
    pub fn add<F>(&self, id: impl Into<String>, callback: F) -> bool
    where
        F: Fn(&mut C) -> Result<Flow, CallbackError> + Send + Sync + 'static,
    {
        let id = id.into();
        self.update(|entries| {
            if entries.iter().any(|(existing, _)| *existing == id) {
                return false;
            }
            entries.push((id, Arc::new(callback)));
            true
        })
    }

    /// Unregister a callback. False if no callback has this id.
    pub fn remove(&self, id: &str) -> bool {
        self.update(|entries| {
            let before = entries.len();
            entries.retain(|(existing, _)| existing != id);
            entries.len() != before
        })
    }

    pub fn contains(&self, id: &str) -> bool {
        self.snapshot().iter().any(|(existing, _)| existing == id)
    }

    pub fn len(&self) -> usize {
        self.snapshot().len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshot().is_empty()
    }

    pub fn clear(&self) {
        self.update(|entries| entries.clear());
    }

    /// Run callbacks in registration order. Returns true if one of them handled the call.
    pub fn dispatch(&self, ctx: &mut C) -> bool {
        let snapshot = self.snapshot();
        for (id, callback) in snapshot.iter() {
            match panic::catch_unwind(AssertUnwindSafe(|| callback(ctx))) {
                Ok(Ok(Flow::Handled)) => return true,
                Ok(Ok(Flow::Continue)) => {}
                Ok(Err(e)) => tracing::warn!("hook {:?} failed: {}", id, e),
                Err(payload) => {
                    tracing::error!("hook {:?} panicked: {}", id, panic_message(&payload))
                }
            }
        }
        false
    }
}

fn panic_message(payload: &Box<dyn Any + Send>) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s
    } else {
        "<non-string panic>"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    type Trace = Vec<&'static str>;

    fn push(name: &'static str, flow: Flow) -> impl Fn(&mut Trace) -> Result<Flow, CallbackError> {
        move |t: &mut Trace| {
            t.push(name);
            Ok(flow)
        }
    }

    #[test]
    fn test_registration_order() {
        let chain = HookChain::new();
        assert!(chain.add("a", push("a", Flow::Continue)));
        assert!(chain.add("b", push("b", Flow::Continue)));
        assert!(chain.add("c", push("c", Flow::Continue)));

        let mut trace = Trace::new();
        assert!(!chain.dispatch(&mut trace));
        assert_eq!(trace, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_handled_short_circuits() {
        let chain = HookChain::new();
        chain.add("a", push("a", Flow::Continue));
        chain.add("b", push("b", Flow::Handled));
        chain.add("c", push("c", Flow::Continue));

        let mut trace = Trace::new();
        assert!(chain.dispatch(&mut trace));
        assert_eq!(trace, vec!["a", "b"]);
    }

    #[test]
    fn test_error_and_panic_count_as_continue() {
        let chain = HookChain::new();
        chain.add("fails", |t: &mut Trace| {
            t.push("fails");
            Err("bad params".into())
        });
        chain.add("panics", |t: &mut Trace| -> Result<Flow, CallbackError> {
            t.push("panics");
            panic!("consumer bug")
        });
        chain.add("last", push("last", Flow::Continue));

        let mut trace = Trace::new();
        assert!(!chain.dispatch(&mut trace));
        assert_eq!(trace, vec!["fails", "panics", "last"]);
    }

    #[test]
    fn test_duplicate_id_rejected() {
        let chain: HookChain<Trace> = HookChain::new();
        assert!(chain.add("x", push("first", Flow::Continue)));
        assert!(!chain.add("x", push("second", Flow::Continue)));
        assert_eq!(chain.len(), 1);

        let mut trace = Trace::new();
        chain.dispatch(&mut trace);
        assert_eq!(trace, vec!["first"]);
    }

    #[test]
    fn test_remove() {
        let chain: HookChain<Trace> = HookChain::new();
        chain.add("a", push("a", Flow::Handled));
        chain.add("b", push("b", Flow::Continue));
        assert!(chain.remove("a"));
        assert!(!chain.remove("a"));
        assert!(!chain.contains("a"));

        let mut trace = Trace::new();
        assert!(!chain.dispatch(&mut trace));
        assert_eq!(trace, vec!["b"]);

        chain.clear();
        assert!(chain.is_empty());
    }

    #[test]
    fn test_removal_during_dispatch_keeps_snapshot() {
        let chain: Arc<HookChain<Trace>> = Arc::new(HookChain::new());
        let handle = Arc::downgrade(&chain);
        chain.add("remover", move |t: &mut Trace| {
            t.push("remover");
            if let Some(chain) = handle.upgrade() {
                chain.remove("victim");
            }
            Ok(Flow::Continue)
        });
        chain.add("victim", push("victim", Flow::Continue));

        // The in-flight call still sees the victim
        let mut trace = Trace::new();
        chain.dispatch(&mut trace);
        assert_eq!(trace, vec!["remover", "victim"]);

        // The next one doesn't
        let mut trace = Trace::new();
        chain.dispatch(&mut trace);
        assert_eq!(trace, vec!["remover"]);
    }

    #[test]
    fn test_callbacks_can_mutate_context() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let chain: HookChain<ProcessEventContext> = HookChain::new();
        let sink = seen.clone();
        chain.add("rewrite", |ctx: &mut ProcessEventContext| {
            ctx.params = 0xBEEF;
            Ok(Flow::Continue)
        });
        chain.add("observe", move |ctx: &mut ProcessEventContext| {
            sink.lock().unwrap().push(ctx.params);
            Ok(Flow::Continue)
        });

        let mut ctx = ProcessEventContext {
            object: UObject::from_addr(0x10),
            function: UFunction::from_addr(0x20),
            params: 0x30,
        };
        chain.dispatch(&mut ctx);
        assert_eq!(*seen.lock().unwrap(), vec![0xBEEF]);
    }
}
