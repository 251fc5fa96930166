// console.rs - Printing to the host's in-game console.
//
// The console is whichever live object derives from `Console` (class defaults excluded).
// Until the host creates one, output is dropped. The last console found is remembered as a
// weak pointer, so a torn-down console is noticed and searched for again.

use crate::error::{Error, Result};
use crate::logging::{self, LogMessage};
use crate::unreal::properties::{self, PropertyDescriptor};
use crate::unreal::{FWeakObjectPtr, ObjectFlags, Runtime, UFunction, UObject, Value};
use once_cell::sync::OnceCell;
use std::sync::Mutex;

const CONSOLE_CLASS: &str = "Console";
const OUTPUT_TEXT: &str = "OutputText";

#[derive(Debug, Default)]
pub struct Console {
    cached: Mutex<FWeakObjectPtr>,
}

impl Console {
    pub fn new() -> Self {
        Self::default()
    }

    /// The live console object, if the host has made one.
    pub fn find(&self, rt: &Runtime) -> Option<UObject> {
        let console = {
            let mut cached = self.cached.lock().unwrap_or_else(|p| p.into_inner());
            if let Some(console) = rt.objects().resolve_weak(&cached) {
                return Some(console);
            }

            let class = rt.find_class(CONSOLE_CLASS)?;
            let console = rt.objects().iter().find(|o| {
                o.is_a(rt, class)
                    && !o.flags(rt).contains(ObjectFlags::CLASS_DEFAULT_OBJECT)
                    && !o.name(rt).starts_with("Default__")
            })?;
            *cached = rt.weak_for(Some(console)).unwrap_or_default();
            console
        };
        // Log callbacks may print, and printing calls back into `find`
        tracing::debug!("console is {}", console.path_name(rt));
        Some(console)
    }

    pub fn is_ready(&self, rt: &Runtime) -> bool {
        self.find(rt).is_some()
    }

    /// Print a line on the console. Ok(false) when there is no console yet.
    pub fn output_text(&self, rt: &Runtime, text: &str) -> Result<bool> {
        let Some(console) = self.find(rt) else {
            return Ok(false);
        };
        let class = console.class(rt);
        let function = class.find_function(rt, OUTPUT_TEXT).ok_or_else(|| {
            Error::PropertyNotFound(format!("{}.{}", class.name(rt), OUTPUT_TEXT))
        })?;

        let params = rt.malloc(function.params_size(rt).max(1))?;
        let sent = function
            .as_struct()
            .set_field(rt, params, "Text", &Value::Str(text.to_string()));
        if sent.is_ok() {
            unsafe { rt.process_event(console, function, params) };
        }
        destroy_params(rt, function, params);
        rt.free(params);
        sent.map(|_| true)
    }
}

/// Release anything the parameter block at `params` owns.
fn destroy_params(rt: &Runtime, function: UFunction, params: usize) {
    for prop in function.as_struct().properties(rt) {
        let destroyed = PropertyDescriptor::read(rt, prop)
            .and_then(|desc| properties::destroy_all(rt, &desc, params));
        if let Err(e) = destroyed {
            tracing::warn!("leaking parameter {}: {}", prop.name(rt), e);
        }
    }
}

static ROUTE: OnceCell<u64> = OnceCell::new();

/// Mirror log callbacks to the console of the global session. Safe to call repeatedly.
pub fn route_logs() {
    ROUTE.get_or_init(|| logging::add_callback(print_message));
}

fn print_message(message: &LogMessage) {
    let Some(session) = crate::session() else {
        return;
    };
    let line = format!("[{}] {}", message.level, message.msg);
    if let Err(e) = session.console().output_text(session.runtime(), &line) {
        tracing::debug!("console output failed: {}", e);
    }
}
