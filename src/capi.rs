// capi.rs - C-linkage exports for plugins living in the same process.
//
// Every export works on the global session. Before initialization they log and return
// null/false/0. Strings cross the boundary as nul-terminated UTF-16. Host objects are passed
// as plain addresses.

use crate::logging::{self, LogLevel};
use crate::session::Session;
use crate::unreal::{FName, ObjectFlags, UClass, UFunction, UObject};
use std::ffi::c_void;
use std::ptr;
use widestring::U16CStr;

fn with_session<T>(export: &str, fallback: T, f: impl FnOnce(&Session) -> T) -> T {
    match crate::session() {
        Some(session) => f(&session),
        None => {
            tracing::error!("unreal_hook_{} called before initialization", export);
            fallback
        }
    }
}

/// Borrow a C wide string, None for null.
unsafe fn wide<'a>(text: *const u16) -> Option<&'a U16CStr> {
    (!text.is_null()).then(|| U16CStr::from_ptr_str(text))
}

#[no_mangle]
pub extern "C" fn unreal_hook_is_initialized() -> bool {
    crate::is_initialized()
}

/// Address of `GObjects`, 0 before initialization.
#[no_mangle]
pub extern "C" fn unreal_hook_gobjects() -> usize {
    with_session("gobjects", 0, |s| s.addresses().gobjects)
}

/// Address of `GNames`, 0 before initialization.
#[no_mangle]
pub extern "C" fn unreal_hook_gnames() -> usize {
    with_session("gnames", 0, |s| s.addresses().gnames)
}

/// Find or add a name and store it in `*out`.
///
/// # Safety
/// `out` must be writable and `text` a nul-terminated UTF-16 string.
#[no_mangle]
pub unsafe extern "C" fn unreal_hook_fname_init(
    out: *mut FName,
    text: *const u16,
    number: i32,
) -> bool {
    let Some(text) = wide(text) else {
        return false;
    };
    if out.is_null() {
        return false;
    }
    with_session("fname_init", false, |s| {
        out.write(s.runtime().natives().fname_init(text, number));
        true
    })
}

/// # Safety
/// `frame` must be the live `FFrame*` executing on `object`.
#[no_mangle]
pub unsafe extern "C" fn unreal_hook_fframe_step(frame: usize, object: usize, param: usize) {
    let Some(object) = UObject::from_ptr(object) else {
        return;
    };
    with_session("fframe_step", (), |s| {
        s.runtime().fframe_step(frame, object, param)
    })
}

/// Zeroed memory from the host allocator; null on failure.
#[no_mangle]
pub extern "C" fn unreal_hook_u_malloc(len: usize) -> *mut c_void {
    with_session("u_malloc", ptr::null_mut(), |s| match s.runtime().malloc(len) {
        Ok(p) => p as *mut c_void,
        Err(e) => {
            tracing::error!("u_malloc: {}", e);
            ptr::null_mut()
        }
    })
}

/// Null `ptr` allocates. On failure the old block is left alone and null comes back.
///
/// # Safety
/// `ptr` must be null or come from the host allocator.
#[no_mangle]
pub unsafe extern "C" fn unreal_hook_u_realloc(ptr: *mut c_void, len: usize) -> *mut c_void {
    if ptr.is_null() {
        return unreal_hook_u_malloc(len);
    }
    with_session("u_realloc", ptr::null_mut(), |s| {
        match s.runtime().realloc(ptr as usize, len) {
            Ok(p) => p as *mut c_void,
            Err(e) => {
                tracing::error!("u_realloc: {}", e);
                ptr::null_mut()
            }
        }
    })
}

/// # Safety
/// `ptr` must be null or come from the host allocator, and not be used afterwards.
#[no_mangle]
pub unsafe extern "C" fn unreal_hook_u_free(ptr: *mut c_void) {
    with_session("u_free", (), |s| s.runtime().free(ptr as usize))
}

/// Call `function` on `object` without going through the hook chain.
///
/// # Safety
/// `params` must point to a parameter block laid out for `function`.
#[no_mangle]
pub unsafe extern "C" fn unreal_hook_process_event(
    object: usize,
    function: usize,
    params: *mut c_void,
) -> bool {
    let (Some(object), Some(function)) = (UObject::from_ptr(object), UFunction::from_ptr(function))
    else {
        return false;
    };
    with_session("process_event", false, |s| {
        s.runtime().process_event(object, function, params as usize);
        true
    })
}

/// Construct an object through the host. A null `name` means `None` (host picks one).
///
/// # Safety
/// `name` must be null or point to an `FName`.
#[no_mangle]
pub unsafe extern "C" fn unreal_hook_construct_object(
    class: usize,
    outer: usize,
    name: *const FName,
    flags: u32,
    template: usize,
) -> usize {
    let Some(class) = UClass::from_ptr(class) else {
        return 0;
    };
    let name = name.as_ref().copied().unwrap_or(FName::NONE);
    with_session("construct_object", 0, |s| {
        s.runtime()
            .construct_object(
                class,
                UObject::from_ptr(outer),
                name,
                ObjectFlags::from_bits_retain(flags),
                UObject::from_ptr(template),
            )
            .map_or(0, UObject::addr)
    })
}

/// Object of `class` (or a subclass) with this full path, 0 if there is none.
///
/// # Safety
/// `path` must be a nul-terminated UTF-16 string.
#[no_mangle]
pub unsafe extern "C" fn unreal_hook_find_object(class: usize, path: *const u16) -> usize {
    let (Some(class), Some(path)) = (UClass::from_ptr(class), wide(path)) else {
        return 0;
    };
    let path = path.to_string_lossy();
    with_session("find_object", 0, |s| {
        s.runtime()
            .find_object(class, &path)
            .map_or(0, UObject::addr)
    })
}

/// Full path of `object` as a nul-terminated UTF-16 string from the host allocator. The
/// caller frees it with `unreal_hook_u_free`. `*len` receives the length without the nul.
///
/// # Safety
/// `len` must be null or writable.
#[no_mangle]
pub unsafe extern "C" fn unreal_hook_uobject_path_name(object: usize, len: *mut usize) -> *mut u16 {
    let Some(object) = UObject::from_ptr(object) else {
        return ptr::null_mut();
    };
    with_session("uobject_path_name", ptr::null_mut(), |s| {
        let rt = s.runtime();
        let mut units: Vec<u16> = object.path_name(rt).encode_utf16().collect();
        let count = units.len();
        units.push(0);
        let buffer = match rt.malloc(units.len() * 2) {
            Ok(p) => p as *mut u16,
            Err(e) => {
                tracing::error!("uobject_path_name: {}", e);
                return ptr::null_mut();
            }
        };
        ptr::copy_nonoverlapping(units.as_ptr(), buffer, units.len());
        if !len.is_null() {
            len.write(count);
        }
        buffer
    })
}

/// Print on the in-game console. False when there is none yet or the call failed.
///
/// # Safety
/// `text` must be a nul-terminated UTF-16 string.
#[no_mangle]
pub unsafe extern "C" fn unreal_hook_uconsole_output_text(text: *const u16) -> bool {
    let Some(text) = wide(text) else {
        return false;
    };
    let text = text.to_string_lossy();
    with_session("uconsole_output_text", false, |s| {
        match s.console().output_text(s.runtime(), &text) {
            Ok(sent) => sent,
            Err(e) => {
                tracing::warn!("console output failed: {}", e);
                false
            }
        }
    })
}

#[no_mangle]
pub extern "C" fn unreal_hook_is_console_ready() -> bool {
    with_session("is_console_ready", false, |s| {
        s.console().is_ready(s.runtime())
    })
}

/// Set the minimum level sent to log callbacks and the in-game console. `level` indexes
/// error, warning, info, dev_warning, misc. False for an unknown level or before logging
/// is set up.
#[no_mangle]
pub extern "C" fn unreal_hook_set_console_level(level: u32) -> bool {
    let Some(&level) = LogLevel::ALL.get(level as usize) else {
        tracing::warn!("unknown console level {}", level);
        return false;
    };
    match logging::set_console_level(level) {
        Ok(()) => true,
        Err(e) => {
            tracing::error!("set_console_level: {}", e);
            false
        }
    }
}

/// Initialize for Borderlands 3 against the main module. True once initialized, including
/// when it already was.
#[cfg(windows)]
#[no_mangle]
pub extern "C" fn unreal_hook_init_bl3() -> bool {
    match crate::init(std::sync::Arc::new(crate::game::Bl3)) {
        Ok(_) => true,
        Err(e) => {
            tracing::error!("initialization failed: {}", e);
            false
        }
    }
}
