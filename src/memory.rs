// memory.rs - Low-level access to host memory and the loaded module image.
//
// Everything the reflection layer reads lives in the host's own address space, so reads
// and writes are plain unaligned pointer accesses. Callers are responsible for handing in
// addresses that came from host metadata; nothing here validates them.
//
// The Windows-only helpers locate the main executable image (for the scanner) and the
// directory of this DLL (for the log and config files).

use std::path::PathBuf;

// ============================================================
// Raw Reads / Writes
// ============================================================

/// Read a `T` from an absolute address.
///
/// # Safety
/// `addr` must point to at least `size_of::<T>()` readable bytes holding a valid `T`.
#[inline]
pub unsafe fn read<T: Copy>(addr: usize) -> T {
    std::ptr::read_unaligned(addr as *const T)
}

/// Write a `T` to an absolute address.
///
/// # Safety
/// `addr` must point to at least `size_of::<T>()` writable bytes.
#[inline]
pub unsafe fn write<T: Copy>(addr: usize, value: T) {
    std::ptr::write_unaligned(addr as *mut T, value)
}

/// Read a pointer-sized value.
#[inline]
pub unsafe fn read_ptr(addr: usize) -> usize {
    read::<usize>(addr)
}

/// Zero `len` bytes starting at `addr`.
#[inline]
pub unsafe fn zero(addr: usize, len: usize) {
    if len > 0 {
        std::ptr::write_bytes(addr as *mut u8, 0, len);
    }
}

/// Borrow `len` bytes of host memory as a slice.
///
/// # Safety
/// The range must be readable and must not be mutated while the slice is alive.
#[inline]
pub unsafe fn bytes<'a>(addr: usize, len: usize) -> &'a [u8] {
    std::slice::from_raw_parts(addr as *const u8, len)
}

/// Read a null-terminated ANSI string, stopping after `max_len` bytes.
pub unsafe fn read_cstr(addr: usize, max_len: usize) -> String {
    let mut out = Vec::new();
    for i in 0..max_len {
        let b = read::<u8>(addr + i);
        if b == 0 {
            break;
        }
        out.push(b);
    }
    String::from_utf8_lossy(&out).into_owned()
}

/// Read a null-terminated UTF-16 string, stopping after `max_len` code units.
pub unsafe fn read_wstr(addr: usize, max_len: usize) -> String {
    let mut units = Vec::new();
    for i in 0..max_len {
        let c = read::<u16>(addr + i * 2);
        if c == 0 {
            break;
        }
        units.push(c);
    }
    String::from_utf16_lossy(&units)
}

// ============================================================
// Module Image Location (Windows)
// ============================================================

/// Base address and size of the main executable image.
#[cfg(windows)]
pub fn main_module() -> Option<(usize, usize)> {
    use winapi::um::libloaderapi::GetModuleHandleA;
    use winapi::um::processthreadsapi::GetCurrentProcess;
    use winapi::um::psapi::{GetModuleInformation, MODULEINFO};

    unsafe {
        let h = GetModuleHandleA(std::ptr::null());
        if h.is_null() {
            return None;
        }
        let mut info: MODULEINFO = std::mem::zeroed();
        let ok = GetModuleInformation(
            GetCurrentProcess(),
            h,
            &mut info,
            std::mem::size_of::<MODULEINFO>() as u32,
        );
        if ok == 0 {
            return None;
        }
        Some((info.lpBaseOfDll as usize, info.SizeOfImage as usize))
    }
}

/// Check if a memory range is committed and readable.
#[cfg(windows)]
pub fn is_readable(addr: usize, len: usize) -> bool {
    use winapi::um::memoryapi::VirtualQuery;
    use winapi::um::winnt::{
        MEMORY_BASIC_INFORMATION, MEM_COMMIT, PAGE_EXECUTE_READ, PAGE_EXECUTE_READWRITE,
        PAGE_EXECUTE_WRITECOPY, PAGE_READONLY, PAGE_READWRITE, PAGE_WRITECOPY,
    };

    if addr == 0 || len == 0 {
        return false;
    }
    let readable = PAGE_READONLY
        | PAGE_READWRITE
        | PAGE_WRITECOPY
        | PAGE_EXECUTE_READ
        | PAGE_EXECUTE_READWRITE
        | PAGE_EXECUTE_WRITECOPY;
    unsafe {
        let mut mbi: MEMORY_BASIC_INFORMATION = std::mem::zeroed();
        let ret = VirtualQuery(
            addr as *const _,
            &mut mbi,
            std::mem::size_of::<MEMORY_BASIC_INFORMATION>(),
        );
        if ret == 0 || mbi.State != MEM_COMMIT || mbi.Protect & readable == 0 {
            return false;
        }
        addr + len <= mbi.BaseAddress as usize + mbi.RegionSize
    }
}

/// Directory containing this DLL, used to place the log and config files.
#[cfg(windows)]
pub fn this_module_dir() -> Option<PathBuf> {
    use winapi::shared::minwindef::HMODULE;
    use winapi::um::libloaderapi::{
        GetModuleFileNameW, GetModuleHandleExW, GET_MODULE_HANDLE_EX_FLAG_FROM_ADDRESS,
        GET_MODULE_HANDLE_EX_FLAG_UNCHANGED_REFCOUNT,
    };

    unsafe {
        let mut module: HMODULE = std::ptr::null_mut();
        let anchor = this_module_dir as *const () as *const u16;
        let ok = GetModuleHandleExW(
            GET_MODULE_HANDLE_EX_FLAG_FROM_ADDRESS | GET_MODULE_HANDLE_EX_FLAG_UNCHANGED_REFCOUNT,
            anchor,
            &mut module,
        );
        if ok == 0 {
            return None;
        }
        let mut buf = [0u16; 1024];
        let len = GetModuleFileNameW(module, buf.as_mut_ptr(), buf.len() as u32) as usize;
        if len == 0 {
            return None;
        }
        let path = PathBuf::from(String::from_utf16_lossy(&buf[..len]));
        path.parent().map(|p| p.to_path_buf())
    }
}

/// Outside Windows there is no DLL to anchor to; use the working directory.
#[cfg(not(windows))]
pub fn this_module_dir() -> Option<PathBuf> {
    std::env::current_dir().ok()
}
