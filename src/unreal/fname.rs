// fname.rs - Name handles and the engine's dynamic array / string layouts.

use crate::error::{Error, Result};
use crate::memory;
use crate::unreal::Runtime;

/// Interned name: an index into GNames plus a disambiguation number.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct FName {
    pub index: i32,
    pub number: i32,
}

impl FName {
    /// `None`, always entry 0
    pub const NONE: FName = FName { index: 0, number: 0 };

    pub const fn new(index: i32, number: i32) -> Self {
        Self { index, number }
    }

    pub fn is_none(&self) -> bool {
        self.index == 0
    }

    /// Display form: the entry string, plus `_{number - 1}` when numbered.
    pub fn resolve(&self, rt: &Runtime) -> Result<String> {
        let index = usize::try_from(self.index).map_err(|_| Error::OutOfRange {
            table: "GNames",
            index: self.index as usize,
            size: rt.names().size(),
        })?;
        let base = match rt.names().at(index)? {
            Some(entry) => entry.to_string(),
            None => String::from("None"),
        };
        Ok(if self.number > 0 {
            format!("{}_{}", base, self.number - 1)
        } else {
            base
        })
    }
}

// ============================================================
// TArray / FString
// ============================================================

/// `TArray<T>` header: data pointer, live count, capacity.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TArray {
    pub data: usize,
    pub count: i32,
    pub max: i32,
}

impl TArray {
    pub unsafe fn read(addr: usize) -> Self {
        memory::read(addr)
    }

    pub unsafe fn write(&self, addr: usize) {
        memory::write(addr, *self)
    }

    pub fn len(&self) -> usize {
        self.count.max(0) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Read an `FString` (`TArray<u16>`, count includes the terminator).
pub unsafe fn read_fstring(addr: usize) -> String {
    let arr = TArray::read(addr);
    if arr.data == 0 || arr.count <= 1 {
        return String::new();
    }
    let units = std::slice::from_raw_parts(arr.data as *const u16, arr.len() - 1);
    String::from_utf16_lossy(units)
}

/// Allocate an `FString` for `text` through the host allocator.
pub fn alloc_fstring(rt: &Runtime, text: &str) -> Result<TArray> {
    if text.is_empty() {
        return Ok(TArray::default());
    }
    let mut units: Vec<u16> = text.encode_utf16().collect();
    units.push(0);
    let bytes = units.len() * 2;
    let data = rt.malloc(bytes)?;
    unsafe {
        std::ptr::copy_nonoverlapping(units.as_ptr(), data as *mut u16, units.len());
    }
    Ok(TArray {
        data,
        count: units.len() as i32,
        max: units.len() as i32,
    })
}

/// Release the buffer of the `FString` at `addr` and reset it to empty.
pub unsafe fn free_fstring(rt: &Runtime, addr: usize) {
    let arr = TArray::read(addr);
    if arr.data != 0 {
        rt.free(arr.data);
    }
    TArray::default().write(addr);
}
