// string.rs - `FString` fields. The buffer belongs to the field and comes from GMalloc.

use super::{PropertyDescriptor, Value};
use crate::error::Result;
use crate::unreal::fname::{alloc_fstring, free_fstring, read_fstring};
use crate::unreal::Runtime;

pub(super) fn get(addr: usize) -> Value {
    Value::Str(unsafe { read_fstring(addr) })
}

pub(super) fn set(rt: &Runtime, desc: &PropertyDescriptor, addr: usize, value: &Value) -> Result<()> {
    let Value::Str(text) = value else {
        return Err(desc.mismatch("Str", value));
    };
    // Allocate first so a failed allocation leaves the old string in place
    let fresh = alloc_fstring(rt, text)?;
    unsafe {
        free_fstring(rt, addr);
        fresh.write(addr);
    }
    Ok(())
}

pub(super) fn destroy(rt: &Runtime, addr: usize) {
    unsafe { free_fstring(rt, addr) }
}
