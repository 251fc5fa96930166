// container.rs - Struct and dynamic array fields.
//
// A struct value is every property of the struct, read at the field address. An array is a
// TArray whose elements are laid out back to back, `inner.element_size` apart; the backing
// buffer is owned by the field and comes from GMalloc.

use super::{PropertyDescriptor, Value};
use crate::error::{Error, Result};
use crate::unreal::{Runtime, TArray, UStruct};

pub(super) fn get_struct(
    rt: &Runtime,
    inner: UStruct,
    addr: usize,
) -> Result<Value> {
    inner
        .properties(rt)
        .map(|prop| {
            let desc = PropertyDescriptor::read(rt, prop)?;
            let value = super::get_all(rt, &desc, addr)?;
            Ok((desc.name, value))
        })
        .collect::<Result<Vec<_>>>()
        .map(Value::Struct)
}

pub(super) fn check_struct(
    rt: &Runtime,
    desc: &PropertyDescriptor,
    inner: UStruct,
    value: &Value,
) -> Result<()> {
    let Value::Struct(fields) = value else {
        return Err(desc.mismatch(format!("Struct {}", inner.name(rt)), value));
    };
    for (name, field) in fields {
        super::check_all(rt, &inner.descriptor(rt, name)?, field)?;
    }
    Ok(())
}

/// Write the named fields; fields not mentioned keep their value. Nothing is written
/// unless every field is accepted.
pub(super) fn set_struct(
    rt: &Runtime,
    desc: &PropertyDescriptor,
    inner: UStruct,
    addr: usize,
    value: &Value,
) -> Result<()> {
    check_struct(rt, desc, inner, value)?;
    let Value::Struct(fields) = value else {
        return Ok(());
    };
    for (name, field) in fields {
        inner.set_field(rt, addr, name, field)?;
    }
    Ok(())
}

pub(super) fn destroy_struct(rt: &Runtime, inner: UStruct, addr: usize) -> Result<()> {
    for prop in inner.properties(rt) {
        let desc = PropertyDescriptor::read(rt, prop)?;
        super::destroy_all(rt, &desc, addr)?;
    }
    Ok(())
}

pub(super) fn get_array(
    rt: &Runtime,
    inner: &PropertyDescriptor,
    addr: usize,
) -> Result<Value> {
    let arr = unsafe { TArray::read(addr) };
    if arr.data == 0 {
        return Ok(Value::Array(Vec::new()));
    }
    (0..arr.len())
        .map(|i| super::get(rt, inner, arr.data + i * inner.element_size))
        .collect::<Result<Vec<_>>>()
        .map(Value::Array)
}

fn element_error(desc: &PropertyDescriptor, index: usize, e: Error) -> Error {
    match e {
        Error::TypeMismatch { expected, got, .. } => Error::TypeMismatch {
            property: format!("{}[{}]", desc.name, index),
            expected,
            got,
        },
        other => other,
    }
}

pub(super) fn check_array(
    rt: &Runtime,
    desc: &PropertyDescriptor,
    inner: &PropertyDescriptor,
    value: &Value,
) -> Result<()> {
    let Value::Array(items) = value else {
        return Err(desc.mismatch("Array", value));
    };
    for (i, item) in items.iter().enumerate() {
        super::check(rt, inner, item).map_err(|e| element_error(desc, i, e))?;
    }
    Ok(())
}

/// Replace the whole array: old elements destroyed, buffer resized, new elements written
/// into zeroed memory. A rejected element leaves the old array untouched.
pub(super) fn set_array(
    rt: &Runtime,
    desc: &PropertyDescriptor,
    inner: &PropertyDescriptor,
    addr: usize,
    value: &Value,
) -> Result<()> {
    check_array(rt, desc, inner, value)?;
    let Value::Array(items) = value else {
        return Ok(());
    };
    let mut arr = unsafe { TArray::read(addr) };
    destroy_elements(rt, inner, &arr)?;

    if items.is_empty() {
        if arr.data != 0 {
            rt.free(arr.data);
        }
        unsafe { TArray::default().write(addr) };
        return Ok(());
    }

    let bytes = items.len() * inner.element_size;
    arr.data = if arr.data == 0 {
        rt.malloc(bytes)?
    } else {
        rt.realloc(arr.data, bytes)?
    };
    arr.count = items.len() as i32;
    arr.max = items.len() as i32;
    unsafe {
        crate::memory::zero(arr.data, bytes);
        arr.write(addr);
    }

    for (i, item) in items.iter().enumerate() {
        super::set(rt, inner, arr.data + i * inner.element_size, item)
            .map_err(|e| element_error(desc, i, e))?;
    }
    Ok(())
}

fn destroy_elements(rt: &Runtime, inner: &PropertyDescriptor, arr: &TArray) -> Result<()> {
    if arr.data == 0 {
        return Ok(());
    }
    for i in 0..arr.len() {
        super::destroy(rt, inner, arr.data + i * inner.element_size)?;
    }
    Ok(())
}

pub(super) fn destroy_array(rt: &Runtime, inner: &PropertyDescriptor, addr: usize) -> Result<()> {
    let arr = unsafe { TArray::read(addr) };
    destroy_elements(rt, inner, &arr)?;
    if arr.data != 0 {
        rt.free(arr.data);
    }
    unsafe { TArray::default().write(addr) };
    Ok(())
}
