// scalar.rs - Fixed-width numbers, bools, names and enums.

use super::{PropertyDescriptor, PropertyKind, Value};
use crate::error::{Error, Result};
use crate::memory;
use crate::unreal::{FName, Runtime, TArray, UObject};

/// Size of one `TPair<FName, int64>` in `UEnum::Names`
const ENUM_ENTRY_SIZE: usize = 0x10;

pub(super) fn get(desc: &PropertyDescriptor, addr: usize) -> Result<Value> {
    unsafe {
        Ok(match &desc.kind {
            PropertyKind::Int8 => Value::Int8(memory::read(addr)),
            PropertyKind::Int16 => Value::Int16(memory::read(addr)),
            PropertyKind::Int => Value::Int(memory::read(addr)),
            PropertyKind::Int64 => Value::Int64(memory::read(addr)),
            PropertyKind::Byte { .. } => Value::Byte(memory::read(addr)),
            PropertyKind::UInt16 => Value::UInt16(memory::read(addr)),
            PropertyKind::UInt32 => Value::UInt32(memory::read(addr)),
            PropertyKind::UInt64 => Value::UInt64(memory::read(addr)),
            PropertyKind::Float => Value::Float(memory::read(addr)),
            PropertyKind::Double => Value::Double(memory::read(addr)),
            PropertyKind::Name => Value::Name(memory::read::<FName>(addr)),
            PropertyKind::Bool(layout) => {
                let byte = memory::read::<u8>(addr + layout.byte_offset as usize);
                Value::Bool(byte & layout.field_mask != 0)
            }
            other => {
                return Err(Error::UnsupportedProperty(format!(
                    "{} is not a scalar ({:?})",
                    desc.name, other
                )))
            }
        })
    }
}

/// Whether `set` would take `value`.
pub(super) fn check(desc: &PropertyDescriptor, value: &Value) -> Result<()> {
    let fits = matches!(
        (&desc.kind, value),
        (PropertyKind::Int8, Value::Int8(_))
            | (PropertyKind::Int16, Value::Int16(_))
            | (PropertyKind::Int, Value::Int(_))
            | (PropertyKind::Int64, Value::Int64(_))
            | (PropertyKind::Byte { .. }, Value::Byte(_))
            | (PropertyKind::UInt16, Value::UInt16(_))
            | (PropertyKind::UInt32, Value::UInt32(_))
            | (PropertyKind::UInt64, Value::UInt64(_))
            | (PropertyKind::Float, Value::Float(_))
            | (PropertyKind::Double, Value::Double(_))
            | (PropertyKind::Name, Value::Name(_))
            | (PropertyKind::Bool(_), Value::Bool(_))
    );
    if fits {
        Ok(())
    } else {
        Err(desc.mismatch(kind_name(&desc.kind), value))
    }
}

pub(super) fn set(desc: &PropertyDescriptor, addr: usize, value: &Value) -> Result<()> {
    unsafe {
        match (&desc.kind, value) {
            (PropertyKind::Int8, Value::Int8(v)) => memory::write(addr, *v),
            (PropertyKind::Int16, Value::Int16(v)) => memory::write(addr, *v),
            (PropertyKind::Int, Value::Int(v)) => memory::write(addr, *v),
            (PropertyKind::Int64, Value::Int64(v)) => memory::write(addr, *v),
            (PropertyKind::Byte { .. }, Value::Byte(v)) => memory::write(addr, *v),
            (PropertyKind::UInt16, Value::UInt16(v)) => memory::write(addr, *v),
            (PropertyKind::UInt32, Value::UInt32(v)) => memory::write(addr, *v),
            (PropertyKind::UInt64, Value::UInt64(v)) => memory::write(addr, *v),
            (PropertyKind::Float, Value::Float(v)) => memory::write(addr, *v),
            (PropertyKind::Double, Value::Double(v)) => memory::write(addr, *v),
            (PropertyKind::Name, Value::Name(v)) => memory::write(addr, *v),
            (PropertyKind::Bool(layout), Value::Bool(v)) => {
                let at = addr + layout.byte_offset as usize;
                let byte = memory::read::<u8>(at) & !layout.field_mask;
                memory::write(at, if *v { byte | layout.byte_mask } else { byte });
            }
            (kind, other) => return Err(desc.mismatch(kind_name(kind), other)),
        }
    }
    Ok(())
}

fn kind_name(kind: &PropertyKind) -> &'static str {
    match kind {
        PropertyKind::Int8 => "Int8",
        PropertyKind::Int16 => "Int16",
        PropertyKind::Int => "Int",
        PropertyKind::Int64 => "Int64",
        PropertyKind::Byte { .. } => "Byte",
        PropertyKind::UInt16 => "UInt16",
        PropertyKind::UInt32 => "UInt32",
        PropertyKind::UInt64 => "UInt64",
        PropertyKind::Float => "Float",
        PropertyKind::Double => "Double",
        PropertyKind::Name => "Name",
        PropertyKind::Bool(_) => "Bool",
        _ => "scalar",
    }
}

// ============================================================
// Enums
// ============================================================

/// `(name, value)` pairs declared by a `UEnum`.
pub fn enum_entries(rt: &Runtime, enumeration: UObject) -> Vec<(String, i64)> {
    let arr = unsafe { TArray::read(enumeration.addr() + rt.offsets().enum_names) };
    if arr.data == 0 {
        return Vec::new();
    }
    (0..arr.len())
        .map(|i| {
            let entry = arr.data + i * ENUM_ENTRY_SIZE;
            let name = unsafe { memory::read::<FName>(entry) };
            let value = unsafe { memory::read::<i64>(entry + 8) };
            (name.resolve(rt).unwrap_or_default(), value)
        })
        .collect()
}

pub(super) fn get_enum(
    rt: &Runtime,
    underlying: &PropertyDescriptor,
    addr: usize,
) -> Result<Value> {
    let raw = super::get(rt, underlying, addr)?;
    match raw {
        // Stored bit pattern, reinterpreted
        Value::UInt64(v) => Ok(Value::Enum(v as i64)),
        other => other
            .as_i64()
            .map(Value::Enum)
            .ok_or_else(|| Error::UnsupportedProperty(format!("enum over {}", other.type_name()))),
    }
}

/// Narrow `v` into the underlying property's integer kind.
fn narrow(kind: &PropertyKind, v: i64) -> Option<Value> {
    Some(match kind {
        PropertyKind::Int8 => Value::Int8(i8::try_from(v).ok()?),
        PropertyKind::Int16 => Value::Int16(i16::try_from(v).ok()?),
        PropertyKind::Int => Value::Int(i32::try_from(v).ok()?),
        PropertyKind::Int64 => Value::Int64(v),
        PropertyKind::Byte { .. } => Value::Byte(u8::try_from(v).ok()?),
        PropertyKind::UInt16 => Value::UInt16(u16::try_from(v).ok()?),
        PropertyKind::UInt32 => Value::UInt32(u32::try_from(v).ok()?),
        PropertyKind::UInt64 => Value::UInt64(v as u64),
        _ => return None,
    })
}

/// The underlying integer `set_enum` would store for `value`.
pub(super) fn enum_raw(
    rt: &Runtime,
    desc: &PropertyDescriptor,
    underlying: &PropertyDescriptor,
    enumeration: UObject,
    value: &Value,
) -> Result<Value> {
    let Value::Enum(v) = value else {
        return Err(desc.mismatch("Enum", value));
    };
    let declared = enum_entries(rt, enumeration);
    if !declared.is_empty() && !declared.iter().any(|(_, d)| d == v) {
        return Err(Error::TypeMismatch {
            property: desc.name.clone(),
            expected: format!("a value of {}", enumeration.name(rt)),
            got: v.to_string(),
        });
    }
    narrow(&underlying.kind, *v).ok_or_else(|| Error::TypeMismatch {
        property: desc.name.clone(),
        expected: format!("a value fitting {}", kind_name(&underlying.kind)),
        got: v.to_string(),
    })
}

pub(super) fn set_enum(
    rt: &Runtime,
    desc: &PropertyDescriptor,
    underlying: &PropertyDescriptor,
    enumeration: UObject,
    addr: usize,
    value: &Value,
) -> Result<()> {
    let raw = enum_raw(rt, desc, underlying, enumeration, value)?;
    super::set(rt, underlying, addr, &raw)
}
