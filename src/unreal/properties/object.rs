// object.rs - Hard, weak and interface object references.
//
//   ObjectProperty / ClassProperty  UObject*
//   WeakObjectProperty              FWeakObjectPtr { index, serial }
//   InterfaceProperty               FScriptInterface { UObject* object; void* interface; }
//
// Writes check the class of the new value first and leave the field untouched on mismatch.

use super::{PropertyDescriptor, PropertyKind, Value};
use crate::error::Result;
use crate::memory;
use crate::unreal::{FWeakObjectPtr, Runtime, UClass, UObject};

pub(super) fn get(desc: &PropertyDescriptor, addr: usize) -> Value {
    let ptr = unsafe { memory::read_ptr(addr) };
    match desc.kind {
        PropertyKind::Class { .. } => Value::Class(UClass::from_ptr(ptr)),
        PropertyKind::Interface { .. } => Value::Interface(UObject::from_ptr(ptr)),
        _ => Value::Object(UObject::from_ptr(ptr)),
    }
}

/// Reject `obj` unless its class derives from `required`.
pub(super) fn check_instance(
    rt: &Runtime,
    desc: &PropertyDescriptor,
    required: UClass,
    obj: UObject,
) -> Result<()> {
    let class = obj.class(rt);
    if class.inherits(rt, required) {
        Ok(())
    } else {
        Err(crate::Error::TypeMismatch {
            property: desc.name.clone(),
            expected: format!("instance of {}", required.name(rt)),
            got: class.name(rt),
        })
    }
}

/// Reject `class` unless it derives from `meta_class`.
pub(super) fn check_subclass(
    rt: &Runtime,
    desc: &PropertyDescriptor,
    meta_class: UClass,
    class: UClass,
) -> Result<()> {
    if class.inherits(rt, meta_class) {
        Ok(())
    } else {
        Err(crate::Error::TypeMismatch {
            property: desc.name.clone(),
            expected: format!("subclass of {}", meta_class.name(rt)),
            got: class.name(rt),
        })
    }
}

/// The pointer `set` would store for `value`.
pub(super) fn target(rt: &Runtime, desc: &PropertyDescriptor, value: &Value) -> Result<usize> {
    match (&desc.kind, value) {
        (PropertyKind::Object { class }, Value::Object(obj)) => {
            if let Some(obj) = obj {
                check_instance(rt, desc, *class, *obj)?;
            }
            Ok(obj.map_or(0, UObject::addr))
        }
        (PropertyKind::Class { meta_class, .. }, Value::Class(cls)) => {
            if let Some(cls) = cls {
                check_subclass(rt, desc, *meta_class, *cls)?;
            }
            Ok(cls.map_or(0, UClass::addr))
        }
        (PropertyKind::Class { .. }, other) => Err(desc.mismatch("Class", other)),
        (_, other) => Err(desc.mismatch("Object", other)),
    }
}

pub(super) fn set(rt: &Runtime, desc: &PropertyDescriptor, addr: usize, value: &Value) -> Result<()> {
    let ptr = target(rt, desc, value)?;
    unsafe { memory::write(addr, ptr) };
    Ok(())
}

/// The `(object, interface)` pair `set_interface` would store for `value`.
pub(super) fn interface_target(
    rt: &Runtime,
    desc: &PropertyDescriptor,
    interface: UClass,
    value: &Value,
) -> Result<(usize, usize)> {
    let Value::Interface(obj) = value else {
        return Err(desc.mismatch("Interface", value));
    };
    match obj {
        None => Ok((0, 0)),
        Some(obj) => {
            let class = obj.class(rt);
            // Interfaces are inherited, so look through the supers too
            let record = std::iter::successors(Some(class), |c| c.super_class(rt))
                .find_map(|c| c.implements(rt, interface))
                .ok_or_else(|| crate::Error::TypeMismatch {
                    property: desc.name.clone(),
                    expected: format!("implementor of {}", interface.name(rt)),
                    got: class.name(rt),
                })?;
            let offset = record.pointer_offset as isize;
            Ok((obj.addr(), obj.addr().wrapping_add_signed(offset)))
        }
    }
}

pub(super) fn set_interface(
    rt: &Runtime,
    desc: &PropertyDescriptor,
    interface: UClass,
    addr: usize,
    value: &Value,
) -> Result<()> {
    let (object, iface) = interface_target(rt, desc, interface, value)?;
    unsafe {
        memory::write(addr, object);
        memory::write(addr + 8, iface);
    }
    Ok(())
}

pub(super) fn get_weak(rt: &Runtime, addr: usize) -> Value {
    let weak = unsafe { memory::read::<FWeakObjectPtr>(addr) };
    Value::Object(rt.objects().resolve_weak(&weak))
}

/// The object `set_weak` would point at.
pub(super) fn weak_target(
    rt: &Runtime,
    desc: &PropertyDescriptor,
    class: UClass,
    value: &Value,
) -> Result<Option<UObject>> {
    let Value::Object(obj) = value else {
        return Err(desc.mismatch("Object", value));
    };
    if let Some(obj) = obj {
        check_instance(rt, desc, class, *obj)?;
    }
    Ok(*obj)
}

pub(super) fn set_weak(
    rt: &Runtime,
    desc: &PropertyDescriptor,
    class: UClass,
    addr: usize,
    value: &Value,
) -> Result<()> {
    let obj = weak_target(rt, desc, class, value)?;
    let weak = rt.weak_for(obj)?;
    unsafe { memory::write(addr, weak) };
    Ok(())
}
