// persistent.rs - Soft and lazy references (TPersistentObjectPtr).
//
//   FSoftObjectPtr {                     FLazyObjectPtr {
//     FWeakObjectPtr WeakPtr;   // +0x00   FWeakObjectPtr WeakPtr;  // +0x00
//     int32 TagAtLastTest;      // +0x08   int32 TagAtLastTest;     // +0x08
//     FName AssetPathName;      // +0x10   FGuid Guid;              // +0x0C
//     FString SubPathString;    // +0x18 };
//   };
//
// The weak pointer is the live cache; the path or GUID is the stable identity. Reads go
// through the cache only and never load anything.

use super::{object, PropertyDescriptor, PropertyKind, Value};
use crate::error::Result;
use crate::memory;
use crate::unreal::fname::{free_fstring, read_fstring};
use crate::unreal::{FName, FWeakObjectPtr, Runtime, UClass, UObject};

const TAG: usize = 0x08;
const ASSET_PATH: usize = 0x10;
const SUB_PATH: usize = 0x18;
const GUID: usize = 0x0C;

/// `FSoftObjectPath`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SoftObjectPath {
    pub asset_path_name: FName,
    pub sub_path: String,
}

/// `FGuid`
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct FGuid {
    pub a: u32,
    pub b: u32,
    pub c: u32,
    pub d: u32,
}

fn resolve(rt: &Runtime, addr: usize) -> Option<UObject> {
    let weak = unsafe { memory::read::<FWeakObjectPtr>(addr) };
    rt.objects().resolve_weak(&weak)
}

pub(super) fn get(rt: &Runtime, desc: &PropertyDescriptor, addr: usize) -> Value {
    let obj = resolve(rt, addr);
    match desc.kind {
        PropertyKind::SoftClass { .. } => {
            Value::Class(obj.map(|o| UClass::from_addr(o.addr())))
        }
        _ => Value::Object(obj),
    }
}

/// The object `set` would reference for `value`.
pub(super) fn target(
    rt: &Runtime,
    desc: &PropertyDescriptor,
    value: &Value,
) -> Result<Option<UObject>> {
    match (&desc.kind, value) {
        (PropertyKind::SoftClass { meta_class, .. }, Value::Class(cls)) => {
            if let Some(cls) = cls {
                object::check_subclass(rt, desc, *meta_class, *cls)?;
            }
            Ok(cls.map(UClass::as_object))
        }
        (PropertyKind::SoftClass { .. }, other) => Err(desc.mismatch("Class", other)),
        (
            PropertyKind::SoftObject { class } | PropertyKind::LazyObject { class },
            Value::Object(obj),
        ) => {
            if let Some(obj) = obj {
                object::check_instance(rt, desc, *class, *obj)?;
            }
            Ok(*obj)
        }
        (_, other) => Err(desc.mismatch("Object", other)),
    }
}

pub(super) fn set(rt: &Runtime, desc: &PropertyDescriptor, addr: usize, value: &Value) -> Result<()> {
    let target = target(rt, desc, value)?;
    let weak = rt.weak_for(target)?;
    match desc.kind {
        PropertyKind::LazyObject { .. } => unsafe {
            memory::write(addr, weak);
            memory::write(addr + TAG, 0i32);
            memory::write(addr + GUID, FGuid::default());
        },
        _ => {
            let asset = match target {
                Some(obj) => rt.fname(&obj.path_name(rt), 0)?,
                None => FName::NONE,
            };
            unsafe {
                memory::write(addr, weak);
                memory::write(addr + TAG, 0i32);
                memory::write(addr + ASSET_PATH, asset);
                free_fstring(rt, addr + SUB_PATH);
            }
        }
    }
    Ok(())
}

pub(super) fn destroy(rt: &Runtime, addr: usize) {
    unsafe { free_fstring(rt, addr + SUB_PATH) }
}

pub(super) fn soft_path(addr: usize) -> SoftObjectPath {
    SoftObjectPath {
        asset_path_name: unsafe { memory::read(addr + ASSET_PATH) },
        sub_path: unsafe { read_fstring(addr + SUB_PATH) },
    }
}

pub(super) fn lazy_guid(addr: usize) -> FGuid {
    unsafe { memory::read(addr + GUID) }
}
