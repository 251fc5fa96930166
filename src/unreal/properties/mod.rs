// properties/mod.rs - Property descriptors and kind-dispatched get/set/destroy.
//
// A property is (offset, element size, array dim, kind). The kind is read from the name of
// the property's class (IntProperty, ArrayProperty, ...) together with whatever payload that
// kind carries after the common UProperty fields. All the decode/encode knowledge lives in
// the per-kind submodules; this file only routes to them.
//
// Flow:
//   PropertyDescriptor::read(rt, prop) -> kind + payload from host metadata
//   get(rt, desc, addr)                -> Value
//   set(rt, desc, addr, &Value)        -> frees whatever the old value owned first
//   destroy(rt, desc, addr)            -> frees owned buffers, leaves the slot zeroed

mod container;
mod object;
mod persistent;
mod scalar;
mod string;

pub use persistent::{FGuid, SoftObjectPath};
pub use scalar::enum_entries;

use crate::error::{Error, Result};
use crate::memory;
use crate::unreal::object::address_type;
use crate::unreal::{FName, Runtime, UClass, UObject, UStruct};
use bitflags::bitflags;

address_type!(
    /// `UProperty`
    UProperty
);

bitflags! {
    /// `EPropertyFlags`
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct PropertyFlags: u64 {
        const EDIT = 0x0000_0000_0000_0001;
        const CONST_PARM = 0x0000_0000_0000_0002;
        const BLUEPRINT_VISIBLE = 0x0000_0000_0000_0004;
        const EXPORT_OBJECT = 0x0000_0000_0000_0008;
        const BLUEPRINT_READ_ONLY = 0x0000_0000_0000_0010;
        const NET = 0x0000_0000_0000_0020;
        const PARM = 0x0000_0000_0000_0080;
        const OUT_PARM = 0x0000_0000_0000_0100;
        const RETURN_PARM = 0x0000_0000_0000_0400;
        const TRANSIENT = 0x0000_0000_0000_2000;
        const CONFIG = 0x0000_0000_0000_4000;
        const _ = !0;
    }
}

impl UProperty {
    pub fn as_object(self) -> UObject {
        UObject::from_addr(self.0)
    }

    pub fn name(self, rt: &Runtime) -> String {
        self.as_object().name(rt)
    }

    /// The property's class, which names its kind.
    pub fn class(self, rt: &Runtime) -> UClass {
        self.as_object().class(rt)
    }

    pub fn offset(self, rt: &Runtime) -> usize {
        let v = unsafe { memory::read::<i32>(self.0 + rt.offsets().property_offset) };
        v.max(0) as usize
    }

    pub fn element_size(self, rt: &Runtime) -> usize {
        let v = unsafe { memory::read::<i32>(self.0 + rt.offsets().property_element_size) };
        v.max(0) as usize
    }

    pub fn array_dim(self, rt: &Runtime) -> usize {
        let v = unsafe { memory::read::<i32>(self.0 + rt.offsets().property_array_dim) };
        v.max(1) as usize
    }

    pub fn flags(self, rt: &Runtime) -> PropertyFlags {
        PropertyFlags::from_bits_retain(unsafe {
            memory::read::<u64>(self.0 + rt.offsets().property_flags)
        })
    }

    pub fn link_next(self, rt: &Runtime) -> Option<UProperty> {
        UProperty::from_ptr(unsafe { memory::read_ptr(self.0 + rt.offsets().property_link_next) })
    }

    /// Address of a kind-specific field, `offset` bytes into the payload.
    fn payload(self, rt: &Runtime, offset: usize) -> usize {
        self.0 + rt.offsets().property_payload + offset
    }

    fn payload_ptr(self, rt: &Runtime, offset: usize) -> usize {
        unsafe { memory::read_ptr(self.payload(rt, offset)) }
    }
}

// ============================================================
// Kinds
// ============================================================

/// Bit-field layout of a `BoolProperty`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoolLayout {
    pub field_size: u8,
    pub byte_offset: u8,
    pub byte_mask: u8,
    pub field_mask: u8,
}

/// Decoded property kind, with the payload each kind needs.
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyKind {
    Int8,
    Int16,
    Int,
    Int64,
    /// Optionally tagged with a `UEnum`
    Byte { enumeration: Option<UObject> },
    UInt16,
    UInt32,
    UInt64,
    Float,
    Double,
    Bool(BoolLayout),
    Name,
    Str,
    Object { class: UClass },
    Class { class: UClass, meta_class: UClass },
    WeakObject { class: UClass },
    LazyObject { class: UClass },
    SoftObject { class: UClass },
    SoftClass { class: UClass, meta_class: UClass },
    Interface { class: UClass },
    Struct { inner: UStruct },
    Array { inner: Box<PropertyDescriptor> },
    Enum { underlying: Box<PropertyDescriptor>, enumeration: UObject },
}

impl PropertyKind {
    fn class_of(rt: &Runtime, prop: UProperty, offset: usize, what: &str) -> Result<UClass> {
        UClass::from_ptr(prop.payload_ptr(rt, offset)).ok_or_else(|| {
            Error::UnsupportedProperty(format!("{} with null {}", prop.name(rt), what))
        })
    }

    /// Decode the kind of `prop` from its class name and payload.
    fn read(rt: &Runtime, prop: UProperty) -> Result<Self> {
        let class_name = prop.class(rt).name(rt);
        Ok(match class_name.as_str() {
            "Int8Property" => Self::Int8,
            "Int16Property" => Self::Int16,
            "IntProperty" => Self::Int,
            "Int64Property" => Self::Int64,
            "ByteProperty" => Self::Byte {
                enumeration: UObject::from_ptr(prop.payload_ptr(rt, 0)),
            },
            "UInt16Property" => Self::UInt16,
            "UInt32Property" => Self::UInt32,
            "UInt64Property" => Self::UInt64,
            "FloatProperty" => Self::Float,
            "DoubleProperty" => Self::Double,
            "BoolProperty" => {
                let at = |i| unsafe { memory::read::<u8>(prop.payload(rt, i)) };
                Self::Bool(BoolLayout {
                    field_size: at(0),
                    byte_offset: at(1),
                    byte_mask: at(2),
                    field_mask: at(3),
                })
            }
            "NameProperty" => Self::Name,
            "StrProperty" => Self::Str,
            "ObjectProperty" => Self::Object {
                class: Self::class_of(rt, prop, 0, "property class")?,
            },
            "ClassProperty" => Self::Class {
                class: Self::class_of(rt, prop, 0, "property class")?,
                meta_class: Self::class_of(rt, prop, 8, "meta class")?,
            },
            "WeakObjectProperty" => Self::WeakObject {
                class: Self::class_of(rt, prop, 0, "property class")?,
            },
            "LazyObjectProperty" => Self::LazyObject {
                class: Self::class_of(rt, prop, 0, "property class")?,
            },
            "SoftObjectProperty" => Self::SoftObject {
                class: Self::class_of(rt, prop, 0, "property class")?,
            },
            "SoftClassProperty" => Self::SoftClass {
                class: Self::class_of(rt, prop, 0, "property class")?,
                meta_class: Self::class_of(rt, prop, 8, "meta class")?,
            },
            "InterfaceProperty" => Self::Interface {
                class: Self::class_of(rt, prop, 0, "interface class")?,
            },
            "StructProperty" => Self::Struct {
                inner: UStruct::from_ptr(prop.payload_ptr(rt, 0)).ok_or_else(|| {
                    Error::UnsupportedProperty(format!("{} with null struct", prop.name(rt)))
                })?,
            },
            "ArrayProperty" => {
                let inner = UProperty::from_ptr(prop.payload_ptr(rt, 0)).ok_or_else(|| {
                    Error::UnsupportedProperty(format!("{} with null inner", prop.name(rt)))
                })?;
                Self::Array {
                    inner: Box::new(PropertyDescriptor::read(rt, inner)?),
                }
            }
            "EnumProperty" => {
                let underlying = UProperty::from_ptr(prop.payload_ptr(rt, 0)).ok_or_else(|| {
                    Error::UnsupportedProperty(format!("{} with null underlying", prop.name(rt)))
                })?;
                let enumeration = UObject::from_ptr(prop.payload_ptr(rt, 8)).ok_or_else(|| {
                    Error::UnsupportedProperty(format!("{} with null enum", prop.name(rt)))
                })?;
                Self::Enum {
                    underlying: Box::new(PropertyDescriptor::read(rt, underlying)?),
                    enumeration,
                }
            }
            other => return Err(Error::UnsupportedProperty(other.to_string())),
        })
    }
}

/// Everything needed to decode one property without touching its metadata again.
#[derive(Debug, Clone, PartialEq)]
pub struct PropertyDescriptor {
    pub property: UProperty,
    pub name: String,
    pub offset: usize,
    pub element_size: usize,
    pub array_dim: usize,
    pub flags: PropertyFlags,
    pub kind: PropertyKind,
}

impl PropertyDescriptor {
    pub fn read(rt: &Runtime, prop: UProperty) -> Result<Self> {
        Ok(Self {
            property: prop,
            name: prop.name(rt),
            offset: prop.offset(rt),
            element_size: prop.element_size(rt),
            array_dim: prop.array_dim(rt),
            flags: prop.flags(rt),
            kind: PropertyKind::read(rt, prop)?,
        })
    }

    /// Address of element `index` of this field in the container at `base`.
    pub fn element_address(&self, base: usize, index: usize) -> Result<usize> {
        if index >= self.array_dim {
            return Err(Error::OutOfRange {
                table: "fixed array",
                index,
                size: self.array_dim,
            });
        }
        Ok(base + self.offset + index * self.element_size)
    }

    fn mismatch(&self, expected: impl Into<String>, got: &Value) -> Error {
        Error::TypeMismatch {
            property: self.name.clone(),
            expected: expected.into(),
            got: got.type_name().to_string(),
        }
    }
}

// ============================================================
// Values
// ============================================================

/// A decoded property value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Int8(i8),
    Int16(i16),
    Int(i32),
    Int64(i64),
    Byte(u8),
    UInt16(u16),
    UInt32(u32),
    UInt64(u64),
    Float(f32),
    Double(f64),
    Bool(bool),
    Name(FName),
    Str(String),
    /// Object, weak, lazy and soft object references
    Object(Option<UObject>),
    /// Class and soft class references
    Class(Option<UClass>),
    Interface(Option<UObject>),
    /// Fields in property-link order
    Struct(Vec<(String, Value)>),
    /// Dynamic arrays, and fixed arrays read whole
    Array(Vec<Value>),
    Enum(i64),
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Int8(_) => "Int8",
            Value::Int16(_) => "Int16",
            Value::Int(_) => "Int",
            Value::Int64(_) => "Int64",
            Value::Byte(_) => "Byte",
            Value::UInt16(_) => "UInt16",
            Value::UInt32(_) => "UInt32",
            Value::UInt64(_) => "UInt64",
            Value::Float(_) => "Float",
            Value::Double(_) => "Double",
            Value::Bool(_) => "Bool",
            Value::Name(_) => "Name",
            Value::Str(_) => "Str",
            Value::Object(_) => "Object",
            Value::Class(_) => "Class",
            Value::Interface(_) => "Interface",
            Value::Struct(_) => "Struct",
            Value::Array(_) => "Array",
            Value::Enum(_) => "Enum",
        }
    }

    /// Integer payload widened to i64, for the signed and small unsigned kinds.
    pub fn as_i64(&self) -> Option<i64> {
        Some(match *self {
            Value::Int8(v) => v as i64,
            Value::Int16(v) => v as i64,
            Value::Int(v) => v as i64,
            Value::Int64(v) => v,
            Value::Byte(v) => v as i64,
            Value::UInt16(v) => v as i64,
            Value::UInt32(v) => v as i64,
            Value::UInt64(v) => i64::try_from(v).ok()?,
            Value::Enum(v) => v,
            _ => return None,
        })
    }
}

/// Stable identity behind an indirect reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Identifier {
    Soft(SoftObjectPath),
    Lazy(FGuid),
}

// ============================================================
// Dispatch
// ============================================================

/// Decode the element at `addr`. Soft and lazy references resolve through the weak pointer
/// stored in the field itself, so no owning object is needed.
pub fn get(rt: &Runtime, desc: &PropertyDescriptor, addr: usize) -> Result<Value> {
    match &desc.kind {
        PropertyKind::Str => Ok(string::get(addr)),
        PropertyKind::Object { .. } | PropertyKind::Class { .. } | PropertyKind::Interface { .. } => {
            Ok(object::get(desc, addr))
        }
        PropertyKind::WeakObject { .. } => Ok(object::get_weak(rt, addr)),
        PropertyKind::LazyObject { .. }
        | PropertyKind::SoftObject { .. }
        | PropertyKind::SoftClass { .. } => Ok(persistent::get(rt, desc, addr)),
        PropertyKind::Struct { inner } => container::get_struct(rt, *inner, addr),
        PropertyKind::Array { inner } => container::get_array(rt, inner, addr),
        PropertyKind::Enum { underlying, .. } => scalar::get_enum(rt, underlying, addr),
        _ => scalar::get(desc, addr),
    }
}

/// Encode `value` into the element at `addr`, releasing what the old value owned.
pub fn set(rt: &Runtime, desc: &PropertyDescriptor, addr: usize, value: &Value) -> Result<()> {
    match &desc.kind {
        PropertyKind::Str => string::set(rt, desc, addr, value),
        PropertyKind::Object { .. } | PropertyKind::Class { .. } => {
            object::set(rt, desc, addr, value)
        }
        PropertyKind::Interface { class } => object::set_interface(rt, desc, *class, addr, value),
        PropertyKind::WeakObject { class } => object::set_weak(rt, desc, *class, addr, value),
        PropertyKind::LazyObject { .. }
        | PropertyKind::SoftObject { .. }
        | PropertyKind::SoftClass { .. } => persistent::set(rt, desc, addr, value),
        PropertyKind::Struct { inner } => container::set_struct(rt, desc, *inner, addr, value),
        PropertyKind::Array { inner } => container::set_array(rt, desc, inner, addr, value),
        PropertyKind::Enum {
            underlying,
            enumeration,
        } => scalar::set_enum(rt, desc, underlying, *enumeration, addr, value),
        _ => scalar::set(desc, addr, value),
    }
}

/// Whether `set` would accept `value`. Writes nothing.
pub fn check(rt: &Runtime, desc: &PropertyDescriptor, value: &Value) -> Result<()> {
    match &desc.kind {
        PropertyKind::Str => match value {
            Value::Str(_) => Ok(()),
            other => Err(desc.mismatch("Str", other)),
        },
        PropertyKind::Object { .. } | PropertyKind::Class { .. } => {
            object::target(rt, desc, value).map(drop)
        }
        PropertyKind::Interface { class } => {
            object::interface_target(rt, desc, *class, value).map(drop)
        }
        PropertyKind::WeakObject { class } => object::weak_target(rt, desc, *class, value).map(drop),
        PropertyKind::LazyObject { .. }
        | PropertyKind::SoftObject { .. }
        | PropertyKind::SoftClass { .. } => persistent::target(rt, desc, value).map(drop),
        PropertyKind::Struct { inner } => container::check_struct(rt, desc, *inner, value),
        PropertyKind::Array { inner } => container::check_array(rt, desc, inner, value),
        PropertyKind::Enum {
            underlying,
            enumeration,
        } => scalar::enum_raw(rt, desc, underlying, *enumeration, value).map(drop),
        _ => scalar::check(desc, value),
    }
}

/// Release whatever the element at `addr` owns. The slot itself stays with its container.
pub fn destroy(rt: &Runtime, desc: &PropertyDescriptor, addr: usize) -> Result<()> {
    match &desc.kind {
        PropertyKind::Str => string::destroy(rt, addr),
        PropertyKind::SoftObject { .. } | PropertyKind::SoftClass { .. } => {
            persistent::destroy(rt, addr)
        }
        PropertyKind::Struct { inner } => container::destroy_struct(rt, *inner, addr)?,
        PropertyKind::Array { inner } => container::destroy_array(rt, inner, addr)?,
        _ => {}
    }
    Ok(())
}

/// The stable path or GUID behind a soft or lazy reference.
pub fn get_identifier(desc: &PropertyDescriptor, addr: usize) -> Result<Identifier> {
    match &desc.kind {
        PropertyKind::SoftObject { .. } | PropertyKind::SoftClass { .. } => {
            Ok(Identifier::Soft(persistent::soft_path(addr)))
        }
        PropertyKind::LazyObject { .. } => Ok(Identifier::Lazy(persistent::lazy_guid(addr))),
        _ => Err(Error::NotIndirect(desc.name.clone())),
    }
}

/// Read a whole field of the container at `base`; fixed arrays become `Value::Array`.
pub fn get_all(rt: &Runtime, desc: &PropertyDescriptor, base: usize) -> Result<Value> {
    if desc.array_dim == 1 {
        return get(rt, desc, base + desc.offset);
    }
    (0..desc.array_dim)
        .map(|i| get(rt, desc, desc.element_address(base, i)?))
        .collect::<Result<Vec<_>>>()
        .map(Value::Array)
}

/// `check` for a whole field, as `set_all` takes it.
pub fn check_all(rt: &Runtime, desc: &PropertyDescriptor, value: &Value) -> Result<()> {
    if desc.array_dim == 1 {
        return check(rt, desc, value);
    }
    match value {
        Value::Array(items) if items.len() == desc.array_dim => {
            items.iter().try_for_each(|item| check(rt, desc, item))
        }
        other => Err(desc.mismatch(format!("Array of {}", desc.array_dim), other)),
    }
}

/// Write a whole field; a fixed array takes a `Value::Array` of exactly `array_dim` items.
/// A rejected element leaves every element as it was.
pub fn set_all(rt: &Runtime, desc: &PropertyDescriptor, base: usize, value: &Value) -> Result<()> {
    if desc.array_dim == 1 {
        return set(rt, desc, base + desc.offset, value);
    }
    check_all(rt, desc, value)?;
    let Value::Array(items) = value else {
        return Ok(());
    };
    for (i, item) in items.iter().enumerate() {
        set(rt, desc, desc.element_address(base, i)?, item)?;
    }
    Ok(())
}

/// Destroy every element of a field.
pub fn destroy_all(rt: &Runtime, desc: &PropertyDescriptor, base: usize) -> Result<()> {
    for i in 0..desc.array_dim {
        destroy(rt, desc, desc.element_address(base, i)?)?;
    }
    Ok(())
}
