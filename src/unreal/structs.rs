// structs.rs - Class and struct descriptors: hierarchy, interfaces, property lookup.
//
// Nothing here is cached. The class graph is fixed once the host has loaded, so every query
// is a short walk over host memory.

use crate::error::{Error, Result};
use crate::memory;
use crate::unreal::object::address_type;
use crate::unreal::properties::{self, PropertyDescriptor, UProperty, Value};
use crate::unreal::{Runtime, TArray, UObject};

address_type!(
    /// `UStruct`: anything with properties (classes, script structs, functions).
    UStruct
);
address_type!(
    /// `UClass`
    UClass
);
address_type!(
    /// `UFunction`; its properties are the parameters.
    UFunction
);

/// One entry of a class's `Interfaces` array.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImplementedInterface {
    /// Address of the `FImplementedInterface` record itself
    pub address: usize,
    pub class: UClass,
    /// Offset from the object to the interface's vtable pointer
    pub pointer_offset: i32,
    pub implemented_by_k2: bool,
}

impl UStruct {
    pub fn as_object(self) -> UObject {
        UObject::from_addr(self.0)
    }

    pub fn name(self, rt: &Runtime) -> String {
        self.as_object().name(rt)
    }

    pub fn super_struct(self, rt: &Runtime) -> Option<UStruct> {
        UStruct::from_ptr(unsafe { memory::read_ptr(self.0 + rt.offsets().struct_super) })
    }

    /// Size in bytes of an instance, including inherited fields.
    pub fn struct_size(self, rt: &Runtime) -> usize {
        let size = unsafe { memory::read::<i32>(self.0 + rt.offsets().struct_property_size) };
        size.max(0) as usize
    }

    /// Reflexive: a struct inherits from itself.
    pub fn inherits(self, rt: &Runtime, other: UStruct) -> bool {
        let mut cur = Some(self);
        while let Some(s) = cur {
            if s == other {
                return true;
            }
            cur = s.super_struct(rt);
        }
        false
    }

    /// Own and inherited properties, most-derived first.
    pub fn properties(self, rt: &Runtime) -> Properties<'_> {
        let head = unsafe { memory::read_ptr(self.0 + rt.offsets().struct_property_link) };
        Properties {
            rt,
            next: UProperty::from_ptr(head),
        }
    }

    /// Case-insensitive lookup by property name.
    pub fn find_property(self, rt: &Runtime, name: &str) -> Option<UProperty> {
        self.properties(rt)
            .find(|p| p.name(rt).eq_ignore_ascii_case(name))
    }

    /// Own fields (functions included) via the `Children` list, without supers.
    pub fn children(self, rt: &Runtime) -> impl Iterator<Item = UObject> + '_ {
        let next_offset = rt.offsets().field_next;
        let head = unsafe { memory::read_ptr(self.0 + rt.offsets().struct_children) };
        std::iter::successors(UObject::from_ptr(head), move |field| {
            UObject::from_ptr(unsafe { memory::read_ptr(field.addr() + next_offset) })
        })
    }

    /// Case-insensitive function lookup, searching supers too.
    pub fn find_function(self, rt: &Runtime, name: &str) -> Option<UFunction> {
        let mut cur = Some(self);
        while let Some(s) = cur {
            let found = s.children(rt).find(|field| {
                field.class(rt).as_object().name(rt) == "Function"
                    && field.name(rt).eq_ignore_ascii_case(name)
            });
            if let Some(field) = found {
                return Some(UFunction::from_addr(field.addr()));
            }
            cur = s.super_struct(rt);
        }
        None
    }

    pub(crate) fn descriptor(self, rt: &Runtime, name: &str) -> Result<PropertyDescriptor> {
        let prop = self
            .find_property(rt, name)
            .ok_or_else(|| Error::PropertyNotFound(format!("{}.{}", self.name(rt), name)))?;
        PropertyDescriptor::read(rt, prop)
    }

    /// Read a field of an instance of this struct living at `base`.
    pub fn get_field(self, rt: &Runtime, base: usize, name: &str) -> Result<Value> {
        let desc = self.descriptor(rt, name)?;
        properties::get_all(rt, &desc, base)
    }

    pub fn get_field_at(
        self,
        rt: &Runtime,
        base: usize,
        name: &str,
        index: usize,
    ) -> Result<Value> {
        let desc = self.descriptor(rt, name)?;
        let addr = desc.element_address(base, index)?;
        properties::get(rt, &desc, addr)
    }

    pub fn set_field(self, rt: &Runtime, base: usize, name: &str, value: &Value) -> Result<()> {
        let desc = self.descriptor(rt, name)?;
        properties::set_all(rt, &desc, base, value)
    }

    pub fn set_field_at(
        self,
        rt: &Runtime,
        base: usize,
        name: &str,
        index: usize,
        value: &Value,
    ) -> Result<()> {
        let desc = self.descriptor(rt, name)?;
        let addr = desc.element_address(base, index)?;
        properties::set(rt, &desc, addr, value)
    }
}

/// Iterator over a `PropertyLink` chain.
pub struct Properties<'a> {
    rt: &'a Runtime,
    next: Option<UProperty>,
}

impl Iterator for Properties<'_> {
    type Item = UProperty;

    fn next(&mut self) -> Option<UProperty> {
        let cur = self.next?;
        self.next = cur.link_next(self.rt);
        Some(cur)
    }
}

impl UClass {
    pub fn as_struct(self) -> UStruct {
        UStruct::from_addr(self.0)
    }

    pub fn as_object(self) -> UObject {
        UObject::from_addr(self.0)
    }

    pub fn name(self, rt: &Runtime) -> String {
        self.as_object().name(rt)
    }

    pub fn super_class(self, rt: &Runtime) -> Option<UClass> {
        self.as_struct()
            .super_struct(rt)
            .map(|s| UClass::from_addr(s.addr()))
    }

    /// Reflexive: a class inherits from itself.
    pub fn inherits(self, rt: &Runtime, other: UClass) -> bool {
        self.as_struct().inherits(rt, other.as_struct())
    }

    pub fn default_object(self, rt: &Runtime) -> Option<UObject> {
        UObject::from_ptr(unsafe { memory::read_ptr(self.0 + rt.offsets().class_default_object) })
    }

    /// This class's own `Interfaces` records.
    pub fn interfaces(self, rt: &Runtime) -> Vec<ImplementedInterface> {
        let offsets = rt.offsets();
        let arr = unsafe { TArray::read(self.0 + offsets.class_interfaces) };
        if arr.data == 0 {
            return Vec::new();
        }
        (0..arr.len())
            .filter_map(|i| {
                let address = arr.data + i * offsets.implemented_interface_size;
                let class = UClass::from_ptr(unsafe { memory::read_ptr(address) })?;
                Some(ImplementedInterface {
                    address,
                    class,
                    pointer_offset: unsafe { memory::read::<i32>(address + 8) },
                    implemented_by_k2: unsafe { memory::read::<u8>(address + 12) } != 0,
                })
            })
            .collect()
    }

    /// The record for `interface`, if this class lists it.
    pub fn implements(self, rt: &Runtime, interface: UClass) -> Option<ImplementedInterface> {
        self.interfaces(rt)
            .into_iter()
            .find(|record| record.class == interface)
    }

    pub fn find_property(self, rt: &Runtime, name: &str) -> Option<UProperty> {
        self.as_struct().find_property(rt, name)
    }

    pub fn find_function(self, rt: &Runtime, name: &str) -> Option<UFunction> {
        self.as_struct().find_function(rt, name)
    }
}

impl UFunction {
    pub fn as_struct(self) -> UStruct {
        UStruct::from_addr(self.0)
    }

    pub fn as_object(self) -> UObject {
        UObject::from_addr(self.0)
    }

    pub fn name(self, rt: &Runtime) -> String {
        self.as_object().name(rt)
    }

    /// Size of the parameter block.
    pub fn params_size(self, rt: &Runtime) -> usize {
        self.as_struct().struct_size(rt)
    }
}
