// object.rs - UObject handle and the address newtypes shared by the reflection layer.
//
// Every handle is just the address of a host object. Handles are Copy and compare by
// address; reading through them goes via the session's offset table, so every accessor takes
// the `Runtime`.

use crate::error::Result;
use crate::memory;
use crate::unreal::properties::Value;
use crate::unreal::{FName, Runtime, UClass};
use bitflags::bitflags;

/// Declares an address newtype with the usual constructors.
macro_rules! address_type {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[repr(transparent)]
        #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(usize);

        impl $name {
            /// Wrap an address known to be non-null.
            pub const fn from_addr(addr: usize) -> Self {
                Self(addr)
            }

            /// Wrap a pointer that may be null.
            pub fn from_ptr(addr: usize) -> Option<Self> {
                (addr != 0).then_some(Self(addr))
            }

            pub const fn addr(self) -> usize {
                self.0
            }
        }

        impl std::fmt::Debug for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, concat!(stringify!($name), "({:#x})"), self.0)
            }
        }
    };
}

pub(crate) use address_type;

address_type!(
    /// Any engine object.
    UObject
);

bitflags! {
    /// `EObjectFlags`
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ObjectFlags: u32 {
        const PUBLIC = 0x0000_0001;
        const STANDALONE = 0x0000_0002;
        const MARK_AS_NATIVE = 0x0000_0004;
        const TRANSACTIONAL = 0x0000_0008;
        const CLASS_DEFAULT_OBJECT = 0x0000_0010;
        const ARCHETYPE_OBJECT = 0x0000_0020;
        const TRANSIENT = 0x0000_0040;
        const NEED_LOAD = 0x0000_0400;
        const WAS_LOADED = 0x0008_0000;
        const BEGIN_DESTROYED = 0x0000_8000;
        const FINISH_DESTROYED = 0x0001_0000;
        const _ = !0;
    }
}

impl UObject {
    pub fn class(self, rt: &Runtime) -> UClass {
        UClass::from_addr(unsafe { memory::read_ptr(self.0 + rt.offsets().object_class) })
    }

    pub fn fname(self, rt: &Runtime) -> FName {
        unsafe { memory::read(self.0 + rt.offsets().object_name) }
    }

    /// Display name, `"None"` if the name index is unusable.
    pub fn name(self, rt: &Runtime) -> String {
        self.fname(rt)
            .resolve(rt)
            .unwrap_or_else(|_| String::from("None"))
    }

    pub fn outer(self, rt: &Runtime) -> Option<UObject> {
        UObject::from_ptr(unsafe { memory::read_ptr(self.0 + rt.offsets().object_outer) })
    }

    pub fn flags(self, rt: &Runtime) -> ObjectFlags {
        ObjectFlags::from_bits_retain(unsafe {
            memory::read::<u32>(self.0 + rt.offsets().object_flags)
        })
    }

    /// Slot in GObjects.
    pub fn internal_index(self, rt: &Runtime) -> i32 {
        unsafe { memory::read(self.0 + rt.offsets().object_internal_index) }
    }

    pub fn is_a(self, rt: &Runtime, class: UClass) -> bool {
        self.class(rt).inherits(rt, class)
    }

    /// Full path: outers joined with `.`, except `:` after a non-package object whose own
    /// outer is a package.
    pub fn path_name(self, rt: &Runtime) -> String {
        let mut out = String::new();
        self.write_path(rt, &mut out);
        out
    }

    fn write_path(self, rt: &Runtime, out: &mut String) {
        if let Some(outer) = self.outer(rt) {
            outer.write_path(rt, out);
            let outer_is_package = outer.class(rt).as_object().name(rt) == "Package";
            let outer_outer_is_package = outer
                .outer(rt)
                .is_some_and(|o| o.class(rt).as_object().name(rt) == "Package");
            if !outer_is_package && outer_outer_is_package {
                out.push(':');
            } else {
                out.push('.');
            }
        }
        out.push_str(&self.name(rt));
    }

    /// Read a property by name. Fixed arrays come back whole, as `Value::Array`.
    pub fn get(self, rt: &Runtime, property: &str) -> Result<Value> {
        self.class(rt)
            .as_struct()
            .get_field(rt, self.0, property)
    }

    /// Read one element of a fixed-array property.
    pub fn get_at(self, rt: &Runtime, property: &str, index: usize) -> Result<Value> {
        self.class(rt)
            .as_struct()
            .get_field_at(rt, self.0, property, index)
    }

    pub fn set(self, rt: &Runtime, property: &str, value: &Value) -> Result<()> {
        self.class(rt)
            .as_struct()
            .set_field(rt, self.0, property, value)
    }

    pub fn set_at(self, rt: &Runtime, property: &str, index: usize, value: &Value) -> Result<()> {
        self.class(rt)
            .as_struct()
            .set_field_at(rt, self.0, property, index, value)
    }
}
