// runtime.rs - Everything needed to read and drive the host: layouts, tables, natives.
//
// One Runtime per session. Tests build their own over a fake engine.

use crate::error::{Error, Result};
use crate::game::Natives;
use crate::unreal::{
    FName, FWeakObjectPtr, GNames, GObjects, ObjectFlags, OffsetTable, UClass, UFunction,
    UObject,
};
use std::sync::Arc;
use widestring::U16CString;

pub struct Runtime {
    offsets: OffsetTable,
    names: GNames,
    objects: GObjects,
    natives: Arc<dyn Natives>,
}

impl Runtime {
    /// `gnames` and `gobjects` are the addresses of the two host tables.
    pub fn new(
        offsets: OffsetTable,
        gnames: usize,
        gobjects: usize,
        natives: Arc<dyn Natives>,
    ) -> Self {
        Self {
            names: GNames::new(gnames, &offsets),
            objects: GObjects::new(gobjects, &offsets),
            offsets,
            natives,
        }
    }

    pub fn offsets(&self) -> &OffsetTable {
        &self.offsets
    }

    pub fn names(&self) -> &GNames {
        &self.names
    }

    pub fn objects(&self) -> &GObjects {
        &self.objects
    }

    pub fn natives(&self) -> &dyn Natives {
        self.natives.as_ref()
    }

    // ============================================================
    // Host allocator
    // ============================================================

    /// Zeroed memory from the host allocator.
    pub fn malloc(&self, len: usize) -> Result<usize> {
        match unsafe { self.natives.malloc(len) } {
            0 => Err(Error::AllocationFailed(len)),
            ptr => Ok(ptr),
        }
    }

    pub fn realloc(&self, ptr: usize, len: usize) -> Result<usize> {
        match unsafe { self.natives.realloc(ptr, len) } {
            0 => Err(Error::AllocationFailed(len)),
            ptr => Ok(ptr),
        }
    }

    pub fn free(&self, ptr: usize) {
        if ptr != 0 {
            unsafe { self.natives.free(ptr) }
        }
    }

    // ============================================================
    // Names and objects
    // ============================================================

    /// Intern `name` through the host. Anything after an embedded nul is dropped.
    pub fn fname(&self, name: &str, number: i32) -> Result<FName> {
        let wide = U16CString::from_str_truncate(name);
        Ok(unsafe { self.natives.fname_init(&wide, number) })
    }

    /// Display form of a name, `"None"` for an index the table doesn't have.
    pub fn name_of(&self, name: FName) -> String {
        name.resolve(self).unwrap_or_else(|_| String::from("None"))
    }

    /// Whether `obj` is itself a class (its class derives from `Class`).
    fn is_class_object(&self, obj: UObject) -> bool {
        std::iter::successors(Some(obj.class(self)), |c| c.super_class(self))
            .any(|c| c.name(self) == "Class")
    }

    /// First class with this (case-insensitive) name.
    pub fn find_class(&self, name: &str) -> Option<UClass> {
        self.objects
            .iter()
            .find(|o| o.name(self).eq_ignore_ascii_case(name) && self.is_class_object(*o))
            .map(|o| UClass::from_addr(o.addr()))
    }

    /// First instance of `class` (or a subclass) with this full path name.
    pub fn find_object(&self, class: UClass, path: &str) -> Option<UObject> {
        let leaf = path.rsplit(['.', ':']).next().unwrap_or(path);
        self.objects.iter().find(|o| {
            o.name(self).eq_ignore_ascii_case(leaf)
                && o.is_a(self, class)
                && o.path_name(self).eq_ignore_ascii_case(path)
        })
    }

    /// Weak pointer to `obj`, allocating a serial number if needed.
    pub fn weak_for(&self, obj: Option<UObject>) -> Result<FWeakObjectPtr> {
        match obj {
            None => Ok(FWeakObjectPtr::NULL),
            Some(obj) => {
                let index = usize::try_from(obj.internal_index(self)).map_err(|_| {
                    Error::OutOfRange {
                        table: "GObjects",
                        index: usize::MAX,
                        size: self.objects.size(),
                    }
                })?;
                self.objects.weak_for(index)
            }
        }
    }

    // ============================================================
    // Native calls
    // ============================================================

    /// Create an object through the host's own constructor. None on failure.
    pub fn construct_object(
        &self,
        class: UClass,
        outer: Option<UObject>,
        name: FName,
        flags: ObjectFlags,
        template: Option<UObject>,
    ) -> Option<UObject> {
        let obj = unsafe {
            self.natives
                .construct_object(class, outer, name, flags.bits(), template)
        };
        if obj.is_none() {
            tracing::warn!(
                "failed to construct {} named {}",
                class.name(self),
                self.name_of(name)
            );
        }
        obj
    }

    /// Call a function on an object, bypassing the hook chain.
    ///
    /// # Safety
    /// `params` must point to a parameter block laid out for `function`.
    pub unsafe fn process_event(&self, object: UObject, function: UFunction, params: usize) {
        self.natives.process_event(object, function, params)
    }

    /// Advance a script frame by one instruction.
    ///
    /// # Safety
    /// `frame` must be a live `FFrame*` currently executing on `object`.
    pub unsafe fn fframe_step(&self, frame: usize, object: UObject, param: usize) {
        self.natives.fframe_step(frame, object, param)
    }
}

impl std::fmt::Debug for Runtime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runtime")
            .field("gnames", &format_args!("{:#x}", self.names.address()))
            .field("gobjects", &format_args!("{:#x}", self.objects.address()))
            .finish()
    }
}
