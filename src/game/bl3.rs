// bl3.rs - Borderlands 3 (UE 4.20ish, x64): signatures, layouts and native bindings.

use super::{Addresses, HostVersion, Natives, Signature, SignatureSet, Trampolines};
use crate::error::Result;
use crate::memory;
use crate::scanner::Pattern;
use crate::unreal::{FName, OffsetTable, UClass, UFunction, UObject};
use std::sync::Arc;
use widestring::U16CStr;

pub const OFFSETS: OffsetTable = OffsetTable {
    object_flags: 0x08,
    object_internal_index: 0x0C,
    object_class: 0x10,
    object_name: 0x18,
    object_outer: 0x20,
    object_size: 0x28,

    field_next: 0x28,
    struct_super: 0x30,
    struct_children: 0x38,
    struct_property_size: 0x40,
    struct_property_link: 0x58,
    class_default_object: 0xF8,
    class_interfaces: 0x1A0,
    implemented_interface_size: 0x10,
    enum_names: 0x40,

    property_array_dim: 0x30,
    property_element_size: 0x34,
    property_flags: 0x38,
    property_offset: 0x44,
    property_link_next: 0x50,
    property_payload: 0x70,

    names_per_chunk: 0x4000,
    names_count: 0x400,
    name_entry_index: 0x00,
    name_entry_string: 0x10,

    objects_array: 0x10,
    objects_per_chunk: 0x10000,
    objects_serial_counter: 0xA8,
    object_item_size: 0x18,
    object_item_flags: 0x08,
    object_item_serial: 0x10,

    malloc_slot: 2,
    realloc_slot: 4,
    free_slot: 6,
};

fn pattern(text: &str, offset: usize) -> Result<Pattern> {
    Ok(Pattern::parse(text)?.with_offset(offset))
}

// ============================================================
// Native call types
// ============================================================

type MallocFn = unsafe extern "system" fn(this: usize, count: usize, alignment: u32) -> usize;
type ReallocFn =
    unsafe extern "system" fn(this: usize, original: usize, count: usize, alignment: u32) -> usize;
type FreeFn = unsafe extern "system" fn(this: usize, original: usize);
type FNameInitFn = unsafe extern "system" fn(name: *const u16, number: i32, find_type: i32) -> FName;
type FFrameStepFn = unsafe extern "system" fn(frame: usize, object: usize, param: usize);
type ProcessEventFn = unsafe extern "system" fn(object: usize, function: usize, params: usize);
type ConstructObjectFn = unsafe extern "system" fn(
    class: usize,
    outer: usize,
    name: FName,
    flags: u32,
    internal_flags: u32,
    template: usize,
    copy_transients_from_class_defaults: u32,
    instance_graph: usize,
    assume_template_is_archetype: u32,
) -> usize;

/// `FNAME_Add`
const FIND_OR_ADD: i32 = 1;

/// The host's allocator wants 16-byte alignment for anything that could hold a vector.
fn alignment(len: usize) -> u32 {
    if len < 16 {
        8
    } else {
        16
    }
}

// ============================================================
// Host version
// ============================================================

#[derive(Debug, Clone, Copy, Default)]
pub struct Bl3;

impl HostVersion for Bl3 {
    fn name(&self) -> &'static str {
        "Borderlands 3"
    }

    fn signatures(&self) -> Result<SignatureSet> {
        Ok(SignatureSet {
            process_event: Signature::direct(pattern(
                "40 55 56 57 41 54 41 55 41 56 41 57 48 81 EC F0 00 00 00",
                0,
            )?),
            call_function: Signature::direct(pattern(
                "40 55 53 56 57 41 54 41 56 41 57 48 81 EC ?? ?? ?? ?? 48 8D 6C 24 ??",
                0,
            )?),
            gobjects: Signature::relative(pattern(
                "48 8D 0D ?? ?? ?? ?? C6 05 ?? ?? ?? ?? 01 E8 ?? ?? ?? ?? C6 05 ?? ?? ?? ?? 01 \
                 C6 05 ?? ?? ?? ?? 00 80 3D",
                3,
            )?),
            gnames: Signature::relative(pattern(
                "48 8B 05 ?? ?? ?? ?? 48 85 C0 75 5F B9 08 04 00 00",
                3,
            )?)
            .deref(),
            fname_init: Signature::direct(pattern("40 53 48 83 EC 30 C7 44 24 ?? ?? ?? ?? ??", 0)?),
            fframe_step: Signature::direct(pattern("48 8B 41 20 4C 8B D2 48 8B D1", 0)?),
            // The address of the GMalloc variable; it is only filled in once the host starts
            // allocating, so it's read on every call rather than here
            gmalloc: Signature::relative(pattern(
                "48 85 C9 74 2E 53 48 83 EC 20 48 8B D9 48 8B ?? ?? ?? ?? ?? 48 85 C9",
                16,
            )?),
            construct_object: Signature::relative(pattern("E8 ?? ?? ?? ?? 41 89 3E 4D 8D 46 04", 1)?),
        })
    }

    fn offsets(&self) -> OffsetTable {
        OFFSETS
    }

    fn bind(&self, addresses: &Addresses, trampolines: &Trampolines) -> Arc<dyn Natives> {
        Arc::new(Bl3Natives {
            gmalloc: addresses.gmalloc,
            fname_init: addresses.fname_init,
            fframe_step: addresses.fframe_step,
            process_event: trampolines.process_event,
            construct_object: addresses.construct_object,
        })
    }
}

/// Raw function addresses, called with the BL3 calling conventions.
#[derive(Debug)]
struct Bl3Natives {
    /// `FMalloc** GMalloc`
    gmalloc: usize,
    fname_init: usize,
    fframe_step: usize,
    /// Trampoline, so calls made from here skip the hook chain
    process_event: usize,
    construct_object: usize,
}

impl Bl3Natives {
    /// The live `FMalloc*` and the function in `slot` of its vtable.
    unsafe fn allocator(&self, slot: usize) -> Option<(usize, usize)> {
        let gmalloc = memory::read_ptr(self.gmalloc);
        if gmalloc == 0 {
            tracing::error!("GMalloc used before the host created it");
            return None;
        }
        let vtable = memory::read_ptr(gmalloc);
        Some((gmalloc, memory::read_ptr(vtable + slot * 8)))
    }
}

impl Natives for Bl3Natives {
    unsafe fn malloc(&self, len: usize) -> usize {
        let Some((this, func)) = self.allocator(OFFSETS.malloc_slot) else {
            return 0;
        };
        let func: MallocFn = std::mem::transmute(func);
        let ptr = func(this, len, alignment(len));
        if ptr != 0 {
            memory::zero(ptr, len);
        }
        ptr
    }

    unsafe fn realloc(&self, ptr: usize, len: usize) -> usize {
        let Some((this, func)) = self.allocator(OFFSETS.realloc_slot) else {
            return 0;
        };
        let func: ReallocFn = std::mem::transmute(func);
        func(this, ptr, len, alignment(len))
    }

    unsafe fn free(&self, ptr: usize) {
        if let Some((this, func)) = self.allocator(OFFSETS.free_slot) {
            let func: FreeFn = std::mem::transmute(func);
            func(this, ptr);
        }
    }

    unsafe fn fname_init(&self, name: &U16CStr, number: i32) -> FName {
        let func: FNameInitFn = std::mem::transmute(self.fname_init);
        func(name.as_ptr(), number, FIND_OR_ADD)
    }

    unsafe fn fframe_step(&self, frame: usize, object: UObject, param: usize) {
        let func: FFrameStepFn = std::mem::transmute(self.fframe_step);
        func(frame, object.addr(), param)
    }

    unsafe fn process_event(&self, object: UObject, function: UFunction, params: usize) {
        let func: ProcessEventFn = std::mem::transmute(self.process_event);
        func(object.addr(), function.addr(), params)
    }

    unsafe fn construct_object(
        &self,
        class: UClass,
        outer: Option<UObject>,
        name: FName,
        flags: u32,
        template: Option<UObject>,
    ) -> Option<UObject> {
        let func: ConstructObjectFn = std::mem::transmute(self.construct_object);
        let obj = func(
            class.addr(),
            outer.map_or(0, UObject::addr),
            name,
            flags,
            0,
            template.map_or(0, UObject::addr),
            0,
            0,
            0,
        );
        UObject::from_ptr(obj)
    }
}
