// testing.rs - In-memory stand-ins for the host, shared by the unit tests.
//
// FakeEngine lays out a name table, an object table and reflection metadata in heap blocks
// using the BL3 offset table, so the real readers run against it unchanged. Blocks live as
// long as the engine; FakeNatives hands out a separate heap so tests can count leaks.

use crate::error::{Error, Result};
use crate::game::bl3::OFFSETS;
use crate::game::{Addresses, HostVersion, Natives, Signature, SignatureSet, Trampolines};
use crate::hook::HookBackend;
use crate::memory;
use crate::scanner::{Pattern, Scanner};
use crate::unreal::properties::PropertyFlags;
use crate::unreal::{
    FName, ObjectFlags, OffsetTable, Runtime, TArray, UClass, UFunction, UObject, UProperty,
    UStruct,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use widestring::U16CStr;

const NAME_CAPACITY: usize = 4096;
const OBJECT_CAPACITY: usize = 4096;
const CLASS_BLOCK: usize = 0x1B0;
const PROPERTY_BLOCK: usize = 0x90;
const ENUM_BLOCK: usize = 0x60;
/// Room past the declared struct size, for properties added after an object exists
const OBJECT_SLACK: usize = 0x100;

type ProcessEventHook = Arc<dyn Fn(UObject, UFunction, usize) + Send + Sync>;

struct Layout {
    own: Vec<usize>,
    size: usize,
}

#[derive(Default)]
struct Inner {
    blocks: Vec<Box<[u64]>>,
    heap: HashMap<usize, (Box<[u64]>, usize)>,
    names: HashMap<String, i32>,
    name_count: usize,
    object_count: usize,
    layouts: HashMap<usize, Layout>,
    interfaces: HashMap<usize, Vec<(UClass, i32, bool)>>,
    kinds: HashMap<String, usize>,
    class_class: usize,
    fail_construction: bool,
    on_process_event: Option<ProcessEventHook>,
}

fn zeroed(len: usize) -> Box<[u64]> {
    vec![0u64; len.div_ceil(8).max(1)].into_boxed_slice()
}

fn align_up(v: usize, align: usize) -> usize {
    v.div_ceil(align) * align
}

/// Default element size of a property kind.
fn kind_size(class_name: &str) -> usize {
    match class_name {
        "Int8Property" | "ByteProperty" | "BoolProperty" => 1,
        "Int16Property" | "UInt16Property" => 2,
        "IntProperty" | "UInt32Property" | "FloatProperty" => 4,
        "Int64Property" | "UInt64Property" | "DoubleProperty" | "NameProperty"
        | "ObjectProperty" | "ClassProperty" | "WeakObjectProperty" => 8,
        "StrProperty" | "ArrayProperty" | "InterfaceProperty" => 0x10,
        "LazyObjectProperty" => 0x1C,
        "SoftObjectProperty" | "SoftClassProperty" => 0x28,
        other => panic!("no default size for {other}, use property_sized"),
    }
}

struct State {
    offsets: OffsetTable,
    gnames: usize,
    gobjects: usize,
    names_chunk: usize,
    objects_chunk: usize,
    inner: Mutex<Inner>,
}

impl State {
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn block(&self, inner: &mut Inner, len: usize) -> usize {
        let block = zeroed(len);
        let addr = block.as_ptr() as usize;
        inner.blocks.push(block);
        addr
    }

    fn intern(&self, inner: &mut Inner, text: &str, wide: bool) -> FName {
        let key = text.to_lowercase();
        if let Some(&index) = inner.names.get(&key) {
            return FName::new(index, 0);
        }
        let index = inner.name_count;
        assert!(index < NAME_CAPACITY, "fake name table full");

        let o = &self.offsets;
        let units: Vec<u16> = text.encode_utf16().collect();
        let string_len = if wide { (units.len() + 1) * 2 } else { text.len() + 1 };
        let entry = self.block(inner, o.name_entry_string + string_len);
        unsafe {
            memory::write(entry + o.name_entry_index, ((index as i32) << 1) | wide as i32);
            let string = entry + o.name_entry_string;
            if wide {
                for (i, u) in units.iter().enumerate() {
                    memory::write(string + i * 2, *u);
                }
            } else {
                std::ptr::copy_nonoverlapping(text.as_ptr(), string as *mut u8, text.len());
            }
            memory::write(self.names_chunk + index * 8, entry);
            memory::write(self.gnames + o.names_count, (index + 1) as i32);
        }
        inner.names.insert(key, index as i32);
        inner.name_count += 1;
        FName::new(index as i32, 0)
    }

    fn register(&self, inner: &mut Inner, obj: usize) {
        let index = inner.object_count;
        assert!(index < OBJECT_CAPACITY, "fake object table full");
        let o = &self.offsets;
        unsafe {
            memory::write(self.objects_chunk + index * o.object_item_size, obj);
            memory::write(obj + o.object_internal_index, index as i32);
            memory::write(self.gobjects + o.objects_array + 0x14, (index + 1) as i32);
        }
        inner.object_count += 1;
    }

    fn new_object(
        &self,
        inner: &mut Inner,
        class: usize,
        name: FName,
        outer: usize,
        flags: u32,
        len: usize,
    ) -> usize {
        let o = &self.offsets;
        let obj = self.block(inner, len.max(o.object_size));
        unsafe {
            memory::write(obj + o.object_flags, flags);
            memory::write(obj + o.object_class, class);
            memory::write(obj + o.object_name, name);
            memory::write(obj + o.object_outer, outer);
        }
        self.register(inner, obj);
        obj
    }

    fn instance_size(&self, class: usize) -> usize {
        let size = unsafe { memory::read::<i32>(class + self.offsets.struct_property_size) };
        size.max(0) as usize + OBJECT_SLACK
    }

    /// A struct-like object (class, script struct, function) of class `meta`.
    fn new_struct(
        &self,
        inner: &mut Inner,
        meta: usize,
        name: &str,
        outer: usize,
        super_struct: Option<usize>,
        root_size: usize,
    ) -> usize {
        let fname = self.intern(inner, name, false);
        let s = self.new_object(inner, meta, fname, outer, 0, CLASS_BLOCK);
        let o = &self.offsets;
        let size = match super_struct {
            Some(sup) => unsafe {
                memory::write(s + o.struct_super, sup);
                memory::write(s + o.struct_property_link, memory::read_ptr(sup + o.struct_property_link));
                memory::read::<i32>(sup + o.struct_property_size).max(0) as usize
            },
            None => root_size,
        };
        unsafe { memory::write(s + o.struct_property_size, size as i32) };
        inner.layouts.insert(s, Layout { own: Vec::new(), size });
        s
    }

    fn kind_class(&self, inner: &mut Inner, class_name: &str) -> usize {
        if let Some(&class) = inner.kinds.get(class_name) {
            return class;
        }
        let meta = inner.class_class;
        let class = self.new_struct(inner, meta, class_name, 0, None, 0);
        inner.kinds.insert(class_name.to_string(), class);
        class
    }

    /// A property object with its common fields filled in, not linked anywhere.
    fn new_property(
        &self,
        inner: &mut Inner,
        owner: usize,
        name: &str,
        class_name: &str,
        size: usize,
        dim: usize,
        offset: usize,
    ) -> usize {
        let kind = self.kind_class(inner, class_name);
        let fname = self.intern(inner, name, false);
        let prop = self.new_object(inner, kind, fname, owner, 0, PROPERTY_BLOCK);
        let o = &self.offsets;
        unsafe {
            memory::write(prop + o.property_array_dim, dim as i32);
            memory::write(prop + o.property_element_size, size as i32);
            memory::write(prop + o.property_offset, offset as i32);
        }
        prop
    }

    /// Place a property at the end of `owner` (or at `at`) and link it after the owner's
    /// other own properties.
    #[allow(clippy::too_many_arguments)]
    fn attach(
        &self,
        inner: &mut Inner,
        owner: usize,
        name: &str,
        class_name: &str,
        size: usize,
        dim: usize,
        at: Option<usize>,
    ) -> usize {
        let o = self.offsets;
        let current = inner.layouts.get(&owner).map_or(0, |l| l.size);
        let offset = at.unwrap_or_else(|| align_up(current, size.clamp(1, 8)));
        let prop = self.new_property(inner, owner, name, class_name, size, dim, offset);

        let layout = inner
            .layouts
            .entry(owner)
            .or_insert(Layout { own: Vec::new(), size: 0 });
        layout.size = layout.size.max(offset + size * dim);
        layout.own.push(prop);

        let super_head = unsafe {
            match memory::read_ptr(owner + o.struct_super) {
                0 => 0,
                sup => memory::read_ptr(sup + o.struct_property_link),
            }
        };
        unsafe {
            for pair in layout.own.windows(2) {
                memory::write(pair[0] + o.property_link_next, pair[1]);
            }
            if let Some(&last) = layout.own.last() {
                memory::write(last + o.property_link_next, super_head);
            }
            memory::write(owner + o.struct_property_link, layout.own[0]);
            memory::write(owner + o.struct_property_size, layout.size as i32);
        }
        prop
    }

    fn set_payload(&self, prop: usize, offset: usize, value: usize) {
        unsafe { memory::write(prop + self.offsets.property_payload + offset, value) }
    }
}

// ============================================================
// Natives
// ============================================================

/// Natives backed by the Rust allocator and the fake tables.
pub struct FakeNatives {
    state: Arc<State>,
}

impl FakeNatives {
    /// Blocks handed out through malloc/realloc and not yet freed.
    pub fn live_allocations(&self) -> usize {
        self.state.lock().heap.len()
    }

    pub fn fail_construction(&self, fail: bool) {
        self.state.lock().fail_construction = fail;
    }

    /// Observe calls made through `process_event`.
    pub fn on_process_event(&self, hook: impl Fn(UObject, UFunction, usize) + Send + Sync + 'static) {
        self.state.lock().on_process_event = Some(Arc::new(hook));
    }
}

impl Natives for FakeNatives {
    unsafe fn malloc(&self, len: usize) -> usize {
        if len == 0 {
            return 0;
        }
        let block = zeroed(len);
        let addr = block.as_ptr() as usize;
        self.state.lock().heap.insert(addr, (block, len));
        addr
    }

    unsafe fn realloc(&self, ptr: usize, len: usize) -> usize {
        if ptr == 0 {
            return self.malloc(len);
        }
        let mut inner = self.state.lock();
        let (old, old_len) = inner.heap.remove(&ptr).expect("realloc of unknown block");
        let block = zeroed(len);
        let addr = block.as_ptr() as usize;
        std::ptr::copy_nonoverlapping(old.as_ptr() as *const u8, addr as *mut u8, old_len.min(len));
        inner.heap.insert(addr, (block, len));
        addr
    }

    unsafe fn free(&self, ptr: usize) {
        let freed = self.state.lock().heap.remove(&ptr);
        assert!(freed.is_some(), "free of unknown block {ptr:#x}");
    }

    unsafe fn fname_init(&self, name: &U16CStr, number: i32) -> FName {
        let text = name.to_string_lossy();
        let wide = !text.is_ascii();
        let mut inner = self.state.lock();
        let base = self.state.intern(&mut inner, &text, wide);
        FName::new(base.index, number)
    }

    unsafe fn fframe_step(&self, _frame: usize, _object: UObject, _param: usize) {}

    unsafe fn process_event(&self, object: UObject, function: UFunction, params: usize) {
        let hook = self.state.lock().on_process_event.clone();
        if let Some(hook) = hook {
            hook(object, function, params);
        }
    }

    unsafe fn construct_object(
        &self,
        class: UClass,
        outer: Option<UObject>,
        name: FName,
        flags: u32,
        _template: Option<UObject>,
    ) -> Option<UObject> {
        let mut inner = self.state.lock();
        if inner.fail_construction {
            return None;
        }
        let len = self.state.instance_size(class.addr());
        let obj = self.state.new_object(
            &mut inner,
            class.addr(),
            name,
            outer.map_or(0, UObject::addr),
            flags,
            len,
        );
        Some(UObject::from_addr(obj))
    }
}

// ============================================================
// Engine
// ============================================================

/// A fake host: empty tables plus the core classes.
pub struct FakeEngine {
    state: Arc<State>,
    natives: Arc<FakeNatives>,
    runtime: Runtime,
}

impl FakeEngine {
    pub fn new() -> Self {
        let offsets = OFFSETS;
        let mut inner = Inner::default();
        let mut alloc = |len: usize| {
            let block = zeroed(len);
            let addr = block.as_ptr() as usize;
            inner.blocks.push(block);
            addr
        };
        let gnames = alloc(offsets.names_count + 8);
        let names_chunk = alloc(NAME_CAPACITY * 8);
        let gobjects = alloc(offsets.objects_serial_counter + 8);
        let chunk_table = alloc(8);
        let objects_chunk = alloc(OBJECT_CAPACITY * offsets.object_item_size);
        unsafe {
            memory::write(gnames, names_chunk);
            memory::write(gobjects + offsets.objects_array, chunk_table);
            memory::write(chunk_table, objects_chunk);
        }

        let state = Arc::new(State {
            offsets,
            gnames,
            gobjects,
            names_chunk,
            objects_chunk,
            inner: Mutex::new(inner),
        });
        {
            let mut inner = state.lock();
            state.intern(&mut inner, "None", false);
            // Class is its own class
            let name = state.intern(&mut inner, "Class", false);
            let class_class = state.new_object(&mut inner, 0, name, 0, 0, CLASS_BLOCK);
            unsafe { memory::write(class_class + offsets.object_class, class_class) };
            inner.class_class = class_class;
            for core in ["Object", "Package", "Function", "ScriptStruct", "Enum"] {
                state.new_struct(&mut inner, class_class, core, 0, None, offsets.object_size);
            }
        }

        let natives = Arc::new(FakeNatives {
            state: state.clone(),
        });
        let runtime = Runtime::new(offsets, gnames, gobjects, natives.clone());
        Self {
            state,
            natives,
            runtime,
        }
    }

    pub fn runtime(&self) -> &Runtime {
        &self.runtime
    }

    pub fn natives(&self) -> &FakeNatives {
        &self.natives
    }

    pub fn gnames(&self) -> usize {
        self.state.gnames
    }

    pub fn gobjects(&self) -> usize {
        self.state.gobjects
    }

    fn core(&self, name: &str) -> usize {
        let inner = self.state.lock();
        if name == "Class" {
            return inner.class_class;
        }
        drop(inner);
        self.runtime
            .find_class(name)
            .map(UClass::addr)
            .unwrap_or_else(|| panic!("core class {name} missing"))
    }

    pub fn name(&self, text: &str) -> FName {
        let mut inner = self.state.lock();
        self.state.intern(&mut inner, text, false)
    }

    /// Interned as a UTF-16 entry.
    pub fn wide_name(&self, text: &str) -> FName {
        let mut inner = self.state.lock();
        self.state.intern(&mut inner, text, true)
    }

    pub fn class(&self, name: &str, super_class: Option<UClass>) -> UClass {
        let meta = self.core("Class");
        let mut inner = self.state.lock();
        let class = self.state.new_struct(
            &mut inner,
            meta,
            name,
            0,
            super_class.map(UClass::addr),
            self.state.offsets.object_size,
        );
        UClass::from_addr(class)
    }

    pub fn script_struct(&self, name: &str, super_struct: Option<UStruct>) -> UStruct {
        let meta = self.core("ScriptStruct");
        let mut inner = self.state.lock();
        let s = self.state.new_struct(&mut inner, meta, name, 0, super_struct.map(UStruct::addr), 0);
        UStruct::from_addr(s)
    }

    /// A function declared on `class`, linked into its `Children`.
    pub fn function(&self, class: UClass, name: &str) -> UFunction {
        let meta = self.core("Function");
        let mut inner = self.state.lock();
        let func = self.state.new_struct(&mut inner, meta, name, class.addr(), None, 0);
        let o = self.state.offsets;
        unsafe {
            let head = memory::read_ptr(class.addr() + o.struct_children);
            memory::write(func + o.field_next, head);
            memory::write(class.addr() + o.struct_children, func);
        }
        UFunction::from_addr(func)
    }

    pub fn uenum(&self, name: &str, entries: &[(&str, i64)]) -> UObject {
        let meta = self.core("Enum");
        let mut inner = self.state.lock();
        let fname = self.state.intern(&mut inner, name, false);
        let e = self.state.new_object(&mut inner, meta, fname, 0, 0, ENUM_BLOCK);
        let data = self.state.block(&mut inner, entries.len() * 0x10);
        for (i, (entry, value)) in entries.iter().enumerate() {
            let entry_name = self.state.intern(&mut inner, entry, false);
            unsafe {
                memory::write(data + i * 0x10, entry_name);
                memory::write(data + i * 0x10 + 8, *value);
            }
        }
        let arr = TArray {
            data,
            count: entries.len() as i32,
            max: entries.len() as i32,
        };
        unsafe { arr.write(e + self.state.offsets.enum_names) };
        UObject::from_addr(e)
    }

    pub fn package(&self, name: &str) -> UObject {
        let meta = self.core("Package");
        let mut inner = self.state.lock();
        let fname = self.state.intern(&mut inner, name, false);
        UObject::from_addr(self.state.new_object(&mut inner, meta, fname, 0, 0, 0x30))
    }

    pub fn object(&self, class: UClass, name: &str, outer: Option<UObject>) -> UObject {
        let len = self.state.instance_size(class.addr());
        let mut inner = self.state.lock();
        let fname = self.state.intern(&mut inner, name, false);
        let obj = self.state.new_object(
            &mut inner,
            class.addr(),
            fname,
            outer.map_or(0, UObject::addr),
            0,
            len,
        );
        UObject::from_addr(obj)
    }

    // -- properties --

    pub fn property(&self, owner: UStruct, name: &str, class_name: &str) -> UProperty {
        self.property_sized(owner, name, class_name, kind_size(class_name))
    }

    pub fn property_sized(&self, owner: UStruct, name: &str, class_name: &str, size: usize) -> UProperty {
        let mut inner = self.state.lock();
        let prop = self.state.attach(&mut inner, owner.addr(), name, class_name, size, 1, None);
        UProperty::from_addr(prop)
    }

    pub fn fixed_array_property(&self, owner: UStruct, name: &str, class_name: &str, dim: usize) -> UProperty {
        let mut inner = self.state.lock();
        let size = kind_size(class_name);
        let prop = self.state.attach(&mut inner, owner.addr(), name, class_name, size, dim, None);
        UProperty::from_addr(prop)
    }

    pub fn set_property_flags(&self, prop: UProperty, flags: PropertyFlags) {
        unsafe { memory::write(prop.addr() + self.state.offsets.property_flags, flags.bits()) }
    }

    /// A single-bit bool. `share` puts it in the same byte as an earlier bool.
    pub fn bool_property(&self, owner: UStruct, name: &str, mask: u8, share: Option<UProperty>) -> UProperty {
        let at = share.map(|p| p.offset(&self.runtime));
        let mut inner = self.state.lock();
        let prop = self.state.attach(&mut inner, owner.addr(), name, "BoolProperty", 1, 1, at);
        let payload = prop + self.state.offsets.property_payload;
        unsafe {
            memory::write(payload, 1u8);
            memory::write(payload + 1, 0u8);
            memory::write(payload + 2, mask);
            memory::write(payload + 3, mask);
        }
        UProperty::from_addr(prop)
    }

    /// An `EnumProperty` over an underlying integer property of `underlying_class_name`.
    pub fn enum_property(&self, owner: UStruct, name: &str, underlying_class_name: &str, uenum: UObject) -> UProperty {
        let size = kind_size(underlying_class_name);
        let mut inner = self.state.lock();
        let prop = self.state.attach(&mut inner, owner.addr(), name, "EnumProperty", size, 1, None);
        let underlying = self.state.new_property(
            &mut inner,
            prop,
            "UnderlyingType",
            underlying_class_name,
            size,
            1,
            0,
        );
        self.state.set_payload(prop, 0, underlying);
        self.state.set_payload(prop, 8, uenum.addr());
        UProperty::from_addr(prop)
    }

    /// Object, weak, lazy, soft or interface reference to instances of `class`.
    pub fn object_property(&self, owner: UStruct, name: &str, class_name: &str, class: UClass) -> UProperty {
        let prop = self.property(owner, name, class_name);
        self.state.set_payload(prop.addr(), 0, class.addr());
        prop
    }

    /// Class or soft class reference limited to subclasses of `meta`.
    pub fn class_property(&self, owner: UStruct, name: &str, class_name: &str, meta: UClass) -> UProperty {
        let class_class = self.core("Class");
        let prop = self.property(owner, name, class_name);
        self.state.set_payload(prop.addr(), 0, class_class);
        self.state.set_payload(prop.addr(), 8, meta.addr());
        prop
    }

    pub fn struct_property(&self, owner: UStruct, name: &str, inner_struct: UStruct) -> UProperty {
        let size = inner_struct.struct_size(&self.runtime);
        let prop = self.property_sized(owner, name, "StructProperty", size);
        self.state.set_payload(prop.addr(), 0, inner_struct.addr());
        prop
    }

    /// A `TArray` of `inner_class_name`; struct arrays also need the element struct.
    pub fn array_property(
        &self,
        owner: UStruct,
        name: &str,
        inner_class_name: &str,
        inner_struct: Option<UStruct>,
    ) -> UProperty {
        let inner_size = match inner_struct {
            Some(s) => s.struct_size(&self.runtime),
            None => kind_size(inner_class_name),
        };
        let mut inner = self.state.lock();
        let prop = self.state.attach(&mut inner, owner.addr(), name, "ArrayProperty", 0x10, 1, None);
        let element = self
            .state
            .new_property(&mut inner, prop, name, inner_class_name, inner_size, 1, 0);
        if let Some(s) = inner_struct {
            self.state.set_payload(element, 0, s.addr());
        }
        self.state.set_payload(prop, 0, element);
        UProperty::from_addr(prop)
    }

    // -- class records --

    pub fn add_interface(&self, class: UClass, interface: UClass, pointer_offset: i32, k2: bool) {
        let mut inner = self.state.lock();
        let mut records = inner.interfaces.remove(&class.addr()).unwrap_or_default();
        records.push((interface, pointer_offset, k2));

        let size = self.state.offsets.implemented_interface_size;
        let data = self.state.block(&mut inner, records.len() * size);
        for (i, (iface, offset, k2)) in records.iter().enumerate() {
            let record = data + i * size;
            unsafe {
                memory::write(record, iface.addr());
                memory::write(record + 8, *offset);
                memory::write(record + 12, *k2 as u8);
            }
        }
        let arr = TArray {
            data,
            count: records.len() as i32,
            max: records.len() as i32,
        };
        unsafe { arr.write(class.addr() + self.state.offsets.class_interfaces) };
        inner.interfaces.insert(class.addr(), records);
    }

    pub fn set_default_object(&self, class: UClass, cdo: UObject) {
        let o = self.state.offsets;
        unsafe {
            memory::write(class.addr() + o.class_default_object, cdo.addr());
            let flags = memory::read::<u32>(cdo.addr() + o.object_flags);
            memory::write(
                cdo.addr() + o.object_flags,
                flags | ObjectFlags::CLASS_DEFAULT_OBJECT.bits(),
            );
        }
    }

    /// Free `obj`'s slot the way the host does on destruction.
    pub fn vacate(&self, obj: UObject) {
        let o = self.state.offsets;
        let index = obj.internal_index(&self.runtime) as usize;
        let item = self.state.objects_chunk + index * o.object_item_size;
        unsafe {
            memory::write(item, 0usize);
            memory::write(item + o.object_item_serial, 0i32);
        }
    }

    /// A host version whose signatures resolve, through `FakeScanner`, onto this engine.
    pub fn host(&self) -> FakeHost {
        FakeHost {
            natives: self.natives.clone(),
            gnames: self.state.gnames,
            gobjects: self.state.gobjects,
        }
    }
}

impl Default for FakeEngine {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================
// Host version and scanner
// ============================================================

/// Tag byte of each fake signature; the scanner keys on it.
const TAGS: [(u8, &str); 8] = [
    (0xA0, "process_event"),
    (0xA1, "call_function"),
    (0xA2, "gobjects"),
    (0xA3, "gnames"),
    (0xA4, "fname_init"),
    (0xA5, "fframe_step"),
    (0xA6, "gmalloc"),
    (0xA7, "construct_object"),
];

/// Fake code address each signature resolves to, except the two tables.
pub const fn fake_target(tag: u8) -> usize {
    0x7FF6_0000_0000 + (tag as usize) * 0x100
}

pub struct FakeHost {
    natives: Arc<FakeNatives>,
    gnames: usize,
    gobjects: usize,
}

impl FakeHost {
    /// Scanner resolving every fake signature.
    pub fn scanner(&self) -> FakeScanner {
        let mut targets: HashMap<u8, usize> =
            TAGS.iter().map(|&(tag, _)| (tag, fake_target(tag))).collect();
        targets.insert(0xA2, self.gobjects);
        targets.insert(0xA3, self.gnames);
        FakeScanner {
            targets: Mutex::new(targets),
            scans: AtomicUsize::new(0),
        }
    }
}

impl HostVersion for FakeHost {
    fn name(&self) -> &'static str {
        "Fake"
    }

    fn signatures(&self) -> Result<SignatureSet> {
        let sig = |tag: u8| -> Result<Signature> {
            Ok(Signature::direct(Pattern::new(&[tag, 0x90], &[0xFF, 0x00], 0)?))
        };
        Ok(SignatureSet {
            process_event: sig(0xA0)?,
            call_function: sig(0xA1)?,
            gobjects: sig(0xA2)?,
            gnames: sig(0xA3)?,
            fname_init: sig(0xA4)?,
            fframe_step: sig(0xA5)?,
            gmalloc: sig(0xA6)?,
            construct_object: sig(0xA7)?,
        })
    }

    fn offsets(&self) -> OffsetTable {
        OFFSETS
    }

    fn bind(&self, _addresses: &Addresses, _trampolines: &Trampolines) -> Arc<dyn Natives> {
        self.natives.clone()
    }
}

/// Resolves fake signatures by their first byte and counts every scan.
pub struct FakeScanner {
    targets: Mutex<HashMap<u8, usize>>,
    scans: AtomicUsize,
}

impl FakeScanner {
    pub fn scans(&self) -> usize {
        self.scans.load(Ordering::SeqCst)
    }

    /// Make the signature called `name` unresolvable.
    pub fn forget(&self, name: &str) {
        if let Some(&(tag, _)) = TAGS.iter().find(|(_, n)| *n == name) {
            self.targets.lock().unwrap_or_else(|p| p.into_inner()).remove(&tag);
        }
    }
}

impl Scanner for FakeScanner {
    fn scan(&self, pattern: &Pattern) -> Result<usize> {
        self.scans.fetch_add(1, Ordering::SeqCst);
        let mut window = [0u8; 2];
        let targets = self.targets.lock().unwrap_or_else(|p| p.into_inner());
        targets
            .iter()
            .find(|(tag, _)| {
                window[0] = **tag;
                pattern.matches(&window)
            })
            .map(|(_, addr)| *addr + pattern.offset())
            .ok_or(Error::PatternNotFound)
    }

    fn read_relative(&self, address: usize, _operand_size: usize) -> Result<usize> {
        Ok(address)
    }
}

// ============================================================
// Hook backend
// ============================================================

/// Backend that patches nothing and records every call.
#[derive(Default)]
pub struct RecordingBackend {
    calls: Mutex<Vec<String>>,
    failure: Option<String>,
    enable_failure: Option<(usize, String)>,
}

impl RecordingBackend {
    /// Refuses every create with `reason`.
    pub fn failing(reason: &str) -> Self {
        Self {
            failure: Some(reason.to_string()),
            ..Self::default()
        }
    }

    /// Creates fine, but refuses to enable the hook on `target`.
    pub fn failing_enable(target: usize, reason: &str) -> Self {
        Self {
            enable_failure: Some((target, reason.to_string())),
            ..Self::default()
        }
    }

    /// The trampoline address handed out for `target`.
    pub const fn trampoline_for(target: usize) -> usize {
        target + 0x10_0000
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap_or_else(|p| p.into_inner()).push(call);
    }
}

impl HookBackend for RecordingBackend {
    unsafe fn create(&self, target: usize, detour: usize) -> std::result::Result<usize, String> {
        if let Some(reason) = &self.failure {
            return Err(reason.clone());
        }
        self.record(format!("create {target:#x} -> {detour:#x}"));
        Ok(Self::trampoline_for(target))
    }

    unsafe fn enable(&self, target: usize) -> std::result::Result<(), String> {
        if let Some((refused, reason)) = &self.enable_failure {
            if *refused == target {
                return Err(reason.clone());
            }
        }
        self.record(format!("enable {target:#x}"));
        Ok(())
    }

    unsafe fn disable(&self, target: usize) -> std::result::Result<(), String> {
        self.record(format!("disable {target:#x}"));
        Ok(())
    }

    unsafe fn remove(&self, target: usize) -> std::result::Result<(), String> {
        self.record(format!("remove {target:#x}"));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_core_classes_present() {
        let engine = FakeEngine::new();
        let rt = engine.runtime();
        for name in ["Class", "Object", "Package", "Function", "ScriptStruct", "Enum"] {
            assert!(rt.find_class(name).is_some(), "{name}");
        }
        assert_eq!(rt.name_of(FName::NONE), "None");
    }

    #[test]
    fn test_layout_aligns_and_links() {
        let engine = FakeEngine::new();
        let rt = engine.runtime();
        let class = engine.class("Mixed", None);
        let a = engine.property(class.as_struct(), "A", "ByteProperty");
        let b = engine.property(class.as_struct(), "B", "Int64Property");
        assert_eq!(a.offset(rt), 0x28);
        assert_eq!(b.offset(rt), 0x30);
        assert_eq!(class.as_struct().struct_size(rt), 0x38);
        assert_eq!(a.link_next(rt), Some(b));
    }

    #[test]
    fn test_realloc_keeps_contents() {
        let engine = FakeEngine::new();
        let natives = engine.natives();
        unsafe {
            let p = natives.malloc(4);
            memory::write(p, 0xAABBCCDDu32);
            let q = natives.realloc(p, 64);
            assert_eq!(memory::read::<u32>(q), 0xAABBCCDD);
            assert_eq!(memory::read::<u32>(q + 60), 0);
            natives.free(q);
        }
        assert_eq!(natives.live_allocations(), 0);
    }
}
