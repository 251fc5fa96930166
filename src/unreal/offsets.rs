// offsets.rs - Per-version struct layout table.
//
// The bootstrap classes (UObject, UField, UStruct, UClass, UProperty and the two global
// tables) are read through these offsets instead of compiled-in struct definitions, so a
// new host build is a new table rather than new code. Everything past the bootstrap set is
// discovered from reflection at runtime.
//
// UE4 x64 layouts, for reference:
//
//   class UObject {                   class UStruct : UField {
//     void** vtable;         // +0x00   UStruct* SuperField;    // +0x30
//     int32  ObjectFlags;    // +0x08   UField*  Children;      // +0x38
//     int32  InternalIndex;  // +0x0C   int32    PropertySize;  // +0x40
//     UClass* Class;         // +0x10   int32    MinAlignment;  // +0x44
//     FName  Name;           // +0x18   TArray<u8> Script;      // +0x48
//     UObject* Outer;        // +0x20   UProperty* PropertyLink;// +0x58
//   };                                };
//
//   class UProperty : UField {
//     int32 ArrayDim;        // +0x30
//     int32 ElementSize;     // +0x34
//     uint64 PropertyFlags;  // +0x38
//     int32 Offset_Internal; // +0x44
//     UProperty* PropertyLinkNext; // +0x50
//   }; // per-kind payload (PropertyClass, Inner, bool masks, ...) from +0x70

/// Field offsets (and a few element sizes) for one host build.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OffsetTable {
    // -- UObject --
    pub object_flags: usize,
    pub object_internal_index: usize,
    pub object_class: usize,
    pub object_name: usize,
    pub object_outer: usize,
    /// Size of the UObject header; class property sizes start here
    pub object_size: usize,

    // -- UField / UStruct / UClass --
    pub field_next: usize,
    pub struct_super: usize,
    pub struct_children: usize,
    pub struct_property_size: usize,
    pub struct_property_link: usize,
    pub class_default_object: usize,
    /// `TArray<FImplementedInterface>`
    pub class_interfaces: usize,
    pub implemented_interface_size: usize,
    /// `TArray<TPair<FName, int64>>` on UEnum
    pub enum_names: usize,

    // -- UProperty --
    pub property_array_dim: usize,
    pub property_element_size: usize,
    pub property_flags: usize,
    pub property_offset: usize,
    pub property_link_next: usize,
    /// Start of the kind-specific fields
    pub property_payload: usize,

    // -- GNames (TStaticIndirectArray of FNameEntry*) --
    pub names_per_chunk: usize,
    /// Live element count, after the chunk pointer array
    pub names_count: usize,
    /// `FNameEntry::Index`; bit 0 marks a wide entry
    pub name_entry_index: usize,
    pub name_entry_string: usize,

    // -- GObjects (FUObjectArray) --
    /// `FChunkedFixedUObjectArray ObjObjects`
    pub objects_array: usize,
    pub objects_per_chunk: usize,
    /// `FThreadSafeCounter MasterSerialNumber`
    pub objects_serial_counter: usize,
    pub object_item_size: usize,
    pub object_item_flags: usize,
    pub object_item_serial: usize,

    // -- FMalloc vtable slots --
    pub malloc_slot: usize,
    pub realloc_slot: usize,
    pub free_slot: usize,
}
