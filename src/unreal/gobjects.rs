// gobjects.rs - Read-only view over the host's live object table, plus weak pointers.
//
// FUObjectArray wraps a FChunkedFixedUObjectArray:
//
//   struct FChunkedFixedUObjectArray {
//     FUObjectItem** Objects;   // +0x00  chunk pointers
//     FUObjectItem* PreAlloc;   // +0x08
//     int32 MaxElements;        // +0x10
//     int32 NumElements;        // +0x14
//     int32 MaxChunks;          // +0x18
//     int32 NumChunks;          // +0x1C
//   };
//
//   struct FUObjectItem { UObject* Object; int32 Flags; int32 ClusterRootIndex; int32 SerialNumber; };
//
// A weak pointer is (index, serial). It resolves only while the item still carries the same
// serial, which the host bumps whenever a slot is reused.

use crate::error::{Error, Result};
use crate::memory;
use crate::unreal::{OffsetTable, UObject};
use std::sync::atomic::{AtomicI32, Ordering};

const NUM_ELEMENTS: usize = 0x14;

/// `FWeakObjectPtr`
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FWeakObjectPtr {
    pub index: i32,
    pub serial: i32,
}

impl FWeakObjectPtr {
    pub const NULL: FWeakObjectPtr = FWeakObjectPtr {
        index: -1,
        serial: 0,
    };

    pub fn is_null(&self) -> bool {
        self.index < 0 || self.serial == 0
    }
}

impl Default for FWeakObjectPtr {
    fn default() -> Self {
        Self::NULL
    }
}

#[derive(Debug, Clone, Copy)]
pub struct GObjects {
    base: usize,
    objects: usize,
    per_chunk: usize,
    serial_counter: usize,
    item_size: usize,
    item_serial: usize,
}

impl GObjects {
    /// View over the `FUObjectArray` at `base`.
    pub fn new(base: usize, offsets: &OffsetTable) -> Self {
        Self {
            base,
            objects: base + offsets.objects_array,
            per_chunk: offsets.objects_per_chunk,
            serial_counter: base + offsets.objects_serial_counter,
            item_size: offsets.object_item_size,
            item_serial: offsets.object_item_serial,
        }
    }

    pub fn address(&self) -> usize {
        self.base
    }

    /// Live item count, re-read every call.
    pub fn size(&self) -> usize {
        let count = unsafe { memory::read::<i32>(self.objects + NUM_ELEMENTS) };
        count.max(0) as usize
    }

    /// Address of the `FUObjectItem` for `index`, or None when its chunk is missing.
    fn item(&self, index: usize) -> Result<Option<usize>> {
        let size = self.size();
        if index >= size {
            return Err(Error::OutOfRange {
                table: "GObjects",
                index,
                size,
            });
        }
        let chunks = unsafe { memory::read_ptr(self.objects) };
        if chunks == 0 {
            return Ok(None);
        }
        let chunk = unsafe { memory::read_ptr(chunks + (index / self.per_chunk) * 8) };
        if chunk == 0 {
            return Ok(None);
        }
        Ok(Some(chunk + (index % self.per_chunk) * self.item_size))
    }

    /// Object at `index`; None for a free slot.
    pub fn at(&self, index: usize) -> Result<Option<UObject>> {
        Ok(self
            .item(index)?
            .and_then(|item| UObject::from_ptr(unsafe { memory::read_ptr(item) })))
    }

    /// Every live object, in index order.
    pub fn iter(&self) -> impl Iterator<Item = UObject> + '_ {
        (0..self.size()).filter_map(move |i| self.at(i).ok().flatten())
    }

    fn serial_cell(&self, item: usize) -> &AtomicI32 {
        unsafe { &*((item + self.item_serial) as *const AtomicI32) }
    }

    /// Object a weak pointer refers to, if it's still alive.
    pub fn resolve_weak(&self, weak: &FWeakObjectPtr) -> Option<UObject> {
        if weak.is_null() {
            return None;
        }
        let item = self.item(weak.index as usize).ok().flatten()?;
        if self.serial_cell(item).load(Ordering::Acquire) != weak.serial {
            return None;
        }
        UObject::from_ptr(unsafe { memory::read_ptr(item) })
    }

    /// Weak pointer to the object in slot `index`, assigning the slot a serial number if
    /// it doesn't have one yet.
    pub fn weak_for(&self, index: usize) -> Result<FWeakObjectPtr> {
        let item = self.item(index)?.ok_or(Error::OutOfRange {
            table: "GObjects",
            index,
            size: self.size(),
        })?;

        let cell = self.serial_cell(item);
        let mut serial = cell.load(Ordering::Acquire);
        if serial == 0 {
            let counter = unsafe { &*(self.serial_counter as *const AtomicI32) };
            let fresh = counter.fetch_add(1, Ordering::AcqRel) + 1;
            // Another thread may have assigned one in the meantime; theirs wins
            serial = match cell.compare_exchange(0, fresh, Ordering::AcqRel, Ordering::Acquire) {
                Ok(_) => fresh,
                Err(existing) => existing,
            };
        }
        Ok(FWeakObjectPtr {
            index: index as i32,
            serial,
        })
    }
}
