// gnames.rs - Read-only view over the host's interned name table.
//
// UE4 keeps names in a TStaticIndirectArray: a fixed array of chunk pointers, each chunk
// holding `names_per_chunk` FNameEntry pointers, followed by the live element count. The
// count is re-read on every call because the host keeps interning names while we run.
//
//   GNames -> [chunk 0][chunk 1]...[NumElements]
//               |
//               v
//             [FNameEntry*][FNameEntry*]... -> { Index (bit 0 = wide), HashNext, Name[] }

use crate::error::{Error, Result};
use crate::memory;
use crate::unreal::OffsetTable;

/// Longest name the engine will store
const NAME_SIZE: usize = 1024;

#[derive(Debug, Clone, Copy)]
pub struct GNames {
    base: usize,
    per_chunk: usize,
    count_offset: usize,
    entry_index: usize,
    entry_string: usize,
}

impl GNames {
    /// View over the table at `base` (the address of the chunk array).
    pub fn new(base: usize, offsets: &OffsetTable) -> Self {
        Self {
            base,
            per_chunk: offsets.names_per_chunk,
            count_offset: offsets.names_count,
            entry_index: offsets.name_entry_index,
            entry_string: offsets.name_entry_string,
        }
    }

    pub fn address(&self) -> usize {
        self.base
    }

    /// Live entry count.
    pub fn size(&self) -> usize {
        let count = unsafe { memory::read::<i32>(self.base + self.count_offset) };
        count.max(0) as usize
    }

    /// Entry at `index`, or None for a slot the host hasn't filled.
    pub fn at(&self, index: usize) -> Result<Option<NameEntry>> {
        let size = self.size();
        if index >= size {
            return Err(Error::OutOfRange {
                table: "GNames",
                index,
                size,
            });
        }
        let chunk = unsafe { memory::read_ptr(self.base + (index / self.per_chunk) * 8) };
        if chunk == 0 {
            return Ok(None);
        }
        let entry = unsafe { memory::read_ptr(chunk + (index % self.per_chunk) * 8) };
        if entry == 0 {
            return Ok(None);
        }
        Ok(Some(NameEntry {
            address: entry,
            index_offset: self.entry_index,
            string_offset: self.entry_string,
        }))
    }

    /// Linear search for an exact (case-insensitive) entry string.
    pub fn find(&self, name: &str) -> Option<usize> {
        (0..self.size()).find(|&i| {
            matches!(self.at(i), Ok(Some(entry)) if entry.to_string().eq_ignore_ascii_case(name))
        })
    }
}

/// One `FNameEntry` in host memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NameEntry {
    address: usize,
    index_offset: usize,
    string_offset: usize,
}

impl NameEntry {
    pub fn address(&self) -> usize {
        self.address
    }

    /// Whether the string is stored as UTF-16.
    pub fn is_wide(&self) -> bool {
        unsafe { memory::read::<i32>(self.address + self.index_offset) & 1 != 0 }
    }

    /// The table index the entry records for itself.
    pub fn index(&self) -> i32 {
        unsafe { memory::read::<i32>(self.address + self.index_offset) >> 1 }
    }
}

impl std::fmt::Display for NameEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = unsafe {
            if self.is_wide() {
                memory::read_wstr(self.address + self.string_offset, NAME_SIZE)
            } else {
                memory::read_cstr(self.address + self.string_offset, NAME_SIZE)
            }
        };
        f.write_str(&s)
    }
}
