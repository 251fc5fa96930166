// scanner.rs - Masked byte-signature scanning over the host's executable image.
//
// Engine binaries ship stripped, so well-known functions are found by byte sequences that
// stay stable within one build. A pattern is a list of (byte, mask) pairs: a mask of 0xFF
// demands an exact byte, 0x00 is a wildcard, anything in between compares only the set
// bits. The scanner returns the FIRST match in address order; picking a unique pattern is
// the caller's job.
//
// Flow:
//   ModuleScanner::new(base, image) -> parse PE section table -> executable ranges
//   scan(pattern)                   -> memmem on the longest exact run, verify full mask
//   read_relative(addr, size)       -> addr + size + signed displacement

use crate::error::{Error, Result};
use byteorder::{ByteOrder, LE};
use serde::Deserialize;
use std::ops::Range;

// ============================================================
// Pattern
// ============================================================

/// A byte signature with per-byte masks and a post-match offset.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(try_from = "String")]
pub struct Pattern {
    bytes: Vec<u8>,
    mask: Vec<u8>,
    offset: usize,
}

impl Pattern {
    /// Build a pattern from raw byte and mask arrays.
    pub fn new(bytes: &[u8], mask: &[u8], offset: usize) -> Result<Self> {
        if bytes.is_empty() {
            return Err(Error::InvalidPattern("empty pattern".into()));
        }
        if bytes.len() != mask.len() {
            return Err(Error::InvalidPattern(format!(
                "{} bytes but {} mask bytes",
                bytes.len(),
                mask.len()
            )));
        }
        Ok(Self {
            bytes: bytes.to_vec(),
            mask: mask.to_vec(),
            offset,
        })
    }

    /// Parse IDA-style text: hex bytes separated by spaces, `?` or `??` for wildcards.
    pub fn parse(text: &str) -> Result<Self> {
        let mut bytes = Vec::new();
        let mut mask = Vec::new();
        for token in text.split_whitespace() {
            if token.chars().all(|c| c == '?') {
                bytes.push(0);
                mask.push(0x00);
                continue;
            }
            let b = u8::from_str_radix(token, 16)
                .map_err(|_| Error::InvalidPattern(format!("bad byte {token:?} in {text:?}")))?;
            bytes.push(b);
            mask.push(0xFF);
        }
        Self::new(&bytes, &mask, 0)
    }

    /// Same pattern with a different post-match offset.
    pub fn with_offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Check the full masked pattern against the start of `data`.
    #[inline]
    pub fn matches(&self, data: &[u8]) -> bool {
        if data.len() < self.bytes.len() {
            return false;
        }
        self.bytes
            .iter()
            .zip(&self.mask)
            .zip(data)
            .all(|((&b, &m), &d)| d & m == b & m)
    }

    /// Longest contiguous run of exact (0xFF mask) bytes, as (start, bytes).
    fn anchor(&self) -> (usize, &[u8]) {
        let mut best = (0, 0);
        let mut start = 0;
        let mut len = 0;
        for (i, &m) in self.mask.iter().enumerate() {
            if m == 0xFF {
                if len == 0 {
                    start = i;
                }
                len += 1;
                if len > best.1 {
                    best = (start, len);
                }
            } else {
                len = 0;
            }
        }
        (best.0, &self.bytes[best.0..best.0 + best.1])
    }

    /// Offset of the first match inside `data`, if any.
    pub fn find_in(&self, data: &[u8]) -> Option<usize> {
        if data.len() < self.len() {
            return None;
        }
        let (anchor_offset, anchor) = self.anchor();

        if anchor.is_empty() {
            return (0..=data.len() - self.len()).find(|&i| self.matches(&data[i..]));
        }

        memchr::memmem::find_iter(data, anchor)
            .filter(|&pos| pos >= anchor_offset)
            .map(|pos| pos - anchor_offset)
            .find(|&start| start + self.len() <= data.len() && self.matches(&data[start..]))
    }
}

impl TryFrom<String> for Pattern {
    type Error = Error;

    fn try_from(text: String) -> Result<Self> {
        Pattern::parse(&text)
    }
}

// ============================================================
// Scanner
// ============================================================

/// Locates patterns and resolves operands inside the host image.
pub trait Scanner: Send + Sync {
    /// Absolute address of the first match plus the pattern's offset.
    fn scan(&self, pattern: &Pattern) -> Result<usize>;

    /// Resolve a relative operand at `address` into the absolute target.
    fn read_relative(&self, address: usize, operand_size: usize) -> Result<usize>;
}

/// Decode a little-endian signed displacement and add it to the end of the operand.
pub fn resolve_displacement(address: usize, operand: &[u8]) -> Result<usize> {
    let disp = match operand.len() {
        1 => operand[0] as i8 as i64,
        2 => LE::read_i16(operand) as i64,
        4 => LE::read_i32(operand) as i64,
        n => {
            return Err(Error::InvalidPattern(format!(
                "unsupported operand size {n}"
            )))
        }
    };
    let end = address as i64 + operand.len() as i64;
    Ok((end + disp) as usize)
}

/// Scanner over a module image mapped at `base`.
pub struct ModuleScanner<'a> {
    base: usize,
    image: &'a [u8],
    /// Executable ranges, as offsets into `image`, in address order
    code: Vec<Range<usize>>,
}

impl<'a> ModuleScanner<'a> {
    pub fn new(base: usize, image: &'a [u8]) -> Self {
        let code = match pe_code_ranges(image) {
            Some(ranges) if !ranges.is_empty() => ranges,
            _ => {
                tracing::debug!("no PE section table at {:#x}, scanning whole image", base);
                vec![0..image.len()]
            }
        };
        Self { base, image, code }
    }

    pub fn base(&self) -> usize {
        self.base
    }

    /// Executable ranges as absolute addresses.
    pub fn code_ranges(&self) -> impl Iterator<Item = Range<usize>> + '_ {
        self.code
            .iter()
            .map(move |r| self.base + r.start..self.base + r.end)
    }
}

#[cfg(windows)]
impl ModuleScanner<'static> {
    /// Scanner over the host's main executable, as mapped in this process.
    pub fn main_module() -> Result<Self> {
        let (base, size) = crate::memory::main_module()
            .ok_or_else(|| Error::ModuleNotFound("main module".into()))?;
        if !crate::memory::is_readable(base, 0x1000) {
            return Err(Error::ModuleNotFound(format!(
                "main module header at {base:#x} unreadable"
            )));
        }
        let image = unsafe { crate::memory::bytes(base, size) };
        Ok(Self::new(base, image))
    }
}

impl Scanner for ModuleScanner<'_> {
    fn scan(&self, pattern: &Pattern) -> Result<usize> {
        for range in &self.code {
            if let Some(pos) = pattern.find_in(&self.image[range.clone()]) {
                return Ok(self.base + range.start + pos + pattern.offset());
            }
        }
        Err(Error::PatternNotFound)
    }

    fn read_relative(&self, address: usize, operand_size: usize) -> Result<usize> {
        let start = address
            .checked_sub(self.base)
            .filter(|off| off + operand_size <= self.image.len())
            .ok_or(Error::OutOfRange {
                table: "module image",
                index: address,
                size: self.image.len(),
            })?;
        resolve_displacement(address, &self.image[start..start + operand_size])
    }
}

// ============================================================
// PE Section Table
// ============================================================

const IMAGE_SCN_CNT_CODE: u32 = 0x0000_0020;
const IMAGE_SCN_MEM_EXECUTE: u32 = 0x2000_0000;

/// Executable section ranges (image offsets) from the PE headers, sorted by address.
fn pe_code_ranges(image: &[u8]) -> Option<Vec<Range<usize>>> {
    if image.len() < 0x40 || &image[0..2] != b"MZ" {
        return None;
    }
    let pe = LE::read_u32(&image[0x3C..0x40]) as usize;
    if pe + 24 > image.len() || &image[pe..pe + 4] != b"PE\0\0" {
        return None;
    }
    let sections = LE::read_u16(&image[pe + 6..pe + 8]) as usize;
    let optional_size = LE::read_u16(&image[pe + 20..pe + 22]) as usize;
    let table = pe + 24 + optional_size;

    let mut ranges = Vec::new();
    for i in 0..sections {
        let hdr = table + i * 40;
        if hdr + 40 > image.len() {
            return None;
        }
        let virtual_size = LE::read_u32(&image[hdr + 8..hdr + 12]) as usize;
        let virtual_address = LE::read_u32(&image[hdr + 12..hdr + 16]) as usize;
        let characteristics = LE::read_u32(&image[hdr + 36..hdr + 40]);

        if characteristics & (IMAGE_SCN_CNT_CODE | IMAGE_SCN_MEM_EXECUTE) == 0 {
            continue;
        }
        let end = (virtual_address + virtual_size).min(image.len());
        if virtual_address < end {
            ranges.push(virtual_address..end);
        }
    }
    ranges.sort_by_key(|r| r.start);
    Some(ranges)
}
