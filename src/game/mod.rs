// game/mod.rs - What changes from one host build to the next.
//
// A host version bundles three kinds of data: the byte signatures used to find the engine's
// functions and globals, the struct offset table, and the calling conventions of the native
// functions once found. Everything else in the crate is version-agnostic.
//
// Flow:
//   host.signatures().resolve(scanner) -> Addresses   (one scan per signature, fatal on miss)
//   host.bind(&addresses, &trampolines) -> Natives    (typed wrappers over raw addresses)

pub mod bl3;

pub use bl3::Bl3;

use crate::error::{Error, Result};
use crate::scanner::{Pattern, Scanner};
use crate::unreal::{FName, OffsetTable, UClass, UFunction, UObject};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use widestring::U16CStr;

// ============================================================
// Natives
// ============================================================

/// Host functions the core calls into.
///
/// All of these run host code on raw addresses; the caller vouches for their validity.
pub trait Natives: Send + Sync {
    /// Zeroed allocation from `GMalloc`. 0 on failure.
    unsafe fn malloc(&self, len: usize) -> usize;
    unsafe fn realloc(&self, ptr: usize, len: usize) -> usize;
    unsafe fn free(&self, ptr: usize);
    /// `FName::Init` in find-or-add mode.
    unsafe fn fname_init(&self, name: &U16CStr, number: i32) -> FName;
    unsafe fn fframe_step(&self, frame: usize, object: UObject, param: usize);
    /// Unhooked `ProcessEvent`.
    unsafe fn process_event(&self, object: UObject, function: UFunction, params: usize);
    /// `StaticConstructObject_Internal` with default secondary arguments.
    unsafe fn construct_object(
        &self,
        class: UClass,
        outer: Option<UObject>,
        name: FName,
        flags: u32,
        template: Option<UObject>,
    ) -> Option<UObject>;
}

// ============================================================
// Signatures
// ============================================================

/// How a pattern match turns into an address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Resolve {
    /// The match (plus the pattern offset) is the address
    Direct,
    /// The match is a 4-byte rip-relative operand
    Relative,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature {
    pub pattern: Pattern,
    pub resolve: Resolve,
    /// The resolved address holds a pointer to the real target
    pub deref: bool,
}

impl Signature {
    pub fn direct(pattern: Pattern) -> Self {
        Self {
            pattern,
            resolve: Resolve::Direct,
            deref: false,
        }
    }

    pub fn relative(pattern: Pattern) -> Self {
        Self {
            pattern,
            resolve: Resolve::Relative,
            deref: false,
        }
    }

    pub fn deref(mut self) -> Self {
        self.deref = true;
        self
    }

    pub fn resolve(&self, scanner: &dyn Scanner) -> Result<usize> {
        let found = scanner.scan(&self.pattern)?;
        let addr = match self.resolve {
            Resolve::Direct => found,
            Resolve::Relative => scanner.read_relative(found, 4)?,
        };
        if self.deref {
            let target = unsafe { crate::memory::read_ptr(addr) };
            if target == 0 {
                return Err(Error::PatternNotFound);
            }
            Ok(target)
        } else {
            Ok(addr)
        }
    }
}

/// Optional per-field replacement for a built-in signature, as read from the config file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SignatureOverride {
    pub pattern: Option<Pattern>,
    pub offset: Option<usize>,
    pub resolve: Option<Resolve>,
    pub deref: Option<bool>,
}

macro_rules! signature_set {
    ($($field:ident => $label:literal),* $(,)?) => {
        /// One signature per well-known engine function or global.
        #[derive(Debug, Clone, PartialEq, Eq)]
        pub struct SignatureSet {
            $(pub $field: Signature,)*
        }

        /// The resolved address of every signature in a `SignatureSet`.
        #[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
        pub struct Addresses {
            $(pub $field: usize,)*
        }

        impl SignatureSet {
            /// Resolve every signature. The first miss aborts, naming the signature.
            pub fn resolve(&self, scanner: &dyn Scanner) -> Result<Addresses> {
                Ok(Addresses {
                    $($field: {
                        let addr = self.$field
                            .resolve(scanner)
                            .map_err(|e| Error::resolution($label, e))?;
                        tracing::debug!("{}: {:#x}", $label, addr);
                        addr
                    },)*
                })
            }

            fn get_mut(&mut self, name: &str) -> Option<&mut Signature> {
                match name {
                    $(stringify!($field) => Some(&mut self.$field),)*
                    _ => None,
                }
            }

            /// Field names accepted in `[signatures.<name>]`.
            pub fn names() -> &'static [&'static str] {
                &[$(stringify!($field)),*]
            }
        }
    };
}

signature_set! {
    process_event => "UObject::ProcessEvent",
    call_function => "UObject::CallFunction",
    gobjects => "GObjects",
    gnames => "GNames",
    fname_init => "FName::Init",
    fframe_step => "FFrame::Step",
    gmalloc => "GMalloc",
    construct_object => "StaticConstructObject",
}

impl SignatureSet {
    /// Apply config overrides by field name. Unknown names are rejected.
    pub fn apply_overrides(&mut self, overrides: &BTreeMap<String, SignatureOverride>) -> Result<()> {
        for (name, o) in overrides {
            let sig = self.get_mut(name).ok_or_else(|| {
                Error::InvalidPattern(format!(
                    "unknown signature {name:?}, expected one of {:?}",
                    Self::names()
                ))
            })?;
            if let Some(pattern) = &o.pattern {
                sig.pattern = pattern.clone().with_offset(sig.pattern.offset());
            }
            if let Some(offset) = o.offset {
                sig.pattern = sig.pattern.clone().with_offset(offset);
            }
            if let Some(resolve) = o.resolve {
                sig.resolve = resolve;
            }
            if let Some(deref) = o.deref {
                sig.deref = deref;
            }
            tracing::info!("signature {} overridden from config", name);
        }
        Ok(())
    }
}

// ============================================================
// Host version
// ============================================================

/// Addresses that run the original body of each hooked function.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Trampolines {
    pub process_event: usize,
    pub call_function: usize,
}

/// One supported host build.
pub trait HostVersion: Send + Sync {
    fn name(&self) -> &'static str;
    fn signatures(&self) -> Result<SignatureSet>;
    fn offsets(&self) -> OffsetTable;
    /// Wrap the resolved addresses in callable natives.
    fn bind(&self, addresses: &Addresses, trampolines: &Trampolines) -> Arc<dyn Natives>;
}

/// A host version with some of its signatures replaced.
pub struct Overridden {
    inner: Arc<dyn HostVersion>,
    signatures: SignatureSet,
}

impl Overridden {
    pub fn new(
        inner: Arc<dyn HostVersion>,
        overrides: &BTreeMap<String, SignatureOverride>,
    ) -> Result<Self> {
        let mut signatures = inner.signatures()?;
        signatures.apply_overrides(overrides)?;
        Ok(Self { inner, signatures })
    }
}

impl HostVersion for Overridden {
    fn name(&self) -> &'static str {
        self.inner.name()
    }

    fn signatures(&self) -> Result<SignatureSet> {
        Ok(self.signatures.clone())
    }

    fn offsets(&self) -> OffsetTable {
        self.inner.offsets()
    }

    fn bind(&self, addresses: &Addresses, trampolines: &Trampolines) -> Arc<dyn Natives> {
        self.inner.bind(addresses, trampolines)
    }
}
