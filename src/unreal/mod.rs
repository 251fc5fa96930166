// unreal/mod.rs - Typed view of the host's reflection data.
//
// Leaf first: offsets -> fname -> gnames/gobjects -> object/structs -> properties -> runtime.

pub mod fname;
pub mod gnames;
pub mod gobjects;
pub mod object;
pub mod offsets;
pub mod properties;
pub mod runtime;
pub mod structs;

pub use fname::{FName, TArray};
pub use gnames::{GNames, NameEntry};
pub use gobjects::{FWeakObjectPtr, GObjects};
pub use object::{ObjectFlags, UObject};
pub use offsets::OffsetTable;
pub use properties::{PropertyDescriptor, PropertyKind, UProperty, Value};
pub use runtime::Runtime;
pub use structs::{ImplementedInterface, UClass, UFunction, UStruct};
