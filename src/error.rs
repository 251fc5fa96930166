// error.rs - Error type shared by every layer of the crate.
//
// Startup failures (Resolution, HookInstall) abort initialization. Everything else is
// handed back to the caller, who decides whether it matters.

use crate::hook::HookState;

/// Result alias used throughout the crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The scanner found no match for a pattern
    #[error("pattern not found in module code")]
    PatternNotFound,

    /// The module to scan is not mapped, or its image can't be read
    #[error("module not found: {0}")]
    ModuleNotFound(String),

    /// A pattern definition could not be parsed
    #[error("invalid pattern: {0}")]
    InvalidPattern(String),

    /// A required signature failed to resolve at startup
    #[error("failed to resolve {name}: {source}")]
    Resolution {
        name: &'static str,
        #[source]
        source: Box<Error>,
    },

    /// Index past the live count of a host table
    #[error("{table} index {index} out of range (size {size})")]
    OutOfRange {
        table: &'static str,
        index: usize,
        size: usize,
    },

    /// The hook backend refused an operation
    #[error("hook on {name} failed: {reason}")]
    HookInstall { name: &'static str, reason: String },

    /// An entry point was asked for a transition its current state doesn't allow
    #[error("hook on {name} cannot {action} while {state}")]
    HookState {
        name: &'static str,
        action: &'static str,
        state: HookState,
    },

    #[error("unsupported property type {0}")]
    UnsupportedProperty(String),

    #[error("property {0} not found")]
    PropertyNotFound(String),

    /// A value of the wrong shape (or class) was written to a property
    #[error("cannot write {got} to {property}: expected {expected}")]
    TypeMismatch {
        property: String,
        expected: String,
        got: String,
    },

    #[error("{0} is not a soft or lazy reference property")]
    NotIndirect(String),

    #[error("host allocator failed to provide {0} bytes")]
    AllocationFailed(usize),

    #[error("sdk has not been initialized")]
    NotInitialized,

    /// Unreadable config file or setting, or logging could not be set up
    #[error("config: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<toml::de::Error> for Error {
    fn from(e: toml::de::Error) -> Self {
        Error::Config(e.to_string())
    }
}

impl Error {
    /// Wraps a scanner failure with the name of the signature being resolved.
    pub fn resolution(name: &'static str, source: Error) -> Self {
        Error::Resolution {
            name,
            source: Box::new(source),
        }
    }
}
