//! Shared-library access.
//!
//! # Responsibility
//! - Open a library by filename through the platform loader.
//! - Look up exported symbols by exact name.
//!
//! # Invariants
//! - A missing symbol is `None`, never an error.
//! - An open failure always names the attempted filename.

mod memory;
mod system;

pub use memory::{StaticLibrary, StaticOpener};
pub use system::{SystemLibrary, SystemOpener};

use crate::slot::ProcAddr;
use std::error::Error;
use std::ffi::CStr;
use std::fmt::{Display, Formatter};

/// An opened library that can answer symbol lookups.
pub trait SymbolSource: Send + Sync {
    /// Resolves `name` exactly as exported. Absent symbols are `None`.
    fn symbol(&self, name: &CStr) -> Option<ProcAddr>;
}

/// Opens libraries by filename.
pub trait LibraryOpener: Send + Sync {
    fn open(&self, filename: &str) -> Result<Box<dyn SymbolSource>, OpenError>;
}

/// One failed attempt to open a library.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenError {
    pub filename: String,
    /// Platform loader message (`dlerror()` text, Windows error, ...).
    pub message: String,
}

impl OpenError {
    pub fn new(filename: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            filename: filename.into(),
            message: message.into(),
        }
    }
}

impl Display for OpenError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "failed to open dynamic library \"{}\": {}",
            self.filename, self.message
        )
    }
}

impl Error for OpenError {}
