//! In-process symbol sources for statically linked APIs.

use super::{LibraryOpener, OpenError, SymbolSource};
use crate::slot::ProcAddr;
use std::collections::HashMap;
use std::ffi::{c_void, CStr};
use std::sync::Arc;

/// Name → address table standing in for a shared library.
#[derive(Debug, Clone, Default)]
pub struct StaticLibrary {
    symbols: HashMap<String, ProcAddr>,
}

impl StaticLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Exports `name` at `addr`. A null address is not exported.
    pub fn with_symbol(mut self, name: &str, addr: *mut c_void) -> Self {
        if let Some(addr) = ProcAddr::from_ptr(addr) {
            self.symbols.insert(name.to_string(), addr);
        }
        self
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }
}

impl SymbolSource for StaticLibrary {
    fn symbol(&self, name: &CStr) -> Option<ProcAddr> {
        let name = name.to_str().ok()?;
        self.symbols.get(name).copied()
    }
}

/// Opener that serves [`StaticLibrary`] tables by filename.
#[derive(Debug, Clone, Default)]
pub struct StaticOpener {
    libraries: HashMap<String, Arc<StaticLibrary>>,
}

impl StaticOpener {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_library(mut self, filename: &str, library: StaticLibrary) -> Self {
        self.libraries
            .insert(filename.to_string(), Arc::new(library));
        self
    }
}

impl LibraryOpener for StaticOpener {
    fn open(&self, filename: &str) -> Result<Box<dyn SymbolSource>, OpenError> {
        match self.libraries.get(filename) {
            Some(library) => Ok(Box::new(SharedStatic(Arc::clone(library)))),
            None => Err(OpenError::new(
                filename,
                format!("{filename}: cannot open shared object file: No such file or directory"),
            )),
        }
    }
}

struct SharedStatic(Arc<StaticLibrary>);

impl SymbolSource for SharedStatic {
    fn symbol(&self, name: &CStr) -> Option<ProcAddr> {
        self.0.symbol(name)
    }
}
