//! Platform loader backed by `libloading`.

use super::{LibraryOpener, OpenError, SymbolSource};
use crate::slot::ProcAddr;
use libloading::Library;
use log::debug;
use std::ffi::{c_void, CStr};

#[cfg(not(any(unix, windows)))]
compile_error!("dynamic library functions must be defined for this OS");

/// Opens libraries through `dlopen` / `LoadLibrary`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemOpener;

impl SystemOpener {
    pub fn new() -> Self {
        Self
    }
}

impl LibraryOpener for SystemOpener {
    fn open(&self, filename: &str) -> Result<Box<dyn SymbolSource>, OpenError> {
        let library = open_platform(filename)
            .map_err(|err| OpenError::new(filename, err.to_string()))?;
        debug!("event=library_open module=library status=ok filename={filename}");
        Ok(Box::new(SystemLibrary { library }))
    }
}

/// Library handle returned by [`SystemOpener`].
///
/// The handle is closed when this value is dropped; the loader retains every
/// handle it opened for as long as it lives.
#[derive(Debug)]
pub struct SystemLibrary {
    library: Library,
}

impl SymbolSource for SystemLibrary {
    fn symbol(&self, name: &CStr) -> Option<ProcAddr> {
        // `*mut c_void` keeps a null export representable.
        let symbol = unsafe { self.library.get::<*mut c_void>(name.to_bytes_with_nul()) }.ok()?;
        ProcAddr::from_ptr(*symbol)
    }
}

#[cfg(unix)]
fn open_platform(filename: &str) -> Result<Library, libloading::Error> {
    use libloading::os::unix::{Library as UnixLibrary, RTLD_LAZY, RTLD_LOCAL};

    // Lazy binding: unresolved imports inside the library only fail when
    // called. LD_BIND_NOW forces eager binding.
    let library = unsafe { UnixLibrary::open(Some(filename), RTLD_LAZY | RTLD_LOCAL)? };
    Ok(library.into())
}

#[cfg(windows)]
fn open_platform(filename: &str) -> Result<Library, libloading::Error> {
    use libloading::os::windows::{
        Library as WindowsLibrary, LOAD_LIBRARY_SEARCH_DEFAULT_DIRS,
        LOAD_LIBRARY_SEARCH_DLL_LOAD_DIR,
    };

    match unsafe { WindowsLibrary::new(filename) } {
        Ok(library) => Ok(library.into()),
        Err(first) => {
            debug!(
                "event=library_open module=library status=retry filename={filename} error={first}"
            );
            let library = unsafe {
                WindowsLibrary::load_with_flags(
                    filename,
                    LOAD_LIBRARY_SEARCH_DEFAULT_DIRS | LOAD_LIBRARY_SEARCH_DLL_LOAD_DIR,
                )?
            };
            Ok(library.into())
        }
    }
}
