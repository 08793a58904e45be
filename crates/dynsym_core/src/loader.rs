//! Dynamic symbol loader.
//!
//! # Responsibility
//! - Open the API's shared library and bind every core symbol.
//! - Bind one extension's symbols on demand through a [`ProcResolver`].
//! - Clear all extension bindings for re-initialization.
//!
//! # Invariants
//! - Core slots are written only by `init_core` and never cleared.
//! - An extension initializer writes only the slots its extension owns.
//! - Unknown extension names and missing symbols are not errors.
//! - Opened libraries stay loaded for the lifetime of the loader.
//! - `init_core` never returns after a failed load.

use crate::library::{LibraryOpener, OpenError, SymbolSource, SystemOpener};
use crate::platform::LibraryNaming;
use crate::resolver::{EntryPointResolver, NoResolver, ProcResolver};
use crate::slot::{DeviceHandle, InstanceHandle, ProcAddr, Slot, SlotCategory};
use crate::table::{ExtensionEntry, SymbolTable};
use log::{debug, error, info, warn};
use std::error::Error;
use std::ffi::CStr;
use std::fmt::{Display, Formatter};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

/// Exit status used when the library cannot be loaded.
pub const LOAD_FAILURE_EXIT_CODE: i32 = 1;

/// Outcome of a successful `init_core`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoreReport {
    /// Filename that opened.
    pub library: String,
    /// Core slots now holding an address.
    pub resolved: usize,
    /// Core slots left null because the library does not export them.
    pub missing: usize,
}

/// One slot as observed at a point in time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotState {
    pub name: String,
    pub category: SlotCategory,
    pub value: Option<ProcAddr>,
}

struct LoadedLibrary {
    filename: String,
    _source: Box<dyn SymbolSource>,
}

/// Owner of one binding table.
pub struct SymbolLoader {
    table: Arc<SymbolTable>,
    slots: Box<[Slot]>,
    naming: LibraryNaming,
    opener: Box<dyn LibraryOpener>,
    resolver: Box<dyn ProcResolver>,
    libraries: Mutex<Vec<LoadedLibrary>>,
}

impl SymbolLoader {
    pub fn builder(table: impl Into<Arc<SymbolTable>>) -> SymbolLoaderBuilder {
        SymbolLoaderBuilder {
            table: table.into(),
            naming: LibraryNaming::current(),
            opener: None,
            resolver: None,
        }
    }

    /// Loader with the system opener and the table's entry-point resolver.
    pub fn new(table: impl Into<Arc<SymbolTable>>) -> Self {
        Self::builder(table).build()
    }

    pub fn table(&self) -> &SymbolTable {
        &self.table
    }

    /// Opens the `api_name` library and binds every core symbol.
    ///
    /// On failure the diagnostic is printed to standard output and the
    /// process exits with [`LOAD_FAILURE_EXIT_CODE`].
    pub fn init_core(&self, api_name: &str) -> CoreReport {
        match self.try_init_core(api_name) {
            Ok(report) => report,
            Err(err) => {
                println!("{err}");
                std::process::exit(LOAD_FAILURE_EXIT_CODE);
            }
        }
    }

    /// Non-terminating form of [`SymbolLoader::init_core`].
    ///
    /// # Errors
    /// - `InvalidApiName` when `api_name` is empty or contains NUL.
    /// - `LibraryNotFound` when no candidate filename opens.
    pub fn try_init_core(&self, api_name: &str) -> Result<CoreReport, LoadError> {
        let started_at = Instant::now();
        if api_name.is_empty() || api_name.contains('\0') {
            error!("event=core_init module=loader status=error error_code=invalid_api_name");
            return Err(LoadError::InvalidApiName(api_name.to_string()));
        }

        let (filename, source) = self.open_library(api_name).inspect_err(|err| {
            error!(
                "event=core_init module=loader status=error api={} duration_ms={} error={}",
                api_name,
                started_at.elapsed().as_millis(),
                err
            );
        })?;

        let mut resolved = 0;
        let mut missing = 0;
        for (index, info) in self.table.core_symbols() {
            let value = source.symbol(info.c_name());
            if value.is_some() {
                resolved += 1;
            } else {
                missing += 1;
                debug!(
                    "event=core_symbol module=loader status=skip symbol={}",
                    info.name()
                );
            }
            self.slots[index].store(value);
        }

        self.retain(filename.clone(), source);
        info!(
            "event=core_init module=loader status=ok api={} library={} resolved={} missing={} duration_ms={}",
            api_name,
            filename,
            resolved,
            missing,
            started_at.elapsed().as_millis()
        );
        Ok(CoreReport {
            library: filename,
            resolved,
            missing,
        })
    }

    /// Binds the symbols of one instance-level extension.
    ///
    /// Returns `false` and changes nothing when the name is not a
    /// dispatchable instance extension.
    pub fn init_instance_extension(&self, instance: InstanceHandle, extension_name: &str) -> bool {
        let Some(entry) = self.table.instance_extension(extension_name) else {
            self.log_unknown("instance", extension_name);
            return false;
        };
        self.bind_extension(entry, |name| {
            self.resolver.instance_proc(self, instance, name)
        });
        true
    }

    /// Binds the symbols of one device-level extension.
    ///
    /// Returns `false` and changes nothing when the name is not a
    /// dispatchable device extension.
    pub fn init_device_extension(
        &self,
        instance: InstanceHandle,
        device: DeviceHandle,
        extension_name: &str,
    ) -> bool {
        let Some(entry) = self.table.device_extension(extension_name) else {
            self.log_unknown("device", extension_name);
            return false;
        };
        self.bind_extension(entry, |name| {
            self.resolver.device_proc(self, instance, device, name)
        });
        true
    }

    /// Nulls every extension slot. Core slots are left as they are.
    pub fn reset_all_extensions(&self) {
        let mut cleared = 0;
        for (index, _) in self.table.extension_symbols() {
            self.slots[index].store(None);
            cleared += 1;
        }
        info!("event=extensions_reset module=loader status=ok cleared={cleared}");
    }

    /// Current value of the slot named `name`.
    pub fn proc_addr(&self, name: &str) -> Option<ProcAddr> {
        let index = self.table.index_of(name)?;
        self.slots[index].load()
    }

    /// Current value of `name` as a typed function pointer.
    ///
    /// # Safety
    /// `F` must match the exported signature and calling convention of `name`.
    pub unsafe fn proc_as<F: Copy>(&self, name: &str) -> Option<F> {
        self.proc_addr(name).map(|addr| unsafe { addr.cast::<F>() })
    }

    /// Whether `init_core` has succeeded at least once.
    pub fn is_core_ready(&self) -> bool {
        self.lock_libraries().last().is_some()
    }

    /// Filename of the most recently opened library.
    pub fn loaded_library(&self) -> Option<String> {
        self.lock_libraries()
            .last()
            .map(|library| library.filename.clone())
    }

    /// All slots in table order.
    pub fn snapshot(&self) -> Vec<SlotState> {
        self.table
            .symbols()
            .iter()
            .zip(self.slots.iter())
            .map(|(info, slot)| SlotState {
                name: info.name().to_string(),
                category: info.category(),
                value: slot.load(),
            })
            .collect()
    }

    fn open_library(&self, api_name: &str) -> Result<(String, Box<dyn SymbolSource>), LoadError> {
        let mut attempts = Vec::new();
        for filename in self.naming.candidates(api_name) {
            match self.opener.open(&filename) {
                Ok(source) => return Ok((filename, source)),
                Err(err) => {
                    debug!(
                        "event=library_open module=loader status=error filename={} error={}",
                        err.filename, err.message
                    );
                    attempts.push(err);
                }
            }
        }
        Err(LoadError::LibraryNotFound {
            api_name: api_name.to_string(),
            attempts,
        })
    }

    fn bind_extension(
        &self,
        entry: &ExtensionEntry,
        resolve: impl Fn(&CStr) -> Option<ProcAddr>,
    ) {
        let mut resolved = 0;
        for &index in entry.slots() {
            let value = resolve(self.table.symbols()[index].c_name());
            resolved += usize::from(value.is_some());
            self.slots[index].store(value);
        }
        info!(
            "event=extension_init module=loader status=ok extension={} resolved={} missing={}",
            entry.name(),
            resolved,
            entry.slots().len() - resolved
        );
    }

    fn log_unknown(&self, scope: &str, extension_name: &str) {
        debug!(
            "event=extension_unknown module=loader status=skip scope={scope} extension={extension_name}"
        );
    }

    fn retain(&self, filename: String, source: Box<dyn SymbolSource>) {
        self.lock_libraries().push(LoadedLibrary {
            filename,
            _source: source,
        });
    }

    fn lock_libraries(&self) -> std::sync::MutexGuard<'_, Vec<LoadedLibrary>> {
        self.libraries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for SymbolLoader {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SymbolLoader")
            .field("symbols", &self.table.len())
            .field("naming", &self.naming)
            .field("library", &self.loaded_library())
            .finish()
    }
}

/// Wiring for a [`SymbolLoader`].
pub struct SymbolLoaderBuilder {
    table: Arc<SymbolTable>,
    naming: LibraryNaming,
    opener: Option<Box<dyn LibraryOpener>>,
    resolver: Option<Box<dyn ProcResolver>>,
}

impl SymbolLoaderBuilder {
    pub fn opener(mut self, opener: impl LibraryOpener + 'static) -> Self {
        self.opener = Some(Box::new(opener));
        self
    }

    pub fn resolver(mut self, resolver: impl ProcResolver + 'static) -> Self {
        self.resolver = Some(Box::new(resolver));
        self
    }

    /// Overrides the filename convention of the compile target.
    pub fn naming(mut self, naming: LibraryNaming) -> Self {
        self.naming = naming;
        self
    }

    pub fn build(self) -> SymbolLoader {
        let resolver = self.resolver.unwrap_or_else(|| {
            match EntryPointResolver::from_table(&self.table) {
                Some(resolver) => Box::new(resolver),
                None => {
                    warn!("event=loader_build module=loader status=skip reason=no_resolver_entry_points");
                    Box::new(NoResolver)
                }
            }
        });
        let slots = (0..self.table.len()).map(|_| Slot::default()).collect();
        SymbolLoader {
            table: self.table,
            slots,
            naming: self.naming,
            opener: self.opener.unwrap_or_else(|| Box::new(SystemOpener::new())),
            resolver,
            libraries: Mutex::new(Vec::new()),
        }
    }
}

/// Library load failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadError {
    InvalidApiName(String),
    LibraryNotFound {
        api_name: String,
        /// Every failed attempt, in order.
        attempts: Vec<OpenError>,
    },
}

impl LoadError {
    /// The last attempt, which is what the diagnostic reports.
    pub fn last_attempt(&self) -> Option<&OpenError> {
        match self {
            Self::InvalidApiName(_) => None,
            Self::LibraryNotFound { attempts, .. } => attempts.last(),
        }
    }
}

impl Display for LoadError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidApiName(value) => {
                write!(f, "invalid library identifier: {value:?}")
            }
            Self::LibraryNotFound { api_name, attempts } => match attempts.last() {
                Some(last) => write!(f, "{last}"),
                None => write!(f, "no library candidates for api {api_name}"),
            },
        }
    }
}

impl Error for LoadError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        self.last_attempt().map(|err| err as &(dyn Error + 'static))
    }
}

#[cfg(test)]
mod tests {
    use super::{LoadError, SymbolLoader};
    use crate::library::{StaticLibrary, StaticOpener};
    use crate::manifest::{ExtensionDecl, TableManifest};
    use crate::platform::{GuardSet, LibraryNaming};
    use crate::resolver::NoResolver;
    use crate::slot::InstanceHandle;
    use crate::table::SymbolTable;
    use std::ffi::c_void;

    extern "C" fn demo_foo() {}

    fn addr() -> *mut c_void {
        demo_foo as *const () as *mut c_void
    }

    fn loader(opener: StaticOpener) -> SymbolLoader {
        let manifest = TableManifest::new()
            .core("demoFoo")
            .core("demoBar")
            .instance_extension(ExtensionDecl::new("DEMO_ext1", ["demoExt1Fn"]));
        let table = SymbolTable::build(&manifest, &GuardSet::new()).expect("table");
        SymbolLoader::builder(table)
            .naming(LibraryNaming::Unix)
            .opener(opener)
            .resolver(NoResolver)
            .build()
    }

    #[test]
    fn falls_back_to_versioned_soname() {
        let opener = StaticOpener::new().with_library(
            "libdemo.so.1",
            StaticLibrary::new().with_symbol("demoFoo", addr()),
        );
        let loader = loader(opener);

        let report = loader.try_init_core("demo").expect("init core");
        assert_eq!(report.library, "libdemo.so.1");
        assert_eq!(report.resolved, 1);
        assert_eq!(report.missing, 1);
        assert_eq!(loader.loaded_library().as_deref(), Some("libdemo.so.1"));
        assert!(loader.proc_addr("demoBar").is_none());
    }

    #[test]
    fn reports_every_failed_candidate() {
        let loader = loader(StaticOpener::new());
        let err = loader.try_init_core("demo").unwrap_err();
        match &err {
            LoadError::LibraryNotFound { api_name, attempts } => {
                assert_eq!(api_name, "demo");
                let names: Vec<&str> = attempts.iter().map(|a| a.filename.as_str()).collect();
                assert_eq!(names, vec!["libdemo.so", "libdemo.so.1"]);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(err.to_string().contains("\"libdemo.so.1\""));
        assert!(!loader.is_core_ready());
    }

    #[test]
    fn rejects_empty_api_name() {
        let loader = loader(StaticOpener::new());
        assert_eq!(
            loader.try_init_core("").unwrap_err(),
            LoadError::InvalidApiName(String::new())
        );
    }

    #[test]
    fn no_resolver_leaves_extension_slots_null() {
        let opener = StaticOpener::new().with_library(
            "libdemo.so",
            StaticLibrary::new().with_symbol("demoExt1Fn", addr()),
        );
        let loader = loader(opener);
        loader.try_init_core("demo").expect("init core");

        let mut token = 0u8;
        let instance =
            InstanceHandle::from_raw(&mut token as *mut u8 as *mut c_void).expect("non-null");
        assert!(loader.init_instance_extension(instance, "DEMO_ext1"));
        assert!(loader.proc_addr("demoExt1Fn").is_none());
    }
}
