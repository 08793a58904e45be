//! Dynamic symbol loading for C APIs.
//!
//! Opens an API's shared library, binds its core symbols eagerly and its
//! extension symbols on demand, and keeps every binding in one table owned by
//! a [`SymbolLoader`].

pub mod global;
pub mod library;
pub mod loader;
pub mod logging;
pub mod manifest;
pub mod platform;
pub mod resolver;
pub mod slot;
pub mod table;

pub use library::{
    LibraryOpener, OpenError, StaticLibrary, StaticOpener, SymbolSource, SystemOpener,
};
pub use loader::{
    CoreReport, LoadError, SlotState, SymbolLoader, SymbolLoaderBuilder, LOAD_FAILURE_EXIT_CODE,
};
pub use logging::{default_log_level, init_logging, logging_status, LoggingError};
pub use manifest::{ExtensionDecl, ManifestError, ResolverDecl, SymbolDecl, TableManifest};
pub use platform::{GuardSet, LibraryNaming};
pub use resolver::{EntryPointResolver, GetProcAddrFn, NoResolver, ProcResolver};
pub use slot::{DeviceHandle, InstanceHandle, ProcAddr, SlotCategory};
pub use table::{ExtensionEntry, SymbolInfo, SymbolTable, TableError};

/// Builds a table for the compile target from a JSON manifest.
///
/// # Errors
/// - `Parse` when the JSON is malformed.
/// - `Invalid` when the declarations break a table invariant.
pub fn table_from_json(raw: &str) -> Result<SymbolTable, ManifestError> {
    let manifest = TableManifest::from_json_str(raw)?;
    Ok(SymbolTable::build(&manifest, &GuardSet::target())?)
}

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
