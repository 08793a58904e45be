//! Process-wide loader slot.
//!
//! Programs that want one binding table shared by every caller install a
//! loader here once at startup.

use crate::loader::SymbolLoader;
use log::{info, warn};
use once_cell::sync::OnceCell;
use std::error::Error;
use std::fmt::{Display, Formatter};

static GLOBAL_LOADER: OnceCell<SymbolLoader> = OnceCell::new();

/// Installs the process-wide loader.
///
/// # Errors
/// - `AlreadyInstalled` when a loader was installed before; the existing
///   loader is kept.
pub fn install(loader: SymbolLoader) -> Result<&'static SymbolLoader, GlobalError> {
    let symbols = loader.table().len();
    GLOBAL_LOADER.set(loader).map_err(|_| {
        warn!("event=global_install module=global status=error error_code=already_installed");
        GlobalError::AlreadyInstalled
    })?;
    info!("event=global_install module=global status=ok symbols={symbols}");
    GLOBAL_LOADER.get().ok_or(GlobalError::AlreadyInstalled)
}

/// Returns the process-wide loader, if installed.
pub fn loader() -> Option<&'static SymbolLoader> {
    GLOBAL_LOADER.get()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GlobalError {
    AlreadyInstalled,
}

impl Display for GlobalError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AlreadyInstalled => write!(f, "a process-wide loader is already installed"),
        }
    }
}

impl Error for GlobalError {}
