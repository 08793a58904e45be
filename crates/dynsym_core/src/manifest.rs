//! Declarative symbol-table manifest.
//!
//! A manifest lists the core symbols of an API, its instance- and device-level
//! extensions, and the entry points used to resolve extension symbols. It is
//! read from JSON or assembled with the builder methods, then turned into a
//! [`SymbolTable`](crate::SymbolTable) for one [`GuardSet`](crate::GuardSet).

use crate::table::TableError;
use log::{error, info};
use serde::Deserialize;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::Path;

/// Full declaration of one API's symbols.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TableManifest {
    #[serde(default)]
    pub resolvers: ResolverDecl,
    #[serde(default)]
    pub core: Vec<SymbolDecl>,
    #[serde(default)]
    pub instance_extensions: Vec<ExtensionDecl>,
    #[serde(default)]
    pub device_extensions: Vec<ExtensionDecl>,
}

/// Core entry points that resolve extension symbols.
///
/// Both name core symbols with the signature
/// `extern "system" fn(handle, *const c_char) -> *mut c_void`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ResolverDecl {
    pub instance: Option<String>,
    pub device: Option<String>,
}

/// One symbol, either a bare name or `{ "name": .., "guard": .. }`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum SymbolDecl {
    Name(String),
    Guarded {
        name: String,
        #[serde(default)]
        guard: Option<String>,
    },
}

impl SymbolDecl {
    pub fn name(&self) -> &str {
        match self {
            Self::Name(name) => name,
            Self::Guarded { name, .. } => name,
        }
    }

    pub fn guard(&self) -> Option<&str> {
        match self {
            Self::Name(_) => None,
            Self::Guarded { guard, .. } => guard.as_deref(),
        }
    }
}

impl From<&str> for SymbolDecl {
    fn from(value: &str) -> Self {
        Self::Name(value.to_string())
    }
}

/// One named extension and the symbols it provides.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExtensionDecl {
    pub name: String,
    #[serde(default)]
    pub guard: Option<String>,
    #[serde(default)]
    pub symbols: Vec<SymbolDecl>,
}

impl ExtensionDecl {
    pub fn new<I, S>(name: &str, symbols: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<SymbolDecl>,
    {
        Self {
            name: name.to_string(),
            guard: None,
            symbols: symbols.into_iter().map(Into::into).collect(),
        }
    }

    pub fn guarded(mut self, guard: &str) -> Self {
        self.guard = Some(guard.to_string());
        self
    }
}

impl TableManifest {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a JSON manifest.
    pub fn from_json_str(raw: &str) -> Result<Self, ManifestError> {
        serde_json::from_str(raw).map_err(ManifestError::Parse)
    }

    /// Reads and parses a JSON manifest file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ManifestError> {
        let path = path.as_ref();
        let result = std::fs::read_to_string(path)
            .map_err(ManifestError::Io)
            .and_then(|raw| Self::from_json_str(&raw));
        match &result {
            Ok(manifest) => info!(
                "event=manifest_load module=manifest status=ok path={} core={} instance_extensions={} device_extensions={}",
                path.display(),
                manifest.core.len(),
                manifest.instance_extensions.len(),
                manifest.device_extensions.len()
            ),
            Err(err) => error!(
                "event=manifest_load module=manifest status=error path={} error={}",
                path.display(),
                err
            ),
        }
        result
    }

    pub fn core(mut self, name: &str) -> Self {
        self.core.push(SymbolDecl::from(name));
        self
    }

    pub fn core_guarded(mut self, name: &str, guard: &str) -> Self {
        self.core.push(SymbolDecl::Guarded {
            name: name.to_string(),
            guard: Some(guard.to_string()),
        });
        self
    }

    pub fn instance_extension(mut self, extension: ExtensionDecl) -> Self {
        self.instance_extensions.push(extension);
        self
    }

    pub fn device_extension(mut self, extension: ExtensionDecl) -> Self {
        self.device_extensions.push(extension);
        self
    }

    pub fn instance_resolver(mut self, entry_point: &str) -> Self {
        self.resolvers.instance = Some(entry_point.to_string());
        self
    }

    pub fn device_resolver(mut self, entry_point: &str) -> Self {
        self.resolvers.device = Some(entry_point.to_string());
        self
    }
}

/// Manifest read/parse/validation errors.
#[derive(Debug)]
pub enum ManifestError {
    Io(std::io::Error),
    Parse(serde_json::Error),
    Invalid(TableError),
}

impl Display for ManifestError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(err) => write!(f, "failed to read manifest: {err}"),
            Self::Parse(err) => write!(f, "failed to parse manifest: {err}"),
            Self::Invalid(err) => write!(f, "invalid manifest: {err}"),
        }
    }
}

impl Error for ManifestError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            Self::Parse(err) => Some(err),
            Self::Invalid(err) => Some(err),
        }
    }
}

impl From<TableError> for ManifestError {
    fn from(value: TableError) -> Self {
        Self::Invalid(value)
    }
}
