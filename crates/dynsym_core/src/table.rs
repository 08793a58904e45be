//! Guard-filtered symbol table with extension dispatch maps.
//!
//! # Responsibility
//! - Validate a [`TableManifest`] and assign one slot index per symbol.
//! - Build the extension name → slots mappings exactly once.
//!
//! # Invariants
//! - Slot names are unique across the table.
//! - A slot has exactly one category; a symbol shared by several extensions
//!   must be shared within one scope.
//! - Extensions without symbols are not part of the dispatch maps.
//! - Resolver entry points are core symbols.

use crate::manifest::{ExtensionDecl, SymbolDecl, TableManifest};
use crate::platform::GuardSet;
use crate::slot::SlotCategory;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::{HashMap, HashSet};
use std::error::Error;
use std::ffi::{CStr, CString};
use std::fmt::{Display, Formatter};

static SYMBOL_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("static regex"));

/// One slot of the table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SymbolInfo {
    name: String,
    c_name: CString,
    category: SlotCategory,
}

impl SymbolInfo {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// NUL-terminated form handed to the platform loader.
    pub fn c_name(&self) -> &CStr {
        &self.c_name
    }

    pub fn category(&self) -> SlotCategory {
        self.category
    }
}

/// Dispatch entry for one extension.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtensionEntry {
    name: String,
    slots: Vec<usize>,
}

impl ExtensionEntry {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Slot indices owned by this extension, in declaration order.
    pub fn slots(&self) -> &[usize] {
        &self.slots
    }
}

/// Entry point names used to resolve extension symbols.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolverEntryPoints {
    pub instance: Option<String>,
    pub device: Option<String>,
}

/// Immutable table of symbol slots for one target.
#[derive(Debug, Clone)]
pub struct SymbolTable {
    symbols: Vec<SymbolInfo>,
    by_name: HashMap<String, usize>,
    instance_extensions: HashMap<String, ExtensionEntry>,
    device_extensions: HashMap<String, ExtensionEntry>,
    resolvers: ResolverEntryPoints,
}

impl SymbolTable {
    /// Validates `manifest` and keeps the declarations `guards` allows.
    pub fn build(manifest: &TableManifest, guards: &GuardSet) -> Result<Self, TableError> {
        let mut builder = TableBuilder::default();

        for decl in &manifest.core {
            if let Some(name) = accept(decl, guards)? {
                builder.add_core(name)?;
            }
        }

        let mut instance_extensions = HashMap::new();
        for extension in &manifest.instance_extensions {
            if let Some(entry) =
                builder.add_extension(extension, SlotCategory::InstanceExtension, guards)?
            {
                instance_extensions.insert(entry.name.clone(), entry);
            }
        }

        let mut device_extensions = HashMap::new();
        for extension in &manifest.device_extensions {
            if let Some(entry) =
                builder.add_extension(extension, SlotCategory::DeviceExtension, guards)?
            {
                device_extensions.insert(entry.name.clone(), entry);
            }
        }

        let resolvers = ResolverEntryPoints {
            instance: builder.resolver(manifest.resolvers.instance.as_deref())?,
            device: builder.resolver(manifest.resolvers.device.as_deref())?,
        };

        Ok(Self {
            symbols: builder.symbols,
            by_name: builder.by_name,
            instance_extensions,
            device_extensions,
            resolvers,
        })
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    pub fn symbols(&self) -> &[SymbolInfo] {
        &self.symbols
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.by_name.get(name).copied()
    }

    pub fn symbol(&self, name: &str) -> Option<&SymbolInfo> {
        self.index_of(name).map(|index| &self.symbols[index])
    }

    pub fn category(&self, name: &str) -> Option<SlotCategory> {
        self.symbol(name).map(SymbolInfo::category)
    }

    pub fn core_symbols(&self) -> impl Iterator<Item = (usize, &SymbolInfo)> {
        self.symbols
            .iter()
            .enumerate()
            .filter(|(_, info)| !info.category.is_extension())
    }

    pub fn extension_symbols(&self) -> impl Iterator<Item = (usize, &SymbolInfo)> {
        self.symbols
            .iter()
            .enumerate()
            .filter(|(_, info)| info.category.is_extension())
    }

    pub fn instance_extension(&self, name: &str) -> Option<&ExtensionEntry> {
        self.instance_extensions.get(name)
    }

    pub fn device_extension(&self, name: &str) -> Option<&ExtensionEntry> {
        self.device_extensions.get(name)
    }

    /// Sorted names of dispatchable instance extensions.
    pub fn instance_extension_names(&self) -> Vec<&str> {
        sorted_keys(&self.instance_extensions)
    }

    /// Sorted names of dispatchable device extensions.
    pub fn device_extension_names(&self) -> Vec<&str> {
        sorted_keys(&self.device_extensions)
    }

    pub fn resolver_entry_points(&self) -> &ResolverEntryPoints {
        &self.resolvers
    }
}

fn sorted_keys(map: &HashMap<String, ExtensionEntry>) -> Vec<&str> {
    let mut names: Vec<&str> = map.keys().map(String::as_str).collect();
    names.sort_unstable();
    names
}

#[derive(Default)]
struct TableBuilder {
    symbols: Vec<SymbolInfo>,
    by_name: HashMap<String, usize>,
    extension_names: HashSet<String>,
}

impl TableBuilder {
    fn add_core(&mut self, name: &str) -> Result<usize, TableError> {
        if self.by_name.contains_key(name) {
            return Err(TableError::DuplicateSymbol(name.to_string()));
        }
        self.push(name, SlotCategory::Core)
    }

    fn add_extension(
        &mut self,
        extension: &ExtensionDecl,
        category: SlotCategory,
        guards: &GuardSet,
    ) -> Result<Option<ExtensionEntry>, TableError> {
        let name = extension.name.trim();
        if name.is_empty() {
            return Err(TableError::EmptyExtensionName);
        }
        if !SYMBOL_NAME.is_match(name) {
            return Err(TableError::InvalidExtensionName(extension.name.clone()));
        }
        let guard = validate_guard(extension.guard.as_deref())?;

        let mut slots = Vec::with_capacity(extension.symbols.len());
        for decl in &extension.symbols {
            // Symbols of a disabled extension are still validated.
            let Some(symbol) = accept(decl, guards)? else {
                continue;
            };
            if !guards.allows(guard) {
                continue;
            }
            let index = self.add_extension_symbol(symbol, category)?;
            if slots.contains(&index) {
                return Err(TableError::DuplicateSymbol(symbol.to_string()));
            }
            slots.push(index);
        }

        if !guards.allows(guard) {
            return Ok(None);
        }
        if !self.extension_names.insert(name.to_string()) {
            return Err(TableError::DuplicateExtension(name.to_string()));
        }
        if slots.is_empty() {
            return Ok(None);
        }
        Ok(Some(ExtensionEntry {
            name: name.to_string(),
            slots,
        }))
    }

    fn add_extension_symbol(
        &mut self,
        name: &str,
        category: SlotCategory,
    ) -> Result<usize, TableError> {
        match self.by_name.get(name) {
            Some(&index) if self.symbols[index].category == category => Ok(index),
            Some(_) => Err(TableError::DuplicateSymbol(name.to_string())),
            None => self.push(name, category),
        }
    }

    fn push(&mut self, name: &str, category: SlotCategory) -> Result<usize, TableError> {
        let c_name =
            CString::new(name).map_err(|_| TableError::InvalidSymbolName(name.to_string()))?;
        let index = self.symbols.len();
        self.symbols.push(SymbolInfo {
            name: name.to_string(),
            c_name,
            category,
        });
        self.by_name.insert(name.to_string(), index);
        Ok(index)
    }

    fn resolver(&self, entry_point: Option<&str>) -> Result<Option<String>, TableError> {
        let Some(raw) = entry_point else {
            return Ok(None);
        };
        let name = validate_symbol_name(raw)?;
        match self.by_name.get(name) {
            Some(&index) if self.symbols[index].category == SlotCategory::Core => {
                Ok(Some(name.to_string()))
            }
            _ => Err(TableError::ResolverNotCore(name.to_string())),
        }
    }
}

/// Validates one declaration; `None` when its guard is disabled.
fn accept<'a>(decl: &'a SymbolDecl, guards: &GuardSet) -> Result<Option<&'a str>, TableError> {
    let name = validate_symbol_name(decl.name())?;
    let guard = validate_guard(decl.guard())?;
    Ok(guards.allows(guard).then_some(name))
}

fn validate_symbol_name(raw: &str) -> Result<&str, TableError> {
    let name = raw.trim();
    if name.is_empty() {
        return Err(TableError::EmptySymbolName);
    }
    if !SYMBOL_NAME.is_match(name) {
        return Err(TableError::InvalidSymbolName(raw.to_string()));
    }
    Ok(name)
}

fn validate_guard(guard: Option<&str>) -> Result<Option<&str>, TableError> {
    match guard {
        Some(value) if value.trim().is_empty() => Err(TableError::EmptyGuard),
        Some(value) => Ok(Some(value.trim())),
        None => Ok(None),
    }
}

/// Symbol table validation errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TableError {
    EmptySymbolName,
    InvalidSymbolName(String),
    EmptyExtensionName,
    InvalidExtensionName(String),
    EmptyGuard,
    DuplicateSymbol(String),
    DuplicateExtension(String),
    ResolverNotCore(String),
}

impl Display for TableError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptySymbolName => write!(f, "symbol name must not be empty"),
            Self::InvalidSymbolName(value) => write!(f, "symbol name is invalid: {value}"),
            Self::EmptyExtensionName => write!(f, "extension name must not be empty"),
            Self::InvalidExtensionName(value) => {
                write!(f, "extension name is invalid: {value}")
            }
            Self::EmptyGuard => write!(f, "guard must not be empty when present"),
            Self::DuplicateSymbol(value) => write!(f, "symbol declared twice: {value}"),
            Self::DuplicateExtension(value) => write!(f, "extension declared twice: {value}"),
            Self::ResolverNotCore(value) => {
                write!(f, "resolver entry point is not a core symbol: {value}")
            }
        }
    }
}

impl Error for TableError {}
