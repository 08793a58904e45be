//! Target platform conventions.
//!
//! # Responsibility
//! - Map an API family name to the shared-library filenames the platform
//!   loader is asked for, in the order they are attempted.
//! - Describe which declaration guards are enabled for the compile target.
//!
//! # Invariants
//! - Candidate order is fixed per platform; the first candidate that opens wins.
//! - `GuardSet::target()` is derived from the compile target only, never from
//!   the runtime environment.

use std::collections::BTreeSet;

/// Shared-library naming convention of one platform family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LibraryNaming {
    /// `<name>-1.dll`
    Windows,
    /// `lib<name>.dylib`
    Apple,
    /// `lib<name>.so`, then `lib<name>.so.1`
    Unix,
}

impl LibraryNaming {
    /// Naming convention of the compile target.
    pub fn current() -> Self {
        if cfg!(windows) {
            Self::Windows
        } else if cfg!(target_vendor = "apple") {
            Self::Apple
        } else {
            Self::Unix
        }
    }

    /// Returns the filenames to try for `api_name`, in attempt order.
    pub fn candidates(self, api_name: &str) -> Vec<String> {
        match self {
            Self::Windows => vec![format!("{api_name}-1.dll")],
            Self::Apple => vec![format!("lib{api_name}.dylib")],
            Self::Unix => vec![
                format!("lib{api_name}.so"),
                format!("lib{api_name}.so.1"),
            ],
        }
    }
}

/// Set of enabled declaration guards.
///
/// A symbol or extension declared with a guard only becomes part of a
/// [`SymbolTable`](crate::SymbolTable) when its guard is in this set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GuardSet {
    enabled: BTreeSet<String>,
}

impl GuardSet {
    /// Empty set: only unguarded declarations are kept.
    pub fn new() -> Self {
        Self::default()
    }

    /// Guards describing the compile target (`linux`, `unix`, `windows`,
    /// `macos`, `apple`, ...).
    pub fn target() -> Self {
        let mut guards = Self::new();
        guards.enable(std::env::consts::OS);
        guards.enable(std::env::consts::FAMILY);
        if cfg!(target_vendor = "apple") {
            guards.enable("apple");
        }
        guards
    }

    /// Builder-style variant of [`GuardSet::enable`].
    pub fn with(mut self, guard: &str) -> Self {
        self.enable(guard);
        self
    }

    /// Enables one guard. Blank names are ignored.
    pub fn enable(&mut self, guard: &str) {
        let guard = guard.trim();
        if !guard.is_empty() {
            self.enabled.insert(guard.to_string());
        }
    }

    pub fn contains(&self, guard: &str) -> bool {
        self.enabled.contains(guard.trim())
    }

    /// Returns whether a declaration with `guard` is kept.
    pub fn allows(&self, guard: Option<&str>) -> bool {
        guard.map_or(true, |value| self.contains(value))
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.enabled.iter().map(String::as_str)
    }
}
