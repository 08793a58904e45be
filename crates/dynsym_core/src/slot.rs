//! Resolved addresses and the cells that hold them.

use std::ffi::c_void;
use std::fmt::{Debug, Display, Formatter};
use std::ptr::{self, NonNull};
use std::sync::atomic::{AtomicPtr, Ordering};

/// Non-null address of a resolved symbol.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProcAddr(NonNull<c_void>);

// Code addresses are immutable for the lifetime of the library that owns them.
unsafe impl Send for ProcAddr {}
unsafe impl Sync for ProcAddr {}

impl ProcAddr {
    /// Wraps a raw address; null becomes `None`.
    pub fn from_ptr(ptr: *mut c_void) -> Option<Self> {
        NonNull::new(ptr).map(Self)
    }

    pub fn as_ptr(self) -> *mut c_void {
        self.0.as_ptr()
    }

    /// Reinterprets the address as a function pointer type.
    ///
    /// # Safety
    /// `F` must be a pointer-sized function pointer type whose signature and
    /// calling convention match the symbol this address was resolved from.
    pub unsafe fn cast<F: Copy>(self) -> F {
        debug_assert_eq!(
            std::mem::size_of::<F>(),
            std::mem::size_of::<*mut c_void>()
        );
        let raw = self.as_ptr();
        unsafe { std::mem::transmute_copy::<*mut c_void, F>(&raw) }
    }
}

impl Debug for ProcAddr {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "ProcAddr({:p})", self.0)
    }
}

/// Which entry point owns a slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SlotCategory {
    /// Bound by `init_core` straight from the shared library.
    Core,
    /// Bound on demand through the instance-scoped resolver.
    InstanceExtension,
    /// Bound on demand through the device-scoped resolver.
    DeviceExtension,
}

impl SlotCategory {
    pub fn is_extension(self) -> bool {
        !matches!(self, Self::Core)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Core => "core",
            Self::InstanceExtension => "instance_extension",
            Self::DeviceExtension => "device_extension",
        }
    }
}

impl Display for SlotCategory {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One function-pointer cell, null until bound.
#[derive(Debug, Default)]
pub(crate) struct Slot {
    value: AtomicPtr<c_void>,
}

impl Slot {
    pub(crate) fn load(&self) -> Option<ProcAddr> {
        ProcAddr::from_ptr(self.value.load(Ordering::Acquire))
    }

    pub(crate) fn store(&self, value: Option<ProcAddr>) {
        let raw = value.map_or(ptr::null_mut(), ProcAddr::as_ptr);
        self.value.store(raw, Ordering::Release);
    }
}

/// Non-null opaque handle of the top-level API context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InstanceHandle(NonNull<c_void>);

/// Non-null opaque handle of a sub-context created from an instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeviceHandle(NonNull<c_void>);

// Handles are opaque tokens passed back to the API; the loader never
// dereferences them.
unsafe impl Send for InstanceHandle {}
unsafe impl Sync for InstanceHandle {}
unsafe impl Send for DeviceHandle {}
unsafe impl Sync for DeviceHandle {}

impl InstanceHandle {
    /// Returns `None` for a null handle.
    pub fn from_raw(raw: *mut c_void) -> Option<Self> {
        NonNull::new(raw).map(Self)
    }

    pub fn as_raw(self) -> *mut c_void {
        self.0.as_ptr()
    }
}

impl DeviceHandle {
    /// Returns `None` for a null handle.
    pub fn from_raw(raw: *mut c_void) -> Option<Self> {
        NonNull::new(raw).map(Self)
    }

    pub fn as_raw(self) -> *mut c_void {
        self.0.as_ptr()
    }
}
