//! Extension symbol resolution.

use crate::loader::SymbolLoader;
use crate::slot::{DeviceHandle, InstanceHandle, ProcAddr};
use crate::table::SymbolTable;
use std::ffi::{c_char, c_void, CStr};

/// Resolves extension symbols against live API handles.
pub trait ProcResolver: Send + Sync {
    /// Looks up an instance-level symbol.
    fn instance_proc(
        &self,
        loader: &SymbolLoader,
        instance: InstanceHandle,
        name: &CStr,
    ) -> Option<ProcAddr>;

    /// Looks up a device-level symbol.
    fn device_proc(
        &self,
        loader: &SymbolLoader,
        instance: InstanceHandle,
        device: DeviceHandle,
        name: &CStr,
    ) -> Option<ProcAddr>;
}

/// `get proc address` entry point signature shared by both scopes.
pub type GetProcAddrFn = unsafe extern "system" fn(*mut c_void, *const c_char) -> *mut c_void;

/// Resolves through the API's own entry points, read from core slots.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntryPointResolver {
    instance_entry: Option<String>,
    device_entry: Option<String>,
}

impl EntryPointResolver {
    pub fn new(instance_entry: Option<&str>, device_entry: Option<&str>) -> Self {
        Self {
            instance_entry: instance_entry.map(str::to_string),
            device_entry: device_entry.map(str::to_string),
        }
    }

    /// Uses the entry points the table declares; `None` when it declares none.
    pub fn from_table(table: &SymbolTable) -> Option<Self> {
        let entry_points = table.resolver_entry_points();
        if entry_points.instance.is_none() && entry_points.device.is_none() {
            return None;
        }
        Some(Self::new(
            entry_points.instance.as_deref(),
            entry_points.device.as_deref(),
        ))
    }

    fn call(
        loader: &SymbolLoader,
        entry: Option<&str>,
        handle: *mut c_void,
        name: &CStr,
    ) -> Option<ProcAddr> {
        let entry = loader.proc_addr(entry?)?;
        let get_proc_addr: GetProcAddrFn = unsafe { entry.cast() };
        ProcAddr::from_ptr(unsafe { get_proc_addr(handle, name.as_ptr()) })
    }
}

impl ProcResolver for EntryPointResolver {
    fn instance_proc(
        &self,
        loader: &SymbolLoader,
        instance: InstanceHandle,
        name: &CStr,
    ) -> Option<ProcAddr> {
        Self::call(
            loader,
            self.instance_entry.as_deref(),
            instance.as_raw(),
            name,
        )
    }

    fn device_proc(
        &self,
        loader: &SymbolLoader,
        _instance: InstanceHandle,
        device: DeviceHandle,
        name: &CStr,
    ) -> Option<ProcAddr> {
        Self::call(loader, self.device_entry.as_deref(), device.as_raw(), name)
    }
}

/// Resolves nothing; extension slots stay null.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoResolver;

impl ProcResolver for NoResolver {
    fn instance_proc(&self, _: &SymbolLoader, _: InstanceHandle, _: &CStr) -> Option<ProcAddr> {
        None
    }

    fn device_proc(
        &self,
        _: &SymbolLoader,
        _: InstanceHandle,
        _: DeviceHandle,
        _: &CStr,
    ) -> Option<ProcAddr> {
        None
    }
}
