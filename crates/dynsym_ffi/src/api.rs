//! C ABI over the process-wide loader.
//!
//! # Responsibility
//! - Expose the loader entry points to non-Rust callers as plain C symbols.
//! - Install one process-wide symbol table from a JSON manifest.
//!
//! # Invariants
//! - Exported functions never unwind across the FFI boundary.
//! - Null or non-UTF-8 arguments are rejected, never dereferenced blindly.
//! - `dynsym_init_core` is the only function that terminates the process.

use dynsym_core::global;
use dynsym_core::{
    init_logging as init_logging_inner, table_from_json, DeviceHandle, InstanceHandle,
    SymbolLoader, LOAD_FAILURE_EXIT_CODE,
};
use log::{error, warn};
use std::ffi::{c_char, c_int, c_void, CStr};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::ptr;

/// Success.
pub const DYNSYM_OK: c_int = 0;
/// A required pointer argument was null or not UTF-8.
pub const DYNSYM_ERR_ARGUMENT: c_int = -1;
/// The operation failed (invalid manifest, logger setup failure).
pub const DYNSYM_ERR_FAILED: c_int = -2;
/// A process-wide loader is already installed.
pub const DYNSYM_ERR_ALREADY_INSTALLED: c_int = -3;

static VERSION: &str = concat!(env!("CARGO_PKG_VERSION"), "\0");

/// Returns the crate version as a static NUL-terminated string.
#[no_mangle]
pub extern "C" fn dynsym_core_version() -> *const c_char {
    VERSION.as_ptr().cast()
}

/// Starts rolling file logs.
///
/// # Safety
/// `level` and `log_dir` must be null or valid NUL-terminated strings.
#[no_mangle]
pub unsafe extern "C" fn dynsym_init_logging(
    level: *const c_char,
    log_dir: *const c_char,
) -> c_int {
    let (Some(level), Some(log_dir)) = (unsafe { utf8_arg(level) }, unsafe { utf8_arg(log_dir) })
    else {
        return DYNSYM_ERR_ARGUMENT;
    };
    guarded(DYNSYM_ERR_FAILED, || match init_logging_inner(level, log_dir) {
        Ok(()) => DYNSYM_OK,
        Err(err) => {
            eprintln!("dynsym: {err}");
            DYNSYM_ERR_FAILED
        }
    })
}

/// Installs the process-wide loader for a JSON manifest.
///
/// The table is built for the compile target's guards and uses the system
/// library loader.
///
/// # Safety
/// `manifest_json` must be null or a valid NUL-terminated string.
#[no_mangle]
pub unsafe extern "C" fn dynsym_install_manifest(manifest_json: *const c_char) -> c_int {
    let Some(raw) = (unsafe { utf8_arg(manifest_json) }) else {
        return DYNSYM_ERR_ARGUMENT;
    };
    guarded(DYNSYM_ERR_FAILED, || {
        let table = match table_from_json(raw) {
            Ok(table) => table,
            Err(err) => {
                error!("event=ffi_install module=ffi status=error error={err}");
                return DYNSYM_ERR_FAILED;
            }
        };
        match global::install(SymbolLoader::new(table)) {
            Ok(_) => DYNSYM_OK,
            Err(_) => DYNSYM_ERR_ALREADY_INSTALLED,
        }
    })
}

/// Loads the API library and binds all core symbols.
///
/// Prints a diagnostic and exits with status 1 when no loader is installed,
/// `api_name` is unusable, or the library cannot be opened.
///
/// # Safety
/// `api_name` must be null or a valid NUL-terminated string.
#[no_mangle]
pub unsafe extern "C" fn dynsym_init_core(api_name: *const c_char) {
    let Some(loader) = global::loader() else {
        fatal("dynsym_init_core called before dynsym_install_manifest");
    };
    let Some(api_name) = (unsafe { utf8_arg(api_name) }) else {
        fatal("dynsym_init_core requires a library identifier");
    };
    let outcome = catch_unwind(AssertUnwindSafe(|| loader.try_init_core(api_name)));
    match outcome {
        Ok(Ok(_)) => {}
        Ok(Err(err)) => fatal(&err.to_string()),
        Err(_) => fatal("dynsym_init_core panicked"),
    }
}

/// Binds one instance extension. Unknown names and null arguments are ignored.
///
/// # Safety
/// `extension_name` must be null or a valid NUL-terminated string; `instance`
/// must be a live handle of the loaded API.
#[no_mangle]
pub unsafe extern "C" fn dynsym_init_instance_extension(
    instance: *mut c_void,
    extension_name: *const c_char,
) {
    let Some(loader) = installed("dynsym_init_instance_extension") else {
        return;
    };
    let (Some(instance), Some(name)) = (
        InstanceHandle::from_raw(instance),
        unsafe { utf8_arg(extension_name) },
    ) else {
        warn!("event=ffi_extension module=ffi status=skip scope=instance reason=null_argument");
        return;
    };
    guarded((), || {
        loader.init_instance_extension(instance, name);
    });
}

/// Binds one device extension. Unknown names and null arguments are ignored.
///
/// # Safety
/// `extension_name` must be null or a valid NUL-terminated string; `instance`
/// and `device` must be live handles of the loaded API.
#[no_mangle]
pub unsafe extern "C" fn dynsym_init_device_extension(
    instance: *mut c_void,
    device: *mut c_void,
    extension_name: *const c_char,
) {
    let Some(loader) = installed("dynsym_init_device_extension") else {
        return;
    };
    let (Some(instance), Some(device), Some(name)) = (
        InstanceHandle::from_raw(instance),
        DeviceHandle::from_raw(device),
        unsafe { utf8_arg(extension_name) },
    ) else {
        warn!("event=ffi_extension module=ffi status=skip scope=device reason=null_argument");
        return;
    };
    guarded((), || {
        loader.init_device_extension(instance, device, name);
    });
}

/// Nulls every extension slot of the process-wide loader.
#[no_mangle]
pub extern "C" fn dynsym_reset_all_extensions() {
    if let Some(loader) = installed("dynsym_reset_all_extensions") {
        guarded((), || loader.reset_all_extensions());
    }
}

/// Current address bound to `name`, or null.
///
/// # Safety
/// `name` must be null or a valid NUL-terminated string.
#[no_mangle]
pub unsafe extern "C" fn dynsym_get_proc_addr(name: *const c_char) -> *mut c_void {
    let (Some(loader), Some(name)) = (global::loader(), unsafe { utf8_arg(name) }) else {
        return ptr::null_mut();
    };
    loader
        .proc_addr(name)
        .map_or(ptr::null_mut(), |addr| addr.as_ptr())
}

unsafe fn utf8_arg<'a>(raw: *const c_char) -> Option<&'a str> {
    if raw.is_null() {
        return None;
    }
    unsafe { CStr::from_ptr(raw) }.to_str().ok()
}

fn installed(caller: &str) -> Option<&'static SymbolLoader> {
    let loader = global::loader();
    if loader.is_none() {
        warn!("event=ffi_call module=ffi status=skip caller={caller} reason=not_installed");
    }
    loader
}

fn guarded<T>(fallback: T, f: impl FnOnce() -> T) -> T {
    catch_unwind(AssertUnwindSafe(f)).unwrap_or_else(|_| {
        error!("event=ffi_call module=ffi status=error error_code=panic");
        fallback
    })
}

fn fatal(message: &str) -> ! {
    println!("{message}");
    error!("event=ffi_init_core module=ffi status=error error={message}");
    std::process::exit(LOAD_FAILURE_EXIT_CODE);
}
