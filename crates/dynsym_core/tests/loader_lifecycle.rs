use dynsym_core::{
    DeviceHandle, ExtensionDecl, GuardSet, InstanceHandle, LibraryNaming, ProcAddr, ProcResolver,
    SlotCategory, StaticLibrary, StaticOpener, SymbolLoader, SymbolTable, TableManifest,
};
use std::collections::HashMap;
use std::ffi::{c_void, CStr};
use std::ptr::NonNull;

type DemoFn = extern "C" fn() -> u32;

extern "C" fn demo_foo() -> u32 {
    1
}

extern "C" fn demo_bar() -> u32 {
    2
}

extern "C" fn demo_ext1_fn() -> u32 {
    11
}

extern "C" fn demo_ext2_fn() -> u32 {
    12
}

extern "C" fn demo_dev1_fn() -> u32 {
    21
}

extern "C" fn other_foo() -> u32 {
    101
}

fn raw(f: DemoFn) -> *mut c_void {
    f as *const () as *mut c_void
}

fn proc_addr(f: DemoFn) -> ProcAddr {
    ProcAddr::from_ptr(raw(f)).expect("function address is non-null")
}

/// Resolver answering from fixed maps, ignoring handles.
#[derive(Default)]
struct MapResolver {
    instance: HashMap<String, ProcAddr>,
    device: HashMap<String, ProcAddr>,
}

impl MapResolver {
    fn instance(mut self, name: &str, f: DemoFn) -> Self {
        self.instance.insert(name.to_string(), proc_addr(f));
        self
    }

    fn device(mut self, name: &str, f: DemoFn) -> Self {
        self.device.insert(name.to_string(), proc_addr(f));
        self
    }
}

impl ProcResolver for MapResolver {
    fn instance_proc(
        &self,
        _: &SymbolLoader,
        _: InstanceHandle,
        name: &CStr,
    ) -> Option<ProcAddr> {
        self.instance.get(name.to_str().ok()?).copied()
    }

    fn device_proc(
        &self,
        _: &SymbolLoader,
        _: InstanceHandle,
        _: DeviceHandle,
        name: &CStr,
    ) -> Option<ProcAddr> {
        self.device.get(name.to_str().ok()?).copied()
    }
}

fn demo_table() -> SymbolTable {
    let manifest = TableManifest::new()
        .core("demoFoo")
        .core("demoBar")
        .core("demoMissing")
        .instance_extension(ExtensionDecl::new("DEMO_ext1", ["demoExt1Fn"]))
        .instance_extension(ExtensionDecl::new("DEMO_ext2", ["demoExt2Fn"]))
        .device_extension(ExtensionDecl::new("DEMO_dev1", ["demoDev1Fn"]));
    SymbolTable::build(&manifest, &GuardSet::new()).expect("demo table")
}

fn demo_loader() -> SymbolLoader {
    let opener = StaticOpener::new()
        .with_library(
            "libdemo.so",
            StaticLibrary::new()
                .with_symbol("demoFoo", raw(demo_foo))
                .with_symbol("demoBar", raw(demo_bar)),
        )
        .with_library(
            "libother.so",
            StaticLibrary::new().with_symbol("demoFoo", raw(other_foo)),
        );
    let resolver = MapResolver::default()
        .instance("demoExt1Fn", demo_ext1_fn)
        .instance("demoExt2Fn", demo_ext2_fn)
        .device("demoDev1Fn", demo_dev1_fn);

    SymbolLoader::builder(demo_table())
        .naming(LibraryNaming::Unix)
        .opener(opener)
        .resolver(resolver)
        .build()
}

fn instance() -> InstanceHandle {
    InstanceHandle::from_raw(NonNull::<c_void>::dangling().as_ptr()).expect("non-null")
}

fn device() -> DeviceHandle {
    DeviceHandle::from_raw(NonNull::<c_void>::dangling().as_ptr()).expect("non-null")
}

fn call(loader: &SymbolLoader, name: &str) -> Option<u32> {
    let f: DemoFn = unsafe { loader.proc_as(name) }?;
    Some(f())
}

#[test]
fn demo_round_trip() {
    let loader = demo_loader();

    loader.init_core("demo");
    assert_eq!(call(&loader, "demoFoo"), Some(1));
    assert_eq!(call(&loader, "demoBar"), Some(2));

    assert!(loader.init_instance_extension(instance(), "DEMO_ext1"));
    assert_eq!(call(&loader, "demoExt1Fn"), Some(11));
    assert_eq!(loader.proc_addr("demoFoo"), Some(proc_addr(demo_foo)));
    assert_eq!(loader.proc_addr("demoBar"), Some(proc_addr(demo_bar)));

    loader.reset_all_extensions();
    assert_eq!(loader.proc_addr("demoExt1Fn"), None);
    assert_eq!(call(&loader, "demoFoo"), Some(1));
    assert_eq!(call(&loader, "demoBar"), Some(2));
}

#[test]
fn slots_start_null() {
    let loader = demo_loader();
    assert!(!loader.is_core_ready());
    assert!(loader.snapshot().iter().all(|slot| slot.value.is_none()));
}

#[test]
fn init_core_binds_present_symbols_and_leaves_absent_null() {
    let loader = demo_loader();
    let report = loader.init_core("demo");

    assert_eq!(report.library, "libdemo.so");
    assert_eq!(report.resolved, 2);
    assert_eq!(report.missing, 1);
    assert!(loader.is_core_ready());
    assert_eq!(loader.proc_addr("demoMissing"), None);
    for slot in loader.snapshot() {
        if slot.category.is_extension() {
            assert_eq!(slot.value, None, "{} must stay unbound", slot.name);
        }
    }
}

#[test]
fn init_core_again_overwrites_core_slots() {
    let loader = demo_loader();
    loader.init_core("demo");
    loader.init_core("other");

    assert_eq!(loader.loaded_library().as_deref(), Some("libother.so"));
    assert_eq!(call(&loader, "demoFoo"), Some(101));
    assert_eq!(loader.proc_addr("demoBar"), None);
}

#[test]
fn instance_extension_touches_only_its_own_slots() {
    let loader = demo_loader();
    loader.init_core("demo");
    let before = loader.snapshot();

    assert!(loader.init_instance_extension(instance(), "DEMO_ext1"));
    let after = loader.snapshot();

    for (old, new) in before.iter().zip(after.iter()) {
        if new.name == "demoExt1Fn" {
            assert_eq!(new.value, Some(proc_addr(demo_ext1_fn)));
        } else {
            assert_eq!(old, new, "{} must not change", new.name);
        }
    }
}

#[test]
fn device_extension_uses_device_scope() {
    let loader = demo_loader();
    loader.init_core("demo");

    assert!(loader.init_device_extension(instance(), device(), "DEMO_dev1"));
    assert_eq!(call(&loader, "demoDev1Fn"), Some(21));
    assert_eq!(
        loader.table().category("demoDev1Fn"),
        Some(SlotCategory::DeviceExtension)
    );
    assert_eq!(loader.proc_addr("demoExt1Fn"), None);
}

#[test]
fn unknown_extension_names_change_nothing() {
    let loader = demo_loader();
    loader.init_core("demo");
    assert!(loader.init_instance_extension(instance(), "DEMO_ext2"));
    let before = loader.snapshot();

    assert!(!loader.init_instance_extension(instance(), "DEMO_unknown"));
    assert!(!loader.init_device_extension(instance(), device(), "DEMO_unknown"));
    // Scopes do not mix: a device extension is unknown at instance level.
    assert!(!loader.init_instance_extension(instance(), "DEMO_dev1"));
    assert!(!loader.init_device_extension(instance(), device(), "DEMO_ext1"));

    assert_eq!(loader.snapshot(), before);
}

#[test]
fn reset_is_idempotent_and_keeps_core() {
    let loader = demo_loader();
    loader.init_core("demo");
    assert!(loader.init_instance_extension(instance(), "DEMO_ext1"));
    assert!(loader.init_instance_extension(instance(), "DEMO_ext2"));
    assert!(loader.init_device_extension(instance(), device(), "DEMO_dev1"));

    loader.reset_all_extensions();
    let once = loader.snapshot();
    loader.reset_all_extensions();
    let twice = loader.snapshot();

    assert_eq!(once, twice);
    for slot in &twice {
        if slot.category.is_extension() {
            assert_eq!(slot.value, None);
        }
    }
    assert_eq!(call(&loader, "demoFoo"), Some(1));
    assert_eq!(call(&loader, "demoBar"), Some(2));
}

#[test]
fn extensions_can_be_reinitialized_after_reset() {
    let loader = demo_loader();
    loader.init_core("demo");
    assert!(loader.init_instance_extension(instance(), "DEMO_ext1"));
    loader.reset_all_extensions();

    assert!(loader.init_instance_extension(instance(), "DEMO_ext1"));
    assert_eq!(call(&loader, "demoExt1Fn"), Some(11));
}

#[test]
fn disjoint_extensions_initialize_concurrently() {
    let loader = demo_loader();
    loader.init_core("demo");

    std::thread::scope(|scope| {
        scope.spawn(|| loader.init_instance_extension(instance(), "DEMO_ext1"));
        scope.spawn(|| loader.init_instance_extension(instance(), "DEMO_ext2"));
        scope.spawn(|| loader.init_device_extension(instance(), device(), "DEMO_dev1"));
    });

    assert_eq!(call(&loader, "demoExt1Fn"), Some(11));
    assert_eq!(call(&loader, "demoExt2Fn"), Some(12));
    assert_eq!(call(&loader, "demoDev1Fn"), Some(21));
}
