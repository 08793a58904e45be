use dynsym_core::{GuardSet, ManifestError, SlotCategory, SymbolTable, TableManifest};
use std::fs;

const VULKAN_LIKE: &str = r#"{
    "resolvers": {
        "instance": "vkGetInstanceProcAddr",
        "device": "vkGetDeviceProcAddr"
    },
    "core": [
        "vkGetInstanceProcAddr",
        "vkGetDeviceProcAddr",
        "vkCreateInstance",
        { "name": "vkEnumerateInstanceVersion" }
    ],
    "instance_extensions": [
        { "name": "VK_KHR_surface", "symbols": ["vkDestroySurfaceKHR"] },
        {
            "name": "VK_KHR_win32_surface",
            "guard": "windows",
            "symbols": ["vkCreateWin32SurfaceKHR"]
        },
        { "name": "VK_KHR_portability_enumeration", "symbols": [] }
    ],
    "device_extensions": [
        {
            "name": "VK_KHR_swapchain",
            "symbols": ["vkCreateSwapchainKHR", "vkGetDeviceGroupPresentCapabilitiesKHR"]
        },
        {
            "name": "VK_KHR_device_group",
            "symbols": ["vkGetDeviceGroupPresentCapabilitiesKHR"]
        }
    ]
}"#;

#[test]
fn loads_manifest_from_disk_and_applies_guards() {
    let dir = tempfile::tempdir().expect("temp dir");
    let path = dir.path().join("vulkan.json");
    fs::write(&path, VULKAN_LIKE).expect("write manifest");

    let manifest = TableManifest::from_path(&path).expect("manifest loads");
    let linux = SymbolTable::build(&manifest, &GuardSet::new().with("linux")).expect("table");
    let windows = SymbolTable::build(&manifest, &GuardSet::new().with("windows")).expect("table");

    assert!(linux.instance_extension("VK_KHR_win32_surface").is_none());
    assert!(linux.symbol("vkCreateWin32SurfaceKHR").is_none());
    assert!(windows.instance_extension("VK_KHR_win32_surface").is_some());
    assert_eq!(windows.len(), linux.len() + 1);

    assert!(linux
        .instance_extension("VK_KHR_portability_enumeration")
        .is_none());
    assert_eq!(
        linux.category("vkGetDeviceGroupPresentCapabilitiesKHR"),
        Some(SlotCategory::DeviceExtension)
    );
    assert_eq!(
        linux.device_extension_names(),
        vec!["VK_KHR_device_group", "VK_KHR_swapchain"]
    );
}

#[test]
fn missing_file_is_an_io_error() {
    let dir = tempfile::tempdir().expect("temp dir");
    let err = TableManifest::from_path(dir.path().join("absent.json")).unwrap_err();
    assert!(matches!(err, ManifestError::Io(_)));
    assert!(err.to_string().starts_with("failed to read manifest"));
}

#[test]
fn malformed_file_is_a_parse_error() {
    let dir = tempfile::tempdir().expect("temp dir");
    let path = dir.path().join("broken.json");
    fs::write(&path, "{ \"core\": [").expect("write manifest");

    let err = TableManifest::from_path(&path).unwrap_err();
    assert!(matches!(err, ManifestError::Parse(_)));
}
