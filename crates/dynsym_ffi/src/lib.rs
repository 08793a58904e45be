//! C ABI for `dynsym_core`.

mod api;

pub use api::*;
