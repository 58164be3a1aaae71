//! Dynamic loading of module binaries.
//!
//! A module binary is a `cdylib` that exports a constructor under the
//! well-known symbol [`MODULE_ENTRY_SYMBOL`]. The constructor hands
//! ownership of a boxed [`Module`] back to the host through a thin
//! [`ModuleEntry`] pointer (a bare `*mut dyn Module` would be a fat pointer
//! and not safe to pass across the `extern "C"` boundary).
//!
//! Module crates use [`declare_module!`](crate::declare_module) to emit the
//! export:
//!
//! ```ignore
//! modserve::declare_module!(HtmlEscapeModule, HtmlEscapeModule::new);
//! ```

use std::path::Path;

use libloading::{Library, Symbol};
use thiserror::Error;

use super::Module;

/// The exported constructor symbol every module binary must provide.
pub const MODULE_ENTRY_SYMBOL: &[u8] = b"modserve_module_create\0";

/// Transfers ownership of a module instance across the library boundary.
///
/// Wraps the boxed trait object so the exported constructor can return a
/// thin raw pointer.
#[repr(transparent)]
pub struct ModuleEntry(pub Box<dyn Module>);

/// The signature of the exported constructor.
pub type ModuleConstructor = unsafe extern "C" fn() -> *mut ModuleEntry;

/// Errors from loading a single module binary.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to load library: {0}")]
    Library(#[from] libloading::Error),

    #[error("module constructor returned null")]
    NullConstructor,
}

/// Loads a module binary and constructs its module instance.
///
/// Returns the live library handle alongside the instance; the caller must
/// keep the handle alive for as long as the instance exists, since dropping
/// it unmaps the module's code.
pub(crate) fn load(path: &Path) -> Result<(Library, Box<dyn Module>), LoadError> {
    // SAFETY: loading a library runs its initializers, and the constructor
    // symbol is trusted to match `ModuleConstructor` — the same trust any
    // plugin host extends to binaries placed in its module directory. The
    // returned pointer is owned by us and boxed exactly once.
    unsafe {
        let library = Library::new(path)?;
        let constructor: Symbol<ModuleConstructor> = library.get(MODULE_ENTRY_SYMBOL)?;
        let raw = constructor();
        if raw.is_null() {
            return Err(LoadError::NullConstructor);
        }
        let entry = Box::from_raw(raw);
        Ok((library, entry.0))
    }
}

/// Declares the exported constructor for a module crate.
///
/// `$ty` is the module type, `$ctor` a zero-argument function or closure
/// returning an instance of it. The macro emits the `extern "C"` symbol the
/// host resolves during discovery.
#[macro_export]
macro_rules! declare_module {
    ($ty:ty, $ctor:expr) => {
        #[no_mangle]
        pub extern "C" fn modserve_module_create() -> *mut $crate::modules::loader::ModuleEntry {
            let constructor: fn() -> $ty = $ctor;
            let module: Box<dyn $crate::modules::Module> = Box::new(constructor());
            Box::into_raw(Box::new($crate::modules::loader::ModuleEntry(module)))
        }
    };
}
