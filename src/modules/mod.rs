//! The module capability contract and the manager that owns module
//! lifecycles.
//!
//! A module is a unit of third-party code that extends the server by
//! registering hook callbacks. The [`ModuleManager`] discovers module
//! binaries in a directory, instantiates them through the well-known
//! constructor symbol (see [`loader`]), hands each a [`ModuleHost`], and
//! drives initialize/shutdown. One module failing to load or initialize is
//! logged and skipped; it never aborts the discovery pass.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use thiserror::Error;
use tracing::{info, warn};

use crate::hooks::{HookCallback, HookRegistry};
use crate::http::Request;

pub mod loader;

/// Errors surfaced by module lifecycle operations.
#[derive(Debug, Error)]
pub enum ModuleError {
    #[error("module initialization failed: {0}")]
    Init(String),

    #[error("module manager already shut down")]
    Closed,

    #[error("failed to read module directory {dir}: {source}")]
    Dir {
        dir: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// The module capability contract.
///
/// Implementors expose immutable identity strings, receive their host
/// handle exactly once before [`initialize`](Self::initialize) runs, and
/// get a [`shutdown`](Self::shutdown) call at teardown. `initialize` is
/// where a module typically calls [`ModuleHost::register_hook`] one or more
/// times.
pub trait Module: Send {
    /// The module's name, used for lookup.
    fn name(&self) -> &str;
    /// A one-line description of what the module does.
    fn description(&self) -> &str;
    /// The module's author.
    fn author(&self) -> &str;
    /// The module's version string.
    fn version(&self) -> &str;

    /// Stores the host handle. Called exactly once, before `initialize`.
    fn set_host(&mut self, host: ModuleHost);

    /// Called once after the host is assigned. Errors are isolated: the
    /// module is dropped from the set and the server keeps running.
    fn initialize(&mut self) -> Result<(), ModuleError>;

    /// Called once at teardown.
    fn shutdown(&mut self);

    /// Direct request-processing entry point.
    ///
    /// Present in the contract but not invoked by the current pipeline —
    /// reserved for modules that take over serving entirely.
    fn process_request(&mut self, request: &mut Request) -> i32 {
        let _ = request;
        0
    }
}

/// The capability surface a module uses to reach the server.
///
/// Cloneable; a module may keep its copy for the process lifetime. Every
/// registration made through the host is recorded against the owning
/// module and removed from the registry when that module is released.
/// After [`ModuleManager::shutdown_all`] the host goes inert and
/// registrations are dropped with a warning.
#[derive(Clone)]
pub struct ModuleHost {
    registry: Arc<HookRegistry>,
    open: Arc<AtomicBool>,
    registrations: Arc<Mutex<Vec<(String, HookCallback)>>>,
}

impl ModuleHost {
    /// Registers `callback` for `hook` and records the pair for removal at
    /// module release. No validation is applied to the hook name.
    pub fn register_hook(&self, hook: &str, callback: HookCallback) {
        if !self.open.load(Ordering::Acquire) {
            warn!(hook, "hook registration after shutdown dropped");
            return;
        }
        self.registrations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((hook.to_owned(), Arc::clone(&callback)));
        self.registry.register(hook, callback);
    }
}

// Removes every recorded (hook, callback) pair from the registry and drops
// the recorded Arcs. For dynamically loaded modules this must run before
// the library handle is dropped: the callbacks' code lives in that library.
fn deregister_all(registry: &HookRegistry, registrations: &Mutex<Vec<(String, HookCallback)>>) {
    let pairs: Vec<(String, HookCallback)> = registrations
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .drain(..)
        .collect();
    for (hook, callback) in pairs {
        registry.deregister(&hook, &callback);
    }
}

/// Pairs a live module instance with the path of the binary it came from.
pub struct ModuleHandle {
    // Declared before `library` so the instance drops before its code is
    // unmapped.
    module: Box<dyn Module>,
    // The (hook, callback) pairs this module registered, drained when the
    // module is released.
    registrations: Arc<Mutex<Vec<(String, HookCallback)>>>,
    source: PathBuf,
    library: Option<libloading::Library>,
}

impl ModuleHandle {
    /// The module instance.
    pub fn module(&self) -> &dyn Module {
        self.module.as_ref()
    }

    /// The path of the binary this module was loaded from. Empty for
    /// modules installed programmatically.
    pub fn source(&self) -> &Path {
        &self.source
    }
}

/// Discovers, initializes, and tears down modules; owns their lifecycle.
pub struct ModuleManager {
    registry: Arc<HookRegistry>,
    modules: Vec<ModuleHandle>,
    open: Arc<AtomicBool>,
}

impl ModuleManager {
    /// Creates a manager that registers hooks into `registry`.
    pub fn new(registry: Arc<HookRegistry>) -> Self {
        Self {
            registry,
            modules: Vec::new(),
            open: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Returns a host handle for this manager.
    ///
    /// Hooks registered through a bare handle are not tied to any loaded
    /// module and stay registered until explicitly deregistered.
    pub fn host(&self) -> ModuleHost {
        ModuleHost {
            registry: Arc::clone(&self.registry),
            open: Arc::clone(&self.open),
            registrations: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Scans `dir` for module binaries and loads each one.
    ///
    /// Releases any previously loaded module set first: their hooks are
    /// deregistered and their instances shut down. Every binary with the
    /// platform dynamic-library extension is loaded, constructed through
    /// the exported entry symbol, attached to this manager, and
    /// initialized. A binary that fails to load, or a module whose
    /// initialize errors, is logged and skipped — the rest of the pass
    /// continues.
    ///
    /// Returns the number of modules successfully initialized.
    pub fn discover(&mut self, dir: &Path) -> Result<usize, ModuleError> {
        if !self.open.load(Ordering::Acquire) {
            return Err(ModuleError::Closed);
        }
        self.release_all();

        let entries = std::fs::read_dir(dir).map_err(|source| ModuleError::Dir {
            dir: dir.to_owned(),
            source,
        })?;

        let mut loaded = 0;
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(std::env::consts::DLL_EXTENSION) {
                continue;
            }

            let (library, module) = match loader::load(&path) {
                Ok(pair) => pair,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "skipping unloadable module binary");
                    continue;
                }
            };

            if self.attach(module, path.clone(), Some(library)).is_ok() {
                loaded += 1;
            }
        }

        info!(dir = %dir.display(), count = loaded, "module discovery finished");
        Ok(loaded)
    }

    /// Installs a statically constructed module.
    ///
    /// Runs the same host-assignment and initialization path as discovery.
    /// Used by embedders and tests that compile their modules into the
    /// host binary.
    pub fn install(
        &mut self,
        module: Box<dyn Module>,
        source: impl Into<PathBuf>,
    ) -> Result<(), ModuleError> {
        if !self.open.load(Ordering::Acquire) {
            return Err(ModuleError::Closed);
        }
        self.attach(module, source.into(), None)
    }

    // Shared load-and-init path. The host is assigned before initialize
    // runs; the handle joins the set only after initialize succeeds, so
    // every module in the set has been initialized exactly once.
    fn attach(
        &mut self,
        mut module: Box<dyn Module>,
        source: PathBuf,
        library: Option<libloading::Library>,
    ) -> Result<(), ModuleError> {
        let registrations = Arc::new(Mutex::new(Vec::new()));
        module.set_host(ModuleHost {
            registry: Arc::clone(&self.registry),
            open: Arc::clone(&self.open),
            registrations: Arc::clone(&registrations),
        });

        if let Err(e) = module.initialize() {
            // Anything it registered before failing comes back out.
            deregister_all(&self.registry, &registrations);
            warn!(
                module = module.name(),
                path = %source.display(),
                error = %e,
                "module failed to initialize; skipping"
            );
            return Err(e);
        }

        info!(
            module = module.name(),
            version = module.version(),
            "module initialized"
        );
        self.modules.push(ModuleHandle {
            module,
            registrations,
            source,
            library,
        });
        Ok(())
    }

    /// Shuts down every loaded module, removes the hooks each one
    /// registered, releases all instances, and clears the set. No further
    /// installations or hook registrations are accepted afterwards.
    pub fn shutdown_all(&mut self) {
        self.open.store(false, Ordering::Release);
        self.release_all();
    }

    // Deregisters each module's hooks, shuts the module down, then drops
    // the handles. Hooks come out first so no callback can fire, or be
    // dropped by the registry, after its library is unmapped.
    fn release_all(&mut self) {
        for handle in &mut self.modules {
            info!(module = handle.module.name(), "shutting down module");
            deregister_all(&self.registry, &handle.registrations);
            handle.module.shutdown();
        }
        self.modules.clear();
    }

    /// Finds a loaded module by name or by source-binary path.
    pub fn find(&self, name_or_path: &str) -> Option<&ModuleHandle> {
        self.modules.iter().find(|handle| {
            handle.module.name() == name_or_path || handle.source == Path::new(name_or_path)
        })
    }

    /// Returns the number of loaded modules.
    pub fn len(&self) -> usize {
        self.modules.len()
    }

    /// Returns `true` if no modules are loaded.
    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }
}
