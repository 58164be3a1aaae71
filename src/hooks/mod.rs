//! Named extension points in the request lifecycle.
//!
//! Modules register callbacks against hook names; the pipeline fans out to
//! every callback registered for a name, in registration order, handing
//! each a mutable reference to the current [`Request`]. The registry is
//! shared by every in-flight connection, so mutation and iteration are
//! guarded by a read/write lock — a module registered or removed while
//! requests are being served cannot corrupt a dispatch in progress.
//!
//! Hook names dispatched by the built-in pipeline:
//!
//! - `start.request` — right after parsing, before any filesystem access.
//! - `request.rawfile.process` — right after a file's bytes are read, before
//!   the response is emitted.

use std::sync::{Arc, PoisonError, RwLock};

use tracing::trace;

use crate::http::Request;

/// Hook fired immediately after the request line and headers are parsed.
pub const HOOK_START_REQUEST: &str = "start.request";

/// Hook fired after a resolved file's bytes have been read into the request.
pub const HOOK_RAWFILE_PROCESS: &str = "request.rawfile.process";

/// A hook callback.
///
/// Callbacks run synchronously on the connection's task and may mutate the
/// request in place; later callbacks in the same invocation observe the
/// cumulative effect of earlier ones. The `Arc` is the callback's identity
/// for deregistration.
pub type HookCallback = Arc<dyn Fn(&mut Request) + Send + Sync>;

struct HookRegistration {
    hook: String,
    callback: HookCallback,
}

/// An ordered list of (hook name, callback) registrations.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use modserve::hooks::{HookCallback, HookRegistry};
/// use modserve::http::Request;
///
/// let registry = HookRegistry::new();
/// let upper: HookCallback = Arc::new(|req: &mut Request| {
///     let shouted = req.target().to_uppercase();
///     req.set_target(shouted);
/// });
/// registry.register("start.request", upper);
///
/// let mut req = Request::parse(b"GET /a HTTP/1.1\r\n\r\n");
/// registry.invoke("start.request", &mut req);
/// assert_eq!(req.target(), "/A");
/// ```
#[derive(Default)]
pub struct HookRegistry {
    callbacks: RwLock<Vec<HookRegistration>>,
}

impl HookRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a registration. Registration order is invocation order.
    pub fn register(&self, hook: &str, callback: HookCallback) {
        trace!(hook, "hook registered");
        self.callbacks
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(HookRegistration {
                hook: hook.to_owned(),
                callback,
            });
    }

    /// Removes *all* registrations matching both the hook name and the
    /// callback identity. Removing a pair that was never registered is a
    /// no-op.
    pub fn deregister(&self, hook: &str, callback: &HookCallback) {
        self.callbacks
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|reg| !(reg.hook == hook && Arc::ptr_eq(&reg.callback, callback)));
    }

    /// Invokes every callback registered for `hook`, in registration order,
    /// against `request`. A hook name with zero registrations is a no-op.
    ///
    /// The matching callbacks are snapshotted under the read guard and run
    /// after it is released, so a callback may register or deregister hooks
    /// without deadlocking — the current invocation still runs the full
    /// snapshot, unskipped and unreordered.
    pub fn invoke(&self, hook: &str, request: &mut Request) {
        let matching: Vec<HookCallback> = {
            let callbacks = self
                .callbacks
                .read()
                .unwrap_or_else(PoisonError::into_inner);
            callbacks
                .iter()
                .filter(|reg| reg.hook == hook)
                .map(|reg| Arc::clone(&reg.callback))
                .collect()
        };

        trace!(hook, count = matching.len(), "invoking hook callbacks");
        for callback in matching {
            callback(request);
        }
    }

    /// Returns the total number of registrations across all hook names.
    pub fn len(&self) -> usize {
        self.callbacks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Returns `true` if no callbacks are registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn recorder(log: Arc<Mutex<Vec<&'static str>>>, tag: &'static str) -> HookCallback {
        Arc::new(move |_req: &mut Request| {
            log.lock().unwrap().push(tag);
        })
    }

    #[test]
    fn invocation_follows_registration_order() {
        let registry = HookRegistry::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        registry.register("h", recorder(Arc::clone(&log), "first"));
        registry.register("h", recorder(Arc::clone(&log), "second"));
        registry.register("other", recorder(Arc::clone(&log), "unrelated"));

        let mut req = Request::default();
        registry.invoke("h", &mut req);
        assert_eq!(*log.lock().unwrap(), vec!["first", "second"]);
    }

    #[test]
    fn unregistered_hook_is_noop() {
        let registry = HookRegistry::new();
        let mut req = Request::default();
        registry.invoke("nobody.home", &mut req);
    }

    #[test]
    fn callbacks_observe_prior_mutations() {
        let registry = HookRegistry::new();
        registry.register(
            "h",
            Arc::new(|req: &mut Request| req.set_target("/rewritten")),
        );
        let seen = Arc::new(Mutex::new(String::new()));
        let seen_in_cb = Arc::clone(&seen);
        registry.register(
            "h",
            Arc::new(move |req: &mut Request| {
                *seen_in_cb.lock().unwrap() = req.target().to_owned();
            }),
        );

        let mut req = Request::default();
        registry.invoke("h", &mut req);
        assert_eq!(*seen.lock().unwrap(), "/rewritten");
    }

    #[test]
    fn deregister_removes_all_matching_entries() {
        let registry = HookRegistry::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        let dup = recorder(Arc::clone(&log), "dup");
        let keep = recorder(Arc::clone(&log), "keep");

        // The same callback registered twice is removed together.
        registry.register("h", Arc::clone(&dup));
        registry.register("h", Arc::clone(&keep));
        registry.register("h", Arc::clone(&dup));
        assert_eq!(registry.len(), 3);

        registry.deregister("h", &dup);
        assert_eq!(registry.len(), 1);

        let mut req = Request::default();
        registry.invoke("h", &mut req);
        assert_eq!(*log.lock().unwrap(), vec!["keep"]);
    }

    #[test]
    fn deregister_missing_pair_is_noop() {
        let registry = HookRegistry::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        let cb = recorder(Arc::clone(&log), "cb");
        registry.register("h", Arc::clone(&cb));

        // Same callback, different hook name: nothing matches.
        registry.deregister("other", &cb);
        assert_eq!(registry.len(), 1);

        // Never-registered callback: nothing matches.
        let stranger = recorder(Arc::clone(&log), "stranger");
        registry.deregister("h", &stranger);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn same_name_different_identity_survives_deregistration() {
        let registry = HookRegistry::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        let a = recorder(Arc::clone(&log), "a");
        let b = recorder(Arc::clone(&log), "b");
        registry.register("h", Arc::clone(&a));
        registry.register("h", Arc::clone(&b));

        registry.deregister("h", &a);
        let mut req = Request::default();
        registry.invoke("h", &mut req);
        assert_eq!(*log.lock().unwrap(), vec!["b"]);
    }
}
