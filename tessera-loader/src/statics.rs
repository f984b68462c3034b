//! Development-mode plugin self-registration.
//!
//! Plugin crates linked into the binary register a constructor into the
//! process-global list (usually from `main`, or a crate-provided `register`
//! function); [`PluginHost::load_all`](crate::PluginHost::load_all) drains
//! the list into the registry in non-release modes, replacing dlopen with a
//! link-time list.

use std::sync::{Arc, Mutex, OnceLock};

use tessera_core::Extension;

/// Constructor producing a fresh plugin instance.
pub type PluginCtor = fn() -> Arc<dyn Extension>;

fn registry() -> &'static Mutex<Vec<PluginCtor>> {
    static STATIC_PLUGINS: OnceLock<Mutex<Vec<PluginCtor>>> = OnceLock::new();
    STATIC_PLUGINS.get_or_init(|| Mutex::new(Vec::new()))
}

/// Add a plugin constructor to the process-global list.
pub fn register_static_plugin(ctor: PluginCtor) {
    registry().lock().expect("static plugin lock poisoned").push(ctor);
}

/// Instantiate every registered constructor.
pub fn static_plugins() -> Vec<Arc<dyn Extension>> {
    registry()
        .lock()
        .expect("static plugin lock poisoned")
        .iter()
        .map(|ctor| ctor())
        .collect()
}

/// Drop all registered constructors (test isolation).
pub fn clear_static_plugins() {
    registry().lock().expect("static plugin lock poisoned").clear();
}
