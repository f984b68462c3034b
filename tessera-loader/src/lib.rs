//! Dynamic plugin host for Tessera.
//!
//! Loads plugin artifacts from the configured directory (release mode) or
//! from the process-global self-registration list (development), drives
//! them through the extension lifecycle, and exposes the hot-reload
//! management endpoints.

mod error;
mod host;
mod routes;
mod statics;

pub use error::LoaderError;
pub use host::{PluginDescriptor, PluginHost, PLUGIN_ENTRY_SYMBOL};
pub use routes::{management_routes, Management};
pub use statics::{clear_static_plugins, register_static_plugin, static_plugins, PluginCtor};

// Re-exported for the `declare_plugin!` macro expansion.
pub use tessera_core::Extension;
