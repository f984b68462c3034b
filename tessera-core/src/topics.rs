//! Well-known event topics used by the runtime and the stock business
//! extensions.

/// Topic published when an extension reaches Ready.
pub fn ext_ready(name: &str) -> String {
    format!("exts.{name}.ready")
}

/// Topic published when an extension starts stopping (shutdown or unload).
pub fn ext_stopping(name: &str) -> String {
    format!("exts.{name}.stopping")
}

pub const USER_CREATED: &str = "user.created";
pub const USER_UPDATED: &str = "user.updated";
pub const USER_DELETED: &str = "user.deleted";
pub const USER_PASSWORD_CHANGED: &str = "user.password_changed";
pub const USER_PASSWORD_RESET: &str = "user.password_reset";
pub const USER_PROFILE_UPDATED: &str = "user.profile_updated";
pub const USER_STATUS_UPDATED: &str = "user.status_updated";
pub const USER_APIKEY_GENERATED: &str = "user.apikey_generated";
pub const USER_APIKEY_DELETED: &str = "user.apikey_deleted";
