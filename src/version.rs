// Version constants surfaced on the health endpoint.

/// Version string for this crate.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Package name.
pub const PKG_NAME: &str = env!("CARGO_PKG_NAME");
