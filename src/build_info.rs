//! Build metadata.

/// Crate version reported by the `/version` endpoint and the CLI.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
