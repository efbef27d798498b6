// Generated by the build script
include!(concat!(env!("OUT_DIR"), "/built.rs"));

/// Crate version reported by `/health` and stamped into model artifacts.
pub fn version() -> &'static str {
    PKG_VERSION
}

/// Short human-readable build description for startup logs.
pub fn describe() -> String {
    format!("{} v{} ({}, {})", PKG_NAME, PKG_VERSION, PROFILE, RUSTC_VERSION)
}
