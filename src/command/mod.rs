//! Rendering commands, regions, requests and their cache keys.

/// Stable content keys.
pub mod fingerprint;
/// Commands, regions and the requests built from them.
pub mod request;
