//! In-memory authoritative store and index helpers.

/// Helper index aliases.
pub mod indices;
/// Authoritative card store, scheduler entry points, and trails.
pub mod store;
