//! Low-level primitives shared by the tree manager.

/// Timed reader/writer lock guarding structural changes.
pub mod concurrency;
