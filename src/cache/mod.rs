//! Persistent dependency cache
//!
//! The installer's download cache lives in a named engine volume that is
//! mounted into every exec step. Volumes created by mlpipe carry labels so
//! they can be listed and cleared without touching unrelated volumes.
//!
//! The volume's contents are opaque here: concurrent access and locking are
//! left to the engine and the installer.

pub mod volume;

pub use volume::{ensure_volume, labels, CacheMount, CacheVolume};
