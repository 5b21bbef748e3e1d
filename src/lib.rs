//! Thin facade over [`bridge_connector`], mirroring the teacher workspace's
//! pattern of a root crate that re-exports its implementation crates behind
//! a feature (`client`, here mapping onto `bridge_connector`).
//!
//! Consumers should generally depend on `bridge_connector` directly; this
//! crate exists so the workspace has a single published entry point.

#[cfg(feature = "client")]
pub use bridge_connector::*;
