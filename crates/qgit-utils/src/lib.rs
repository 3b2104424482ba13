//! Shared plumbing for the qrexec git remote helper.
//!
//! This crate provides the trust wrapper that tracks remote-originated bytes
//! until they are verified, and a subprocess builder with the deadline and
//! output-cap behavior the rest of the workspace relies on.

pub mod error;
pub mod subprocess;
pub mod trust;

pub use error::UtilError;
pub use trust::Untrusted;

pub type Result<T> = std::result::Result<T, UtilError>;
