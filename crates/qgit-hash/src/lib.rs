//! Hash computation and object identity for the qrexec remote helper.
//!
//! This crate provides the `ObjectId` type (a SHA-1 content address), hex
//! encoding/decoding, and the streaming hasher used to verify every object
//! that crosses the trust boundary.

mod error;
pub mod hasher;
pub mod hex;
mod oid;

pub use error::HashError;
pub use hasher::Hasher;
pub use oid::ObjectId;
