//! Transport layer: the `qrexec://` remote specification and the RPC client
//! that calls named services across the domain boundary.
//!
//! Everything returned by [`RpcClient::call`] is wrapped in
//! [`qgit_utils::Untrusted`]; this crate never interprets response bytes.

pub mod rpc;
pub mod url;

pub use rpc::RpcClient;
pub use url::RemoteSpec;

/// Errors that can occur during transport operations.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    #[error("no qrexec client program found")]
    MissingClient,

    #[error("qrexec call {service} failed with exit code {code}: {stderr}")]
    CallFailed {
        service: String,
        code: i32,
        stderr: String,
    },

    #[error("qrexec call {service} timed out")]
    Timeout { service: String },

    #[error("qrexec call {service} exceeded the {limit}-byte response cap")]
    Oversize { service: String, limit: usize },

    #[error(transparent)]
    Subprocess(qgit_utils::UtilError),
}
