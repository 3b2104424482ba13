//! The qrexec RPC client.
//!
//! One operation: invoke a named service with the repository argument on the
//! configured peer, optionally feeding an input blob, and collect the
//! response subject to a hard deadline and a hard size cap. Responses are
//! returned wrapped in [`Untrusted`] — nothing here looks at them.

use std::path::{Path, PathBuf};
use std::time::Duration;

use qgit_utils::subprocess::ChildProcess;
use qgit_utils::{Untrusted, UtilError};

use crate::TransportError;

/// Default per-call deadline.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Default cap on response size.
pub const DEFAULT_MAX_BYTES: usize = 10 * 1024 * 1024;

/// The qrexec client inside a VM: `qrexec-client-vm <peer> <service>`.
const VM_CLIENT: &str = "/usr/lib/qubes/qrexec-client-vm";

/// The qrexec client in dom0: `qrexec-client -d <peer> <command>`.
const DOM0_CLIENT: &str = "/usr/bin/qrexec-client";

/// Which client program was found, deciding the argv convention.
#[derive(Debug, Clone, PartialEq, Eq)]
enum ClientKind {
    Vm(PathBuf),
    Dom0(PathBuf),
}

/// RPC client bound to one peer.
#[derive(Debug)]
pub struct RpcClient {
    peer: String,
    client: ClientKind,
    timeout: Duration,
    max_bytes: usize,
}

impl RpcClient {
    /// Create a client for `peer`, probing for the qrexec client program.
    ///
    /// `GIT_QREXEC_CLIENT` overrides the probe (the override is invoked with
    /// the VM-side argv convention). `GIT_QREXEC_TIMEOUT_MS` and
    /// `GIT_QREXEC_MAX_BYTES` override the limits.
    pub fn from_env(peer: impl Into<String>) -> Result<Self, TransportError> {
        let client = match std::env::var_os("GIT_QREXEC_CLIENT") {
            Some(path) => ClientKind::Vm(PathBuf::from(path)),
            None => probe_client().ok_or(TransportError::MissingClient)?,
        };

        let timeout = std::env::var("GIT_QREXEC_TIMEOUT_MS")
            .ok()
            .and_then(|v| v.parse().ok())
            .map(Duration::from_millis)
            .unwrap_or(DEFAULT_TIMEOUT);
        let max_bytes = std::env::var("GIT_QREXEC_MAX_BYTES")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_MAX_BYTES);

        Ok(Self {
            peer: peer.into(),
            client,
            timeout,
            max_bytes,
        })
    }

    /// The response size cap currently in force.
    pub fn max_bytes(&self) -> usize {
        self.max_bytes
    }

    /// Invoke `<service>+<repo>` on the peer.
    ///
    /// Any outcome other than a zero exit within the deadline and under the
    /// size cap is an error; remote policy denials surface as non-zero
    /// client exits.
    pub fn call(
        &self,
        service: &str,
        repo: &str,
        input: Option<&[u8]>,
    ) -> Result<Untrusted<Vec<u8>>, TransportError> {
        let service_id = format!("{service}+{repo}");

        let mut cmd = match &self.client {
            ClientKind::Vm(path) => ChildProcess::new(path).arg(&self.peer).arg(&service_id),
            ClientKind::Dom0(path) => ChildProcess::new(path)
                .arg("-d")
                .arg(&self.peer)
                .arg(format!("DEFAULT:QUBESRPC {service_id} dom0")),
        };
        cmd = cmd.timeout(self.timeout).max_output(self.max_bytes);
        if let Some(input) = input {
            cmd = cmd.input(input);
        }

        let output = cmd.run().map_err(|e| match e {
            UtilError::SubprocessTimeout { .. } => TransportError::Timeout {
                service: service_id.clone(),
            },
            UtilError::SubprocessOutputLimit { limit, .. } => TransportError::Oversize {
                service: service_id.clone(),
                limit,
            },
            other => TransportError::Subprocess(other),
        })?;

        if !output.success() {
            return Err(TransportError::CallFailed {
                service: service_id,
                code: output.status.code().unwrap_or(-1),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(Untrusted::new(output.stdout))
    }
}

fn probe_client() -> Option<ClientKind> {
    if Path::new(VM_CLIENT).exists() {
        return Some(ClientKind::Vm(PathBuf::from(VM_CLIENT)));
    }
    if Path::new(DOM0_CLIENT).exists() {
        return Some(ClientKind::Dom0(PathBuf::from(DOM0_CLIENT)));
    }
    None
}
