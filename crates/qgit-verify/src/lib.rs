//! Detached-signature verification of annotated tags.
//!
//! The verifier binary (gpgv or compatible) is opaque: it gets the keyrings,
//! the detached signature, and the signed payload, and only its exit status
//! is trusted. Signature and payload are fed over two streams that must be
//! written **concurrently** — the child may block reading one until the
//! other has been opened, so sequential writes deadlock (guaranteed on the
//! FIFO fallback, possible on pipes).

mod pipes;

use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use bstr::{BString, ByteSlice};
use qgit_utils::subprocess::ChildProcess;

/// The ASCII armor marker separating payload from detached signature.
pub const SIGNATURE_MARKER: &[u8] = b"-----BEGIN PGP SIGNATURE-----";

/// Errors from signature verification.
#[derive(Debug, thiserror::Error)]
pub enum VerifyError {
    #[error("tag carries no PGP signature")]
    MissingSignature,

    #[error("failed to spawn verifier {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("signature rejected by verifier (exit code {code}): {stderr}")]
    Rejected { code: i32, stderr: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// How signature and payload reach the verifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FeedStyle {
    /// Inherited pipe file descriptors, named as `-&N` arguments.
    Fd,
    /// Named FIFOs in a private temporary directory.
    Fifo,
}

/// Handle to the external signature verifier.
pub struct Verifier {
    program: PathBuf,
    keyrings: Vec<String>,
    feed: FeedStyle,
}

impl Verifier {
    /// Create a verifier, probing once how the binary accepts its inputs.
    ///
    /// A binary that exits zero for
    /// `--enable-special-filenames --version` gets the fd-passing variant;
    /// anything else falls back to named FIFOs.
    pub fn new(program: impl Into<PathBuf>, keyrings: Vec<String>) -> Self {
        let program = program.into();
        let feed = probe_feed_style(&program);
        Self {
            program,
            keyrings,
            feed,
        }
    }

    /// Split tag content at the signature marker and verify the signature
    /// over the preceding payload. Returns the verified payload.
    pub fn verify(&self, content: &[u8]) -> Result<BString, VerifyError> {
        let pos = content
            .find(SIGNATURE_MARKER)
            .ok_or(VerifyError::MissingSignature)?;
        let payload = &content[..pos];
        let signature = &content[pos..];

        match self.feed {
            FeedStyle::Fd => self.run_fd(signature, payload)?,
            FeedStyle::Fifo => self.run_fifo(signature, payload)?,
        }
        Ok(BString::from(payload))
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        for keyring in &self.keyrings {
            cmd.arg(format!("--keyring={keyring}"));
        }
        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::null());
        cmd.stderr(Stdio::piped());
        cmd
    }

    fn spawn(&self, cmd: &mut Command) -> Result<Child, VerifyError> {
        cmd.spawn().map_err(|e| VerifyError::Spawn {
            program: self.program.display().to_string(),
            source: e,
        })
    }

    /// Fd-passing variant: the child inherits the read ends of two pipes and
    /// is told their numbers.
    fn run_fd(&self, signature: &[u8], payload: &[u8]) -> Result<(), VerifyError> {
        let (sig_read, mut sig_write) = pipes::pipe_pair()?;
        let (payload_read, mut payload_write) = pipes::pipe_pair()?;
        // The child must inherit only the read ends; a write end leaking
        // into the child would keep its own input open past our close.
        pipes::set_cloexec(&sig_write)?;
        pipes::set_cloexec(&payload_write)?;

        let mut cmd = self.command();
        cmd.arg("--enable-special-filenames").arg("--");
        {
            use std::os::unix::io::AsRawFd;
            cmd.arg(format!("-&{}", sig_read.as_raw_fd()));
            cmd.arg(format!("-&{}", payload_read.as_raw_fd()));
        }

        let mut child = self.spawn(&mut cmd)?;
        drop(sig_read);
        drop(payload_read);

        let sig_bytes = signature.to_vec();
        let payload_bytes = payload.to_vec();
        let sig_thread = thread::spawn(move || {
            let _ = sig_write.write_all(&sig_bytes);
        });
        let payload_thread = thread::spawn(move || {
            let _ = payload_write.write_all(&payload_bytes);
        });

        let result = reap(&mut child);
        let _ = sig_thread.join();
        let _ = payload_thread.join();
        result
    }

    /// FIFO fallback for verifiers without fd-number support.
    fn run_fifo(&self, signature: &[u8], payload: &[u8]) -> Result<(), VerifyError> {
        let dir = tempfile::Builder::new()
            .prefix("git-remote-qrexec")
            .tempdir()?;
        let sig_path = dir.path().join("signature");
        let payload_path = dir.path().join("payload");
        pipes::mkfifo(&sig_path)?;
        pipes::mkfifo(&payload_path)?;

        let mut cmd = self.command();
        cmd.arg("--").arg(&sig_path).arg(&payload_path);
        let mut child = self.spawn(&mut cmd)?;

        let give_up = Arc::new(AtomicBool::new(false));
        let sig_thread = spawn_fifo_writer(sig_path, signature.to_vec(), give_up.clone());
        let payload_thread =
            spawn_fifo_writer(payload_path, payload.to_vec(), give_up.clone());

        let result = reap(&mut child);
        // The child is gone; release any writer still waiting for a reader.
        give_up.store(true, Ordering::Release);
        let _ = sig_thread.join();
        let _ = payload_thread.join();
        drop(dir);
        result
    }
}

/// Feed one FIFO from its own thread.
fn spawn_fifo_writer(
    path: PathBuf,
    data: Vec<u8>,
    give_up: Arc<AtomicBool>,
) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        if let Ok(Some(mut writer)) = pipes::open_fifo_writer(&path, &give_up) {
            let _ = writer.write_all(&data);
        }
    })
}

/// Drain stderr, wait for exit, and map the status to a verdict.
fn reap(child: &mut Child) -> Result<(), VerifyError> {
    let mut stderr = Vec::new();
    if let Some(mut pipe) = child.stderr.take() {
        let _ = pipe.read_to_end(&mut stderr);
    }
    let status = child.wait()?;
    if status.success() {
        Ok(())
    } else {
        Err(VerifyError::Rejected {
            code: status.code().unwrap_or(-1),
            stderr: String::from_utf8_lossy(&stderr).trim().to_string(),
        })
    }
}

fn probe_feed_style(program: &Path) -> FeedStyle {
    let supports_fd = ChildProcess::new(program)
        .arg("--enable-special-filenames")
        .arg("--version")
        .timeout(Duration::from_secs(5))
        .run()
        .map(|out| out.success())
        .unwrap_or(false);
    if supports_fd {
        FeedStyle::Fd
    } else {
        FeedStyle::Fifo
    }
}
