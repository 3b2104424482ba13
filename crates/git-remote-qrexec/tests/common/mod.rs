//! Shared test harness for git-remote-qrexec integration tests.
//!
//! Each test gets a private sandbox: a real git repository for the local
//! object database, a fixture directory the fake qrexec client serves
//! objects from, and stub `qrexec-client-vm` / `gpgv` executables whose
//! behavior is baked into their script bodies. The helper binary is driven
//! through its real stdin/stdout, exactly as git would.

#![allow(dead_code)]

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use qgit_hash::Hasher;

/// Captured output from one helper run.
pub struct CommandResult {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

/// Discover the path to the compiled `git-remote-qrexec` binary.
pub fn helper_bin() -> PathBuf {
    let mut path = std::env::current_exe()
        .unwrap()
        .parent()
        .unwrap()
        .parent()
        .unwrap()
        .to_path_buf();
    path.push("git-remote-qrexec");
    path
}

/// A test sandbox: local repo, remote fixtures, and stub executables.
pub struct Fixture {
    pub dir: tempfile::TempDir,
    /// GIT_DIR of the local repository.
    pub git_dir: PathBuf,
    /// Directory the fake qrexec client serves from.
    pub fixtures: PathBuf,
    /// Every service id the fake client was invoked with, one per line.
    pub call_log: PathBuf,
    /// The fake qrexec client.
    pub client: PathBuf,
    /// The fake signature verifier.
    pub gpgv: PathBuf,
}

impl Fixture {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let repo = dir.path().join("repo");
        fs::create_dir(&repo).unwrap();
        let status = Command::new("git")
            .args(["init", "-q"])
            .current_dir(&repo)
            .status()
            .expect("failed to run git init");
        assert!(status.success(), "git init failed");
        let git_dir = repo.join(".git");

        let fixtures = dir.path().join("fixtures");
        fs::create_dir_all(fixtures.join("objects")).unwrap();
        let call_log = dir.path().join("calls.log");

        let client = dir.path().join("qrexec-client-vm");
        write_script(
            &client,
            &format!(
                r#"printf '%s\n' "$2" >> "{log}"
svc=${{2%%+*}}
case "$svc" in
    git.List) cat "{fixtures}/list" ;;
    git.ListHeadOnly) cat "{fixtures}/list_head" ;;
    git.Fetch) oid=$(cat); cat "{fixtures}/objects/$oid" ;;
    *) exit 1 ;;
esac
"#,
                log = call_log.display(),
                fixtures = fixtures.display(),
            ),
        );

        // The default verifier accepts everything (probe and verify alike).
        let gpgv = dir.path().join("gpgv");
        write_script(&gpgv, "exit 0\n");

        Self {
            dir,
            git_dir,
            fixtures,
            call_log,
            client,
            gpgv,
        }
    }

    /// Replace the verifier with one that always rejects.
    pub fn rejecting_gpgv(&self) {
        write_script(&self.gpgv, "exit 1\n");
    }

    /// Set the tag listing served for `git.ListHeadOnly`.
    pub fn set_head_listing(&self, text: &str) {
        fs::write(self.fixtures.join("list_head"), text).unwrap();
    }

    /// Set the tag listing served for `git.List`.
    pub fn set_full_listing(&self, text: &str) {
        fs::write(self.fixtures.join("list"), text).unwrap();
    }

    /// Add a raw loose object to the remote fixtures. Returns its hex id.
    pub fn add_object(&self, otype: &str, content: &[u8]) -> String {
        let (hex, raw) = loose(otype, content);
        fs::write(self.fixtures.join("objects").join(&hex), raw).unwrap();
        hex
    }

    /// Add pre-built raw bytes under an asserted id (for tampering tests).
    pub fn add_raw_object(&self, hex: &str, raw: &[u8]) {
        fs::write(self.fixtures.join("objects").join(hex), raw).unwrap();
    }

    /// Run the helper against this sandbox, feeding `input` on stdin.
    pub fn run_helper(&self, url: &str, input: &str) -> CommandResult {
        self.run_helper_with(url, input, &[])
    }

    /// As `run_helper`, with extra environment variables.
    pub fn run_helper_with(
        &self,
        url: &str,
        input: &str,
        env: &[(&str, &str)],
    ) -> CommandResult {
        let mut cmd = Command::new(helper_bin());
        cmd.arg("origin")
            .arg(url)
            .current_dir(self.dir.path())
            .env("GIT_DIR", &self.git_dir)
            .env("GIT_QREXEC_CLIENT", &self.client)
            .env("GIT_QREXEC_GPGV", &self.gpgv)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        for (key, val) in env {
            cmd.env(key, val);
        }

        let mut child = cmd.spawn().expect("failed to spawn helper");
        // A helper that fails fast may close stdin before we finish writing.
        let _ = child.stdin.take().unwrap().write_all(input.as_bytes());
        let output = child.wait_with_output().unwrap();
        CommandResult {
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            exit_code: output.status.code().unwrap_or(-1),
        }
    }

    /// Hex ids of all loose objects in the local repository.
    pub fn local_objects(&self) -> Vec<String> {
        let mut found = Vec::new();
        let objects = self.git_dir.join("objects");
        for entry in fs::read_dir(&objects).unwrap() {
            let entry = entry.unwrap();
            let name = entry.file_name().to_string_lossy().to_string();
            if name.len() != 2 || !entry.path().is_dir() {
                continue;
            }
            for inner in fs::read_dir(entry.path()).unwrap() {
                let inner = inner.unwrap();
                found.push(format!("{}{}", name, inner.file_name().to_string_lossy()));
            }
        }
        found.sort();
        found
    }

    /// Number of `git.Fetch` calls logged so far.
    pub fn fetch_calls(&self) -> usize {
        match fs::read_to_string(&self.call_log) {
            Ok(log) => log.lines().filter(|l| l.starts_with("git.Fetch+")).count(),
            Err(_) => 0,
        }
    }
}

fn write_script(path: &Path, body: &str) {
    fs::write(path, format!("#!/bin/sh\n{body}")).unwrap();
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(0o755)).unwrap();
    }
}

// ──────────────────────────── Object Fabrication ────────────────────────────

/// Build raw loose-object bytes and their id.
pub fn loose(otype: &str, content: &[u8]) -> (String, Vec<u8>) {
    let mut raw = format!("{otype} {}\0", content.len()).into_bytes();
    raw.extend_from_slice(content);
    let hex = Hasher::digest(&raw).unwrap().to_hex();
    (hex, raw)
}

/// Serialize tree content from `(mode, name, hex-oid)` entries.
///
/// Entries must already be in git's sort order.
pub fn tree_content(entries: &[(&str, &str, &str)]) -> Vec<u8> {
    let mut out = Vec::new();
    for (mode, name, hex) in entries {
        out.extend_from_slice(mode.as_bytes());
        out.push(b' ');
        out.extend_from_slice(name.as_bytes());
        out.push(0);
        out.extend_from_slice(&hex_bytes(hex));
    }
    out
}

/// Serialize commit content.
pub fn commit_content(tree: &str, parents: &[&str], message: &str) -> Vec<u8> {
    let mut out = format!("tree {tree}\n");
    for parent in parents {
        out.push_str(&format!("parent {parent}\n"));
    }
    out.push_str("author A U Thor <author@example.com> 1234567890 +0000\n");
    out.push_str("committer A U Thor <author@example.com> 1234567890 +0000\n");
    out.push('\n');
    out.push_str(message);
    out.into_bytes()
}

/// Serialize signed-tag content: headers, message, and a detached-signature
/// block the stub verifier will accept.
pub fn signed_tag_content(name: &str, target: &str, target_type: &str) -> Vec<u8> {
    format!(
        "object {target}\n\
         type {target_type}\n\
         tag {name}\n\
         tagger A U Thor <author@example.com> 1234567890 +0000\n\
         \n\
         release {name}\n\
         -----BEGIN PGP SIGNATURE-----\n\
         \n\
         iQFakeSignatureBlockForTests\n\
         -----END PGP SIGNATURE-----\n"
    )
    .into_bytes()
}

fn hex_bytes(hex: &str) -> Vec<u8> {
    hex.as_bytes()
        .chunks(2)
        .map(|pair| {
            let hi = (pair[0] as char).to_digit(16).unwrap() as u8;
            let lo = (pair[1] as char).to_digit(16).unwrap() as u8;
            (hi << 4) | lo
        })
        .collect()
}
