use std::path::{Path, PathBuf};

use bstr::{BString, ByteSlice};
use qgit_hash::ObjectId;
use qgit_object::{name, ObjectType, RawObject};
use qgit_utils::subprocess::ChildProcess;

use crate::StoreError;

/// One entry of a tree listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeEntry {
    pub mode: BString,
    pub kind: EntryKind,
    pub oid: ObjectId,
    pub path: BString,
}

/// What a tree entry points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    Blob,
    Tree,
    /// A submodule gitlink. Recorded but never recursed into.
    Commit,
}

/// Read-side oracle over the local object database, answered by the `git`
/// binary with `GIT_DIR` pinned.
///
/// Existence queries that fail for any reason are answered "not present":
/// the caller then falls back to fetching from the remote, and the fetched
/// bytes are verified on arrival either way.
pub struct PlumbingOracle {
    git_dir: PathBuf,
}

impl PlumbingOracle {
    /// Create an oracle for the given git directory.
    pub fn new(git_dir: impl AsRef<Path>) -> Self {
        Self {
            git_dir: git_dir.as_ref().to_path_buf(),
        }
    }

    fn git(&self) -> ChildProcess {
        ChildProcess::new("git").env("GIT_DIR", &self.git_dir)
    }

    /// The type of a locally present object, or `None` if not present.
    pub fn kind(&self, oid: &ObjectId) -> Option<ObjectType> {
        let result = self
            .git()
            .arg("cat-file")
            .arg("-t")
            .arg(oid.to_hex())
            .run()
            .ok()?;
        if !result.success() {
            return None;
        }
        ObjectType::from_bytes(result.stdout.trim_ascii()).ok()
    }

    /// Read a locally present object of known type.
    pub fn read(&self, oid: &ObjectId, otype: ObjectType) -> Result<RawObject, StoreError> {
        let result = self
            .git()
            .arg("cat-file")
            .arg(otype.as_str())
            .arg(oid.to_hex())
            .run()?;
        if !result.success() {
            return Err(StoreError::Unreadable {
                oid: oid.to_hex(),
                reason: String::from_utf8_lossy(&result.stderr).trim().to_string(),
            });
        }
        Ok(RawObject::from_local(*oid, otype, result.stdout))
    }

    /// Enumerate the entries of a locally present tree.
    pub fn tree_entries(&self, oid: &ObjectId) -> Result<Vec<TreeEntry>, StoreError> {
        let result = self.git().arg("ls-tree").arg(oid.to_hex()).run()?;
        if !result.success() {
            return Err(StoreError::Unreadable {
                oid: oid.to_hex(),
                reason: String::from_utf8_lossy(&result.stderr).trim().to_string(),
            });
        }

        let mut entries = Vec::new();
        for line in result.stdout.lines() {
            entries.push(parse_tree_line(oid, line)?);
        }
        Ok(entries)
    }
}

/// Parse one `ls-tree` line: `<mode> SP <type> SP <oid> TAB <path>`.
fn parse_tree_line(tree: &ObjectId, line: &[u8]) -> Result<TreeEntry, StoreError> {
    let malformed = |reason: &str| StoreError::MalformedTree {
        oid: tree.to_hex(),
        reason: reason.to_string(),
    };

    let (meta, path) = line
        .split_once_str("\t")
        .ok_or_else(|| malformed("missing tab"))?;
    let mut fields = meta.splitn(3, |&b| b == b' ');
    let mode = fields.next().ok_or_else(|| malformed("missing mode"))?;
    let kind = fields.next().ok_or_else(|| malformed("missing type"))?;
    let oid_hex = fields.next().ok_or_else(|| malformed("missing oid"))?;

    let kind = match kind {
        b"blob" => EntryKind::Blob,
        b"tree" => EntryKind::Tree,
        b"commit" => EntryKind::Commit,
        other => {
            return Err(StoreError::UnknownEntryKind {
                oid: tree.to_hex(),
                kind: String::from_utf8_lossy(other).to_string(),
            })
        }
    };

    let oid = name::oid_from_untrusted(oid_hex)
        .map_err(|e| malformed(&format!("bad oid: {e}")))?;

    Ok(TreeEntry {
        mode: BString::from(mode),
        kind,
        oid,
        path: BString::from(path),
    })
}
