//! Local object database access: loose object writes and the plumbing
//! oracle used to decide what is already present.
//!
//! Writes only ever create new files under `objects/XX/YYYY...`; nothing in
//! the database is modified. Reads go through the `git` binary so every
//! representation C git understands (loose, packed, alternates) counts as
//! "already have it".

mod oracle;
mod write;

pub use oracle::{EntryKind, PlumbingOracle, TreeEntry};

use std::path::{Path, PathBuf};

use qgit_hash::ObjectId;

/// Interface to the loose object directory (`$GIT_DIR/objects/`).
pub struct LooseStore {
    /// Path to the objects directory.
    objects_dir: PathBuf,
    /// Zlib compression level.
    compression_level: flate2::Compression,
}

impl LooseStore {
    /// Open the loose store for a git directory.
    pub fn open(git_dir: impl AsRef<Path>) -> Self {
        Self {
            objects_dir: git_dir.as_ref().join("objects"),
            compression_level: flate2::Compression::default(),
        }
    }

    /// Get the file path for a given OID.
    pub fn object_path(&self, oid: &ObjectId) -> PathBuf {
        self.objects_dir.join(oid.loose_path())
    }

    /// Check if a loose object file exists.
    pub fn contains(&self, oid: &ObjectId) -> bool {
        self.object_path(oid).is_file()
    }
}

/// Errors from object database operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("cannot read object {oid} from local database: {reason}")]
    Unreadable { oid: String, reason: String },

    #[error("malformed tree listing for {oid}: {reason}")]
    MalformedTree { oid: String, reason: String },

    #[error("unknown tree entry type {kind:?} in {oid}")]
    UnknownEntryKind { oid: String, kind: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Subprocess(#[from] qgit_utils::UtilError),
}
