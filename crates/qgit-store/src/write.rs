use std::fs;
use std::io::Write;

use flate2::write::ZlibEncoder;
use qgit_object::RawObject;
use tempfile::NamedTempFile;

use crate::{LooseStore, StoreError};

impl LooseStore {
    /// Persist a verified object to the loose store.
    ///
    /// Returns `true` if a new file was created, `false` if the object was
    /// already present. Content-addressed files never need updating, so an
    /// existing file under the same name is already the right bytes.
    pub fn put(&self, obj: &RawObject) -> Result<bool, StoreError> {
        let oid = obj.oid();
        if self.contains(&oid) {
            return Ok(false);
        }

        let final_path = self.object_path(&oid);
        if let Some(fanout) = final_path.parent() {
            fs::create_dir_all(fanout)?;
        }

        // Compress into a uniquely-named temp file inside the objects
        // directory. Staying on one filesystem keeps the final rename
        // atomic, and the temp file removes itself on every failure path.
        let mut tmp = NamedTempFile::new_in(&self.objects_dir)?;
        let mut encoder = ZlibEncoder::new(&mut tmp, self.compression_level);
        encoder.write_all(&obj.raw_bytes())?;
        encoder.finish()?;
        tmp.as_file().sync_all()?;

        // Loose objects are read-only (0444), matching C git.
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(tmp.path(), fs::Permissions::from_mode(0o444))?;
        }

        match tmp.persist(&final_path) {
            Ok(_) => Ok(true),
            // A concurrent writer can only have stored these exact bytes,
            // so losing the rename race still counts as stored. Dropping
            // the PersistError discards our temp file.
            Err(_) if final_path.is_file() => Ok(false),
            Err(e) => Err(StoreError::Io(e.error)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::io::Read;

    use flate2::read::ZlibDecoder;
    use qgit_hash::Hasher;
    use qgit_object::{ObjectType, RawObject};

    fn blob(content: &[u8]) -> RawObject {
        let mut raw = format!("blob {}\0", content.len()).into_bytes();
        raw.extend_from_slice(content);
        let oid = Hasher::digest(&raw).unwrap();
        RawObject::from_local(oid, ObjectType::Blob, content.to_vec())
    }

    #[test]
    fn put_creates_loose_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = LooseStore::open(dir.path());
        let obj = blob(b"hello world");

        assert!(store.put(&obj).unwrap());
        let path = store.object_path(&obj.oid());
        assert!(path.is_file());

        // The file decompresses back to the canonical raw bytes and hashes
        // to its own name.
        let compressed = fs::read(&path).unwrap();
        let mut decoder = ZlibDecoder::new(&compressed[..]);
        let mut raw = Vec::new();
        decoder.read_to_end(&mut raw).unwrap();
        assert_eq!(raw, obj.raw_bytes());
        assert_eq!(Hasher::digest(&raw).unwrap(), obj.oid());
    }

    #[test]
    fn put_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = LooseStore::open(dir.path());
        let obj = blob(b"same bytes");

        assert!(store.put(&obj).unwrap());
        assert!(!store.put(&obj).unwrap());

        // Exactly one object file, no leftover temp files.
        let mut files = Vec::new();
        for entry in fs::read_dir(dir.path().join("objects")).unwrap() {
            let entry = entry.unwrap();
            if entry.path().is_dir() {
                for inner in fs::read_dir(entry.path()).unwrap() {
                    files.push(inner.unwrap().path());
                }
            } else {
                files.push(entry.path());
            }
        }
        assert_eq!(files.len(), 1);
    }

    #[test]
    fn contains_reflects_put() {
        let dir = tempfile::tempdir().unwrap();
        let store = LooseStore::open(dir.path());
        let obj = blob(b"x");
        assert!(!store.contains(&obj.oid()));
        store.put(&obj).unwrap();
        assert!(store.contains(&obj.oid()));
    }

    #[test]
    fn stored_file_is_read_only() {
        let dir = tempfile::tempdir().unwrap();
        let store = LooseStore::open(dir.path());
        let obj = blob(b"guarded");
        store.put(&obj).unwrap();

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = fs::metadata(store.object_path(&obj.oid()))
                .unwrap()
                .permissions()
                .mode();
            assert_eq!(mode & 0o777, 0o444);
        }
    }
}
