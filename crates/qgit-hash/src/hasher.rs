use crate::{HashError, ObjectId};

/// Streaming SHA-1 computation with collision detection.
///
/// Every byte string arriving from the remote peer is hashed through this
/// type before anything else looks at it. A detected collision attack is a
/// hard failure, never a value.
pub struct Hasher {
    inner: Box<sha1_checked::Sha1>,
}

impl Hasher {
    /// Create a new hasher.
    pub fn new() -> Self {
        use digest::Digest;
        Self {
            inner: Box::new(sha1_checked::Sha1::new()),
        }
    }

    /// Feed data into the hasher.
    pub fn update(&mut self, data: &[u8]) {
        use digest::Digest;
        self.inner.update(data);
    }

    /// Finalize and return the ObjectId.
    ///
    /// Returns an error if SHA-1 collision detection fires.
    pub fn finalize(self) -> Result<ObjectId, HashError> {
        let result = self.inner.try_finalize();
        if result.has_collision() {
            return Err(HashError::Sha1Collision);
        }
        let mut bytes = [0u8; 20];
        bytes.copy_from_slice(result.hash().as_slice());
        Ok(ObjectId::from_bytes(bytes))
    }

    /// Convenience: hash data in one call.
    pub fn digest(data: &[u8]) -> Result<ObjectId, HashError> {
        let mut h = Self::new();
        h.update(data);
        h.finalize()
    }
}

impl Default for Hasher {
    fn default() -> Self {
        Self::new()
    }
}

impl std::io::Write for Hasher {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.update(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_digest() {
        let oid = Hasher::digest(b"").unwrap();
        assert_eq!(oid.to_hex(), "da39a3ee5e6b4b0d3255bfef95601890afd80709");
    }

    #[test]
    fn known_digest() {
        // sha1("abc")
        let oid = Hasher::digest(b"abc").unwrap();
        assert_eq!(oid.to_hex(), "a9993e364706816aba3e25717850c26c9cd0d89d");
    }

    #[test]
    fn streaming_matches_oneshot() {
        let mut h = Hasher::new();
        h.update(b"blob 11\0");
        h.update(b"hello world");
        let streamed = h.finalize().unwrap();
        let oneshot = Hasher::digest(b"blob 11\0hello world").unwrap();
        assert_eq!(streamed, oneshot);
    }

    #[test]
    fn write_trait() {
        use std::io::Write;
        let mut h = Hasher::new();
        h.write_all(b"abc").unwrap();
        assert_eq!(
            h.finalize().unwrap().to_hex(),
            "a9993e364706816aba3e25717850c26c9cd0d89d"
        );
    }
}
