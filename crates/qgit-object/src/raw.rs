use bstr::{BStr, BString};
use qgit_hash::{Hasher, ObjectId};
use qgit_utils::Untrusted;

use crate::{Headers, ObjectError, ObjectType};

/// A git object whose content address has been verified.
///
/// A value of this type exists only after the SHA-1 of the raw bytes was
/// checked against the id under which the bytes were requested, so holding a
/// `RawObject` is proof the content is exactly what was asked for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawObject {
    oid: ObjectId,
    otype: ObjectType,
    content: BString,
}

impl RawObject {
    /// Verify and parse a loose object received from the remote.
    ///
    /// The hash check runs before any parsing: bytes that are not the
    /// requested object never reach the header grammar. The grammar itself
    /// is fail-closed — `"<type> SP <decimal-size> NUL <content>"` with
    /// exactly one space, a known type, a plain unsigned decimal size, and a
    /// content length equal to the declared size.
    pub fn from_untrusted(
        expected: &ObjectId,
        bytes: Untrusted<Vec<u8>>,
    ) -> Result<Self, ObjectError> {
        let raw = bytes.into_unverified();

        let actual = Hasher::digest(&raw)?;
        if actual != *expected {
            return Err(ObjectError::HashMismatch {
                expected: expected.to_hex(),
                actual: actual.to_hex(),
            });
        }

        let nul = raw
            .iter()
            .position(|&b| b == 0)
            .ok_or_else(|| ObjectError::InvalidHeader("missing null terminator".into()))?;
        let header = &raw[..nul];

        let mut spaces = header.iter().enumerate().filter(|(_, &b)| b == b' ');
        let sp = match (spaces.next(), spaces.next()) {
            (Some((i, _)), None) => i,
            (None, _) => {
                return Err(ObjectError::InvalidHeader("missing space in header".into()))
            }
            (Some(_), Some(_)) => {
                return Err(ObjectError::InvalidHeader(
                    "more than one space in header".into(),
                ))
            }
        };

        let otype = ObjectType::from_bytes(&header[..sp])?;
        let size = parse_decimal_size(&header[sp + 1..])?;

        let content = &raw[nul + 1..];
        if content.len() != size {
            return Err(ObjectError::SizeMismatch {
                declared: size,
                actual: content.len(),
            });
        }

        Ok(Self {
            oid: actual,
            otype,
            content: BString::from(content),
        })
    }

    /// Build an object from content already resident in the local store.
    ///
    /// The local object database is trusted (everything in it was either
    /// verified by this tool or put there by the user), so no re-hash.
    pub fn from_local(oid: ObjectId, otype: ObjectType, content: Vec<u8>) -> Self {
        Self {
            oid,
            otype,
            content: BString::from(content),
        }
    }

    /// The verified object id.
    pub fn oid(&self) -> ObjectId {
        self.oid
    }

    /// The object type.
    pub fn otype(&self) -> ObjectType {
        self.otype
    }

    /// The object content (no header).
    pub fn content(&self) -> &BStr {
        self.content.as_ref()
    }

    /// The canonical raw form: `"<type> SP <size> NUL <content>"`.
    ///
    /// This is the byte string whose SHA-1 is the object id, and the
    /// plaintext that gets zlib-compressed into the loose store.
    pub fn raw_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.content.len() + 16);
        out.extend_from_slice(self.otype.as_bytes());
        out.push(b' ');
        out.extend_from_slice(self.content.len().to_string().as_bytes());
        out.push(0);
        out.extend_from_slice(&self.content);
        out
    }

    /// Parse the header bag of a tag or commit object.
    pub fn headers(&self) -> Result<Headers, ObjectError> {
        Headers::parse(self.content())
    }
}

/// Strict unsigned decimal: non-empty, ASCII digits only.
///
/// `usize::from_str` would also take a leading `+`; that is not part of the
/// wire grammar.
fn parse_decimal_size(bytes: &[u8]) -> Result<usize, ObjectError> {
    if bytes.is_empty() || !bytes.iter().all(u8::is_ascii_digit) {
        return Err(ObjectError::InvalidHeader(format!(
            "invalid size: {:?}",
            BString::from(bytes)
        )));
    }
    std::str::from_utf8(bytes)
        .expect("ASCII digits")
        .parse()
        .map_err(|_| ObjectError::InvalidHeader("size out of range".into()))
}
