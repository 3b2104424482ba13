//! Grammars for remote-supplied identifiers.
//!
//! Listing lines, refnames, and header fields all carry object ids and tag
//! names chosen by the peer. These parsers are the only way such bytes
//! become typed values, and they reject anything outside the fixed
//! alphabets.

use bstr::BString;
use qgit_hash::{hex, ObjectId};

use crate::ObjectError;

/// Parse a remote-supplied object id: exactly 40 lowercase hex characters.
///
/// Stricter than [`ObjectId::from_hex`] — an uppercase digit here is a
/// verification failure, not an alternate spelling.
pub fn oid_from_untrusted(bytes: &[u8]) -> Result<ObjectId, ObjectError> {
    if bytes.len() != 40 {
        return Err(ObjectError::InvalidOid(format!(
            "expected 40 characters, got {}",
            bytes.len()
        )));
    }
    if !bytes.iter().all(|&b| hex::is_lower_hex_digit(b)) {
        return Err(ObjectError::InvalidOid(
            "characters outside [0-9a-f]".into(),
        ));
    }
    let hex = std::str::from_utf8(bytes).expect("lowercase hex is ASCII");
    Ok(ObjectId::from_hex(hex)?)
}

/// Parse a remote-supplied tag name: non-empty, bytes from `[A-Za-z0-9.-_]`.
pub fn tag_name_from_untrusted(bytes: &[u8]) -> Result<BString, ObjectError> {
    if bytes.is_empty() {
        return Err(ObjectError::InvalidTagName("empty name".into()));
    }
    if !bytes.iter().all(|&b| is_tag_name_byte(b)) {
        return Err(ObjectError::InvalidTagName(
            "characters outside [A-Za-z0-9.-_]".into(),
        ));
    }
    Ok(BString::from(bytes))
}

fn is_tag_name_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'.' || b == b'-' || b == b'_'
}
