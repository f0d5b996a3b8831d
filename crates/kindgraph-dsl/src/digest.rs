//! Schema digests.
//!
//! A deterministic, non-cryptographic fingerprint of schema text, used to
//! tell whether a commit changed anything and to label schema snapshots:
//!
//! - algorithm: FNV-1a 64-bit
//! - input: the UTF-8 bytes of the canonical rendering
//! - output: `"fnv1a64:<16 lowercase hex digits>"`

use crate::document::SchemaDocument;

/// Prefix used in serialized digests.
pub const SCHEMA_DIGEST_PREFIX: &str = "fnv1a64:";

const FNV_OFFSET_BASIS: u64 = 0xcbf29ce484222325;
const FNV_PRIME: u64 = 0x00000100000001b3;

fn fnv1a64(bytes: &[u8]) -> u64 {
    let mut hash = FNV_OFFSET_BASIS;
    for b in bytes {
        hash ^= (*b) as u64;
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}

/// Digest over raw text, as stored.
pub fn text_digest(text: &str) -> String {
    format!("{SCHEMA_DIGEST_PREFIX}{:016x}", fnv1a64(text.as_bytes()))
}

/// Digest over the canonical rendering of a document, so comments,
/// blank lines and spacing do not affect it.
pub fn schema_digest(document: &SchemaDocument) -> String {
    text_digest(&document.render())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_text_digest_is_the_offset_basis() {
        assert_eq!(text_digest(""), "fnv1a64:cbf29ce484222325");
    }

    #[test]
    fn canonical_digest_ignores_layout() {
        let a = SchemaDocument::parse("class A\n\n# note\nclass  B\n").unwrap();
        let b = SchemaDocument::parse("class A\nclass B").unwrap();
        assert_eq!(schema_digest(&a), schema_digest(&b));
        assert_ne!(text_digest("class A\n"), text_digest("class B\n"));
    }
}
