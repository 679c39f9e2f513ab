//! Password digests.
//!
//! Hosts store a 32-character lowercase hex MD5 of their password; clients
//! send the plaintext and the digest is compared as a string. This is a
//! casual gate, not a secret-keeping mechanism.

use md5::{Digest, Md5};

/// Length of a hex digest.
pub const DIGEST_LEN: usize = 32;

/// Returns the lowercase hex MD5 of `data`, always 32 characters.
pub fn digest(data: &[u8]) -> String {
    let mut hasher = Md5::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Checks a supplied password against a stored digest.
///
/// An empty stored digest counts as no password. Succeeds iff both sides are
/// absent, or the digest of `provided` equals `stored`.
pub fn matches(provided: Option<&[u8]>, stored: Option<&str>) -> bool {
    let stored = stored.filter(|s| !s.is_empty());
    match (provided, stored) {
        (None, None) => true,
        (Some(provided), Some(stored)) => digest(provided) == stored,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_reference_vector() {
        assert_eq!(digest(b"password"), "5f4dcc3b5aa765d61d8327deb882cf99");
        assert_eq!(digest(b""), "d41d8cd98f00b204e9800998ecf8427e");
    }

    #[test]
    fn test_no_password() {
        assert!(matches(None, None));
        assert!(matches(None, Some("")));
        assert!(!matches(Some(b"secret".as_slice()), None));
        assert!(!matches(None, Some(digest(b"secret").as_str())));
    }

    #[test]
    fn test_password_match() {
        let stored = digest(b"secret");
        assert!(matches(Some(b"secret".as_slice()), Some(stored.as_str())));
        assert!(!matches(Some(b"Secret".as_slice()), Some(stored.as_str())));
    }

    proptest! {
        #[test]
        fn prop_digest_is_fixed_width_hex(data in proptest::collection::vec(any::<u8>(), 0..256)) {
            let d = digest(&data);
            prop_assert_eq!(d.len(), DIGEST_LEN);
            prop_assert!(d.chars().all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c)));
        }

        #[test]
        fn prop_matches_own_digest(
            data in proptest::collection::vec(any::<u8>(), 0..64),
            other in proptest::collection::vec(any::<u8>(), 0..64),
        ) {
            prop_assert!(matches(Some(data.as_slice()), Some(digest(&data).as_str())));
            if data != other {
                prop_assert!(!matches(Some(data.as_slice()), Some(digest(&other).as_str())));
            }
        }
    }
}
