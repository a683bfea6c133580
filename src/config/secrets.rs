//! Secret handling utilities.
//!
//! Re-exports secrecy types and compares request tokens against the
//! configured shared secret.

pub use secrecy::{ExposeSecret, SecretString};

/// True when `token` equals the secret.
///
/// Compares every byte regardless of where the first mismatch is.
pub fn token_matches(secret: &SecretString, token: &str) -> bool {
    let expected = secret.expose_secret().as_bytes();
    let given = token.as_bytes();
    if expected.len() != given.len() {
        return false;
    }
    expected
        .iter()
        .zip(given)
        .fold(0u8, |acc, (a, b)| acc | (a ^ b))
        == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_only_exact_token() {
        let secret = SecretString::from("s3cret");
        assert!(token_matches(&secret, "s3cret"));
        assert!(!token_matches(&secret, "s3cre"));
        assert!(!token_matches(&secret, "S3cret"));
        assert!(!token_matches(&secret, ""));
    }
}
