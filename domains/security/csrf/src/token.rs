use std::fmt::Write;

use rand::RngCore;

pub const TOKEN_COOKIE: &str = "csrf-token";
pub const TOKEN_HEADER: &str = "x-csrf-token";
pub const TOKEN_MAX_AGE_SECS: u64 = 86_400;

const TOKEN_BYTES: usize = 32;

/// 32 cryptographically random bytes, hex-encoded to 64 characters.
pub fn issue_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    rand::rng().fill_bytes(&mut bytes);

    let mut token = String::with_capacity(TOKEN_BYTES * 2);
    for byte in bytes {
        let _ = write!(token, "{byte:02x}");
    }
    token
}

/// Double-submit check: the cookie copy and the presented copy must
/// both exist, be non-empty, and match byte for byte. Absence or
/// mismatch fails closed.
pub fn verify(cookie_value: Option<&str>, presented: Option<&str>) -> bool {
    match (cookie_value, presented) {
        (Some(cookie), Some(presented)) => {
            !cookie.is_empty() && cookie.as_bytes() == presented.as_bytes()
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn test_token_is_64_lowercase_hex_chars() {
        let token = issue_token();
        assert_eq!(token.len(), 64);
        assert!(
            token
                .chars()
                .all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase())
        );
    }

    #[test]
    fn test_no_collisions_across_many_draws() {
        let tokens: HashSet<String> =
            (0..10_000).map(|_| issue_token()).collect();
        assert_eq!(tokens.len(), 10_000);
    }

    #[test]
    fn test_verify_requires_non_empty_equality() {
        assert!(verify(Some("abc123"), Some("abc123")));

        assert!(!verify(Some("abc123"), Some("abc124")));
        assert!(!verify(Some("abc123"), None));
        assert!(!verify(None, Some("abc123")));
        assert!(!verify(None, None));
        assert!(!verify(Some(""), Some("")));
        assert!(!verify(Some("ABC123"), Some("abc123")));
    }
}
