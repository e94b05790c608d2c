use crate::token::{TOKEN_COOKIE, TOKEN_MAX_AGE_SECS};

/// Set-Cookie value for a freshly issued token. `Secure` is appended
/// only when the guard runs behind TLS (production).
pub fn build_set_cookie(token: &str, secure: bool) -> String {
    let mut cookie = format!(
        "{TOKEN_COOKIE}={token}; Path=/; Max-Age={TOKEN_MAX_AGE_SECS}; \
         HttpOnly; SameSite=Strict"
    );
    if secure {
        cookie.push_str("; Secure");
    }
    cookie
}

/// Extracts one cookie's value from a Cookie request header.
pub fn cookie_value<'a>(
    cookie_header: &'a str, name: &str,
) -> Option<&'a str> {
    cookie_header.split(';').map(str::trim).find_map(|pair| {
        pair.split_once('=')
            .and_then(|(key, value)| (key == name).then_some(value))
    })
}
