pub mod cookie;
pub mod layer;
pub mod token;

pub use cookie::{build_set_cookie, cookie_value};
pub use layer::{CsrfConfig, require_csrf_token};
pub use token::{
    TOKEN_COOKIE, TOKEN_HEADER, TOKEN_MAX_AGE_SECS, issue_token, verify,
};
