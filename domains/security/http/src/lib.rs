pub mod handlers;

pub use handlers::{
    CsrfTokenResponse, SecurityHandlers, SecurityServices, SpamCheckBody,
    SpamCheckResponse, check_spam, issue_csrf_token,
};
