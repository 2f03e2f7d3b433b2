use serde::{Deserialize, Serialize};

/// Session key for the authenticated user.
pub const SESSION_USER_KEY: &str = "user";

/// Session keys for the in-flight authorization request. Written at /login,
/// consumed once at /authorize.
pub const OAUTH_STATE_KEY: &str = "oauth.state";
pub const OAUTH_NONCE_KEY: &str = "oauth.nonce";

/// Identity carried in the signed session cookie between requests. Derived
/// from verified ID-token claims at login; lives for the browser session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionUser {
    pub email: String,
    #[serde(default)]
    pub name: Option<String>,
}
