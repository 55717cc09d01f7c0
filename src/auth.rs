//! Credentials for authorizing upstream requests.
//!
//! Credential extraction from browsers is handled elsewhere; this module only
//! consumes a credential triple and turns it into request headers.

use async_trait::async_trait;

/// Static bearer token used by the web client.
pub const BEARER_TOKEN: &str = "AAAAAAAAAAAAAAAAAAAAANRILgAAAAAAnNwIzUejRCOuH5E6I8xnZz4puTs%3D1Zv7ttfk8LF81IUq16cHjhLTvJu4FA33AGWWjCpTnA";

/// Web origin sent with API requests.
pub const ORIGIN: &str = "https://x.com";

#[derive(Debug, Clone, thiserror::Error)]
pub enum AuthError {
    #[error("credentials expired or missing: {0}")]
    CredentialsExpired(String),
}

/// Session cookie values needed for authenticated requests.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub auth_token: String,
    pub ct0: String,
    pub user_id: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("auth_token", &"<redacted>")
            .field("ct0", &"<redacted>")
            .field("user_id", &self.user_id)
            .finish()
    }
}

impl Credentials {
    pub fn new(
        auth_token: impl Into<String>,
        ct0: impl Into<String>,
        user_id: impl Into<String>,
    ) -> Self {
        Self {
            auth_token: auth_token.into(),
            ct0: ct0.into(),
            user_id: user_id.into(),
        }
    }

    /// Build credentials from cookie values. The user id comes from the
    /// `twid` cookie, which is `u%3D<id>` or `u=<id>`.
    pub fn from_cookies(auth_token: &str, ct0: &str, twid: &str) -> Self {
        let user_id = twid
            .trim_matches('"')
            .trim_start_matches("u%3D")
            .trim_start_matches("u=");
        Self::new(auth_token, ct0, user_id)
    }

    /// Headers for an authenticated GraphQL request.
    pub fn request_headers(&self) -> Vec<(String, String)> {
        vec![
            ("authorization".into(), format!("Bearer {}", BEARER_TOKEN)),
            ("x-csrf-token".into(), self.ct0.clone()),
            (
                "cookie".into(),
                format!("auth_token={}; ct0={}", self.auth_token, self.ct0),
            ),
            ("x-twitter-auth-type".into(), "OAuth2Session".into()),
            ("x-twitter-active-user".into(), "yes".into()),
            ("x-twitter-client-language".into(), "en".into()),
            ("content-type".into(), "application/json".into()),
            ("origin".into(), ORIGIN.into()),
            ("referer".into(), format!("{}/", ORIGIN)),
        ]
    }
}

/// Supplies the current credentials for upstream requests.
#[async_trait]
pub trait AuthProvider: Send + Sync {
    async fn credentials(&self) -> Result<Credentials, AuthError>;
}

/// Fixed credentials, typically loaded from configuration.
#[derive(Debug, Clone)]
pub struct StaticCredentials(Credentials);

impl StaticCredentials {
    pub fn new(credentials: Credentials) -> Self {
        Self(credentials)
    }
}

#[async_trait]
impl AuthProvider for StaticCredentials {
    async fn credentials(&self) -> Result<Credentials, AuthError> {
        Ok(self.0.clone())
    }
}

/// Reads credentials from the environment on every request.
#[derive(Debug, Clone, Default)]
pub struct EnvCredentials;

pub const AUTH_TOKEN_ENV: &str = "POSTHOARD_AUTH_TOKEN";
pub const CT0_ENV: &str = "POSTHOARD_CT0";
pub const USER_ID_ENV: &str = "POSTHOARD_USER_ID";

#[async_trait]
impl AuthProvider for EnvCredentials {
    async fn credentials(&self) -> Result<Credentials, AuthError> {
        let read = |name: &str| {
            std::env::var(name)
                .ok()
                .filter(|v| !v.trim().is_empty())
                .ok_or_else(|| AuthError::CredentialsExpired(format!("{} is not set", name)))
        };
        let auth_token = read(AUTH_TOKEN_ENV)?;
        let ct0 = read(CT0_ENV)?;
        let user_id = read(USER_ID_ENV)?;
        Ok(Credentials::from_cookies(&auth_token, &ct0, &user_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_id_from_twid() {
        let creds = Credentials::from_cookies("tok", "csrf", "u%3D12345");
        assert_eq!(creds.user_id, "12345");
        let creds = Credentials::from_cookies("tok", "csrf", "\"u=678\"");
        assert_eq!(creds.user_id, "678");
    }

    #[test]
    fn test_headers_carry_csrf_and_cookie() {
        let creds = Credentials::new("tok", "csrf", "1");
        let headers = creds.request_headers();
        let get = |name: &str| {
            headers
                .iter()
                .find(|(k, _)| k == name)
                .map(|(_, v)| v.as_str())
        };
        assert_eq!(get("x-csrf-token"), Some("csrf"));
        assert_eq!(get("cookie"), Some("auth_token=tok; ct0=csrf"));
        assert!(get("authorization").unwrap().starts_with("Bearer "));
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let creds = Credentials::new("secret-token", "secret-csrf", "1");
        let shown = format!("{:?}", creds);
        assert!(!shown.contains("secret"));
    }
}
