use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::utils::error::AppError;

static DISCOVERY_PATH: &str = "/.well-known/openid-configuration";
static SCOPES: &str = "openid profile email";

/// Client for an OIDC identity provider using the authorization code flow.
/// Endpoints come from the provider's discovery document.
#[derive(Clone)]
pub struct OidcClient {
    http: reqwest::Client,
    client_id: String,
    client_secret: String,
    issuer: String,
    redirect_url: String,
}

#[derive(Debug, Deserialize)]
struct ProviderMetadata {
    authorization_endpoint: String,
    token_endpoint: String,
}

/// A freshly built authorization redirect plus the values the callback has
/// to check it against.
pub struct AuthorizationRequest {
    pub url: String,
    pub state: String,
    pub nonce: String,
}

/// Tokens handed back by the provider after a successful code exchange.
pub struct TokenSet {
    pub access_token: String,
    pub id_token: String,
    pub expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    id_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
}

/// Claims we read out of the ID token. The audience may be a single string
/// or an array.
#[derive(Debug, Deserialize)]
pub struct IdClaims {
    pub iss: String,
    pub aud: Audience,
    pub exp: i64,
    #[serde(default)]
    pub nonce: Option<String>,
    pub email: String,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum Audience {
    Single(String),
    Many(Vec<String>),
}

impl Audience {
    fn contains(&self, client_id: &str) -> bool {
        match self {
            Audience::Single(aud) => aud == client_id,
            Audience::Many(auds) => auds.iter().any(|aud| aud == client_id),
        }
    }
}

impl OidcClient {
    pub fn new(
        http: reqwest::Client,
        client_id: String,
        client_secret: String,
        issuer: String,
        redirect_url: String,
    ) -> Self {
        Self {
            http,
            client_id,
            client_secret,
            issuer,
            redirect_url,
        }
    }

    async fn discover(&self) -> Result<ProviderMetadata, AppError> {
        let url = format!("{}{DISCOVERY_PATH}", self.issuer.trim_end_matches('/'));
        self.http
            .get(&url)
            .send()
            .await
            .map_err(|e| AppError::external("identity provider", e))?
            .error_for_status()
            .map_err(|e| AppError::external("identity provider", e))?
            .json()
            .await
            .map_err(|e| AppError::external("identity provider", e))
    }

    /// Build the authorization redirect with fresh `state` and `nonce`.
    pub async fn authorization_request(&self) -> Result<AuthorizationRequest, AppError> {
        let metadata = self.discover().await?;
        let state = random_token();
        let nonce = random_token();

        let mut url = reqwest::Url::parse(&metadata.authorization_endpoint).map_err(|e| {
            AppError::external("identity provider", format!("bad authorization endpoint: {e}"))
        })?;
        url.query_pairs_mut().extend_pairs([
            ("client_id", self.client_id.as_str()),
            ("redirect_uri", self.redirect_url.as_str()),
            ("response_type", "code"),
            ("scope", SCOPES),
            ("state", state.as_str()),
            ("nonce", nonce.as_str()),
        ]);

        Ok(AuthorizationRequest {
            url: url.into(),
            state,
            nonce,
        })
    }

    /// Exchange an authorization code for tokens at the token endpoint.
    pub async fn exchange_code(&self, code: &str) -> Result<TokenSet, AppError> {
        #[derive(Serialize)]
        struct TokenRequest<'a> {
            grant_type: &'a str,
            code: &'a str,
            redirect_uri: &'a str,
            client_id: &'a str,
            client_secret: &'a str,
        }

        let metadata = self.discover().await?;
        let response = self
            .http
            .post(&metadata.token_endpoint)
            .form(&TokenRequest {
                grant_type: "authorization_code",
                code,
                redirect_uri: &self.redirect_url,
                client_id: &self.client_id,
                client_secret: &self.client_secret,
            })
            .send()
            .await
            .map_err(|e| AppError::external("identity provider", e))?;

        if !response.status().is_success() {
            return Err(AppError::AuthError(
                "The identity provider rejected the authorization code".to_string(),
            ));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| AppError::external("identity provider", e))?;

        Ok(TokenSet {
            expires_at: token.expires_in.map(|secs| Utc::now() + Duration::seconds(secs)),
            access_token: token.access_token,
            id_token: token.id_token,
        })
    }

    /// Decode the ID token and validate its claims against this client.
    ///
    /// The token arrives in the token endpoint's TLS response, so the
    /// transport vouches for its origin; issuer, audience, expiry and nonce
    /// are still checked explicitly here.
    pub fn verify_id_token(&self, raw: &str, expected_nonce: &str) -> Result<IdClaims, AppError> {
        let claims = decode_claims(raw)?;
        validate_claims(
            &claims,
            &self.issuer,
            &self.client_id,
            expected_nonce,
            Utc::now().timestamp(),
        )?;
        Ok(claims)
    }
}

fn decode_claims(raw: &str) -> Result<IdClaims, AppError> {
    let mut parts = raw.split('.');
    let (Some(_header), Some(payload), Some(_signature), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(AppError::AuthError("Malformed identity token".to_string()));
    };

    let bytes = URL_SAFE_NO_PAD
        .decode(payload)
        .map_err(|_| AppError::AuthError("Malformed identity token".to_string()))?;

    serde_json::from_slice(&bytes)
        .map_err(|_| AppError::AuthError("Identity token claims could not be read".to_string()))
}

fn validate_claims(
    claims: &IdClaims,
    issuer: &str,
    client_id: &str,
    expected_nonce: &str,
    now: i64,
) -> Result<(), AppError> {
    if claims.iss.trim_end_matches('/') != issuer.trim_end_matches('/') {
        return Err(AppError::AuthError(
            "Identity token issued by an unexpected party".to_string(),
        ));
    }

    if !claims.aud.contains(client_id) {
        return Err(AppError::AuthError(
            "Identity token was not issued for this application".to_string(),
        ));
    }

    if claims.exp <= now {
        return Err(AppError::AuthError("Identity token has expired".to_string()));
    }

    if claims.nonce.as_deref() != Some(expected_nonce) {
        return Err(AppError::AuthError(
            "Identity token does not match this login attempt".to_string(),
        ));
    }

    Ok(())
}

fn random_token() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const ISSUER: &str = "https://accounts.example.com";
    const CLIENT_ID: &str = "client-123";
    const NOW: i64 = 1_750_000_000;

    fn token_with(payload: serde_json::Value) -> String {
        let encoded = URL_SAFE_NO_PAD.encode(payload.to_string());
        format!("eyJhbGciOiJSUzI1NiJ9.{encoded}.sig")
    }

    fn valid_payload() -> serde_json::Value {
        json!({
            "iss": ISSUER,
            "aud": CLIENT_ID,
            "exp": NOW + 3600,
            "nonce": "nonce-1",
            "email": "user@example.com",
            "name": "User Example",
        })
    }

    fn check(payload: serde_json::Value) -> Result<(), AppError> {
        let claims = decode_claims(&token_with(payload))?;
        validate_claims(&claims, ISSUER, CLIENT_ID, "nonce-1", NOW)
    }

    #[test]
    fn accepts_valid_token() {
        assert!(check(valid_payload()).is_ok());
    }

    #[test]
    fn accepts_audience_array() {
        let mut payload = valid_payload();
        payload["aud"] = json!(["other-client", CLIENT_ID]);
        assert!(check(payload).is_ok());
    }

    #[test]
    fn rejects_wrong_issuer() {
        let mut payload = valid_payload();
        payload["iss"] = json!("https://evil.example.com");
        assert!(check(payload).is_err());
    }

    #[test]
    fn rejects_wrong_audience() {
        let mut payload = valid_payload();
        payload["aud"] = json!("someone-else");
        assert!(check(payload).is_err());
    }

    #[test]
    fn rejects_expired_token() {
        let mut payload = valid_payload();
        payload["exp"] = json!(NOW - 1);
        assert!(check(payload).is_err());
    }

    #[test]
    fn rejects_nonce_mismatch() {
        let mut payload = valid_payload();
        payload["nonce"] = json!("other-nonce");
        assert!(check(payload).is_err());

        let mut payload = valid_payload();
        payload["nonce"] = serde_json::Value::Null;
        assert!(check(payload).is_err());
    }

    #[test]
    fn rejects_garbage_tokens() {
        assert!(decode_claims("not-a-jwt").is_err());
        assert!(decode_claims("a.b").is_err());
        assert!(decode_claims("a.!!!.c").is_err());
    }

    #[test]
    fn trailing_slash_on_issuer_is_ignored() {
        let claims = decode_claims(&token_with(valid_payload())).unwrap();
        let result = validate_claims(
            &claims,
            "https://accounts.example.com/",
            CLIENT_ID,
            "nonce-1",
            NOW,
        );
        assert!(result.is_ok());
    }
}
