use std::env;

pub mod cors;
pub mod security;

pub use cors::create_cors_layer;
pub use security::create_security_headers_layer;

const DEFAULT_PORT: u16 = 8000;
const DEFAULT_ISSUER: &str = "https://accounts.google.com";
const DEFAULT_GEOCODER_URL: &str = "https://nominatim.openstreetmap.org";

/// Minimum length of the cookie-signing secret; shorter keys are refused at
/// startup rather than silently weakening session integrity.
const MIN_SESSION_SECRET_BYTES: usize = 32;

pub struct Config {
    pub database_url: String,
    pub port: u16,
    pub session_secret: String,
    pub secure_cookies: bool,
    pub geocoder_url: String,
    pub oidc: OidcConfig,
    pub images: ImageStoreConfig,
}

pub struct OidcConfig {
    pub client_id: String,
    pub client_secret: String,
    pub issuer: String,
    pub redirect_url: String,
}

pub struct ImageStoreConfig {
    pub cloud_name: String,
    pub api_key: String,
    pub api_secret: String,
}

impl Config {
    pub fn from_env() -> Self {
        let session_secret = required("SESSION_SECRET");
        if session_secret.len() < MIN_SESSION_SECRET_BYTES {
            panic!("SESSION_SECRET must be at least {MIN_SESSION_SECRET_BYTES} bytes");
        }

        Self {
            database_url: required("DATABASE_URL"),
            port: env::var("PORT")
                .ok()
                .and_then(|raw| raw.parse().ok())
                .unwrap_or(DEFAULT_PORT),
            session_secret,
            secure_cookies: is_production(),
            geocoder_url: env::var("GEOCODER_URL")
                .unwrap_or_else(|_| DEFAULT_GEOCODER_URL.to_string()),
            oidc: OidcConfig {
                client_id: required("OIDC_CLIENT_ID"),
                client_secret: required("OIDC_CLIENT_SECRET"),
                issuer: env::var("OIDC_ISSUER").unwrap_or_else(|_| DEFAULT_ISSUER.to_string()),
                redirect_url: required("OIDC_REDIRECT_URL"),
            },
            images: ImageStoreConfig {
                cloud_name: required("CLOUDINARY_CLOUD_NAME"),
                api_key: required("CLOUDINARY_API_KEY"),
                api_secret: required("CLOUDINARY_API_SECRET"),
            },
        }
    }
}

pub fn is_production() -> bool {
    env::var("RUST_ENV")
        .map(|v| v.to_lowercase() == "production")
        .unwrap_or(false)
}

fn required(key: &str) -> String {
    env::var(key).unwrap_or_else(|_| panic!("{key} must be set"))
}
