use sqlx::PgPool;

use crate::config::Config;
use crate::services::geocoder::Geocoder;
use crate::services::images::ImageStore;
use crate::services::oidc::OidcClient;

/// Identifies this application to the geocoding service, which requires a
/// meaningful User-Agent.
const USER_AGENT: &str = concat!("eventual-server/", env!("CARGO_PKG_VERSION"));

/// Shared per-process state handed to every handler: the connection pool and
/// the three external service clients.
pub struct AppState {
    pub pool: PgPool,
    pub geocoder: Geocoder,
    pub images: ImageStore,
    pub oidc: OidcClient,
}

impl AppState {
    pub fn new(config: &Config, pool: PgPool) -> Self {
        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .expect("Failed to build HTTP client");

        Self {
            pool,
            geocoder: Geocoder::new(http.clone(), config.geocoder_url.clone()),
            images: ImageStore::new(
                http.clone(),
                config.images.cloud_name.clone(),
                config.images.api_key.clone(),
                config.images.api_secret.clone(),
            ),
            oidc: OidcClient::new(
                http,
                config.oidc.client_id.clone(),
                config.oidc.client_secret.clone(),
                config.oidc.issuer.clone(),
                config.oidc.redirect_url.clone(),
            ),
        }
    }
}
