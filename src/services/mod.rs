pub mod geocoder;
pub mod images;
pub mod oidc;
