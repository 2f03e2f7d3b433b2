use axum::body::Bytes;
use chrono::Utc;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use sha1::{Digest, Sha1};

use crate::utils::error::AppError;

const API_BASE: &str = "https://api.cloudinary.com/v1_1";

/// Client for the hosted image store. Uploads return a stable `secure_url`;
/// deletion goes by the asset's public id, which we derive back out of that
/// URL when an event is removed.
#[derive(Clone)]
pub struct ImageStore {
    http: reqwest::Client,
    cloud_name: String,
    api_key: String,
    api_secret: String,
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    secure_url: String,
}

impl ImageStore {
    pub fn new(
        http: reqwest::Client,
        cloud_name: String,
        api_key: String,
        api_secret: String,
    ) -> Self {
        Self {
            http,
            cloud_name,
            api_key,
            api_secret,
        }
    }

    /// Upload an image and return its hosted URL.
    pub async fn upload(&self, filename: &str, bytes: Bytes) -> Result<String, AppError> {
        let timestamp = Utc::now().timestamp().to_string();
        let signature = self.sign(&[("timestamp", &timestamp)]);

        let file = Part::bytes(bytes.to_vec()).file_name(filename.to_string());
        let form = Form::new()
            .part("file", file)
            .text("api_key", self.api_key.clone())
            .text("timestamp", timestamp)
            .text("signature", signature);

        let url = format!("{API_BASE}/{}/image/upload", self.cloud_name);
        let response: UploadResponse = self
            .http
            .post(&url)
            .multipart(form)
            .send()
            .await
            .map_err(|e| AppError::external("image store", e))?
            .error_for_status()
            .map_err(|e| AppError::external("image store", e))?
            .json()
            .await
            .map_err(|e| AppError::external("image store", e))?;

        Ok(response.secure_url)
    }

    /// Request deletion of a hosted asset. Callers treat failures as
    /// best-effort; see the delete handler.
    pub async fn destroy(&self, public_id: &str) -> Result<(), AppError> {
        let timestamp = Utc::now().timestamp().to_string();
        let signature = self.sign(&[("public_id", public_id), ("timestamp", &timestamp)]);

        let url = format!("{API_BASE}/{}/image/destroy", self.cloud_name);
        self.http
            .post(&url)
            .form(&[
                ("public_id", public_id),
                ("api_key", &self.api_key),
                ("timestamp", &timestamp),
                ("signature", &signature),
            ])
            .send()
            .await
            .map_err(|e| AppError::external("image store", e))?
            .error_for_status()
            .map_err(|e| AppError::external("image store", e))?;

        Ok(())
    }

    /// Request signature: SHA-1 hex digest of the alphabetically ordered
    /// `key=value` pairs joined with `&`, followed by the API secret.
    /// Callers pass `params` already sorted.
    fn sign(&self, params: &[(&str, &str)]) -> String {
        let serialized = params
            .iter()
            .map(|(key, value)| format!("{key}={value}"))
            .collect::<Vec<_>>()
            .join("&");

        let mut hasher = Sha1::new();
        hasher.update(serialized.as_bytes());
        hasher.update(self.api_secret.as_bytes());
        hex_digest(hasher.finalize().as_slice())
    }
}

/// Derive the hosted asset id from a stored image URL: the final path
/// segment with the file extension stripped.
pub fn public_id_from_url(url: &str) -> Option<&str> {
    let segment = url.rsplit('/').next()?;
    let public_id = match segment.rsplit_once('.') {
        Some((stem, _extension)) => stem,
        None => segment,
    };

    if public_id.is_empty() {
        None
    } else {
        Some(public_id)
    }
}

fn hex_digest(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn public_id_strips_path_and_extension() {
        let url = "https://res.cloudinary.com/demo/image/upload/v123/abc123.png";
        assert_eq!(public_id_from_url(url), Some("abc123"));
    }

    #[test]
    fn public_id_without_extension_is_the_segment() {
        assert_eq!(public_id_from_url("https://host/x/abc123"), Some("abc123"));
    }

    #[test]
    fn public_id_keeps_inner_dots() {
        assert_eq!(
            public_id_from_url("https://host/x/archive.tar.gz"),
            Some("archive.tar")
        );
    }

    #[test]
    fn public_id_of_degenerate_urls_is_none() {
        assert_eq!(public_id_from_url(""), None);
        assert_eq!(public_id_from_url("https://host/x/"), None);
        assert_eq!(public_id_from_url("https://host/x/.png"), None);
    }

    #[test]
    fn signature_is_deterministic_and_secret_dependent() {
        let store = |secret: &str| {
            ImageStore::new(
                reqwest::Client::new(),
                "demo".to_string(),
                "key".to_string(),
                secret.to_string(),
            )
        };

        let a = store("secret-a").sign(&[("timestamp", "1315060510")]);
        let b = store("secret-a").sign(&[("timestamp", "1315060510")]);
        let c = store("secret-b").sign(&[("timestamp", "1315060510")]);

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.len(), 40);
        assert!(a.chars().all(|ch| ch.is_ascii_hexdigit()));
    }
}
