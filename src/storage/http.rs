use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, StatusCode};
use std::fmt::Debug;
use crate::error::StoreError;
use crate::storage::ObjectStore;

pub const DEFAULT_STORAGE_HOST: &str = "storage.googleapis.com";

/// Object store spoken to over HTTPS: public reads by URL, media uploads
/// through the JSON upload endpoint.
#[derive(Debug, Clone)]
pub struct HttpObjectStore {
    client: Client,
    host: String,
    access_token: Option<String>,
}

impl HttpObjectStore {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            host: host.into(),
            access_token: None,
        }
    }

    pub fn with_access_token(mut self, token: impl Into<String>) -> Self {
        self.access_token = Some(token.into());
        self
    }

    pub fn object_url(&self, bucket: &str, object: &str) -> String {
        format!("https://{}/{}/{}", self.host, bucket, object)
    }

    fn upload_url(&self, bucket: &str) -> String {
        format!("https://{}/upload/storage/v1/b/{}/o", self.host, bucket)
    }
}

impl Default for HttpObjectStore {
    fn default() -> Self {
        Self::new(DEFAULT_STORAGE_HOST)
    }
}

pub(crate) fn classify_status(url: &str, status: StatusCode) -> StoreError {
    let url = url.to_string();
    if status.is_server_error() {
        StoreError::Server { url, status: status.as_u16() }
    } else if status == StatusCode::NOT_FOUND {
        StoreError::NotFound { url }
    } else {
        StoreError::Rejected { url, status: status.as_u16() }
    }
}

fn classify_transport(url: &str, err: reqwest::Error) -> StoreError {
    let url = url.to_string();
    if err.is_builder() {
        StoreError::InvalidUrl { url, message: err.to_string() }
    } else {
        StoreError::Transport { url, message: err.to_string() }
    }
}

#[async_trait]
impl ObjectStore for HttpObjectStore {
    async fn get(&self, bucket: &str, object: &str) -> Result<Vec<u8>, StoreError> {
        let url = self.object_url(bucket, object);
        let response = self.client.get(&url).send().await
            .map_err(|e| classify_transport(&url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(classify_status(&url, status));
        }

        let expected = response.content_length();
        let body = response.bytes().await
            .map_err(|e| classify_transport(&url, e))?;

        if let Some(expected) = expected {
            let received = body.len() as u64;
            if received < expected {
                return Err(StoreError::Truncated { url, expected, received });
            }
        }
        Ok(body.to_vec())
    }

    async fn put(&self, bucket: &str, object: &str, data: Vec<u8>, content_type: &str) -> Result<(), StoreError> {
        let url = self.upload_url(bucket);
        let mut builder = self.client
            .post(&url)
            .query(&[("uploadType", "media"), ("name", object)])
            .header(CONTENT_TYPE, content_type)
            .body(data);

        if let Some(token) = &self.access_token {
            builder = builder.bearer_auth(token);
        }

        let response = builder.send().await
            .map_err(|e| classify_transport(&url, e))?;
        let status = response.status();
        if !status.is_success() {
            return Err(classify_status(&url, status));
        }
        Ok(())
    }

    async fn exists(&self, bucket: &str, object: &str) -> Result<bool, StoreError> {
        let url = self.object_url(bucket, object);
        let response = self.client.head(&url).send().await
            .map_err(|e| classify_transport(&url, e))?;

        match response.status() {
            status if status.is_success() => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            status => Err(classify_status(&url, status)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_errors_are_transient() {
        let err = classify_status("u", StatusCode::INTERNAL_SERVER_ERROR);
        assert!(err.is_transient());
        let err = classify_status("u", StatusCode::SERVICE_UNAVAILABLE);
        assert!(err.is_transient());
    }

    #[test]
    fn client_errors_are_permanent() {
        let err = classify_status("u", StatusCode::NOT_FOUND);
        assert!(matches!(err, StoreError::NotFound { .. }));
        assert!(!err.is_transient());
        let err = classify_status("u", StatusCode::FORBIDDEN);
        assert!(matches!(err, StoreError::Rejected { status: 403, .. }));
        assert!(!err.is_transient());
    }

    #[test]
    fn object_url_concatenates_path_and_filename() {
        let store = HttpObjectStore::default();
        assert_eq!(
            store.object_url("zfish", "x0_y0_z0/metadata.json"),
            "https://storage.googleapis.com/zfish/x0_y0_z0/metadata.json"
        );
    }

    #[tokio::test]
    async fn malformed_url_is_not_transient() {
        let store = HttpObjectStore::new("bad host with spaces");
        let err = store.get("bucket", "object").await.unwrap_err();
        assert!(!err.is_transient(), "unexpected classification: {err:?}");
    }

    #[tokio::test]
    #[ignore] // Needs network access
    async fn missing_public_object_is_not_found() {
        let store = HttpObjectStore::default();
        let err = store.get("zfish", "does/not/exist/metadata.json").await.unwrap_err();
        assert!(!err.is_transient());
    }
}
