//! Shared HTTP plumbing for the *arr-style APIs. Radarr and Sonarr speak
//! `/api/v3`, Lidarr `/api/v1`; everything else about the surface is the
//! same (api-key header, JSON bodies, a `/tag` table, a `/command` queue).

use std::time::Duration;

use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::BackendError;
use crate::types::Tag;

const API_KEY_HEADER: &str = "X-Api-Key";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Clone)]
pub(crate) struct ArrHttp {
    http: reqwest::Client,
    base_url: String,
    api_prefix: &'static str,
    api_key: String,
    service: String,
}

impl ArrHttp {
    pub(crate) fn new(
        service: impl Into<String>,
        base_url: impl Into<String>,
        api_prefix: &'static str,
        api_key: impl Into<String>,
    ) -> Result<Self, BackendError> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        let base_url: String = base_url.into();
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_prefix,
            api_key: api_key.into(),
            service: service.into(),
        })
    }

    pub(crate) fn service(&self) -> &str {
        &self.service
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}{}", self.base_url, self.api_prefix, path)
    }

    pub(crate) async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, BackendError> {
        let response = self
            .http
            .get(self.url(path))
            .header(API_KEY_HEADER, &self.api_key)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(BackendError::from_response(&self.service, response).await);
        }
        Ok(response.json().await?)
    }

    /// GET that treats 404 as absence.
    pub(crate) async fn get_optional<T: DeserializeOwned>(
        &self,
        path: &str,
    ) -> Result<Option<T>, BackendError> {
        let response = self
            .http
            .get(self.url(path))
            .header(API_KEY_HEADER, &self.api_key)
            .send()
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(BackendError::from_response(&self.service, response).await);
        }
        Ok(Some(response.json().await?))
    }

    pub(crate) async fn post<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, BackendError> {
        let response = self
            .http
            .post(self.url(path))
            .header(API_KEY_HEADER, &self.api_key)
            .json(body)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(BackendError::from_response(&self.service, response).await);
        }
        Ok(response.json().await?)
    }

    pub(crate) async fn put<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, BackendError> {
        let response = self
            .http
            .put(self.url(path))
            .header(API_KEY_HEADER, &self.api_key)
            .json(body)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(BackendError::from_response(&self.service, response).await);
        }
        Ok(response.json().await?)
    }

    /// Fire-and-forget write where the response body is not interesting.
    pub(crate) async fn put_no_content<B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<(), BackendError> {
        let response = self
            .http
            .put(self.url(path))
            .header(API_KEY_HEADER, &self.api_key)
            .json(body)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(BackendError::from_response(&self.service, response).await);
        }
        Ok(())
    }

    /// Queue a backend command (`SeriesSearch`, `AlbumSearch`, ...).
    pub(crate) async fn command(&self, body: &serde_json::Value) -> Result<(), BackendError> {
        let response = self
            .http
            .post(self.url("/command"))
            .header(API_KEY_HEADER, &self.api_key)
            .json(body)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(BackendError::from_response(&self.service, response).await);
        }
        Ok(())
    }

    /// Look up a tag by label, creating it if absent. Labels are matched
    /// case-insensitively because the backends lowercase them on create.
    pub(crate) async fn ensure_tag(&self, label: &str) -> Result<Tag, BackendError> {
        let tags: Vec<Tag> = self.get("/tag").await?;
        if let Some(tag) = tags
            .into_iter()
            .find(|t| t.label.eq_ignore_ascii_case(label))
        {
            return Ok(tag);
        }
        self.post("/tag", &serde_json::json!({ "label": label }))
            .await
    }
}
