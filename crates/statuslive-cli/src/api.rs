//! REST collaborator client.
//!
//! Read-only access to the endpoints views reload from. List endpoints wrap
//! their payload in an object keyed by resource name (`{"services": [...]}`);
//! a missing key reads as an empty list.

use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;
use url::Url;

use crate::model::{Incident, Organization, PublicStatus, Service};

/// REST client errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ApiError {
    /// Base URL is not an absolute http(s) URL.
    #[error("invalid API URL {url:?}: {reason}")]
    InvalidUrl {
        /// URL as configured
        url: String,
        /// Parser diagnostic
        reason: String,
    },

    /// Request never completed.
    #[error("network error: {0}")]
    Network(String),

    /// Server answered with a non-success status.
    #[error("HTTP {status}: {body}")]
    Http {
        /// Status code
        status: u16,
        /// Response body
        body: String,
    },

    /// Response body did not match the expected shape.
    #[error("unexpected response body: {0}")]
    Deserialize(String),

    /// No public status page for this slug.
    #[error("organization not found: {0}")]
    OrganizationNotFound(String),
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        Self::Network(err.to_string())
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        Self::Deserialize(err.to_string())
    }
}

/// Client for the status page REST API.
#[derive(Debug, Clone)]
pub struct ApiClient {
    client: Client,
    base_url: Url,
    token: Option<String>,
    organization: Option<String>,
}

impl ApiClient {
    /// Create a client for `base_url`.
    ///
    /// `token` is sent as a bearer token and `organization` as the
    /// `X-Organization-ID` header on authenticated endpoints.
    ///
    /// # Errors
    ///
    /// - `ApiError::InvalidUrl` if `base_url` is not an absolute http(s) URL
    pub fn new(
        base_url: &str,
        token: Option<String>,
        organization: Option<String>,
    ) -> Result<Self, ApiError> {
        let invalid = |reason: String| ApiError::InvalidUrl { url: base_url.to_owned(), reason };

        let base_url = Url::parse(base_url).map_err(|e| invalid(e.to_string()))?;
        if !matches!(base_url.scheme(), "http" | "https") {
            return Err(invalid(format!("unsupported scheme {:?}", base_url.scheme())));
        }

        Ok(Self { client: Client::new(), base_url, token, organization })
    }

    /// Base URL requests are made against.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// All services of the organization.
    pub async fn services(&self) -> Result<Vec<Service>, ApiError> {
        self.get_list(&["services"], "services").await
    }

    /// All incidents of the organization.
    pub async fn incidents(&self) -> Result<Vec<Incident>, ApiError> {
        self.get_list(&["incidents"], "incidents").await
    }

    /// Organizations the caller belongs to.
    pub async fn organizations(&self) -> Result<Vec<Organization>, ApiError> {
        self.get_list(&["organizations"], "organizations").await
    }

    /// Public status page for `slug`. Unauthenticated.
    ///
    /// # Errors
    ///
    /// - `ApiError::OrganizationNotFound` if no organization has this slug
    pub async fn public_status(&self, slug: &str) -> Result<PublicStatus, ApiError> {
        let url = self.endpoint(&["public", "status", slug])?;
        let response = self.client.get(url).send().await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(ApiError::OrganizationNotFound(slug.to_owned()));
        }

        read_json(response).await
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, ApiError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| ApiError::InvalidUrl {
                url: self.base_url.to_string(),
                reason: "cannot be a base".into(),
            })?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn get_list<T: DeserializeOwned>(
        &self,
        segments: &[&str],
        key: &str,
    ) -> Result<Vec<T>, ApiError> {
        let url = self.endpoint(segments)?;
        let mut request = self.client.get(url);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }
        if let Some(organization) = &self.organization {
            request = request.header("X-Organization-ID", organization);
        }

        let mut body: Value = read_json(request.send().await?).await?;
        match body.get_mut(key) {
            Some(Value::Null) | None => Ok(Vec::new()),
            Some(list) => Ok(serde_json::from_value(list.take())?),
        }
    }
}

async fn read_json<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, ApiError> {
    let status = response.status();
    let text = response.text().await?;

    if !status.is_success() {
        return Err(ApiError::Http { status: status.as_u16(), body: text });
    }

    Ok(serde_json::from_str(&text)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn joins_segments_onto_base_path() {
        let api = ApiClient::new("http://localhost:8000/api", None, None).unwrap();
        assert_eq!(api.endpoint(&["services"]).unwrap().as_str(), "http://localhost:8000/api/services");

        let api = ApiClient::new("http://localhost:8000/api/", None, None).unwrap();
        assert_eq!(
            api.endpoint(&["public", "status", "acme corp"]).unwrap().as_str(),
            "http://localhost:8000/api/public/status/acme%20corp"
        );
    }

    #[test]
    fn rejects_non_http_base() {
        assert!(matches!(
            ApiClient::new("ws://localhost:8000", None, None),
            Err(ApiError::InvalidUrl { .. })
        ));
        assert!(matches!(ApiClient::new("localhost", None, None), Err(ApiError::InvalidUrl { .. })));
    }
}
