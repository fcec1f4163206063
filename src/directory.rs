//! Client for the external user directory API
//!
//! `GET /users` returns the snapshot a status view is seeded from; `POST /users`
//! takes the registration form as multipart. The proxy uses [`DirectoryClient::forward`]
//! to pass requests through untouched.

use std::time::Duration;

use axum::body::Bytes;
use reqwest::header::CONTENT_TYPE;
use reqwest::Method;

use crate::config::normalize_base_url;
use crate::error::{Result, UsercastError};
use crate::form::RegistrationForm;
use crate::types::User;

/// Timeout for one upstream request
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Raw upstream response, relayed unchanged by the proxy
#[derive(Debug, Clone)]
pub struct UpstreamResponse {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: Bytes,
}

impl UpstreamResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Whether the body parses as JSON
    pub fn is_json(&self) -> bool {
        serde_json::from_slice::<serde::de::IgnoredAny>(&self.body).is_ok()
    }

    fn into_error(self) -> UsercastError {
        UsercastError::Upstream {
            status: self.status,
            body: String::from_utf8_lossy(&self.body).into_owned(),
        }
    }
}

/// Directory API client
#[derive(Clone)]
pub struct DirectoryClient {
    client: reqwest::Client,
    base_url: String,
}

impl DirectoryClient {
    /// Create a client for the API at `base_url`
    pub fn new(base_url: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            client,
            base_url: normalize_base_url(base_url)?,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn users_url(&self) -> String {
        format!("{}/users", self.base_url)
    }

    /// Fetch the full list of users
    pub async fn list_users(&self) -> Result<Vec<User>> {
        let response = self.forward(Method::GET, None, Bytes::new()).await?;
        if !response.is_success() {
            return Err(response.into_error());
        }
        Ok(serde_json::from_slice(&response.body)?)
    }

    /// Submit a registration
    pub async fn create_user(&self, form: RegistrationForm) -> Result<User> {
        let multipart = form.into_multipart()?;

        let response = self
            .client
            .post(self.users_url())
            .multipart(multipart)
            .send()
            .await?;

        let status = response.status().as_u16();
        let body = response.bytes().await?;
        if !(200..300).contains(&status) {
            return Err(UsercastError::Upstream {
                status,
                body: String::from_utf8_lossy(&body).into_owned(),
            });
        }

        let user: User = serde_json::from_slice(&body)?;
        tracing::info!("Created user #{} ({})", user.id, user.full_name());
        Ok(user)
    }

    /// Send a request to `/users` with the given body and return the raw reply.
    ///
    /// Any HTTP status comes back as `Ok`; only transport failures are errors.
    pub async fn forward(
        &self,
        method: Method,
        content_type: Option<&str>,
        body: Bytes,
    ) -> Result<UpstreamResponse> {
        let mut request = self.client.request(method, self.users_url());
        if let Some(content_type) = content_type {
            request = request.header(CONTENT_TYPE, content_type);
        }
        if !body.is_empty() {
            request = request.body(body);
        }

        let response = request.send().await?;
        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = response.bytes().await?;

        Ok(UpstreamResponse {
            status,
            content_type,
            body,
        })
    }
}
