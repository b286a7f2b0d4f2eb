//! reqwest-backed API client.

use std::sync::Arc;
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use reqwest::{Client, Method, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, error, warn};

use crate::config::ApiConfig;
use crate::credentials::CredentialStore;

use super::{
    concert_id_in_path, error_message, secured_resource_id, unwrap_envelope, ApiError,
    ACCESS_KEY_HEADER,
};

/// HTTP client for the ticketing backend.
pub struct ApiClient {
    client: Client,
    base_url: String,
    credentials: Arc<dyn CredentialStore>,
}

impl ApiClient {
    /// Create a new client. Cookies are kept across requests so the
    /// backend session follows every call.
    pub fn new(config: &ApiConfig, credentials: Arc<dyn CredentialStore>) -> Result<Self, ApiError> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(config.timeout_secs as u64))
            .cookie_store(true)
            .build()
            .map_err(|e| ApiError::Internal(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            credentials,
        })
    }

    /// Full URL for a request path.
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// GET `path` and decode the (unwrapped) body.
    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        self.execute(Method::GET, path, None::<&Value>).await
    }

    /// POST a JSON body to `path` and decode the (unwrapped) response.
    pub async fn post<B, T>(&self, path: &str, body: &B) -> Result<T, ApiError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.execute(Method::POST, path, Some(body)).await
    }

    async fn execute<B, T>(&self, method: Method, path: &str, body: Option<&B>) -> Result<T, ApiError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let mut request = self.client.request(method.clone(), self.url(path));
        if let Some(body) = body {
            request = request.json(body);
        }
        let request = self.attach_access_key(request, path);

        debug!(method = %method, path = path, "API request");
        let response = request.send().await?;

        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            return Err(self.handle_error_status(status.as_u16(), path, &text));
        }

        let value = if text.trim().is_empty() {
            Value::Null
        } else {
            serde_json::from_str(&text)
                .map_err(|e| ApiError::InvalidResponse(format!("Failed to parse response: {}", e)))?
        };

        let data = unwrap_envelope(value)?;
        serde_json::from_value(data)
            .map_err(|e| ApiError::InvalidResponse(format!("Unexpected response shape: {}", e)))
    }

    /// Attach the stored access key to seat calls.
    fn attach_access_key(&self, request: RequestBuilder, path: &str) -> RequestBuilder {
        let Some(resource_id) = secured_resource_id(path) else {
            return request;
        };

        match self.credentials.get(&resource_id) {
            Ok(Some(key)) => request.header(ACCESS_KEY_HEADER, key),
            Ok(None) => {
                warn!(
                    resource_id = %resource_id,
                    path = path,
                    "No access key stored for seat request"
                );
                request
            }
            Err(e) => {
                warn!(resource_id = %resource_id, "Failed to read access key: {}", e);
                request
            }
        }
    }

    fn handle_error_status(&self, status: u16, path: &str, body: &str) -> ApiError {
        let message = error_message(status, body);
        error!(status = status, path = path, "API error: {}", message);

        if status == 403 && path.contains("/reserve") {
            let resource_id = concert_id_in_path(path);
            if let Some(ref id) = resource_id {
                match self.credentials.remove(id) {
                    Ok(_) => warn!(resource_id = %id, "Reservation access expired, key removed"),
                    Err(e) => error!(resource_id = %id, "Failed to remove expired key: {}", e),
                }
            }
            return ApiError::AccessExpired {
                resource_id,
                message,
            };
        }

        ApiError::Http { status, message }
    }
}
