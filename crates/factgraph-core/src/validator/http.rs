use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use url::Url;

use super::{ValidationItem, ValidationResponse, Validator, ValidatorError, ValidatorResult};
use crate::config::{ConfigError, ValidatorConfig};

#[derive(Serialize)]
struct ValidateRequest<'a> {
    items: &'a [ValidationItem],
}

#[derive(Deserialize)]
struct ValidateResponse {
    #[serde(default)]
    results: Vec<ValidationResponse>,
}

/// Validator reached over HTTP: `POST {"items": [...]}`, answered with
/// `{"results": [...]}`.
pub struct HttpValidator {
    client: Client,
    endpoint: Url,
    token: Option<String>,
}

impl HttpValidator {
    pub fn new(endpoint: Url, timeout: Duration) -> ValidatorResult<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10).min(timeout))
            .timeout(timeout)
            .user_agent(concat!("factgraph/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            endpoint,
            token: None,
        })
    }

    #[must_use]
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        let token = token.into();
        self.token = (!token.is_empty()).then_some(token);
        self
    }

    /// Builds a client from configuration; `None` when no endpoint is set.
    pub fn from_config(config: &ValidatorConfig) -> crate::Result<Option<Self>> {
        let Some(endpoint) = config.endpoint.as_deref() else {
            return Ok(None);
        };
        let url = Url::parse(endpoint).map_err(ConfigError::from)?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ConfigError::UnsupportedScheme(url.scheme().to_string()).into());
        }

        let mut validator = Self::new(url, Duration::from_secs(config.timeout_seconds.max(1)))?;
        if let Some(token) = &config.api_token {
            validator = validator.with_token(token.clone());
        }
        Ok(Some(validator))
    }

    #[must_use]
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

fn classify_status(status: StatusCode) -> Option<ValidatorError> {
    if status.is_success() {
        None
    } else if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
        Some(ValidatorError::Transient(format!("HTTP {status}")))
    } else {
        Some(ValidatorError::Permanent(format!("HTTP {status}")))
    }
}

#[async_trait]
impl Validator for HttpValidator {
    fn name(&self) -> &str {
        self.endpoint.host_str().unwrap_or("http")
    }

    async fn validate(&self, items: &[ValidationItem]) -> ValidatorResult<Vec<ValidationResponse>> {
        let mut request = self
            .client
            .post(self.endpoint.clone())
            .json(&ValidateRequest { items });
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        if let Some(e) = classify_status(response.status()) {
            return Err(e);
        }

        let body: ValidateResponse = response.json().await?;
        tracing::debug!(
            endpoint = %self.endpoint,
            sent = items.len(),
            answered = body.results.len(),
            "Validator responded"
        );
        Ok(body.results)
    }
}
