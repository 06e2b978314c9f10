use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, CONTENT_TYPE, USER_AGENT};
use reqwest::{Client as HttpClient, Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::config::{AuthStyle, BugzillaConfig};
use crate::error::{BugzillaError, Result};
use crate::rate_limiter::RateLimiter;

pub const API_KEY_PARAM: &str = "Bugzilla_api_key";
pub const API_KEY_HEADER: &str = "X-BUGZILLA-API-KEY";

const REDACTED: &str = "[REDACTED]";

#[derive(Clone)]
pub struct BugzillaClient {
    http: HttpClient,
    config: BugzillaConfig,
    limiter: RateLimiter,
}

impl BugzillaClient {
    pub fn new(config: BugzillaConfig) -> Result<Self> {
        let http = build_http_client(&config)?;
        let limiter = RateLimiter::new(config.cooldown);
        Ok(Self {
            http,
            config,
            limiter,
        })
    }

    pub fn new_with_limiter(config: BugzillaConfig, limiter: RateLimiter) -> Result<Self> {
        let http = build_http_client(&config)?;
        Ok(Self {
            http,
            config,
            limiter,
        })
    }

    pub fn config(&self) -> &BugzillaConfig {
        &self.config
    }

    pub fn rate_limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    pub async fn get<T>(&self, path: &str) -> Result<T>
    where
        T: DeserializeOwned,
    {
        self.get_with_query(path, None).await
    }

    pub async fn get_with_query<T>(&self, path: &str, query: Option<&[(&str, &str)]>) -> Result<T>
    where
        T: DeserializeOwned,
    {
        let mut request = self.http.get(self.url_for(path));
        if let Some(params) = query {
            request = request.query(params);
        }
        let response = self.dispatch(request).await?;
        self.parse_json(response).await
    }

    pub async fn post<B, T>(&self, path: &str, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.send_with_body(Method::POST, path, Some(body)).await
    }

    pub async fn put<B, T>(&self, path: &str, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.send_with_body(Method::PUT, path, Some(body)).await
    }

    pub async fn send_with_body<B, T>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
    ) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let mut request = self.http.request(method, self.url_for(path));
        if let Some(payload) = body {
            request = request.json(payload);
        }
        let response = self.dispatch(request).await?;
        self.parse_json(response).await
    }

    /// Sends a request and only checks its status, discarding any response body.
    /// Used for writes whose result the caller observes by re-fetching.
    pub async fn send_expect_success<B>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
    ) -> Result<()>
    where
        B: Serialize + ?Sized,
    {
        let mut request = self.http.request(method, self.url_for(path));
        if let Some(payload) = body {
            request = request.json(payload);
        }
        let response = self.dispatch(request).await?;
        self.ensure_success(response).await
    }

    /// Strips the API key out of anything destined for a log line or error message.
    pub fn redact(&self, text: &str) -> String {
        if self.config.api_key.is_empty() {
            return text.to_string();
        }
        text.replace(&self.config.api_key, REDACTED)
    }

    async fn dispatch(&self, request: RequestBuilder) -> Result<Response> {
        self.limiter.hit().await;
        let request = self.authenticate(request).build()?;
        debug!("{} {}", request.method(), self.redact(request.url().as_str()));
        let response = self.http.execute(request).await?;
        Ok(response)
    }

    fn authenticate(&self, request: RequestBuilder) -> RequestBuilder {
        match self.config.auth_style {
            AuthStyle::QueryParam => {
                request.query(&[(API_KEY_PARAM, self.config.api_key.as_str())])
            }
            // The key already rides along as a default header.
            AuthStyle::Header => request,
        }
    }

    fn url_for(&self, path: &str) -> String {
        let mut base = self.config.api_root();
        let trimmed = path.trim_start_matches('/');
        base.push_str(trimmed);
        base
    }

    async fn parse_json<T>(&self, response: Response) -> Result<T>
    where
        T: DeserializeOwned,
    {
        let status = response.status();
        if status.is_success() {
            response.json::<T>().await.map_err(BugzillaError::from)
        } else if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            let body = response.text().await.unwrap_or_default();
            Err(BugzillaError::Authentication(format!(
                "Access denied ({}) - {}",
                status,
                self.redact(&body)
            )))
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(build_http_error(status, &self.redact(&body)))
        }
    }

    async fn ensure_success(&self, response: Response) -> Result<()> {
        let status = response.status();
        if status.is_success() {
            Ok(())
        } else if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            let body = response.text().await.unwrap_or_default();
            Err(BugzillaError::Authentication(format!(
                "Access denied ({}) - {}",
                status,
                self.redact(&body)
            )))
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(build_http_error(status, &self.redact(&body)))
        }
    }
}

fn build_http_client(config: &BugzillaConfig) -> Result<HttpClient> {
    let mut headers = HeaderMap::new();
    headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    headers.insert(USER_AGENT, header_value(config.user_agent.clone())?);

    if config.auth_style == AuthStyle::Header {
        let name = HeaderName::from_bytes(API_KEY_HEADER.as_bytes())
            .map_err(|err| BugzillaError::Other(err.to_string()))?;
        let mut value = header_value(config.api_key.clone())?;
        value.set_sensitive(true);
        headers.insert(name, value);
    }

    HttpClient::builder()
        .default_headers(headers)
        .timeout(config.timeout)
        .connect_timeout(config.connect_timeout)
        .build()
        .map_err(|err| BugzillaError::Other(err.to_string()))
}

fn header_value(value: String) -> Result<HeaderValue> {
    HeaderValue::from_str(&value).map_err(|err| BugzillaError::Other(err.to_string()))
}

fn build_http_error(status: StatusCode, body: &str) -> BugzillaError {
    let code = extract_error_code(body);
    BugzillaError::http(status, code, body.to_string())
}

/// Bugzilla error bodies look like `{"error": true, "code": 101, "message": "..."}`.
fn extract_error_code(body: &str) -> Option<i64> {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|value| value.get("code").and_then(Value::as_i64))
}
