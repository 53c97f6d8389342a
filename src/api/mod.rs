use async_trait::async_trait;
use reqwest::{multipart, Method, Url};
use serde_json::Value;
use thiserror::Error;

use crate::model::{self, HospitalRecord, SearchFilters, Statistics};

pub const DEFAULT_SERVER: &str = "http://localhost:5000";

/// A failed backend call. Every variant renders as the message shown to the
/// user.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RequestError {
    #[error("{message}")]
    Status { status: u16, message: String },

    #[error("{message}")]
    Transport { message: String },

    #[error("Hospital not found")]
    NotFound { id: String },

    #[error("unexpected response body: {message}")]
    Decode { message: String },
}

impl RequestError {
    pub fn status(&self) -> Option<u16> {
        match self {
            RequestError::Status { status, .. } => Some(*status),
            RequestError::NotFound { .. } => Some(404),
            _ => None,
        }
    }

    pub fn is_transport(&self) -> bool {
        matches!(self, RequestError::Transport { .. })
    }

    fn transport(err: reqwest::Error) -> Self {
        RequestError::Transport {
            message: err.to_string(),
        }
    }

    fn decode(err: impl std::fmt::Display) -> Self {
        RequestError::Decode {
            message: err.to_string(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("invalid server URL '{url}': {message}")]
    InvalidBaseUrl { url: String, message: String },

    #[error("failed to build HTTP client: {source}")]
    HttpClientBuild {
        #[source]
        source: reqwest::Error,
    },
}

/// Picks the message for a non-success response: the body's `error` string
/// when there is one, a generic status line otherwise.
pub fn error_message(status: u16, body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v.get("error").and_then(Value::as_str).map(str::to_string))
        .unwrap_or_else(|| format!("HTTP error! status: {status}"))
}

/// Pulls the `message` string out of a success body.
pub fn success_message(body: &Value) -> Option<String> {
    body.get("message")
        .and_then(Value::as_str)
        .map(str::to_string)
}

/// The REST surface of the directory service.
#[async_trait]
pub trait Backend: Send + Sync {
    async fn list(&self) -> Result<Vec<HospitalRecord>, RequestError>;
    async fn fetch(&self, id: &str) -> Result<HospitalRecord, RequestError>;
    async fn create(&self, record: &HospitalRecord) -> Result<Value, RequestError>;
    async fn update(&self, id: &str, record: &HospitalRecord) -> Result<Value, RequestError>;
    async fn delete(&self, id: &str) -> Result<Value, RequestError>;
    async fn search(&self, filters: &SearchFilters) -> Result<Vec<HospitalRecord>, RequestError>;
    async fn statistics(&self) -> Result<Statistics, RequestError>;
    async fn upload(&self, file_name: &str, contents: Vec<u8>) -> Result<Value, RequestError>;
    async fn create_sample(&self) -> Result<Value, RequestError>;
    async fn export(&self) -> Result<Value, RequestError>;
}

#[derive(Clone, Debug)]
pub struct ApiClient {
    base: Url,
    http: reqwest::Client,
}

impl ApiClient {
    pub fn new(base_url: &str) -> Result<Self, ClientError> {
        let base = Url::parse(base_url.trim()).map_err(|e| ClientError::InvalidBaseUrl {
            url: base_url.to_string(),
            message: e.to_string(),
        })?;
        if base.cannot_be_a_base() || !matches!(base.scheme(), "http" | "https") {
            return Err(ClientError::InvalidBaseUrl {
                url: base_url.to_string(),
                message: "expected an http(s) URL".to_string(),
            });
        }

        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            reqwest::header::ACCEPT,
            reqwest::header::HeaderValue::from_static("application/json"),
        );
        headers.insert(
            reqwest::header::USER_AGENT,
            reqwest::header::HeaderValue::from_static(concat!(
                "hospdir/",
                env!("CARGO_PKG_VERSION")
            )),
        );

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .build()
            .map_err(|source| ClientError::HttpClientBuild { source })?;

        Ok(ApiClient { base, http })
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    /// Resolves path segments against the server URL. Each segment is
    /// percent-encoded on its own, so identifiers cannot escape their slot.
    pub fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    pub async fn request(
        &self,
        method: Method,
        url: Url,
        body: Option<&Value>,
    ) -> Result<Value, RequestError> {
        tracing::debug!(%method, %url, "sending request");
        let mut req = self.http.request(method, url);
        if let Some(body) = body {
            req = req.json(body);
        }
        let resp = req.send().await.map_err(RequestError::transport)?;
        read_json(resp).await
    }

    async fn get(&self, segments: &[&str]) -> Result<Value, RequestError> {
        self.request(Method::GET, self.endpoint(segments), None)
            .await
    }
}

async fn read_json(resp: reqwest::Response) -> Result<Value, RequestError> {
    let status = resp.status();
    let body = resp.text().await.map_err(RequestError::transport)?;
    tracing::debug!(status = status.as_u16(), bytes = body.len(), "response received");

    if !status.is_success() {
        return Err(RequestError::Status {
            status: status.as_u16(),
            message: error_message(status.as_u16(), &body),
        });
    }

    // Only an empty body stands for "nothing"; anything else has to parse.
    if body.trim().is_empty() {
        return Ok(Value::Null);
    }
    serde_json::from_str(&body).map_err(RequestError::decode)
}

fn record_body(record: &HospitalRecord) -> Result<Value, RequestError> {
    serde_json::to_value(record).map_err(RequestError::decode)
}

#[async_trait]
impl Backend for ApiClient {
    async fn list(&self) -> Result<Vec<HospitalRecord>, RequestError> {
        let body = self.get(&["api", "hospitals"]).await?;
        model::records_from_value(body).map_err(RequestError::decode)
    }

    async fn fetch(&self, id: &str) -> Result<HospitalRecord, RequestError> {
        let body = self.get(&["api", "hospitals", id]).await?;
        model::record_from_value(body)
            .map_err(RequestError::decode)?
            .ok_or_else(|| RequestError::NotFound { id: id.to_string() })
    }

    async fn create(&self, record: &HospitalRecord) -> Result<Value, RequestError> {
        let body = record_body(record)?;
        self.request(
            Method::POST,
            self.endpoint(&["api", "hospitals"]),
            Some(&body),
        )
        .await
    }

    async fn update(&self, id: &str, record: &HospitalRecord) -> Result<Value, RequestError> {
        let body = record_body(record)?;
        self.request(
            Method::PUT,
            self.endpoint(&["api", "hospitals", id]),
            Some(&body),
        )
        .await
    }

    async fn delete(&self, id: &str) -> Result<Value, RequestError> {
        self.request(Method::DELETE, self.endpoint(&["api", "hospitals", id]), None)
            .await
    }

    async fn search(&self, filters: &SearchFilters) -> Result<Vec<HospitalRecord>, RequestError> {
        let mut url = self.endpoint(&["api", "search"]);
        url.query_pairs_mut().extend_pairs(filters.query_pairs());
        let body = self.request(Method::GET, url, None).await?;
        model::records_from_value(body).map_err(RequestError::decode)
    }

    async fn statistics(&self) -> Result<Statistics, RequestError> {
        let body = self.get(&["api", "statistics"]).await?;
        if body.is_null() {
            return Ok(Statistics::default());
        }
        serde_json::from_value(body).map_err(RequestError::decode)
    }

    async fn upload(&self, file_name: &str, contents: Vec<u8>) -> Result<Value, RequestError> {
        let part = multipart::Part::bytes(contents)
            .file_name(file_name.to_string())
            .mime_str("application/json")
            .map_err(RequestError::transport)?;
        let form = multipart::Form::new().part("file", part);
        let url = self.endpoint(&["load_data"]);
        tracing::debug!(%url, file = file_name, "uploading file");
        let resp = self
            .http
            .post(url)
            .multipart(form)
            .send()
            .await
            .map_err(RequestError::transport)?;
        read_json(resp).await
    }

    async fn create_sample(&self) -> Result<Value, RequestError> {
        self.request(Method::POST, self.endpoint(&["create_sample"]), None)
            .await
    }

    async fn export(&self) -> Result<Value, RequestError> {
        self.get(&["export_data"]).await
    }
}
