//! Signed HTTP transport shared by every service client.
//!
//! One `AwsClient` speaks the three wire protocols the serverless control
//! plane uses: REST+JSON (Lambda, API Gateway), Query+XML (IAM) and
//! JSON-1.1 with `X-Amz-Target` (CloudWatch Logs). Every request is SigV4
//! signed; throttling and 5xx responses are retried with exponential backoff
//! before the error is handed back to the caller.

use crate::config::{RetryMode, SdkConfig};
use crate::error::{AwsError, AwsResult};
use crate::signing::{self, SigV4Signer};
use bytes::Bytes;
use chrono::Utc;
use futures::stream::{BoxStream, StreamExt, TryStreamExt};
use reqwest::{Client, Method};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

/// A streamed response body.
pub type ByteStream = BoxStream<'static, AwsResult<Bytes>>;

#[derive(Debug, Clone)]
pub struct AwsClient {
    http: Client,
    config: Arc<SdkConfig>,
    user_agent: String,
}

/// A successful (2xx) response.
#[derive(Debug, Clone)]
pub struct AwsResponse {
    pub status: u16,
    pub headers: BTreeMap<String, String>,
    pub body: Bytes,
    pub request_id: Option<String>,
}

impl AwsResponse {
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Decode the body as JSON. An empty body decodes as `null`.
    pub fn json<T: serde::de::DeserializeOwned>(&self, service: &str) -> AwsResult<T> {
        let body: &[u8] = if self.body.is_empty() { b"null" } else { &self.body };
        serde_json::from_slice(body).map_err(|e| AwsError::parse(service, &e.to_string()))
    }
}

impl AwsClient {
    pub fn new(config: Arc<SdkConfig>) -> Self {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .pool_max_idle_per_host(10)
            .build()
            .unwrap_or_else(|_| Client::new());
        let user_agent = config.user_agent();
        Self {
            http,
            config,
            user_agent,
        }
    }

    pub fn config(&self) -> &SdkConfig {
        &self.config
    }

    pub fn region_name(&self) -> &str {
        &self.config.region.name
    }

    pub fn endpoint(&self, service: &str) -> String {
        match self.config.endpoint_url {
            Some(ref url) => url.trim_end_matches('/').to_string(),
            None => self.config.region.endpoint(service),
        }
    }

    fn url(&self, service: &str, path: &str) -> AwsResult<url::Url> {
        let raw = format!("{}{}", self.endpoint(service), path);
        url::Url::parse(&raw).map_err(|e| AwsError::new(service, "InvalidEndpoint", &format!("{}: {}", raw, e), 0))
    }

    /// REST+JSON call (Lambda, API Gateway). `body` is serialized as JSON when
    /// present.
    pub async fn rest_json(
        &self,
        service: &str,
        method: Method,
        path: &str,
        body: Option<&serde_json::Value>,
    ) -> AwsResult<AwsResponse> {
        let mut headers = BTreeMap::new();
        let payload = match body {
            Some(value) => {
                headers.insert("content-type".to_string(), "application/json".to_string());
                serde_json::to_vec(value).map_err(|e| AwsError::new(service, "SerializeError", &e.to_string(), 0))?
            }
            None => Vec::new(),
        };
        let url = self.url(service, path)?;
        let resp = self.send(service, method, url, headers, payload).await?;
        Self::collect(resp).await
    }

    /// REST call with a caller-supplied raw body (API Gateway import/put take
    /// the OpenAPI document verbatim).
    pub async fn rest_raw(
        &self,
        service: &str,
        method: Method,
        path: &str,
        content_type: &str,
        body: Vec<u8>,
    ) -> AwsResult<AwsResponse> {
        let mut headers = BTreeMap::new();
        headers.insert("content-type".to_string(), content_type.to_string());
        let url = self.url(service, path)?;
        let resp = self.send(service, method, url, headers, body).await?;
        Self::collect(resp).await
    }

    /// REST GET whose body is handed back as a stream instead of buffered.
    pub async fn rest_stream(&self, service: &str, path: &str, accept: &str) -> AwsResult<ByteStream> {
        let mut headers = BTreeMap::new();
        headers.insert("accept".to_string(), accept.to_string());
        let url = self.url(service, path)?;
        let resp = self.send(service, Method::GET, url, headers, Vec::new()).await?;
        Ok(resp.bytes_stream().map_err(AwsError::from).boxed())
    }

    /// Query protocol call: form-encoded body, XML response.
    pub async fn query(&self, service: &str, params: &BTreeMap<String, String>) -> AwsResult<AwsResponse> {
        let mut headers = BTreeMap::new();
        headers.insert(
            "content-type".to_string(),
            "application/x-www-form-urlencoded; charset=utf-8".to_string(),
        );
        let url = self.url(service, "/")?;
        let body = signing::form_encode(params).into_bytes();
        let resp = self.send(service, Method::POST, url, headers, body).await?;
        Self::collect(resp).await
    }

    /// JSON-1.1 call addressed by `X-Amz-Target`.
    pub async fn json_target(&self, service: &str, target: &str, body: &serde_json::Value) -> AwsResult<AwsResponse> {
        let mut headers = BTreeMap::new();
        headers.insert("content-type".to_string(), "application/x-amz-json-1.1".to_string());
        headers.insert("x-amz-target".to_string(), target.to_string());
        let url = self.url(service, "/")?;
        let payload = serde_json::to_vec(body).map_err(|e| AwsError::new(service, "SerializeError", &e.to_string(), 0))?;
        let resp = self.send(service, Method::POST, url, headers, payload).await?;
        Self::collect(resp).await
    }

    async fn collect(resp: reqwest::Response) -> AwsResult<AwsResponse> {
        let status = resp.status().as_u16();
        let headers = header_map(&resp);
        let request_id = request_id(&headers);
        let body = resp.bytes().await?;
        Ok(AwsResponse {
            status,
            headers,
            body,
            request_id,
        })
    }

    /// Sign and send, retrying retryable failures. Non-2xx responses are
    /// decoded into `AwsError`.
    async fn send(
        &self,
        service: &str,
        method: Method,
        url: url::Url,
        headers: BTreeMap<String, String>,
        body: Vec<u8>,
    ) -> AwsResult<reqwest::Response> {
        let max_attempts = self.config.retry_config.max_attempts.max(1);
        let mut attempt = 0;
        loop {
            let error = match self.send_once(service, &method, &url, &headers, &body).await {
                Ok(resp) if resp.status().is_success() => return Ok(resp),
                Ok(resp) => Self::decode_error(service, resp).await,
                Err(e) => e,
            };
            attempt += 1;
            if !error.retryable || attempt >= max_attempts {
                return Err(error);
            }
            let delay = self.backoff(attempt - 1);
            log::warn!(
                "AWS {} retryable error (attempt {}/{}): {} - retrying in {}ms",
                service,
                attempt,
                max_attempts,
                error.code,
                delay
            );
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
    }

    async fn send_once(
        &self,
        service: &str,
        method: &Method,
        url: &url::Url,
        headers: &BTreeMap<String, String>,
        body: &[u8],
    ) -> AwsResult<reqwest::Response> {
        let mut signed = headers.clone();
        signed.insert("host".to_string(), host_header(url));
        let signing_region = self.config.region.signing_region(service);
        SigV4Signer {
            credentials: &self.config.credentials,
            region: &signing_region,
            service,
        }
        .sign(method.as_str(), url, &mut signed, body, Utc::now());

        log::debug!("AWS {} {} {}", service, method, url.path());
        let mut req = self.http.request(method.clone(), url.clone());
        for (key, value) in signed.iter().filter(|(k, _)| k.as_str() != "host") {
            req = req.header(key.as_str(), value.as_str());
        }
        req = req.header("user-agent", &self.user_agent);
        if !body.is_empty() {
            req = req.body(body.to_vec());
        }
        Ok(req.send().await?)
    }

    async fn decode_error(service: &str, resp: reqwest::Response) -> AwsError {
        let status = resp.status().as_u16();
        let headers = header_map(&resp);
        let body = resp.text().await.unwrap_or_default();
        let mut error = if body.trim_start().starts_with('<') {
            AwsError::parse_xml_error(service, status, &body)
        } else {
            AwsError::parse_json_error(
                service,
                status,
                &body,
                headers.get("x-amzn-errortype").map(String::as_str),
            )
        };
        if error.request_id.is_none() {
            error.request_id = request_id(&headers);
        }
        error
    }

    /// Exponential backoff, capped, with full jitter in standard mode.
    fn backoff(&self, attempt: u32) -> u64 {
        let retry = &self.config.retry_config;
        let capped = retry
            .initial_backoff_ms
            .saturating_mul(2u64.saturating_pow(attempt))
            .min(retry.max_backoff_ms);
        match retry.mode {
            RetryMode::Standard => {
                use rand::Rng;
                rand::thread_rng().gen_range(0..=capped)
            }
            RetryMode::Legacy => capped,
        }
    }
}

fn header_map(resp: &reqwest::Response) -> BTreeMap<String, String> {
    resp.headers()
        .iter()
        .filter_map(|(k, v)| v.to_str().ok().map(|v| (k.as_str().to_string(), v.to_string())))
        .collect()
}

fn request_id(headers: &BTreeMap<String, String>) -> Option<String> {
    headers
        .get("x-amzn-requestid")
        .or_else(|| headers.get("x-amz-request-id"))
        .cloned()
}

fn host_header(url: &url::Url) -> String {
    let host = url.host_str().unwrap_or("amazonaws.com");
    match url.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host.to_string(),
    }
}

/// Query protocol parameters with the common `Action`/`Version` pair.
pub fn query_params(action: &str, version: &str) -> BTreeMap<String, String> {
    let mut params = BTreeMap::new();
    params.insert("Action".to_string(), action.to_string());
    params.insert("Version".to_string(), version.to_string());
    params
}

/// First `<tag>…</tag>` text in an XML document.
pub fn xml_text(xml: &str, tag: &str) -> Option<String> {
    let open = format!("<{}>", tag);
    let close = format!("</{}>", tag);
    let start = xml.find(&open)? + open.len();
    let end = xml[start..].find(&close)?;
    Some(xml_unescape(&xml[start..start + end]))
}

/// Every `<tag>…</tag>` text in document order.
pub fn xml_text_all(xml: &str, tag: &str) -> Vec<String> {
    let open = format!("<{}>", tag);
    let close = format!("</{}>", tag);
    let mut results = Vec::new();
    let mut rest = xml;
    while let Some(start) = rest.find(&open) {
        let content = &rest[start + open.len()..];
        match content.find(&close) {
            Some(end) => {
                results.push(xml_unescape(&content[..end]));
                rest = &content[end + close.len()..];
            }
            None => break,
        }
    }
    results
}

/// The raw `<tag>…</tag>` block including its children.
pub fn xml_block<'a>(xml: &'a str, tag: &str) -> Option<&'a str> {
    let open = format!("<{}>", tag);
    let close = format!("</{}>", tag);
    let start = xml.find(&open)?;
    let end = xml[start..].find(&close)? + start + close.len();
    Some(&xml[start..end])
}

fn xml_unescape(s: &str) -> String {
    s.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}
