//! HTTP invoker: executes the outbound request described by a job's
//! template with a bounded timeout and returns a structured outcome. This
//! component never raises into the dispatcher — every path, including a
//! connection failure or a timeout, ends in an `ExecutionOutcome`.

use std::time::{Duration, Instant};

use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE, USER_AGENT};

use crate::common::Headers;
use crate::domains::jobs::{ExecutionOutcome, ExecutionStatus, HttpMethod};

/// Redirects beyond this count are refused outright, matching the
/// compile-time cap the component contract calls for.
const MAX_REDIRECTS: usize = 5;

#[derive(Debug, Clone)]
pub struct InvocationRequest {
    pub method: HttpMethod,
    pub url: String,
    pub headers: Headers,
    pub body: Option<String>,
}

#[derive(Debug, Clone)]
pub struct InvokerConfig {
    pub request_timeout: Duration,
    pub response_body_limit_bytes: usize,
    pub user_agent: String,
}

pub struct Invoker {
    client: reqwest::Client,
    config: InvokerConfig,
}

impl Invoker {
    pub fn new(config: InvokerConfig) -> Self {
        // reqwest strips Authorization (and other sensitive headers) on a
        // cross-origin redirect hop by default; `limited` caps total hops.
        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
            .build()
            .expect("invoker http client config is static and always valid");

        Self { client, config }
    }

    /// Execute the request. Always returns an outcome; never an `Err`.
    pub async fn invoke(&self, request: &InvocationRequest) -> ExecutionOutcome {
        let method = to_reqwest_method(request.method);
        let headers = self.build_headers(request);

        let mut builder = self
            .client
            .request(method, &request.url)
            .headers(headers)
            .timeout(self.config.request_timeout);

        if request.method.carries_body() {
            if let Some(body) = &request.body {
                builder = builder.body(body.clone());
            }
        }

        let start = Instant::now();
        match builder.send().await {
            Ok(response) => self.finish_success_path(response, start).await,
            Err(err) => {
                let elapsed_ms = start.elapsed().as_millis() as i64;
                let (status, reason) = classify_send_error(&err);
                ExecutionOutcome {
                    status,
                    duration_ms: elapsed_ms,
                    response_code: None,
                    response_body: None,
                    response_headers: None,
                    error_message: Some(reason.to_string()),
                }
            }
        }
    }

    fn build_headers(&self, request: &InvocationRequest) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in request.headers.iter() {
            if let (Ok(name), Ok(value)) = (HeaderName::from_bytes(name.as_bytes()), HeaderValue::from_str(value)) {
                map.insert(name, value);
            }
        }

        if !request.headers.contains("user-agent") {
            if let Ok(ua) = HeaderValue::from_str(&self.config.user_agent) {
                map.insert(USER_AGENT, ua);
            }
        }

        if request.method.carries_body() && !request.headers.contains("content-type") {
            let content_type = match &request.body {
                Some(body) if serde_json::from_str::<serde_json::Value>(body).is_ok() => "application/json",
                _ => "application/octet-stream",
            };
            map.insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
        }

        map
    }

    async fn finish_success_path(&self, response: reqwest::Response, start: Instant) -> ExecutionOutcome {
        let status_code = response.status();
        let response_headers = extract_headers(response.headers());

        match response.bytes().await {
            Ok(bytes) => {
                let elapsed_ms = start.elapsed().as_millis() as i64;
                let body = truncate_body(&bytes, self.config.response_body_limit_bytes);
                if status_code.is_success() {
                    ExecutionOutcome {
                        status: ExecutionStatus::Success,
                        duration_ms: elapsed_ms,
                        response_code: Some(status_code.as_u16() as i32),
                        response_body: Some(body),
                        response_headers: Some(response_headers),
                        error_message: None,
                    }
                } else {
                    ExecutionOutcome {
                        status: ExecutionStatus::Failed,
                        duration_ms: elapsed_ms,
                        response_code: Some(status_code.as_u16() as i32),
                        response_body: Some(body),
                        response_headers: Some(response_headers),
                        error_message: Some(format!("http_non_2xx: {}", status_code.as_u16())),
                    }
                }
            }
            Err(err) => {
                let elapsed_ms = start.elapsed().as_millis() as i64;
                let (status, reason) = if err.is_timeout() {
                    (ExecutionStatus::Timeout, "timeout".to_string())
                } else {
                    (
                        ExecutionStatus::Failed,
                        "response_truncated_read_error".to_string(),
                    )
                };
                ExecutionOutcome {
                    status,
                    duration_ms: elapsed_ms,
                    response_code: Some(status_code.as_u16() as i32),
                    response_body: None,
                    response_headers: Some(response_headers),
                    error_message: Some(reason),
                }
            }
        }
    }
}

fn to_reqwest_method(method: HttpMethod) -> reqwest::Method {
    match method {
        HttpMethod::Get => reqwest::Method::GET,
        HttpMethod::Post => reqwest::Method::POST,
        HttpMethod::Put => reqwest::Method::PUT,
        HttpMethod::Delete => reqwest::Method::DELETE,
        HttpMethod::Patch => reqwest::Method::PATCH,
    }
}

fn extract_headers(headers: &HeaderMap) -> Headers {
    let mut out = Headers::new();
    for (name, value) in headers.iter() {
        if let Ok(value) = value.to_str() {
            out.insert(name.as_str(), value);
        }
    }
    out
}

fn truncate_body(bytes: &[u8], limit: usize) -> String {
    let slice = if bytes.len() > limit { &bytes[..limit] } else { bytes };
    String::from_utf8_lossy(slice).into_owned()
}

fn classify_send_error(err: &reqwest::Error) -> (ExecutionStatus, &'static str) {
    if err.is_timeout() {
        return (ExecutionStatus::Timeout, "timeout");
    }
    if err.is_connect() {
        let msg = err.to_string().to_lowercase();
        if msg.contains("dns") || msg.contains("resolve") {
            return (ExecutionStatus::Failed, "dns_failure");
        }
        if msg.contains("tls") || msg.contains("certificate") || msg.contains("ssl") {
            return (ExecutionStatus::Failed, "tls_failure");
        }
        return (ExecutionStatus::Failed, "connect_refused");
    }
    let msg = err.to_string().to_lowercase();
    if msg.contains("tls") || msg.contains("certificate") {
        (ExecutionStatus::Failed, "tls_failure")
    } else if msg.contains("dns") {
        (ExecutionStatus::Failed, "dns_failure")
    } else {
        (ExecutionStatus::Failed, "connect_refused")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    fn config() -> InvokerConfig {
        InvokerConfig {
            request_timeout: Duration::from_secs(30),
            response_body_limit_bytes: 10 * 1024,
            user_agent: "CronMaster/1.0".to_string(),
        }
    }

    #[test]
    fn truncates_body_to_limit() {
        let body = "x".repeat(100);
        let truncated = truncate_body(body.as_bytes(), 10);
        assert_eq!(truncated.len(), 10);
    }

    #[test]
    fn short_body_is_unchanged() {
        let body = "ok";
        assert_eq!(truncate_body(body.as_bytes(), 10), "ok");
    }

    #[tokio::test]
    async fn sets_default_user_agent_when_absent() {
        let invoker = Invoker::new(config());
        let request = InvocationRequest {
            method: HttpMethod::Get,
            url: "http://example.invalid".to_string(),
            headers: Headers::new(),
            body: None,
        };
        let headers = invoker.build_headers(&request);
        assert_eq!(headers.get(USER_AGENT).unwrap(), "CronMaster/1.0");
    }

    #[tokio::test]
    async fn respects_explicit_user_agent() {
        let invoker = Invoker::new(config());
        let mut h = Headers::new();
        h.insert("User-Agent", "custom-agent/9");
        let request = InvocationRequest {
            method: HttpMethod::Get,
            url: "http://example.invalid".to_string(),
            headers: h,
            body: None,
        };
        let headers = invoker.build_headers(&request);
        assert_eq!(headers.get(USER_AGENT).unwrap(), "custom-agent/9");
    }

    #[tokio::test]
    async fn json_body_gets_json_content_type() {
        let invoker = Invoker::new(config());
        let request = InvocationRequest {
            method: HttpMethod::Post,
            url: "http://example.invalid".to_string(),
            headers: Headers::new(),
            body: Some(r#"{"a":1}"#.to_string()),
        };
        let headers = invoker.build_headers(&request);
        assert_eq!(headers.get(CONTENT_TYPE).unwrap(), "application/json");
    }

    #[tokio::test]
    async fn opaque_body_gets_octet_stream_content_type() {
        let invoker = Invoker::new(config());
        let request = InvocationRequest {
            method: HttpMethod::Post,
            url: "http://example.invalid".to_string(),
            headers: Headers::new(),
            body: Some("not json".to_string()),
        };
        let headers = invoker.build_headers(&request);
        assert_eq!(headers.get(CONTENT_TYPE).unwrap(), "application/octet-stream");
    }

    #[test]
    fn extract_headers_roundtrips_into_ordered_map() {
        let mut raw = HeaderMap::new();
        raw.insert("X-Foo", HeaderValue::from_static("bar"));
        let out = extract_headers(&raw);
        assert_eq!(out.get("x-foo"), Some("bar"));
    }
}
