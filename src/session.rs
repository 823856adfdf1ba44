// =============================================================================
// HTTP Session — one reqwest client per account, built once and reused
// =============================================================================
//
// The session carries the account's default headers, optional proxy and
// request timeout. It is acquired when the account starts and dropped when
// its tasks end; retries never rebuild it.
// =============================================================================

use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, CONTENT_TYPE, USER_AGENT};
use tracing::debug;

use crate::error::GatewayError;

const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Linux; Android 13; Pixel 7) AppleWebKit/537.36 \
     (KHTML, like Gecko) Chrome/126.0.0.0 Mobile Safari/537.36";

/// Build a reqwest client with the usual browser-like headers plus `extra`.
pub fn build_session(
    extra: &[(&'static str, String)],
    proxy: Option<&str>,
    timeout_secs: u64,
) -> Result<reqwest::Client> {
    let mut headers = HeaderMap::new();
    headers.insert(ACCEPT, HeaderValue::from_static("application/json, text/plain, */*"));
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    headers.insert(USER_AGENT, HeaderValue::from_static(BROWSER_USER_AGENT));
    for (name, value) in extra {
        let value = HeaderValue::from_str(value)
            .with_context(|| format!("invalid value for header {name}"))?;
        headers.insert(HeaderName::from_static(name), value);
    }

    let mut builder = reqwest::Client::builder()
        .default_headers(headers)
        .timeout(Duration::from_secs(timeout_secs));

    if let Some(url) = proxy {
        let proxy = reqwest::Proxy::all(url).with_context(|| format!("invalid proxy {url}"))?;
        builder = builder.proxy(proxy);
        debug!("session proxy configured");
    }

    builder.build().context("failed to build reqwest client")
}

/// Read a response body as JSON, mapping non-2xx statuses to
/// `GatewayError::Status` with the body text attached.
pub async fn read_json(resp: reqwest::Response) -> Result<serde_json::Value, GatewayError> {
    let body = read_text(resp).await?;
    if body.trim().is_empty() {
        return Ok(serde_json::Value::Null);
    }
    Ok(serde_json::from_str(&body)?)
}

/// Read a response body as text, mapping non-2xx statuses to
/// `GatewayError::Status`.
pub async fn read_text(resp: reqwest::Response) -> Result<String, GatewayError> {
    let status = resp.status();
    let body = resp.text().await?;
    if !status.is_success() {
        return Err(GatewayError::Status {
            code: status.as_u16(),
            body: truncate(&body, 200),
        });
    }
    Ok(body)
}

fn truncate(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => format!("{}…", &s[..idx]),
        None => s.to_string(),
    }
}
