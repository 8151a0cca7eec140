//! Small helpers shared by every service client.

use reqwest::{RequestBuilder, Response};
use serde::de::DeserializeOwned;

use crate::ports::PortError;

/// Longest part of an unexpected response body quoted in an error.
const SNIPPET_LEN: usize = 300;

/// Send a request and turn non-success statuses into [`PortError::Service`].
///
/// # Errors
///
/// Returns a [`PortError`] when the request fails or the status is not a success.
pub async fn send_checked(req: RequestBuilder) -> Result<Response, PortError> {
    check_status(req.send().await?).await
}

/// Turn a non-success status of an already received response into [`PortError::Service`].
///
/// # Errors
///
/// Returns [`PortError::Service`] quoting the start of the body when the status is
/// not a success.
pub async fn check_status(resp: Response) -> Result<Response, PortError> {
    let status = resp.status();
    if !status.is_success() {
        let url = resp.url().to_string();
        let body = resp.bytes().await.unwrap_or_default();
        return Err(PortError::Service(format!(
            "{url} answered {status}: {}",
            snippet(&body)
        )));
    }
    Ok(resp)
}

/// Fetch and decode JSON with status handling.
///
/// # Errors
///
/// Returns a [`PortError`] when the request fails, the status is not a success or
/// the body is not the expected JSON.
pub async fn fetch_json<T: DeserializeOwned>(
    req: RequestBuilder,
    subject: &str,
) -> Result<T, PortError> {
    send_checked(req)
        .await?
        .json()
        .await
        .map_err(|err| PortError::Service(format!("unexpected response for {subject}: {err}")))
}

/// Value of the `Content-Type` header, empty when missing.
#[must_use]
pub fn content_type(resp: &Response) -> String {
    resp.headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
        .to_ascii_lowercase()
}

/// Start of a body as lossy UTF-8, for error messages.
#[must_use]
pub fn snippet(body: &[u8]) -> String {
    let text = String::from_utf8_lossy(body);
    let trimmed = text.trim();
    match trimmed.char_indices().nth(SNIPPET_LEN) {
        Some((cut, _)) => format!("{}...", trimmed.get(..cut).unwrap_or(trimmed)),
        None => trimmed.to_owned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snippet_is_truncated_on_char_boundary() {
        let body = "é".repeat(SNIPPET_LEN + 10);
        let quoted = snippet(body.as_bytes());
        assert!(quoted.ends_with("..."), "long bodies are cut");
        assert_eq!(quoted.chars().count(), SNIPPET_LEN + 3);
    }

    #[test]
    fn short_snippet_is_trimmed() {
        assert_eq!(snippet(b"  <ServiceException/>\n"), "<ServiceException/>");
    }
}
