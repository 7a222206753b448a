//! Shared HTTP plumbing for adapters: error mapping and server-sent event framing.

use reqwest::Response;
use serde_json::Value;

use crate::ProviderError;

pub(crate) fn send_error(error: reqwest::Error) -> ProviderError {
    if error.is_timeout() {
        ProviderError::timeout(error.to_string())
    } else {
        ProviderError::transport(error.to_string())
    }
}

pub(crate) async fn status_error(response: Response, provider: &str) -> ProviderError {
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    let message = extract_error_message(&body)
        .unwrap_or_else(|| format!("{provider} request failed with status {status}"));

    ProviderError::from_status(status, message)
}

/// Reads `error.message`, a bare `error` string or a top-level `message`.
pub(crate) fn extract_error_message(body: &str) -> Option<String> {
    let parsed = serde_json::from_str::<Value>(body).ok()?;
    let candidate = parsed
        .get("error")
        .and_then(|error| error.get("message").or(Some(error)))
        .or_else(|| parsed.get("message"))?;

    candidate.as_str().map(str::to_string)
}

/// Splits a byte stream into `data:` payloads. Other SSE fields are skipped.
#[derive(Debug, Default)]
pub(crate) struct SseBuffer {
    pending: Vec<u8>,
}

impl SseBuffer {
    pub(crate) fn push(&mut self, bytes: &[u8]) {
        self.pending.extend_from_slice(bytes);
    }

    pub(crate) fn next_payload(&mut self) -> Result<Option<String>, ProviderError> {
        while let Some(newline) = self.pending.iter().position(|byte| *byte == b'\n') {
            let line = self.pending.drain(..=newline).collect::<Vec<_>>();
            let line = std::str::from_utf8(&line)
                .map_err(|err| ProviderError::transport(err.to_string()))?
                .trim();

            if let Some(payload) = line.strip_prefix("data:") {
                let payload = payload.trim();
                if !payload.is_empty() {
                    return Ok(Some(payload.to_string()));
                }
            }
        }

        Ok(None)
    }

    /// Terminates a trailing line that arrived without a newline.
    pub(crate) fn finish(&mut self) -> Result<Option<String>, ProviderError> {
        if self.pending.is_empty() {
            return Ok(None);
        }
        self.pending.push(b'\n');
        self.next_payload()
    }
}
