//! Credential resolution for OpenAI-family providers.

use crate::{ProviderError, ProviderKind, SecureCredentialManager};

use super::types::OpenAiAuth;

/// Resolves the bearer key stored under `provider_id`.
///
/// OpenAI-compatible hosts may run without a key; the official endpoint may not.
pub(crate) fn resolve_openai_auth(
    credentials: &SecureCredentialManager,
    provider_id: &str,
    kind: ProviderKind,
) -> Result<OpenAiAuth, ProviderError> {
    if let Some(api_key) = credentials.api_key(provider_id)? {
        return Ok(OpenAiAuth::ApiKey(api_key));
    }

    match kind {
        ProviderKind::OpenAi => Err(ProviderError::authentication(format!(
            "no API key configured for provider '{provider_id}'"
        ))),
        _ => Ok(OpenAiAuth::Anonymous),
    }
}
