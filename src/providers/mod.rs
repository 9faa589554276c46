//! Model inference backends.
//!
//! [`profile`] describes the per-model-family request/response schema,
//! [`bedrock`] carries it over the wire, and [`sanitize`] cleans whatever
//! comes back. The gateway is reached through the
//! [`Generator`](crate::channels::traits::Generator) trait so handler tests
//! can script replies instead of signing real requests.

pub mod bedrock;
pub mod profile;
pub mod sanitize;

pub use bedrock::BedrockClient;
pub use profile::{ModelProfile, ProfileParseError};
pub use sanitize::FALLBACK_TEXT;

use crate::util::truncate_with_ellipsis;

const MAX_API_ERROR_CHARS: usize = 200;

/// Build a provider error from a failed HTTP response. Bodies are truncated
/// so an HTML error page doesn't flood the logs.
pub(crate) async fn api_error(provider: &str, response: reqwest::Response) -> anyhow::Error {
    let status = response.status();
    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "<failed to read provider error body>".to_string());
    anyhow::anyhow!(
        "{provider} API error ({status}): {}",
        truncate_with_ellipsis(&body, MAX_API_ERROR_CHARS)
    )
}
